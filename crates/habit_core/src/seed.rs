//! Built-in catalog and sample stacks used when a host starts without any
//! stored state.

use chrono::{DateTime, NaiveDate, Utc};

use crate::catalog::{NewCategory, NewHabit};
use crate::progress::Progress;
use crate::stack::{Stack, StackEntry};

const CATEGORIES: &[(&str, &str, &str, &str)] = &[
    ("morning", "Morning Routine", "#FFB800", "🌅"),
    ("exercise", "Exercise", "#FF6B6B", "💪"),
    ("work", "Work", "#4ECDC4", "💼"),
    ("evening", "Evening Routine", "#A8E6CF", "🌙"),
    ("health", "Health", "#88D8B0", "🏥"),
    ("learning", "Learning", "#FFD93D", "📚"),
];

const HABITS: &[(&str, &str, &str, i64, &str)] = &[
    ("1", "Brush Teeth", "morning", 3, "Clean teeth and gums"),
    ("2", "Drink Water", "morning", 1, "16oz of water"),
    ("3", "Make Bed", "morning", 2, "Tidy up bedroom"),
    ("4", "Make Coffee", "morning", 5, "Brew morning coffee"),
    ("5", "Check Weather", "morning", 1, "Plan outfit for day"),
    ("6", "10 Push-ups", "exercise", 2, "Quick strength training"),
    ("7", "5-min Stretch", "exercise", 5, "Basic stretching routine"),
    ("8", "Go for Walk", "exercise", 15, "15-minute walk outside"),
    ("9", "Planks", "exercise", 3, "1-minute plank hold"),
    ("10", "Jumping Jacks", "exercise", 2, "20 jumping jacks"),
    ("11", "Check Email", "work", 10, "Review and respond to emails"),
    ("12", "Review To-Do", "work", 3, "Plan daily tasks"),
    ("13", "Deep Work Block", "work", 90, "Focused work session"),
    ("14", "Team Standup", "work", 15, "Daily team meeting"),
    ("15", "Prepare Clothes", "evening", 5, "Lay out tomorrow's outfit"),
    ("16", "Journal", "evening", 10, "Write daily reflections"),
    ("17", "Read Book", "evening", 20, "Read before bed"),
    ("18", "Phone Away", "evening", 1, "Put phone in another room"),
    ("19", "Take Vitamins", "health", 1, "Daily supplement routine"),
    ("20", "Meditate", "health", 10, "10-minute mindfulness"),
    ("21", "Floss", "health", 2, "Daily flossing routine"),
    ("22", "Duolingo", "learning", 15, "Language learning practice"),
    ("23", "Watch Tutorial", "learning", 20, "Educational video"),
    ("24", "Practice Code", "learning", 30, "Coding practice"),
];

pub fn default_categories() -> Vec<NewCategory> {
    CATEGORIES
        .iter()
        .map(|(id, name, color, icon)| NewCategory {
            id: Some((*id).to_string()),
            name: (*name).to_string(),
            color: (*color).to_string(),
            icon: (*icon).to_string(),
        })
        .collect()
}

pub fn default_habits() -> Vec<NewHabit> {
    HABITS
        .iter()
        .map(|(id, name, category, time, description)| NewHabit {
            id: Some((*id).to_string()),
            name: (*name).to_string(),
            category: (*category).to_string(),
            time_minutes: *time,
            description: (*description).to_string(),
        })
        .collect()
}

struct SampleStack {
    id: &'static str,
    name: &'static str,
    entries: &'static [(&'static str, bool)],
    created: (i32, u32, u32),
    last_completed: Option<(i32, u32, u32)>,
    streaks: (u32, u32),
    week: [bool; 7],
}

const SAMPLE_STACKS: &[SampleStack] = &[
    SampleStack {
        id: "stack1",
        name: "Morning Power Stack",
        entries: &[("1", true), ("6", true), ("4", false), ("20", false)],
        created: (2024, 1, 15),
        last_completed: Some((2024, 1, 20)),
        streaks: (5, 12),
        week: [true, true, false, true, true, true, false],
    },
    SampleStack {
        id: "stack2",
        name: "Work Prep Stack",
        entries: &[("2", true), ("12", true), ("11", false)],
        created: (2024, 1, 16),
        last_completed: Some((2024, 1, 19)),
        streaks: (3, 8),
        week: [true, true, true, false, true, true, true],
    },
    SampleStack {
        id: "stack3",
        name: "Evening Wind Down",
        entries: &[("15", false), ("16", false), ("17", false), ("18", false)],
        created: (2024, 1, 17),
        last_completed: None,
        streaks: (0, 4),
        week: [false, false, true, false, false, true, false],
    },
];

/// Sample stacks with their recorded progress. They reference the default
/// habits, so the default catalog must be seeded first.
pub fn sample_stacks(now: DateTime<Utc>) -> Vec<(Stack, Progress)> {
    SAMPLE_STACKS
        .iter()
        .map(|sample| {
            let stack = Stack {
                id: sample.id.to_string(),
                name: sample.name.to_string(),
                entries: sample
                    .entries
                    .iter()
                    .map(|(habit_id, completed)| StackEntry {
                        habit_id: (*habit_id).to_string(),
                        completed: *completed,
                    })
                    .collect(),
                created_at: day(sample.created).unwrap_or(now),
                last_completed_at: sample.last_completed.and_then(day),
            };
            let progress = Progress {
                stack_id: sample.id.to_string(),
                current_streak: sample.streaks.0,
                longest_streak: sample.streaks.1,
                completion_rate: stack.completion_rate(),
                last_week_progress: sample.week,
                updated_at: now,
            };
            (stack, progress)
        })
        .collect()
}

fn day((year, month, dom): (i32, u32, u32)) -> Option<DateTime<Utc>> {
    NaiveDate::from_ymd_opt(year, month, dom)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn every_default_habit_points_at_a_default_category() {
        let categories: HashSet<String> = default_categories()
            .into_iter()
            .filter_map(|c| c.id)
            .collect();
        assert_eq!(categories.len(), 6);
        let habits = default_habits();
        assert_eq!(habits.len(), 24);
        assert!(habits.iter().all(|h| categories.contains(&h.category)));
    }

    #[test]
    fn sample_stacks_reference_default_habits_and_respect_streak_order() {
        let habit_ids: HashSet<String> = default_habits().into_iter().filter_map(|h| h.id).collect();
        let samples = sample_stacks(Utc::now());
        assert_eq!(samples.len(), 3);
        for (stack, progress) in samples {
            assert_eq!(stack.id, progress.stack_id);
            assert!(progress.longest_streak >= progress.current_streak);
            assert_eq!(progress.completion_rate, stack.completion_rate());
            assert!(stack
                .entries
                .iter()
                .all(|entry| habit_ids.contains(&entry.habit_id)));
        }
    }
}
