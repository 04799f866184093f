use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{HabitError, Result};
use crate::stack::Stack;

pub const WEEK_DAYS: usize = 7;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Progress {
    pub stack_id: String,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub completion_rate: f64,
    pub last_week_progress: [bool; WEEK_DAYS],
    pub updated_at: DateTime<Utc>,
}

impl Progress {
    pub fn new(stack_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            stack_id: stack_id.into(),
            current_streak: 0,
            longest_streak: 0,
            completion_rate: 0.0,
            last_week_progress: [false; WEEK_DAYS],
            updated_at: now,
        }
    }
}

/// Externally managed fields: the only way a streak is lowered or the
/// weekly history is rotated. The completion rate always follows the stack.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProgressUpdate {
    pub current_streak: Option<i64>,
    pub longest_streak: Option<i64>,
    pub last_week_progress: Option<Vec<bool>>,
}

// Callers serialize access per stack through the slot lock; the map lock
// only guards the map.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    records: RwLock<HashMap<String, Progress>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initialize(&self, stack_id: &str, now: DateTime<Utc>) -> Progress {
        let progress = Progress::new(stack_id, now);
        self.records
            .write()
            .insert(stack_id.to_string(), progress.clone());
        progress
    }

    pub fn get(&self, stack_id: &str) -> Option<Progress> {
        self.records.read().get(stack_id).cloned()
    }

    /// Streaks only move forward here: a complete stack bumps them by one.
    pub fn recompute(
        &self,
        stack: &Stack,
        all_completed_now: bool,
        now: DateTime<Utc>,
    ) -> Result<Progress> {
        let mut records = self.records.write();
        let Some(progress) = records.get_mut(&stack.id) else {
            error!(stack_id = %stack.id, "progress record missing for existing stack");
            return Err(HabitError::Fatal(format!(
                "no progress record for stack `{}`",
                stack.id
            )));
        };

        let mut next = progress.clone();
        next.completion_rate = stack.completion_rate();
        if all_completed_now {
            next.current_streak = next.current_streak.checked_add(1).ok_or_else(|| {
                HabitError::validation(format!(
                    "current_streak of stack `{}` cannot grow any further",
                    stack.id
                ))
            })?;
        }
        next.longest_streak = next.longest_streak.max(next.current_streak);
        next.updated_at = now;
        *progress = next.clone();
        debug!(
            stack_id = %stack.id,
            completed = stack.completed_count(),
            total = stack.entries.len(),
            current_streak = next.current_streak,
            "progress recomputed"
        );
        Ok(next)
    }

    /// Re-derives the completion rate after the chain changed. Streaks and
    /// the weekly history are kept.
    pub fn sync_rate(&self, stack: &Stack, now: DateTime<Utc>) -> Result<Progress> {
        let mut records = self.records.write();
        let Some(progress) = records.get_mut(&stack.id) else {
            error!(stack_id = %stack.id, "progress record missing for existing stack");
            return Err(HabitError::Fatal(format!(
                "no progress record for stack `{}`",
                stack.id
            )));
        };
        progress.completion_rate = stack.completion_rate();
        progress.updated_at = now;
        Ok(progress.clone())
    }

    pub fn apply_update(
        &self,
        stack_id: &str,
        update: ProgressUpdate,
        now: DateTime<Utc>,
    ) -> Result<Progress> {
        let mut records = self.records.write();
        let Some(existing) = records.get(stack_id) else {
            error!(%stack_id, "progress record missing for existing stack");
            return Err(HabitError::Fatal(format!(
                "no progress record for stack `{stack_id}`"
            )));
        };

        let mut next = existing.clone();
        if let Some(current) = update.current_streak {
            next.current_streak = streak_value("current_streak", current)?;
        }
        if let Some(longest) = update.longest_streak {
            next.longest_streak = streak_value("longest_streak", longest)?;
        }
        if let Some(week) = update.last_week_progress {
            next.last_week_progress = <[bool; WEEK_DAYS]>::try_from(week.as_slice())
                .map_err(|_| {
                    HabitError::validation(format!(
                        "last_week_progress must have {WEEK_DAYS} values, got {}",
                        week.len()
                    ))
                })?;
        }
        if next.longest_streak < next.current_streak {
            return Err(HabitError::validation(
                "longest_streak cannot be below current_streak",
            ));
        }
        next.updated_at = now;
        records.insert(stack_id.to_string(), next.clone());
        Ok(next)
    }

    pub fn remove(&self, stack_id: &str) -> Option<Progress> {
        self.records.write().remove(stack_id)
    }

    pub(crate) fn restore(&self, progress: Progress) {
        self.records
            .write()
            .insert(progress.stack_id.clone(), progress);
    }
}

fn streak_value(field: &str, value: i64) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| HabitError::validation(format!("{field} must be between 0 and {}", u32::MAX)))
}

pub(crate) fn check_rate(rate: f64) -> Result<()> {
    if (0.0..=1.0).contains(&rate) {
        Ok(())
    } else {
        Err(HabitError::validation(format!(
            "completion_rate {rate} is outside 0..=1"
        )))
    }
}
