use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{HabitError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub color: String,
    pub icon: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Habit {
    pub id: String,
    pub name: String,
    pub category: String,
    #[serde(rename = "time")]
    pub time_minutes: u32,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NewCategory {
    pub id: Option<String>,
    pub name: String,
    pub color: String,
    pub icon: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NewHabit {
    pub id: Option<String>,
    pub name: String,
    pub category: String,
    #[serde(rename = "time")]
    pub time_minutes: i64,
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HabitUpdate {
    pub name: Option<String>,
    pub category: Option<String>,
    #[serde(rename = "time")]
    pub time_minutes: Option<i64>,
    pub description: Option<String>,
}

impl HabitUpdate {
    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.category.is_none()
            && self.time_minutes.is_none()
            && self.description.is_none()
    }
}

#[derive(Debug, Default)]
pub struct HabitCatalog {
    categories: HashMap<String, Category>,
    category_order: Vec<String>,
    habits: HashMap<String, Habit>,
    habit_order: Vec<String>,
}

impl HabitCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list_categories(&self) -> Vec<Category> {
        self.category_order
            .iter()
            .filter_map(|id| self.categories.get(id))
            .cloned()
            .collect()
    }

    pub fn get_category(&self, id: &str) -> Option<&Category> {
        self.categories.get(id)
    }

    pub fn create_category(&mut self, new: NewCategory, now: DateTime<Utc>) -> Result<Category> {
        let name = required("name", &new.name)?;
        let color = required("color", &new.color)?;
        let icon = required("icon", &new.icon)?;
        if self.category_named(&name).is_some() {
            return Err(HabitError::already_exists("category", name));
        }
        let id = match new.id {
            Some(id) => {
                let id = required("id", &id)?;
                if self.categories.contains_key(&id) {
                    return Err(HabitError::already_exists("category", id));
                }
                id
            }
            None => uuid::Uuid::new_v4().to_string(),
        };
        let category = Category {
            id: id.clone(),
            name,
            color,
            icon,
            created_at: now,
        };
        self.category_order.push(id.clone());
        self.categories.insert(id, category.clone());
        Ok(category)
    }

    pub fn update_category(&mut self, id: &str, update: CategoryUpdate) -> Result<Category> {
        if !self.categories.contains_key(id) {
            return Err(HabitError::not_found("category", id));
        }
        if let Some(name) = &update.name {
            let name = required("name", name)?;
            if let Some(existing) = self.category_named(&name) {
                if existing.id != id {
                    return Err(HabitError::already_exists("category", name));
                }
            }
        }
        let color = update.color.as_deref().map(|c| required("color", c)).transpose()?;
        let icon = update.icon.as_deref().map(|i| required("icon", i)).transpose()?;

        let category = self
            .categories
            .get_mut(id)
            .ok_or_else(|| HabitError::not_found("category", id))?;
        if let Some(name) = update.name {
            category.name = name.trim().to_string();
        }
        if let Some(color) = color {
            category.color = color;
        }
        if let Some(icon) = icon {
            category.icon = icon;
        }
        Ok(category.clone())
    }

    pub fn delete_category(&mut self, id: &str) -> Result<()> {
        if !self.categories.contains_key(id) {
            return Err(HabitError::not_found("category", id));
        }
        let in_use = self.habits.values().filter(|h| h.category == id).count();
        if in_use > 0 {
            return Err(HabitError::validation(format!(
                "category `{id}` is used by {in_use} habit(s)"
            )));
        }
        self.categories.remove(id);
        self.category_order.retain(|existing| existing != id);
        Ok(())
    }

    pub fn list(&self) -> Vec<Habit> {
        self.habit_order
            .iter()
            .filter_map(|id| self.habits.get(id))
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<&Habit> {
        self.habits.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.habits.contains_key(id)
    }

    pub fn create(&mut self, new: NewHabit, now: DateTime<Utc>) -> Result<Habit> {
        let name = required("name", &new.name)?;
        let category = required("category", &new.category)?;
        let time_minutes = positive_minutes(new.time_minutes)?;
        let description = required("description", &new.description)?;
        if !self.categories.contains_key(&category) {
            return Err(HabitError::not_found("category", category));
        }
        let id = match new.id {
            Some(id) => {
                let id = required("id", &id)?;
                if self.habits.contains_key(&id) {
                    return Err(HabitError::already_exists("habit", id));
                }
                id
            }
            None => uuid::Uuid::new_v4().to_string(),
        };
        let habit = Habit {
            id: id.clone(),
            name,
            category,
            time_minutes,
            description,
            created_at: now,
        };
        self.habit_order.push(id.clone());
        self.habits.insert(id, habit.clone());
        Ok(habit)
    }

    /// Every provided field is checked before anything is written.
    pub fn update(&mut self, id: &str, update: HabitUpdate) -> Result<Habit> {
        if !self.habits.contains_key(id) {
            return Err(HabitError::not_found("habit", id));
        }
        if update.is_empty() {
            return Err(HabitError::validation("no fields to update"));
        }
        let name = update.name.as_deref().map(|n| required("name", n)).transpose()?;
        let category = update
            .category
            .as_deref()
            .map(|c| required("category", c))
            .transpose()?;
        if let Some(category) = &category {
            if !self.categories.contains_key(category) {
                return Err(HabitError::not_found("category", category.clone()));
            }
        }
        let time_minutes = update.time_minutes.map(positive_minutes).transpose()?;
        let description = update
            .description
            .as_deref()
            .map(|d| required("description", d))
            .transpose()?;

        let habit = self
            .habits
            .get_mut(id)
            .ok_or_else(|| HabitError::not_found("habit", id))?;
        if let Some(name) = name {
            habit.name = name;
        }
        if let Some(category) = category {
            habit.category = category;
        }
        if let Some(time_minutes) = time_minutes {
            habit.time_minutes = time_minutes;
        }
        if let Some(description) = description {
            habit.description = description;
        }
        Ok(habit.clone())
    }

    pub fn delete(&mut self, id: &str) -> Result<()> {
        if self.habits.remove(id).is_none() {
            return Err(HabitError::not_found("habit", id));
        }
        self.habit_order.retain(|existing| existing != id);
        Ok(())
    }

    pub fn by_category(&self, category: &str) -> Vec<Habit> {
        self.list()
            .into_iter()
            .filter(|habit| habit.category == category)
            .collect()
    }

    pub fn search(&self, query: &str, category: Option<&str>) -> Vec<Habit> {
        let needle = query.trim().to_lowercase();
        self.list()
            .into_iter()
            .filter(|habit| category.map_or(true, |c| habit.category == c))
            .filter(|habit| habit.name.to_lowercase().contains(&needle))
            .collect()
    }

    pub(crate) fn restore_category(&mut self, category: Category) -> Result<()> {
        if self.categories.contains_key(&category.id) {
            return Err(HabitError::already_exists("category", category.id));
        }
        self.category_order.push(category.id.clone());
        self.categories.insert(category.id.clone(), category);
        Ok(())
    }

    pub(crate) fn restore_habit(&mut self, habit: Habit) -> Result<()> {
        if self.habits.contains_key(&habit.id) {
            return Err(HabitError::already_exists("habit", habit.id));
        }
        if !self.categories.contains_key(&habit.category) {
            return Err(HabitError::not_found("category", habit.category));
        }
        self.habit_order.push(habit.id.clone());
        self.habits.insert(habit.id.clone(), habit);
        Ok(())
    }

    fn category_named(&self, name: &str) -> Option<&Category> {
        self.categories.values().find(|category| category.name == name)
    }
}

fn required(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(HabitError::validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

fn positive_minutes(value: i64) -> Result<u32> {
    if value < 1 {
        return Err(HabitError::validation("time must be at least 1 minute"));
    }
    u32::try_from(value).map_err(|_| HabitError::validation("time is out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 10, 7, 0, 0).unwrap()
    }

    fn catalog_with_morning() -> HabitCatalog {
        let mut catalog = HabitCatalog::new();
        catalog
            .create_category(
                NewCategory {
                    id: Some("morning".into()),
                    name: "Morning Routine".into(),
                    color: "#FFB800".into(),
                    icon: "sunrise".into(),
                },
                now(),
            )
            .expect("create category");
        catalog
    }

    fn brush_teeth() -> NewHabit {
        NewHabit {
            id: Some("1".into()),
            name: "Brush Teeth".into(),
            category: "morning".into(),
            time_minutes: 3,
            description: "Clean teeth and gums".into(),
        }
    }

    #[test]
    fn creates_and_lists_habits_in_insertion_order() {
        let mut catalog = catalog_with_morning();
        catalog.create(brush_teeth(), now()).expect("first habit");
        let water = catalog
            .create(
                NewHabit {
                    name: "Drink Water".into(),
                    category: "morning".into(),
                    time_minutes: 1,
                    description: "16oz of water".into(),
                    ..NewHabit::default()
                },
                now(),
            )
            .expect("second habit");

        let names: Vec<String> = catalog.list().into_iter().map(|h| h.name).collect();
        assert_eq!(names, vec!["Brush Teeth", "Drink Water"]);
        assert!(!water.id.is_empty());
        assert_eq!(catalog.get("1").map(|h| h.time_minutes), Some(3));
    }

    #[test]
    fn rejects_missing_fields_and_non_positive_time() {
        let mut catalog = catalog_with_morning();
        let blank_name = NewHabit {
            name: "   ".into(),
            ..brush_teeth()
        };
        assert!(matches!(
            catalog.create(blank_name, now()),
            Err(HabitError::Validation(_))
        ));

        let zero_time = NewHabit {
            time_minutes: 0,
            ..brush_teeth()
        };
        assert!(matches!(
            catalog.create(zero_time, now()),
            Err(HabitError::Validation(_))
        ));

        let no_description = NewHabit {
            description: String::new(),
            ..brush_teeth()
        };
        assert!(matches!(
            catalog.create(no_description, now()),
            Err(HabitError::Validation(_))
        ));
        assert!(catalog.list().is_empty());
    }

    #[test]
    fn unknown_category_is_not_found() {
        let mut catalog = catalog_with_morning();
        let err = catalog
            .create(
                NewHabit {
                    category: "astronomy".into(),
                    ..brush_teeth()
                },
                now(),
            )
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn partial_update_keeps_other_fields() {
        let mut catalog = catalog_with_morning();
        catalog.create(brush_teeth(), now()).unwrap();
        let updated = catalog
            .update(
                "1",
                HabitUpdate {
                    time_minutes: Some(4),
                    ..HabitUpdate::default()
                },
            )
            .expect("update time");
        assert_eq!(updated.time_minutes, 4);
        assert_eq!(updated.name, "Brush Teeth");

        assert!(matches!(
            catalog.update("1", HabitUpdate::default()),
            Err(HabitError::Validation(_))
        ));
        let bad = catalog.update(
            "1",
            HabitUpdate {
                name: Some("Floss".into()),
                time_minutes: Some(-2),
                ..HabitUpdate::default()
            },
        );
        assert!(bad.is_err());
        assert_eq!(catalog.get("1").unwrap().name, "Brush Teeth");
        assert!(catalog.update("404", HabitUpdate::default()).unwrap_err().is_not_found());
    }

    #[test]
    fn delete_is_strict_about_unknown_ids() {
        let mut catalog = catalog_with_morning();
        catalog.create(brush_teeth(), now()).unwrap();
        catalog.delete("1").expect("delete existing");
        assert!(catalog.delete("1").unwrap_err().is_not_found());
        assert!(catalog.list().is_empty());
    }

    #[test]
    fn category_names_are_unique_and_in_use_categories_stay() {
        let mut catalog = catalog_with_morning();
        let duplicate = catalog.create_category(
            NewCategory {
                name: "Morning Routine".into(),
                color: "#000000".into(),
                icon: "x".into(),
                ..NewCategory::default()
            },
            now(),
        );
        assert!(matches!(duplicate, Err(HabitError::AlreadyExists { .. })));

        catalog.create(brush_teeth(), now()).unwrap();
        assert!(matches!(
            catalog.delete_category("morning"),
            Err(HabitError::Validation(_))
        ));
        catalog.delete("1").unwrap();
        catalog.delete_category("morning").expect("unused category");
        assert!(catalog.list_categories().is_empty());
    }

    #[test]
    fn search_matches_name_case_insensitively() {
        let mut catalog = catalog_with_morning();
        catalog.create(brush_teeth(), now()).unwrap();
        assert_eq!(catalog.search("TEETH", None).len(), 1);
        assert_eq!(catalog.search("teeth", Some("evening")).len(), 0);
        assert_eq!(catalog.by_category("morning").len(), 1);
    }
}
