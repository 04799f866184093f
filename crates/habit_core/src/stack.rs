use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::catalog::{Habit, HabitCatalog};
use crate::error::{HabitError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StackEntry {
    #[serde(rename = "habitId")]
    pub habit_id: String,
    #[serde(default)]
    pub completed: bool,
}

impl StackEntry {
    pub fn pending(habit_id: impl Into<String>) -> Self {
        Self {
            habit_id: habit_id.into(),
            completed: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Stack {
    pub id: String,
    pub name: String,
    #[serde(rename = "habits")]
    pub entries: Vec<StackEntry>,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "lastCompleted", default)]
    pub last_completed_at: Option<DateTime<Utc>>,
}

impl Stack {
    pub fn is_completed(&self) -> bool {
        self.entries.iter().all(|entry| entry.completed)
    }

    pub fn completed_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.completed).count()
    }

    pub fn completion_rate(&self) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }
        self.completed_count() as f64 / self.entries.len() as f64
    }

    /// Skips entries whose habit was deleted after the stack was built.
    pub fn resolved_entries<'a>(
        &'a self,
        catalog: &'a HabitCatalog,
    ) -> impl Iterator<Item = (&'a StackEntry, &'a Habit)> + 'a {
        self.entries
            .iter()
            .filter_map(move |entry| catalog.get(&entry.habit_id).map(|habit| (entry, habit)))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NewStack {
    pub name: String,
    #[serde(rename = "habitIds", alias = "habit_ids")]
    pub habit_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StackUpdate {
    pub name: Option<String>,
    #[serde(rename = "habitIds", alias = "habit_ids")]
    pub habit_ids: Option<Vec<String>>,
}

pub fn validate_chain(name: &str, habit_ids: &[String], catalog: &HabitCatalog) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(HabitError::validation("stack name is required"));
    }
    if habit_ids.is_empty() {
        return Err(HabitError::validation("stack must contain at least one habit"));
    }
    if let Some(unknown) = habit_ids.iter().find(|id| !catalog.contains(id)) {
        return Err(HabitError::validation(format!(
            "stack references unknown habit `{unknown}`"
        )));
    }
    Ok(name.to_string())
}

/// Rebuilds an entry chain for `habit_ids`. Each new entry inherits the flag
/// of the first unconsumed old entry with the same habit id.
pub fn carry_over(old: &[StackEntry], habit_ids: &[String]) -> Vec<StackEntry> {
    let mut consumed = vec![false; old.len()];
    habit_ids
        .iter()
        .map(|habit_id| {
            let inherited = old
                .iter()
                .enumerate()
                .find(|(idx, entry)| !consumed[*idx] && &entry.habit_id == habit_id)
                .map(|(idx, entry)| (idx, entry.completed));
            match inherited {
                Some((idx, completed)) => {
                    consumed[idx] = true;
                    StackEntry {
                        habit_id: habit_id.clone(),
                        completed,
                    }
                }
                None => StackEntry::pending(habit_id.clone()),
            }
        })
        .collect()
}

/// A stack behind its own lock. `removed` is set by a delete so that callers
/// holding a stale handle observe the deletion.
#[derive(Debug)]
pub struct StackSlot {
    stack: Stack,
    removed: bool,
}

impl StackSlot {
    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    pub(crate) fn replace(&mut self, stack: Stack) {
        self.stack = stack;
    }

    pub(crate) fn mark_removed(&mut self) {
        self.removed = true;
    }
}

pub type StackHandle = Arc<Mutex<StackSlot>>;

#[derive(Debug, Default)]
struct StackIndex {
    slots: HashMap<String, StackHandle>,
    order: Vec<String>,
}

// The index lock is only held for lookups and inserts.
#[derive(Debug, Default)]
pub struct StackStore {
    index: RwLock<StackIndex>,
}

impl StackStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, stack: Stack) -> Result<()> {
        let mut index = self.index.write();
        if index.slots.contains_key(&stack.id) {
            return Err(HabitError::already_exists("stack", stack.id));
        }
        let id = stack.id.clone();
        let slot = StackSlot {
            stack,
            removed: false,
        };
        index.slots.insert(id.clone(), Arc::new(Mutex::new(slot)));
        index.order.push(id);
        Ok(())
    }

    pub fn handle(&self, id: &str) -> Option<StackHandle> {
        self.index.read().slots.get(id).cloned()
    }

    pub fn handles(&self) -> Vec<StackHandle> {
        let index = self.index.read();
        index
            .order
            .iter()
            .filter_map(|id| index.slots.get(id))
            .cloned()
            .collect()
    }

    pub fn remove(&self, id: &str) -> Option<StackHandle> {
        let mut index = self.index.write();
        let handle = index.slots.remove(id)?;
        index.order.retain(|existing| existing != id);
        Some(handle)
    }

    pub fn len(&self) -> usize {
        self.index.read().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
