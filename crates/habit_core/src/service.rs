use std::collections::HashMap;
use std::path::Path;

use parking_lot::RwLock;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    catalog::{Category, CategoryUpdate, Habit, HabitCatalog, HabitUpdate, NewCategory, NewHabit},
    clock::{Clock, SystemClock},
    coordinator::{CompletionCoordinator, StackProgress},
    error::{HabitError, Result},
    progress::{check_rate, Progress, ProgressTracker, ProgressUpdate},
    seed,
    snapshot::StoreSnapshot,
    stack::{self, NewStack, Stack, StackEntry, StackHandle, StackStore, StackUpdate},
};

/// Owns the habit catalog, the stack store and the progress tracker.
///
/// Lock order is slot lock, then catalog or progress map. Nothing takes a
/// slot lock while holding either of the others.
pub struct HabitService {
    catalog: RwLock<HabitCatalog>,
    stacks: StackStore,
    progress: ProgressTracker,
    clock: Box<dyn Clock>,
}

#[derive(Default)]
pub struct HabitServiceBuilder {
    clock: Option<Box<dyn Clock>>,
    default_catalog: bool,
    sample_stacks: bool,
    snapshot: Option<StoreSnapshot>,
}

impl HabitServiceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_default_catalog(mut self) -> Self {
        self.default_catalog = true;
        self
    }

    pub fn with_sample_stacks(mut self) -> Self {
        self.sample_stacks = true;
        self
    }

    pub fn with_snapshot(mut self, snapshot: StoreSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub fn build(self) -> Result<HabitService> {
        let service = HabitService {
            catalog: RwLock::new(HabitCatalog::new()),
            stacks: StackStore::new(),
            progress: ProgressTracker::new(),
            clock: self.clock.unwrap_or_else(|| Box::new(SystemClock)),
        };
        if let Some(snapshot) = self.snapshot {
            service.restore(snapshot)?;
            return Ok(service);
        }
        if self.default_catalog {
            service.seed_default_catalog()?;
        }
        if self.sample_stacks {
            service.seed_sample_stacks()?;
        }
        Ok(service)
    }
}

impl HabitService {
    pub fn builder() -> HabitServiceBuilder {
        HabitServiceBuilder::new()
    }

    pub fn list_categories(&self) -> Vec<Category> {
        self.catalog.read().list_categories()
    }

    pub fn get_category(&self, id: &str) -> Result<Category> {
        self.catalog
            .read()
            .get_category(id)
            .cloned()
            .ok_or_else(|| HabitError::not_found("category", id))
    }

    pub fn create_category(&self, new: NewCategory) -> Result<Category> {
        let category = self.catalog.write().create_category(new, self.clock.now())?;
        info!(category_id = %category.id, name = %category.name, "category created");
        Ok(category)
    }

    pub fn update_category(&self, id: &str, update: CategoryUpdate) -> Result<Category> {
        self.catalog.write().update_category(id, update)
    }

    pub fn delete_category(&self, id: &str) -> Result<()> {
        self.catalog.write().delete_category(id)?;
        info!(category_id = %id, "category deleted");
        Ok(())
    }

    pub fn list_habits(&self) -> Vec<Habit> {
        self.catalog.read().list()
    }

    pub fn get_habit(&self, id: &str) -> Result<Habit> {
        self.catalog
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| HabitError::not_found("habit", id))
    }

    pub fn habits_by_category(&self, category: &str) -> Vec<Habit> {
        self.catalog.read().by_category(category)
    }

    pub fn search_habits(&self, query: &str, category: Option<&str>) -> Vec<Habit> {
        self.catalog.read().search(query, category)
    }

    pub fn create_habit(&self, new: NewHabit) -> Result<Habit> {
        let habit = self.catalog.write().create(new, self.clock.now())?;
        info!(habit_id = %habit.id, name = %habit.name, "habit created");
        Ok(habit)
    }

    pub fn update_habit(&self, id: &str, update: HabitUpdate) -> Result<Habit> {
        self.catalog.write().update(id, update)
    }

    /// Stacks referencing the habit keep their entries; they are skipped
    /// when resolved against the catalog.
    pub fn delete_habit(&self, id: &str) -> Result<()> {
        self.catalog.write().delete(id)?;
        let referencing = self
            .live_stacks()
            .filter(|stack| stack.entries.iter().any(|entry| entry.habit_id == id))
            .count();
        if referencing > 0 {
            warn!(habit_id = %id, stacks = referencing, "deleted habit is still stacked");
        } else {
            info!(habit_id = %id, "habit deleted");
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn create_stack(&self, new: NewStack) -> Result<Stack> {
        let name = {
            let catalog = self.catalog.read();
            stack::validate_chain(&new.name, &new.habit_ids, &catalog)?
        };
        let now = self.clock.now();
        let stack = Stack {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            entries: new.habit_ids.into_iter().map(StackEntry::pending).collect(),
            created_at: now,
            last_completed_at: None,
        };
        // Progress goes in first so a visible stack always has one.
        self.progress.initialize(&stack.id, now);
        if let Err(err) = self.stacks.insert(stack.clone()) {
            self.progress.remove(&stack.id);
            return Err(err);
        }
        info!(stack_id = %stack.id, entries = stack.entries.len(), "stack created");
        Ok(stack)
    }

    pub fn get_stack(&self, id: &str) -> Result<Stack> {
        let handle = self.live_handle(id)?;
        let slot = handle.lock();
        if slot.is_removed() {
            return Err(HabitError::not_found("stack", id));
        }
        Ok(slot.stack().clone())
    }

    pub fn list_stacks(&self) -> Vec<Stack> {
        self.live_stacks().collect()
    }

    pub fn search_stacks(&self, query: &str) -> Vec<Stack> {
        let needle = query.trim().to_lowercase();
        self.live_stacks()
            .filter(|stack| stack.name.to_lowercase().contains(&needle))
            .collect()
    }

    /// Streaks and the weekly history survive a chain change; the completion
    /// rate is re-derived from the new entries.
    #[instrument(skip(self))]
    pub fn update_stack(&self, id: &str, update: StackUpdate) -> Result<Stack> {
        if update.name.is_none() && update.habit_ids.is_none() {
            return Err(HabitError::validation("no fields to update"));
        }
        let handle = self.live_handle(id)?;
        let mut slot = handle.lock();
        if slot.is_removed() {
            return Err(HabitError::not_found("stack", id));
        }

        let mut next = slot.stack().clone();
        let name = update.name.unwrap_or_else(|| next.name.clone());
        match update.habit_ids {
            Some(habit_ids) => {
                let catalog = self.catalog.read();
                next.name = stack::validate_chain(&name, &habit_ids, &catalog)?;
                next.entries = stack::carry_over(&next.entries, &habit_ids);
            }
            None => {
                let trimmed = name.trim();
                if trimmed.is_empty() {
                    return Err(HabitError::validation("stack name is required"));
                }
                next.name = trimmed.to_string();
            }
        }
        let progress = self.progress.sync_rate(&next, self.clock.now())?;
        slot.replace(next.clone());
        info!(
            stack_id = %id,
            entries = next.entries.len(),
            rate = progress.completion_rate,
            "stack updated"
        );
        Ok(next)
    }

    #[instrument(skip(self))]
    pub fn delete_stack(&self, id: &str) {
        let Some(handle) = self.stacks.remove(id) else {
            debug!(stack_id = %id, "delete of unknown stack ignored");
            return;
        };
        let mut slot = handle.lock();
        slot.mark_removed();
        self.progress.remove(id);
        info!(stack_id = %id, "stack deleted");
    }

    #[instrument(skip(self))]
    pub fn toggle_habit(&self, stack_id: &str, habit_id: &str) -> Result<StackProgress> {
        CompletionCoordinator::new(&self.stacks, &self.progress, self.clock.as_ref())
            .toggle_habit(stack_id, habit_id)
    }

    pub fn get_progress(&self, stack_id: &str) -> Result<Progress> {
        let handle = self.live_handle(stack_id)?;
        let slot = handle.lock();
        if slot.is_removed() {
            return Err(HabitError::not_found("stack", stack_id));
        }
        self.progress_for(stack_id)
    }

    pub fn stack_with_progress(&self, stack_id: &str) -> Result<StackProgress> {
        let handle = self.live_handle(stack_id)?;
        let slot = handle.lock();
        if slot.is_removed() {
            return Err(HabitError::not_found("stack", stack_id));
        }
        Ok(StackProgress {
            stack: slot.stack().clone(),
            progress: self.progress_for(stack_id)?,
        })
    }

    pub fn list_progress(&self) -> Result<Vec<Progress>> {
        Ok(self
            .consistent_pairs()?
            .into_iter()
            .map(|pair| pair.progress)
            .collect())
    }

    #[instrument(skip(self))]
    pub fn update_progress(&self, stack_id: &str, update: ProgressUpdate) -> Result<Progress> {
        let handle = self.live_handle(stack_id)?;
        let slot = handle.lock();
        if slot.is_removed() {
            return Err(HabitError::not_found("stack", stack_id));
        }
        let progress = self.progress.apply_update(stack_id, update, self.clock.now())?;
        info!(
            %stack_id,
            current_streak = progress.current_streak,
            longest_streak = progress.longest_streak,
            "progress updated externally"
        );
        Ok(progress)
    }

    /// Each stack is read together with its progress under its slot lock.
    pub fn snapshot(&self) -> Result<StoreSnapshot> {
        let (categories, habits) = {
            let catalog = self.catalog.read();
            (catalog.list_categories(), catalog.list())
        };
        let (stacks, progress): (Vec<Stack>, Vec<Progress>) = self
            .consistent_pairs()?
            .into_iter()
            .map(|pair| (pair.stack, pair.progress))
            .unzip();
        Ok(StoreSnapshot {
            categories,
            habits,
            stacks,
            progress,
        })
    }

    pub fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<()> {
        let snapshot = self.snapshot()?;
        snapshot.save(path.as_ref())?;
        info!(
            path = %path.as_ref().display(),
            stacks = snapshot.stacks.len(),
            habits = snapshot.habits.len(),
            "snapshot saved"
        );
        Ok(())
    }
}

impl HabitService {
    fn live_handle(&self, id: &str) -> Result<StackHandle> {
        self.stacks
            .handle(id)
            .ok_or_else(|| HabitError::not_found("stack", id))
    }

    fn live_stacks(&self) -> impl Iterator<Item = Stack> {
        self.stacks.handles().into_iter().filter_map(|handle| {
            let slot = handle.lock();
            let stack = (!slot.is_removed()).then(|| slot.stack().clone());
            stack
        })
    }

    fn consistent_pairs(&self) -> Result<Vec<StackProgress>> {
        let mut pairs = Vec::with_capacity(self.stacks.len());
        for handle in self.stacks.handles() {
            let slot = handle.lock();
            if slot.is_removed() {
                continue;
            }
            let stack = slot.stack().clone();
            let progress = self.progress_for(&stack.id)?;
            pairs.push(StackProgress { stack, progress });
        }
        Ok(pairs)
    }

    fn progress_for(&self, stack_id: &str) -> Result<Progress> {
        self.progress.get(stack_id).ok_or_else(|| {
            error!(%stack_id, "progress record missing for existing stack");
            HabitError::Fatal(format!("no progress record for stack `{stack_id}`"))
        })
    }

    fn seed_default_catalog(&self) -> Result<()> {
        let now = self.clock.now();
        let mut catalog = self.catalog.write();
        for category in seed::default_categories() {
            catalog.create_category(category, now)?;
        }
        for habit in seed::default_habits() {
            catalog.create(habit, now)?;
        }
        info!(
            categories = catalog.list_categories().len(),
            habits = catalog.list().len(),
            "default catalog seeded"
        );
        Ok(())
    }

    fn seed_sample_stacks(&self) -> Result<()> {
        let samples = seed::sample_stacks(self.clock.now());
        let count = samples.len();
        for (stack, progress) in samples {
            {
                let catalog = self.catalog.read();
                let habit_ids: Vec<String> =
                    stack.entries.iter().map(|e| e.habit_id.clone()).collect();
                stack::validate_chain(&stack.name, &habit_ids, &catalog)?;
            }
            self.progress.restore(progress);
            self.stacks.insert(stack)?;
        }
        info!(stacks = count, "sample stacks seeded");
        Ok(())
    }

    fn restore(&self, snapshot: StoreSnapshot) -> Result<()> {
        let now = self.clock.now();
        {
            let mut catalog = self.catalog.write();
            for category in snapshot.categories {
                catalog.restore_category(category)?;
            }
            for habit in snapshot.habits {
                catalog.restore_habit(habit)?;
            }
        }

        let mut records: HashMap<String, Progress> = snapshot
            .progress
            .into_iter()
            .map(|progress| (progress.stack_id.clone(), progress))
            .collect();
        let stack_count = snapshot.stacks.len();
        for stack in snapshot.stacks {
            if stack.entries.is_empty() {
                return Err(HabitError::validation(format!(
                    "stored stack `{}` has no entries",
                    stack.id
                )));
            }
            let mut progress = records.remove(&stack.id).unwrap_or_else(|| {
                warn!(stack_id = %stack.id, "stored stack has no progress, starting from zero");
                Progress::new(stack.id.clone(), now)
            });
            if progress.longest_streak < progress.current_streak {
                return Err(HabitError::validation(format!(
                    "stored progress for `{}` has longest_streak below current_streak",
                    stack.id
                )));
            }
            check_rate(progress.completion_rate)?;
            progress.completion_rate = stack.completion_rate();
            self.progress.restore(progress);
            self.stacks.insert(stack)?;
        }
        for orphan in records.keys() {
            warn!(stack_id = %orphan, "dropping stored progress for unknown stack");
        }
        info!(stacks = stack_count, "state restored from snapshot");
        Ok(())
    }
}
