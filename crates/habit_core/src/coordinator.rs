use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::error::{HabitError, Result};
use crate::progress::{Progress, ProgressTracker};
use crate::stack::{Stack, StackStore};

/// A stack together with the progress record computed from that exact state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StackProgress {
    pub stack: Stack,
    pub progress: Progress,
}

pub struct CompletionCoordinator<'a> {
    stacks: &'a StackStore,
    progress: &'a ProgressTracker,
    clock: &'a dyn Clock,
}

impl<'a> CompletionCoordinator<'a> {
    pub fn new(stacks: &'a StackStore, progress: &'a ProgressTracker, clock: &'a dyn Clock) -> Self {
        Self {
            stacks,
            progress,
            clock,
        }
    }

    /// Flips the first entry for `habit_id` and folds the result into the
    /// stack's progress.
    ///
    /// The slot lock is held for the whole operation, so toggles on one stack
    /// serialize while other stacks proceed. The new stack state is only
    /// written back once the progress recompute succeeded.
    pub fn toggle_habit(&self, stack_id: &str, habit_id: &str) -> Result<StackProgress> {
        let handle = self
            .stacks
            .handle(stack_id)
            .ok_or_else(|| HabitError::not_found("stack", stack_id))?;
        let mut slot = handle.lock();
        if slot.is_removed() {
            return Err(HabitError::not_found("stack", stack_id));
        }

        let mut candidate = slot.stack().clone();
        let was_completed = candidate.is_completed();
        let entry = candidate
            .entries
            .iter_mut()
            .find(|entry| entry.habit_id == habit_id)
            .ok_or_else(|| HabitError::not_found("habit", format!("{stack_id}/{habit_id}")))?;
        entry.completed = !entry.completed;
        let now_completed = entry.completed;

        let all_completed = candidate.is_completed();
        let now = self.clock.now();
        if all_completed && !was_completed {
            candidate.last_completed_at = Some(now);
            info!(%stack_id, "stack completed");
        }

        let progress = self.progress.recompute(&candidate, all_completed, now)?;
        slot.replace(candidate.clone());
        debug!(
            %stack_id,
            %habit_id,
            completed = now_completed,
            rate = progress.completion_rate,
            "habit toggled"
        );
        Ok(StackProgress {
            stack: candidate,
            progress,
        })
    }
}
