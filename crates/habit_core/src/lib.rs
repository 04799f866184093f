pub mod catalog;
pub mod clock;
pub mod coordinator;
pub mod error;
pub mod progress;
pub mod seed;
pub mod service;
pub mod snapshot;
pub mod stack;

pub use crate::coordinator::StackProgress;
pub use crate::error::{HabitError, Result};
pub use crate::service::{HabitService, HabitServiceBuilder};
