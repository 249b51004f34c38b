//! Background scheduler: named periodic tasks, one interval loop per task.

mod scheduler;
mod task;

pub use scheduler::Scheduler;
pub use task::{SchedulerStats, TaskAction, TaskSnapshot};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("task '{0}' is already registered")]
    DuplicateTask(String),
    #[error("scheduler is in an illegal state for this operation: {0}")]
    IllegalState(&'static str),
    #[error("task '{0}' has a zero interval")]
    InvalidInterval(String),
}
