use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Serialize;

/// A zero-argument asynchronous task body. Failures are reported through the
/// returned `Result`; the scheduler never lets them propagate further.
pub type TaskAction = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Internal descriptor of one periodic task. Owned by the scheduler, mutated
/// only by its own execution loop.
pub(crate) struct TaskEntry {
    pub(crate) name: String,
    pub(crate) interval: Duration,
    pub(crate) action: TaskAction,
    pub(crate) run_count: AtomicU64,
    pub(crate) error_count: AtomicU64,
    pub(crate) running: AtomicBool,
    // Millis since epoch; 0 means the task has never run.
    last_run_ms: AtomicI64,
}

impl TaskEntry {
    pub(crate) fn new(name: String, interval: Duration, action: TaskAction) -> Self {
        Self {
            name,
            interval,
            action,
            run_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            running: AtomicBool::new(false),
            last_run_ms: AtomicI64::new(0),
        }
    }

    pub(crate) fn stamp_last_run(&self) {
        self.last_run_ms.store(Utc::now().timestamp_millis(), Ordering::SeqCst);
    }

    pub(crate) fn last_run(&self) -> Option<DateTime<Utc>> {
        match self.last_run_ms.load(Ordering::SeqCst) {
            0 => None,
            ms => DateTime::from_timestamp_millis(ms),
        }
    }

    pub(crate) fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            name: self.name.clone(),
            interval: self.interval,
            run_count: self.run_count.load(Ordering::SeqCst),
            error_count: self.error_count.load(Ordering::SeqCst),
            last_run: self.last_run(),
            running: self.running.load(Ordering::SeqCst),
        }
    }
}

/// Point-in-time view of one task, safe to hand to stats/UI layers.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub name: String,
    pub interval: Duration,
    pub run_count: u64,
    pub error_count: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub running: bool,
}

/// Point-in-time view of the whole scheduler.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStats {
    pub running: bool,
    pub tasks: Vec<TaskSnapshot>,
}
