use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::task::{SchedulerStats, TaskAction, TaskEntry, TaskSnapshot};
use super::SchedulerError;

struct RunState {
    stop_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

/// Named periodic tasks, each driven by its own interval loop.
///
/// Tasks are registered while the scheduler is stopped and picked up by the
/// next `start`. `stop` signals every loop to finish its current iteration
/// and joins them, so after it returns no task body is executing.
pub struct Scheduler {
    tasks: Mutex<HashMap<String, Arc<TaskEntry>>>,
    started: std::sync::atomic::AtomicBool,
    run_state: tokio::sync::Mutex<Option<RunState>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            started: std::sync::atomic::AtomicBool::new(false),
            run_state: tokio::sync::Mutex::new(None),
        }
    }

    /// Register a periodic task. The first run happens one `interval` after
    /// `start`, never immediately.
    pub fn add_task<F, Fut>(&self, name: &str, interval: Duration, action: F) -> Result<(), SchedulerError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        if interval.is_zero() {
            return Err(SchedulerError::InvalidInterval(name.to_string()));
        }
        let boxed: TaskAction = Arc::new(move || action().boxed());
        let mut tasks = lock(&self.tasks);
        if tasks.contains_key(name) {
            return Err(SchedulerError::DuplicateTask(name.to_string()));
        }
        tasks.insert(
            name.to_string(),
            Arc::new(TaskEntry::new(name.to_string(), interval, boxed)),
        );
        Ok(())
    }

    /// Remove every registered task. The scheduler must be stopped first.
    pub fn clear_tasks(&self) -> Result<(), SchedulerError> {
        if self.is_running() {
            return Err(SchedulerError::IllegalState("clear_tasks requires a stopped scheduler"));
        }
        lock(&self.tasks).clear();
        Ok(())
    }

    /// Spawn one loop per registered task. No-op when already started.
    pub async fn start(&self) {
        let mut run_state = self.run_state.lock().await;
        if run_state.is_some() {
            return;
        }
        let (stop_tx, stop_rx) = watch::channel(false);
        let entries: Vec<Arc<TaskEntry>> = lock(&self.tasks).values().cloned().collect();
        let handles = entries
            .into_iter()
            .map(|entry| tokio::spawn(run_loop(entry, stop_rx.clone())))
            .collect();
        *run_state = Some(RunState { stop_tx, handles });
        self.started.store(true, Ordering::SeqCst);
        info!(tasks = lock(&self.tasks).len(), "scheduler started");
    }

    /// Signal every loop to halt after its current iteration and wait for
    /// full quiescence. Idempotent.
    pub async fn stop(&self) {
        let mut run_state = self.run_state.lock().await;
        let Some(state) = run_state.take() else {
            return;
        };
        let _ = state.stop_tx.send(true);
        for handle in state.handles {
            // A panicking body is already counted by the loop; a JoinError
            // here only means the loop itself unwound.
            if let Err(err) = handle.await {
                error!(error = %err, "task loop did not shut down cleanly");
            }
        }
        self.started.store(false, Ordering::SeqCst);
        info!("scheduler stopped");
    }

    /// Whether `start` has been called without a matching `stop`. Per-task
    /// execution state is visible through [`Scheduler::snapshot`].
    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn task_names(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.tasks).keys().cloned().collect();
        names.sort();
        names
    }

    pub fn task_count(&self) -> usize {
        lock(&self.tasks).len()
    }

    /// Per-task counters and flags, sorted by name.
    pub fn snapshot(&self) -> Vec<TaskSnapshot> {
        let mut tasks: Vec<TaskSnapshot> = lock(&self.tasks).values().map(|e| e.snapshot()).collect();
        tasks.sort_by(|a, b| a.name.cmp(&b.name));
        tasks
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            running: self.is_running(),
            tasks: self.snapshot(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One task's tick loop: a fixed-rate interval drives the runs, each body
/// executes on its own spawned task. A tick that lands while the previous
/// body is still running is skipped, not queued, so intervals never stretch
/// with body duration.
async fn run_loop(entry: Arc<TaskEntry>, mut stop_rx: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval_at(
        tokio::time::Instant::now() + entry.interval,
        entry.interval,
    );
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut in_flight: Option<JoinHandle<()>> = None;
    loop {
        tokio::select! {
            _ = stop_rx.changed() => break,
            _ = ticker.tick() => {}
        }
        if entry.running.swap(true, Ordering::SeqCst) {
            debug!(task = %entry.name, "previous invocation still running, tick skipped");
            continue;
        }
        in_flight = Some(tokio::spawn(run_once(entry.clone())));
    }
    // Quiescence: the loop exits only once the last body has finished.
    if let Some(handle) = in_flight {
        if let Err(err) = handle.await {
            error!(task = %entry.name, error = %err, "task body did not finish cleanly");
        }
    }
}

async fn run_once(entry: Arc<TaskEntry>) {
    let outcome = std::panic::AssertUnwindSafe((entry.action)()).catch_unwind().await;
    match outcome {
        Ok(Ok(())) => {
            entry.run_count.fetch_add(1, Ordering::SeqCst);
        }
        Ok(Err(err)) => {
            entry.error_count.fetch_add(1, Ordering::SeqCst);
            error!(task = %entry.name, error = %err, "task failed");
        }
        Err(_) => {
            entry.error_count.fetch_add(1, Ordering::SeqCst);
            error!(task = %entry.name, "task panicked");
        }
    }
    entry.stamp_last_run();
    entry.running.store(false, Ordering::SeqCst);
}
