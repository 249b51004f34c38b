//! End-to-end lifecycle behavior: service ordering, scheduler
//! reinitialization exclusivity, fail-fast startup.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use keel_runtime::{ContextCell, Core, CoreConfig, CoreError, Phase, Service};

type CallLog = Arc<Mutex<Vec<String>>>;

struct Recorder {
    name: &'static str,
    log: CallLog,
    ctx: ContextCell,
    fail_on_start: bool,
}

impl Recorder {
    fn new(name: &'static str, log: CallLog) -> Arc<Self> {
        Arc::new(Self {
            name,
            log,
            ctx: ContextCell::new(),
            fail_on_start: false,
        })
    }

    fn failing(name: &'static str, log: CallLog) -> Arc<Self> {
        Arc::new(Self {
            name,
            log,
            ctx: ContextCell::new(),
            fail_on_start: true,
        })
    }

    fn push(&self, event: &str) {
        self.log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(format!("{}:{}", self.name, event));
    }
}

#[async_trait]
impl Service for Recorder {
    fn name(&self) -> &'static str {
        self.name
    }

    fn context_cell(&self) -> &ContextCell {
        &self.ctx
    }

    async fn on_start(&self) -> anyhow::Result<()> {
        self.push("start");
        if self.fail_on_start {
            anyhow::bail!("refusing to start")
        }
        Ok(())
    }

    async fn on_stop(&self) -> anyhow::Result<()> {
        self.push("stop");
        Ok(())
    }

    async fn configure_scheduler(&self) -> anyhow::Result<()> {
        self.push("configure");
        Ok(())
    }
}

fn debug_config() -> CoreConfig {
    let mut config = CoreConfig::new("lifecycle-test");
    config.debug = true;
    config
}

fn drain(log: &CallLog) -> Vec<String> {
    log.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
}

#[tokio::test]
async fn startup_and_shutdown_visit_services_in_declared_and_reverse_order() {
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    let core = Core::builder(debug_config())
        .service(Recorder::new("a", log.clone()))
        .service(Recorder::new("b", log.clone()))
        .service(Recorder::new("c", log.clone()))
        .init()
        .await
        .unwrap();

    core.startup().await.unwrap();
    assert_eq!(
        drain(&log),
        vec![
            "a:start", "b:start", "c:start",
            "a:configure", "b:configure", "c:configure",
        ]
    );

    log.lock().unwrap().clear();
    core.shutdown().await.unwrap();
    assert_eq!(drain(&log), vec!["c:stop", "b:stop", "a:stop"]);
}

#[tokio::test]
async fn failing_on_start_aborts_startup_and_propagates() {
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    let core = Core::builder(debug_config())
        .service(Recorder::new("a", log.clone()))
        .service(Recorder::failing("b", log.clone()))
        .service(Recorder::new("c", log.clone()))
        .init()
        .await
        .unwrap();

    let err = core.startup().await.unwrap_err();
    assert!(matches!(err, CoreError::Service { service: "b", .. }));
    // "c" was never started; no rollback for "a".
    assert_eq!(drain(&log), vec!["a:start", "b:start"]);
    assert_ne!(core.phase(), Phase::Running);
    assert!(!core.scheduler().is_running());

    // Shutdown is still the exit path after a failed startup.
    core.shutdown().await.unwrap();
    assert_eq!(core.phase(), Phase::Stopped);
}

struct IntervalJobService {
    ctx: ContextCell,
    ticks: Arc<AtomicUsize>,
}

#[async_trait]
impl Service for IntervalJobService {
    fn name(&self) -> &'static str {
        "jobs"
    }

    fn context_cell(&self) -> &ContextCell {
        &self.ctx
    }

    async fn configure_scheduler(&self) -> anyhow::Result<()> {
        let ctx = self.context()?;
        let ticks = self.ticks.clone();
        ctx.scheduler()
            .add_task("jobs:tick", Duration::from_secs(1), move || {
                let ticks = ticks.clone();
                async move {
                    ticks.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })?;
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn service_registered_tasks_run_after_startup() {
    let ticks = Arc::new(AtomicUsize::new(0));
    let core = Core::builder(debug_config())
        .service(Arc::new(IntervalJobService {
            ctx: ContextCell::new(),
            ticks: ticks.clone(),
        }))
        .init()
        .await
        .unwrap();
    core.startup().await.unwrap();
    assert_eq!(core.scheduler().task_names(), vec!["jobs:tick"]);

    for _ in 0..7 {
        tokio::time::advance(Duration::from_millis(500)).await;
        tokio::task::yield_now().await;
    }
    assert_eq!(ticks.load(Ordering::SeqCst), 3);

    core.shutdown().await.unwrap();
    assert_eq!(ticks.load(Ordering::SeqCst), 3);
}

struct SlowConfigure {
    ctx: ContextCell,
}

#[async_trait]
impl Service for SlowConfigure {
    fn name(&self) -> &'static str {
        "slow"
    }

    fn context_cell(&self) -> &ContextCell {
        &self.ctx
    }

    async fn configure_scheduler(&self) -> anyhow::Result<()> {
        let ctx = self.context()?;
        ctx.scheduler()
            .add_task("slow:work", Duration::from_secs(60), || async { Ok(()) })?;
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_during_reinit_leaves_the_scheduler_stopped() {
    let core = Core::builder(debug_config())
        .service(Arc::new(SlowConfigure { ctx: ContextCell::new() }))
        .init()
        .await
        .unwrap();
    core.startup().await.unwrap();

    let reinit = {
        let core = core.clone();
        tokio::spawn(async move { core.reinit_scheduler().await })
    };
    // Let the reinit get inside its configure hook before pulling the plug.
    tokio::time::sleep(Duration::from_millis(50)).await;
    core.shutdown().await.unwrap();

    assert_eq!(core.phase(), Phase::Stopped);
    assert!(
        !core.scheduler().is_running(),
        "scheduler survived a completed shutdown"
    );
    // The in-flight cycle finished before shutdown took over; a cycle queued
    // after it would get a lifecycle error instead.
    reinit.await.unwrap().unwrap();
}

struct OverlapProbe {
    ctx: ContextCell,
    in_configure: Arc<AtomicBool>,
    overlapped: Arc<AtomicBool>,
}

#[async_trait]
impl Service for OverlapProbe {
    fn name(&self) -> &'static str {
        "probe"
    }

    fn context_cell(&self) -> &ContextCell {
        &self.ctx
    }

    async fn configure_scheduler(&self) -> anyhow::Result<()> {
        if self.in_configure.swap(true, Ordering::SeqCst) {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        let ctx = self.context()?;
        ctx.scheduler()
            .add_task("probe:work", Duration::from_secs(60), || async { Ok(()) })?;
        // Stretch the critical section so a racing reinit would be caught.
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_configure.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reinits_are_serialized() {
    let in_configure = Arc::new(AtomicBool::new(false));
    let overlapped = Arc::new(AtomicBool::new(false));
    let core = Core::builder(debug_config())
        .service(Arc::new(OverlapProbe {
            ctx: ContextCell::new(),
            in_configure: in_configure.clone(),
            overlapped: overlapped.clone(),
        }))
        .init()
        .await
        .unwrap();
    core.startup().await.unwrap();

    let mut reinits = Vec::new();
    for _ in 0..4 {
        let core = core.clone();
        reinits.push(tokio::spawn(async move { core.reinit_scheduler().await }));
    }

    // A third observer polling task names must never see a double-registered
    // set while the reinits churn.
    let observer = {
        let core = core.clone();
        tokio::spawn(async move {
            for _ in 0..50 {
                assert!(core.scheduler().task_count() <= 1, "task set double-populated");
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
    };

    for handle in reinits {
        handle.await.unwrap().unwrap();
    }
    observer.await.unwrap();

    assert!(!overlapped.load(Ordering::SeqCst), "configure_scheduler hooks interleaved");
    assert_eq!(core.scheduler().task_names(), vec!["probe:work"]);
    assert!(core.scheduler().is_running());

    core.shutdown().await.unwrap();
}
