//! Live reconfiguration: a settings change followed by `reinit_scheduler`
//! takes effect without restarting the process.
//!
//! Run with: cargo run --example live-reconfig

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use keel::{ContextCell, Core, CoreConfig, FieldSpec, Schema, Service};

struct ReportService {
    ctx: ContextCell,
}

#[async_trait]
impl Service for ReportService {
    fn name(&self) -> &'static str {
        "report"
    }

    fn context_cell(&self) -> &ContextCell {
        &self.ctx
    }

    async fn configure_scheduler(&self) -> anyhow::Result<()> {
        let ctx = self.context()?;
        if !ctx.settings().get_bool("report_enabled").unwrap_or(false) {
            println!("reports disabled, no task registered");
            return Ok(());
        }
        let interval = ctx.settings().get_i64("report_interval_secs").unwrap_or(5) as u64;
        let task_ctx = ctx.clone();
        ctx.scheduler()
            .add_task("report:emit", Duration::from_secs(interval), move || {
                let ctx = task_ctx.clone();
                async move {
                    ctx.events().record("report_emitted").await?;
                    println!("report emitted");
                    Ok(())
                }
            })?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut config = CoreConfig::new("live-reconfig-demo");
    config.debug = true;

    let core = Core::builder(config)
        .settings_schema(
            Schema::new("settings")
                .field(FieldSpec::boolean("report_enabled", false, "emit periodic reports"))
                .field(FieldSpec::integer("report_interval_secs", 2, "seconds between reports")),
        )
        .service(Arc::new(ReportService { ctx: ContextCell::new() }))
        .init()
        .await?;

    core.startup().await?;
    println!("tasks after startup: {:?}", core.scheduler().task_names());

    // An operator flips the toggle; the scheduler picks it up on reinit.
    core.settings().update("report_enabled", "true").await?;
    core.reinit_scheduler().await?;
    println!("tasks after reinit:  {:?}", core.scheduler().task_names());

    tokio::time::sleep(Duration::from_secs(5)).await;
    println!(
        "report events: {}",
        core.events().category_stats().await?.get("report_emitted").copied().unwrap_or(0)
    );

    core.shutdown().await?;
    std::process::exit(0);
}
