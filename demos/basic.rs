//! Minimal keel application: one service with a periodic job that advances a
//! persisted counter in the state record.
//!
//! Run with: cargo run --example basic

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use keel::{Context, ContextCell, Core, CoreConfig, FieldSpec, FieldValue, Schema, Service};

struct BlockService {
    ctx: ContextCell,
}

impl BlockService {
    fn new() -> Arc<Self> {
        Arc::new(Self { ctx: ContextCell::new() })
    }

    async fn process_next_block(ctx: &Context) -> anyhow::Result<()> {
        let current = ctx.state().get_i64("processed_block").unwrap_or(0);
        ctx.state()
            .set("processed_block", FieldValue::Integer(current + 1))
            .await?;
        println!("processed block {}", current + 1);
        Ok(())
    }
}

#[async_trait]
impl Service for BlockService {
    fn name(&self) -> &'static str {
        "block"
    }

    fn context_cell(&self) -> &ContextCell {
        &self.ctx
    }

    async fn on_start(&self) -> anyhow::Result<()> {
        println!("block service starting");
        Ok(())
    }

    async fn on_stop(&self) -> anyhow::Result<()> {
        println!("block service stopping");
        Ok(())
    }

    async fn configure_scheduler(&self) -> anyhow::Result<()> {
        let ctx = self.context()?;
        let task_ctx = ctx.clone();
        ctx.scheduler()
            .add_task("block:process_next", Duration::from_secs(2), move || {
                let ctx = task_ctx.clone();
                async move { BlockService::process_next_block(&ctx).await }
            })?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut config = CoreConfig::new("basic-demo");
    config.debug = true;

    let core = Core::builder(config)
        .state_schema(
            Schema::new("state").field(FieldSpec::integer("processed_block", 0, "last processed block")),
        )
        .service(BlockService::new())
        .init()
        .await?;

    core.startup().await?;
    tokio::time::sleep(Duration::from_secs(7)).await;

    let stats = core.system().stats().await?;
    println!("scheduler stats: {}", serde_json::to_string_pretty(&stats.scheduler)?);

    core.shutdown().await?;
    std::process::exit(0);
}
