//! # Keel - Embeddable Application Runtime
//!
//! Keel boots a process, wires a set of pluggable services to a shared
//! runtime context, persists typed configuration and state in a document
//! store, and runs periodic background jobs whose schedule can be safely
//! reconfigured while the process is live.
//!
//! ## Features
//!
//! - **Background scheduler**: named periodic tasks with run/error counters,
//!   global start/stop with quiescence, safe task-set replacement
//! - **Typed stores**: schema-constrained settings and state records with
//!   per-field validation, hide/persist flags, and TOML export/import
//! - **Service registry**: services listed in declared order, context
//!   injected once, deterministic startup/shutdown ordering
//! - **Live reconfiguration**: `reinit_scheduler` applies configuration
//!   changes without a restart, serialized so concurrent calls never race
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use keel::{Core, CoreConfig, ContextCell, Service};
//!
//! struct Heartbeat {
//!     ctx: ContextCell,
//! }
//!
//! #[async_trait::async_trait]
//! impl Service for Heartbeat {
//!     fn name(&self) -> &'static str {
//!         "heartbeat"
//!     }
//!
//!     fn context_cell(&self) -> &ContextCell {
//!         &self.ctx
//!     }
//!
//!     async fn configure_scheduler(&self) -> anyhow::Result<()> {
//!         let ctx = self.context()?;
//!         let events = ctx.clone();
//!         ctx.scheduler().add_task("heartbeat:beat", Duration::from_secs(60), move || {
//!             let ctx = events.clone();
//!             async move {
//!                 ctx.events().record("heartbeat").await?;
//!                 Ok(())
//!             }
//!         })?;
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let core = Core::builder(CoreConfig::new("demo"))
//!         .service(Arc::new(Heartbeat { ctx: ContextCell::new() }))
//!         .init()
//!         .await?;
//!     core.startup().await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     core.shutdown().await?;
//!     std::process::exit(0);
//! }
//! ```
//!
//! ## Configuration
//!
//! Boot configuration loads from TOML layered under `KEEL_`-prefixed
//! environment variables:
//!
//! ```toml
//! app_name = "demo"
//! database_url = "mongodb://localhost/demo"
//!
//! [reinit_policy]
//! mode = "auto_proxy_refresh"
//! interval_secs = 60
//! ```
//!
//! Operator-editable settings live in the typed store instead, where each
//! field is declared with a kind, a description, and hide/persist flags.

// Re-export the runtime API
pub use keel_runtime::{
    Context, ContextCell, ContextError, Core, CoreBuilder, CoreConfig, CoreError, Database,
    DocumentCollection, EventCollection, EventRecord, EventService, FieldKind, FieldSpec,
    FieldValue, FieldView, HttpProxySource, ImportReport, MemoryCollection, MemoryEventLog,
    NotificationSender, NotifierService, NotifyError, Phase, ProxyService, ProxySource,
    ReinitPolicy, Schema, Scheduler, SchedulerError, SchedulerStats, Service, ServiceRegistry,
    ServiceRegistryBuilder, StorageError, StoreError, SystemService, SystemStats, TaskAction,
    TaskSnapshot, TypedRecord,
};

// Make the runtime crate reachable for callers that want the module paths
pub use keel_runtime;
