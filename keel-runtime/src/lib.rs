//! Keel Runtime - Core runtime for embeddable applications
//!
//! This crate provides the runtime infrastructure: the background scheduler,
//! the persistent typed stores, the service registry, and the lifecycle
//! orchestrator that ties them together.

mod config;
mod context;
mod core;
mod db;
mod registry;
mod scheduler;
mod services;
mod store;

// Re-export public API
pub use self::config::{CoreConfig, ReinitPolicy};
pub use self::context::Context;
pub use self::core::{Core, CoreBuilder, CoreError, Phase};
pub use self::db::{
    Database, DocumentCollection, EventCollection, EventRecord, MemoryCollection, MemoryEventLog,
    StorageError,
};
pub use self::registry::{ContextCell, ContextError, Service, ServiceRegistry, ServiceRegistryBuilder};
pub use self::scheduler::{Scheduler, SchedulerError, SchedulerStats, TaskAction, TaskSnapshot};
pub use self::services::{
    EventService, HttpProxySource, NotificationSender, NotifierService, NotifyError, ProxyService,
    ProxySource, SystemService, SystemStats, TelegramSender,
};
pub use self::store::{
    FieldKind, FieldSpec, FieldValue, FieldView, ImportReport, Schema, StoreError, TypedRecord,
};
