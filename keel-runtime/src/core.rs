//! Lifecycle orchestrator: owns the registry, the scheduler, and the typed
//! stores; sequences startup and shutdown and serializes scheduler
//! reinitialization.

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::CoreConfig;
use crate::context::Context;
use crate::db::{Database, StorageError};
use crate::registry::{ContextError, Service, ServiceRegistry, ServiceRegistryBuilder};
use crate::scheduler::{Scheduler, SchedulerError};
use crate::services::{
    EventService, HttpProxySource, NotificationSender, NotifierService, ProxyService, ProxySource,
    SystemService, TelegramSender,
};
use crate::store::{Schema, StoreError, TypedRecord};

/// Lifecycle phase. `Stopped` is terminal; the process is expected to exit
/// after reaching it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Created,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Created => "created",
            Phase::Starting => "starting",
            Phase::Running => "running",
            Phase::Stopping => "stopping",
            Phase::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error("lifecycle: expected {expected}, runtime is {actual}")]
    Lifecycle { expected: &'static str, actual: Phase },
    #[error("service '{service}' failed: {source}")]
    Service {
        service: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

/// Assembles a [`Core`]. Services are listed in the order startup will visit
/// them; construction never requires the context.
pub struct CoreBuilder {
    config: CoreConfig,
    settings_schema: Schema,
    state_schema: Schema,
    database: Option<Database>,
    services: ServiceRegistryBuilder,
    sender: Option<Arc<dyn NotificationSender>>,
    proxy_source: Option<Arc<dyn ProxySource>>,
}

impl CoreBuilder {
    pub fn settings_schema(mut self, schema: Schema) -> Self {
        self.settings_schema = schema;
        self
    }

    pub fn state_schema(mut self, schema: Schema) -> Self {
        self.state_schema = schema;
        self
    }

    /// The collection bundle built by the bootstrap layer. Defaults to the
    /// in-memory database.
    pub fn database(mut self, database: Database) -> Self {
        self.database = Some(database);
        self
    }

    pub fn service<S: Service>(mut self, service: Arc<S>) -> Self {
        self.services = self.services.register(service);
        self
    }

    pub fn notification_sender(mut self, sender: Arc<dyn NotificationSender>) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn proxy_source(mut self, source: Arc<dyn ProxySource>) -> Self {
        self.proxy_source = Some(source);
        self
    }

    /// Connect storage, load the typed records, build and inject the service
    /// registry. Any failure is fatal: no partial runtime is ever returned.
    pub async fn init(self) -> Result<Arc<Core>, CoreError> {
        let config = self.config;
        let database = Arc::new(self.database.unwrap_or_else(Database::in_memory));
        database.probe().await?;

        let settings = Arc::new(TypedRecord::init_storage(database.settings.clone(), self.settings_schema).await?);
        let state = Arc::new(TypedRecord::init_storage(database.state.clone(), self.state_schema).await?);

        let scheduler = Arc::new(Scheduler::new());
        let events = Arc::new(EventService::new(database.events.clone()));
        let sender = self.sender.unwrap_or_else(|| Arc::new(TelegramSender::new()));
        let notifier = Arc::new(NotifierService::new(settings.clone(), events.clone(), sender));
        let proxy_source = self.proxy_source.unwrap_or_else(|| Arc::new(HttpProxySource::new()));
        let proxy = Arc::new(ProxyService::new(
            settings.clone(),
            state.clone(),
            events.clone(),
            proxy_source,
        ));
        let system = Arc::new(SystemService::new(database.clone(), scheduler.clone()));

        let context = Context::new(
            config.clone(),
            settings.clone(),
            state.clone(),
            database.clone(),
            scheduler.clone(),
            events.clone(),
            notifier.clone(),
        );
        let registry = Arc::new(self.services.build());
        context.attach_registry(&registry);
        registry.inject(&context)?;

        info!(app = %config.app_name, services = registry.len(), "core initialized");
        Ok(Arc::new(Core {
            config,
            database,
            scheduler,
            settings,
            state,
            registry,
            events,
            notifier,
            proxy,
            system,
            context,
            phase: Mutex::new(Phase::Created),
            reinit_lock: tokio::sync::Mutex::new(()),
        }))
    }
}

/// The runtime core. One instance per process, alive for the whole process.
pub struct Core {
    config: CoreConfig,
    database: Arc<Database>,
    scheduler: Arc<Scheduler>,
    settings: Arc<TypedRecord>,
    state: Arc<TypedRecord>,
    registry: Arc<ServiceRegistry>,
    events: Arc<EventService>,
    notifier: Arc<NotifierService>,
    proxy: Arc<ProxyService>,
    system: Arc<SystemService>,
    context: Context,
    phase: Mutex<Phase>,
    reinit_lock: tokio::sync::Mutex<()>,
}

impl Core {
    pub fn builder(config: CoreConfig) -> CoreBuilder {
        CoreBuilder {
            config,
            settings_schema: Schema::new("settings"),
            state_schema: Schema::new("state"),
            database: None,
            services: ServiceRegistry::builder(),
            sender: None,
            proxy_source: None,
        }
    }

    /// Start every service in declared order, then bring the scheduler up.
    /// A failing `on_start` aborts startup and propagates; services already
    /// started are not rolled back (failure here is a configuration error,
    /// the process is expected to exit).
    pub async fn startup(&self) -> Result<(), CoreError> {
        self.transition(&[Phase::Created], Phase::Starting, "created")?;
        for service in self.registry.iter() {
            service.on_start().await.map_err(|source| CoreError::Service {
                service: service.name(),
                source,
            })?;
            debug!(service = service.name(), "service started");
        }
        self.reinit_scheduler().await?;
        if !self.config.debug {
            self.events.record("app_start").await?;
        }
        self.set_phase(Phase::Running);
        info!(app = %self.config.app_name, "app started");
        Ok(())
    }

    /// Exclusive stop/clear/reconfigure/restart cycle. Concurrent callers
    /// queue on the reinit mutex, so two cycles can never interleave their
    /// stop and start phases.
    pub async fn reinit_scheduler(&self) -> Result<(), CoreError> {
        self.ensure_active()?;
        let _guard = self.reinit_lock.lock().await;
        // The runtime may have entered shutdown while this call waited.
        self.ensure_active()?;
        debug!("reinitializing scheduler");
        if self.scheduler.is_running() {
            self.scheduler.stop().await;
        }
        self.scheduler.clear_tasks()?;
        if let Some(interval) = self.config.reinit_policy.refresh_interval() {
            if self.proxy.has_proxy_settings() {
                let proxy = self.proxy.clone();
                self.scheduler.add_task("system:refresh_proxies", interval, move || {
                    let proxy = proxy.clone();
                    async move { proxy.refresh().await.map(|_| ()) }
                })?;
            }
        }
        for service in self.registry.iter() {
            service
                .configure_scheduler()
                .await
                .map_err(|source| CoreError::Service {
                    service: service.name(),
                    source,
                })?;
        }
        self.scheduler.start().await;
        Ok(())
    }

    /// The single graceful-termination path: scheduler quiescence, service
    /// `on_stop` hooks in reverse order, a stop event, storage release.
    /// Terminal; every lifecycle call afterwards fails.
    pub async fn shutdown(&self) -> Result<(), CoreError> {
        self.transition(
            &[Phase::Created, Phase::Starting, Phase::Running],
            Phase::Stopping,
            "an active runtime",
        )?;
        // Wait out any reinit cycle in flight; its restart must not outlive
        // the shutdown, and the phase is already Stopping so no new cycle
        // can begin.
        let _reinit = self.reinit_lock.lock().await;
        self.scheduler.stop().await;
        for service in self.registry.iter_rev() {
            if let Err(err) = service.on_stop().await {
                // Shutdown is unconditional: a failing hook is logged and
                // the remaining services still get their turn.
                error!(service = service.name(), error = %err, "on_stop failed");
            } else {
                debug!(service = service.name(), "service stopped");
            }
        }
        if !self.config.debug {
            if let Err(err) = self.events.record("app_stop").await {
                error!(error = %err, "could not record app_stop event");
            }
        }
        self.database.close();
        self.set_phase(Phase::Stopped);
        info!(app = %self.config.app_name, "app stopped");
        Ok(())
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_phase(&self, phase: Phase) {
        *self.phase.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = phase;
    }

    fn ensure_active(&self) -> Result<(), CoreError> {
        let phase = self.phase();
        if matches!(phase, Phase::Stopping | Phase::Stopped) {
            return Err(CoreError::Lifecycle {
                expected: "an active runtime",
                actual: phase,
            });
        }
        Ok(())
    }

    fn transition(&self, from: &[Phase], to: Phase, expected: &'static str) -> Result<(), CoreError> {
        let mut phase = self.phase.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !from.contains(&phase) {
            return Err(CoreError::Lifecycle { expected, actual: *phase });
        }
        *phase = to;
        Ok(())
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn settings(&self) -> &TypedRecord {
        &self.settings
    }

    pub fn state(&self) -> &TypedRecord {
        &self.state
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn events(&self) -> &EventService {
        &self.events
    }

    pub fn notifier(&self) -> &NotifierService {
        &self.notifier
    }

    pub fn proxy(&self) -> &ProxyService {
        &self.proxy
    }

    pub fn system(&self) -> &SystemService {
        &self.system
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReinitPolicy;
    use crate::store::FieldSpec;

    fn quiet_config() -> CoreConfig {
        let mut config = CoreConfig::new("test-app");
        config.debug = true;
        config
    }

    #[tokio::test]
    async fn init_builds_a_created_core() {
        let core = Core::builder(quiet_config()).init().await.unwrap();
        assert_eq!(core.phase(), Phase::Created);
        assert!(!core.scheduler().is_running());
    }

    #[tokio::test]
    async fn startup_records_event_unless_debug() {
        let core = Core::builder(CoreConfig::new("loud-app")).init().await.unwrap();
        core.startup().await.unwrap();
        assert_eq!(core.events().recent(Some("app_start"), 10).await.unwrap().len(), 1);
        core.shutdown().await.unwrap();
        assert_eq!(core.events().recent(Some("app_stop"), 10).await.unwrap().len(), 1);

        let debug_core = Core::builder(quiet_config()).init().await.unwrap();
        debug_core.startup().await.unwrap();
        assert_eq!(debug_core.events().count().await.unwrap(), 0);
        debug_core.shutdown().await.unwrap();
        assert_eq!(debug_core.events().count().await.unwrap(), 0);
    }

    struct FailingEvents;

    #[async_trait::async_trait]
    impl crate::db::EventCollection for FailingEvents {
        async fn insert(&self, _record: crate::db::EventRecord) -> Result<(), StorageError> {
            Err(StorageError::Backend("events down".into()))
        }
        async fn find(
            &self,
            _category: Option<&str>,
            _limit: usize,
        ) -> Result<Vec<crate::db::EventRecord>, StorageError> {
            Ok(Vec::new())
        }
        async fn count(&self, _category: Option<&str>) -> Result<u64, StorageError> {
            Ok(0)
        }
        async fn categories(&self) -> Result<Vec<String>, StorageError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn failed_start_event_keeps_the_runtime_out_of_running() {
        let database = Database::new(
            Arc::new(crate::db::MemoryCollection::new()),
            Arc::new(crate::db::MemoryCollection::new()),
            Arc::new(FailingEvents),
        );
        let core = Core::builder(CoreConfig::new("loud-app"))
            .database(database)
            .init()
            .await
            .unwrap();
        let err = core.startup().await.unwrap_err();
        assert!(matches!(err, CoreError::Storage(_)));
        assert_ne!(core.phase(), Phase::Running);
        // Shutdown remains the exit path and tolerates the broken event log.
        core.shutdown().await.unwrap();
        assert!(!core.scheduler().is_running());
    }

    #[tokio::test]
    async fn startup_twice_is_a_lifecycle_error() {
        let core = Core::builder(quiet_config()).init().await.unwrap();
        core.startup().await.unwrap();
        assert!(matches!(core.startup().await, Err(CoreError::Lifecycle { .. })));
        core.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_is_terminal() {
        let core = Core::builder(quiet_config()).init().await.unwrap();
        core.startup().await.unwrap();
        core.shutdown().await.unwrap();
        assert_eq!(core.phase(), Phase::Stopped);
        assert!(core.database().is_closed());
        assert!(!core.scheduler().is_running());
        assert!(matches!(core.shutdown().await, Err(CoreError::Lifecycle { .. })));
        assert!(matches!(core.reinit_scheduler().await, Err(CoreError::Lifecycle { .. })));
    }

    #[tokio::test]
    async fn auto_proxy_policy_registers_the_refresh_task() {
        let mut config = quiet_config();
        config.reinit_policy = ReinitPolicy::auto_proxy_refresh();
        let core = Core::builder(config)
            .settings_schema(Schema::new("settings").field(FieldSpec::text("proxies_url", "http://p.test", "")))
            .state_schema(
                Schema::new("state")
                    .field(FieldSpec::structured("proxies", serde_json::json!([]), ""))
                    .field(FieldSpec::text("proxies_updated_at", "", "")),
            )
            .init()
            .await
            .unwrap();
        core.startup().await.unwrap();
        assert_eq!(core.scheduler().task_names(), vec!["system:refresh_proxies"]);
        core.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn auto_proxy_policy_skips_without_schema_fields() {
        let mut config = quiet_config();
        config.reinit_policy = ReinitPolicy::auto_proxy_refresh();
        let core = Core::builder(config).init().await.unwrap();
        core.startup().await.unwrap();
        assert!(core.scheduler().task_names().is_empty());
        core.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn services_only_policy_never_registers_builtin_tasks() {
        let core = Core::builder(quiet_config())
            .settings_schema(Schema::new("settings").field(FieldSpec::text("proxies_url", "http://p.test", "")))
            .state_schema(
                Schema::new("state")
                    .field(FieldSpec::structured("proxies", serde_json::json!([]), ""))
                    .field(FieldSpec::text("proxies_updated_at", "", "")),
            )
            .init()
            .await
            .unwrap();
        core.startup().await.unwrap();
        assert!(core.scheduler().task_names().is_empty());
        core.shutdown().await.unwrap();
    }
}
