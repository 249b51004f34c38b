//! The shared runtime context: the one object through which services reach
//! configuration, the typed stores, the database, the scheduler, and each
//! other. Exactly one instance exists per process.

use std::sync::{Arc, OnceLock, Weak};

use crate::config::CoreConfig;
use crate::db::Database;
use crate::registry::ServiceRegistry;
use crate::scheduler::Scheduler;
use crate::services::{EventService, NotifierService};
use crate::store::TypedRecord;

struct ContextInner {
    config: CoreConfig,
    settings: Arc<TypedRecord>,
    state: Arc<TypedRecord>,
    database: Arc<Database>,
    scheduler: Arc<Scheduler>,
    events: Arc<EventService>,
    notifier: Arc<NotifierService>,
    // Weak to break the context -> registry -> service -> context cycle.
    registry: OnceLock<Weak<ServiceRegistry>>,
}

/// Cheaply cloneable handle; all clones see the same runtime.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context").finish_non_exhaustive()
    }
}

impl Context {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: CoreConfig,
        settings: Arc<TypedRecord>,
        state: Arc<TypedRecord>,
        database: Arc<Database>,
        scheduler: Arc<Scheduler>,
        events: Arc<EventService>,
        notifier: Arc<NotifierService>,
    ) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                config,
                settings,
                state,
                database,
                scheduler,
                events,
                notifier,
                registry: OnceLock::new(),
            }),
        }
    }

    pub(crate) fn attach_registry(&self, registry: &Arc<ServiceRegistry>) {
        // Ignore a second call; the orchestrator attaches exactly once.
        let _ = self.inner.registry.set(Arc::downgrade(registry));
    }

    pub fn config(&self) -> &CoreConfig {
        &self.inner.config
    }

    pub fn settings(&self) -> &TypedRecord {
        &self.inner.settings
    }

    pub fn state(&self) -> &TypedRecord {
        &self.inner.state
    }

    pub fn database(&self) -> &Database {
        &self.inner.database
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.inner.scheduler
    }

    pub fn events(&self) -> &EventService {
        &self.inner.events
    }

    pub fn notifier(&self) -> &NotifierService {
        &self.inner.notifier
    }

    /// The registry, if the runtime still holds it.
    pub fn registry(&self) -> Option<Arc<ServiceRegistry>> {
        self.inner.registry.get().and_then(Weak::upgrade)
    }
}
