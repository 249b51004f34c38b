//! Service registry: an ordered, immutable set of service instances built
//! from explicitly listed constructors, with one-shot context injection.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use thiserror::Error;

use crate::context::Context;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("service context read before injection")]
    Uninitialized,
    #[error("service context injected twice")]
    AlreadyInjected,
}

/// Holds a service's back-reference to the runtime context. Filled exactly
/// once by [`ServiceRegistry::inject`]; reading it earlier is an error that
/// points at a registry-construction bug.
#[derive(Default)]
pub struct ContextCell {
    inner: OnceLock<Context>,
}

impl ContextCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, ctx: Context) -> Result<(), ContextError> {
        self.inner.set(ctx).map_err(|_| ContextError::AlreadyInjected)
    }

    pub fn get(&self) -> Result<Context, ContextError> {
        self.inner.get().cloned().ok_or(ContextError::Uninitialized)
    }
}

/// A pluggable business service. Every capability is individually optional;
/// the default hooks are no-ops.
///
/// Construction must not require the context: the registry injects it after
/// all services exist, so services can reach each other through the context
/// without ordering headaches.
#[async_trait]
pub trait Service: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// The cell the registry fills during injection. Services embed a
    /// [`ContextCell`] and return it here.
    fn context_cell(&self) -> &ContextCell;

    fn context(&self) -> Result<Context, ContextError> {
        self.context_cell().get()
    }

    /// Called once, in declared order, before the scheduler first starts.
    async fn on_start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called once during shutdown, in reverse declared order.
    async fn on_stop(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Re-register the periodic tasks this service needs. Called on every
    /// scheduler reinitialization against an empty task set.
    async fn configure_scheduler(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Ordered collection of services. Immutable after `build` apart from the
/// one-shot context injection.
pub struct ServiceRegistry {
    services: Vec<Arc<dyn Service>>,
}

impl ServiceRegistry {
    pub fn builder() -> ServiceRegistryBuilder {
        ServiceRegistryBuilder { services: Vec::new() }
    }

    /// Bind the context into every service, in declared order.
    pub fn inject(&self, ctx: &Context) -> Result<(), ContextError> {
        for service in &self.services {
            service.context_cell().bind(ctx.clone())?;
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Service>> {
        self.services.iter()
    }

    pub fn iter_rev(&self) -> impl Iterator<Item = &Arc<dyn Service>> {
        self.services.iter().rev()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.services.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// Lists service instances in the order startup will visit them.
pub struct ServiceRegistryBuilder {
    services: Vec<Arc<dyn Service>>,
}

impl ServiceRegistryBuilder {
    pub fn register<S: Service>(mut self, service: Arc<S>) -> Self {
        self.services.push(service);
        self
    }

    pub fn build(self) -> ServiceRegistry {
        ServiceRegistry { services: self.services }
    }
}
