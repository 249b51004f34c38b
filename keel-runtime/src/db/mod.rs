//! Document-store access layer.
//!
//! The concrete driver lives outside this crate. The runtime only needs a
//! key-addressable collection per typed record and an append-only collection
//! for lifecycle events, so that is the whole contract here. In-memory
//! implementations back the tests and demos.

mod memory;

pub use memory::{MemoryCollection, MemoryEventLog};

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Failure inside the backing document store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend: {0}")]
    Backend(String),
    #[error("database handle is closed")]
    Closed,
}

/// A key-addressable collection holding one JSON document per field name.
#[async_trait]
pub trait DocumentCollection: Send + Sync {
    /// Fetch the value stored under `key`, if any.
    async fn find_value(&self, key: &str) -> Result<Option<serde_json::Value>, StorageError>;

    /// Insert or replace the value stored under `key`.
    async fn upsert_value(&self, key: &str, value: serde_json::Value) -> Result<(), StorageError>;

    /// Number of documents in the collection.
    async fn count(&self) -> Result<u64, StorageError>;
}

/// One lifecycle/event record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub category: String,
    pub data: Option<serde_json::Value>,
}

impl EventRecord {
    pub fn new(category: &str, data: Option<serde_json::Value>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            category: category.to_string(),
            data,
        }
    }
}

/// Append-only collection for [`EventRecord`]s.
#[async_trait]
pub trait EventCollection: Send + Sync {
    async fn insert(&self, record: EventRecord) -> Result<(), StorageError>;

    /// Newest-first listing, optionally filtered by category.
    async fn find(&self, category: Option<&str>, limit: usize) -> Result<Vec<EventRecord>, StorageError>;

    async fn count(&self, category: Option<&str>) -> Result<u64, StorageError>;

    /// Distinct categories present in the collection.
    async fn categories(&self) -> Result<Vec<String>, StorageError>;
}

/// The bundle of collections the runtime owns for its whole lifetime.
///
/// Built by the bootstrap layer from whatever driver it uses and handed to
/// [`crate::CoreBuilder::database`]. `close` only marks the handle released;
/// driver connections are dropped with the contained `Arc`s.
pub struct Database {
    pub settings: Arc<dyn DocumentCollection>,
    pub state: Arc<dyn DocumentCollection>,
    pub events: Arc<dyn EventCollection>,
    closed: AtomicBool,
}

impl Database {
    pub fn new(
        settings: Arc<dyn DocumentCollection>,
        state: Arc<dyn DocumentCollection>,
        events: Arc<dyn EventCollection>,
    ) -> Self {
        Self {
            settings,
            state,
            events,
            closed: AtomicBool::new(false),
        }
    }

    /// Purely in-memory database, used by tests and demos.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryCollection::new()),
            Arc::new(MemoryCollection::new()),
            Arc::new(MemoryEventLog::new()),
        )
    }

    /// Per-collection document counts, keyed by collection name.
    pub async fn collection_counts(&self) -> Result<BTreeMap<String, u64>, StorageError> {
        let mut counts = BTreeMap::new();
        counts.insert("settings".to_string(), self.settings.count().await?);
        counts.insert("state".to_string(), self.state.count().await?);
        counts.insert("events".to_string(), self.events.count(None).await?);
        Ok(counts)
    }

    /// Verify the collections are reachable. Called once during boot; any
    /// failure here is fatal to `Core::init`.
    pub async fn probe(&self) -> Result<(), StorageError> {
        self.settings.count().await?;
        self.state.count().await?;
        self.events.count(None).await?;
        Ok(())
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        tracing::debug!("database handle released");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
