use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::db::{EventCollection, EventRecord, StorageError};

/// Append-only system/event log: lifecycle markers, background-job outcomes,
/// anything an operator wants to find later.
pub struct EventService {
    events: Arc<dyn EventCollection>,
}

impl EventService {
    pub fn new(events: Arc<dyn EventCollection>) -> Self {
        Self { events }
    }

    pub async fn record(&self, category: &str) -> Result<(), StorageError> {
        self.record_with(category, None).await
    }

    pub async fn record_with(
        &self,
        category: &str,
        data: Option<serde_json::Value>,
    ) -> Result<(), StorageError> {
        debug!(category, ?data, "event recorded");
        self.events.insert(EventRecord::new(category, data)).await
    }

    /// Newest-first, optionally filtered by category.
    pub async fn recent(
        &self,
        category: Option<&str>,
        limit: usize,
    ) -> Result<Vec<EventRecord>, StorageError> {
        self.events.find(category, limit).await
    }

    /// Per-category record counts.
    pub async fn category_stats(&self) -> Result<BTreeMap<String, u64>, StorageError> {
        let mut stats = BTreeMap::new();
        for category in self.events.categories().await? {
            let count = self.events.count(Some(&category)).await?;
            stats.insert(category, count);
        }
        Ok(stats)
    }

    pub async fn count(&self) -> Result<u64, StorageError> {
        self.events.count(None).await
    }
}
