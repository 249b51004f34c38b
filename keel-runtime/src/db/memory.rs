use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{DocumentCollection, EventCollection, EventRecord, StorageError};

/// In-memory [`DocumentCollection`].
#[derive(Default)]
pub struct MemoryCollection {
    docs: RwLock<HashMap<String, serde_json::Value>>,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document directly, bypassing the typed-store layer. Handy for
    /// simulating pre-existing data in tests.
    pub async fn seed(&self, key: &str, value: serde_json::Value) {
        self.docs.write().await.insert(key.to_string(), value);
    }
}

#[async_trait]
impl DocumentCollection for MemoryCollection {
    async fn find_value(&self, key: &str) -> Result<Option<serde_json::Value>, StorageError> {
        Ok(self.docs.read().await.get(key).cloned())
    }

    async fn upsert_value(&self, key: &str, value: serde_json::Value) -> Result<(), StorageError> {
        self.docs.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn count(&self) -> Result<u64, StorageError> {
        Ok(self.docs.read().await.len() as u64)
    }
}

/// In-memory [`EventCollection`].
#[derive(Default)]
pub struct MemoryEventLog {
    records: RwLock<Vec<EventRecord>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventCollection for MemoryEventLog {
    async fn insert(&self, record: EventRecord) -> Result<(), StorageError> {
        self.records.write().await.push(record);
        Ok(())
    }

    async fn find(&self, category: Option<&str>, limit: usize) -> Result<Vec<EventRecord>, StorageError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .rev()
            .filter(|r| category.is_none_or(|c| r.category == c))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count(&self, category: Option<&str>) -> Result<u64, StorageError> {
        let records = self.records.read().await;
        Ok(records.iter().filter(|r| category.is_none_or(|c| r.category == c)).count() as u64)
    }

    async fn categories(&self) -> Result<Vec<String>, StorageError> {
        let records = self.records.read().await;
        let mut categories: Vec<String> = Vec::new();
        for record in records.iter() {
            if !categories.contains(&record.category) {
                categories.push(record.category.clone());
            }
        }
        categories.sort();
        Ok(categories)
    }
}
