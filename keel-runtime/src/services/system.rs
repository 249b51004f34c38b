use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::db::{Database, EventCollection, StorageError};
use crate::scheduler::{Scheduler, SchedulerStats};

/// Aggregated runtime health for the admin surface.
#[derive(Debug, Serialize)]
pub struct SystemStats {
    /// Collection name -> document count.
    pub collections: BTreeMap<String, u64>,
    pub events: u64,
    pub scheduler: SchedulerStats,
}

/// Read-only introspection over the database and the scheduler.
pub struct SystemService {
    database: Arc<Database>,
    scheduler: Arc<Scheduler>,
}

impl SystemService {
    pub fn new(database: Arc<Database>, scheduler: Arc<Scheduler>) -> Self {
        Self { database, scheduler }
    }

    pub async fn stats(&self) -> Result<SystemStats, StorageError> {
        Ok(SystemStats {
            collections: self.database.collection_counts().await?,
            events: self.database.events.count(None).await?,
            scheduler: self.scheduler.stats(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DocumentCollection, EventRecord};
    use std::time::Duration;

    #[tokio::test]
    async fn stats_reflect_collections_and_scheduler() {
        let database = Arc::new(Database::in_memory());
        database
            .settings
            .upsert_value("k", serde_json::json!(1))
            .await
            .unwrap();
        database.events.insert(EventRecord::new("boot", None)).await.unwrap();

        let scheduler = Arc::new(Scheduler::new());
        scheduler
            .add_task("t", Duration::from_secs(5), || async { Ok(()) })
            .unwrap();

        let service = SystemService::new(database, scheduler);
        let stats = service.stats().await.unwrap();
        assert_eq!(stats.collections.get("settings"), Some(&1));
        assert_eq!(stats.events, 1);
        assert!(!stats.scheduler.running);
        assert_eq!(stats.scheduler.tasks.len(), 1);
        assert_eq!(stats.scheduler.tasks[0].name, "t");
    }
}
