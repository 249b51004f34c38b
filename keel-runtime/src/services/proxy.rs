use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use super::event::EventService;
use crate::store::{FieldValue, TypedRecord};

/// Where the proxy list comes from. The HTTP implementation is the normal
/// one; tests supply their own.
#[async_trait]
pub trait ProxySource: Send + Sync {
    async fn fetch(&self, url: &str) -> anyhow::Result<String>;
}

pub struct HttpProxySource {
    client: reqwest::Client,
}

impl Default for HttpProxySource {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpProxySource {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

#[async_trait]
impl ProxySource for HttpProxySource {
    async fn fetch(&self, url: &str) -> anyhow::Result<String> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }
}

/// Keeps the proxy list in the state record fresh. Runs as an ordinary
/// scheduled job when the reinit policy auto-registers it.
pub struct ProxyService {
    settings: Arc<TypedRecord>,
    state: Arc<TypedRecord>,
    events: Arc<EventService>,
    source: Arc<dyn ProxySource>,
    // One refresh at a time, even if a manual trigger races the schedule.
    refresh_lock: tokio::sync::Mutex<()>,
}

impl ProxyService {
    pub fn new(
        settings: Arc<TypedRecord>,
        state: Arc<TypedRecord>,
        events: Arc<EventService>,
        source: Arc<dyn ProxySource>,
    ) -> Self {
        Self {
            settings,
            state,
            events,
            source,
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// The schema opted in: settings declare the source url and the state
    /// record has somewhere to put the list and its refresh timestamp.
    pub fn has_proxy_settings(&self) -> bool {
        self.settings.contains("proxies_url")
            && self.state.contains("proxies")
            && self.state.contains("proxies_updated_at")
    }

    /// Fetch, parse, and store the proxy list. Returns the number of proxies
    /// stored. Failures are recorded as events and returned to the caller;
    /// the scheduled wrapper lets them land in the task's error counter.
    pub async fn refresh(&self) -> anyhow::Result<usize> {
        let _guard = self.refresh_lock.lock().await;
        let url = self
            .settings
            .get_str("proxies_url")
            .filter(|u| !u.is_empty())
            .ok_or_else(|| anyhow::anyhow!("proxies_url is not set"))?;
        let body = match self.source.fetch(&url).await {
            Ok(body) => body,
            Err(err) => {
                let _ = self
                    .events
                    .record_with("update_proxies", Some(serde_json::json!({ "error": err.to_string() })))
                    .await;
                return Err(err);
            }
        };
        let proxies: Vec<serde_json::Value> = body
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| serde_json::json!(line))
            .collect();
        let count = proxies.len();
        self.state
            .set("proxies", FieldValue::Structured(serde_json::Value::Array(proxies)))
            .await?;
        self.state
            .set("proxies_updated_at", FieldValue::Text(Utc::now().to_rfc3339()))
            .await?;
        info!(count, "proxy list refreshed");
        Ok(count)
    }
}
