use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::error;

use super::event::EventService;
use crate::store::TypedRecord;

/// Why an outbound notification did not go out. Always returned as a value,
/// never raised past the caller.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification settings are missing or incomplete")]
    NotConfigured,
    #[error("send failed: {0}")]
    Send(String),
}

/// The external messaging collaborator. Implementations own the transport;
/// the runtime only sees message ids or an error value.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, token: &str, chat_id: i64, message: &str) -> anyhow::Result<Vec<i64>>;
}

/// Telegram Bot API sender.
pub struct TelegramSender {
    client: reqwest::Client,
}

impl Default for TelegramSender {
    fn default() -> Self {
        Self::new()
    }
}

impl TelegramSender {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

#[async_trait]
impl NotificationSender for TelegramSender {
    async fn send(&self, token: &str, chat_id: i64, message: &str) -> anyhow::Result<Vec<i64>> {
        let url = format!("https://api.telegram.org/bot{token}/sendMessage");
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "chat_id": chat_id, "text": message }))
            .send()
            .await?
            .error_for_status()?;
        let body: serde_json::Value = response.json().await?;
        let message_id = body
            .pointer("/result/message_id")
            .and_then(serde_json::Value::as_i64)
            .ok_or_else(|| anyhow::anyhow!("response carried no message_id"))?;
        Ok(vec![message_id])
    }
}

/// Sends operator notifications using credentials from the settings record.
/// Failures are logged, written to the event log, and reported as values.
pub struct NotifierService {
    settings: Arc<TypedRecord>,
    events: Arc<EventService>,
    sender: Arc<dyn NotificationSender>,
}

impl NotifierService {
    pub fn new(
        settings: Arc<TypedRecord>,
        events: Arc<EventService>,
        sender: Arc<dyn NotificationSender>,
    ) -> Self {
        Self { settings, events, sender }
    }

    /// A usable token looks like `<id>:<secret>` and the chat id is nonzero.
    pub fn has_notification_settings(&self) -> bool {
        let token_ok = self
            .settings
            .get_str("telegram_token")
            .is_some_and(|t| t.contains(':'));
        let chat_ok = self
            .settings
            .get_i64("telegram_chat_id")
            .is_some_and(|id| id != 0);
        token_ok && chat_ok
    }

    pub async fn send(&self, message: &str) -> Result<Vec<i64>, NotifyError> {
        if !self.has_notification_settings() {
            return Err(NotifyError::NotConfigured);
        }
        // Settings may change between the check and the read.
        let (Some(token), Some(chat_id)) = (
            self.settings.get_str("telegram_token"),
            self.settings.get_i64("telegram_chat_id"),
        ) else {
            return Err(NotifyError::NotConfigured);
        };
        match self.sender.send(&token, chat_id, message).await {
            Ok(message_ids) => Ok(message_ids),
            Err(err) => {
                error!(error = %err, "notification send failed");
                let _ = self
                    .events
                    .record_with(
                        "notify_failed",
                        Some(serde_json::json!({ "error": err.to_string(), "message": message })),
                    )
                    .await;
                Err(NotifyError::Send(err.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryCollection, MemoryEventLog};
    use crate::store::{FieldSpec, Schema, TypedRecord};

    struct FakeSender {
        fail: bool,
    }

    #[async_trait]
    impl NotificationSender for FakeSender {
        async fn send(&self, _token: &str, _chat_id: i64, _message: &str) -> anyhow::Result<Vec<i64>> {
            if self.fail {
                anyhow::bail!("api unreachable")
            }
            Ok(vec![77])
        }
    }

    async fn settings(token: &'static str, chat_id: i64) -> Arc<TypedRecord> {
        let schema = Schema::new("settings")
            .field(FieldSpec::text("telegram_token", token, "bot token").hidden())
            .field(FieldSpec::integer("telegram_chat_id", chat_id, "chat id"));
        Arc::new(
            TypedRecord::init_storage(Arc::new(MemoryCollection::new()), schema)
                .await
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn unconfigured_sender_reports_not_configured() {
        let events = Arc::new(EventService::new(Arc::new(MemoryEventLog::new())));
        let service = NotifierService::new(
            settings("", 0).await,
            events,
            Arc::new(FakeSender { fail: false }),
        );
        assert!(!service.has_notification_settings());
        assert!(matches!(service.send("hi").await, Err(NotifyError::NotConfigured)));
    }

    #[tokio::test]
    async fn send_failure_is_a_value_and_lands_in_the_event_log() {
        let events = Arc::new(EventService::new(Arc::new(MemoryEventLog::new())));
        let service = NotifierService::new(
            settings("12:ab", 5).await,
            events.clone(),
            Arc::new(FakeSender { fail: true }),
        );
        assert!(matches!(service.send("hi").await, Err(NotifyError::Send(_))));
        let logged = events.recent(Some("notify_failed"), 10).await.unwrap();
        assert_eq!(logged.len(), 1);
    }

    #[tokio::test]
    async fn successful_send_returns_message_ids() {
        let events = Arc::new(EventService::new(Arc::new(MemoryEventLog::new())));
        let service = NotifierService::new(
            settings("12:ab", 5).await,
            events.clone(),
            Arc::new(FakeSender { fail: false }),
        );
        assert_eq!(service.send("hi").await.unwrap(), vec![77]);
        assert_eq!(events.count().await.unwrap(), 0);
    }
}
