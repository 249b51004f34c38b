//! Built-in services constructed by the orchestrator with direct
//! dependencies. They are ordinary context consumers and scheduled-job
//! providers, not members of the user's service registry.

mod event;
mod notifier;
mod proxy;
mod system;

pub use event::EventService;
pub use notifier::{NotificationSender, NotifierService, NotifyError, TelegramSender};
pub use proxy::{HttpProxySource, ProxyService, ProxySource};
pub use system::{SystemService, SystemStats};
