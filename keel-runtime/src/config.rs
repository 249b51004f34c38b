//! Boot-time configuration for the runtime itself (as opposed to the
//! operator-editable settings record, which lives in the typed store).

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

fn default_refresh_secs() -> u64 {
    60
}

/// How `reinit_scheduler` populates the task set before asking the services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ReinitPolicy {
    /// Only the services' own `configure_scheduler` hooks register tasks.
    ServicesOnly,
    /// Additionally auto-register the built-in proxy-refresh task whenever
    /// the proxy settings fields are present.
    AutoProxyRefresh {
        #[serde(default = "default_refresh_secs")]
        interval_secs: u64,
    },
}

impl Default for ReinitPolicy {
    fn default() -> Self {
        ReinitPolicy::ServicesOnly
    }
}

impl ReinitPolicy {
    pub fn auto_proxy_refresh() -> Self {
        ReinitPolicy::AutoProxyRefresh {
            interval_secs: default_refresh_secs(),
        }
    }

    pub(crate) fn refresh_interval(&self) -> Option<Duration> {
        match self {
            ReinitPolicy::ServicesOnly => None,
            ReinitPolicy::AutoProxyRefresh { interval_secs } => Some(Duration::from_secs(*interval_secs)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    pub app_name: String,
    /// Connection string consumed by the bootstrap layer that builds the
    /// [`crate::db::Database`] handle; opaque to the runtime.
    #[serde(default)]
    pub database_url: String,
    /// Interactive/developer mode: verbose logging, no lifecycle events.
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub reinit_policy: ReinitPolicy,
}

impl CoreConfig {
    pub fn new(app_name: &str) -> Self {
        Self {
            app_name: app_name.to_string(),
            database_url: String::new(),
            debug: false,
            reinit_policy: ReinitPolicy::default(),
        }
    }

    /// Load from a TOML file layered under `KEEL_`-prefixed environment
    /// variables (environment wins, e.g. `KEEL_DATABASE_URL`).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()).format(FileFormat::Toml))
            .add_source(Environment::with_prefix("KEEL").separator("__"))
            .build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reinit_policy_defaults_to_services_only() {
        let config: CoreConfig = toml::from_str("app_name = \"demo\"").unwrap();
        assert_eq!(config.reinit_policy, ReinitPolicy::ServicesOnly);
        assert!(!config.debug);
    }

    #[test]
    fn auto_proxy_refresh_parses_with_default_interval() {
        let config: CoreConfig = toml::from_str(
            "app_name = \"demo\"\n[reinit_policy]\nmode = \"auto_proxy_refresh\"\n",
        )
        .unwrap();
        assert_eq!(config.reinit_policy.refresh_interval(), Some(Duration::from_secs(60)));
    }
}
