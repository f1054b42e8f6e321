//! Typed view of the effective config.
//!
//! Every key has a default, so an empty document is a valid config: in-memory
//! store, daemon on localhost, chained audit trail off until a path is given.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ENV_DAEMON_ADDR;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeskConfig {
    pub daemon: DaemonSection,
    pub store: StoreSection,
    pub subscriptions: SubscriptionsSection,
    pub audit: AuditSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonSection {
    pub addr: String,
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8899".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub backend: StoreBackend,
    /// NAME of the env var holding the Postgres URL.
    pub database_url_env: String,
    pub max_connections: u32,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            database_url_env: "MDK_DATABASE_URL".to_string(),
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionsSection {
    pub change_feed_capacity: usize,
}

impl Default for SubscriptionsSection {
    fn default() -> Self {
        Self {
            change_feed_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSection {
    /// JSONL file for transition events. No path, no audit trail.
    pub path: Option<String>,
    pub hash_chain: bool,
}

impl Default for AuditSection {
    fn default() -> Self {
        Self {
            path: None,
            hash_chain: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// `EnvFilter` directive used when RUST_LOG is unset.
    pub filter: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl DeskConfig {
    pub fn from_json(config_json: &Value) -> Result<Self> {
        let cfg: DeskConfig =
            serde_json::from_value(config_json.clone()).context("config shape invalid")?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.store.max_connections == 0 {
            bail!("CONFIG_INVALID store.max_connections must be > 0");
        }
        if self.subscriptions.change_feed_capacity == 0 {
            bail!("CONFIG_INVALID subscriptions.change_feed_capacity must be > 0");
        }
        if self.store.database_url_env.trim().is_empty() {
            bail!("CONFIG_INVALID store.database_url_env must name an env var");
        }
        Ok(())
    }

    /// Bind address: `MDK_DAEMON_ADDR` if set, else `daemon.addr`.
    pub fn daemon_addr(&self) -> String {
        std::env::var(ENV_DAEMON_ADDR)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| self.daemon.addr.clone())
    }

    /// Read the Postgres URL from the env var named by
    /// `store.database_url_env`. Errors mention the var name only.
    pub fn resolve_database_url(&self) -> Result<String> {
        let name = self.store.database_url_env.as_str();
        match std::env::var(name) {
            Ok(v) if !v.trim().is_empty() => Ok(v),
            Ok(_) => bail!("SECRET_EMPTY env var {name} is set but empty"),
            Err(_) => bail!("SECRET_MISSING env var {name} is not set"),
        }
    }
}
