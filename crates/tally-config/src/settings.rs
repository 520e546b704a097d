//! Typed view over the merged config.
//!
//! Every field has a default, so an empty config is valid. Unknown keys are
//! not rejected here; that is what [`crate::report_unused_keys`] is for.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    pub max_connections: u32,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub max_attempts: u32,
    pub backoff_ms: u64,
    /// Schedule a trailing Full Reconciler pass after every payment.
    pub reconcile_after_payment: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_ms: 10,
            reconcile_after_payment: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonSettings {
    pub addr: String,
    pub heartbeat_secs: u64,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8899".to_string(),
            heartbeat_secs: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotSettings {
    pub out_dir: String,
}

impl Default for SnapshotSettings {
    fn default() -> Self {
        Self {
            out_dir: "snapshots".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub store: StoreSettings,
    pub engine: EngineSettings,
    pub daemon: DaemonSettings,
    pub snapshot: SnapshotSettings,
}

impl Settings {
    pub fn from_json(config_json: &Value) -> Result<Self> {
        let settings: Settings =
            serde_json::from_value(config_json.clone()).context("config does not match settings schema")?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.engine.max_attempts == 0 {
            bail!("CONFIG_INVALID: /engine/max_attempts must be >= 1");
        }
        if self.store.max_connections == 0 {
            bail!("CONFIG_INVALID: /store/max_connections must be >= 1");
        }
        if self.daemon.heartbeat_secs == 0 {
            bail!("CONFIG_INVALID: /daemon/heartbeat_secs must be >= 1");
        }
        if self.snapshot.out_dir.trim().is_empty() {
            bail!("CONFIG_INVALID: /snapshot/out_dir must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let s = Settings::from_json(&serde_json::json!({})).unwrap();
        assert_eq!(s, Settings::default());
        assert_eq!(s.store.backend, StoreBackend::Memory);
        assert!(s.engine.reconcile_after_payment);
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let err = Settings::from_json(&serde_json::json!({"engine": {"max_attempts": 0}})).unwrap_err();
        assert!(err.to_string().contains("/engine/max_attempts"));
    }

    #[test]
    fn unknown_backend_is_rejected() {
        assert!(Settings::from_json(&serde_json::json!({"store": {"backend": "redis"}})).is_err());
    }
}
