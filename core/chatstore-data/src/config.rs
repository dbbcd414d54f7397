//! Source configuration and persisted settings.
//!
//! The configuration is built once at startup from the environment, then
//! overlaid with whatever the user last persisted. The factory reads the
//! live value on every construction; sources already built keep the
//! configuration they were built with.

use crate::error::{DataError, DataResult};
use crate::store::KeyValueStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Slot under which settings are persisted.
pub const SETTINGS_SLOT: &str = "dataSourceConfig";

/// Default API base URL.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:9000";

/// Default interval between periodic resyncs.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Which kind of source the factory builds.
///
/// Any unrecognized name maps to [`SourceMode::Local`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum SourceMode {
    #[default]
    Local,
    Remote,
    Hybrid,
}

impl SourceMode {
    /// The mode's lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceMode::Local => "local",
            SourceMode::Remote => "remote",
            SourceMode::Hybrid => "hybrid",
        }
    }
}

impl From<&str> for SourceMode {
    fn from(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "remote" => SourceMode::Remote,
            "hybrid" => SourceMode::Hybrid,
            "local" => SourceMode::Local,
            other => {
                warn!(mode = other, "unknown data source mode; using local");
                SourceMode::Local
            }
        }
    }
}

impl From<String> for SourceMode {
    fn from(name: String) -> Self {
        SourceMode::from(name.as_str())
    }
}

impl fmt::Display for SourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration consumed by the source factory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceConfig {
    pub mode: SourceMode,
    pub api_base_url: String,
    /// Interval between periodic resyncs, serialized in milliseconds.
    #[serde(with = "duration_ms")]
    pub sync_interval: Duration,
    pub offline_mode: bool,
    pub sync_on_read: bool,
    pub sync_on_write: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            mode: SourceMode::Local,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            sync_interval: DEFAULT_SYNC_INTERVAL,
            offline_mode: false,
            sync_on_read: true,
            sync_on_write: true,
        }
    }
}

impl SourceConfig {
    /// Builds the configuration from the process environment.
    ///
    /// Call once at startup and pass the result down.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from a variable lookup.
    ///
    /// | Variable | Effect |
    /// |---|---|
    /// | `CHATSTORE_MODE` | `local`, `remote` or `hybrid` |
    /// | `CHATSTORE_API_URL` | API base URL |
    /// | `CHATSTORE_SYNC_INTERVAL_MS` | resync interval in milliseconds |
    /// | `CHATSTORE_OFFLINE_MODE` | `true` enables offline mode |
    /// | `CHATSTORE_SYNC_ON_READ` | anything but `false` enables |
    /// | `CHATSTORE_SYNC_ON_WRITE` | anything but `false` enables |
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let sync_interval = match lookup("CHATSTORE_SYNC_INTERVAL_MS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(ms) => Duration::from_millis(ms),
                Err(_) => {
                    warn!(value = %raw, "invalid CHATSTORE_SYNC_INTERVAL_MS; using default");
                    defaults.sync_interval
                }
            },
            None => defaults.sync_interval,
        };

        Self {
            mode: lookup("CHATSTORE_MODE")
                .map(SourceMode::from)
                .unwrap_or(defaults.mode),
            api_base_url: lookup("CHATSTORE_API_URL").unwrap_or(defaults.api_base_url),
            sync_interval,
            offline_mode: lookup("CHATSTORE_OFFLINE_MODE").is_some_and(|v| v == "true"),
            sync_on_read: lookup("CHATSTORE_SYNC_ON_READ").is_none_or(|v| v != "false"),
            sync_on_write: lookup("CHATSTORE_SYNC_ON_WRITE").is_none_or(|v| v != "false"),
        }
    }

    /// Returns a copy with `overrides` applied.
    pub fn merged(&self, overrides: &ConfigOverrides) -> Self {
        Self {
            mode: overrides.mode.unwrap_or(self.mode),
            api_base_url: overrides
                .api_base_url
                .clone()
                .unwrap_or_else(|| self.api_base_url.clone()),
            sync_interval: overrides.sync_interval.unwrap_or(self.sync_interval),
            offline_mode: overrides.offline_mode.unwrap_or(self.offline_mode),
            sync_on_read: overrides.sync_on_read.unwrap_or(self.sync_on_read),
            sync_on_write: overrides.sync_on_write.unwrap_or(self.sync_on_write),
        }
    }
}

/// A partial configuration. Unset fields leave the base value alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<SourceMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", with = "option_duration_ms")]
    pub sync_interval: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offline_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_on_read: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_on_write: Option<bool>,
}

impl ConfigOverrides {
    /// Overrides only the mode.
    pub fn mode(mode: SourceMode) -> Self {
        Self {
            mode: Some(mode),
            ..Default::default()
        }
    }

    /// Returns true if no field is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Returns a copy with every field `newer` sets taking precedence.
    pub fn layered(&self, newer: &ConfigOverrides) -> Self {
        Self {
            mode: newer.mode.or(self.mode),
            api_base_url: newer.api_base_url.clone().or_else(|| self.api_base_url.clone()),
            sync_interval: newer.sync_interval.or(self.sync_interval),
            offline_mode: newer.offline_mode.or(self.offline_mode),
            sync_on_read: newer.sync_on_read.or(self.sync_on_read),
            sync_on_write: newer.sync_on_write.or(self.sync_on_write),
        }
    }
}

/// The live, persisted source configuration.
///
/// Only the fields a user explicitly set are persisted. Everything else
/// keeps following the base configuration on the next load.
pub struct SettingsStore {
    store: Arc<dyn KeyValueStore>,
    state: RwLock<Settings>,
}

struct Settings {
    base: SourceConfig,
    saved: ConfigOverrides,
    current: SourceConfig,
}

impl SettingsStore {
    /// Loads persisted settings on top of `base`.
    ///
    /// Missing or unreadable settings leave `base` untouched.
    pub async fn load(store: Arc<dyn KeyValueStore>, base: SourceConfig) -> Self {
        let saved = match store.read(SETTINGS_SLOT).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<ConfigOverrides>(&bytes) {
                Ok(saved) => saved,
                Err(e) => {
                    warn!(error = %e, "failed to parse persisted data source config");
                    ConfigOverrides::default()
                }
            },
            Ok(None) => ConfigOverrides::default(),
            Err(e) => {
                warn!(error = %e, "failed to load data source config");
                ConfigOverrides::default()
            }
        };

        Self {
            store,
            state: RwLock::new(Settings {
                current: base.merged(&saved),
                base,
                saved,
            }),
        }
    }

    /// Returns the current configuration.
    pub async fn current(&self) -> SourceConfig {
        self.state.read().await.current.clone()
    }

    /// Returns the overrides persisted so far.
    pub async fn saved(&self) -> ConfigOverrides {
        self.state.read().await.saved.clone()
    }

    /// Applies `overrides`, publishes the result and persists every
    /// override set so far.
    ///
    /// A persistence failure is logged; the new configuration stays in
    /// effect for this process.
    pub async fn update(&self, overrides: ConfigOverrides) -> SourceConfig {
        let (updated, saved) = {
            let mut state = self.state.write().await;
            state.saved = state.saved.layered(&overrides);
            state.current = state.base.merged(&state.saved);
            (state.current.clone(), state.saved.clone())
        };

        if let Err(e) = self.persist(&saved).await {
            warn!(error = %e, "failed to save data source config");
        } else {
            info!(mode = %updated.mode, offline = updated.offline_mode, "data source config updated");
        }
        updated
    }

    pub async fn set_mode(&self, mode: SourceMode) -> SourceConfig {
        self.update(ConfigOverrides::mode(mode)).await
    }

    pub async fn set_offline_mode(&self, offline_mode: bool) -> SourceConfig {
        self.update(ConfigOverrides {
            offline_mode: Some(offline_mode),
            ..Default::default()
        })
        .await
    }

    pub async fn set_sync_interval(&self, sync_interval: Duration) -> SourceConfig {
        self.update(ConfigOverrides {
            sync_interval: Some(sync_interval),
            ..Default::default()
        })
        .await
    }

    pub async fn set_sync_on_read(&self, sync_on_read: bool) -> SourceConfig {
        self.update(ConfigOverrides {
            sync_on_read: Some(sync_on_read),
            ..Default::default()
        })
        .await
    }

    pub async fn set_sync_on_write(&self, sync_on_write: bool) -> SourceConfig {
        self.update(ConfigOverrides {
            sync_on_write: Some(sync_on_write),
            ..Default::default()
        })
        .await
    }

    async fn persist(&self, saved: &ConfigOverrides) -> DataResult<()> {
        let bytes = serde_json::to_vec(saved)
            .map_err(|e| DataError::StorageUnavailable(format!("failed to encode config: {e}")))?;
        self.store.write(SETTINGS_SLOT, bytes).await
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

mod option_duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
