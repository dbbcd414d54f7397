use chatstore_data::{
    ConfigOverrides, DataError, DataResult, KeyValueStore, MemoryStore, SETTINGS_SLOT,
    SettingsStore, SourceConfig, SourceMode,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name| map.get(name).cloned()
}

// ── SourceMode ──────────────────────────────────────────────────

#[test]
fn mode_parses_known_names() {
    assert_eq!(SourceMode::from("remote"), SourceMode::Remote);
    assert_eq!(SourceMode::from("Hybrid"), SourceMode::Hybrid);
    assert_eq!(SourceMode::from(" local "), SourceMode::Local);
}

#[test]
fn unknown_mode_falls_back_to_local() {
    assert_eq!(SourceMode::from("cloud"), SourceMode::Local);
    let mode: SourceMode = serde_json::from_value(json!("sqlite")).unwrap();
    assert_eq!(mode, SourceMode::Local);
}

#[test]
fn mode_serializes_lowercase() {
    assert_eq!(serde_json::to_value(SourceMode::Hybrid).unwrap(), json!("hybrid"));
    assert_eq!(SourceMode::Remote.to_string(), "remote");
}

// ── SourceConfig ────────────────────────────────────────────────

#[test]
fn defaults() {
    let config = SourceConfig::default();
    assert_eq!(config.mode, SourceMode::Local);
    assert_eq!(config.api_base_url, "http://localhost:9000");
    assert_eq!(config.sync_interval, Duration::from_secs(30));
    assert!(!config.offline_mode);
    assert!(config.sync_on_read);
    assert!(config.sync_on_write);
}

#[test]
fn empty_environment_gives_defaults() {
    assert_eq!(SourceConfig::from_lookup(lookup(&[])), SourceConfig::default());
}

#[test]
fn environment_overrides_every_field() {
    let config = SourceConfig::from_lookup(lookup(&[
        ("CHATSTORE_MODE", "hybrid"),
        ("CHATSTORE_API_URL", "https://api.example.com"),
        ("CHATSTORE_SYNC_INTERVAL_MS", "5000"),
        ("CHATSTORE_OFFLINE_MODE", "true"),
        ("CHATSTORE_SYNC_ON_READ", "false"),
        ("CHATSTORE_SYNC_ON_WRITE", "false"),
    ]));

    assert_eq!(
        config,
        SourceConfig {
            mode: SourceMode::Hybrid,
            api_base_url: "https://api.example.com".to_string(),
            sync_interval: Duration::from_millis(5000),
            offline_mode: true,
            sync_on_read: false,
            sync_on_write: false,
        }
    );
}

#[test]
fn boolean_flags_use_asymmetric_parsing() {
    let config = SourceConfig::from_lookup(lookup(&[
        ("CHATSTORE_OFFLINE_MODE", "yes"),
        ("CHATSTORE_SYNC_ON_READ", "0"),
        ("CHATSTORE_SYNC_ON_WRITE", "FALSE"),
    ]));
    // Offline needs exactly "true"; the sync flags need exactly "false" to
    // turn off.
    assert!(!config.offline_mode);
    assert!(config.sync_on_read);
    assert!(config.sync_on_write);
}

#[test]
fn invalid_interval_keeps_default() {
    let config = SourceConfig::from_lookup(lookup(&[("CHATSTORE_SYNC_INTERVAL_MS", "soon")]));
    assert_eq!(config.sync_interval, Duration::from_secs(30));
}

#[test]
fn config_serializes_camel_case_with_millis() {
    let value = serde_json::to_value(SourceConfig::default()).unwrap();
    assert_eq!(
        value,
        json!({
            "mode": "local",
            "apiBaseUrl": "http://localhost:9000",
            "syncInterval": 30000,
            "offlineMode": false,
            "syncOnRead": true,
            "syncOnWrite": true
        })
    );
}

#[test]
fn merged_applies_only_set_fields() {
    let base = SourceConfig::default();
    let overrides = ConfigOverrides {
        mode: Some(SourceMode::Remote),
        sync_interval: Some(Duration::from_secs(5)),
        ..Default::default()
    };

    let merged = base.merged(&overrides);
    assert_eq!(merged.mode, SourceMode::Remote);
    assert_eq!(merged.sync_interval, Duration::from_secs(5));
    assert_eq!(merged.api_base_url, base.api_base_url);
    assert_eq!(merged.sync_on_write, base.sync_on_write);

    assert!(ConfigOverrides::default().is_empty());
    assert_eq!(base.merged(&ConfigOverrides::default()), base);
}

#[test]
fn partial_overrides_deserialize() {
    let overrides: ConfigOverrides =
        serde_json::from_value(json!({ "offlineMode": true, "syncInterval": 1500 })).unwrap();
    assert_eq!(overrides.offline_mode, Some(true));
    assert_eq!(overrides.sync_interval, Some(Duration::from_millis(1500)));
    assert_eq!(overrides.mode, None);
}

// ── SettingsStore ───────────────────────────────────────────────

#[tokio::test]
async fn settings_load_base_when_nothing_persisted() {
    let store = MemoryStore::new();
    let settings = SettingsStore::load(Arc::new(store), SourceConfig::default()).await;
    assert_eq!(settings.current().await, SourceConfig::default());
}

#[tokio::test]
async fn settings_overlay_persisted_values() {
    let store = MemoryStore::new();
    store
        .write(
            SETTINGS_SLOT,
            serde_json::to_vec(&json!({ "mode": "hybrid", "offlineMode": true })).unwrap(),
        )
        .await
        .unwrap();

    let settings = SettingsStore::load(Arc::new(store), SourceConfig::default()).await;
    let current = settings.current().await;
    assert_eq!(current.mode, SourceMode::Hybrid);
    assert!(current.offline_mode);
    assert_eq!(current.api_base_url, "http://localhost:9000");
}

#[tokio::test]
async fn corrupt_settings_are_ignored() {
    let store = MemoryStore::new();
    store.write(SETTINGS_SLOT, b"{{{".to_vec()).await.unwrap();
    let settings = SettingsStore::load(Arc::new(store), SourceConfig::default()).await;
    assert_eq!(settings.current().await, SourceConfig::default());
}

#[tokio::test]
async fn update_publishes_and_persists() {
    let store = MemoryStore::new();
    let settings = SettingsStore::load(Arc::new(store.clone()), SourceConfig::default()).await;

    let updated = settings.set_mode(SourceMode::Remote).await;
    assert_eq!(updated.mode, SourceMode::Remote);
    assert_eq!(settings.current().await.mode, SourceMode::Remote);

    settings.set_sync_interval(Duration::from_secs(10)).await;
    settings.set_offline_mode(true).await;
    settings.set_sync_on_read(false).await;
    settings.set_sync_on_write(false).await;

    let reloaded = SettingsStore::load(Arc::new(store), SourceConfig::default()).await;
    assert_eq!(
        reloaded.current().await,
        SourceConfig {
            mode: SourceMode::Remote,
            api_base_url: "http://localhost:9000".to_string(),
            sync_interval: Duration::from_secs(10),
            offline_mode: true,
            sync_on_read: false,
            sync_on_write: false,
        }
    );
}

#[tokio::test]
async fn only_changed_settings_are_persisted() {
    let store = MemoryStore::new();
    let old_base = SourceConfig {
        api_base_url: "http://old:9000".to_string(),
        ..SourceConfig::default()
    };
    let settings = SettingsStore::load(Arc::new(store.clone()), old_base).await;
    settings.set_mode(SourceMode::Hybrid).await;

    let persisted: serde_json::Value =
        serde_json::from_slice(&store.read(SETTINGS_SLOT).await.unwrap().unwrap()).unwrap();
    assert_eq!(persisted, json!({ "mode": "hybrid" }));

    // A later environment change still reaches every field the user left alone.
    let new_base = SourceConfig {
        api_base_url: "http://new:9000".to_string(),
        offline_mode: true,
        ..SourceConfig::default()
    };
    let reloaded = SettingsStore::load(Arc::new(store), new_base).await;
    let current = reloaded.current().await;
    assert_eq!(current.mode, SourceMode::Hybrid);
    assert_eq!(current.api_base_url, "http://new:9000");
    assert!(current.offline_mode);
    assert_eq!(reloaded.saved().await, ConfigOverrides::mode(SourceMode::Hybrid));
}

#[test]
fn layered_overrides_prefer_newer_fields() {
    let older = ConfigOverrides {
        mode: Some(SourceMode::Remote),
        offline_mode: Some(true),
        ..Default::default()
    };
    let newer = ConfigOverrides {
        mode: Some(SourceMode::Hybrid),
        sync_on_read: Some(false),
        ..Default::default()
    };
    assert_eq!(
        older.layered(&newer),
        ConfigOverrides {
            mode: Some(SourceMode::Hybrid),
            offline_mode: Some(true),
            sync_on_read: Some(false),
            ..Default::default()
        }
    );
}

#[tokio::test]
async fn update_survives_persist_failure() {
    struct BrokenStore;

    #[async_trait::async_trait]
    impl KeyValueStore for BrokenStore {
        async fn read(&self, _key: &str) -> DataResult<Option<Vec<u8>>> {
            Err(DataError::StorageUnavailable("disk gone".to_string()))
        }
        async fn write(&self, _key: &str, _bytes: Vec<u8>) -> DataResult<()> {
            Err(DataError::StorageUnavailable("disk gone".to_string()))
        }
        async fn remove(&self, _key: &str) -> DataResult<()> {
            Ok(())
        }
    }

    let settings = SettingsStore::load(Arc::new(BrokenStore), SourceConfig::default()).await;
    assert_eq!(settings.current().await, SourceConfig::default());

    settings.set_mode(SourceMode::Hybrid).await;
    assert_eq!(settings.current().await.mode, SourceMode::Hybrid);
}
