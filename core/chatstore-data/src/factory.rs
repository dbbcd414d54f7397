//! Source construction.
//!
//! [`create_data_source`] is the pure selection function; [`SourceFactory`]
//! binds it to the live settings, the device store and a shared HTTP client.

use crate::config::{ConfigOverrides, SettingsStore, SourceConfig, SourceMode};
use crate::hybrid::{HybridOptions, HybridSource, SyncTask};
use crate::local::LocalSource;
use crate::remote::RemoteSource;
use crate::source::DataSource;
use crate::store::KeyValueStore;
use chatstore_types::Record;
use std::sync::Arc;
use tracing::debug;

/// Path prefix of every versioned API route.
pub const API_PREFIX: &str = "/api/v1";

/// Joins the API base URL and a collection endpoint.
///
/// `endpoint_url("http://host:9000/", "/feeds")` is
/// `http://host:9000/api/v1/feeds`.
pub fn endpoint_url(api_base_url: &str, endpoint: &str) -> String {
    format!("{}{API_PREFIX}{endpoint}", api_base_url.trim_end_matches('/'))
}

/// Builds the source `config.mode` selects for one logical collection.
///
/// `key` names the local slot and `endpoint` the remote route below
/// [`API_PREFIX`].
pub fn create_data_source<T: Record>(
    key: &str,
    endpoint: &str,
    config: &SourceConfig,
    store: Arc<dyn KeyValueStore>,
    client: reqwest::Client,
) -> Arc<dyn DataSource<T>> {
    debug!(key, endpoint, mode = %config.mode, "building data source");
    match config.mode {
        SourceMode::Remote => Arc::new(RemoteSource::<T>::with_client(
            endpoint_url(&config.api_base_url, endpoint),
            client,
        )),
        SourceMode::Hybrid => Arc::new(hybrid_source::<T>(key, endpoint, config, store, client)),
        SourceMode::Local => Arc::new(LocalSource::<T>::new(key, store)),
    }
}

fn hybrid_source<T: Record>(
    key: &str,
    endpoint: &str,
    config: &SourceConfig,
    store: Arc<dyn KeyValueStore>,
    client: reqwest::Client,
) -> HybridSource<T> {
    HybridSource::open(
        key,
        endpoint_url(&config.api_base_url, endpoint),
        store,
        client,
        HybridOptions {
            sync_on_read: config.sync_on_read,
            sync_on_write: config.sync_on_write,
            offline_mode: config.offline_mode,
        },
    )
}

/// A named collection and its remote route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Collection {
    pub key: &'static str,
    pub endpoint: &'static str,
}

impl Collection {
    pub const fn new(key: &'static str, endpoint: &'static str) -> Self {
        Self { key, endpoint }
    }
}

/// Collections the chat application works with.
pub mod collections {
    use super::Collection;

    pub const PROFILES: Collection = Collection::new("profiles", "/profiles");
    /// The active wallet.
    pub const WALLET: Collection = Collection::new("wallet", "/wallet");
    /// Every wallet; same route as [`WALLET`], separate local slot.
    pub const ALL_WALLETS: Collection = Collection::new("allWallets", "/wallet");
    pub const DIALOGUES: Collection = Collection::new("dialogues", "/dialogues");
    pub const CONVERSATIONS: Collection =
        Collection::new("conversations", "/conversations");
    pub const FEEDS: Collection = Collection::new("feeds", "/feeds");
    pub const TRANSACTIONS: Collection = Collection::new("transactions", "/transactions");
    pub const ASSETS: Collection = Collection::new("assets", "/assets");

    pub const ALL: [Collection; 8] = [
        PROFILES,
        WALLET,
        ALL_WALLETS,
        DIALOGUES,
        CONVERSATIONS,
        FEEDS,
        TRANSACTIONS,
        ASSETS,
    ];

    /// Looks up a collection by its key.
    pub fn by_key(key: &str) -> Option<Collection> {
        ALL.into_iter().find(|c| c.key == key)
    }
}

/// Builds sources from the live settings.
#[derive(Clone)]
pub struct SourceFactory {
    settings: Arc<SettingsStore>,
    store: Arc<dyn KeyValueStore>,
    client: reqwest::Client,
}

impl SourceFactory {
    pub fn new(
        settings: Arc<SettingsStore>,
        store: Arc<dyn KeyValueStore>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            settings,
            store,
            client,
        }
    }

    /// The settings this factory reads on every build.
    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    async fn resolve(&self, overrides: Option<&ConfigOverrides>) -> SourceConfig {
        let config = self.settings.current().await;
        match overrides {
            Some(overrides) => config.merged(overrides),
            None => config,
        }
    }

    /// Builds a source for `key` and `endpoint` from the current settings,
    /// with `overrides` applied on top.
    pub async fn build<T: Record>(
        &self,
        key: &str,
        endpoint: &str,
        overrides: Option<&ConfigOverrides>,
    ) -> Arc<dyn DataSource<T>> {
        let config = self.resolve(overrides).await;
        create_data_source(
            key,
            endpoint,
            &config,
            Arc::clone(&self.store),
            self.client.clone(),
        )
    }

    /// Like [`build`](Self::build), and for a hybrid source that may reach
    /// the remote also starts a resync every `sync_interval`.
    ///
    /// The periodic sync stops when the returned [`SyncTask`] is dropped.
    /// Other modes, offline mode and a zero interval return no task.
    pub async fn build_with_sync<T: Record>(
        &self,
        key: &str,
        endpoint: &str,
        overrides: Option<&ConfigOverrides>,
    ) -> (Arc<dyn DataSource<T>>, Option<SyncTask>) {
        let config = self.resolve(overrides).await;
        let periodic = config.mode == SourceMode::Hybrid
            && !config.offline_mode
            && !config.sync_interval.is_zero();
        if !periodic {
            let source = create_data_source(
                key,
                endpoint,
                &config,
                Arc::clone(&self.store),
                self.client.clone(),
            );
            return (source, None);
        }

        let source = hybrid_source::<T>(
            key,
            endpoint,
            &config,
            Arc::clone(&self.store),
            self.client.clone(),
        );
        debug!(key, interval_ms = config.sync_interval.as_millis() as u64, "starting periodic sync");
        let task = source.spawn_periodic_sync(config.sync_interval);
        let source: Arc<dyn DataSource<T>> = Arc::new(source);
        (source, Some(task))
    }

    /// Builds a source for a predefined collection.
    pub async fn collection<T: Record>(
        &self,
        collection: Collection,
        overrides: Option<&ConfigOverrides>,
    ) -> Arc<dyn DataSource<T>> {
        self.build(collection.key, collection.endpoint, overrides)
            .await
    }
}
