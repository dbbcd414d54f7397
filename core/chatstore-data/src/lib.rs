//! Data-access layer for chatstore.
//!
//! Every collection is reached through the [`DataSource`] contract, backed
//! by one of three sources:
//!
//! - [`LocalSource`]: one JSON array per collection in a [`KeyValueStore`]
//! - [`RemoteSource`]: a JSON API speaking the backend envelope protocol
//! - [`HybridSource`]: a local cache over a remote source of truth, with
//!   background resync
//!
//! [`create_data_source`] picks one from a [`SourceConfig`];
//! [`SourceFactory`] does the same against live, persisted settings.

pub mod config;
pub mod error;
pub mod factory;
pub mod hybrid;
pub mod local;
pub mod remote;
pub mod source;
pub mod store;

pub use config::{ConfigOverrides, SETTINGS_SLOT, SettingsStore, SourceConfig, SourceMode};
pub use error::{DataError, DataResult};
pub use factory::{Collection, SourceFactory, collections, create_data_source, endpoint_url};
pub use hybrid::{HybridOptions, HybridSource, SyncTask};
pub use local::LocalSource;
pub use remote::{RemoteSource, default_client};
pub use source::{DataSource, SourceKind};
pub use store::{FileStore, KeyValueStore, MemoryStore};
