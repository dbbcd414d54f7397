//! The uniform data-source contract.

use crate::error::DataResult;
use async_trait::async_trait;
use chatstore_types::{Fields, Record};
use std::fmt;

/// Which backend a source is built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Local,
    Remote,
    Hybrid,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::Local => "local",
            SourceKind::Remote => "remote",
            SourceKind::Hybrid => "hybrid",
        };
        f.write_str(name)
    }
}

/// Reads and writes the records of one logical collection.
///
/// Every backend (device store, network API, or both layered together)
/// satisfies this contract, so callers hold an `Arc<dyn DataSource<T>>`
/// and never depend on a concrete kind.
#[async_trait]
pub trait DataSource<T: Record>: Send + Sync {
    /// The backend this source is built on.
    fn kind(&self) -> SourceKind;

    /// Fetches one record by id.
    async fn get(&self, id: &str) -> DataResult<T>;

    /// Fetches the whole collection.
    async fn get_all(&self) -> DataResult<Vec<T>>;

    /// Creates a record from data without an id.
    async fn create(&self, data: Fields) -> DataResult<T>;

    /// Applies partial data to an existing record.
    async fn update(&self, id: &str, patch: Fields) -> DataResult<T>;

    /// Deletes a record.
    async fn delete(&self, id: &str) -> DataResult<()>;

    /// Reconciles the source with its source of truth.
    ///
    /// Only the hybrid source has anything to reconcile.
    async fn sync(&self) -> DataResult<()> {
        Ok(())
    }
}
