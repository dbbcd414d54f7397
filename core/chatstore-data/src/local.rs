//! Device-local data source.
//!
//! A collection is one JSON array held in a single key-value slot. Every
//! mutation reads the whole array, changes it and writes it back; there is
//! no partial update and no concurrency control, so two interleaved writes
//! on the same key can lose one of them.

use crate::error::{DataError, DataResult};
use crate::source::{DataSource, SourceKind};
use crate::store::KeyValueStore;
use async_trait::async_trait;
use chatstore_types::{Fields, Record, new_record_id};
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

/// Data source backed by a [`KeyValueStore`] slot.
pub struct LocalSource<T> {
    key: String,
    store: Arc<dyn KeyValueStore>,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for LocalSource<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            store: Arc::clone(&self.store),
            _record: PhantomData,
        }
    }
}

impl<T: Record> LocalSource<T> {
    /// Creates a source over the slot `key`.
    pub fn new(key: impl Into<String>, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            key: key.into(),
            store,
            _record: PhantomData,
        }
    }

    /// The slot key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The store holding the slot.
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Inserts `record`, or replaces the stored record with the same id.
    /// The record keeps its own id.
    pub async fn put(&self, record: &T) -> DataResult<()> {
        let value = to_value(record)?;
        let mut items = self.load().await;
        match items.iter().position(|item| id_of(item) == Some(record.id())) {
            Some(index) => items[index] = value,
            None => items.push(value),
        }
        self.save(&items).await
    }

    /// Replaces the whole collection with `records` in one write.
    pub async fn replace_all(&self, records: &[T]) -> DataResult<()> {
        let items = records.iter().map(to_value).collect::<DataResult<Vec<_>>>()?;
        self.save(&items).await
    }

    /// Reads the raw stored array. Missing or unreadable data degrades to
    /// an empty collection.
    async fn load(&self) -> Vec<Value> {
        let bytes = match self.store.read(&self.key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(key = %self.key, error = %e, "failed to read local collection");
                return Vec::new();
            }
        };

        match serde_json::from_slice::<Vec<Value>>(&bytes) {
            Ok(items) => items,
            Err(e) => {
                warn!(key = %self.key, error = %e, "local collection is not a JSON array; treating as empty");
                Vec::new()
            }
        }
    }

    async fn save(&self, items: &[Value]) -> DataResult<()> {
        let bytes = serde_json::to_vec(items)
            .map_err(|e| DataError::InvalidRecord(format!("failed to encode collection: {e}")))?;
        self.store.write(&self.key, bytes).await.map_err(|e| match e {
            e @ DataError::StorageUnavailable(_) => e,
            other => DataError::StorageUnavailable(other.to_string()),
        })?;
        debug!(key = %self.key, count = items.len(), "saved local collection");
        Ok(())
    }
}

#[async_trait]
impl<T: Record> DataSource<T> for LocalSource<T> {
    fn kind(&self) -> SourceKind {
        SourceKind::Local
    }

    async fn get(&self, id: &str) -> DataResult<T> {
        let items = self.load().await;
        let item = items
            .into_iter()
            .find(|item| id_of(item) == Some(id))
            .ok_or_else(|| DataError::NotFound(format!("{id} in {}", self.key)))?;
        from_value(item)
    }

    async fn get_all(&self) -> DataResult<Vec<T>> {
        let records = self
            .load()
            .await
            .into_iter()
            .filter_map(|item| match from_value::<T>(item) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(key = %self.key, error = %e, "skipping undecodable local record");
                    None
                }
            })
            .collect();
        Ok(records)
    }

    async fn create(&self, mut data: Fields) -> DataResult<T> {
        data.insert("id".to_string(), Value::String(new_record_id()));
        let record: T = from_value(Value::Object(data))?;

        let mut items = self.load().await;
        items.push(to_value(&record)?);
        self.save(&items).await?;
        Ok(record)
    }

    async fn update(&self, id: &str, patch: Fields) -> DataResult<T> {
        let mut items = self.load().await;
        let index = items
            .iter()
            .position(|item| id_of(item) == Some(id))
            .ok_or_else(|| DataError::NotFound(format!("{id} in {}", self.key)))?;

        let Value::Object(mut merged) = items[index].take() else {
            return Err(DataError::InvalidRecord(format!(
                "stored record {id} is not a mapping"
            )));
        };
        merged.extend(patch);
        // The located id wins over any id carried by the patch.
        merged.insert("id".to_string(), Value::String(id.to_string()));

        let record: T = from_value(Value::Object(merged))?;
        items[index] = to_value(&record)?;
        self.save(&items).await?;
        Ok(record)
    }

    async fn delete(&self, id: &str) -> DataResult<()> {
        let mut items = self.load().await;
        items.retain(|item| id_of(item) != Some(id));
        self.save(&items).await
    }
}

fn id_of(item: &Value) -> Option<&str> {
    item.get("id").and_then(Value::as_str)
}

fn to_value<T: Record>(record: &T) -> DataResult<Value> {
    serde_json::to_value(record).map_err(|e| DataError::InvalidRecord(e.to_string()))
}

fn from_value<T: Record>(value: Value) -> DataResult<T> {
    serde_json::from_value(value).map_err(|e| DataError::InvalidRecord(e.to_string()))
}
