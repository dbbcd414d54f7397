//! Records and the field maps used to build them.

use crate::{Error, Result, kind_name};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A mapping of field name to value.
///
/// Used for "data without id" on create and for partial data on update.
pub type Fields = Map<String, Value>;

/// An entity stored in a collection.
///
/// Identity is defined solely by [`Record::id`]; no other field takes part
/// in lookups.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// The record's unique identifier within its collection.
    fn id(&self) -> &str;
}

/// An untyped record: an `id` plus arbitrary fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(flatten)]
    pub fields: Fields,
}

impl Document {
    /// Creates a document from an id and its fields.
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Returns a field value by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Returns a string field by name.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }
}

impl Record for Document {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Generates a fresh random record id (UUID v4).
#[must_use]
pub fn new_record_id() -> String {
    Uuid::new_v4().to_string()
}

/// Serializes any value into a field map.
///
/// Fails with [`Error::NotAMapping`] if the value does not serialize to an
/// object.
pub fn fields_of<S: Serialize + ?Sized>(value: &S) -> Result<Fields> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(Error::NotAMapping(kind_name(&other))),
    }
}

/// Decodes a typed record from a field map.
pub fn record_from_fields<T: DeserializeOwned>(fields: Fields) -> Result<T> {
    Ok(serde_json::from_value(Value::Object(fields))?)
}
