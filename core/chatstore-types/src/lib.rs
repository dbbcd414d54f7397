//! Core type definitions for chatstore.
//!
//! This crate defines the types shared by every data source:
//! - The [`Record`] trait and the untyped [`Document`] record
//! - [`Fields`], the mapping used for drafts and partial updates
//! - The response envelope spoken by the backend route layer
//! - The case codec bridging wire (`snake_case`) and internal (`camelCase`) keys
//!
//! Nothing here performs I/O; sources live in `chatstore-data`.

pub mod case;
mod envelope;
mod record;

pub use case::{to_internal_form, to_wire_form};
pub use envelope::{ApiEnvelope, ListPayload, PaginatedPayload, Pagination};
pub use record::{Document, Fields, Record, fields_of, new_record_id, record_from_fields};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while converting records and payloads.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("expected a mapping, got {0}")]
    NotAMapping(&'static str),

    #[error("unexpected payload: {0}")]
    UnexpectedPayload(String),
}

/// Short name of a JSON value's kind, used in error messages.
pub(crate) fn kind_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
