//! Response envelope returned by the backend route layer.

use crate::{Error, Result, kind_name};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Standard response envelope.
///
/// `code == 0` means success; any other code is a domain error described
/// by `message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEnvelope {
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub message: String,
    pub code: i64,
    #[serde(default)]
    pub timestamp: i64,
}

impl ApiEnvelope {
    /// Builds a success envelope around `data`.
    pub fn success(data: Value) -> Self {
        Self {
            data,
            message: "Success".to_string(),
            code: 0,
            timestamp: 0,
        }
    }

    /// Builds an error envelope.
    pub fn failure(message: impl Into<String>, code: i64) -> Self {
        Self {
            data: Value::Null,
            message: message.into(),
            code,
            timestamp: 0,
        }
    }

    /// Returns true if the envelope reports success.
    pub fn is_success(&self) -> bool {
        self.code == 0
    }
}

/// Pagination metadata attached to a paginated list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub total_pages: u64,
}

/// A page of records plus its pagination metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginatedPayload<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}

/// The two shapes a list endpoint may answer with.
#[derive(Debug, Clone, PartialEq)]
pub enum ListPayload<T> {
    /// `{ "data": [...], "pagination": {...} }`
    Paginated(PaginatedPayload<T>),
    /// A bare array.
    Plain(Vec<T>),
}

impl<T: DeserializeOwned> ListPayload<T> {
    /// Decodes a list payload.
    ///
    /// An object carrying both an array `data` field and a `pagination`
    /// field is paginated; an array is plain; anything else is rejected.
    pub fn decode(value: Value) -> Result<Self> {
        match value {
            Value::Object(ref map)
                if map.contains_key("pagination") && map.get("data").is_some_and(Value::is_array) =>
            {
                Ok(Self::Paginated(serde_json::from_value(value)?))
            }
            Value::Array(_) => Ok(Self::Plain(serde_json::from_value(value)?)),
            other => Err(Error::UnexpectedPayload(format!(
                "expected an array or paginated list, got {}",
                kind_name(&other)
            ))),
        }
    }
}

impl<T> ListPayload<T> {
    /// Returns the records, discarding pagination metadata.
    pub fn into_records(self) -> Vec<T> {
        match self {
            Self::Paginated(page) => page.data,
            Self::Plain(items) => items,
        }
    }

    /// Returns the pagination metadata, if any.
    pub fn pagination(&self) -> Option<&Pagination> {
        match self {
            Self::Paginated(page) => Some(&page.pagination),
            Self::Plain(_) => None,
        }
    }
}
