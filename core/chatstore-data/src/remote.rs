//! Network-backed data source.
//!
//! Speaks the backend's JSON envelope protocol:
//!
//! | Operation | Request |
//! |---|---|
//! | `get_all` | `GET {endpoint}` |
//! | `get` | `GET {endpoint}/{id}` |
//! | `create` | `POST {endpoint}` |
//! | `update` | `PUT {endpoint}/{id}` |
//! | `delete` | `DELETE {endpoint}/{id}` |
//!
//! Request bodies are converted to wire form and response payloads to
//! internal form by the case codec.

use crate::error::{DataError, DataResult};
use crate::source::{DataSource, SourceKind};
use async_trait::async_trait;
use chatstore_types::{
    ApiEnvelope, Fields, ListPayload, PaginatedPayload, Record, to_internal_form, to_wire_form,
};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::marker::PhantomData;
use std::time::Duration;
use tracing::{debug, warn};

/// Default request timeout for clients built by [`RemoteSource::new`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds the HTTP client used when none is injected.
pub fn default_client() -> Client {
    Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .unwrap_or_default()
}

/// Data source backed by a JSON API endpoint.
pub struct RemoteSource<T> {
    endpoint: String,
    client: Client,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for RemoteSource<T> {
    fn clone(&self) -> Self {
        Self {
            endpoint: self.endpoint.clone(),
            client: self.client.clone(),
            _record: PhantomData,
        }
    }
}

impl<T: Record> RemoteSource<T> {
    /// Creates a source for `endpoint` with its own HTTP client.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(endpoint, default_client())
    }

    /// Creates a source for `endpoint` using an injected client.
    pub fn with_client(endpoint: impl Into<String>, client: Client) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        Self {
            endpoint,
            client,
            _record: PhantomData,
        }
    }

    /// The full endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Fetches one page, keeping the pagination metadata.
    ///
    /// A plain-array answer is returned as a single page holding every
    /// record.
    pub async fn get_page(&self, page: u64, limit: u64) -> DataResult<PaginatedPayload<T>> {
        let request = self
            .client
            .get(&self.endpoint)
            .query(&[("page", page), ("limit", limit)]);
        let data = self.send(request, "GET", &self.endpoint).await?;

        match decode_list::<T>(data)? {
            ListPayload::Paginated(payload) => Ok(payload),
            ListPayload::Plain(records) => {
                let total = records.len() as u64;
                Ok(PaginatedPayload {
                    data: records,
                    pagination: chatstore_types::Pagination {
                        page: 1,
                        limit: total,
                        total,
                        total_pages: 1,
                    },
                })
            }
        }
    }

    fn item_url(&self, id: &str) -> String {
        format!("{}/{}", self.endpoint, id)
    }

    /// Sends a request and unwraps the envelope, returning `data` in
    /// internal form.
    async fn send(&self, request: RequestBuilder, method: &str, url: &str) -> DataResult<Value> {
        let result = self.send_inner(request).await;
        if let Err(e) = &result {
            warn!(method, url, error = %e, "remote request failed");
        }
        result
    }

    async fn send_inner(&self, request: RequestBuilder) -> DataResult<Value> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        let envelope: ApiEnvelope = match serde_json::from_slice(&body) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(DataError::RemoteUnavailable(format!("HTTP {status}")));
            }
            Err(e) => {
                return Err(DataError::RemoteUnavailable(format!(
                    "invalid response body: {e}"
                )));
            }
        };

        if !envelope.is_success() {
            return Err(DataError::RemoteRejected(envelope.message));
        }

        debug!(%status, "remote request succeeded");
        Ok(to_internal_form(envelope.data))
    }
}

#[async_trait]
impl<T: Record> DataSource<T> for RemoteSource<T> {
    fn kind(&self) -> SourceKind {
        SourceKind::Remote
    }

    async fn get(&self, id: &str) -> DataResult<T> {
        let url = self.item_url(id);
        let data = self.send(self.client.get(&url), "GET", &url).await?;
        decode_record(data)
    }

    async fn get_all(&self) -> DataResult<Vec<T>> {
        let data = self
            .send(self.client.get(&self.endpoint), "GET", &self.endpoint)
            .await?;
        Ok(decode_list::<T>(data)?.into_records())
    }

    async fn create(&self, data: Fields) -> DataResult<T> {
        let body = to_wire_form(Value::Object(data));
        let request = self.client.post(&self.endpoint).json(&body);
        let data = self.send(request, "POST", &self.endpoint).await?;
        decode_record(data)
    }

    async fn update(&self, id: &str, patch: Fields) -> DataResult<T> {
        let url = self.item_url(id);
        let body = to_wire_form(Value::Object(patch));
        let data = self.send(self.client.put(&url).json(&body), "PUT", &url).await?;
        decode_record(data)
    }

    async fn delete(&self, id: &str) -> DataResult<()> {
        let url = self.item_url(id);
        self.send(self.client.delete(&url), "DELETE", &url).await?;
        Ok(())
    }
}

fn decode_record<T: Record>(data: Value) -> DataResult<T> {
    serde_json::from_value(data)
        .map_err(|e| DataError::RemoteUnavailable(format!("unexpected record payload: {e}")))
}

fn decode_list<T: Record>(data: Value) -> DataResult<ListPayload<T>> {
    let payload = ListPayload::<Value>::decode(data)
        .map_err(|e| DataError::RemoteUnavailable(e.to_string()))?;

    Ok(match payload {
        ListPayload::Paginated(page) => ListPayload::Paginated(PaginatedPayload {
            data: decode_records(page.data)?,
            pagination: page.pagination,
        }),
        ListPayload::Plain(items) => ListPayload::Plain(decode_records(items)?),
    })
}

fn decode_records<T: Record>(items: Vec<Value>) -> DataResult<Vec<T>> {
    items.into_iter().map(decode_record).collect()
}
