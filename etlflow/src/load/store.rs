//! Remote table store.

use async_trait::async_trait;

use crate::core::{Record, TableSchema};
use crate::errors::EtlError;

/// A remote table store with insert and full-table select.
///
/// One call is one attempt; the loader owns retrying.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Creates the table if it does not exist.
    async fn ensure_schema(&self, schema: &TableSchema) -> Result<(), EtlError>;

    /// Inserts a batch of flat records.
    async fn insert(&self, table: &str, records: &[Record]) -> Result<(), EtlError>;

    /// Returns every row of a table.
    async fn select_all(&self, table: &str) -> Result<Vec<Record>, EtlError>;
}

/// PostgREST-style store (`/rest/v1/<table>`, `/rest/v1/rpc/execute_sql`).
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpTableStore {
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl HttpTableStore {
    /// Creates a store client with a per-request timeout.
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeout: std::time::Duration,
    ) -> Result<Self, EtlError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(endpoint, api_key, client))
    }

    /// Creates a store around an existing client.
    #[must_use]
    pub fn with_client(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// URL of a REST resource.
    #[must_use]
    pub fn url(&self, resource: &str) -> String {
        format!("{}/rest/v1/{resource}", self.endpoint)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, EtlError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .text()
            .await
            .ok()
            .filter(|body| !body.trim().is_empty())
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string());
        Err(EtlError::RemoteStatus {
            status: status.as_u16(),
            message,
        })
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl RemoteStore for HttpTableStore {
    async fn ensure_schema(&self, schema: &TableSchema) -> Result<(), EtlError> {
        let body = serde_json::json!({ "query": schema.create_table_sql() });
        let response = self
            .authorized(self.client.post(self.url("rpc/execute_sql")))
            .json(&body)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn insert(&self, table: &str, records: &[Record]) -> Result<(), EtlError> {
        let response = self
            .authorized(self.client.post(self.url(table)))
            .header("Prefer", "return=minimal")
            .json(records)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn select_all(&self, table: &str) -> Result<Vec<Record>, EtlError> {
        let response = self
            .authorized(self.client.get(self.url(table)))
            .query(&[("select", "*")])
            .send()
            .await?;
        let body = Self::check(response).await?.text().await?;
        serde_json::from_str(&body).map_err(|e| EtlError::Decode(e.to_string()))
    }
}
