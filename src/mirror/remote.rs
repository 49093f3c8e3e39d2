use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use thiserror::Error;

/// Failures talking to the remote table store. Never leaves the mirror
/// module: the synchronizer logs and absorbs every one of them.
#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("remote unavailable: {0}")]
    Unavailable(#[from] reqwest::Error),

    #[error("remote rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("malformed remote response: {0}")]
    Malformed(String),
}

impl MirrorError {
    /// Worth another attempt later.
    pub fn is_transient(&self) -> bool {
        match self {
            MirrorError::Unavailable(_) => true,
            MirrorError::Rejected { status, .. } => *status >= 500 || *status == 429,
            MirrorError::Malformed(_) => false,
        }
    }
}

/// Minimal key-value table API of the hosted store.
#[async_trait]
pub trait RemoteTable: Send + Sync {
    /// Rows of `table` where `column = value`, projected to `columns`.
    async fn select(
        &self,
        table: &str,
        column: &str,
        value: &str,
        columns: &str,
    ) -> Result<Vec<Value>, MirrorError>;

    async fn insert(&self, table: &str, row: &Value) -> Result<(), MirrorError>;

    /// Patches rows where `column = value`; returns how many matched.
    async fn update(
        &self,
        table: &str,
        column: &str,
        value: &str,
        patch: &Value,
    ) -> Result<usize, MirrorError>;

    /// Cheap reachability check against one table.
    async fn ping(&self, table: &str) -> Result<(), MirrorError>;

    fn is_enabled(&self) -> bool {
        true
    }
}

/// Stand-in used when no remote is configured: every call succeeds without
/// doing any I/O.
pub struct DisabledRemote;

#[async_trait]
impl RemoteTable for DisabledRemote {
    async fn select(&self, _: &str, _: &str, _: &str, _: &str) -> Result<Vec<Value>, MirrorError> {
        Ok(Vec::new())
    }

    async fn insert(&self, _: &str, _: &Value) -> Result<(), MirrorError> {
        Ok(())
    }

    async fn update(&self, _: &str, _: &str, _: &str, _: &Value) -> Result<usize, MirrorError> {
        Ok(0)
    }

    async fn ping(&self, _: &str) -> Result<(), MirrorError> {
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// PostgREST dialect client (`/rest/v1/{table}`), as exposed by Supabase.
#[derive(Clone)]
pub struct RestTableClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl RestTableClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, MirrorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn endpoint(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }
}

async fn ensure_success(res: Response) -> Result<Response, MirrorError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    Err(MirrorError::Rejected {
        status: status.as_u16(),
        body,
    })
}

async fn json_rows(res: Response) -> Result<Vec<Value>, MirrorError> {
    let json: Value = res
        .json()
        .await
        .map_err(|e| MirrorError::Malformed(e.to_string()))?;

    match json {
        Value::Array(rows) => Ok(rows),
        other => Err(MirrorError::Malformed(format!("expected array, got {}", other))),
    }
}

#[async_trait]
impl RemoteTable for RestTableClient {
    async fn select(
        &self,
        table: &str,
        column: &str,
        value: &str,
        columns: &str,
    ) -> Result<Vec<Value>, MirrorError> {
        let filter = format!("eq.{}", value);
        let res = self
            .authorized(self.client.get(self.endpoint(table)))
            .query(&[("select", columns), (column, filter.as_str())])
            .send()
            .await?;

        json_rows(ensure_success(res).await?).await
    }

    async fn insert(&self, table: &str, row: &Value) -> Result<(), MirrorError> {
        let res = self
            .authorized(self.client.post(self.endpoint(table)))
            .header("Prefer", "return=minimal")
            .json(row)
            .send()
            .await?;

        ensure_success(res).await.map(|_| ())
    }

    async fn update(
        &self,
        table: &str,
        column: &str,
        value: &str,
        patch: &Value,
    ) -> Result<usize, MirrorError> {
        let filter = format!("eq.{}", value);
        let res = self
            .authorized(self.client.patch(self.endpoint(table)))
            .query(&[(column, filter.as_str())])
            .header("Prefer", "return=representation")
            .json(patch)
            .send()
            .await?;

        Ok(json_rows(ensure_success(res).await?).await?.len())
    }

    async fn ping(&self, table: &str) -> Result<(), MirrorError> {
        let res = self
            .authorized(self.client.get(self.endpoint(table)))
            .query(&[("select", "id"), ("limit", "1")])
            .send()
            .await?;

        ensure_success(res).await.map(|_| ())
    }
}
