//! Client for the notes backend's RPC surface.
//!
//! Every call is a POST answered with a `{code, msg, data}` envelope, where
//! `code == 0` means success.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::json;
use std::time::Duration;

use crate::error::{Result, SyncError};

/// A notebook (top-level container) in the notes store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Notebook {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub closed: bool,
}

/// A row of the notes store's `blocks` table.
///
/// Missing or null columns deserialize to empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Block {
    #[serde(deserialize_with = "nullable")]
    pub id: String,
    #[serde(deserialize_with = "nullable")]
    pub parent_id: String,
    #[serde(deserialize_with = "nullable")]
    pub root_id: String,
    #[serde(rename = "box", deserialize_with = "nullable")]
    pub notebook_id: String,
    #[serde(deserialize_with = "nullable")]
    pub hpath: String,
    #[serde(deserialize_with = "nullable")]
    pub content: String,
    #[serde(deserialize_with = "nullable")]
    pub fcontent: String,
    #[serde(deserialize_with = "nullable")]
    pub markdown: String,
    #[serde(rename = "type", deserialize_with = "nullable")]
    pub kind: String,
    #[serde(deserialize_with = "nullable")]
    pub subtype: String,
    #[serde(deserialize_with = "nullable")]
    pub created: String,
    #[serde(deserialize_with = "nullable")]
    pub updated: String,
}

fn nullable<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Read-only access to the notes store plus user notifications.
#[async_trait]
pub trait NotesBackend: Send + Sync {
    async fn list_notebooks(&self) -> Result<Vec<Notebook>>;

    /// Run a read-only SQL query against the block store.
    async fn query_blocks(&self, stmt: &str) -> Result<Vec<Block>>;

    /// Show a transient message to the user.
    async fn push_message(&self, msg: &str, timeout_ms: u64) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    msg: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct NotebookList {
    notebooks: Vec<Notebook>,
}

/// HTTP client for the notes backend.
#[derive(Clone)]
pub struct NotesClient {
    client: Client,
    base_url: String,
}

impl NotesClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Config(e.to_string()))?;
        let base_url: String = base_url.into();
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<Option<T>> {
        let url = format!("{}{}", self.base_url, path);

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SyncError::Connectivity(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(SyncError::Backend {
                action: path.to_string(),
                message: format!("HTTP {}: {}", status, message),
            });
        }

        let envelope: Envelope<T> = resp
            .json()
            .await
            .map_err(|e| SyncError::Data(format!("{}: {}", path, e)))?;

        if envelope.code != 0 {
            return Err(SyncError::Backend {
                action: path.to_string(),
                message: envelope.msg,
            });
        }

        Ok(envelope.data)
    }
}

#[async_trait]
impl NotesBackend for NotesClient {
    async fn list_notebooks(&self) -> Result<Vec<Notebook>> {
        let data: Option<NotebookList> = self.post("/api/notebook/lsNotebooks", json!({})).await?;
        data.map(|d| d.notebooks)
            .ok_or_else(|| SyncError::Data("lsNotebooks returned no data".to_string()))
    }

    async fn query_blocks(&self, stmt: &str) -> Result<Vec<Block>> {
        let rows: Option<Vec<Block>> = self.post("/api/query/sql", json!({ "stmt": stmt })).await?;
        Ok(rows.unwrap_or_default())
    }

    async fn push_message(&self, msg: &str, timeout_ms: u64) -> Result<()> {
        let _: Option<serde_json::Value> = self
            .post(
                "/api/notification/pushMsg",
                json!({ "msg": msg, "timeout": timeout_ms }),
            )
            .await?;
        Ok(())
    }
}
