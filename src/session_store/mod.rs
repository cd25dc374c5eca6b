//! SessionStore - session persistence backend adapter
//!
//! Durable session history lives in the external service; this module only
//! submits, lists and deletes records over HTTP.

use crate::error::{Error, Result};
use crate::models::{SessionRecord, StoredSession};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

/// `POST /sessions` reply
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct SaveAck {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionListResponse {
    #[serde(default)]
    sessions: Vec<StoredSession>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}

/// Persistence backend as seen by the exporter
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// `POST /sessions`
    async fn save_session(&self, record: &SessionRecord) -> Result<SaveAck>;

    /// `GET /sessions`
    async fn list_sessions(&self) -> Result<Vec<StoredSession>>;

    /// `DELETE /sessions/:id`
    async fn delete_session(&self, id: i64) -> Result<()>;
}

/// HTTP implementation of [`SessionStore`]
pub struct SessionStoreClient {
    client: reqwest::Client,
    base_url: String,
}

impl SessionStoreClient {
    /// Create new session store client
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl SessionStore for SessionStoreClient {
    async fn save_session(&self, record: &SessionRecord) -> Result<SaveAck> {
        let url = format!("{}/sessions", self.base_url);
        let resp = self.client.post(&url).json(record).send().await?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();

        let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
        if let Some(error) = body.error.filter(|e| !e.trim().is_empty()) {
            return Err(Error::Api(error));
        }
        if !status.is_success() {
            return Err(Error::Api(format!("Session save failed: {}", status)));
        }

        Ok(serde_json::from_str(&text).unwrap_or_default())
    }

    async fn list_sessions(&self) -> Result<Vec<StoredSession>> {
        let url = format!("{}/sessions", self.base_url);
        let resp = self.client.get(&url).send().await?;

        if !resp.status().is_success() {
            return Err(Error::Api(format!(
                "Session list failed: {}",
                resp.status()
            )));
        }

        let body: SessionListResponse = resp.json().await?;
        Ok(body.sessions)
    }

    async fn delete_session(&self, id: i64) -> Result<()> {
        let url = format!("{}/sessions/{}", self.base_url, id);
        let resp = self.client.delete(&url).send().await?;

        match resp.status() {
            StatusCode::NOT_FOUND => Err(Error::NotFound(format!("Session {} not found", id))),
            s if s.is_success() => Ok(()),
            s => Err(Error::Api(format!("Session delete failed: {}", s))),
        }
    }
}
