//! InferenceClient - inference backend adapter
//!
//! ## Responsibilities
//!
//! - Model catalog fetch
//! - Local video upload (multipart)
//! - Stream start/stop per slot
//! - Per-slot stats fetch
//! - Live-view (MJPEG) URL construction

mod types;

pub use types::*;

use crate::error::{Error, Result};
use crate::models::{ModelChoice, StatsSnapshot};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use std::time::Duration;

/// Generic start failure text when the backend gives none
pub const START_FAILED_MESSAGE: &str = "Failed to start stream";

/// Stats fetch failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StatsError {
    /// No active session for the sid (404)
    #[error("no active session")]
    NotFound,
    /// Timeout, malformed payload, unexpected status
    #[error("transient stats failure: {0}")]
    Transient(String),
}

/// Inference/session backend as seen by the orchestrator
#[async_trait]
pub trait StreamBackend: Send + Sync {
    /// `GET /models`
    async fn list_models(&self) -> Result<Vec<ModelChoice>>;

    /// `POST /streams/upload`, returns the server-local path
    async fn upload_video(&self, file_name: &str, data: Vec<u8>) -> Result<String>;

    /// `POST /streams/start`
    async fn start_stream(&self, request: &StartStreamRequest) -> Result<()>;

    /// `POST /streams/stop`
    async fn stop_stream(&self, sid: u8) -> Result<()>;

    /// `GET /streams/stats?sid=`
    async fn fetch_stats(&self, sid: u8) -> std::result::Result<StatsSnapshot, StatsError>;

    /// Live-view resource bound to a running slot
    fn live_view_url(&self, sid: u8) -> String;
}

/// HTTP implementation of [`StreamBackend`]
pub struct InferenceClient {
    client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
    stats_timeout: Duration,
}

impl InferenceClient {
    /// Create new inference client
    ///
    /// No client-wide timeout is set: the start call is bounded by the
    /// orchestrator (if at all), everything else per request.
    pub fn new(base_url: &str, request_timeout: Duration, stats_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            request_timeout,
            stats_timeout,
        })
    }
}

#[async_trait]
impl StreamBackend for InferenceClient {
    async fn list_models(&self) -> Result<Vec<ModelChoice>> {
        let url = format!("{}/models", self.base_url);
        let resp = self
            .client
            .get(&url)
            .timeout(self.request_timeout)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Error::Api(format!("Model list failed: {}", resp.status())));
        }

        let list: ModelListResponse = resp.json().await?;
        Ok(list.into_models())
    }

    async fn upload_video(&self, file_name: &str, data: Vec<u8>) -> Result<String> {
        let url = format!("{}/streams/upload", self.base_url);
        let form = Form::new().part("file", Part::bytes(data).file_name(file_name.to_string()));

        let resp = self
            .client
            .post(&url)
            .multipart(form)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| Error::Upload(e.to_string()))?;

        let status = resp.status();
        let body: UploadResponse = resp
            .json()
            .await
            .map_err(|e| Error::Upload(format!("unreadable upload reply: {}", e)))?;

        if !status.is_success() {
            return Err(Error::Upload(
                body.error.unwrap_or_else(|| format!("Upload failed: {}", status)),
            ));
        }

        body.path
            .filter(|p| !p.is_empty())
            .ok_or_else(|| Error::Upload("upload reply carried no path".to_string()))
    }

    async fn start_stream(&self, request: &StartStreamRequest) -> Result<()> {
        let url = format!("{}/streams/start", self.base_url);
        let resp = self.client.post(&url).json(request).send().await?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        let body: StartStreamResponse = serde_json::from_str(&text).unwrap_or_default();

        if !status.is_success() || body.ok == Some(false) {
            return Err(Error::Start {
                sid: request.sid,
                message: body
                    .reason()
                    .unwrap_or_else(|| START_FAILED_MESSAGE.to_string()),
            });
        }

        Ok(())
    }

    async fn stop_stream(&self, sid: u8) -> Result<()> {
        let url = format!("{}/streams/stop", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&StopStreamRequest { sid })
            .timeout(self.request_timeout)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Error::Api(format!(
                "Stop for slot {} failed: {}",
                sid,
                resp.status()
            )));
        }

        Ok(())
    }

    async fn fetch_stats(&self, sid: u8) -> std::result::Result<StatsSnapshot, StatsError> {
        let url = format!("{}/streams/stats", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("sid", sid)])
            .timeout(self.stats_timeout)
            .send()
            .await
            .map_err(|e| StatsError::Transient(e.to_string()))?;

        match resp.status() {
            StatusCode::NOT_FOUND => Err(StatsError::NotFound),
            s if s.is_success() => {
                let body: StatsResponse = resp
                    .json()
                    .await
                    .map_err(|e| StatsError::Transient(e.to_string()))?;
                Ok(body.into())
            }
            s => Err(StatsError::Transient(format!("HTTP {}", s))),
        }
    }

    fn live_view_url(&self, sid: u8) -> String {
        format!("{}/streams/mjpeg?sid={}", self.base_url, sid)
    }
}
