//! Inference backend wire types

use crate::models::{ModelChoice, StatsSnapshot, VehicleBreakdown};
use serde::{Deserialize, Serialize};

/// `POST /streams/start` body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StartStreamRequest {
    pub sid: u8,
    pub model_file: String,
    pub source: String,
    /// Confidence threshold (0.0-1.0)
    pub conf: f32,
    /// Inference resolution in pixels
    pub imgsz: u32,
    /// Frame sampling interval (>= 1)
    pub interval: u32,
}

/// `POST /streams/start` reply (also used for error bodies)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartStreamResponse {
    #[serde(default)]
    pub ok: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl StartStreamResponse {
    /// Backend-reported failure text, `message` before `error`
    pub fn reason(&self) -> Option<String> {
        self.message
            .clone()
            .or_else(|| self.error.clone())
            .filter(|m| !m.trim().is_empty())
    }
}

/// `POST /streams/stop` body
#[derive(Debug, Clone, Serialize)]
pub struct StopStreamRequest {
    pub sid: u8,
}

/// `POST /streams/upload` reply
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// `GET /models` reply
///
/// The backend returns a bare list; older builds wrapped it in `{models: [...]}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ModelListResponse {
    List(Vec<ModelChoice>),
    Wrapped { models: Vec<ModelChoice> },
}

impl ModelListResponse {
    pub fn into_models(self) -> Vec<ModelChoice> {
        match self {
            ModelListResponse::List(models) => models,
            ModelListResponse::Wrapped { models } => models,
        }
    }
}

/// `GET /streams/stats?sid=` reply
#[derive(Debug, Clone, Deserialize)]
pub struct StatsResponse {
    #[serde(default)]
    pub counts: VehicleBreakdown,
    #[serde(default)]
    pub fps_in: Option<f64>,
    #[serde(default)]
    pub fps_proc: Option<f64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub model_file: Option<String>,
    #[serde(default)]
    pub current_visible: Option<VehicleBreakdown>,
    #[serde(default)]
    pub frames: Option<u64>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub resolved_via: Option<String>,
}

impl From<StatsResponse> for StatsSnapshot {
    fn from(resp: StatsResponse) -> Self {
        Self {
            total_vehicles: resp.counts.total(),
            breakdown: resp.counts,
            fps_in: resp.fps_in.unwrap_or(0.0),
            fps_processed: resp.fps_proc.unwrap_or(0.0),
            status: resp
                .status
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "running".to_string()),
            model_file: resp.model_file,
            current_visible: resp.current_visible,
            frames: resp.frames,
            source: resp.source,
            resolved_via: resp.resolved_via,
        }
    }
}
