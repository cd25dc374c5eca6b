//! SessionOrchestrator types

use crate::error::{Error, Result};
use crate::models::ModelChoice;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Source prefix standing in for a pending local selection
pub const BLOB_PREFIX: &str = "blob:";

/// Smallest accepted inference resolution
const MIN_IMGSZ: i64 = 32;

/// Operator-held inference parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct InferenceSettings {
    /// Confidence threshold, 0.0-1.0
    pub conf: f32,
    /// Inference resolution (pixels)
    pub imgsz: u32,
    /// Frame sampling interval, >= 1
    pub interval: u32,
}

impl InferenceSettings {
    /// Normalize raw operator input
    ///
    /// `conf` is clamped to [0, 1] and `interval` to at least 1. An image size
    /// below 32 pixels is rejected.
    pub fn new(conf: f64, imgsz: i64, interval: i64) -> Result<Self> {
        if imgsz < MIN_IMGSZ || imgsz > u32::MAX as i64 {
            return Err(Error::Validation(format!(
                "Image size must be at least {} pixels, got {}",
                MIN_IMGSZ, imgsz
            )));
        }

        let conf = if conf.is_nan() { 0.0 } else { conf.clamp(0.0, 1.0) };
        let interval = interval.clamp(1, u32::MAX as i64);

        Ok(Self {
            conf: conf as f32,
            imgsz: imgsz as u32,
            interval: interval as u32,
        })
    }
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            conf: 0.5,
            imgsz: 640,
            interval: 1,
        }
    }
}

/// Start request as given by the operator
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartSessionRequest {
    #[serde(default)]
    pub source: String,
    /// Local video to upload first
    #[serde(default)]
    pub local_file: Option<PathBuf>,
}

impl StartSessionRequest {
    /// Local file to upload, if the source is empty or a placeholder
    pub fn pending_upload(&self) -> Option<&Path> {
        let source = self.source.trim();
        if source.is_empty() || source.starts_with(BLOB_PREFIX) {
            self.local_file.as_deref()
        } else {
            None
        }
    }
}

/// Stop-all outcome
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct StopAllReport {
    /// Slots that were Initializing or Running
    pub stopped: Vec<u8>,
    /// Slots whose backend stop call failed (local state cleared anyway)
    pub backend_failures: Vec<u8>,
}

/// Selected model plus settings
#[derive(Debug, Clone, Serialize)]
pub struct ConsoleState {
    pub selected_model: Option<ModelChoice>,
    pub settings: InferenceSettings,
}
