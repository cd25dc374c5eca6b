//! Application state
//!
//! Holds configuration and the shared components

use crate::session_export::SessionLedger;
use crate::session_orchestrator::{InferenceSettings, OrchestratorConfig, StreamOrchestrator};
use crate::session_store::SessionStore;
use crate::slot_pool::DEFAULT_SLOT_COUNT;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Inference backend URL
    pub inference_url: String,
    /// Session persistence backend URL
    pub session_store_url: String,
    /// Server port
    pub port: u16,
    /// Server host
    pub host: String,
    /// Number of concurrent slots
    pub slot_count: usize,
    /// Stats polling period
    pub stats_poll_interval: Duration,
    /// Per-poll request timeout
    pub stats_timeout: Duration,
    /// Timeout for upload, stop, model and session calls
    pub request_timeout: Duration,
    /// Start call timeout (unset: unbounded)
    pub start_timeout: Option<Duration>,
    /// Local uploads are confined here (unset: disabled)
    pub upload_dir: Option<PathBuf>,
    /// Initial console settings
    pub default_conf: f64,
    pub default_imgsz: i64,
    pub default_interval: i64,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Default for AppConfig {
    fn default() -> Self {
        let inference_url = std::env::var("INFERENCE_URL")
            .unwrap_or_else(|_| "http://localhost:5000".to_string());

        Self {
            session_store_url: std::env::var("SESSION_STORE_URL")
                .unwrap_or_else(|_| inference_url.clone()),
            inference_url,
            port: env_or("PORT", 8080),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            slot_count: env_or("SLOT_COUNT", DEFAULT_SLOT_COUNT),
            stats_poll_interval: Duration::from_millis(env_or("STATS_POLL_INTERVAL_MS", 1000)),
            stats_timeout: Duration::from_millis(env_or("STATS_TIMEOUT_MS", 5000)),
            request_timeout: Duration::from_secs(env_or("REQUEST_TIMEOUT_SEC", 30)),
            start_timeout: std::env::var("START_TIMEOUT_SEC")
                .ok()
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|s| *s > 0)
                .map(Duration::from_secs),
            upload_dir: std::env::var("UPLOAD_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            default_conf: env_or("DEFAULT_CONF", 0.5),
            default_imgsz: env_or("DEFAULT_IMGSZ", 640),
            default_interval: env_or("DEFAULT_INTERVAL", 1),
        }
    }
}

impl AppConfig {
    /// Orchestrator settings derived from this config
    pub fn orchestrator_config(&self) -> crate::error::Result<OrchestratorConfig> {
        Ok(OrchestratorConfig {
            poll_interval: self.stats_poll_interval,
            start_timeout: self.start_timeout,
            upload_dir: self.upload_dir.clone(),
            default_settings: InferenceSettings::new(
                self.default_conf,
                self.default_imgsz,
                self.default_interval,
            )?,
        })
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// Slot lifecycle
    pub orchestrator: Arc<StreamOrchestrator>,
    /// Persistence backend
    pub store: Arc<dyn SessionStore>,
    /// Persisted session list (dashboard)
    pub ledger: Arc<SessionLedger>,
}
