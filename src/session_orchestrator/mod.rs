//! SessionOrchestrator - per-slot session lifecycle
//!
//! ## Responsibilities
//!
//! - Model catalog and operator selection
//! - Console inference settings
//! - Start sequence (validate, allocate, upload, classify, start, bind poller)
//! - Single-slot stop and stop-all (local state cleared regardless of backend)
//!
//! ## Start sequence
//!
//! Validation happens before allocation, so a rejected request consumes no
//! capacity and makes no network call. Every later step holds a
//! [`SlotTicket`]; if the slot is stopped while an upload or the start call
//! is in flight the ticket goes stale and the late result is discarded.
//!
//! Local files are only read from inside the configured upload directory.

mod types;

pub use types::{ConsoleState, InferenceSettings, StartSessionRequest, StopAllReport, BLOB_PREFIX};

use crate::error::{Error, Result};
use crate::inference_client::{StartStreamRequest, StreamBackend, START_FAILED_MESSAGE};
use crate::models::ModelChoice;
use crate::slot_pool::{RunningSlot, SlotPool, SlotStatus, SlotTicket, SlotView};
use crate::source_classifier;
use crate::stats_poller;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Stale start text
pub const STOPPED_BEFORE_LIVE: &str = "Stream was stopped before it became live";

/// Model name recorded when none is selected
pub const UNKNOWN_MODEL: &str = "Unknown Model";

/// Orchestrator tuning
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub poll_interval: Duration,
    /// `None` leaves the start call unbounded
    pub start_timeout: Option<Duration>,
    pub default_settings: InferenceSettings,
    /// Directory local uploads must live in; `None` disables local uploads
    pub upload_dir: Option<PathBuf>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval: stats_poller::DEFAULT_POLL_INTERVAL,
            start_timeout: None,
            default_settings: InferenceSettings::default(),
            upload_dir: None,
        }
    }
}

/// StreamOrchestrator instance
pub struct StreamOrchestrator {
    pool: Arc<SlotPool>,
    backend: Arc<dyn StreamBackend>,
    models: RwLock<Vec<ModelChoice>>,
    selected_model: RwLock<Option<ModelChoice>>,
    settings: RwLock<InferenceSettings>,
    poll_interval: Duration,
    start_timeout: Option<Duration>,
    upload_dir: Option<PathBuf>,
}

impl StreamOrchestrator {
    /// Create new orchestrator over an existing pool
    pub fn new(pool: Arc<SlotPool>, backend: Arc<dyn StreamBackend>, config: OrchestratorConfig) -> Self {
        Self {
            pool,
            backend,
            models: RwLock::new(Vec::new()),
            selected_model: RwLock::new(None),
            settings: RwLock::new(config.default_settings),
            poll_interval: config.poll_interval,
            start_timeout: config.start_timeout,
            upload_dir: config.upload_dir,
        }
    }

    /// Slot pool
    pub fn pool(&self) -> &Arc<SlotPool> {
        &self.pool
    }

    // ========================================
    // Model catalog / console
    // ========================================

    /// Fetch the model catalog; the first model becomes the selection
    /// unless the current selection is still offered
    pub async fn load_models(&self) -> Result<Vec<ModelChoice>> {
        let models = self.backend.list_models().await?;

        let mut selected = self.selected_model.write().await;
        let keep = selected
            .as_ref()
            .map(|s| models.iter().any(|m| m == s))
            .unwrap_or(false);
        if !keep {
            *selected = models.first().cloned();
        }

        tracing::info!(
            count = models.len(),
            selected = ?selected.as_ref().map(|m| m.display_name.as_str()),
            "Model catalog loaded"
        );

        *self.models.write().await = models.clone();
        Ok(models)
    }

    /// Cached model catalog
    pub async fn models(&self) -> Vec<ModelChoice> {
        self.models.read().await.clone()
    }

    /// Select a model by display name
    pub async fn select_model(&self, display_name: &str) -> Result<ModelChoice> {
        let model = self
            .models
            .read()
            .await
            .iter()
            .find(|m| m.display_name == display_name)
            .cloned()
            .ok_or_else(|| Error::Validation(format!("Unknown model: {}", display_name)))?;

        *self.selected_model.write().await = Some(model.clone());
        tracing::info!(model = %model.display_name, "Model selected");
        Ok(model)
    }

    pub async fn selected_model(&self) -> Option<ModelChoice> {
        self.selected_model.read().await.clone()
    }

    /// Selected model's display name, or "Unknown Model"
    pub async fn selected_model_name(&self) -> String {
        self.selected_model
            .read()
            .await
            .as_ref()
            .map(|m| m.display_name.clone())
            .unwrap_or_else(|| UNKNOWN_MODEL.to_string())
    }

    pub async fn settings(&self) -> InferenceSettings {
        *self.settings.read().await
    }

    /// Replace the console settings (applies to later starts only)
    pub async fn update_settings(&self, settings: InferenceSettings) -> InferenceSettings {
        *self.settings.write().await = settings;
        tracing::debug!(?settings, "Console settings updated");
        settings
    }

    pub async fn console(&self) -> ConsoleState {
        ConsoleState {
            selected_model: self.selected_model().await,
            settings: self.settings().await,
        }
    }

    // ========================================
    // Lifecycle
    // ========================================

    /// Start a session on the first available slot
    pub async fn start_session(&self, request: StartSessionRequest) -> Result<SlotView> {
        let model = self
            .selected_model()
            .await
            .ok_or_else(|| Error::Validation("Select a model first".to_string()))?;

        let source = request.source.trim().to_string();
        if source.is_empty() && request.local_file.is_none() {
            return Err(Error::Validation(
                "Enter a video source or choose a local file".to_string(),
            ));
        }

        let local_file = match request.pending_upload() {
            Some(path) => Some(self.resolve_upload(path).await?),
            None => None,
        };

        let ticket = self.pool.allocate().await?;

        let (effective_source, uploaded_name) = match local_file {
            Some(path) => match self.upload(&path).await {
                Ok(uploaded) => uploaded,
                Err(e) => {
                    self.pool.release(ticket).await;
                    tracing::warn!(sid = ticket.sid, error = %e, "Upload failed, slot released");
                    return Err(e);
                }
            },
            None => (source, None),
        };

        let label = source_classifier::classify(&effective_source, uploaded_name.as_deref());
        if !self.pool.set_source_label(ticket, label.clone()).await {
            return Err(self.stale_start(ticket, false).await);
        }

        let settings = self.settings().await;
        let start = StartStreamRequest {
            sid: ticket.sid,
            model_file: model.file.clone(),
            source: effective_source,
            conf: settings.conf,
            imgsz: settings.imgsz,
            interval: settings.interval,
        };

        tracing::info!(
            sid = ticket.sid,
            model = %model.display_name,
            source = %label,
            "Starting stream"
        );

        match self.call_start(&start).await {
            Ok(()) => self.bind_running(ticket).await,
            Err(message) => {
                if !self.pool.mark_error(ticket, message.clone()).await {
                    return Err(self.stale_start(ticket, true).await);
                }
                Err(Error::Start {
                    sid: ticket.sid,
                    message,
                })
            }
        }
    }

    /// Stop one slot
    ///
    /// The slot is Idle when this returns, whatever the backend answered.
    pub async fn stop(&self, sid: u8) -> Result<SlotView> {
        let previous = self.pool.stop(sid).await?;

        if matches!(previous, SlotStatus::Running | SlotStatus::Initializing) {
            if let Err(e) = self.backend.stop_stream(sid).await {
                tracing::warn!(sid = sid, error = %e, "Backend stop failed, local state cleared");
            }
        }

        self.pool
            .view(sid)
            .await
            .ok_or_else(|| Error::Internal(format!("slot {} vanished", sid)))
    }

    /// Stop every slot
    ///
    /// All pollers are cancelled in one step before the first stop call goes
    /// out. Nothing is sent when no slot was active.
    pub async fn stop_all(&self) -> StopAllReport {
        let active = self.pool.reset_all().await;
        if active.is_empty() {
            tracing::info!("Stop all: nothing active");
            return StopAllReport::default();
        }

        let mut failed = Vec::new();
        for sid in self.pool.sids().await {
            if let Err(e) = self.backend.stop_stream(sid).await {
                tracing::warn!(sid = sid, error = %e, "Backend stop failed during stop all");
                failed.push(sid);
            }
        }

        tracing::info!(stopped = ?active, failed = ?failed, "Stop all complete");
        StopAllReport {
            stopped: active,
            backend_failures: failed,
        }
    }

    pub async fn slots(&self) -> Vec<SlotView> {
        self.pool.views().await
    }

    pub async fn slot(&self, sid: u8) -> Result<SlotView> {
        self.pool
            .view(sid)
            .await
            .ok_or_else(|| Error::NotFound(format!("Slot {} does not exist", sid)))
    }

    /// Running slots with a snapshot, for the aggregator
    pub async fn running_sessions(&self) -> Vec<RunningSlot> {
        self.pool.running_with_snapshot().await
    }

    // ========================================
    // Internals
    // ========================================

    /// Canonical path of a local file inside the upload directory
    async fn resolve_upload(&self, path: &Path) -> Result<PathBuf> {
        let root = self.upload_dir.as_ref().ok_or_else(|| {
            Error::Validation("Local file uploads are disabled (UPLOAD_DIR not set)".to_string())
        })?;
        let root = tokio::fs::canonicalize(root)
            .await
            .map_err(|e| Error::Config(format!("upload directory {}: {}", root.display(), e)))?;

        let candidate = if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        };
        let resolved = tokio::fs::canonicalize(&candidate)
            .await
            .map_err(|e| Error::Upload(format!("cannot read {}: {}", candidate.display(), e)))?;

        if !resolved.starts_with(&root) {
            return Err(Error::Validation(format!(
                "{} is outside the upload directory",
                path.display()
            )));
        }

        Ok(resolved)
    }

    async fn upload(&self, path: &Path) -> Result<(String, Option<String>)> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| Error::Upload(format!("not a file: {}", path.display())))?;

        let data = tokio::fs::read(path)
            .await
            .map_err(|e| Error::Upload(format!("cannot read {}: {}", path.display(), e)))?;

        tracing::debug!(file = %file_name, bytes = data.len(), "Uploading local video");
        let server_path = self.backend.upload_video(&file_name, data).await?;
        Ok((server_path, Some(file_name)))
    }

    /// Issue the start call, returning the failure text on error
    async fn call_start(&self, request: &StartStreamRequest) -> std::result::Result<(), String> {
        let outcome = match self.start_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.backend.start_stream(request)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err(format!(
                        "start request timed out after {}s",
                        limit.as_secs()
                    ))
                }
            },
            None => self.backend.start_stream(request).await,
        };

        outcome.map_err(|e| {
            let message = e.message();
            if message.trim().is_empty() {
                START_FAILED_MESSAGE.to_string()
            } else {
                message
            }
        })
    }

    async fn bind_running(&self, ticket: SlotTicket) -> Result<SlotView> {
        let url = self.backend.live_view_url(ticket.sid);
        let pool = self.pool.clone();
        let backend = self.backend.clone();
        let period = self.poll_interval;

        let bound = self
            .pool
            .mark_running(ticket, url, move || {
                stats_poller::spawn(pool, backend, ticket, period)
            })
            .await;

        if !bound {
            return Err(self.stale_start(ticket, true).await);
        }

        self.slot(ticket.sid).await
    }

    /// The slot was stopped while its start was in flight
    ///
    /// A backend session opened by the late start is stopped, unless the sid
    /// already belongs to a newer session.
    async fn stale_start(&self, ticket: SlotTicket, start_sent: bool) -> Error {
        tracing::warn!(sid = ticket.sid, epoch = ticket.epoch, "Start completed after stop, discarding");

        if start_sent {
            if self.pool.is_active(ticket.sid).await {
                tracing::debug!(sid = ticket.sid, "Slot re-allocated, skipping cleanup stop");
            } else if let Err(e) = self.backend.stop_stream(ticket.sid).await {
                tracing::debug!(sid = ticket.sid, error = %e, "Cleanup stop failed");
            }
        }

        Error::Start {
            sid: ticket.sid,
            message: STOPPED_BEFORE_LIVE.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference_client::StatsError;
    use crate::test_support::{Call, FakeBackend};
    use std::io::Write;
    use tokio::sync::Notify;

    async fn setup_with(backend: Arc<FakeBackend>, config: OrchestratorConfig) -> Arc<StreamOrchestrator> {
        let pool = Arc::new(SlotPool::default());
        let orch = Arc::new(StreamOrchestrator::new(pool, backend, config));
        orch.load_models().await.unwrap();
        orch
    }

    async fn setup() -> (Arc<StreamOrchestrator>, Arc<FakeBackend>) {
        let backend = Arc::new(FakeBackend::with_models());
        let orch = setup_with(backend.clone(), OrchestratorConfig::default()).await;
        backend.clear_trace();
        (orch, backend)
    }

    async fn setup_uploads(dir: &Path) -> (Arc<StreamOrchestrator>, Arc<FakeBackend>) {
        let backend = Arc::new(FakeBackend::with_models());
        let config = OrchestratorConfig {
            upload_dir: Some(dir.to_path_buf()),
            ..Default::default()
        };
        let orch = setup_with(backend.clone(), config).await;
        backend.clear_trace();
        (orch, backend)
    }

    fn source(s: &str) -> StartSessionRequest {
        StartSessionRequest {
            source: s.to_string(),
            local_file: None,
        }
    }

    async fn assert_consistent(orch: &StreamOrchestrator) {
        for view in orch.slots().await {
            assert!(view.is_consistent(), "inconsistent slot: {:?}", view);
        }
    }

    #[tokio::test]
    async fn test_first_model_selected_on_load() {
        let (orch, _) = setup().await;
        assert_eq!(orch.selected_model_name().await, "YOLO-FDE");

        orch.select_model("YOLOv8").await.unwrap();
        assert_eq!(orch.selected_model().await.unwrap().file, "yolov8.pt");
        assert!(matches!(
            orch.select_model("nope").await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_start_requires_model() {
        let backend = Arc::new(FakeBackend::default());
        let orch = setup_with(backend.clone(), OrchestratorConfig::default()).await;
        backend.clear_trace();

        let err = orch.start_session(source("rtsp://cam/1")).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(orch.selected_model_name().await, UNKNOWN_MODEL);
        assert!(backend.trace().is_empty());
        assert_eq!(orch.pool().active_count().await, 0);
    }

    #[tokio::test]
    async fn test_start_requires_source() {
        let (orch, backend) = setup().await;

        let err = orch.start_session(source("   ")).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(backend.trace().is_empty());
        assert_eq!(orch.pool().active_count().await, 0);
    }

    #[tokio::test]
    async fn test_start_success_binds_live_view() {
        let (orch, backend) = setup().await;

        let view = orch
            .start_session(source("https://youtu.be/xyz"))
            .await
            .unwrap();

        assert_eq!(view.sid, 1);
        assert_eq!(view.state, SlotStatus::Running);
        assert!(view.connecting);
        assert_eq!(view.source_label.as_deref(), Some("YouTube Stream"));
        assert_eq!(
            view.live_view_url.as_deref(),
            Some("http://backend/streams/mjpeg?sid=1")
        );

        let sent = backend.last_start.lock().unwrap().clone().unwrap();
        assert_eq!(sent.model_file, "yolofde.pt");
        assert_eq!(sent.source, "https://youtu.be/xyz");
        assert_eq!(sent.conf, 0.5);
        assert_eq!(sent.imgsz, 640);
        assert_eq!(sent.interval, 1);
        assert_consistent(&orch).await;
    }

    #[tokio::test]
    async fn test_fifth_start_is_over_capacity() {
        let (orch, backend) = setup().await;
        for i in 0..4 {
            orch.start_session(source(&format!("rtsp://cam/{}", i)))
                .await
                .unwrap();
        }
        backend.clear_trace();

        let err = orch.start_session(source("rtsp://cam/5")).await.unwrap_err();
        assert!(matches!(err, Error::OverCapacity(_)));
        assert!(!backend.trace().iter().any(|c| matches!(c, Call::Start(_))));
        assert_eq!(orch.pool().active_count().await, 4);
    }

    #[tokio::test]
    async fn test_local_file_upload_becomes_source() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, backend) = setup_uploads(dir.path()).await;
        let path = dir.path().join("morning_traffic.mp4");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"not really a video")
            .unwrap();

        let view = orch
            .start_session(StartSessionRequest {
                source: "blob:http://localhost/1234".to_string(),
                local_file: Some(path),
            })
            .await
            .unwrap();

        assert_eq!(
            view.source_label.as_deref(),
            Some("Local Video - morning_traffic.mp4")
        );
        let sent = backend.last_start.lock().unwrap().clone().unwrap();
        assert_eq!(sent.source, "/srv/uploads/morning_traffic.mp4");
        assert_eq!(
            backend.trace(),
            vec![
                Call::Upload("morning_traffic.mp4".to_string()),
                Call::Start(1)
            ]
        );
    }

    #[tokio::test]
    async fn test_upload_failure_releases_slot() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, backend) = setup_uploads(dir.path()).await;
        *backend.upload_error.lock().unwrap() = Some("disk full".to_string());
        std::fs::write(dir.path().join("clip.mp4"), b"x").unwrap();

        // Relative names resolve against the upload directory
        let err = orch
            .start_session(StartSessionRequest {
                source: String::new(),
                local_file: Some("clip.mp4".into()),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Upload(ref m) if m == "disk full"));
        let view = orch.slot(1).await.unwrap();
        assert_eq!(view.state, SlotStatus::Idle);
        assert!(!backend.trace().iter().any(|c| matches!(c, Call::Start(_))));
    }

    #[tokio::test]
    async fn test_unreadable_local_file_is_upload_error() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, backend) = setup_uploads(dir.path()).await;

        let err = orch
            .start_session(StartSessionRequest {
                source: String::new(),
                local_file: Some(dir.path().join("not_here.mp4")),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Upload(_)));
        assert_eq!(orch.slot(1).await.unwrap().state, SlotStatus::Idle);
        assert!(backend.trace().is_empty());
    }

    #[tokio::test]
    async fn test_local_file_outside_upload_dir_is_rejected() {
        let uploads = tempfile::tempdir().unwrap();
        let elsewhere = tempfile::tempdir().unwrap();
        let secret = elsewhere.path().join("secret.mp4");
        std::fs::write(&secret, b"private").unwrap();
        let (orch, backend) = setup_uploads(uploads.path()).await;

        let sibling = Path::new("..")
            .join(elsewhere.path().file_name().unwrap())
            .join("secret.mp4");

        for local_file in [secret, sibling] {
            let err = orch
                .start_session(StartSessionRequest {
                    source: String::new(),
                    local_file: Some(local_file),
                })
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "unexpected: {:?}", err);
        }

        assert!(backend.trace().is_empty());
        assert_eq!(orch.pool().active_count().await, 0);
    }

    #[tokio::test]
    async fn test_local_upload_disabled_without_upload_dir() {
        let (orch, backend) = setup().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"x").unwrap();

        let err = orch
            .start_session(StartSessionRequest {
                source: String::new(),
                local_file: Some(path),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Validation(_)));
        assert!(backend.trace().is_empty());
        assert_eq!(orch.slot(1).await.unwrap().state, SlotStatus::Idle);
    }

    #[tokio::test]
    async fn test_start_rejection_sets_error_then_slot_is_reused() {
        let (orch, backend) = setup().await;
        backend.start_errors.lock().unwrap().insert(
            1,
            Error::Start {
                sid: 1,
                message: "cannot open source".to_string(),
            },
        );

        let err = orch.start_session(source("rtsp://bad")).await.unwrap_err();
        assert!(matches!(err, Error::Start { sid: 1, ref message } if message == "cannot open source"));

        let view = orch.slot(1).await.unwrap();
        assert_eq!(view.state, SlotStatus::Error);
        assert_eq!(view.last_error.as_deref(), Some("cannot open source"));
        assert!(view.live_view_url.is_none());

        let retry = orch.start_session(source("rtsp://good")).await.unwrap();
        assert_eq!(retry.sid, 1);
        assert_eq!(retry.state, SlotStatus::Running);
        assert!(retry.last_error.is_none());
        assert_consistent(&orch).await;
    }

    #[tokio::test]
    async fn test_start_failure_without_text_uses_generic_message() {
        let (orch, backend) = setup().await;
        backend
            .start_errors
            .lock()
            .unwrap()
            .insert(1, Error::Api(String::new()));

        orch.start_session(source("rtsp://x")).await.unwrap_err();
        assert_eq!(
            orch.slot(1).await.unwrap().last_error.as_deref(),
            Some(START_FAILED_MESSAGE)
        );
    }

    #[tokio::test]
    async fn test_stop_clears_even_when_backend_fails() {
        let (orch, backend) = setup().await;
        orch.start_session(source("rtsp://cam")).await.unwrap();
        *backend.stop_fails.lock().unwrap() = true;

        let view = orch.stop(1).await.unwrap();
        assert_eq!(view.state, SlotStatus::Idle);
        assert!(view.live_view_url.is_none());
        assert!(view.source_label.is_none());
        assert_eq!(backend.count(&Call::Stop(1)), 1);
        assert_consistent(&orch).await;
    }

    #[tokio::test]
    async fn test_stop_unknown_slot() {
        let (orch, _) = setup().await;
        assert!(matches!(orch.stop(7).await, Err(Error::NotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_all_cancels_pollers_before_stop_calls() {
        let (orch, backend) = setup().await;
        orch.start_session(source("rtsp://a")).await.unwrap();
        orch.start_session(source("rtsp://b")).await.unwrap();

        tokio::time::advance(Duration::from_millis(1000)).await;
        tokio::task::yield_now().await;
        backend.clear_trace();

        let report = orch.stop_all().await;
        assert_eq!(report.stopped, vec![1, 2]);

        for _ in 0..3 {
            tokio::time::advance(Duration::from_millis(1000)).await;
            tokio::task::yield_now().await;
        }

        let trace = backend.trace();
        assert_eq!(
            trace,
            vec![Call::Stop(1), Call::Stop(2), Call::Stop(3), Call::Stop(4)]
        );
        assert!(orch
            .slots()
            .await
            .iter()
            .all(|v| v.state == SlotStatus::Idle && v.is_consistent()));
    }

    #[tokio::test]
    async fn test_stop_all_with_nothing_active_sends_nothing() {
        let (orch, backend) = setup().await;
        let report = orch.stop_all().await;
        assert!(report.stopped.is_empty());
        assert!(backend.trace().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_polls_never_stop_a_running_slot() {
        let (orch, backend) = setup().await;
        backend
            .stats
            .lock()
            .unwrap()
            .insert(1, Err(StatsError::NotFound));
        orch.start_session(source("rtsp://cam")).await.unwrap();

        for _ in 0..10 {
            tokio::time::advance(Duration::from_millis(1000)).await;
            tokio::task::yield_now().await;
        }

        let view = orch.slot(1).await.unwrap();
        assert_eq!(view.state, SlotStatus::Running);
        assert!(view.missed_polls > 0);
        assert!(!backend.trace().iter().any(|c| matches!(c, Call::Stop(_))));
    }

    #[tokio::test]
    async fn test_stop_during_start_discards_late_success() {
        let (orch, backend) = setup().await;
        let gate = Arc::new(Notify::new());
        *backend.start_gate.lock().unwrap() = Some(gate.clone());

        let starter = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.start_session(source("rtsp://slow")).await })
        };

        while backend.count(&Call::Start(1)) == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(orch.slot(1).await.unwrap().state, SlotStatus::Initializing);

        orch.stop(1).await.unwrap();
        gate.notify_one();

        let err = starter.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Start { ref message, .. } if message == STOPPED_BEFORE_LIVE));

        let view = orch.slot(1).await.unwrap();
        assert_eq!(view.state, SlotStatus::Idle);
        assert!(view.live_view_url.is_none());
        // Explicit stop plus cleanup of the late start
        assert_eq!(backend.count(&Call::Stop(1)), 2);
    }

    #[tokio::test]
    async fn test_late_start_leaves_reallocated_slot_alone() {
        let (orch, backend) = setup().await;
        let gate = Arc::new(Notify::new());
        *backend.start_gate.lock().unwrap() = Some(gate.clone());

        let first = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.start_session(source("rtsp://slow")).await })
        };
        while backend.count(&Call::Start(1)) == 0 {
            tokio::task::yield_now().await;
        }

        orch.stop(1).await.unwrap();
        let second = orch.start_session(source("rtsp://fresh")).await.unwrap();
        assert_eq!(second.sid, 1);

        gate.notify_one();
        let err = first.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Start { ref message, .. } if message == STOPPED_BEFORE_LIVE));

        assert_eq!(
            backend.trace(),
            vec![Call::Start(1), Call::Stop(1), Call::Start(1)]
        );
        let view = orch.slot(1).await.unwrap();
        assert_eq!(view.state, SlotStatus::Running);
        assert_eq!(view.live_view_url, second.live_view_url);
        assert_consistent(&orch).await;
    }

    #[tokio::test]
    async fn test_stop_during_upload_skips_start_call() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("clip.mp4"), b"x").unwrap();
        let (orch, backend) = setup_uploads(dir.path()).await;
        let gate = Arc::new(Notify::new());
        *backend.upload_gate.lock().unwrap() = Some(gate.clone());

        let starter = {
            let orch = orch.clone();
            tokio::spawn(async move {
                orch.start_session(StartSessionRequest {
                    source: String::new(),
                    local_file: Some("clip.mp4".into()),
                })
                .await
            })
        };
        while backend.count(&Call::Upload("clip.mp4".to_string())) == 0 {
            tokio::task::yield_now().await;
        }

        orch.stop(1).await.unwrap();
        gate.notify_one();

        let err = starter.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Start { ref message, .. } if message == STOPPED_BEFORE_LIVE));
        assert_eq!(
            backend.trace(),
            vec![Call::Upload("clip.mp4".to_string()), Call::Stop(1)]
        );
        assert_eq!(orch.slot(1).await.unwrap().state, SlotStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_timeout_marks_error() {
        let backend = Arc::new(FakeBackend::with_models());
        *backend.start_gate.lock().unwrap() = Some(Arc::new(Notify::new()));
        let config = OrchestratorConfig {
            start_timeout: Some(Duration::from_secs(10)),
            ..Default::default()
        };
        let orch = setup_with(backend, config).await;

        let err = orch.start_session(source("rtsp://hung")).await.unwrap_err();
        assert!(matches!(err, Error::Start { ref message, .. } if message == "start request timed out after 10s"));
        assert_eq!(orch.slot(1).await.unwrap().state, SlotStatus::Error);
    }

    #[tokio::test]
    async fn test_settings_apply_to_next_start() {
        let (orch, backend) = setup().await;
        orch.update_settings(InferenceSettings::new(1.7, 320, -3).unwrap())
            .await;

        orch.start_session(source("rtsp://cam")).await.unwrap();
        let sent = backend.last_start.lock().unwrap().clone().unwrap();
        assert_eq!(sent.conf, 1.0);
        assert_eq!(sent.imgsz, 320);
        assert_eq!(sent.interval, 1);
    }
}
