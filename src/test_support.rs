//! In-process fakes of the backend seams, recording a call trace

use crate::error::{Error, Result};
use crate::inference_client::{StartStreamRequest, StatsError, StreamBackend};
use crate::models::{ModelChoice, SessionRecord, StatsSnapshot, StoredSession, VehicleBreakdown};
use crate::session_store::{SaveAck, SessionStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// One backend call, in issue order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Models,
    Upload(String),
    Start(u8),
    Stop(u8),
    Stats(u8),
}

/// Fake inference backend
#[derive(Default)]
pub struct FakeBackend {
    pub calls: Mutex<Vec<Call>>,
    pub models: Mutex<Vec<ModelChoice>>,
    pub last_start: Mutex<Option<StartStreamRequest>>,
    /// Upload failure message
    pub upload_error: Mutex<Option<String>>,
    /// The next upload waits here when set
    pub upload_gate: Mutex<Option<Arc<Notify>>>,
    /// Start failure per sid
    pub start_errors: Mutex<HashMap<u8, Error>>,
    /// The next start call waits here when set
    pub start_gate: Mutex<Option<Arc<Notify>>>,
    pub stop_fails: Mutex<bool>,
    /// Stats replies per sid; a missing entry means a snapshot of `sid * 10` cars
    pub stats: Mutex<HashMap<u8, std::result::Result<StatsSnapshot, StatsError>>>,
}

impl FakeBackend {
    pub fn with_models() -> Self {
        let backend = Self::default();
        *backend.models.lock().unwrap() = vec![
            ModelChoice {
                file: "yolofde.pt".to_string(),
                display_name: "YOLO-FDE".to_string(),
            },
            ModelChoice {
                file: "yolov8.pt".to_string(),
                display_name: "YOLOv8".to_string(),
            },
        ];
        backend
    }

    pub fn trace(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_trace(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

pub fn snapshot(car: u64, fps_processed: f64) -> StatsSnapshot {
    let breakdown = VehicleBreakdown {
        car,
        van: 1,
        truck: 2,
        bus: 0,
    };
    StatsSnapshot {
        total_vehicles: breakdown.total(),
        breakdown,
        fps_in: 30.0,
        fps_processed,
        status: "running".to_string(),
        model_file: None,
        current_visible: None,
        frames: None,
        source: None,
        resolved_via: None,
    }
}

#[async_trait]
impl StreamBackend for FakeBackend {
    async fn list_models(&self) -> Result<Vec<ModelChoice>> {
        self.record(Call::Models);
        Ok(self.models.lock().unwrap().clone())
    }

    async fn upload_video(&self, file_name: &str, _data: Vec<u8>) -> Result<String> {
        self.record(Call::Upload(file_name.to_string()));

        let gate = self.upload_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        match self.upload_error.lock().unwrap().clone() {
            Some(message) => Err(Error::Upload(message)),
            None => Ok(format!("/srv/uploads/{}", file_name)),
        }
    }

    async fn start_stream(&self, request: &StartStreamRequest) -> Result<()> {
        self.record(Call::Start(request.sid));
        *self.last_start.lock().unwrap() = Some(request.clone());

        let gate = self.start_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        match self.start_errors.lock().unwrap().remove(&request.sid) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn stop_stream(&self, sid: u8) -> Result<()> {
        self.record(Call::Stop(sid));
        if *self.stop_fails.lock().unwrap() {
            return Err(Error::Api(format!("Stop for slot {} failed: 500", sid)));
        }
        Ok(())
    }

    async fn fetch_stats(&self, sid: u8) -> std::result::Result<StatsSnapshot, StatsError> {
        self.record(Call::Stats(sid));
        self.stats
            .lock()
            .unwrap()
            .get(&sid)
            .cloned()
            .unwrap_or_else(|| Ok(snapshot(sid as u64 * 10, 12.5)))
    }

    fn live_view_url(&self, sid: u8) -> String {
        format!("http://backend/streams/mjpeg?sid={}", sid)
    }
}

/// Fake persistence backend
#[derive(Default)]
pub struct FakeStore {
    pub saved: Mutex<Vec<SessionRecord>>,
    /// Saves whose source matches fail with this message
    pub fail_source: Mutex<Option<(String, String)>>,
    pub sessions: Mutex<Vec<StoredSession>>,
    pub deleted: Mutex<Vec<i64>>,
}

#[async_trait]
impl SessionStore for FakeStore {
    async fn save_session(&self, record: &SessionRecord) -> Result<SaveAck> {
        // Every submission completes server-side, failing or not
        tokio::task::yield_now().await;
        self.saved.lock().unwrap().push(record.clone());

        if let Some((source, message)) = self.fail_source.lock().unwrap().clone() {
            if record.source_description == source {
                return Err(Error::Api(message));
            }
        }

        Ok(SaveAck {
            id: Some(self.saved.lock().unwrap().len() as i64),
            message: None,
        })
    }

    async fn list_sessions(&self) -> Result<Vec<StoredSession>> {
        Ok(self.sessions.lock().unwrap().clone())
    }

    async fn delete_session(&self, id: i64) -> Result<()> {
        let mut sessions = self.sessions.lock().unwrap();
        let before = sessions.len();
        sessions.retain(|s| s.id != id);
        if sessions.len() == before {
            return Err(Error::NotFound(format!("Session {} not found", id)));
        }
        self.deleted.lock().unwrap().push(id);
        Ok(())
    }
}

pub fn stored(id: i64, model: &str, source: &str, total: i64) -> StoredSession {
    StoredSession {
        id,
        name: Some(format!("Session {}", id)),
        timestamp: format!("2024-05-0{} 09:00:00", id),
        model_used: model.to_string(),
        source: source.to_string(),
        total_vehicles: total,
        car: total,
        van: 0,
        truck: 0,
        bus: 0,
        avg_fps: Some(20.0),
    }
}
