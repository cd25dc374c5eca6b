//! SessionExport - session aggregation, persistence and bulk export
//!
//! ## Responsibilities
//!
//! - Build session records from running slots
//! - Concurrent aggregate save (all-or-error)
//! - In-memory ledger of persisted sessions (search, summary, delete)
//! - JSON and CSV export of the ledger (no network)

use crate::error::{Error, Result};
use crate::models::{SessionRecord, StoredSession};
use crate::session_store::{SaveAck, SessionStore};
use crate::slot_pool::RunningSlot;
use chrono::NaiveDate;
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// CSV header row
pub const CSV_HEADER: &str = "id,timestamp,model_used,avg_fps,total_vehicles,breakdown,source";

/// Validation text for a save with no running slot
pub const NOTHING_TO_SAVE: &str = "No active streams to save.";

/// Build one record per running slot with a snapshot
pub fn build_records(running: &[RunningSlot], model_name: &str) -> Vec<SessionRecord> {
    running
        .iter()
        .map(|slot| SessionRecord {
            model_name: model_name.to_string(),
            source_description: slot
                .source_label
                .clone()
                .unwrap_or_else(|| format!("Stream {}", slot.sid)),
            total_vehicles: slot.snapshot.total_vehicles,
            breakdown: slot.snapshot.breakdown,
            avg_fps_processed: slot.snapshot.fps_processed,
        })
        .collect()
}

/// Aggregate save result
#[derive(Debug, Clone, Serialize)]
pub struct SaveReport {
    pub saved: usize,
    pub ids: Vec<i64>,
}

/// Submit every record concurrently
///
/// Fails with the first failing submission's error if any fails. Other
/// submissions have completed server-side by then and are not rolled back.
pub async fn save_sessions(store: &dyn SessionStore, records: &[SessionRecord]) -> Result<SaveReport> {
    if records.is_empty() {
        return Err(Error::Validation(NOTHING_TO_SAVE.to_string()));
    }

    let results: Vec<Result<SaveAck>> =
        join_all(records.iter().map(|r| store.save_session(r))).await;

    let mut ids = Vec::new();
    let mut first_failure = None;
    for (record, result) in records.iter().zip(results) {
        match result {
            Ok(ack) => ids.extend(ack.id),
            Err(e) => {
                tracing::warn!(source = %record.source_description, error = %e, "Session save failed");
                if first_failure.is_none() {
                    first_failure = Some(e);
                }
            }
        }
    }

    if let Some(e) = first_failure {
        return Err(Error::AggregateSave(e.message()));
    }

    tracing::info!(count = records.len(), "Sessions saved");
    Ok(SaveReport {
        saved: records.len(),
        ids,
    })
}

/// CSV row for one stored session
pub fn csv_row(session: &StoredSession) -> String {
    let avg_fps = session
        .avg_fps
        .map(|fps| format!("{:.1}", fps))
        .unwrap_or_default();

    format!(
        "{},{},{},{},{},{},{}",
        session.id,
        session.timestamp,
        session.model_used,
        avg_fps,
        session.total_vehicles,
        quote(&session.breakdown_display()),
        quote(&session.source)
    )
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// `sessions-export-YYYY-MM-DD.<ext>`
pub fn export_file_name(extension: &str, date: NaiveDate) -> String {
    format!("sessions-export-{}.{}", date.format("%Y-%m-%d"), extension)
}

/// Dashboard summary
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SessionSummary {
    pub total_sessions: usize,
    pub total_vehicles: i64,
    pub most_used_model: String,
}

/// In-memory copy of the persisted session list
pub struct SessionLedger {
    store: Arc<dyn SessionStore>,
    sessions: RwLock<Vec<StoredSession>>,
}

impl SessionLedger {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            sessions: RwLock::new(Vec::new()),
        }
    }

    /// Replace the ledger with the store's current list
    pub async fn refresh(&self) -> Result<Vec<StoredSession>> {
        let sessions = self.store.list_sessions().await?;
        tracing::debug!(count = sessions.len(), "Session ledger refreshed");
        *self.sessions.write().await = sessions.clone();
        Ok(sessions)
    }

    pub async fn sessions(&self) -> Vec<StoredSession> {
        self.sessions.read().await.clone()
    }

    /// Delete remotely, then locally
    pub async fn delete(&self, id: i64) -> Result<()> {
        self.store.delete_session(id).await?;
        self.sessions.write().await.retain(|s| s.id != id);
        tracing::info!(id = id, "Session deleted");
        Ok(())
    }

    /// Case-insensitive match on model, timestamp or source
    pub async fn search(&self, query: &str) -> Vec<StoredSession> {
        let needle = query.trim().to_lowercase();
        let sessions = self.sessions.read().await;
        if needle.is_empty() {
            return sessions.clone();
        }

        sessions
            .iter()
            .filter(|s| {
                s.model_used.to_lowercase().contains(&needle)
                    || s.timestamp.to_lowercase().contains(&needle)
                    || s.source.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect()
    }

    pub async fn summary(&self) -> SessionSummary {
        let sessions = self.sessions.read().await;

        let mut counts: HashMap<&str, usize> = HashMap::new();
        let mut order: Vec<&str> = Vec::new();
        for s in sessions.iter() {
            let n = counts.entry(s.model_used.as_str()).or_insert(0);
            if *n == 0 {
                order.push(s.model_used.as_str());
            }
            *n += 1;
        }

        // Ties go to the model seen first
        let mut most_used: Option<(&str, usize)> = None;
        for model in order {
            let n = counts[model];
            if most_used.map_or(true, |(_, best)| n > best) {
                most_used = Some((model, n));
            }
        }

        SessionSummary {
            total_sessions: sessions.len(),
            total_vehicles: sessions.iter().map(|s| s.total_vehicles).sum(),
            most_used_model: most_used
                .map(|(m, _)| m.to_string())
                .unwrap_or_else(|| "N/A".to_string()),
        }
    }

    /// Pretty JSON array, `None` when empty
    pub async fn export_json(&self) -> Result<Option<String>> {
        let sessions = self.sessions.read().await;
        if sessions.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::to_string_pretty(&*sessions)?))
    }

    /// CSV with header, `None` when empty
    pub async fn export_csv(&self) -> Option<String> {
        let sessions = self.sessions.read().await;
        if sessions.is_empty() {
            return None;
        }

        let mut lines = Vec::with_capacity(sessions.len() + 1);
        lines.push(CSV_HEADER.to_string());
        lines.extend(sessions.iter().map(csv_row));
        Some(lines.join("\n"))
    }
}
