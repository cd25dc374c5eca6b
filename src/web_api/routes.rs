//! API Routes

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::models::ApiResponse;
use crate::session_export::{build_records, export_file_name, save_sessions};
use crate::session_orchestrator::{InferenceSettings, StartSessionRequest};
use crate::state::AppState;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(super::health_check))
        // Models & console
        .route("/api/models", get(list_models))
        .route("/api/console", get(get_console))
        .route("/api/console/model", put(select_model))
        .route("/api/console/settings", put(update_settings))
        // Slots
        .route("/api/slots", get(list_slots))
        .route("/api/slots/start", post(start_slot))
        .route("/api/slots/stop-all", post(stop_all_slots))
        .route("/api/slots/:sid", get(get_slot))
        .route("/api/slots/:sid/stop", post(stop_slot))
        // Sessions
        .route("/api/sessions", get(list_sessions))
        .route("/api/sessions/save", post(save_active_sessions))
        .route("/api/sessions/summary", get(session_summary))
        .route("/api/sessions/export.json", get(export_json))
        .route("/api/sessions/export.csv", get(export_csv))
        .route("/api/sessions/:id", delete(delete_session))
        .with_state(state)
}

// ========================================
// Model & Console Handlers
// ========================================

async fn list_models(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.orchestrator.models().await))
}

async fn get_console(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.orchestrator.console().await))
}

#[derive(Debug, Deserialize)]
struct SelectModelRequest {
    name: String,
}

async fn select_model(
    State(state): State<AppState>,
    Json(req): Json<SelectModelRequest>,
) -> impl IntoResponse {
    match state.orchestrator.select_model(&req.name).await {
        Ok(model) => Json(ApiResponse::success(model)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct UpdateSettingsRequest {
    conf: f64,
    imgsz: i64,
    interval: i64,
}

async fn update_settings(
    State(state): State<AppState>,
    Json(req): Json<UpdateSettingsRequest>,
) -> impl IntoResponse {
    match InferenceSettings::new(req.conf, req.imgsz, req.interval) {
        Ok(settings) => {
            let applied = state.orchestrator.update_settings(settings).await;
            Json(ApiResponse::success(applied)).into_response()
        }
        Err(e) => e.into_response(),
    }
}

// ========================================
// Slot Handlers
// ========================================

async fn list_slots(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.orchestrator.slots().await))
}

async fn get_slot(State(state): State<AppState>, Path(sid): Path<u8>) -> impl IntoResponse {
    match state.orchestrator.slot(sid).await {
        Ok(view) => Json(ApiResponse::success(view)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn start_slot(
    State(state): State<AppState>,
    Json(req): Json<StartSessionRequest>,
) -> impl IntoResponse {
    match state.orchestrator.start_session(req).await {
        Ok(view) => Json(ApiResponse::success(view)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn stop_slot(State(state): State<AppState>, Path(sid): Path<u8>) -> impl IntoResponse {
    match state.orchestrator.stop(sid).await {
        Ok(view) => Json(ApiResponse::success(view)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn stop_all_slots(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.orchestrator.stop_all().await;
    let notice = report
        .stopped
        .is_empty()
        .then_some("No active streams to stop.");

    Json(ApiResponse::success(json!({
        "stopped": report.stopped,
        "backend_failures": report.backend_failures,
        "notice": notice,
    })))
}

// ========================================
// Session Handlers
// ========================================

#[derive(Debug, Deserialize)]
struct SessionQuery {
    q: Option<String>,
}

async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> impl IntoResponse {
    if let Err(e) = state.ledger.refresh().await {
        return e.into_response();
    }

    let sessions = state
        .ledger
        .search(query.q.as_deref().unwrap_or_default())
        .await;
    Json(ApiResponse::success(sessions)).into_response()
}

async fn session_summary(State(state): State<AppState>) -> impl IntoResponse {
    if let Err(e) = state.ledger.refresh().await {
        return e.into_response();
    }
    Json(ApiResponse::success(state.ledger.summary().await)).into_response()
}

async fn save_active_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let running = state.orchestrator.running_sessions().await;
    let model_name = state.orchestrator.selected_model_name().await;
    let records = build_records(&running, &model_name);

    match save_sessions(state.store.as_ref(), &records).await {
        Ok(report) => Json(ApiResponse::success(report)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn delete_session(State(state): State<AppState>, Path(id): Path<i64>) -> impl IntoResponse {
    match state.ledger.delete(id).await {
        Ok(()) => Json(json!({"ok": true, "id": id})).into_response(),
        Err(e) => e.into_response(),
    }
}

fn no_data() -> axum::response::Response {
    Json(ApiResponse::success(json!({"notice": "No data to export."}))).into_response()
}

fn attachment(content_type: &'static str, extension: &str, body: String) -> axum::response::Response {
    let file_name = export_file_name(extension, chrono::Local::now().date_naive());
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        body,
    )
        .into_response()
}

async fn export_json(State(state): State<AppState>) -> impl IntoResponse {
    match state.ledger.export_json().await {
        Ok(Some(body)) => attachment("application/json", "json", body),
        Ok(None) => no_data(),
        Err(e) => e.into_response(),
    }
}

async fn export_csv(State(state): State<AppState>) -> impl IntoResponse {
    match state.ledger.export_csv().await {
        Some(body) => attachment("text/csv", "csv", body),
        None => no_data(),
    }
}
