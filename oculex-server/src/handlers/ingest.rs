//! Ingest gateway: the thin HTTP surface in front of the result store.
//!
//! Both the local patient runner and remote satellite runners deliver
//! finished tests here; the handlers hand payloads to the store and report
//! `{success, message}` like the rest of the API.

use axum::{Json, extract::Path, extract::State};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use oculex_core::EventPayload;

use crate::infra::app_state::AppState;
use crate::infra::errors::AppResult;

const UNKNOWN_PATIENT: &str = "Unknown";

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub success: bool,
    pub message: String,
}

impl StatusResponse {
    fn ok(message: &str) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct SaveTestResultRequest {
    pub test_name: String,
    #[serde(default)]
    pub patient_name: Option<String>,
    /// Category-specific keys pass through to the store untouched.
    #[serde(flatten)]
    pub fields: EventPayload,
}

/// Persist a finished test delivered by a test runner.
pub async fn save_test_result(
    State(state): State<AppState>,
    Json(request): Json<SaveTestResultRequest>,
) -> AppResult<Json<StatusResponse>> {
    let patient_name = request
        .patient_name
        .unwrap_or_else(|| UNKNOWN_PATIENT.to_string());
    info!(test = %request.test_name, patient = %patient_name, "received test result");

    state
        .store
        .submit_record(&request.test_name, &patient_name, &request.fields)?;

    Ok(StatusResponse::ok("Test result saved successfully"))
}

#[derive(Debug, Deserialize)]
pub struct SaveNotesRequest {
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(flatten)]
    pub fields: EventPayload,
}

/// Persist clinician notes for a patient.
pub async fn save_notes(
    State(state): State<AppState>,
    Json(request): Json<SaveNotesRequest>,
) -> AppResult<Json<StatusResponse>> {
    let patient_name = request
        .patient_name
        .unwrap_or_else(|| UNKNOWN_PATIENT.to_string());

    state.store.submit_note(&patient_name, &request.fields)?;

    Ok(StatusResponse::ok("Notes saved successfully"))
}

/// All stored test rows for one patient, grouped by category sheet.
pub async fn patient_history(
    State(state): State<AppState>,
    Path(patient_name): Path<String>,
) -> Json<Value> {
    let history = state.store.get_patient_history(&patient_name);
    Json(json!({
        "patient_name": patient_name,
        "history": history,
    }))
}
