//! Axum route handlers for template validation, preview, and fill runs.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::fill::runner::{run_fill, ErrorPolicy, FillReport, FillRequest};
use crate::notes::{store, Note};
use crate::prompts::PromptConfig;
use crate::state::AppState;
use crate::template;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub note_ids: Vec<i64>,
    pub template: String,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub ok: bool,
    pub placeholders: Vec<String>,
    pub missing_fields: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    pub note_id: i64,
    pub template: String,
}

#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub resolved: String,
}

#[derive(Debug, Deserialize)]
pub struct SingleFillRequest {
    pub prompt: PromptConfig,
}

#[derive(Debug, Serialize)]
pub struct SingleFillResponse {
    pub report: FillReport,
    pub note: Note,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/prompts/validate
///
/// Checks a template against a selection of notes, reporting every
/// placeholder that is missing somewhere, before any completion call is
/// spent.
pub async fn handle_validate(
    State(state): State<AppState>,
    Json(request): Json<ValidateRequest>,
) -> Result<Json<ValidateResponse>, AppError> {
    if request.template.trim().is_empty() {
        return Err(AppError::Validation("template cannot be empty".to_string()));
    }
    if request.note_ids.is_empty() {
        return Err(AppError::Validation("note_ids cannot be empty".to_string()));
    }

    let notes = store::get_notes(&state.db, &request.note_ids).await?;
    let placeholders = template::extract_placeholders(&request.template);
    let missing_fields: Vec<String> = template::missing_fields(&request.template, &notes)
        .into_iter()
        .collect();

    Ok(Json(ValidateResponse {
        ok: missing_fields.is_empty(),
        placeholders,
        missing_fields,
    }))
}

/// POST /api/v1/fill/preview
///
/// Renders a template against one note without calling the completion API.
/// Lets the host dialog show the resolved prompt before a run.
pub async fn handle_preview(
    State(state): State<AppState>,
    Json(request): Json<PreviewRequest>,
) -> Result<Json<PreviewResponse>, AppError> {
    if request.template.trim().is_empty() {
        return Err(AppError::Validation("template cannot be empty".to_string()));
    }

    let note = store::get_note(&state.db, request.note_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Note {} not found", request.note_id)))?;

    let resolved = template::render(&request.template, &note)?;
    Ok(Json(PreviewResponse { resolved }))
}

/// POST /api/v1/fill
///
/// Batch fill: applies one prompt config to a selection of notes. Per-note
/// failure handling follows the request's `on_error` policy (default:
/// skip_note).
pub async fn handle_fill(
    State(state): State<AppState>,
    Json(request): Json<FillRequest>,
) -> Result<Json<FillReport>, AppError> {
    let cancel = state.shutdown.child_token();
    let report = run_fill(&state.db, state.llm.as_ref(), &request, &cancel).await?;
    Ok(Json(report))
}

/// POST /api/v1/notes/:id/fill
///
/// Single-note fill, used while editing or adding one card. Any failure
/// aborts the request.
pub async fn handle_fill_single(
    State(state): State<AppState>,
    Path(note_id): Path<i64>,
    Json(request): Json<SingleFillRequest>,
) -> Result<Json<SingleFillResponse>, AppError> {
    let fill = FillRequest {
        note_ids: vec![note_id],
        prompt: request.prompt,
        on_error: ErrorPolicy::Abort,
    };

    let cancel = state.shutdown.child_token();
    let report = run_fill(&state.db, state.llm.as_ref(), &fill, &cancel).await?;

    let note = store::get_note(&state.db, note_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Note {note_id} not found")))?;

    Ok(Json(SingleFillResponse { report, note }))
}
