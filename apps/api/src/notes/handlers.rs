//! Axum route handlers for the note store.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::notes::{common_fields, store, Note, NoteField};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateNoteRequest {
    pub fields: Vec<NoteField>,
}

#[derive(Debug, Deserialize)]
pub struct CommonFieldsRequest {
    pub note_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct CommonFieldsResponse {
    pub common_fields: Vec<String>,
}

/// POST /api/v1/notes
///
/// Seeds a note with its ordered fields. Notes normally come from the host
/// collection; this endpoint exists so a host can sync them in.
pub async fn handle_create_note(
    State(state): State<AppState>,
    Json(request): Json<CreateNoteRequest>,
) -> Result<Json<Note>, AppError> {
    let note = store::create_note(&state.db, request.fields).await?;
    Ok(Json(note))
}

/// GET /api/v1/notes/:id
pub async fn handle_get_note(
    State(state): State<AppState>,
    Path(note_id): Path<i64>,
) -> Result<Json<Note>, AppError> {
    let note = store::get_note(&state.db, note_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Note {note_id} not found")))?;
    Ok(Json(note))
}

/// POST /api/v1/notes/common-fields
///
/// Field names present on every note of a selection, in the first note's
/// order. The host UI uses this to populate placeholder and target-field
/// pickers for a multi-note run.
pub async fn handle_common_fields(
    State(state): State<AppState>,
    Json(request): Json<CommonFieldsRequest>,
) -> Result<Json<CommonFieldsResponse>, AppError> {
    if request.note_ids.is_empty() {
        return Err(AppError::Validation("note_ids cannot be empty".to_string()));
    }

    let notes = store::get_notes(&state.db, &request.note_ids).await?;
    Ok(Json(CommonFieldsResponse {
        common_fields: common_fields(&notes),
    }))
}
