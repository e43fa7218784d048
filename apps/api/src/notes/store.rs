//! SQLite-backed note store.
//!
//! This is the service's view of the host collection: notes are seeded by the
//! host, read for rendering, and written back one target field at a time. A
//! field write that matches no row is a missing-field error, never an insert,
//! so generated text can only land in fields that already exist.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::info;

use crate::errors::AppError;
use crate::notes::{Note, NoteField};
use crate::template::TemplateError;

#[derive(Debug, FromRow)]
struct NoteRow {
    id: i64,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct FieldRow {
    name: String,
    value: String,
}

/// Seeds a note with its ordered fields.
pub async fn create_note(pool: &SqlitePool, fields: Vec<NoteField>) -> Result<Note, AppError> {
    if fields.is_empty() {
        return Err(AppError::Validation(
            "a note needs at least one field".to_string(),
        ));
    }
    for (i, field) in fields.iter().enumerate() {
        if field.name.is_empty() {
            return Err(AppError::Validation(
                "field names cannot be empty".to_string(),
            ));
        }
        if fields[..i].iter().any(|f| f.name == field.name) {
            return Err(AppError::Validation(format!(
                "duplicate field name '{}'",
                field.name
            )));
        }
    }

    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let note_id = sqlx::query("INSERT INTO notes (created_at, modified_at) VALUES (?1, ?1)")
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

    for (ord, field) in fields.iter().enumerate() {
        sqlx::query(
            "INSERT INTO note_fields (note_id, ord, name, value) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(note_id)
        .bind(ord as i64)
        .bind(&field.name)
        .bind(&field.value)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    info!("Created note {note_id} with {} fields", fields.len());

    Ok(Note {
        id: note_id,
        fields,
        created_at: now,
        modified_at: now,
    })
}

/// Fetches one note; fields come back in authoring order.
pub async fn get_note(pool: &SqlitePool, id: i64) -> Result<Option<Note>, AppError> {
    let row = sqlx::query_as::<_, NoteRow>(
        "SELECT id, created_at, modified_at FROM notes WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let fields = sqlx::query_as::<_, FieldRow>(
        "SELECT name, value FROM note_fields WHERE note_id = ?1 ORDER BY ord",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(Some(Note {
        id: row.id,
        fields: fields
            .into_iter()
            .map(|f| NoteField {
                name: f.name,
                value: f.value,
            })
            .collect(),
        created_at: row.created_at,
        modified_at: row.modified_at,
    }))
}

/// Fetches a selection of notes, in the requested order.
/// Fails with `NotFound` naming every unknown id before any other work.
pub async fn get_notes(pool: &SqlitePool, ids: &[i64]) -> Result<Vec<Note>, AppError> {
    let mut notes = Vec::with_capacity(ids.len());
    let mut unknown = Vec::new();
    for &id in ids {
        match get_note(pool, id).await? {
            Some(note) => notes.push(note),
            None => unknown.push(id.to_string()),
        }
    }
    if !unknown.is_empty() {
        return Err(AppError::NotFound(format!(
            "notes not found: {}",
            unknown.join(", ")
        )));
    }
    Ok(notes)
}

/// Persists one generated value into an existing field and bumps the note's
/// modified time. The host's save/flush counterpart.
pub async fn write_field(
    pool: &SqlitePool,
    note_id: i64,
    name: &str,
    value: &str,
) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;

    let result = sqlx::query("UPDATE note_fields SET value = ?3 WHERE note_id = ?1 AND name = ?2")
        .bind(note_id)
        .bind(name)
        .bind(value)
        .execute(&mut *tx)
        .await?;

    if result.rows_affected() == 0 {
        return Err(TemplateError::MissingField(name.to_string()).into());
    }

    sqlx::query("UPDATE notes SET modified_at = ?2 WHERE id = ?1")
        .bind(note_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}
