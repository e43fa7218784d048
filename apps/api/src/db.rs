use std::str::FromStr;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

/// Creates the SQLite connection pool, creating the database file on first
/// run, and ensures the schema exists.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    info!("Opening note collection at {database_url}");

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    init_schema(&pool).await?;

    info!("Note collection ready");
    Ok(pool)
}

/// Idempotent schema setup. Field order is kept in `ord`; `(note_id, name)`
/// uniqueness backs the one-row-or-missing contract of field writes.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS notes (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            created_at  TEXT NOT NULL,
            modified_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS note_fields (
            note_id INTEGER NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
            ord     INTEGER NOT NULL,
            name    TEXT NOT NULL,
            value   TEXT NOT NULL DEFAULT '',
            PRIMARY KEY (note_id, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::{store, NoteField};

    #[tokio::test]
    async fn test_create_pool_creates_file_and_usable_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collection.db");
        let url = format!("sqlite://{}", path.display());

        let pool = create_pool(&url).await.unwrap();
        assert!(path.exists());

        let note = store::create_note(
            &pool,
            vec![NoteField {
                name: "Front".to_string(),
                value: "hello".to_string(),
            }],
        )
        .await
        .unwrap();
        assert_eq!(
            store::get_note(&pool, note.id).await.unwrap().unwrap().id,
            note.id
        );
    }

    #[tokio::test]
    async fn test_init_schema_is_idempotent() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init_schema(&pool).await.unwrap();
        init_schema(&pool).await.unwrap();
    }
}
