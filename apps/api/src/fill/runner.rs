//! Fill pipeline: runs one prompt config over a selection of notes.
//!
//! Flow: load notes → validate the template against every note → per note:
//! render → complete → apply → persist. Validation runs before the first
//! completion call, so a broken template costs zero upstream requests and the
//! user sees every offending field name at once.
//!
//! Notes are processed strictly sequentially; the completion call is the only
//! suspension point and honors the run's cancellation token.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::llm_client::{CompletionBackend, CompletionError};
use crate::notes::{store, Note};
use crate::prompts::PromptConfig;
use crate::template;

// ────────────────────────────────────────────────────────────────────────────
// Request / report types
// ────────────────────────────────────────────────────────────────────────────

/// What to do with the rest of a batch when one note fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Record the failure in the report and continue with the remaining notes.
    #[default]
    SkipNote,
    /// Fail the whole run at the first per-note error.
    Abort,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FillRequest {
    pub note_ids: Vec<i64>,
    pub prompt: PromptConfig,
    #[serde(default)]
    pub on_error: ErrorPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteStatus {
    Filled,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct NoteOutcome {
    pub note_id: i64,
    pub status: NoteStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FillReport {
    pub run_id: Uuid,
    pub prompt_name: String,
    pub requested: usize,
    pub filled: usize,
    pub failed: usize,
    pub outcomes: Vec<NoteOutcome>,
}

// ────────────────────────────────────────────────────────────────────────────
// Pipeline
// ────────────────────────────────────────────────────────────────────────────

/// Runs the full fill pipeline for one request.
///
/// Steps:
/// 1. Prompt config shape check.
/// 2. Load every requested note (unknown ids fail the run up front).
/// 3. Validate the template against the whole selection; any missing
///    placeholder field fails the run before a single completion call,
///    listing every offending name.
/// 4. Per note: render → complete → apply → persist, with per-note failures
///    resolved by the request's `on_error` policy. Cancellation always
///    aborts the run.
pub async fn run_fill(
    pool: &SqlitePool,
    backend: &dyn CompletionBackend,
    request: &FillRequest,
    cancel: &CancellationToken,
) -> Result<FillReport, AppError> {
    request.prompt.validate()?;
    if request.note_ids.is_empty() {
        return Err(AppError::Validation("note_ids cannot be empty".to_string()));
    }

    let notes = store::get_notes(pool, &request.note_ids).await?;

    let missing = template::missing_fields(&request.prompt.template, &notes);
    if !missing.is_empty() {
        return Err(AppError::Validation(format!(
            "template references fields missing from the selection: {}",
            missing.into_iter().collect::<Vec<_>>().join(", ")
        )));
    }

    let run_id = Uuid::new_v4();
    info!(
        "Fill run {run_id} ('{}'): {} notes, target field '{}'",
        request.prompt.name,
        notes.len(),
        request.prompt.target_field
    );

    let mut outcomes: Vec<NoteOutcome> = Vec::with_capacity(notes.len());
    for note in &notes {
        if cancel.is_cancelled() {
            warn!(
                "Fill run {run_id} cancelled after {} of {} notes",
                outcomes.len(),
                notes.len()
            );
            return Err(CompletionError::Cancelled.into());
        }

        match fill_note(pool, backend, &request.prompt, note, cancel).await {
            Ok(generated) => outcomes.push(NoteOutcome {
                note_id: note.id,
                status: NoteStatus::Filled,
                generated: Some(generated),
                error: None,
            }),
            Err(err) => {
                if matches!(err, AppError::Completion(CompletionError::Cancelled)) {
                    warn!(
                        "Fill run {run_id} cancelled after {} of {} notes",
                        outcomes.len(),
                        notes.len()
                    );
                    return Err(err);
                }
                match request.on_error {
                    ErrorPolicy::SkipNote => {
                        warn!("Fill run {run_id}: note {} failed: {err}", note.id);
                        outcomes.push(NoteOutcome {
                            note_id: note.id,
                            status: NoteStatus::Failed,
                            generated: None,
                            error: Some(err.to_string()),
                        });
                    }
                    ErrorPolicy::Abort => {
                        warn!("Fill run {run_id} aborted at note {}: {err}", note.id);
                        return Err(err);
                    }
                }
            }
        }
    }

    let filled = outcomes
        .iter()
        .filter(|o| o.status == NoteStatus::Filled)
        .count();
    let failed = outcomes.len() - filled;
    info!("Fill run {run_id} finished: {filled} filled, {failed} failed");

    Ok(FillReport {
        run_id,
        prompt_name: request.prompt.name.clone(),
        requested: request.note_ids.len(),
        filled,
        failed,
        outcomes,
    })
}

/// Fills one note: resolve the template, generate, apply, persist.
async fn fill_note(
    pool: &SqlitePool,
    backend: &dyn CompletionBackend,
    prompt: &PromptConfig,
    note: &Note,
    cancel: &CancellationToken,
) -> Result<String, AppError> {
    let resolved = template::render(&prompt.template, note)?;
    let generated = backend.complete(&resolved, cancel).await?;
    // apply_generated verifies the target field before any write reaches
    // the store
    let updated = template::apply_generated(note, &prompt.target_field, &generated)?;
    store::write_field(pool, updated.id, &prompt.target_field, &generated).await?;
    Ok(generated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use sqlx::sqlite::SqlitePoolOptions;

    use crate::notes::NoteField;
    use crate::template::TemplateError;

    /// Counts completion calls and answers with a fixed text.
    struct CountingBackend {
        calls: AtomicUsize,
        response: String,
    }

    impl CountingBackend {
        fn new(response: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                response: response.to_string(),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionBackend for CountingBackend {
        async fn complete(
            &self,
            _prompt: &str,
            cancel: &CancellationToken,
        ) -> Result<String, CompletionError> {
            if cancel.is_cancelled() {
                return Err(CompletionError::Cancelled);
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.response.clone())
        }
    }

    /// Fails every call with an API error.
    struct FailingBackend;

    #[async_trait]
    impl CompletionBackend for FailingBackend {
        async fn complete(
            &self,
            _prompt: &str,
            _cancel: &CancellationToken,
        ) -> Result<String, CompletionError> {
            Err(CompletionError::Api {
                status: 500,
                message: "upstream exploded".to_string(),
            })
        }
    }

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::init_schema(&pool).await.unwrap();
        pool
    }

    async fn seed(pool: &SqlitePool, fields: &[(&str, &str)]) -> i64 {
        store::create_note(
            pool,
            fields
                .iter()
                .map(|(name, value)| NoteField {
                    name: name.to_string(),
                    value: value.to_string(),
                })
                .collect(),
        )
        .await
        .unwrap()
        .id
    }

    fn request(note_ids: Vec<i64>, template: &str, target: &str, on_error: ErrorPolicy) -> FillRequest {
        FillRequest {
            note_ids,
            prompt: PromptConfig {
                name: "French".to_string(),
                template: template.to_string(),
                target_field: target.to_string(),
            },
            on_error,
        }
    }

    #[tokio::test]
    async fn test_batch_fill_writes_target_fields() {
        let pool = test_pool().await;
        let a = seed(&pool, &[("Front", "hello"), ("Back", "")]).await;
        let b = seed(&pool, &[("Front", "world"), ("Back", "")]).await;
        let backend = CountingBackend::new("bonjour");

        let report = run_fill(
            &pool,
            &backend,
            &request(vec![a, b], "Translate {{{Front}}} to French", "Back", ErrorPolicy::SkipNote),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(report.requested, 2);
        assert_eq!(report.filled, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(backend.calls(), 2);
        for id in [a, b] {
            let note = store::get_note(&pool, id).await.unwrap().unwrap();
            assert_eq!(note.field("Back"), Some("bonjour"));
        }
    }

    #[tokio::test]
    async fn test_validation_failure_makes_no_completion_calls() {
        let pool = test_pool().await;
        let a = seed(&pool, &[("Front", "hello")]).await;
        let backend = CountingBackend::new("unused");

        let err = run_fill(
            &pool,
            &backend,
            &request(vec![a], "{{{Missing}}} and {{{AlsoMissing}}}", "Front", ErrorPolicy::SkipNote),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        match err {
            AppError::Validation(msg) => {
                assert!(msg.contains("Missing"));
                assert!(msg.contains("AlsoMissing"));
            }
            other => panic!("expected Validation, got {other:?}"),
        }
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_note_id_fails_before_completion() {
        let pool = test_pool().await;
        let backend = CountingBackend::new("unused");

        let err = run_fill(
            &pool,
            &backend,
            &request(vec![404], "hi", "Front", ErrorPolicy::SkipNote),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_skip_note_policy_continues_past_missing_target() {
        let pool = test_pool().await;
        // template fields exist everywhere; only the target is uneven
        let bad = seed(&pool, &[("Front", "a")]).await;
        let good = seed(&pool, &[("Front", "b"), ("Back", "")]).await;
        let backend = CountingBackend::new("bonjour");

        let report = run_fill(
            &pool,
            &backend,
            &request(vec![bad, good], "{{{Front}}}", "Back", ErrorPolicy::SkipNote),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(report.filled, 1);
        assert_eq!(report.failed, 1);
        let failure = &report.outcomes[0];
        assert_eq!(failure.note_id, bad);
        assert_eq!(failure.status, NoteStatus::Failed);
        assert!(failure.error.as_deref().unwrap().contains("Back"));

        let filled = store::get_note(&pool, good).await.unwrap().unwrap();
        assert_eq!(filled.field("Back"), Some("bonjour"));
    }

    #[tokio::test]
    async fn test_abort_policy_stops_at_first_failure() {
        let pool = test_pool().await;
        let bad = seed(&pool, &[("Front", "a")]).await;
        let good = seed(&pool, &[("Front", "b"), ("Back", "old")]).await;
        let backend = CountingBackend::new("bonjour");

        let err = run_fill(
            &pool,
            &backend,
            &request(vec![bad, good], "{{{Front}}}", "Back", ErrorPolicy::Abort),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            AppError::Template(TemplateError::MissingField(ref name)) if name == "Back"
        ));
        // the run stopped before touching the second note
        assert_eq!(backend.calls(), 1);
        let untouched = store::get_note(&pool, good).await.unwrap().unwrap();
        assert_eq!(untouched.field("Back"), Some("old"));
    }

    #[tokio::test]
    async fn test_upstream_failure_skip_records_all_failures() {
        let pool = test_pool().await;
        let a = seed(&pool, &[("Front", "a"), ("Back", "old")]).await;
        let b = seed(&pool, &[("Front", "b"), ("Back", "old")]).await;

        let report = run_fill(
            &pool,
            &FailingBackend,
            &request(vec![a, b], "{{{Front}}}", "Back", ErrorPolicy::SkipNote),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(report.filled, 0);
        assert_eq!(report.failed, 2);
        for id in [a, b] {
            let note = store::get_note(&pool, id).await.unwrap().unwrap();
            assert_eq!(note.field("Back"), Some("old"));
        }
    }

    #[tokio::test]
    async fn test_cancelled_token_aborts_run() {
        let pool = test_pool().await;
        let a = seed(&pool, &[("Front", "a"), ("Back", "old")]).await;
        let backend = CountingBackend::new("bonjour");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = run_fill(
            &pool,
            &backend,
            &request(vec![a], "{{{Front}}}", "Back", ErrorPolicy::SkipNote),
            &cancel,
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            AppError::Completion(CompletionError::Cancelled)
        ));
        assert_eq!(backend.calls(), 0);
        let untouched = store::get_note(&pool, a).await.unwrap().unwrap();
        assert_eq!(untouched.field("Back"), Some("old"));
    }

    #[tokio::test]
    async fn test_empty_note_ids_rejected() {
        let pool = test_pool().await;
        let backend = CountingBackend::new("unused");

        let err = run_fill(
            &pool,
            &backend,
            &request(vec![], "hi", "Back", ErrorPolicy::SkipNote),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
    }
}
