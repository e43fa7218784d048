use std::sync::Arc;

use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::llm_client::CompletionBackend;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Pluggable completion backend. Default: Anthropic; swapped for the
    /// offline backend via EMULATE_COMPLETIONS.
    pub llm: Arc<dyn CompletionBackend>,
    pub config: Config,
    /// Tripped on shutdown. Fill runs take a child token so in-flight
    /// completion calls abort instead of outliving the server.
    pub shutdown: CancellationToken,
}
