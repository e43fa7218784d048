use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub anthropic_api_key: Option<String>,
    pub emulate_completions: bool,
    pub llm_timeout: Duration,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let emulate_completions = std::env::var("EMULATE_COMPLETIONS")
            .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let anthropic_api_key = std::env::var("ANTHROPIC_API_KEY").ok();
        if !emulate_completions && anthropic_api_key.is_none() {
            bail!("ANTHROPIC_API_KEY must be set unless EMULATE_COMPLETIONS is enabled");
        }

        Ok(Config {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://fieldfill.db".to_string()),
            anthropic_api_key,
            emulate_completions,
            llm_timeout: Duration::from_secs(
                std::env::var("LLM_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "120".to_string())
                    .parse::<u64>()
                    .context("LLM_TIMEOUT_SECS must be a number of seconds")?,
            ),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}
