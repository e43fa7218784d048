//! Prompt configurations as supplied by the host front-end.

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// A reusable text-generation prompt: a named template plus the field that
/// receives the generated text. The host owns the prompt list and its
/// ordering; every request carries the full config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    pub name: String,
    pub template: String,
    pub target_field: String,
}

impl PromptConfig {
    /// Shape check, run before any other work on a request.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::Validation(
                "prompt name cannot be empty".to_string(),
            ));
        }
        if self.template.trim().is_empty() {
            return Err(AppError::Validation(
                "prompt template cannot be empty".to_string(),
            ));
        }
        if self.target_field.trim().is_empty() {
            return Err(AppError::Validation(
                "target field cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}
