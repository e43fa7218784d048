//! The prompt template engine.
//!
//! Templates reference note fields with triple-brace placeholders:
//! `Translate {{{Front}}} to French`. Field names are matched exactly,
//! case-sensitive and untrimmed, because host field names may contain
//! interior spaces ("Front Extra").
//!
//! Validation precedes substitution: `missing_fields` is run over a whole
//! selection before any rendering or completion call, and `render` either
//! resolves the entire template or fails without producing output.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::notes::Note;

/// Matches `{{{FieldName}}}`. Names are any non-empty run of characters
/// other than braces.
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\{([^{}]+)\}\}\}").expect("placeholder pattern is valid"));

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("field '{0}' is not present on the note")]
    MissingField(String),
}

/// Returns the placeholder field names in order of first appearance,
/// duplicates removed.
pub fn extract_placeholders(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for cap in PLACEHOLDER.captures_iter(template) {
        let name = &cap[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Returns the placeholder names missing from at least one of the given
/// notes. An empty set means the template renders cleanly against every
/// note in the selection.
pub fn missing_fields(template: &str, notes: &[Note]) -> BTreeSet<String> {
    let mut missing = BTreeSet::new();
    for name in extract_placeholders(template) {
        if notes.iter().any(|note| note.field(&name).is_none()) {
            missing.insert(name);
        }
    }
    missing
}

/// Renders the template against one note in a single left-to-right pass.
///
/// Fails with the first missing field before any output escapes. Substituted
/// values are copied verbatim: a value that itself contains placeholder-like
/// text is never re-expanded.
pub fn render(template: &str, note: &Note) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for cap in PLACEHOLDER.captures_iter(template) {
        let m = cap.get(0).expect("capture 0 is the whole match");
        let name = &cap[1];
        let value = note
            .field(name)
            .ok_or_else(|| TemplateError::MissingField(name.to_string()))?;
        out.push_str(&template[last..m.start()]);
        out.push_str(value);
        last = m.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}

/// Returns a copy of the note with only `target_field` replaced by the
/// generated text. Side-effect free; persisting the change is the caller's
/// job.
pub fn apply_generated(
    note: &Note,
    target_field: &str,
    text: &str,
) -> Result<Note, TemplateError> {
    if note.field(target_field).is_none() {
        return Err(TemplateError::MissingField(target_field.to_string()));
    }
    let mut updated = note.clone();
    for field in &mut updated.fields {
        if field.name == target_field {
            field.value = text.to_string();
        }
    }
    Ok(updated)
}
