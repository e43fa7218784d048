// The note model and the store behind it. A note is owned by the host
// application; this service only reads fields and writes back single
// generated values.

pub mod handlers;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One named text value within a note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteField {
    pub name: String,
    pub value: String,
}

/// A single flashcard note: an ordered set of uniquely named text fields.
///
/// Field order is the host's authoring order. The JSON shape keeps fields as
/// an array of `{name, value}` objects so that order survives serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: i64,
    pub fields: Vec<NoteField>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Note {
    /// Looks up a field value by exact name.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

/// Field names present on every note of a selection, in the first note's
/// order. The host UI offers only these as placeholder and target choices,
/// so a prompt built from them is safe for the whole selection.
pub fn common_fields(notes: &[Note]) -> Vec<String> {
    let Some((first, rest)) = notes.split_first() else {
        return Vec::new();
    };
    first
        .field_names()
        .filter(|name| rest.iter().all(|note| note.field(name).is_some()))
        .map(str::to_string)
        .collect()
}
