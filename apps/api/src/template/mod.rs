// Prompt templating: `{{{Field}}}` placeholder extraction, validation against
// note selections, and single-pass substitution.
// Every operation here is a pure function; nothing touches the store or the
// completion backend.

pub mod engine;

pub use engine::{
    apply_generated, extract_placeholders, missing_fields, render, TemplateError,
};
