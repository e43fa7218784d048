// The system prompt shared by every completion call.

/// The generated text lands verbatim in a note field, so the model must
/// return the field content alone.
pub const FILL_SYSTEM: &str = "You are filling in one field of a flashcard note. \
    The user message is the fully resolved instruction for that field. \
    Respond with the field content ONLY. \
    Do NOT add explanations, preamble, or surrounding quotes. \
    Do NOT wrap the answer in markdown code fences.";
