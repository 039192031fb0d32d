//! Turning retrieval results into prompt text.

use prof_buzz_model::{CompletionRequest, Message, RetrievalMatch};
use serde_json::{Map, Value};

/// The system instruction used when none is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = include_str!("system_prompt.md");

const RESULTS_HEADER: &str =
    "\n\nReturned results from vector db (done automatically): ";
const MISSING_FIELD: &str = "N/A";

/// The metadata fields of a match that end up in the prompt.
///
/// Missing and `null` fields read as `N/A`. Numbers and booleans are
/// rendered with their JSON representation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MatchMetadata {
    /// A student review of the professor.
    pub review: String,
    /// The subject the professor teaches.
    pub subject: String,
    /// The rating, usually out of five.
    pub stars: String,
}

impl MatchMetadata {
    /// Reads the fields from the metadata of a match.
    pub fn from_metadata(metadata: &Map<String, Value>) -> Self {
        Self {
            review: field_text(metadata, "review"),
            subject: field_text(metadata, "subject"),
            stars: field_text(metadata, "stars"),
        }
    }
}

fn field_text(metadata: &Map<String, Value>, key: &str) -> String {
    match metadata.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(value @ (Value::Number(_) | Value::Bool(_))) => value.to_string(),
        Some(Value::Null) | None => MISSING_FIELD.to_owned(),
        Some(other) => {
            debug!("ignoring unexpected value for `{key}`: {other}");
            MISSING_FIELD.to_owned()
        }
    }
}

/// Formats one match into a text block.
pub fn format_match(m: &RetrievalMatch) -> String {
    let metadata = MatchMetadata::from_metadata(&m.metadata);
    format!(
        "\n\nProfessor: {}\nReview: {}\nSubject: {}\nStars: {}\n",
        m.id, metadata.review, metadata.subject, metadata.stars
    )
}

/// Formats all matches, in the order they were returned, under a fixed
/// header.
pub fn format_matches(matches: &[RetrievalMatch]) -> String {
    let mut text = String::from(RESULTS_HEADER);
    for m in matches {
        text.push_str(&format_match(m));
    }
    text
}

/// Builds the augmented prompt.
///
/// The result is the system instruction, then `history` unchanged, then a
/// single user message made of `question` followed by `retrieval_text`.
pub fn build_prompt(
    system_prompt: &str,
    history: &[Message],
    question: &str,
    retrieval_text: &str,
) -> CompletionRequest {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(Message::system(system_prompt));
    messages.extend_from_slice(history);
    messages.push(Message::user(format!("{question}{retrieval_text}")));
    CompletionRequest { messages }
}
