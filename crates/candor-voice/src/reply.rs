//! Agent reply normalization.
//!
//! Agent workflows answer in several shapes: a bare string, a JSON string, an object
//! with the text under one of several field names, or an array whose first element
//! is that object. Everything is reduced to a [`ReplyText`] plus the parsed payload
//! (the payload is what the deduplicator keys on).

use serde_json::Value;

/// Lookup order for the reply text inside an object payload.
pub const PRIMARY_TEXT_FIELDS: &[&str] = &[
    "output",
    "response",
    "message",
    "ai_response",
    "text",
    "content",
    "greeting",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyText {
    Text(String),
    /// Empty or whitespace-only body, or an object with no usable text. Not an error.
    Empty,
    /// Parsed JSON with no recognizable shape; carries the raw payload for logs.
    Malformed(String),
}

impl ReplyText {
    pub fn text(&self) -> Option<&str> {
        match self {
            ReplyText::Text(t) => Some(t.as_str()),
            _ => None,
        }
    }
}

/// Parse a response body. Non-JSON bodies are treated as plain text.
pub fn normalize_reply(body: &str) -> (ReplyText, Value) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (ReplyText::Empty, Value::Null);
    }
    let payload = match serde_json::from_str::<Value>(trimmed) {
        Ok(v) => v,
        Err(_) => Value::String(trimmed.to_string()),
    };
    (extract_text(&payload), payload)
}

/// Text of an already-parsed payload.
pub fn extract_text(payload: &Value) -> ReplyText {
    match payload {
        Value::Null => ReplyText::Empty,
        Value::String(s) => non_blank(s),
        Value::Array(items) => match items.first() {
            Some(first) => extract_text(first),
            None => ReplyText::Empty,
        },
        Value::Object(map) => {
            match PRIMARY_TEXT_FIELDS
                .iter()
                .find_map(|f| map.get(*f).and_then(Value::as_str))
            {
                Some(text) => non_blank(text),
                None if map.is_empty() => ReplyText::Empty,
                None => ReplyText::Malformed(payload.to_string()),
            }
        }
        other => ReplyText::Malformed(other.to_string()),
    }
}

fn non_blank(s: &str) -> ReplyText {
    let t = s.trim();
    if t.is_empty() {
        ReplyText::Empty
    } else {
        ReplyText::Text(t.to_string())
    }
}
