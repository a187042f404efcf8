use serde_json::{ Map, Value };

use crate::error::ValidationError;
use crate::models::chat::{ ChatMessage, Conversation, Role };

/// A decoded `/api/chat` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub conversation: Conversation,
    /// Explicit `stream` flag from the body, if the client sent one.
    pub stream: Option<bool>,
}

/// Decodes a raw request body. An empty body counts as an absent conversation.
pub fn parse_request(body: &[u8]) -> Result<ChatRequest, ValidationError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return validate(None).map(|conversation| ChatRequest { conversation, stream: None });
    }

    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ValidationError::InvalidPayload(e.to_string()))?;
    let stream = value
        .as_object()
        .and_then(|obj| obj.get("stream"))
        .and_then(Value::as_bool);

    let conversation = validate(Some(value))?;
    Ok(ChatRequest { conversation, stream })
}

/// Normalizes a message, a list of messages, or `{ messages: [...] }` into a
/// non-empty conversation. Missing roles become `user`, missing content `""`.
pub fn validate(raw: Option<Value>) -> Result<Conversation, ValidationError> {
    let entries = match raw {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(Value::Object(mut obj)) => {
            match obj.remove("messages") {
                Some(Value::Array(items)) => items,
                Some(Value::Null) => Vec::new(),
                Some(other) => {
                    return Err(ValidationError::InvalidPayload(
                        format!("'messages' must be an array, got {}", kind(&other))
                    ));
                }
                None => vec![Value::Object(obj)],
            }
        }
        Some(other) => {
            return Err(ValidationError::InvalidPayload(
                format!("expected an object or array, got {}", kind(&other))
            ));
        }
    };

    if entries.is_empty() {
        return Err(ValidationError::EmptyConversation);
    }

    entries
        .into_iter()
        .map(normalize_entry)
        .collect::<Result<Vec<_>, _>>()
        .map(Conversation::new)
}

fn normalize_entry(entry: Value) -> Result<ChatMessage, ValidationError> {
    match entry {
        Value::Object(obj) => Ok(message_from_object(&obj)),
        other =>
            Err(ValidationError::InvalidPayload(
                format!("message entries must be objects, got {}", kind(&other))
            )),
    }
}

fn message_from_object(obj: &Map<String, Value>) -> ChatMessage {
    let role = Role::from_client(obj.get("role").and_then(Value::as_str));
    let content = match obj.get("content") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    ChatMessage::new(role, content)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
