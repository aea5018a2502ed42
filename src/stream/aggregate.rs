//! Non-streaming counterpart of the splice: one complete message, one rewrite.

use serde_json::{Map, Value};

use super::splice::{
    Delta, ReasoningMode, ReasoningSplicer, CONTENT_FIELD, REASONING_FIELD,
};

/// Rewrite one complete assistant message in place.
///
/// With reasoning present the content becomes
/// `OPEN_DELIMITER + reasoning + CLOSE_DELIMITER + content`, where an absent
/// content counts as empty. Without reasoning the content is unchanged.
/// Returns `true` when the message was modified.
pub fn aggregate_message(message: &mut Map<String, Value>, mode: ReasoningMode) -> bool {
    let Some(reasoning) = message.get(REASONING_FIELD).and_then(Value::as_str) else {
        return false;
    };
    if mode == ReasoningMode::Strip {
        message.remove(REASONING_FIELD);
        return true;
    }

    // Same transitions as the stream: one reasoning delta, then the content.
    let content = message
        .get(CONTENT_FIELD)
        .and_then(Value::as_str)
        .unwrap_or_default();
    let mut splicer = ReasoningSplicer::new(mode);
    let mut text = splicer.splice(Delta::reasoning(reasoning)).unwrap_or_default();
    text.push_str(&splicer.splice(Delta::visible(content)).unwrap_or_default());

    message.remove(REASONING_FIELD);
    message.insert(CONTENT_FIELD.to_string(), Value::String(text));
    true
}

/// Rewrite every `choices[].message` of a complete response record.
pub fn aggregate_record(record: &mut Value, mode: ReasoningMode) {
    let Some(choices) = record.get_mut("choices").and_then(Value::as_array_mut) else {
        return;
    };
    for choice in choices {
        if let Some(message) = choice.get_mut("message").and_then(Value::as_object_mut) {
            aggregate_message(message, mode);
        }
    }
}
