//! Tolerant error-pattern extraction from failed message bodies.
//!
//! Bodies are usually JSON carrying either a nested `error` object or
//! top-level `errorMessage`/`errorType`/`stackTrace`/`errorCode` fields.
//! Anything unparseable degrades to a `ParseError` pattern built from the
//! raw body; extraction never fails.

use crate::models::{
    service_from_queue, ErrorPattern, MAX_ERROR_MESSAGE_CHARS, MAX_STACK_FRAMES,
};
use serde_json::Value;

const ELLIPSIS: &str = "...";

/// Extract the error pattern from a message body.
pub fn extract_error_pattern(body: &str, source_queue: &str) -> ErrorPattern {
    let affected_service = service_from_queue(source_queue);

    match parse_structured(body) {
        Some((error_type, message, stack, code)) => ErrorPattern {
            error_type,
            message: truncate_chars(&message, MAX_ERROR_MESSAGE_CHARS),
            stack_top: stack.map(|s| truncate_stack(&s)),
            code,
            affected_service,
        },
        None => ErrorPattern {
            error_type: "ParseError".to_string(),
            message: truncate_chars(body, MAX_ERROR_MESSAGE_CHARS),
            stack_top: None,
            code: None,
            affected_service,
        },
    }
}

/// Returns (type, message, stack, code) when the body carries a
/// recognizable error shape.
fn parse_structured(body: &str) -> Option<(String, String, Option<String>, Option<String>)> {
    let value: Value = serde_json::from_str(body).ok()?;
    let obj = value.as_object()?;

    // Nested error envelope: error.{name,message,stack,code}
    if let Some(error) = obj.get("error").and_then(Value::as_object) {
        let message = error.get("message").and_then(Value::as_str)?.to_string();
        let error_type = error
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("Error")
            .to_string();
        let stack = error
            .get("stack")
            .and_then(Value::as_str)
            .map(str::to_string);
        let code = error.get("code").map(stringify_scalar);
        return Some((error_type, message, stack, code));
    }

    // Top-level runtime fields
    let message = obj.get("errorMessage").and_then(Value::as_str)?.to_string();
    let error_type = obj
        .get("errorType")
        .and_then(Value::as_str)
        .unwrap_or("Error")
        .to_string();
    let stack = obj.get("stackTrace").and_then(|raw| match raw {
        Value::String(s) => Some(s.clone()),
        // stackTrace as an array of frames is permitted and joined
        Value::Array(frames) => Some(
            frames
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        _ => None,
    });
    let code = obj.get("errorCode").map(stringify_scalar);
    Some((error_type, message, stack, code))
}

fn stringify_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Hard-truncate to `max` characters, appending an ellipsis marker
pub fn truncate_chars(input: &str, max: usize) -> String {
    if input.chars().count() <= max {
        return input.to_string();
    }
    let truncated: String = input.chars().take(max).collect();
    format!("{truncated}{ELLIPSIS}")
}

/// Keep the error line plus the top frames of a stack trace
fn truncate_stack(stack: &str) -> Vec<String> {
    stack
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(MAX_STACK_FRAMES + 1)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_error_envelope() {
        let body = r#"{"error":{"name":"NetworkError","message":"ETIMEDOUT: socket hang up","code":"ETIMEDOUT"}}"#;
        let pattern = extract_error_pattern(body, "orders-dlq");

        assert_eq!(pattern.error_type, "NetworkError");
        assert_eq!(pattern.message, "ETIMEDOUT: socket hang up");
        assert_eq!(pattern.code.as_deref(), Some("ETIMEDOUT"));
        assert_eq!(pattern.affected_service, "Orders");
    }

    #[test]
    fn test_top_level_runtime_fields() {
        let body = r#"{"errorMessage":"Cannot read property 'length' of null","errorType":"TypeError"}"#;
        let pattern = extract_error_pattern(body, "payment-processing-dlq");

        assert_eq!(pattern.error_type, "TypeError");
        assert_eq!(pattern.message, "Cannot read property 'length' of null");
        assert_eq!(pattern.affected_service, "PaymentProcessing");
    }

    #[test]
    fn test_stack_trace_array_joined_and_truncated() {
        let body = r#"{"errorMessage":"boom","errorType":"Error","stackTrace":["Error: boom","at a (app.js:1)","at b (app.js:2)","at c (app.js:3)","at d (app.js:4)","at e (app.js:5)"]}"#;
        let pattern = extract_error_pattern(body, "orders-dlq");

        let stack = pattern.stack_top.unwrap();
        assert_eq!(stack.len(), MAX_STACK_FRAMES + 1);
        assert_eq!(stack[0], "Error: boom");
        assert_eq!(stack[3], "at c (app.js:3)");
    }

    #[test]
    fn test_unparseable_body_degrades_to_parse_error() {
        let pattern = extract_error_pattern("not json at all", "orders-dlq");
        assert_eq!(pattern.error_type, "ParseError");
        assert_eq!(pattern.message, "not json at all");
        assert!(pattern.stack_top.is_none());
    }

    #[test]
    fn test_json_without_error_fields_degrades_to_parse_error() {
        let pattern = extract_error_pattern(r#"{"payload":42}"#, "orders-dlq");
        assert_eq!(pattern.error_type, "ParseError");
    }

    #[test]
    fn test_long_message_hard_truncated_with_ellipsis() {
        let long = "x".repeat(800);
        let body = format!(r#"{{"errorMessage":"{long}","errorType":"Error"}}"#);
        let pattern = extract_error_pattern(&body, "orders-dlq");

        assert_eq!(pattern.message.chars().count(), MAX_ERROR_MESSAGE_CHARS + 3);
        assert!(pattern.message.ends_with("..."));
    }

    #[test]
    fn test_long_unparseable_body_truncated() {
        let long = "y".repeat(700);
        let pattern = extract_error_pattern(&long, "orders-dlq");
        assert_eq!(pattern.error_type, "ParseError");
        assert_eq!(pattern.message.chars().count(), MAX_ERROR_MESSAGE_CHARS + 3);
    }

    #[test]
    fn test_numeric_error_code_stringified() {
        let body = r#"{"errorMessage":"denied","errorType":"HttpError","errorCode":503}"#;
        let pattern = extract_error_pattern(body, "orders-dlq");
        assert_eq!(pattern.code.as_deref(), Some("503"));
    }
}
