use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Error message hard cap applied by the body parser (plus ellipsis marker).
pub const MAX_ERROR_MESSAGE_CHARS: usize = 500;

/// Stack traces are truncated to this many frames beyond the error line.
pub const MAX_STACK_FRAMES: usize = 3;

/// Error pattern extracted from a failed message body
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct ErrorPattern {
    /// Error type name (`NetworkError`, `TypeError`, `ParseError`, ...)
    #[validate(length(min = 1, max = 255))]
    pub error_type: String,

    /// Error message, truncated to 500 characters
    #[validate(length(max = 503))]
    pub message: String,

    /// Top stack frames (error line plus up to 3 frames)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_top: Option<Vec<String>>,

    /// Error code when the body carried one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Service derived from the source queue name
    pub affected_service: String,
}

/// A deployment observed near the failure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeploymentRecord {
    pub id: String,
    pub version: String,
    pub deployed_at: DateTime<Utc>,
    pub author: String,
}

/// The unit flowing between Monitor and Analyzer: a DLQ message augmented
/// with retry history, pattern-extracted error and deployment context.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EnrichedMessage {
    /// Unique within the source queue
    #[validate(length(min = 1))]
    pub message_id: String,

    /// Opaque token used to delete the message from the source queue
    pub receipt_token: String,

    /// Queue the message was received from
    #[validate(length(min = 1))]
    pub source_queue: String,

    /// Raw message body, opaque to the pipeline
    pub body: String,

    /// Times the queue service has delivered this message
    pub receive_count: u32,

    /// First observation by the monitor
    pub first_seen_at: DateTime<Utc>,

    /// Most recent failure observation
    pub last_failed_at: DateTime<Utc>,

    /// Monitor-maintained retry count from the deduplication ledger
    pub retry_count: u32,

    /// Classified failures from the same queue in the last hour
    pub similar_failures_last_hour: u64,

    /// Deployments within the correlation window, most recent first
    #[serde(default)]
    pub recent_deployments: Vec<DeploymentRecord>,

    /// Extracted error pattern
    #[validate(nested)]
    pub error_pattern: ErrorPattern,
}

impl EnrichedMessage {
    /// The queue this message originally failed in, i.e. the replay target.
    /// Strips the DLQ suffix from the source queue name.
    pub fn original_queue(&self) -> String {
        strip_dlq_suffix(&self.source_queue).to_string()
    }
}

/// Strip a `-dlq` / `_dlq` suffix (case-insensitive) from a queue name
pub fn strip_dlq_suffix(queue: &str) -> &str {
    let lower = queue.to_lowercase();
    if lower.ends_with("-dlq") || lower.ends_with("_dlq") {
        &queue[..queue.len() - 4]
    } else {
        queue
    }
}

/// Derive the affected service from a queue name: strip the DLQ suffix and
/// convert to PascalCase (`payment-processing-dlq` -> `PaymentProcessing`).
pub fn service_from_queue(queue: &str) -> String {
    strip_dlq_suffix(queue)
        .split(|c| c == '-' || c == '_' || c == '.')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_dlq_suffix() {
        assert_eq!(strip_dlq_suffix("orders-dlq"), "orders");
        assert_eq!(strip_dlq_suffix("orders_dlq"), "orders");
        assert_eq!(strip_dlq_suffix("orders-DLQ"), "orders");
        assert_eq!(strip_dlq_suffix("orders"), "orders");
    }

    #[test]
    fn test_service_from_queue() {
        assert_eq!(service_from_queue("payment-processing-dlq"), "PaymentProcessing");
        assert_eq!(service_from_queue("orders_dlq"), "Orders");
        assert_eq!(service_from_queue("user.events-dlq"), "UserEvents");
    }

    #[test]
    fn test_original_queue() {
        let msg = sample_message("payment-processing-dlq");
        assert_eq!(msg.original_queue(), "payment-processing");
    }

    fn sample_message(queue: &str) -> EnrichedMessage {
        EnrichedMessage {
            message_id: "m-1".to_string(),
            receipt_token: "r-1".to_string(),
            source_queue: queue.to_string(),
            body: "{}".to_string(),
            receive_count: 1,
            first_seen_at: Utc::now(),
            last_failed_at: Utc::now(),
            retry_count: 0,
            similar_failures_last_hour: 0,
            recent_deployments: vec![],
            error_pattern: ErrorPattern {
                error_type: "Error".to_string(),
                message: "boom".to_string(),
                stack_top: None,
                code: None,
                affected_service: service_from_queue(queue),
            },
        }
    }
}
