//! Event types linking the pipeline stages

use crate::models::{Classification, EnrichedMessage};
use serde::{Deserialize, Serialize};

/// Events flowing on the pipeline bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// A DLQ message was enriched by the monitor
    MessageEnriched { message: EnrichedMessage },

    /// An enriched message was classified by the analyzer
    MessageClassified {
        message: EnrichedMessage,
        classification: Classification,
    },
}

impl PipelineEvent {
    /// Component that emits this event
    pub fn source(&self) -> &'static str {
        match self {
            PipelineEvent::MessageEnriched { .. } => "monitor",
            PipelineEvent::MessageClassified { .. } => "analyzer",
        }
    }

    /// Detail type for coarse routing. Classified events carry the
    /// action-derived type so executors can filter without deserializing.
    pub fn detail_type(&self) -> &'static str {
        match self {
            PipelineEvent::MessageEnriched { .. } => "MessageEnriched",
            PipelineEvent::MessageClassified { classification, .. } => {
                classification.recommended_action.detail_type()
            }
        }
    }

    /// Message id carried by any event
    pub fn message_id(&self) -> &str {
        match self {
            PipelineEvent::MessageEnriched { message }
            | PipelineEvent::MessageClassified { message, .. } => &message.message_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ErrorPattern, FailureCategory, ModelTag, RecommendedAction, TokenUsage,
    };
    use chrono::Utc;

    fn message() -> EnrichedMessage {
        EnrichedMessage {
            message_id: "m-1".to_string(),
            receipt_token: "r-1".to_string(),
            source_queue: "orders-dlq".to_string(),
            body: "{}".to_string(),
            receive_count: 1,
            first_seen_at: Utc::now(),
            last_failed_at: Utc::now(),
            retry_count: 0,
            similar_failures_last_hour: 0,
            recent_deployments: vec![],
            error_pattern: ErrorPattern {
                error_type: "NetworkError".to_string(),
                message: "ETIMEDOUT".to_string(),
                stack_top: None,
                code: None,
                affected_service: "Orders".to_string(),
            },
        }
    }

    #[test]
    fn test_event_source_and_ids() {
        let event = PipelineEvent::MessageEnriched { message: message() };
        assert_eq!(event.source(), "monitor");
        assert_eq!(event.detail_type(), "MessageEnriched");
        assert_eq!(event.message_id(), "m-1");
    }

    #[test]
    fn test_classified_detail_type_follows_action() {
        let classification = Classification {
            category: FailureCategory::PoisonPill,
            confidence: 0.95,
            reasoning: "null dereference".to_string(),
            model_tag: ModelTag::Heuristic,
            tokens: TokenUsage::default(),
            semantic_hash: "abcdef0123456789".to_string(),
            suspected_deployment: None,
            recommended_action: RecommendedAction::Archive,
        };
        let event = PipelineEvent::MessageClassified {
            message: message(),
            classification,
        };
        assert_eq!(event.source(), "analyzer");
        assert_eq!(event.detail_type(), "PoisonPillFailure");
    }

    #[test]
    fn test_event_round_trips_through_json() {
        let event = PipelineEvent::MessageEnriched { message: message() };
        let json = serde_json::to_string(&event).unwrap();
        let back: PipelineEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.message_id(), "m-1");
    }

    #[test]
    fn test_corrupted_category_fails_deserialization() {
        let event = PipelineEvent::MessageClassified {
            message: message(),
            classification: Classification {
                category: FailureCategory::Systemic,
                confidence: 0.92,
                reasoning: "spike".to_string(),
                model_tag: ModelTag::Heuristic,
                tokens: TokenUsage::default(),
                semantic_hash: "abcdef0123456789".to_string(),
                suspected_deployment: None,
                recommended_action: RecommendedAction::Escalate {
                    severity: crate::models::Severity::P1,
                },
            },
        };
        let json = serde_json::to_string(&event)
            .unwrap()
            .replace("SYSTEMIC", "MYSTERY");
        assert!(serde_json::from_str::<PipelineEvent>(&json).is_err());
    }
}
