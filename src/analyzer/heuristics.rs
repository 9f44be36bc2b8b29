//! Heuristic fast-path of the decision engine: deployment correlation first,
//! then an ordered error-pattern rule table. Rules carry fixed confidences;
//! the first match at or above the configured threshold wins.

use crate::models::{DeploymentRecord, EnrichedMessage, FailureCategory};
use lazy_static::lazy_static;
use regex::Regex;

/// One entry of the pattern rule table
pub struct PatternRule {
    pub pattern: Regex,
    pub category: FailureCategory,
    pub confidence: f64,
    pub reasoning: &'static str,
}

lazy_static! {
    static ref PATTERN_RULES: Vec<PatternRule> = vec![
        PatternRule {
            pattern: Regex::new(
                r"(?i)ETIMEDOUT|ECONNRESET|ECONNREFUSED|EPIPE|EHOSTUNREACH|socket hang up|network (error|failure|unreachable)|connection (reset|refused|closed|timed out)"
            )
            .unwrap(),
            category: FailureCategory::Transient,
            confidence: 0.96,
            reasoning: "network connectivity failure, expected to recover on replay",
        },
        PatternRule {
            pattern: Regex::new(r"(?i)rate limit|too many requests|\b429\b").unwrap(),
            category: FailureCategory::Transient,
            confidence: 0.94,
            reasoning: "rate limited by a downstream service",
        },
        PatternRule {
            pattern: Regex::new(r"(?i)throttl").unwrap(),
            category: FailureCategory::Transient,
            confidence: 0.93,
            reasoning: "request throttled by a downstream service",
        },
        PatternRule {
            pattern: Regex::new(r"(?i)service unavailable|bad gateway|gateway timeout|\b50[234]\b")
                .unwrap(),
            category: FailureCategory::Transient,
            confidence: 0.90,
            reasoning: "upstream temporarily unavailable",
        },
        PatternRule {
            pattern: Regex::new(r"(?i)division by zero|divide by zero").unwrap(),
            category: FailureCategory::PoisonPill,
            confidence: 0.98,
            reasoning: "arithmetic defect in message handling, replay cannot succeed",
        },
        PatternRule {
            pattern: Regex::new(
                r"(?i)cannot read propert(y|ies)[^,]* of (null|undefined)|null ?pointer|undefined is not a|is not a function"
            )
            .unwrap(),
            category: FailureCategory::PoisonPill,
            confidence: 0.95,
            reasoning: "null dereference on message content",
        },
        PatternRule {
            pattern: Regex::new(r"(?i)unexpected token|parse error|malformed|invalid json|json parse")
                .unwrap(),
            category: FailureCategory::PoisonPill,
            confidence: 0.93,
            reasoning: "message content cannot be parsed",
        },
        PatternRule {
            pattern: Regex::new(r"(?i)schema validation|constraint violation|validation failed")
                .unwrap(),
            category: FailureCategory::PoisonPill,
            confidence: 0.91,
            reasoning: "message violates the expected schema",
        },
        PatternRule {
            pattern: Regex::new(r"(?i)type ?error|cannot cast|invalid cast|class cast").unwrap(),
            category: FailureCategory::PoisonPill,
            confidence: 0.90,
            reasoning: "type mismatch in message content",
        },
        PatternRule {
            pattern: Regex::new(r"(?i)invalid argument|illegal argument|missing required").unwrap(),
            category: FailureCategory::PoisonPill,
            confidence: 0.89,
            reasoning: "message carries invalid arguments",
        },
        PatternRule {
            pattern: Regex::new(r"(?i)\btimed? ?out\b").unwrap(),
            category: FailureCategory::Transient,
            confidence: 0.86,
            reasoning: "operation timed out, likely transient",
        },
    ];
}

/// Test the error message against the rule table. Returns the first match
/// whose confidence meets the threshold.
pub fn match_pattern(error_message: &str, confidence_threshold: f64) -> Option<&'static PatternRule> {
    PATTERN_RULES
        .iter()
        .find(|rule| rule.confidence >= confidence_threshold && rule.pattern.is_match(error_message))
}

/// Deployment correlation: a spike of similar failures right after a
/// deployment is systemic until proven otherwise. Returns the suspected
/// deployment (the most recent one).
pub fn correlate_deployment(
    message: &EnrichedMessage,
    min_similar: u64,
) -> Option<&DeploymentRecord> {
    if message.similar_failures_last_hour >= min_similar {
        message.recent_deployments.first()
    } else {
        None
    }
}

/// Confidence of the deployment-correlation verdict
pub const CORRELATION_CONFIDENCE: f64 = 0.92;

/// Reasoning attached to deployment-correlated classifications
pub const CORRELATION_REASONING: &str = "spike correlated with recent deployment";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ErrorPattern;
    use chrono::Utc;

    #[test]
    fn test_network_error_is_transient_high_confidence() {
        let rule = match_pattern("ETIMEDOUT: socket hang up", 0.85).unwrap();
        assert_eq!(rule.category, FailureCategory::Transient);
        assert_eq!(rule.confidence, 0.96);
    }

    #[test]
    fn test_null_dereference_is_poison_pill() {
        let rule = match_pattern("Cannot read property 'length' of null", 0.85).unwrap();
        assert_eq!(rule.category, FailureCategory::PoisonPill);
        assert!(rule.confidence >= 0.89);
    }

    #[test]
    fn test_rate_limit_is_transient() {
        let rule = match_pattern("429 Too Many Requests from upstream", 0.85).unwrap();
        assert_eq!(rule.category, FailureCategory::Transient);
        assert_eq!(rule.confidence, 0.94);
    }

    #[test]
    fn test_division_by_zero_is_poison_pill() {
        let rule = match_pattern("attempted division by zero", 0.85).unwrap();
        assert_eq!(rule.category, FailureCategory::PoisonPill);
        assert_eq!(rule.confidence, 0.98);
    }

    #[test]
    fn test_first_match_wins_in_rule_order() {
        // Mentions both a network error and a type error; the network rule
        // is earlier in the table
        let rule = match_pattern("TypeError after ECONNRESET from peer", 0.85).unwrap();
        assert_eq!(rule.category, FailureCategory::Transient);
        assert_eq!(rule.confidence, 0.96);
    }

    #[test]
    fn test_threshold_filters_low_confidence_rules() {
        // The generic timeout rule sits at 0.86
        assert!(match_pattern("operation timed out", 0.85).is_some());
        assert!(match_pattern("operation timed out", 0.90).is_none());
    }

    #[test]
    fn test_unknown_message_matches_nothing() {
        assert!(match_pattern("entirely novel failure mode", 0.85).is_none());
    }

    fn message(similar: u64, deployments: Vec<DeploymentRecord>) -> EnrichedMessage {
        EnrichedMessage {
            message_id: "m-1".to_string(),
            receipt_token: "r-1".to_string(),
            source_queue: "orders-dlq".to_string(),
            body: "{}".to_string(),
            receive_count: 1,
            first_seen_at: Utc::now(),
            last_failed_at: Utc::now(),
            retry_count: 0,
            similar_failures_last_hour: similar,
            recent_deployments: deployments,
            error_pattern: ErrorPattern {
                error_type: "Error".to_string(),
                message: "novel".to_string(),
                stack_top: None,
                code: None,
                affected_service: "Orders".to_string(),
            },
        }
    }

    fn deployment(version: &str) -> DeploymentRecord {
        DeploymentRecord {
            id: format!("d-{version}"),
            version: version.to_string(),
            deployed_at: Utc::now(),
            author: "ci".to_string(),
        }
    }

    #[test]
    fn test_correlation_requires_spike_and_deployment() {
        assert!(correlate_deployment(&message(15, vec![deployment("1.4.1")]), 10).is_some());
        assert!(correlate_deployment(&message(15, vec![]), 10).is_none());
        assert!(correlate_deployment(&message(9, vec![deployment("1.4.1")]), 10).is_none());
    }

    #[test]
    fn test_correlation_suspects_most_recent_deployment() {
        let msg = message(15, vec![deployment("1.4.1"), deployment("1.4.0")]);
        let suspected = correlate_deployment(&msg, 10).unwrap();
        assert_eq!(suspected.version, "1.4.1");
    }
}
