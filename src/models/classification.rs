use crate::models::EnrichedMessage;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Failure category decided by the analyzer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, EnumString, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCategory {
    /// Likely to resolve itself on replay after a short backoff
    Transient,
    /// Intrinsically unprocessable content; retries cannot succeed
    PoisonPill,
    /// Cause external to the message, affecting many messages at once
    Systemic,
}

/// Action the executor carried out for a classification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, EnumString, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionTaken {
    Replayed,
    Archived,
    Escalated,
}

/// Terminal state of an executed action
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, EnumString, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Pending,
    Success,
    Failed,
}

/// Incident severity levels
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, EnumString, Display)]
pub enum Severity {
    P1,
    P2,
    P3,
}

impl Severity {
    /// Map to the incident API severity vocabulary
    pub fn incident_severity(&self) -> &'static str {
        match self {
            Severity::P1 => "critical",
            Severity::P2 => "error",
            Severity::P3 => "warning",
        }
    }
}

/// Which layer of the decision engine produced a classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelTag {
    /// Deployment correlation or pattern rule table
    Heuristic,
    /// Served from the semantic cache
    Cache,
    /// Conservative fallback after an LLM failure
    Fallback,
    /// LLM classification; carries the model identifier
    Model(String),
}

impl ModelTag {
    pub fn as_str(&self) -> &str {
        match self {
            ModelTag::Heuristic => "heuristic",
            ModelTag::Cache => "cache",
            ModelTag::Fallback => "fallback",
            ModelTag::Model(model) => model,
        }
    }
}

impl std::fmt::Display for ModelTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ModelTag {
    fn from(s: &str) -> Self {
        match s {
            "heuristic" => ModelTag::Heuristic,
            "cache" => ModelTag::Cache,
            "fallback" => ModelTag::Fallback,
            other => ModelTag::Model(other.to_string()),
        }
    }
}

impl Serialize for ModelTag {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ModelTag {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(ModelTag::from(s.as_str()))
    }
}

/// Token usage of an LLM classification call
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TokenUsage {
    pub input: u32,
    pub output: u32,
}

/// Recovery action recommended for a classification, computed
/// deterministically from the category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendedAction {
    /// Re-enqueue into the original queue after a backoff delay
    Replay { retry_delay_s: u64, max_retries: u32 },
    /// Archive to the object store and alert
    Archive,
    /// Open a deduplicated incident
    Escalate { severity: Severity },
}

impl RecommendedAction {
    /// Derive the action for a category and the message's retry history
    pub fn for_category(
        category: FailureCategory,
        retry_count: u32,
        backoff_base_s: u64,
        backoff_max_s: u64,
    ) -> Self {
        match category {
            FailureCategory::Transient => RecommendedAction::Replay {
                retry_delay_s: backoff_delay_s(retry_count, backoff_base_s, backoff_max_s),
                max_retries: 3,
            },
            FailureCategory::PoisonPill => RecommendedAction::Archive,
            FailureCategory::Systemic => RecommendedAction::Escalate {
                severity: Severity::P1,
            },
        }
    }

    /// Replays run unattended; archives and escalations need a human to look
    pub fn requires_human_review(&self) -> bool {
        !matches!(self, RecommendedAction::Replay { .. })
    }

    /// Action recorded once the executor carries this out
    pub fn action_taken(&self) -> ActionTaken {
        match self {
            RecommendedAction::Replay { .. } => ActionTaken::Replayed,
            RecommendedAction::Archive => ActionTaken::Archived,
            RecommendedAction::Escalate { .. } => ActionTaken::Escalated,
        }
    }

    /// Event detail type used for coarse routing on the bus
    pub fn detail_type(&self) -> &'static str {
        match self {
            RecommendedAction::Replay { .. } => "TransientFailure",
            RecommendedAction::Archive => "PoisonPillFailure",
            RecommendedAction::Escalate { .. } => "SystemicFailure",
        }
    }
}

/// Exponential backoff saturating at the queue service delay maximum
pub fn backoff_delay_s(retry_count: u32, base_s: u64, max_s: u64) -> u64 {
    // 2^retry_count with the exponent clamped so the shift cannot overflow
    let factor = 1u64.checked_shl(retry_count.min(32)).unwrap_or(u64::MAX);
    base_s.saturating_mul(factor).min(max_s)
}

/// Outcome of the analyzer's decision pipeline for one enriched message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Classification {
    pub category: FailureCategory,
    pub confidence: f64,
    pub reasoning: String,
    pub model_tag: ModelTag,
    #[serde(default)]
    pub tokens: TokenUsage,
    pub semantic_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspected_deployment: Option<String>,
    pub recommended_action: RecommendedAction,
}

/// Persisted audit record, keyed by `message_id` in the record store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationRecord {
    pub message_id: String,
    pub timestamp: DateTime<Utc>,
    pub source_queue: String,
    pub category: FailureCategory,
    pub confidence: f64,
    pub reasoning: String,
    pub model_tag: ModelTag,
    #[serde(default)]
    pub tokens: TokenUsage,
    pub action_taken: ActionTaken,
    pub outcome: Outcome,
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_scheduled_for: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspected_deployment: Option<String>,
    pub similar_failures_count: u64,
    pub semantic_hash: String,
    /// Store-driven expiry (record TTL, 30 days by default)
    pub expires_at: DateTime<Utc>,
}

impl ClassificationRecord {
    /// Build the record the analyzer persists before the executor acts
    pub fn new(
        message: &EnrichedMessage,
        classification: &Classification,
        ttl_days: i64,
    ) -> Self {
        Self {
            message_id: message.message_id.clone(),
            timestamp: Utc::now(),
            source_queue: message.source_queue.clone(),
            category: classification.category,
            confidence: classification.confidence,
            reasoning: classification.reasoning.clone(),
            model_tag: classification.model_tag.clone(),
            tokens: classification.tokens,
            action_taken: classification.recommended_action.action_taken(),
            outcome: Outcome::Pending,
            retry_count: message.retry_count,
            retry_scheduled_for: None,
            archive_location: None,
            incident_key: None,
            suspected_deployment: classification.suspected_deployment.clone(),
            similar_failures_count: message.similar_failures_last_hour,
            semantic_hash: classification.semantic_hash.clone(),
            expires_at: Utc::now() + Duration::days(ttl_days),
        }
    }

    /// Invariant: `action_taken` matches `category` unless the handler failed
    pub fn is_action_consistent(&self) -> bool {
        if self.outcome == Outcome::Failed {
            return true;
        }
        matches!(
            (self.category, self.action_taken),
            (FailureCategory::Transient, ActionTaken::Replayed)
                | (FailureCategory::PoisonPill, ActionTaken::Archived)
                | (FailureCategory::Systemic, ActionTaken::Escalated)
        )
    }
}

/// A cached classification verdict, keyed by semantic hash
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedVerdict {
    pub category: FailureCategory,
    pub confidence: f64,
    pub reasoning: String,
    pub cached_at: DateTime<Utc>,
}
