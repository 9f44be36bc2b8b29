use crate::config::Config;
use crate::error::{AppError, Result};
use crate::executor::{ActionHandler, ActionOutcome};
use crate::models::{Classification, EnrichedMessage, Outcome, RecommendedAction};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// An incident event posted to the incident API
#[derive(Debug, Clone, Serialize)]
pub struct IncidentEvent {
    pub summary: String,
    pub severity: String,
    pub source: String,
    pub dedup_key: String,
    pub custom_details: HashMap<String, serde_json::Value>,
}

/// Incident API seam. The API acknowledges a trigger by echoing the dedup
/// key, which becomes the incident identifier.
#[async_trait]
pub trait IncidentNotifier: Send + Sync {
    async fn trigger(&self, event: &IncidentEvent) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ApiEvent<'a> {
    routing_key: &'a str,
    event_action: &'static str,
    dedup_key: &'a str,
    payload: ApiPayload<'a>,
}

#[derive(Debug, Serialize)]
struct ApiPayload<'a> {
    summary: &'a str,
    source: &'a str,
    severity: &'a str,
    custom_details: &'a HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    message: String,
    #[serde(default)]
    dedup_key: Option<String>,
}

/// HTTP client for an Events-API-style incident service
pub struct IncidentApiClient {
    routing_key: String,
    api_url: String,
    client: Client,
}

impl IncidentApiClient {
    pub fn new(routing_key: String, api_url: String) -> Result<Self> {
        if routing_key.is_empty() {
            return Err(AppError::Configuration(
                "Incident routing key cannot be empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            routing_key,
            api_url,
            client,
        })
    }

    /// Build the client from configuration, reading the routing key from the
    /// configured environment variable
    pub fn from_config(config: &Config) -> Result<Self> {
        let routing_key = config
            .executor
            .incident_routing_key_env
            .as_ref()
            .and_then(|env| std::env::var(env).ok())
            .unwrap_or_default();
        Self::new(routing_key, config.executor.incident_api_url.clone())
    }
}

#[async_trait]
impl IncidentNotifier for IncidentApiClient {
    async fn trigger(&self, event: &IncidentEvent) -> Result<String> {
        let api_event = ApiEvent {
            routing_key: &self.routing_key,
            event_action: "trigger",
            dedup_key: &event.dedup_key,
            payload: ApiPayload {
                summary: &event.summary,
                source: &event.source,
                severity: &event.severity,
                custom_details: &event.custom_details,
            },
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("Content-Type", "application/json")
            .json(&api_event)
            .send()
            .await
            .map_err(|e| AppError::Incident(format!("Failed to post incident event: {}", e)))?;

        let status = response.status();
        let parsed: ApiResponse = response
            .json()
            .await
            .map_err(|e| AppError::Incident(format!("Failed to parse incident response: {}", e)))?;

        if !status.is_success() || parsed.status != "success" {
            return Err(AppError::Incident(format!(
                "Incident API error ({}): {}",
                status, parsed.message
            )));
        }

        Ok(parsed.dedup_key.unwrap_or_else(|| event.dedup_key.clone()))
    }
}

/// Recording in-memory incident API (standalone deployment and testing)
pub struct InMemoryIncidentApi {
    incidents: Arc<RwLock<Vec<IncidentEvent>>>,
    fail_triggers: std::sync::atomic::AtomicBool,
}

impl InMemoryIncidentApi {
    pub fn new() -> Self {
        Self {
            incidents: Arc::new(RwLock::new(Vec::new())),
            fail_triggers: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub async fn incidents(&self) -> Vec<IncidentEvent> {
        self.incidents.read().await.clone()
    }

    pub fn set_fail_triggers(&self, fail: bool) {
        self.fail_triggers
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }
}

impl Default for InMemoryIncidentApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IncidentNotifier for InMemoryIncidentApi {
    async fn trigger(&self, event: &IncidentEvent) -> Result<String> {
        if self.fail_triggers.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(AppError::Incident("incident API unavailable".to_string()));
        }
        self.incidents.write().await.push(event.clone());
        Ok(event.dedup_key.clone())
    }
}

/// Escalates a systemic failure as a deduplicated incident. The dedup key is
/// deterministic over (project, queue, error type), so a failure storm
/// coalesces into one open incident.
pub struct EscalateHandler {
    notifier: Arc<dyn IncidentNotifier>,
    project_name: String,
    integration_enabled: bool,
}

impl EscalateHandler {
    pub fn new(config: &Config, notifier: Arc<dyn IncidentNotifier>) -> Self {
        Self {
            notifier,
            project_name: config.project_name.clone(),
            integration_enabled: config.features.incident_integration_enabled,
        }
    }

    fn build_event(
        &self,
        message: &EnrichedMessage,
        classification: &Classification,
    ) -> IncidentEvent {
        let severity = match classification.recommended_action {
            RecommendedAction::Escalate { severity } => severity.incident_severity(),
            _ => "error",
        };

        let mut custom_details = HashMap::new();
        custom_details.insert(
            "message_id".to_string(),
            serde_json::json!(message.message_id),
        );
        custom_details.insert(
            "source_queue".to_string(),
            serde_json::json!(message.source_queue),
        );
        custom_details.insert(
            "error_type".to_string(),
            serde_json::json!(message.error_pattern.error_type),
        );
        custom_details.insert(
            "similar_failures_last_hour".to_string(),
            serde_json::json!(message.similar_failures_last_hour),
        );
        custom_details.insert(
            "recent_deployments".to_string(),
            serde_json::json!(message.recent_deployments),
        );
        custom_details.insert(
            "retry_count".to_string(),
            serde_json::json!(message.retry_count),
        );
        custom_details.insert(
            "classification_reasoning".to_string(),
            serde_json::json!(classification.reasoning),
        );
        custom_details.insert(
            "recommended_action".to_string(),
            serde_json::json!(classification.recommended_action),
        );

        IncidentEvent {
            summary: format!(
                "Systemic failure in {}: {}",
                message.error_pattern.affected_service, classification.reasoning
            ),
            severity: severity.to_string(),
            source: format!("{}-dlq-{}", self.project_name, message.source_queue),
            dedup_key: format!(
                "{}-systemic-{}-{}",
                self.project_name, message.source_queue, message.error_pattern.error_type
            ),
            custom_details,
        }
    }
}

#[async_trait]
impl ActionHandler for EscalateHandler {
    async fn execute(
        &self,
        message: &EnrichedMessage,
        classification: &Classification,
    ) -> Result<ActionOutcome> {
        let event = self.build_event(message, classification);

        if !self.integration_enabled {
            warn!(
                message_id = %message.message_id,
                dedup_key = %event.dedup_key,
                operation = "escalate",
                "Incident integration disabled; escalation skipped"
            );
            return Ok(ActionOutcome {
                outcome: Some(Outcome::Success),
                ..Default::default()
            });
        }

        // Non-2xx and transport failures propagate for bus retry; the dedup
        // key makes redelivered triggers coalesce server-side
        let incident_key = self.notifier.trigger(&event).await?;

        info!(
            message_id = %message.message_id,
            source_queue = %message.source_queue,
            incident_key = %incident_key,
            severity = %event.severity,
            operation = "escalate",
            "Incident opened for systemic failure"
        );

        Ok(ActionOutcome {
            outcome: Some(Outcome::Success),
            incident_key: Some(incident_key),
            ..Default::default()
        })
    }
}
