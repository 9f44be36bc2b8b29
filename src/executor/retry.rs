use crate::adapters::QueueClient;
use crate::config::Config;
use crate::error::Result;
use crate::executor::{ActionHandler, ActionOutcome};
use crate::models::{backoff_delay_s, Classification, EnrichedMessage, Outcome, RecommendedAction};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Replays a transient failure into its original queue after a backoff
/// delay. Guarded by its own hard cap: the monitor's ledger cap is the
/// effective ceiling, this one catches misrouted or replayed events.
pub struct RetryHandler {
    queue_client: Arc<dyn QueueClient>,
    max_retry_attempts: u32,
    backoff_base_s: u64,
    backoff_max_s: u64,
    auto_replay_enabled: bool,
}

impl RetryHandler {
    pub fn new(config: &Config, queue_client: Arc<dyn QueueClient>) -> Self {
        Self {
            queue_client,
            max_retry_attempts: config.executor.max_retry_attempts,
            backoff_base_s: config.executor.backoff_base_s,
            backoff_max_s: config.executor.backoff_max_s,
            auto_replay_enabled: config.features.auto_replay_enabled,
        }
    }

    fn delay_s(&self, message: &EnrichedMessage, classification: &Classification) -> u64 {
        let delay = match classification.recommended_action {
            RecommendedAction::Replay { retry_delay_s, .. } => retry_delay_s,
            _ => backoff_delay_s(message.retry_count, self.backoff_base_s, self.backoff_max_s),
        };
        delay.min(self.backoff_max_s)
    }
}

#[async_trait]
impl ActionHandler for RetryHandler {
    async fn execute(
        &self,
        message: &EnrichedMessage,
        classification: &Classification,
    ) -> Result<ActionOutcome> {
        if !self.auto_replay_enabled {
            warn!(
                message_id = %message.message_id,
                operation = "replay",
                "Auto-replay disabled; recording failure"
            );
            return Ok(ActionOutcome {
                outcome: Some(Outcome::Failed),
                failure_reason: Some("auto-replay disabled".to_string()),
                ..Default::default()
            });
        }

        if message.retry_count >= self.max_retry_attempts {
            // Terminal, not escalated: the monitor's cap already drops
            // runaway re-deliveries at the source
            info!(
                message_id = %message.message_id,
                retry_count = message.retry_count,
                operation = "replay",
                "Retry cap reached; not re-enqueueing"
            );
            return Ok(ActionOutcome {
                outcome: Some(Outcome::Failed),
                failure_reason: Some("max retries".to_string()),
                ..Default::default()
            });
        }

        let delay_s = self.delay_s(message, classification);
        let target_queue = message.original_queue();

        let mut attributes = HashMap::new();
        attributes.insert(
            "retryCount".to_string(),
            (message.retry_count + 1).to_string(),
        );
        attributes.insert(
            "originalMessageId".to_string(),
            message.message_id.clone(),
        );
        attributes.insert(
            "classificationCategory".to_string(),
            classification.category.to_string(),
        );

        self.queue_client
            .send(&target_queue, &message.body, delay_s, attributes)
            .await?;

        info!(
            message_id = %message.message_id,
            source_queue = %message.source_queue,
            target_queue = %target_queue,
            delay_s,
            operation = "replay",
            "Message re-enqueued for replay"
        );

        // Downstream success is never directly observed; the record stays
        // PENDING until a genuine re-delivery or TTL expiry resolves it
        Ok(ActionOutcome {
            outcome: Some(Outcome::Pending),
            retry_scheduled_for: Some(Utc::now() + Duration::seconds(delay_s as i64)),
            ..Default::default()
        })
    }
}
