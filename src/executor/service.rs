use crate::error::Result;
use crate::executor::{ActionHandler, ActionOutcome, ArchiveHandler, EscalateHandler, RetryHandler};
use crate::metrics::PIPELINE_METRICS;
use crate::models::{Classification, EnrichedMessage, FailureCategory, Outcome};
use crate::state::{ClassificationStore, OutcomeUpdate};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Dispatches each classified message to exactly one action handler and
/// writes the outcome back to the classification record. All write-backs are
/// keyed by `message_id` and idempotent under bus redelivery.
pub struct ExecutorService {
    records: Arc<dyn ClassificationStore>,
    retry: RetryHandler,
    archive: ArchiveHandler,
    escalate: EscalateHandler,
}

impl ExecutorService {
    pub fn new(
        records: Arc<dyn ClassificationStore>,
        retry: RetryHandler,
        archive: ArchiveHandler,
        escalate: EscalateHandler,
    ) -> Self {
        Self {
            records,
            retry,
            archive,
            escalate,
        }
    }

    /// Execute the action for one classification. An error return means the
    /// side effect is incomplete and the bus should redeliver the event.
    pub async fn handle(
        &self,
        message: &EnrichedMessage,
        classification: &Classification,
    ) -> Result<()> {
        let started = std::time::Instant::now();

        let handler: &dyn ActionHandler = match classification.category {
            FailureCategory::Transient => &self.retry,
            FailureCategory::PoisonPill => &self.archive,
            FailureCategory::Systemic => &self.escalate,
        };

        let action = classification.recommended_action.action_taken().to_string();

        match handler.execute(message, classification).await {
            Ok(outcome) => {
                let recorded = outcome.outcome.unwrap_or(Outcome::Success);
                self.write_back(&message.message_id, &outcome).await?;

                PIPELINE_METRICS
                    .actions
                    .with_label_values(&[&action, &recorded.to_string()])
                    .inc();

                info!(
                    operation = "execute",
                    message_id = %message.message_id,
                    source_queue = %message.source_queue,
                    category = %classification.category,
                    action = %action,
                    outcome = %recorded,
                    latency_ms = started.elapsed().as_millis() as u64,
                    "Action executed"
                );
                Ok(())
            }
            Err(e) => {
                // Record the failure, then surface the error for bus retry
                error!(
                    operation = "execute",
                    message_id = %message.message_id,
                    category = %classification.category,
                    action = %action,
                    error = %e,
                    "Action handler failed"
                );
                PIPELINE_METRICS
                    .actions
                    .with_label_values(&[&action, "FAILED"])
                    .inc();

                let failed = ActionOutcome {
                    outcome: Some(Outcome::Failed),
                    ..Default::default()
                };
                if let Err(update_err) = self.write_back(&message.message_id, &failed).await {
                    warn!(
                        message_id = %message.message_id,
                        error = %update_err,
                        "Failed to record FAILED outcome"
                    );
                }
                Err(e)
            }
        }
    }

    async fn write_back(&self, message_id: &str, outcome: &ActionOutcome) -> Result<()> {
        let mut update = OutcomeUpdate::default();
        update.outcome = outcome.outcome;
        if let Some(at) = outcome.retry_scheduled_for {
            update = update.with_retry_scheduled_for(at);
        }
        if let Some(ref location) = outcome.archive_location {
            update = update.with_archive_location(location.clone());
        }
        if let Some(ref key) = outcome.incident_key {
            update = update.with_incident_key(key.clone());
        }
        self.records.update_outcome(message_id, &update).await
    }
}
