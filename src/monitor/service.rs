use crate::adapters::{QueueClient, ReceiveOptions, ReceivedMessage};
use crate::config::Config;
use crate::error::Result;
use crate::messaging::{EventBus, PipelineEvent};
use crate::metrics::PIPELINE_METRICS;
use crate::models::EnrichedMessage;
use crate::monitor::parser::extract_error_pattern;
use crate::state::{ClassificationStore, DedupLedger};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Summary of one monitor invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorReport {
    pub queues_polled: usize,
    pub messages_seen: usize,
    pub published: usize,
    pub dropped_runaway: usize,
    pub failures: usize,
}

impl MonitorReport {
    fn absorb(&mut self, other: &MonitorReport) {
        self.queues_polled += other.queues_polled;
        self.messages_seen += other.messages_seen;
        self.published += other.published;
        self.dropped_runaway += other.dropped_runaway;
        self.failures += other.failures;
    }
}

enum Processed {
    Published,
    DroppedRunaway,
}

/// Discovers DLQs, polls them in parallel and turns each received message
/// into one `MessageEnriched` event, deleting the source entry only after
/// the bus has accepted the event.
pub struct MonitorService {
    queue_client: Arc<dyn QueueClient>,
    ledger: Arc<dyn DedupLedger>,
    records: Arc<dyn ClassificationStore>,
    deployments: Arc<dyn crate::adapters::DeploymentStore>,
    bus: Arc<dyn EventBus>,
    dlq_name_pattern: String,
    receive_options: ReceiveOptions,
    hard_cap: u32,
    deployment_window: Duration,
}

impl MonitorService {
    pub fn new(
        config: &Config,
        queue_client: Arc<dyn QueueClient>,
        ledger: Arc<dyn DedupLedger>,
        records: Arc<dyn ClassificationStore>,
        deployments: Arc<dyn crate::adapters::DeploymentStore>,
        bus: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            queue_client,
            ledger,
            records,
            deployments,
            bus,
            dlq_name_pattern: config.monitor.dlq_name_pattern.clone(),
            receive_options: ReceiveOptions {
                max_messages: config.monitor.max_messages_per_poll,
                visibility_timeout_s: config.monitor.visibility_timeout_s,
                wait_time_s: config.monitor.long_poll_wait_s,
            },
            hard_cap: config.monitor.max_retries,
            deployment_window: Duration::milliseconds(config.analyzer.systemic_window_ms),
        }
    }

    /// One scheduled invocation: discover, poll all queues in parallel,
    /// aggregate per-queue reports. Never returns an error; failures are
    /// isolated, counted and logged.
    pub async fn run_once(&self) -> MonitorReport {
        let started = std::time::Instant::now();
        // Correlation id for this run's log lines only; never an effect key
        let run_id = uuid::Uuid::new_v4();

        let queues = match self.queue_client.list_queues(&self.dlq_name_pattern).await {
            Ok(queues) => queues,
            Err(e) => {
                warn!(run_id = %run_id, error = %e, operation = "discover", "Queue discovery failed; skipping run");
                return MonitorReport::default();
            }
        };

        let polls = queues.iter().map(|queue| self.poll_queue(queue));
        let reports = futures::future::join_all(polls).await;

        let mut report = MonitorReport::default();
        for queue_report in &reports {
            report.absorb(queue_report);
        }

        info!(
            operation = "monitor_run",
            run_id = %run_id,
            queues_polled = report.queues_polled,
            messages_seen = report.messages_seen,
            published = report.published,
            dropped_runaway = report.dropped_runaway,
            failures = report.failures,
            latency_ms = started.elapsed().as_millis() as u64,
            "Monitor run complete"
        );
        report
    }

    /// Poll one queue; errors here never cross to sibling queues.
    async fn poll_queue(&self, queue: &str) -> MonitorReport {
        let mut report = MonitorReport {
            queues_polled: 1,
            ..Default::default()
        };

        let messages = match self.queue_client.receive(queue, &self.receive_options).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(source_queue = %queue, error = %e, operation = "poll", "Queue poll failed");
                PIPELINE_METRICS
                    .monitor_failures
                    .with_label_values(&[queue, "poll"])
                    .inc();
                report.failures += 1;
                return report;
            }
        };

        report.messages_seen = messages.len();
        PIPELINE_METRICS
            .messages_received
            .with_label_values(&[queue])
            .inc_by(messages.len() as u64);

        // Sequential per queue: keeps ordering stable and ledger writes simple
        for message in &messages {
            match self.process_message(queue, message).await {
                Ok(Processed::Published) => report.published += 1,
                Ok(Processed::DroppedRunaway) => report.dropped_runaway += 1,
                Err(e) => {
                    warn!(
                        source_queue = %queue,
                        message_id = %message.message_id,
                        error = %e,
                        operation = "process",
                        "Message processing failed; will be re-delivered"
                    );
                    PIPELINE_METRICS
                        .monitor_failures
                        .with_label_values(&[queue, "process"])
                        .inc();
                    report.failures += 1;
                }
            }
        }
        report
    }

    async fn process_message(&self, queue: &str, message: &ReceivedMessage) -> Result<Processed> {
        let gate = self.ledger_gate(queue, message).await;

        let (retry_count, first_seen_at) = match gate {
            LedgerGate::Proceed {
                retry_count,
                first_seen_at,
            } => (retry_count, first_seen_at),
            LedgerGate::Drop { retry_count } => {
                info!(
                    source_queue = %queue,
                    message_id = %message.message_id,
                    retry_count,
                    operation = "hard_cap_drop",
                    "Runaway message dropped at ledger hard cap"
                );
                PIPELINE_METRICS
                    .messages_dropped
                    .with_label_values(&[queue])
                    .inc();
                self.queue_client.delete(queue, &message.receipt_token).await?;
                return Ok(Processed::DroppedRunaway);
            }
        };

        let enriched = self
            .enrich(queue, message, retry_count, first_seen_at)
            .await;

        // Delete strictly after the bus accepts the event; a failed publish
        // leaves the message to reappear after the visibility timeout.
        self.bus
            .publish(&PipelineEvent::MessageEnriched {
                message: enriched.clone(),
            })
            .await?;

        PIPELINE_METRICS
            .messages_published
            .with_label_values(&[queue])
            .inc();

        if let Err(e) = self.queue_client.delete(queue, &message.receipt_token).await {
            // The enriched event is already on the bus; re-delivery will be
            // absorbed by the ledger and the idempotent record writes.
            warn!(
                source_queue = %queue,
                message_id = %message.message_id,
                error = %e,
                operation = "delete",
                "Source delete failed after publish"
            );
        }

        debug!(
            source_queue = %queue,
            message_id = %message.message_id,
            retry_count,
            operation = "enriched",
            "Message enriched and published"
        );
        Ok(Processed::Published)
    }

    /// Deduplication and retry accounting. Ledger unavailability fails open
    /// (treated as first sight) so a broken ledger cannot lose messages; this
    /// is the only place the pipeline prefers duplicate work over loss.
    async fn ledger_gate(&self, queue: &str, message: &ReceivedMessage) -> LedgerGate {
        match self.ledger.get(&message.message_id, queue).await {
            Ok(None) => match self.ledger.insert_first_seen(&message.message_id, queue).await {
                Ok(entry) => LedgerGate::Proceed {
                    retry_count: entry.retry_count,
                    first_seen_at: entry.first_seen_at,
                },
                Err(e) => {
                    warn!(message_id = %message.message_id, error = %e, "Ledger insert failed; failing open");
                    LedgerGate::Proceed {
                        retry_count: 0,
                        first_seen_at: Utc::now(),
                    }
                }
            },
            Ok(Some(entry)) if entry.retry_count < self.hard_cap => {
                match self.ledger.increment_retry(&message.message_id, queue).await {
                    Ok(updated) => LedgerGate::Proceed {
                        retry_count: updated.retry_count,
                        first_seen_at: updated.first_seen_at,
                    },
                    Err(e) => {
                        warn!(message_id = %message.message_id, error = %e, "Ledger increment failed; failing open");
                        LedgerGate::Proceed {
                            retry_count: entry.retry_count,
                            first_seen_at: entry.first_seen_at,
                        }
                    }
                }
            }
            Ok(Some(entry)) => LedgerGate::Drop {
                retry_count: entry.retry_count,
            },
            Err(e) => {
                warn!(message_id = %message.message_id, error = %e, "Ledger read failed; failing open");
                LedgerGate::Proceed {
                    retry_count: 0,
                    first_seen_at: Utc::now(),
                }
            }
        }
    }

    async fn enrich(
        &self,
        queue: &str,
        message: &ReceivedMessage,
        retry_count: u32,
        first_seen_at: DateTime<Utc>,
    ) -> EnrichedMessage {
        // Failures of either context query degrade to empty context; the
        // message still flows.
        let hour_ago = Utc::now() - Duration::hours(1);
        let similar_failures_last_hour = match self.records.count_by_queue_since(queue, hour_ago).await
        {
            Ok(count) => count.saturating_sub(1),
            Err(e) => {
                warn!(source_queue = %queue, error = %e, "Similar-failure query failed; using 0");
                0
            }
        };

        let recent_deployments = match self
            .deployments
            .recent_deployments(self.deployment_window)
            .await
        {
            Ok(deployments) => deployments,
            Err(e) => {
                warn!(error = %e, "Deployment lookup failed; using none");
                Vec::new()
            }
        };

        EnrichedMessage {
            message_id: message.message_id.clone(),
            receipt_token: message.receipt_token.clone(),
            source_queue: queue.to_string(),
            body: message.body.clone(),
            receive_count: message.receive_count,
            first_seen_at,
            last_failed_at: Utc::now(),
            retry_count,
            similar_failures_last_hour,
            recent_deployments,
            error_pattern: extract_error_pattern(&message.body, queue),
        }
    }
}

enum LedgerGate {
    Proceed {
        retry_count: u32,
        first_seen_at: DateTime<Utc>,
    },
    Drop {
        retry_count: u32,
    },
}
