use crate::error::{AppError, Result};
use crate::messaging::events::PipelineEvent;
use crate::messaging::traits::{EventBus, EventStream};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::RwLock;

const CHANNEL_CAPACITY: usize = 1024;

/// In-process event bus on a broadcast channel (standalone deployment and
/// testing). Keeps a log of accepted events for inspection and supports
/// publish-failure injection so delivery-ordering guarantees can be tested.
pub struct InMemoryBus {
    sender: broadcast::Sender<PipelineEvent>,
    // Held so the channel stays open with no external subscribers
    _keepalive: broadcast::Receiver<PipelineEvent>,
    published: Arc<RwLock<Vec<PipelineEvent>>>,
    fail_publishes: Arc<AtomicBool>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        let (sender, keepalive) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            _keepalive: keepalive,
            published: Arc::new(RwLock::new(Vec::new())),
            fail_publishes: Arc::new(AtomicBool::new(false)),
        }
    }

    /// All events the bus has accepted, in publish order
    pub async fn published(&self) -> Vec<PipelineEvent> {
        self.published.read().await.clone()
    }

    /// Make subsequent publishes fail (for testing delivery semantics)
    pub fn set_fail_publishes(&self, fail: bool) {
        self.fail_publishes.store(fail, Ordering::SeqCst);
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    async fn publish(&self, event: &PipelineEvent) -> Result<()> {
        if self.fail_publishes.load(Ordering::SeqCst) {
            return Err(AppError::Bus("publish rejected".to_string()));
        }

        self.sender
            .send(event.clone())
            .map_err(|e| AppError::Bus(format!("broadcast send failed: {}", e)))?;
        self.published.write().await.push(event.clone());

        tracing::debug!(
            source = event.source(),
            detail_type = event.detail_type(),
            message_id = %event.message_id(),
            "Event published"
        );
        Ok(())
    }

    async fn subscribe(&self, detail_types: &[&str]) -> Result<Box<dyn EventStream>> {
        Ok(Box::new(BroadcastStream {
            receiver: self.sender.subscribe(),
            detail_types: detail_types.iter().map(|s| s.to_string()).collect(),
        }))
    }
}

struct BroadcastStream {
    receiver: broadcast::Receiver<PipelineEvent>,
    detail_types: Vec<String>,
}

#[async_trait]
impl EventStream for BroadcastStream {
    async fn next(&mut self) -> Result<Option<PipelineEvent>> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.detail_types.is_empty()
                        || self.detail_types.iter().any(|t| t == event.detail_type())
                    {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event stream lagged; events were dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EnrichedMessage, ErrorPattern};
    use chrono::Utc;

    fn enriched_event(id: &str) -> PipelineEvent {
        PipelineEvent::MessageEnriched {
            message: EnrichedMessage {
                message_id: id.to_string(),
                receipt_token: format!("rt-{id}"),
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
            },
        }
    }

    #[tokio::test]
    async fn test_publish_and_subscribe() {
        let bus = InMemoryBus::new();
        let mut stream = bus.subscribe(&["MessageEnriched"]).await.unwrap();

        bus.publish(&enriched_event("m-1")).await.unwrap();

        let event = stream.next().await.unwrap().unwrap();
        assert_eq!(event.message_id(), "m-1");
        assert_eq!(bus.published().await.len(), 1);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_accepted() {
        let bus = InMemoryBus::new();
        bus.publish(&enriched_event("m-1")).await.unwrap();
        assert_eq!(bus.published().await.len(), 1);
    }

    #[tokio::test]
    async fn test_detail_type_filtering() {
        let bus = InMemoryBus::new();
        let mut stream = bus.subscribe(&["SomethingElse"]).await.unwrap();

        bus.publish(&enriched_event("m-1")).await.unwrap();

        // The filtered stream should not yield the event
        let next = tokio::time::timeout(std::time::Duration::from_millis(50), stream.next()).await;
        assert!(next.is_err(), "filtered stream must not deliver the event");
    }

    #[tokio::test]
    async fn test_publish_failure_injection() {
        let bus = InMemoryBus::new();
        bus.set_fail_publishes(true);
        assert!(bus.publish(&enriched_event("m-1")).await.is_err());
        assert!(bus.published().await.is_empty());

        bus.set_fail_publishes(false);
        assert!(bus.publish(&enriched_event("m-1")).await.is_ok());
    }
}
