use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// An alert delivered to the topic
#[derive(Debug, Clone)]
pub struct PublishedAlert {
    pub topic: String,
    pub subject: String,
    pub body: String,
}

/// Alert topic seam for poison-pill notifications
#[async_trait]
pub trait AlertPublisher: Send + Sync {
    async fn publish_alert(&self, topic: &str, subject: &str, body: &str) -> Result<()>;
}

/// In-memory recording alert topic (standalone deployment and testing)
pub struct InMemoryAlertTopic {
    alerts: Arc<RwLock<Vec<PublishedAlert>>>,
    fail_publishes: Arc<AtomicBool>,
}

impl InMemoryAlertTopic {
    pub fn new() -> Self {
        Self {
            alerts: Arc::new(RwLock::new(Vec::new())),
            fail_publishes: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn alerts(&self) -> Vec<PublishedAlert> {
        self.alerts.read().await.clone()
    }

    pub fn set_fail_publishes(&self, fail: bool) {
        self.fail_publishes.store(fail, Ordering::SeqCst);
    }
}

impl Default for InMemoryAlertTopic {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AlertPublisher for InMemoryAlertTopic {
    async fn publish_alert(&self, topic: &str, subject: &str, body: &str) -> Result<()> {
        if self.fail_publishes.load(Ordering::SeqCst) {
            return Err(AppError::Alert("alert publish rejected".to_string()));
        }

        self.alerts.write().await.push(PublishedAlert {
            topic: topic.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_records_alert() {
        let topic = InMemoryAlertTopic::new();
        topic
            .publish_alert("dlq-recovery-alerts", "Poison Pill Detected: orders-dlq", "details")
            .await
            .unwrap();

        let alerts = topic.alerts().await;
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].subject.contains("Poison Pill Detected"));
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let topic = InMemoryAlertTopic::new();
        topic.set_fail_publishes(true);
        assert!(topic.publish_alert("t", "s", "b").await.is_err());
        assert!(topic.alerts().await.is_empty());
    }
}
