use crate::adapters::{AlertPublisher, ObjectStore};
use crate::config::Config;
use crate::error::Result;
use crate::executor::{ActionHandler, ActionOutcome};
use crate::models::{Classification, EnrichedMessage, Outcome};
use crate::monitor::parser::truncate_chars;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

const ALERT_EXCERPT_CHARS: usize = 200;

/// Archives a poison pill to the object store and alerts operators. The
/// archive write must succeed before the alert goes out; the archive key is
/// derived from the message id, so redelivered events overwrite in place.
pub struct ArchiveHandler {
    objects: Arc<dyn ObjectStore>,
    alerts: Arc<dyn AlertPublisher>,
    alert_topic: String,
}

impl ArchiveHandler {
    pub fn new(
        config: &Config,
        objects: Arc<dyn ObjectStore>,
        alerts: Arc<dyn AlertPublisher>,
    ) -> Self {
        Self {
            objects,
            alerts,
            alert_topic: config.executor.alert_topic.clone(),
        }
    }

    /// `poison-pills/YYYY-MM-DD/<source_queue>/<message_id>.json`
    fn archive_key(message: &EnrichedMessage) -> String {
        format!(
            "poison-pills/{}/{}/{}.json",
            Utc::now().format("%Y-%m-%d"),
            message.source_queue,
            message.message_id
        )
    }
}

#[async_trait]
impl ActionHandler for ArchiveHandler {
    async fn execute(
        &self,
        message: &EnrichedMessage,
        classification: &Classification,
    ) -> Result<ActionOutcome> {
        let key = Self::archive_key(message);

        let archive_object = json!({
            "message": message,
            "classification": classification,
            "archived_at": Utc::now(),
            "reasoning": classification.reasoning,
        });

        let mut metadata = HashMap::new();
        metadata.insert("message-id".to_string(), message.message_id.clone());
        metadata.insert("source-queue".to_string(), message.source_queue.clone());
        metadata.insert("category".to_string(), classification.category.to_string());
        metadata.insert(
            "confidence".to_string(),
            classification.confidence.to_string(),
        );

        let location = self
            .objects
            .put(
                &key,
                &serde_json::to_string(&archive_object)?,
                "application/json",
                metadata,
            )
            .await?;

        let subject = format!("Poison Pill Detected: {}", message.source_queue);
        let excerpt = truncate_chars(&message.error_pattern.message, ALERT_EXCERPT_CHARS);
        let body = format!(
            "A poison-pill message was archived.\n\n\
             Message id: {}\n\
             Source queue: {}\n\
             Archive location: {}\n\
             Confidence: {:.2}\n\
             Reasoning: {}\n\n\
             Error excerpt: {}",
            message.message_id,
            message.source_queue,
            location,
            classification.confidence,
            classification.reasoning,
            excerpt,
        );

        // An alert failure propagates: the bus redelivers and the archive
        // write above overwrites idempotently
        self.alerts
            .publish_alert(&self.alert_topic, &subject, &body)
            .await?;

        info!(
            message_id = %message.message_id,
            source_queue = %message.source_queue,
            archive_location = %location,
            operation = "archive",
            "Poison pill archived and alerted"
        );

        Ok(ActionOutcome {
            outcome: Some(Outcome::Success),
            archive_location: Some(location),
            ..Default::default()
        })
    }
}
