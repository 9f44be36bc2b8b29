use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::{DashMap, DashSet};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Receive parameters for one poll
#[derive(Debug, Clone)]
pub struct ReceiveOptions {
    pub max_messages: u32,
    pub visibility_timeout_s: u32,
    pub wait_time_s: u32,
}

/// A message handed out by the queue service
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub message_id: String,
    /// Opaque; valid for deletion until the visibility window lapses
    pub receipt_token: String,
    pub body: String,
    pub receive_count: u32,
    pub first_received_at: DateTime<Utc>,
    pub attributes: HashMap<String, String>,
}

/// Queue service seam: discovery, receive, delete, delayed send
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// All queues whose name contains `name_pattern`
    async fn list_queues(&self, name_pattern: &str) -> Result<Vec<String>>;

    /// Receive up to `opts.max_messages`, applying the visibility timeout
    async fn receive(&self, queue: &str, opts: &ReceiveOptions) -> Result<Vec<ReceivedMessage>>;

    /// Delete a received message by its receipt token
    async fn delete(&self, queue: &str, receipt_token: &str) -> Result<()>;

    /// Enqueue a message with a delivery delay (capped at 900 s by the
    /// queue service) and metadata attributes
    async fn send(
        &self,
        queue: &str,
        body: &str,
        delay_s: u64,
        attributes: HashMap<String, String>,
    ) -> Result<()>;
}

#[derive(Debug, Clone)]
struct StoredMessage {
    message_id: String,
    body: String,
    receive_count: u32,
    first_received_at: Option<DateTime<Utc>>,
    visible_at: DateTime<Utc>,
    attributes: HashMap<String, String>,
    /// Receipt issued at the most recent receive
    current_receipt: Option<String>,
}

/// In-memory queue service with visibility-timeout and delayed-delivery
/// semantics (standalone deployment and testing)
pub struct InMemoryQueueService {
    queues: Arc<DashMap<String, Vec<StoredMessage>>>,
    failing_queues: Arc<DashSet<String>>,
    fail_list: Arc<AtomicBool>,
    send_seq: Arc<AtomicU64>,
}

impl InMemoryQueueService {
    pub fn new() -> Self {
        Self {
            queues: Arc::new(DashMap::new()),
            failing_queues: Arc::new(DashSet::new()),
            fail_list: Arc::new(AtomicBool::new(false)),
            send_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Create an empty queue
    pub fn create_queue(&self, name: &str) {
        self.queues.entry(name.to_string()).or_default();
    }

    /// Seed a message with a known id, immediately visible
    pub fn seed_message(&self, queue: &str, message_id: &str, body: &str) {
        self.queues
            .entry(queue.to_string())
            .or_default()
            .push(StoredMessage {
                message_id: message_id.to_string(),
                body: body.to_string(),
                receive_count: 0,
                first_received_at: None,
                visible_at: Utc::now(),
                attributes: HashMap::new(),
                current_receipt: None,
            });
    }

    /// Number of messages currently in a queue (visible or not)
    pub fn queue_len(&self, queue: &str) -> usize {
        self.queues.get(queue).map(|q| q.len()).unwrap_or(0)
    }

    /// Inspect the messages of a queue (id, body, attributes)
    pub fn peek(&self, queue: &str) -> Vec<(String, String, HashMap<String, String>)> {
        self.queues
            .get(queue)
            .map(|q| {
                q.iter()
                    .map(|m| (m.message_id.clone(), m.body.clone(), m.attributes.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Make receives from a queue fail (for poll-isolation tests)
    pub fn set_queue_failing(&self, queue: &str, failing: bool) {
        if failing {
            self.failing_queues.insert(queue.to_string());
        } else {
            self.failing_queues.remove(queue);
        }
    }

    /// Make discovery fail
    pub fn set_fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }
}

impl Default for InMemoryQueueService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueClient for InMemoryQueueService {
    async fn list_queues(&self, name_pattern: &str) -> Result<Vec<String>> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(AppError::Queue("list queues unavailable".to_string()));
        }
        let mut names: Vec<String> = self
            .queues
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|name| name.contains(name_pattern))
            .collect();
        names.sort();
        Ok(names)
    }

    async fn receive(&self, queue: &str, opts: &ReceiveOptions) -> Result<Vec<ReceivedMessage>> {
        if self.failing_queues.contains(queue) {
            return Err(AppError::Queue(format!("receive failed for {}", queue)));
        }

        let mut stored = self
            .queues
            .get_mut(queue)
            .ok_or_else(|| AppError::Queue(format!("queue {} does not exist", queue)))?;

        let now = Utc::now();
        let mut received = Vec::new();
        for message in stored.iter_mut() {
            if received.len() >= opts.max_messages as usize {
                break;
            }
            if message.visible_at > now {
                continue;
            }

            message.receive_count += 1;
            message.first_received_at.get_or_insert(now);
            message.visible_at = now + Duration::seconds(opts.visibility_timeout_s as i64);
            let receipt = format!("{}#{}", message.message_id, message.receive_count);
            message.current_receipt = Some(receipt.clone());

            received.push(ReceivedMessage {
                message_id: message.message_id.clone(),
                receipt_token: receipt,
                body: message.body.clone(),
                receive_count: message.receive_count,
                first_received_at: message.first_received_at.unwrap_or(now),
                attributes: message.attributes.clone(),
            });
        }
        Ok(received)
    }

    async fn delete(&self, queue: &str, receipt_token: &str) -> Result<()> {
        let mut stored = self
            .queues
            .get_mut(queue)
            .ok_or_else(|| AppError::Queue(format!("queue {} does not exist", queue)))?;

        let before = stored.len();
        stored.retain(|m| m.current_receipt.as_deref() != Some(receipt_token));
        if stored.len() == before {
            // Deleting an already-deleted message is a no-op, matching
            // at-least-once queue semantics
            tracing::debug!(source_queue = %queue, "Delete matched no message");
        }
        Ok(())
    }

    async fn send(
        &self,
        queue: &str,
        body: &str,
        delay_s: u64,
        attributes: HashMap<String, String>,
    ) -> Result<()> {
        let seq = self.send_seq.fetch_add(1, Ordering::SeqCst);
        // Deterministic id: derive from the original message when replaying
        let message_id = attributes
            .get("originalMessageId")
            .map(|original| {
                let retry = attributes
                    .get("retryCount")
                    .cloned()
                    .unwrap_or_else(|| "0".to_string());
                format!("{}-r{}", original, retry)
            })
            .unwrap_or_else(|| format!("{}-s{}", queue, seq));

        self.queues
            .entry(queue.to_string())
            .or_default()
            .push(StoredMessage {
                message_id,
                body: body.to_string(),
                receive_count: 0,
                first_received_at: None,
                visible_at: Utc::now() + Duration::seconds(delay_s.min(900) as i64),
                attributes,
                current_receipt: None,
            });
        Ok(())
    }
}
