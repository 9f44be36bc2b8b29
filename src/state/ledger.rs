use crate::error::{AppError, Result};
use crate::state::{DedupLedger, LedgerEntry};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;

/// In-memory deduplication ledger keyed by `(message_id, queue)`
#[derive(Clone)]
pub struct InMemoryLedger {
    entries: Arc<DashMap<(String, String), LedgerEntry>>,
    ttl_days: i64,
}

impl InMemoryLedger {
    pub fn new(ttl_days: i64) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl_days,
        }
    }

    fn key(message_id: &str, queue: &str) -> (String, String) {
        (message_id.to_string(), queue.to_string())
    }
}

#[async_trait]
impl DedupLedger for InMemoryLedger {
    async fn get(&self, message_id: &str, queue: &str) -> Result<Option<LedgerEntry>> {
        Ok(self
            .entries
            .get(&Self::key(message_id, queue))
            .map(|entry| entry.clone()))
    }

    async fn insert_first_seen(&self, message_id: &str, queue: &str) -> Result<LedgerEntry> {
        let now = Utc::now();
        let entry = LedgerEntry {
            message_id: message_id.to_string(),
            queue: queue.to_string(),
            first_seen_at: now,
            last_seen_at: now,
            retry_count: 0,
            expires_at: now + Duration::days(self.ttl_days),
        };
        self.entries
            .insert(Self::key(message_id, queue), entry.clone());

        tracing::debug!(message_id = %message_id, source_queue = %queue, "Ledger entry created");
        Ok(entry)
    }

    async fn increment_retry(&self, message_id: &str, queue: &str) -> Result<LedgerEntry> {
        let mut entry = self
            .entries
            .get_mut(&Self::key(message_id, queue))
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "Ledger entry for {} in {} not found",
                    message_id, queue
                ))
            })?;

        entry.retry_count += 1;
        entry.last_seen_at = Utc::now();
        Ok(entry.clone())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        Ok((before - self.entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_seen_then_increment() {
        let ledger = InMemoryLedger::new(7);

        assert!(ledger.get("m-1", "orders-dlq").await.unwrap().is_none());

        let entry = ledger.insert_first_seen("m-1", "orders-dlq").await.unwrap();
        assert_eq!(entry.retry_count, 0);

        let entry = ledger.increment_retry("m-1", "orders-dlq").await.unwrap();
        assert_eq!(entry.retry_count, 1);
        let entry = ledger.increment_retry("m-1", "orders-dlq").await.unwrap();
        assert_eq!(entry.retry_count, 2);
        assert!(entry.last_seen_at >= entry.first_seen_at);
    }

    #[tokio::test]
    async fn test_retry_count_monotonic_across_reads() {
        let ledger = InMemoryLedger::new(7);
        ledger.insert_first_seen("m-1", "orders-dlq").await.unwrap();

        let mut previous = 0;
        for _ in 0..5 {
            let entry = ledger.increment_retry("m-1", "orders-dlq").await.unwrap();
            assert!(entry.retry_count > previous);
            previous = entry.retry_count;
        }
    }

    #[tokio::test]
    async fn test_entries_scoped_per_queue() {
        let ledger = InMemoryLedger::new(7);
        ledger.insert_first_seen("m-1", "orders-dlq").await.unwrap();
        ledger.increment_retry("m-1", "orders-dlq").await.unwrap();

        // Same message id in a different queue is a distinct entry
        assert!(ledger.get("m-1", "billing-dlq").await.unwrap().is_none());
        let entry = ledger.insert_first_seen("m-1", "billing-dlq").await.unwrap();
        assert_eq!(entry.retry_count, 0);
    }

    #[tokio::test]
    async fn test_increment_missing_entry_fails() {
        let ledger = InMemoryLedger::new(7);
        assert!(ledger.increment_retry("ghost", "orders-dlq").await.is_err());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let ledger = InMemoryLedger::new(0);
        ledger.insert_first_seen("m-1", "orders-dlq").await.unwrap();

        let purged = ledger.purge_expired().await.unwrap();
        assert_eq!(purged, 1);
        assert!(ledger.get("m-1", "orders-dlq").await.unwrap().is_none());
    }
}
