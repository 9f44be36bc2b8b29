pub mod cache;
pub mod ledger;
pub mod store;

pub use cache::SemanticCache;
pub use ledger::InMemoryLedger;
pub use store::InMemoryClassificationStore;

use crate::error::Result;
use crate::models::{ClassificationRecord, FailureCategory, Outcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Trait for classification record storage.
///
/// Records are keyed by `message_id`; secondary indexes support the
/// by-queue, by-category, by-semantic-hash and by-deployment queries the
/// pipeline relies on.
#[async_trait]
pub trait ClassificationStore: Send + Sync {
    /// Persist a classification record (upsert by message_id)
    async fn put_record(&self, record: &ClassificationRecord) -> Result<()>;

    /// Get a record by message id
    async fn get_record(&self, message_id: &str) -> Result<Option<ClassificationRecord>>;

    /// Apply an outcome update to an existing record. Idempotent: applying
    /// the same update twice leaves the record unchanged after the first.
    async fn update_outcome(&self, message_id: &str, update: &OutcomeUpdate) -> Result<()>;

    /// Count records for a queue with `timestamp > since`
    async fn count_by_queue_since(&self, queue: &str, since: DateTime<Utc>) -> Result<u64>;

    /// Records sharing a semantic hash
    async fn find_by_semantic_hash(&self, hash: &str) -> Result<Vec<ClassificationRecord>>;

    /// Records of a category with `timestamp > since`, newest first
    async fn list_by_category_since(
        &self,
        category: FailureCategory,
        since: DateTime<Utc>,
    ) -> Result<Vec<ClassificationRecord>>;

    /// Records attributing a suspected deployment, newest first
    async fn list_by_deployment_since(
        &self,
        deployment: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ClassificationRecord>>;

    /// Drop records past their `expires_at`; returns how many were removed
    async fn purge_expired(&self) -> Result<u64>;
}

/// Outcome write-back applied by the executor after an action
#[derive(Debug, Clone, Default)]
pub struct OutcomeUpdate {
    pub outcome: Option<Outcome>,
    pub retry_scheduled_for: Option<DateTime<Utc>>,
    pub archive_location: Option<String>,
    pub incident_key: Option<String>,
}

impl OutcomeUpdate {
    pub fn outcome(outcome: Outcome) -> Self {
        Self {
            outcome: Some(outcome),
            ..Default::default()
        }
    }

    pub fn with_retry_scheduled_for(mut self, at: DateTime<Utc>) -> Self {
        self.retry_scheduled_for = Some(at);
        self
    }

    pub fn with_archive_location(mut self, location: String) -> Self {
        self.archive_location = Some(location);
        self
    }

    pub fn with_incident_key(mut self, key: String) -> Self {
        self.incident_key = Some(key);
        self
    }
}

/// Entry in the deduplication ledger, one per `(message_id, queue)`
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub message_id: String,
    pub queue: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub retry_count: u32,
    pub expires_at: DateTime<Utc>,
}

/// Trait for the deduplication / retry-accounting ledger.
///
/// Mutated only by the Monitor. `retry_count` is monotonically
/// non-decreasing for a given `(message_id, queue)`.
#[async_trait]
pub trait DedupLedger: Send + Sync {
    /// Read the entry for a message, if any
    async fn get(&self, message_id: &str, queue: &str) -> Result<Option<LedgerEntry>>;

    /// Insert the first observation (retry_count = 0)
    async fn insert_first_seen(&self, message_id: &str, queue: &str) -> Result<LedgerEntry>;

    /// Increment the retry count and bump `last_seen_at`. The entry must
    /// already exist.
    async fn increment_retry(&self, message_id: &str, queue: &str) -> Result<LedgerEntry>;

    /// Drop entries past their `expires_at`; returns how many were removed
    async fn purge_expired(&self) -> Result<u64>;
}
