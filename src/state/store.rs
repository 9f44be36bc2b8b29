use crate::error::{AppError, Result};
use crate::models::{ClassificationRecord, FailureCategory};
use crate::state::{ClassificationStore, OutcomeUpdate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;

/// In-memory classification record store (standalone deployment and testing)
#[derive(Clone)]
pub struct InMemoryClassificationStore {
    records: Arc<DashMap<String, ClassificationRecord>>,
    queue_index: Arc<DashMap<String, Vec<String>>>,
    hash_index: Arc<DashMap<String, Vec<String>>>,
    deployment_index: Arc<DashMap<String, Vec<String>>>,
}

impl InMemoryClassificationStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            queue_index: Arc::new(DashMap::new()),
            hash_index: Arc::new(DashMap::new()),
            deployment_index: Arc::new(DashMap::new()),
        }
    }

    fn index(index: &DashMap<String, Vec<String>>, key: &str, message_id: &str) {
        let mut entry = index.entry(key.to_string()).or_default();
        if !entry.iter().any(|id| id == message_id) {
            entry.push(message_id.to_string());
        }
    }

    fn unindex(index: &DashMap<String, Vec<String>>, key: &str, message_id: &str) {
        if let Some(mut entry) = index.get_mut(key) {
            entry.retain(|id| id != message_id);
        }
    }

    fn resolve(&self, ids: &[String]) -> Vec<ClassificationRecord> {
        ids.iter()
            .filter_map(|id| self.records.get(id).map(|entry| entry.clone()))
            .collect()
    }
}

impl Default for InMemoryClassificationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClassificationStore for InMemoryClassificationStore {
    async fn put_record(&self, record: &ClassificationRecord) -> Result<()> {
        Self::index(&self.queue_index, &record.source_queue, &record.message_id);
        Self::index(&self.hash_index, &record.semantic_hash, &record.message_id);
        if let Some(ref deployment) = record.suspected_deployment {
            Self::index(&self.deployment_index, deployment, &record.message_id);
        }
        self.records
            .insert(record.message_id.clone(), record.clone());

        tracing::debug!(message_id = %record.message_id, "Classification record saved");
        Ok(())
    }

    async fn get_record(&self, message_id: &str) -> Result<Option<ClassificationRecord>> {
        Ok(self.records.get(message_id).map(|entry| entry.clone()))
    }

    async fn update_outcome(&self, message_id: &str, update: &OutcomeUpdate) -> Result<()> {
        let mut record = self.records.get_mut(message_id).ok_or_else(|| {
            AppError::NotFound(format!("Classification record {} not found", message_id))
        })?;

        if let Some(outcome) = update.outcome {
            record.outcome = outcome;
        }
        if let Some(at) = update.retry_scheduled_for {
            record.retry_scheduled_for = Some(at);
        }
        if let Some(ref location) = update.archive_location {
            record.archive_location = Some(location.clone());
        }
        if let Some(ref key) = update.incident_key {
            record.incident_key = Some(key.clone());
        }

        tracing::debug!(message_id = %message_id, outcome = ?record.outcome, "Record outcome updated");
        Ok(())
    }

    async fn count_by_queue_since(&self, queue: &str, since: DateTime<Utc>) -> Result<u64> {
        let ids = self
            .queue_index
            .get(queue)
            .map(|entry| entry.clone())
            .unwrap_or_default();
        let count = self
            .resolve(&ids)
            .into_iter()
            .filter(|record| record.timestamp > since)
            .count();
        Ok(count as u64)
    }

    async fn find_by_semantic_hash(&self, hash: &str) -> Result<Vec<ClassificationRecord>> {
        let ids = self
            .hash_index
            .get(hash)
            .map(|entry| entry.clone())
            .unwrap_or_default();
        Ok(self.resolve(&ids))
    }

    async fn list_by_category_since(
        &self,
        category: FailureCategory,
        since: DateTime<Utc>,
    ) -> Result<Vec<ClassificationRecord>> {
        let mut records: Vec<ClassificationRecord> = self
            .records
            .iter()
            .filter(|entry| entry.category == category && entry.timestamp > since)
            .map(|entry| entry.clone())
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }

    async fn list_by_deployment_since(
        &self,
        deployment: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ClassificationRecord>> {
        let ids = self
            .deployment_index
            .get(deployment)
            .map(|entry| entry.clone())
            .unwrap_or_default();
        let mut records: Vec<ClassificationRecord> = self
            .resolve(&ids)
            .into_iter()
            .filter(|record| record.timestamp > since)
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }

    async fn purge_expired(&self) -> Result<u64> {
        let now = Utc::now();
        let expired: Vec<ClassificationRecord> = self
            .records
            .iter()
            .filter(|entry| entry.expires_at <= now)
            .map(|entry| entry.clone())
            .collect();

        for record in &expired {
            self.records.remove(&record.message_id);
            Self::unindex(&self.queue_index, &record.source_queue, &record.message_id);
            Self::unindex(&self.hash_index, &record.semantic_hash, &record.message_id);
            if let Some(ref deployment) = record.suspected_deployment {
                Self::unindex(&self.deployment_index, deployment, &record.message_id);
            }
        }

        Ok(expired.len() as u64)
    }
}
