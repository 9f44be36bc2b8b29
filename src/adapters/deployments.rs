use crate::error::Result;
use crate::models::DeploymentRecord;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Deployment history seam used for enrichment and correlation
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// Deployments within the trailing window, most recent first
    async fn recent_deployments(&self, window: Duration) -> Result<Vec<DeploymentRecord>>;
}

/// In-memory deployment history (standalone deployment and testing)
pub struct InMemoryDeploymentStore {
    deployments: Arc<RwLock<Vec<DeploymentRecord>>>,
}

impl InMemoryDeploymentStore {
    pub fn new() -> Self {
        Self {
            deployments: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn record(&self, deployment: DeploymentRecord) {
        self.deployments.write().await.push(deployment);
    }
}

impl Default for InMemoryDeploymentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeploymentStore for InMemoryDeploymentStore {
    async fn recent_deployments(&self, window: Duration) -> Result<Vec<DeploymentRecord>> {
        let cutoff = Utc::now() - window;
        let mut recent: Vec<DeploymentRecord> = self
            .deployments
            .read()
            .await
            .iter()
            .filter(|d| d.deployed_at >= cutoff)
            .cloned()
            .collect();
        recent.sort_by(|a, b| b.deployed_at.cmp(&a.deployed_at));
        Ok(recent)
    }
}
