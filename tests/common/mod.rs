//! Shared fixture wiring the whole pipeline over in-memory collaborators.

use dlq_recovery_manager::adapters::{
    InMemoryAlertTopic, InMemoryDeploymentStore, InMemoryObjectStore, InMemoryQueueService,
};
use dlq_recovery_manager::analyzer::{AnalyzerService, LlmClient};
use dlq_recovery_manager::config::Config;
use dlq_recovery_manager::error::{AppError, Result};
use dlq_recovery_manager::executor::{
    ArchiveHandler, EscalateHandler, ExecutorService, InMemoryIncidentApi, RetryHandler,
};
use dlq_recovery_manager::messaging::{InMemoryBus, PipelineEvent};
use dlq_recovery_manager::models::TokenUsage;
use dlq_recovery_manager::monitor::{MonitorReport, MonitorService};
use dlq_recovery_manager::state::{
    InMemoryClassificationStore, InMemoryLedger, SemanticCache,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Full pipeline over in-memory infrastructure
pub struct Pipeline {
    pub queue: Arc<InMemoryQueueService>,
    pub ledger: Arc<InMemoryLedger>,
    pub records: Arc<InMemoryClassificationStore>,
    pub deployments: Arc<InMemoryDeploymentStore>,
    pub objects: Arc<InMemoryObjectStore>,
    pub alerts: Arc<InMemoryAlertTopic>,
    pub incidents: Arc<InMemoryIncidentApi>,
    pub bus: Arc<InMemoryBus>,
    pub monitor: MonitorService,
    pub analyzer: AnalyzerService,
    pub executor: ExecutorService,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::build(Config::default(), None)
    }

    pub fn build(config: Config, llm: Option<Arc<dyn LlmClient>>) -> Self {
        let queue = Arc::new(InMemoryQueueService::new());
        let ledger = Arc::new(InMemoryLedger::new(config.retention.ledger_ttl_days));
        let records = Arc::new(InMemoryClassificationStore::new());
        let deployments = Arc::new(InMemoryDeploymentStore::new());
        let objects = Arc::new(InMemoryObjectStore::new());
        let alerts = Arc::new(InMemoryAlertTopic::new());
        let incidents = Arc::new(InMemoryIncidentApi::new());
        let bus = Arc::new(InMemoryBus::new());

        let monitor = MonitorService::new(
            &config,
            queue.clone(),
            ledger.clone(),
            records.clone(),
            deployments.clone(),
            bus.clone(),
        );
        let analyzer = AnalyzerService::new(
            &config,
            records.clone(),
            SemanticCache::with_ttl_hours(10_000, config.retention.cache_ttl_hours),
            llm,
            bus.clone(),
        );
        let executor = ExecutorService::new(
            records.clone(),
            RetryHandler::new(&config, queue.clone()),
            ArchiveHandler::new(&config, objects.clone(), alerts.clone()),
            EscalateHandler::new(&config, incidents.clone()),
        );

        Self {
            queue,
            ledger,
            records,
            deployments,
            objects,
            alerts,
            incidents,
            bus,
            monitor,
            analyzer,
            executor,
        }
    }

    /// One monitor invocation followed by draining the bus through the
    /// analyzer and the executor until quiescent.
    pub async fn run_cycle(&self) -> MonitorReport {
        let report = self.monitor.run_once().await;
        self.drain().await;
        report
    }

    /// Process accepted events in publish order, exactly as the bus-driven
    /// consumers would.
    pub async fn drain(&self) {
        let mut cursor = 0;
        loop {
            let events = self.bus.published().await;
            if cursor >= events.len() {
                break;
            }
            let event = events[cursor].clone();
            cursor += 1;
            match event {
                PipelineEvent::MessageEnriched { message } => {
                    let _ = self.analyzer.handle(&message).await;
                }
                PipelineEvent::MessageClassified {
                    message,
                    classification,
                } => {
                    let _ = self.executor.handle(&message, &classification).await;
                }
            }
        }
    }
}

/// An LLM that never answers inside any sane deadline
pub struct HangingLlm;

#[async_trait]
impl LlmClient for HangingLlm {
    fn model(&self) -> &str {
        "hanging-model"
    }

    async fn complete(
        &self,
        _prompt: &str,
    ) -> Result<dlq_recovery_manager::analyzer::llm::Completion> {
        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        Err(AppError::Llm("unreachable".to_string()))
    }
}

/// An LLM that always returns the same reply
pub struct StaticLlm {
    pub reply: String,
}

#[async_trait]
impl LlmClient for StaticLlm {
    fn model(&self) -> &str {
        "static-model"
    }

    async fn complete(
        &self,
        _prompt: &str,
    ) -> Result<dlq_recovery_manager::analyzer::llm::Completion> {
        Ok(dlq_recovery_manager::analyzer::llm::Completion {
            text: self.reply.clone(),
            tokens: TokenUsage {
                input: 100,
                output: 30,
            },
        })
    }
}
