use dlq_recovery_manager::{
    adapters::{InMemoryAlertTopic, InMemoryDeploymentStore, InMemoryObjectStore, InMemoryQueueService},
    analyzer::{AnalyzerService, HttpLlmClient, LlmClient},
    config::Config,
    executor::{
        ArchiveHandler, EscalateHandler, ExecutorService, IncidentApiClient, IncidentNotifier,
        InMemoryIncidentApi, RetryHandler,
    },
    messaging::{EventBus, InMemoryBus, PipelineEvent},
    monitor::MonitorService,
    state::{ClassificationStore, DedupLedger, InMemoryClassificationStore, InMemoryLedger, SemanticCache},
};
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {}", e);
        eprintln!("Using default configuration");
        Config::default()
    });

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("dlq_recovery_manager={}", config.observability.log_level).into());
    if config.observability.json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        service = %config.observability.service_name,
        "Starting DLQ recovery manager v{}",
        env!("CARGO_PKG_VERSION")
    );

    if config.observability.prometheus_enabled {
        lazy_static::initialize(&dlq_recovery_manager::metrics::PIPELINE_METRICS);
        tracing::info!("Prometheus metrics initialized");
    }

    // Shared state and collaborator seams. The in-memory backends serve the
    // standalone deployment mode; hosted deployments swap these for their
    // managed counterparts behind the same traits.
    let queue_client = Arc::new(InMemoryQueueService::new());
    let ledger: Arc<dyn DedupLedger> = Arc::new(InMemoryLedger::new(config.retention.ledger_ttl_days));
    let records: Arc<dyn ClassificationStore> = Arc::new(InMemoryClassificationStore::new());
    let deployments = Arc::new(InMemoryDeploymentStore::new());
    let objects = Arc::new(InMemoryObjectStore::new());
    let alerts = Arc::new(InMemoryAlertTopic::new());
    let bus = Arc::new(InMemoryBus::new());
    let cache = SemanticCache::with_ttl_hours(10_000, config.retention.cache_ttl_hours);

    // LLM client is optional; without it the analyzer takes the fallback path
    let llm: Option<Arc<dyn LlmClient>> = match HttpLlmClient::new(config.llm.clone()) {
        Ok(client) => {
            tracing::info!(model = %config.llm.model, "LLM classification client initialized");
            Some(Arc::new(client))
        }
        Err(e) => {
            tracing::warn!(error = %e, "LLM client initialization failed; continuing with fallback classification");
            None
        }
    };

    // Incident API client; degrade to the recording in-memory one when the
    // routing key is absent
    let incident_notifier: Arc<dyn IncidentNotifier> = match IncidentApiClient::from_config(&config)
    {
        Ok(client) => {
            tracing::info!("Incident API client initialized");
            Arc::new(client)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Incident API unavailable; recording incidents in memory");
            Arc::new(InMemoryIncidentApi::new())
        }
    };

    // Pipeline services
    let monitor = Arc::new(MonitorService::new(
        &config,
        queue_client.clone(),
        ledger.clone(),
        records.clone(),
        deployments.clone(),
        bus.clone(),
    ));
    let analyzer = Arc::new(AnalyzerService::new(
        &config,
        records.clone(),
        cache,
        llm,
        bus.clone(),
    ));
    let executor = Arc::new(ExecutorService::new(
        records.clone(),
        RetryHandler::new(&config, queue_client.clone()),
        ArchiveHandler::new(&config, objects.clone(), alerts.clone()),
        EscalateHandler::new(&config, incident_notifier),
    ));

    // Analyzer consumer: one invocation per MessageEnriched event
    let mut enriched_stream = bus.subscribe(&["MessageEnriched"]).await?;
    let analyzer_task = tokio::spawn(async move {
        while let Ok(Some(event)) = enriched_stream.next().await {
            if let PipelineEvent::MessageEnriched { message } = event {
                if let Err(e) = analyzer.handle(&message).await {
                    tracing::error!(
                        message_id = %message.message_id,
                        error = %e,
                        "Analyzer invocation failed; event will be redelivered"
                    );
                }
            }
        }
        tracing::warn!("Analyzer event stream closed");
    });

    // Executor consumer: one invocation per classified event
    let mut classified_stream = bus
        .subscribe(&["TransientFailure", "PoisonPillFailure", "SystemicFailure"])
        .await?;
    let executor_task = tokio::spawn(async move {
        while let Ok(Some(event)) = classified_stream.next().await {
            if let PipelineEvent::MessageClassified {
                message,
                classification,
            } = event
            {
                if let Err(e) = executor.handle(&message, &classification).await {
                    tracing::error!(
                        message_id = %message.message_id,
                        error = %e,
                        "Executor invocation failed; event will be redelivered"
                    );
                }
            }
        }
        tracing::warn!("Executor event stream closed");
    });

    // Scheduled monitor runs
    let mut scheduler = JobScheduler::new().await?;
    let schedule = config.monitor.schedule.clone();
    let scheduled_monitor = monitor.clone();
    scheduler
        .add(Job::new_async(schedule.as_str(), move |_uuid, _lock| {
            let monitor = scheduled_monitor.clone();
            Box::pin(async move {
                monitor.run_once().await;
            })
        })?)
        .await?;
    scheduler.start().await?;
    tracing::info!(schedule = %config.monitor.schedule, "Monitor schedule started");

    // Hourly retention sweep for the in-memory stores
    let sweep_ledger = ledger.clone();
    let sweep_records = records.clone();
    let sweep_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
        loop {
            interval.tick().await;
            match sweep_ledger.purge_expired().await {
                Ok(purged) if purged > 0 => tracing::info!(purged, "Ledger entries expired"),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Ledger purge failed"),
            }
            match sweep_records.purge_expired().await {
                Ok(purged) if purged > 0 => tracing::info!(purged, "Classification records expired"),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Record purge failed"),
            }
        }
    });

    tracing::info!("Pipeline running; press Ctrl+C to shut down");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
        _ = analyzer_task => {
            tracing::warn!("Analyzer consumer stopped");
        }
        _ = executor_task => {
            tracing::warn!("Executor consumer stopped");
        }
    }

    sweep_task.abort();
    tracing::info!("Shutting down gracefully...");
    Ok(())
}
