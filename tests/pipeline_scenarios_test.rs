//! End-to-end scenarios: one DLQ message in, one recovery action out.

mod common;

use chrono::{Duration, Utc};
use common::{HangingLlm, Pipeline, StaticLlm};
use dlq_recovery_manager::config::Config;
use dlq_recovery_manager::models::{
    ActionTaken, Classification, ClassificationRecord, DeploymentRecord, EnrichedMessage,
    ErrorPattern, FailureCategory, ModelTag, Outcome, RecommendedAction, TokenUsage,
};
use dlq_recovery_manager::state::{ClassificationStore, DedupLedger};
use std::sync::Arc;

/// Scenario 1: a network timeout is replayed into the original queue with
/// backoff metadata, and the DLQ entry is deleted.
#[tokio::test]
async fn transient_failure_is_replayed() {
    let p = Pipeline::new();
    p.queue.create_queue("orders-dlq");
    p.queue.create_queue("orders");
    p.queue.seed_message(
        "orders-dlq",
        "m-1",
        r#"{"error":{"name":"NetworkError","message":"ETIMEDOUT: socket hang up"}}"#,
    );

    let report = p.run_cycle().await;
    assert_eq!(report.published, 1);

    let record = p.records.get_record("m-1").await.unwrap().unwrap();
    assert_eq!(record.category, FailureCategory::Transient);
    assert_eq!(record.confidence, 0.96);
    assert_eq!(record.model_tag, ModelTag::Heuristic);
    assert_eq!(record.action_taken, ActionTaken::Replayed);
    assert_eq!(record.outcome, Outcome::Pending);
    assert!(record.retry_scheduled_for.is_some());

    // Re-enqueued into the original queue with retry metadata
    let replayed = p.queue.peek("orders");
    assert_eq!(replayed.len(), 1);
    let (_, body, attributes) = &replayed[0];
    assert!(body.contains("ETIMEDOUT"));
    assert_eq!(attributes.get("retryCount").unwrap(), "1");
    assert_eq!(attributes.get("originalMessageId").unwrap(), "m-1");

    // Source DLQ entry deleted after the publish
    assert_eq!(p.queue.queue_len("orders-dlq"), 0);
}

/// Scenario 2: a null dereference is archived and alerted.
#[tokio::test]
async fn poison_pill_is_archived_with_alert() {
    let p = Pipeline::new();
    p.queue.create_queue("orders-dlq");
    p.queue.seed_message(
        "orders-dlq",
        "m-1",
        r#"{"error":{"name":"TypeError","message":"Cannot read property 'length' of null"}}"#,
    );

    p.run_cycle().await;

    let record = p.records.get_record("m-1").await.unwrap().unwrap();
    assert_eq!(record.category, FailureCategory::PoisonPill);
    assert!(record.confidence >= 0.89);
    assert_eq!(record.outcome, Outcome::Success);

    let today = Utc::now().format("%Y-%m-%d").to_string();
    let expected_key = format!("poison-pills/{today}/orders-dlq/m-1.json");
    assert_eq!(record.archive_location.as_deref(), Some(expected_key.as_str()));

    let object = p.objects.get(&expected_key).unwrap();
    let archived: serde_json::Value = serde_json::from_str(&object.body).unwrap();
    assert_eq!(archived["message"]["message_id"], "m-1");
    assert_eq!(archived["classification"]["category"], "POISON_PILL");

    let alerts = p.alerts.alerts().await;
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].subject.contains("Poison Pill Detected"));
}

/// Scenario 3: a failure spike right after a deployment escalates as a
/// deduplicated incident attributing that deployment.
#[tokio::test]
async fn systemic_spike_escalates_with_suspected_deployment() {
    let p = Pipeline::new();
    p.queue.create_queue("orders-dlq");

    // 16 classified failures for the queue inside the last hour; the
    // current message subtracts itself, leaving 15 similar failures
    for i in 0..16 {
        let record = seeded_record(&format!("prior-{i}"), "orders-dlq");
        p.records.put_record(&record).await.unwrap();
    }

    p.deployments
        .record(DeploymentRecord {
            id: "d-1".to_string(),
            version: "1.4.1".to_string(),
            deployed_at: Utc::now() - Duration::minutes(12),
            author: "ci".to_string(),
        })
        .await;

    p.queue.seed_message(
        "orders-dlq",
        "m-1",
        r#"{"error":{"name":"WidgetError","message":"widget frobnication refused"}}"#,
    );

    p.run_cycle().await;

    let record = p.records.get_record("m-1").await.unwrap().unwrap();
    assert_eq!(record.category, FailureCategory::Systemic);
    assert_eq!(record.confidence, 0.92);
    assert_eq!(record.similar_failures_count, 15);
    assert_eq!(record.suspected_deployment.as_deref(), Some("1.4.1"));
    assert_eq!(record.outcome, Outcome::Success);

    let incidents = p.incidents.incidents().await;
    assert_eq!(incidents.len(), 1);
    assert_eq!(
        incidents[0].dedup_key,
        "dlq-recovery-systemic-orders-dlq-WidgetError"
    );
    assert_eq!(incidents[0].severity, "critical");
}

/// Scenario 4: two messages differing only in a magnitude share a semantic
/// fingerprint; the second is served from the cache with the same verdict.
#[tokio::test]
async fn similar_failures_share_cached_classification() {
    let p = Pipeline::new();
    p.queue.create_queue("orders-dlq");
    p.queue.create_queue("orders");
    p.queue.seed_message(
        "orders-dlq",
        "m-1",
        r#"{"error":{"name":"TimeoutError","message":"timeout after 5000ms"}}"#,
    );
    p.queue.seed_message(
        "orders-dlq",
        "m-2",
        r#"{"error":{"name":"TimeoutError","message":"timeout after 8000ms"}}"#,
    );

    p.run_cycle().await;

    let first = p.records.get_record("m-1").await.unwrap().unwrap();
    let second = p.records.get_record("m-2").await.unwrap().unwrap();

    assert_eq!(first.semantic_hash, second.semantic_hash);
    assert_eq!(first.model_tag, ModelTag::Heuristic);
    assert_eq!(second.model_tag, ModelTag::Cache);
    assert_eq!(first.category, second.category);
    assert_eq!(first.reasoning, second.reasoning);
    assert_eq!(first.confidence, second.confidence);
}

/// Scenario 5: a message at the ledger hard cap is dropped at the source
/// with no enrichment, no event and no record.
#[tokio::test]
async fn hard_capped_message_is_dropped() {
    let p = Pipeline::new();
    p.queue.create_queue("orders-dlq");
    p.queue.seed_message("orders-dlq", "m-1", "{}");

    p.ledger.insert_first_seen("m-1", "orders-dlq").await.unwrap();
    for _ in 0..3 {
        p.ledger.increment_retry("m-1", "orders-dlq").await.unwrap();
    }

    let report = p.run_cycle().await;

    assert_eq!(report.dropped_runaway, 1);
    assert_eq!(report.published, 0);
    assert_eq!(p.queue.queue_len("orders-dlq"), 0);
    assert!(p.bus.published().await.is_empty());
    assert!(p.records.get_record("m-1").await.unwrap().is_none());
}

/// A novel error the heuristics cannot place goes to the LLM; its verdict
/// drives the action and its token usage lands in the audit record.
#[tokio::test]
async fn novel_error_is_classified_by_llm() {
    let llm = StaticLlm {
        reply: r#"{"category": "POISON_PILL", "confidence": 0.84, "reasoning": "payload references a deleted account"}"#
            .to_string(),
    };
    let p = Pipeline::build(Config::default(), Some(Arc::new(llm)));
    p.queue.create_queue("orders-dlq");
    p.queue.seed_message(
        "orders-dlq",
        "m-1",
        r#"{"error":{"name":"WidgetError","message":"widget frobnication refused"}}"#,
    );

    p.run_cycle().await;

    let record = p.records.get_record("m-1").await.unwrap().unwrap();
    assert_eq!(record.category, FailureCategory::PoisonPill);
    assert_eq!(record.model_tag, ModelTag::Model("static-model".to_string()));
    assert_eq!(record.tokens.input, 100);
    assert_eq!(record.tokens.output, 30);
    assert_eq!(record.outcome, Outcome::Success);
    assert!(record.archive_location.is_some());
    assert_eq!(p.alerts.alerts().await.len(), 1);
}

/// Scenario 6: an LLM that exceeds its deadline produces the conservative
/// fallback, which escalates.
#[tokio::test]
async fn llm_timeout_falls_back_to_systemic_and_escalates() {
    let mut config = Config::default();
    config.llm.timeout_ms = 100;
    let p = Pipeline::build(config, Some(Arc::new(HangingLlm)));
    p.queue.create_queue("orders-dlq");
    p.queue.seed_message(
        "orders-dlq",
        "m-1",
        r#"{"error":{"name":"WidgetError","message":"widget frobnication refused"}}"#,
    );

    p.run_cycle().await;

    let record = p.records.get_record("m-1").await.unwrap().unwrap();
    assert_eq!(record.category, FailureCategory::Systemic);
    assert_eq!(record.confidence, 0.6);
    assert_eq!(record.model_tag, ModelTag::Fallback);
    assert!(record.reasoning.contains("failed"));

    assert_eq!(p.incidents.incidents().await.len(), 1);
}

fn seeded_record(message_id: &str, queue: &str) -> ClassificationRecord {
    let message = EnrichedMessage {
        message_id: message_id.to_string(),
        receipt_token: format!("rt-{message_id}"),
        source_queue: queue.to_string(),
        body: "{}".to_string(),
        receive_count: 1,
        first_seen_at: Utc::now(),
        last_failed_at: Utc::now(),
        retry_count: 0,
        similar_failures_last_hour: 0,
        recent_deployments: vec![],
        error_pattern: ErrorPattern {
            error_type: "WidgetError".to_string(),
            message: "widget frobnication refused".to_string(),
            stack_top: None,
            code: None,
            affected_service: "Orders".to_string(),
        },
    };
    let classification = Classification {
        category: FailureCategory::Systemic,
        confidence: 0.92,
        reasoning: "spike correlated with recent deployment".to_string(),
        model_tag: ModelTag::Heuristic,
        tokens: TokenUsage::default(),
        semantic_hash: "1234567890abcdef".to_string(),
        suspected_deployment: None,
        recommended_action: RecommendedAction::Escalate {
            severity: dlq_recovery_manager::models::Severity::P1,
        },
    };
    ClassificationRecord::new(&message, &classification, 30)
}
