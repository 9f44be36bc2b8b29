use crate::analyzer::heuristics::{
    correlate_deployment, match_pattern, CORRELATION_CONFIDENCE, CORRELATION_REASONING,
};
use crate::analyzer::llm::{build_classification_prompt, parse_llm_reply, LlmClient};
use crate::config::Config;
use crate::error::Result;
use crate::fingerprint::semantic_fingerprint;
use crate::messaging::{EventBus, PipelineEvent};
use crate::metrics::PIPELINE_METRICS;
use crate::models::{
    CachedVerdict, Classification, ClassificationRecord, EnrichedMessage, FailureCategory,
    ModelTag, RecommendedAction, TokenUsage,
};
use crate::state::{ClassificationStore, SemanticCache};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use validator::Validate;

const FALLBACK_CONFIDENCE: f64 = 0.6;
const FALLBACK_REASONING: &str = "LLM classification failed, requires human review";

/// Turns one enriched message into one classification record and one
/// `MessageClassified` event, resolving the category through the layered
/// decision engine: semantic cache, heuristics, LLM, conservative fallback.
pub struct AnalyzerService {
    records: Arc<dyn ClassificationStore>,
    cache: SemanticCache,
    llm: Option<Arc<dyn LlmClient>>,
    bus: Arc<dyn EventBus>,
    confidence_threshold: f64,
    systemic_min_similar: u64,
    backoff_base_s: u64,
    backoff_max_s: u64,
    llm_timeout: Duration,
    llm_enabled: bool,
    record_ttl_days: i64,
}

impl AnalyzerService {
    pub fn new(
        config: &Config,
        records: Arc<dyn ClassificationStore>,
        cache: SemanticCache,
        llm: Option<Arc<dyn LlmClient>>,
        bus: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            records,
            cache,
            llm,
            bus,
            confidence_threshold: config.analyzer.confidence_threshold,
            systemic_min_similar: config.analyzer.systemic_min_similar,
            backoff_base_s: config.executor.backoff_base_s,
            backoff_max_s: config.executor.backoff_max_s,
            llm_timeout: Duration::from_millis(config.llm.timeout_ms),
            llm_enabled: config.features.llm_classification_enabled,
            record_ttl_days: config.retention.record_ttl_days,
        }
    }

    /// Classify one enriched message, persist the record and publish the
    /// classified event. Idempotent on `message_id`: a redelivered event
    /// overwrites the record with equivalent content.
    pub async fn handle(&self, message: &EnrichedMessage) -> Result<ClassificationRecord> {
        let started = std::time::Instant::now();

        if let Err(e) = message.validate() {
            warn!(message_id = %message.message_id, error = %e, "Enriched message failed validation; classifying anyway");
        }

        let classification = self.classify(message).await;

        let record = ClassificationRecord::new(message, &classification, self.record_ttl_days);
        // The record write is required; the bus will redeliver on failure
        self.records.put_record(&record).await?;

        self.bus
            .publish(&PipelineEvent::MessageClassified {
                message: message.clone(),
                classification: classification.clone(),
            })
            .await?;

        PIPELINE_METRICS
            .classifications
            .with_label_values(&[
                &classification.category.to_string(),
                classification.model_tag.as_str(),
            ])
            .inc();

        info!(
            operation = "classify",
            message_id = %message.message_id,
            source_queue = %message.source_queue,
            category = %classification.category,
            confidence = classification.confidence,
            model = %classification.model_tag,
            latency_ms = started.elapsed().as_millis() as u64,
            "Message classified"
        );
        Ok(record)
    }

    /// Resolve a classification: cache, deployment correlation, pattern
    /// rules, LLM, conservative fallback, in that order.
    async fn classify(&self, message: &EnrichedMessage) -> Classification {
        let semantic_hash = semantic_fingerprint(&message.error_pattern);

        // Cache lookup; failures and expiries are plain misses
        if let Some(cached) = self.cache.get(&semantic_hash).await {
            debug!(message_id = %message.message_id, semantic_hash = %semantic_hash, "Semantic cache hit");
            return self.build(
                message,
                cached.category,
                cached.confidence,
                cached.reasoning,
                ModelTag::Cache,
                TokenUsage::default(),
                semantic_hash,
                None,
            );
        }

        // Heuristic fast-path: deployment correlation first
        if let Some(deployment) = correlate_deployment(message, self.systemic_min_similar) {
            let suspected = Some(deployment.version.clone());
            let classification = self.build(
                message,
                FailureCategory::Systemic,
                CORRELATION_CONFIDENCE,
                CORRELATION_REASONING.to_string(),
                ModelTag::Heuristic,
                TokenUsage::default(),
                semantic_hash.clone(),
                suspected,
            );
            self.write_cache(&classification).await;
            return classification;
        }

        // Heuristic fast-path: ordered pattern rule table
        if let Some(rule) = match_pattern(&message.error_pattern.message, self.confidence_threshold)
        {
            let classification = self.build(
                message,
                rule.category,
                rule.confidence,
                rule.reasoning.to_string(),
                ModelTag::Heuristic,
                TokenUsage::default(),
                semantic_hash.clone(),
                None,
            );
            self.write_cache(&classification).await;
            return classification;
        }

        // LLM classification, then the conservative fallback
        match self.classify_with_llm(message).await {
            Ok((verdict, model, tokens)) => {
                let classification = self.build(
                    message,
                    verdict.category,
                    verdict.confidence,
                    verdict.reasoning,
                    ModelTag::Model(model),
                    tokens,
                    semantic_hash.clone(),
                    None,
                );
                self.write_cache(&classification).await;
                classification
            }
            Err(e) => {
                warn!(
                    message_id = %message.message_id,
                    error = %e,
                    operation = "llm_classify",
                    "LLM classification unavailable; taking conservative fallback"
                );
                self.build(
                    message,
                    FailureCategory::Systemic,
                    FALLBACK_CONFIDENCE,
                    FALLBACK_REASONING.to_string(),
                    ModelTag::Fallback,
                    TokenUsage::default(),
                    semantic_hash,
                    None,
                )
            }
        }
    }

    async fn classify_with_llm(
        &self,
        message: &EnrichedMessage,
    ) -> Result<(crate::analyzer::llm::LlmVerdict, String, TokenUsage)> {
        if !self.llm_enabled {
            return Err(crate::error::AppError::Llm(
                "LLM classification disabled".to_string(),
            ));
        }
        let llm = self
            .llm
            .as_ref()
            .ok_or_else(|| crate::error::AppError::Llm("no LLM client configured".to_string()))?;

        let prompt = build_classification_prompt(message);
        let started = std::time::Instant::now();

        let completion = tokio::time::timeout(self.llm_timeout, llm.complete(&prompt))
            .await
            .map_err(|_| {
                crate::error::AppError::Timeout(format!(
                    "LLM call exceeded {} ms",
                    self.llm_timeout.as_millis()
                ))
            })??;

        PIPELINE_METRICS
            .llm_latency
            .with_label_values(&[llm.model()])
            .observe(started.elapsed().as_secs_f64());

        let verdict = parse_llm_reply(&completion.text)?;
        Ok((verdict, llm.model().to_string(), completion.tokens))
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        &self,
        message: &EnrichedMessage,
        category: FailureCategory,
        confidence: f64,
        reasoning: String,
        model_tag: ModelTag,
        tokens: TokenUsage,
        semantic_hash: String,
        suspected_deployment: Option<String>,
    ) -> Classification {
        Classification {
            category,
            confidence,
            reasoning,
            model_tag,
            tokens,
            semantic_hash,
            suspected_deployment,
            recommended_action: RecommendedAction::for_category(
                category,
                message.retry_count,
                self.backoff_base_s,
                self.backoff_max_s,
            ),
        }
    }

    /// Cache the verdict for similar failures; a lost write just means the
    /// next analyzer pays the decision cost again.
    async fn write_cache(&self, classification: &Classification) {
        self.cache
            .insert(
                classification.semantic_hash.clone(),
                CachedVerdict {
                    category: classification.category,
                    confidence: classification.confidence,
                    reasoning: classification.reasoning.clone(),
                    cached_at: Utc::now(),
                },
            )
            .await;
    }
}
