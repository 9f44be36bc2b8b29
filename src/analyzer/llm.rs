//! LLM classification client: prompt assembly over redacted context, an HTTP
//! implementation of the completion call, and strict parsing of the JSON
//! reply. Anything the model returns that deviates from the required shape
//! is an error; the caller takes the conservative fallback instead of
//! attempting repair.

use crate::config::LlmConfig;
use crate::error::{AppError, Result};
use crate::models::{EnrichedMessage, FailureCategory, TokenUsage};
use crate::redaction::redact;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A completion returned by the LLM API
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub tokens: TokenUsage,
}

/// LLM API seam
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Model identifier recorded as the classification's model tag
    fn model(&self) -> &str;

    /// Run one completion request
    async fn complete(&self, prompt: &str) -> Result<Completion>;
}

/// Validated verdict parsed from an LLM reply
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmVerdict {
    pub category: FailureCategory,
    pub confidence: f64,
    pub reasoning: String,
}

/// Build the classification prompt. Everything free-form is redacted; the
/// body never appears, only the extracted (already truncated) error fields.
pub fn build_classification_prompt(message: &EnrichedMessage) -> String {
    let pattern = &message.error_pattern;

    let stack = pattern
        .stack_top
        .as_ref()
        .map(|frames| redact(&frames.join("\n")))
        .unwrap_or_else(|| "none".to_string());

    let deployments = if message.recent_deployments.is_empty() {
        "none".to_string()
    } else {
        message
            .recent_deployments
            .iter()
            .map(|d| redact(&format!("{} at {} by {}", d.version, d.deployed_at, d.author)))
            .collect::<Vec<_>>()
            .join("; ")
    };

    format!(
        "You are classifying a failed message from a dead-letter queue.\n\
         \n\
         Error type: {error_type}\n\
         Error code: {code}\n\
         Error message: {message}\n\
         Stack trace: {stack}\n\
         Retry count: {retry_count}\n\
         Similar failures in the last hour: {similar}\n\
         Affected service: {service}\n\
         Source queue: {queue}\n\
         Recent deployments: {deployments}\n\
         \n\
         Classify the failure as exactly one of:\n\
         - TRANSIENT: likely to succeed if replayed after a short backoff\n\
         - POISON_PILL: the message content itself is unprocessable; replay cannot succeed\n\
         - SYSTEMIC: the cause is external to the message and affects many messages\n\
         \n\
         Respond with a single JSON object and nothing else, with exactly these fields:\n\
         {{\"category\": \"TRANSIENT\" | \"POISON_PILL\" | \"SYSTEMIC\", \"confidence\": <0..1>, \"reasoning\": \"<short explanation>\"}}",
        error_type = pattern.error_type,
        code = pattern.code.as_deref().unwrap_or("none"),
        message = redact(&pattern.message),
        stack = stack,
        retry_count = message.retry_count,
        similar = message.similar_failures_last_hour,
        service = pattern.affected_service,
        queue = message.source_queue,
        deployments = deployments,
    )
}

/// Parse the first JSON object found in an LLM reply, tolerating (but not
/// requiring) markdown fencing around it.
pub fn parse_llm_reply(reply: &str) -> Result<LlmVerdict> {
    let object = first_json_object(reply)
        .ok_or_else(|| AppError::Llm("no JSON object in reply".to_string()))?;

    let verdict: LlmVerdict = serde_json::from_str(object)
        .map_err(|e| AppError::Llm(format!("invalid reply shape: {}", e)))?;

    if !(0.0..=1.0).contains(&verdict.confidence) {
        return Err(AppError::Llm(format!(
            "confidence {} outside [0,1]",
            verdict.confidence
        )));
    }
    if verdict.reasoning.trim().is_empty() {
        return Err(AppError::Llm("empty reasoning".to_string()));
    }
    Ok(verdict)
}

/// Locate the first balanced `{ ... }` span, ignoring braces inside strings.
fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    messages: Vec<RequestMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize, Default)]
struct Usage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

/// HTTP client for a messages-style LLM API
pub struct HttpLlmClient {
    config: LlmConfig,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpLlmClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key_env
            .as_ref()
            .and_then(|env| std::env::var(env).ok());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            api_key,
            client,
        })
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, prompt: &str) -> Result<Completion> {
        let request = MessagesRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            messages: vec![RequestMessage {
                role: "user",
                content: prompt,
            }],
        };

        let mut builder = self
            .client
            .post(&self.config.api_url)
            .header("content-type", "application/json")
            .header("anthropic-version", "2023-06-01")
            .json(&request);
        if let Some(ref key) = self.api_key {
            builder = builder.header("x-api-key", key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout(format!("LLM call timed out: {}", e))
                } else {
                    AppError::Llm(format!("LLM call failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Llm(format!("LLM API error ({}): {}", status, body)));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("invalid LLM API response: {}", e)))?;

        let text = parsed
            .content
            .first()
            .map(|block| block.text.clone())
            .unwrap_or_default();

        Ok(Completion {
            text,
            tokens: TokenUsage {
                input: parsed.usage.input_tokens,
                output: parsed.usage.output_tokens,
            },
        })
    }
}
