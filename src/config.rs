use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Project name, used in incident source identifiers and dedup keys
    #[serde(default = "default_project_name")]
    pub project_name: String,

    /// Monitor configuration
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Analyzer configuration
    #[serde(default)]
    pub analyzer: AnalyzerConfig,

    /// Executor configuration
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// LLM client configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Retention / TTL configuration
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Feature flags
    #[serde(default)]
    pub features: FeatureFlags,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from embedded defaults, optional file, and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/default.toml".to_string());

        config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(&config_path).required(false))
            // Override with environment variables (prefix: DLQ_RM_)
            .add_source(
                config::Environment::with_prefix("DLQ_RM")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_name: default_project_name(),
            monitor: MonitorConfig::default(),
            analyzer: AnalyzerConfig::default(),
            executor: ExecutorConfig::default(),
            llm: LlmConfig::default(),
            retention: RetentionConfig::default(),
            features: FeatureFlags::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Substring pattern identifying DLQs among discovered queues
    #[serde(default = "default_dlq_name_pattern")]
    pub dlq_name_pattern: String,

    /// Maximum messages received per queue per poll
    #[serde(default = "default_max_messages_per_poll")]
    pub max_messages_per_poll: u32,

    /// Visibility timeout applied to received messages (seconds)
    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout_s: u32,

    /// Long-poll wait time (seconds)
    #[serde(default = "default_long_poll_wait")]
    pub long_poll_wait_s: u32,

    /// Ledger hard cap; at this count a message is dropped as a runaway loop.
    /// This is the effective retry ceiling for the whole pipeline: the
    /// executor cap below only guards against misrouted events.
    #[serde(default = "default_max_retries_monitor")]
    pub max_retries: u32,

    /// Cron schedule for monitor runs
    #[serde(default = "default_monitor_schedule")]
    pub schedule: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            dlq_name_pattern: default_dlq_name_pattern(),
            max_messages_per_poll: default_max_messages_per_poll(),
            visibility_timeout_s: default_visibility_timeout(),
            long_poll_wait_s: default_long_poll_wait(),
            max_retries: default_max_retries_monitor(),
            schedule: default_monitor_schedule(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Minimum heuristic confidence to accept a pattern rule match
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Similar-failure count at which the deployment correlation fires
    #[serde(default = "default_systemic_min_similar")]
    pub systemic_min_similar: u64,

    /// Window for deployment correlation (milliseconds)
    #[serde(default = "default_systemic_window_ms")]
    pub systemic_window_ms: i64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            systemic_min_similar: default_systemic_min_similar(),
            systemic_window_ms: default_systemic_window_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Hard cap on re-enqueues in the retry handler
    #[serde(default = "default_max_retries_executor")]
    pub max_retry_attempts: u32,

    /// Exponential backoff base (seconds)
    #[serde(default = "default_backoff_base")]
    pub backoff_base_s: u64,

    /// Backoff saturation point, also the queue service delay maximum (seconds)
    #[serde(default = "default_backoff_max")]
    pub backoff_max_s: u64,

    /// Incident API endpoint
    #[serde(default = "default_incident_api_url")]
    pub incident_api_url: String,

    /// Env var holding the incident API routing key
    pub incident_routing_key_env: Option<String>,

    /// Alert topic name for poison-pill alerts
    #[serde(default = "default_alert_topic")]
    pub alert_topic: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: default_max_retries_executor(),
            backoff_base_s: default_backoff_base(),
            backoff_max_s: default_backoff_max(),
            incident_api_url: default_incident_api_url(),
            incident_routing_key_env: Some("INCIDENT_ROUTING_KEY".to_string()),
            alert_topic: default_alert_topic(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Model identifier sent to the LLM API
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// API endpoint
    #[serde(default = "default_llm_api_url")]
    pub api_url: String,

    /// Env var holding the API key
    pub api_key_env: Option<String>,

    /// Maximum completion tokens
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_llm_temperature")]
    pub temperature: f64,

    /// Hard timeout on the classification call (milliseconds)
    #[serde(default = "default_llm_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_llm_model(),
            api_url: default_llm_api_url(),
            api_key_env: Some("LLM_API_KEY".to_string()),
            max_tokens: default_llm_max_tokens(),
            temperature: default_llm_temperature(),
            timeout_ms: default_llm_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Semantic cache entry TTL (hours)
    #[serde(default = "default_cache_ttl_hours")]
    pub cache_ttl_hours: u64,

    /// Classification record TTL (days)
    #[serde(default = "default_record_ttl_days")]
    pub record_ttl_days: i64,

    /// Deduplication ledger TTL (days)
    #[serde(default = "default_ledger_ttl_days")]
    pub ledger_ttl_days: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            cache_ttl_hours: default_cache_ttl_hours(),
            record_ttl_days: default_record_ttl_days(),
            ledger_ttl_days: default_ledger_ttl_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureFlags {
    /// Allow the retry handler to re-enqueue transient failures
    #[serde(default = "default_true")]
    pub auto_replay_enabled: bool,

    /// Allow LLM classification; disabled forces the conservative fallback
    #[serde(default = "default_true")]
    pub llm_classification_enabled: bool,

    /// Allow posting to the incident API
    #[serde(default = "default_true")]
    pub incident_integration_enabled: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            auto_replay_enabled: true,
            llm_classification_enabled: true,
            incident_integration_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Service name attached to structured logs
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub prometheus_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            service_name: default_service_name(),
            prometheus_enabled: true,
        }
    }
}

// Default value functions
fn default_project_name() -> String {
    "dlq-recovery".to_string()
}

fn default_dlq_name_pattern() -> String {
    "-dlq".to_string()
}

fn default_max_messages_per_poll() -> u32 {
    10
}

fn default_visibility_timeout() -> u32 {
    300
}

fn default_long_poll_wait() -> u32 {
    5
}

fn default_max_retries_monitor() -> u32 {
    3
}

fn default_monitor_schedule() -> String {
    // every 5 minutes
    "0 */5 * * * *".to_string()
}

fn default_confidence_threshold() -> f64 {
    0.85
}

fn default_systemic_min_similar() -> u64 {
    10
}

fn default_systemic_window_ms() -> i64 {
    900_000
}

fn default_max_retries_executor() -> u32 {
    5
}

fn default_backoff_base() -> u64 {
    30
}

fn default_backoff_max() -> u64 {
    900
}

fn default_incident_api_url() -> String {
    "https://events.pagerduty.com/v2/enqueue".to_string()
}

fn default_alert_topic() -> String {
    "dlq-recovery-alerts".to_string()
}

fn default_llm_model() -> String {
    "claude-3-5-haiku-20241022".to_string()
}

fn default_llm_api_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

fn default_llm_max_tokens() -> u32 {
    512
}

fn default_llm_temperature() -> f64 {
    0.2
}

fn default_llm_timeout_ms() -> u64 {
    10_000
}

fn default_cache_ttl_hours() -> u64 {
    1
}

fn default_record_ttl_days() -> i64 {
    30
}

fn default_ledger_ttl_days() -> i64 {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "dlq-recovery-manager".to_string()
}

fn default_true() -> bool {
    true
}
