pub mod heuristics;
pub mod llm;
pub mod service;

pub use heuristics::{correlate_deployment, match_pattern, PatternRule};
pub use llm::{parse_llm_reply, HttpLlmClient, LlmClient, LlmVerdict};
pub use service::AnalyzerService;
