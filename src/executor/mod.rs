pub mod archive;
pub mod escalate;
pub mod retry;
pub mod service;

pub use archive::ArchiveHandler;
pub use escalate::{EscalateHandler, IncidentApiClient, IncidentEvent, IncidentNotifier, InMemoryIncidentApi};
pub use retry::RetryHandler;
pub use service::ExecutorService;

use crate::error::Result;
use crate::models::{Classification, EnrichedMessage, Outcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// What an action handler reports back for the record write-back
#[derive(Debug, Clone, Default)]
pub struct ActionOutcome {
    pub outcome: Option<Outcome>,
    pub failure_reason: Option<String>,
    pub retry_scheduled_for: Option<DateTime<Utc>>,
    pub archive_location: Option<String>,
    pub incident_key: Option<String>,
}

/// Shared contract of the three action handlers. A returned error means the
/// side effect did not happen and the event should be retried by the bus; a
/// returned `ActionOutcome` (including FAILED ones) is terminal for this
/// delivery.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn execute(
        &self,
        message: &EnrichedMessage,
        classification: &Classification,
    ) -> Result<ActionOutcome>;
}
