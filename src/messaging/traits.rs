//! Event bus trait abstractions

use crate::error::Result;
use crate::messaging::events::PipelineEvent;
use async_trait::async_trait;

/// Event bus seam between the pipeline stages.
///
/// `publish` returns only once the bus has durably accepted the event; the
/// monitor deletes a source message strictly after that acknowledgement. The
/// bus may deliver duplicates, so every consumer is idempotent on
/// `(message_id, queue)`.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish an event; Ok means the bus accepted it
    async fn publish(&self, event: &PipelineEvent) -> Result<()>;

    /// Subscribe to events whose detail type is in `detail_types`
    /// (empty slice = all events)
    async fn subscribe(&self, detail_types: &[&str]) -> Result<Box<dyn EventStream>>;
}

/// Stream of events delivered to a subscriber
#[async_trait]
pub trait EventStream: Send {
    /// Next matching event; None when the bus has shut down
    async fn next(&mut self) -> Result<Option<PipelineEvent>>;
}
