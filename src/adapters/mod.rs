//! Seams to the external collaborators: queue service, object store, alert
//! topic and deployment history. Each is an `async_trait` with an in-memory
//! implementation used by the standalone deployment mode and the tests.

pub mod alerts;
pub mod deployments;
pub mod objects;
pub mod queue;

pub use alerts::{AlertPublisher, InMemoryAlertTopic, PublishedAlert};
pub use deployments::{DeploymentStore, InMemoryDeploymentStore};
pub use objects::{InMemoryObjectStore, ObjectStore, StoredObject};
pub use queue::{InMemoryQueueService, QueueClient, ReceiveOptions, ReceivedMessage};
