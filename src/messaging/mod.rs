pub mod events;
pub mod memory;
pub mod traits;

pub use events::*;
pub use memory::InMemoryBus;
pub use traits::{EventBus, EventStream};
