pub mod classification;
pub mod message;

pub use classification::*;
pub use message::*;
