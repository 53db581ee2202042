pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::HushConfig;
pub use error::{HushError, Result};
pub use events::{AssistantEvent, InboundEvent};
pub use types::*;
