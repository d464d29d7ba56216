pub mod config;
pub mod error;
pub mod event;
pub mod traits;
pub mod types;

pub use config::ForgeConfig;
pub use error::{ForgeError, Result};
pub use event::EventBus;
pub use traits::ModelClient;
pub use types::*;
