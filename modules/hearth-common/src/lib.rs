pub mod config;
pub mod error;
pub mod types;

pub use config::FeedConfig;
pub use error::HearthError;
pub use types::*;
