pub mod config;
pub mod error;

/// Re-export key types
pub use config::{ConfigFormat, RequirementConfig};
pub use error::StorageSystemError;
