//! # Plugwire Kernel Errors
//!
//! Defines the crate-level [`Error`], which wraps the typed error of each
//! subsystem, and the [`Result`] alias used by the [`System`](super::System)
//! facade.
use std::result::Result as StdResult;

use crate::plugin_system::error::PluginSystemError;
use crate::storage::error::StorageSystemError;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum Error {
    /// Specific, typed plugin system error
    #[error("Plugin system error: {0}")]
    PluginSystem(#[from] PluginSystemError),

    /// Specific, typed storage system error
    #[error("Storage system error: {0}")]
    StorageSystem(#[from] StorageSystemError),
}

/// Result type for plugwire operations
pub type Result<T> = StdResult<T, Error>;

impl Error {
    /// The wrapped plugin system error, if this is one
    pub fn plugin_error(&self) -> Option<&PluginSystemError> {
        match self {
            Error::PluginSystem(err) => Some(err),
            _ => None,
        }
    }
}
