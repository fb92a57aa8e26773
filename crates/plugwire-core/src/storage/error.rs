//! # Plugwire Storage System Errors
//!
//! [`StorageSystemError`] covers reading plugin descriptors and requirement
//! maps from disk and encoding requirement maps back to a file.
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageSystemError {
    #[error("Could not read '{}': {source}", .path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not write requirement map to '{}': {source}", .path.display())]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No descriptor or requirement file at '{}'", .0.display())]
    MissingFile(PathBuf),

    /// A requirement map could not be rendered as `format`.
    #[error("Could not encode requirement map as {format}: {source}")]
    Encode {
        format: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// The document is not valid `format`, or does not have the shape of a
    /// descriptor or requirement map.
    #[error("Malformed {format} document: {source}")]
    Decode {
        format: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("'{}' is not a .json, .yaml/.yml or .toml file", .0.display())]
    UnknownExtension(PathBuf),
}
