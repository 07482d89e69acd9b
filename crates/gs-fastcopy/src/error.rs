//! Error types for gs-fastcopy

use crate::compression::Direction;
use crate::process::ProcessFailure;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by `read` and `write` operations
#[derive(Error, Debug)]
pub enum Error {
    /// The locator could not be parsed into a remote or local location
    #[error("Invalid locator '{locator}': {reason}")]
    InvalidLocator {
        /// The locator as supplied by the caller
        locator: String,
        /// What is wrong with it
        reason: String,
    },

    /// The local copy of an object could not be prepared or opened
    #[error("Failed to stage file for {locator}: {source}")]
    Stage {
        /// Source or destination being staged
        locator: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The external copy-in command failed
    #[error("Failed to download file from {locator}: {source}")]
    Download {
        /// Remote source
        locator: String,
        /// Captured exit status and diagnostics
        #[source]
        source: ProcessFailure,
    },

    /// The chunked upload failed
    #[error("Failed to upload file to {locator}: {message}")]
    Upload {
        /// Remote destination
        locator: String,
        /// Diagnostic text from the object store
        message: String,
    },

    /// A (de)compression tool exited unsuccessfully
    #[error("Failed to {direction} file for {locator}: {source}")]
    Compression {
        /// Source or destination the staged file belongs to
        locator: String,
        /// Which way the tool was run
        direction: Direction,
        /// Captured exit status and diagnostics
        #[source]
        source: ProcessFailure,
    },

    /// Moving the staged file to a local destination failed
    #[error("Failed to deliver file to {}: {source}", path.display())]
    Deliver {
        /// Local destination
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Removing the scratch directory failed
    #[error("Failed to remove scratch directory {}: {source}", path.display())]
    Cleanup {
        /// Scratch directory that could not be removed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The async runtime could not be created
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Configuration-related error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result alias used throughout gs-fastcopy
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(io_err) => io_err,
            other => std::io::Error::new(std::io::ErrorKind::Other, other),
        }
    }
}
