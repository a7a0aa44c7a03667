use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// type alias for all operations in this crate that could fail with a [`FeedbackError`]
pub type Result<T> = std::result::Result<T, FeedbackError>;

/// The Error variants used throughout the feedback pipeline.
///
/// Only [`FeedbackError::Ingestion`] is ever reported back to a submitting client. Persistence
/// failures happen after the client was acknowledged and are logged by the worker that hit them.
#[derive(Error, Debug)]
pub enum FeedbackError {
    /// variant for errors caused from socket or file IO
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// serde_json error while encoding or decoding a request or response
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// a configuration value or command line parameter could not be parsed or is out of range
    #[error("parsing error: {0}")]
    Parsing(String),

    /// a submission was malformed and was never queued
    #[error("Failed to parse feedback: {0}")]
    Ingestion(String),

    /// the pipeline was shut down and no longer accepts records
    #[error("the feedback pipeline is closed")]
    Closed,

    /// a record could not be persisted into its partition
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// an error message received from the feedback server
    #[error("{0}")]
    StringErr(String),
}

/// The ways a single partition write can fail.
///
/// Each variant carries the path that was being worked on so the worker log line is enough to
/// find the problem on disk.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// the base storage directory could not be created
    #[error("failed to create base directory {path:?}: {source}")]
    CreateDir {
        /// the directory that could not be created
        path: PathBuf,
        /// the underlying IO error
        source: io::Error,
    },

    /// the partition file could not be opened for appending
    #[error("failed to open feedback file {path:?}: {source}")]
    OpenFile {
        /// the partition file
        path: PathBuf,
        /// the underlying IO error
        source: io::Error,
    },

    /// the record could not be encoded as JSON
    #[error("failed to marshal feedback for {path:?}: {source}")]
    Serialize {
        /// the partition file the record was meant for
        path: PathBuf,
        /// the underlying serde_json error
        source: serde_json::Error,
    },

    /// the encoded line could not be appended to the partition file
    #[error("failed to write feedback to {path:?}: {source}")]
    Write {
        /// the partition file
        path: PathBuf,
        /// the underlying IO error
        source: io::Error,
    },
}
