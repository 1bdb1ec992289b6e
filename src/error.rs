//! Error types for the daybreak mail checker.

use std::path::PathBuf;

use crate::mail::MessageId;

/// Top-level error type for a polling pass.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Archival error: {0}")]
    Archival(#[from] ArchivalError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Mail transport errors (connect, fetch, move). Any of these aborts the pass.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to connect to {host}: {reason}")]
    Connect { host: String, reason: String },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Authentication failed for user {user}")]
    AuthFailed { user: String },

    #[error("Command {command} rejected: {response}")]
    CommandFailed { command: String, response: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Folder {0} not found")]
    FolderNotFound(String),

    #[error("No folder selected")]
    NoFolderSelected,

    #[error("Message {0} not found")]
    MessageNotFound(MessageId),

    #[error("Failed to parse message {id}: {reason}")]
    Parse { id: MessageId, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-document staging failures. Collected into the pass summary, never
/// fatal to the pass.
#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Message {0} has no attachment to stage")]
    MissingAttachment(MessageId),

    #[error("Invalid staging filename: {0}")]
    InvalidFilename(String),
}

/// Batch archival failures, raised after staging has already happened.
#[derive(Debug, thiserror::Error)]
pub enum ArchivalError {
    #[error("Failed to move {count} messages to {folder}: {source}")]
    Move {
        count: usize,
        folder: String,
        #[source]
        source: TransportError,
    },
}

/// Result type alias for the mail checker.
pub type Result<T> = std::result::Result<T, Error>;
