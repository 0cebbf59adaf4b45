//! Error types for the target

use thiserror::Error;

/// Result type for target operations
pub type Result<T> = std::result::Result<T, TargetError>;

/// Target errors. Every variant is fatal for the session.
#[derive(Error, Debug)]
pub enum TargetError {
    #[error("Unable to parse tap output, expected a JSON object: {reason}: {line}")]
    Decode { line: String, reason: String },

    #[error("Malformed {message_type} message: {reason}")]
    MalformedMessage { message_type: String, reason: String },

    #[error("Stream record for \"{stream}\" encountered before matching schema")]
    MissingSchema { stream: String },

    #[error("Record for stream \"{stream}\" failed schema validation: {}", .errors.join("; "))]
    Validation { stream: String, errors: Vec<String> },

    #[error("Unknown message type \"{message_type}\" in message: {message}")]
    UnknownMessageType { message_type: String, message: String },

    #[error("Invalid schema for stream \"{stream}\": {reason}")]
    InvalidSchema { stream: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Processing aborted at line {line_number}")]
    Aborted {
        line_number: usize,
        #[source]
        source: Box<TargetError>,
    },
}

impl TargetError {
    /// The originating error, looking through any `Aborted` wrapper
    pub fn root_cause(&self) -> &TargetError {
        match self {
            TargetError::Aborted { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub(crate) fn aborted(line_number: usize, source: TargetError) -> Self {
        TargetError::Aborted {
            line_number,
            source: Box::new(source),
        }
    }
}
