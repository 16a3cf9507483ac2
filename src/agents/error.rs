//! Error types for the pipeline stages.
//!
//! A stage works in `AgentResult` internally and converts the error into the
//! run's error string at its boundary.

use thiserror::Error;

use crate::error::LlmError;
use crate::storage::DatabaseError;
use crate::utils::response_parser::ParseError;

/// Errors that can occur during stage operations.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The run state lacks something the stage needs.
    #[error("missing input: {0}")]
    MissingInput(String),

    /// The model could not be reached or rejected the request.
    #[error("{0}")]
    Transport(#[from] LlmError),

    /// The model answered with text that could not be parsed.
    #[error("{0}")]
    Parse(#[from] ParseError),

    /// The model answered with JSON of the wrong shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// A record could not be written.
    #[error("storage error: {0}")]
    Persistence(#[from] DatabaseError),
}

/// Result type for stage operations.
pub type AgentResult<T> = std::result::Result<T, AgentError>;
