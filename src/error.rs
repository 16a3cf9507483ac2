//! Error types for question-forge operations.
//!
//! Transport errors live here because every layer that talks to a model
//! sees them. Persistence, parsing, stage and configuration errors are
//! defined next to the code that raises them:
//! - [`crate::storage::DatabaseError`]
//! - [`crate::utils::response_parser::ParseError`]
//! - [`crate::agents::AgentError`]
//! - [`crate::pipeline::ConfigError`]

use thiserror::Error;

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API key: DEEPSEEK_API_KEY or OPENAI_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Empty response: {0}")]
    EmptyResponse(String),
}
