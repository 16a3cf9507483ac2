//! Pipeline configuration.
//!
//! Controls how many questions are requested, how many grading attempts each
//! question gets, the fallbacks used when the model omits a label, and where
//! records are stored.

use thiserror::Error;

/// Default number of grading attempts per question.
pub const DEFAULT_MAX_VERIFICATION_ATTEMPTS: u32 = 2;
/// Default number of questions requested from the model.
pub const DEFAULT_TARGET_QUESTION_COUNT: usize = 5;
/// Question type used when the tagger returns none.
pub const DEFAULT_QUESTION_TYPE: &str = "short-answer";
/// Score at or above which a verdict without `passed` counts as passing.
pub const DEFAULT_PASS_SCORE_THRESHOLD: i64 = 80;
/// Default SQLite location.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://questions.db";

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for the question pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Grading attempts per question, counting the first. At least 1.
    pub max_verification_attempts: u32,
    /// Number of questions asked for in the generation prompt.
    pub target_question_count: usize,
    /// Fallback question type for the tagging stage.
    pub default_question_type: String,
    /// Pass threshold applied when a verdict omits `passed`.
    pub pass_score_threshold: i64,
    /// SQLite connection URL.
    pub database_url: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_verification_attempts: DEFAULT_MAX_VERIFICATION_ATTEMPTS,
            target_question_count: DEFAULT_TARGET_QUESTION_COUNT,
            default_question_type: DEFAULT_QUESTION_TYPE.to_string(),
            pass_score_threshold: DEFAULT_PASS_SCORE_THRESHOLD,
            database_url: DEFAULT_DATABASE_URL.to_string(),
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `PIPELINE_MAX_VERIFICATION_ATTEMPTS`: grading attempts per question (default: 2)
    /// - `PIPELINE_TARGET_QUESTIONS`: questions requested per seed (default: 5)
    /// - `PIPELINE_DEFAULT_QUESTION_TYPE`: fallback question type (default: short-answer)
    /// - `PIPELINE_PASS_SCORE`: pass threshold for verdicts without `passed` (default: 80)
    /// - `DATABASE_URL`: SQLite URL (default: sqlite://questions.db)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable cannot be parsed or the result fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(val) = lookup("PIPELINE_MAX_VERIFICATION_ATTEMPTS") {
            config.max_verification_attempts =
                parse_env_value(&val, "PIPELINE_MAX_VERIFICATION_ATTEMPTS")?;
        }

        if let Some(val) = lookup("PIPELINE_TARGET_QUESTIONS") {
            config.target_question_count = parse_env_value(&val, "PIPELINE_TARGET_QUESTIONS")?;
        }

        if let Some(val) = lookup("PIPELINE_DEFAULT_QUESTION_TYPE") {
            config.default_question_type = val.trim().to_string();
        }

        if let Some(val) = lookup("PIPELINE_PASS_SCORE") {
            config.pass_score_threshold = parse_env_value(&val, "PIPELINE_PASS_SCORE")?;
        }

        if let Some(val) = lookup("DATABASE_URL") {
            config.database_url = val;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_verification_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_verification_attempts must be at least 1".to_string(),
            ));
        }

        if self.max_verification_attempts > 10 {
            return Err(ConfigError::ValidationFailed(
                "max_verification_attempts cannot exceed 10".to_string(),
            ));
        }

        if !(1..=50).contains(&self.target_question_count) {
            return Err(ConfigError::ValidationFailed(
                "target_question_count must be between 1 and 50".to_string(),
            ));
        }

        if self.default_question_type.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "default_question_type cannot be empty".to_string(),
            ));
        }

        if !(0..=100).contains(&self.pass_score_threshold) {
            return Err(ConfigError::ValidationFailed(
                "pass_score_threshold must be between 0 and 100".to_string(),
            ));
        }

        if self.database_url.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "database_url cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Builder method to set the number of grading attempts.
    pub fn with_max_verification_attempts(mut self, attempts: u32) -> Self {
        self.max_verification_attempts = attempts;
        self
    }

    /// Builder method to set the requested question count.
    pub fn with_target_question_count(mut self, count: usize) -> Self {
        self.target_question_count = count;
        self
    }

    /// Builder method to set the fallback question type.
    pub fn with_default_question_type(mut self, question_type: impl Into<String>) -> Self {
        self.default_question_type = question_type.into();
        self
    }

    /// Builder method to set the pass threshold.
    pub fn with_pass_score_threshold(mut self, threshold: i64) -> Self {
        self.pass_score_threshold = threshold;
        self
    }

    /// Builder method to set database URL.
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}
