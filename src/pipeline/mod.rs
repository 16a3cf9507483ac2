//! Pipeline orchestration for question generation.
//!
//! One run turns a seed question into a batch of similar, solved and graded
//! questions.
//!
//! # Architecture
//!
//! - **Types**: the run state and the records that flow through it
//! - **Orchestrator**: sequences the stage agents and contains failures
//! - **Summary**: projects a finished run into its reportable result
//! - **Config**: knobs for generation and verification
//!
//! # Pipeline Flow
//!
//! 1. **Tagging**: the seed is labelled with domain tags and a question type
//! 2. **Generation**: the seed is stored and similar questions are derived from it
//! 3. **Solving**: every generated question gets a worked solution
//! 4. **Verification**: each solution is graded; failing ones are re-solved
//!    until they pass or the attempt budget runs out
//!
//! A failing stage records `"<stage> failed: <cause>"` on the state and every
//! later stage passes it through unchanged.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use question_forge::llm::{ChatClient, LlmConfig};
//! use question_forge::pipeline::{project_results, PipelineConfig, QuestionPipeline, SeedQuestion};
//! use question_forge::storage::Database;
//!
//! let config = PipelineConfig::from_env()?;
//! let db = Database::open(&config.database_url).await?;
//! let llm = ChatClient::new(LlmConfig::from_env()?)?;
//! let pipeline = QuestionPipeline::new(Arc::new(llm), Arc::new(db), config);
//!
//! let state = pipeline
//!     .run(SeedQuestion::new("What is 7 * 8?", "7 * 8 = 56", "56"))
//!     .await;
//! println!("{}", serde_json::to_string_pretty(&project_results(&state))?);
//! ```

pub mod config;
pub mod orchestrator;
pub mod summary;
pub mod types;

pub use config::{ConfigError, PipelineConfig};
pub use orchestrator::QuestionPipeline;
pub use summary::{
    project_results, GeneratedQuestionSummary, OriginalQuestionSummary, ResultSummary,
    SolutionSummary, VerificationSummary,
};
pub use types::{
    normalize_tags, CandidateQuestion, GeneratedQuestion, QuestionDraft, RecordId, RunState,
    SeedQuestion, Solution, Stage, TaggedQuestion, VerificationResult,
};
