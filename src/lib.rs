//! question-forge: seed-question expansion with verified solutions.
//!
//! A run tags a seed question, generates similar questions, solves each one
//! and grades the solutions, regenerating failures within a bounded number
//! of attempts. Everything is persisted to SQLite.

pub mod agents;
pub mod cli;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod storage;
pub mod utils;

pub use error::LlmError;
pub use pipeline::{
    project_results, PipelineConfig, QuestionPipeline, ResultSummary, RunState, SeedQuestion,
    Stage,
};
