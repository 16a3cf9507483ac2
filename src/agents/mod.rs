//! Stage agents for the question pipeline.
//!
//! Each agent consumes the shared [`RunState`](crate::pipeline::RunState) and
//! returns it advanced by one stage, or marked failed:
//!
//! - [`TaggerAgent`] labels the seed with domain tags and a question type
//! - [`GeneratorAgent`] persists the seed and derives similar questions
//! - [`SolverAgent`] writes a worked solution for every generated question
//! - [`VerifierAgent`] grades solutions, regenerating failures within a bounded budget

pub mod error;
mod exchange;
pub mod generator;
pub mod solver;
pub mod tagger;
pub mod verifier;

#[cfg(test)]
pub(crate) mod mocks;

pub use error::{AgentError, AgentResult};
pub use generator::{GeneratedBatch, GeneratorAgent};
pub use solver::{SolvedContent, SolverAgent};
pub use tagger::TaggerAgent;
pub use verifier::VerifierAgent;
