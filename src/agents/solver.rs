//! Solving stage: produces a worked solution for every generated question.

use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::error::{AgentError, AgentResult};
use super::exchange::{decode_record, lenient_text, request_record};
use crate::llm::LlmProvider;
use crate::pipeline::types::{GeneratedQuestion, RunState, Solution, Stage};
use crate::prompts::build_solve_prompt;
use crate::storage::QuestionStore;

/// Stage name used in error strings and logs.
pub const STAGE_NAME: &str = "solving";

/// Reasoning and answer returned by the model for one question.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SolvedContent {
    #[serde(
        default,
        alias = "thinkingChain",
        alias = "reasoning",
        deserialize_with = "lenient_text"
    )]
    pub thinking_chain: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub answer: String,
}

/// Solves generated questions one at a time.
pub struct SolverAgent {
    llm: Arc<dyn LlmProvider>,
    store: Arc<dyn QuestionStore>,
}

impl fmt::Debug for SolverAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolverAgent").finish_non_exhaustive()
    }
}

impl SolverAgent {
    pub fn new(llm: Arc<dyn LlmProvider>, store: Arc<dyn QuestionStore>) -> Self {
        Self { llm, store }
    }

    /// Runs the stage. A state that already carries an error passes through untouched.
    ///
    /// Solutions are committed to the state only if every question was solved.
    pub async fn run(&self, mut state: RunState) -> RunState {
        if state.is_failed() {
            return state;
        }

        match self.solve_all(&state.generated).await {
            Ok(solutions) => {
                info!(run_id = %state.run_id, count = solutions.len(), "Solved generated questions");
                state.solutions = solutions;
                state.advance_to(Stage::Completed);
            }
            Err(e) => {
                error!(run_id = %state.run_id, error = %e, "Solving failed");
                state.fail(STAGE_NAME, e);
            }
        }
        state
    }

    async fn solve_all(&self, generated: &[GeneratedQuestion]) -> AgentResult<Vec<Solution>> {
        if generated.is_empty() {
            return Err(AgentError::MissingInput("no generated questions".to_string()));
        }

        let mut solutions = Vec::with_capacity(generated.len());
        for question in generated {
            let content = self.solve(question).await?;
            let id = self
                .store
                .insert_solution(question.id, &content.thinking_chain, &content.answer)
                .await?;
            debug!(question_id = question.id, solution_id = id, "Stored solution");
            solutions.push(Solution::new(id, question, content.thinking_chain, content.answer));
        }
        Ok(solutions)
    }

    /// Asks the model for a fresh solution. Nothing is persisted.
    pub async fn solve(&self, question: &GeneratedQuestion) -> AgentResult<SolvedContent> {
        let prompt = build_solve_prompt(
            &question.domain_tags,
            &question.question_type,
            &question.question,
        );
        let record = request_record(self.llm.as_ref(), STAGE_NAME, prompt, None).await?;
        decode_record(record)
    }
}
