//! Verification stage with bounded regenerate-and-recheck.
//!
//! Each solution is graded. A failing solution is re-solved from scratch and
//! graded again until it passes or the attempt budget
//! ([`PipelineConfig::max_verification_attempts`]) is spent. A solution that
//! never passes is kept with `verification_passed = false` so a human can
//! review it; only transport, parse and storage failures abort the stage.

use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::error::{AgentError, AgentResult};
use super::exchange::{decode_record, lenient_text, request_record};
use super::solver::SolverAgent;
use crate::llm::LlmProvider;
use crate::pipeline::config::PipelineConfig;
use crate::pipeline::types::{
    GeneratedQuestion, RunState, Solution, Stage, VerificationResult,
};
use crate::prompts::build_verify_prompt;
use crate::storage::QuestionStore;

/// Stage name used in error strings and logs.
pub const STAGE_NAME: &str = "verification";

/// Grading is kept close to deterministic.
const VERIFY_TEMPERATURE: f64 = 0.2;

#[derive(Debug, Default, Deserialize)]
struct VerdictResponse {
    #[serde(default)]
    score: Option<Value>,
    #[serde(default)]
    passed: Option<Value>,
    #[serde(default, deserialize_with = "lenient_text")]
    feedback: String,
    #[serde(default)]
    suggestions: Option<Value>,
}

/// Grades solutions and regenerates the ones that fail.
pub struct VerifierAgent {
    llm: Arc<dyn LlmProvider>,
    store: Arc<dyn QuestionStore>,
    solver: SolverAgent,
    config: PipelineConfig,
}

impl fmt::Debug for VerifierAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifierAgent")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl VerifierAgent {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        store: Arc<dyn QuestionStore>,
        config: PipelineConfig,
    ) -> Self {
        let solver = SolverAgent::new(Arc::clone(&llm), Arc::clone(&store));
        Self {
            llm,
            store,
            solver,
            config,
        }
    }

    /// Runs the stage. A state that already carries an error passes through untouched.
    ///
    /// On success `solutions` and `verifications` are aligned 1:1 with `generated`.
    pub async fn run(&self, mut state: RunState) -> RunState {
        if state.is_failed() {
            return state;
        }

        match self.verify_all(&state.generated, &state.solutions).await {
            Ok((solutions, verifications)) => {
                let passed = verifications.iter().filter(|v| v.passed).count();
                info!(
                    run_id = %state.run_id,
                    total = verifications.len(),
                    passed,
                    "Verification finished"
                );
                state.solutions = solutions;
                state.verifications = verifications;
                state.advance_to(Stage::Verified);
            }
            Err(e) => {
                error!(run_id = %state.run_id, error = %e, "Verification failed");
                state.fail(STAGE_NAME, e);
            }
        }
        state
    }

    async fn verify_all(
        &self,
        generated: &[GeneratedQuestion],
        solutions: &[Solution],
    ) -> AgentResult<(Vec<Solution>, Vec<VerificationResult>)> {
        if generated.is_empty() || solutions.is_empty() {
            return Err(AgentError::MissingInput(
                "no solutions to verify".to_string(),
            ));
        }
        if generated.len() != solutions.len() {
            return Err(AgentError::MissingInput(format!(
                "{} generated questions but {} solutions",
                generated.len(),
                solutions.len()
            )));
        }

        let mut final_solutions = Vec::with_capacity(solutions.len());
        let mut verifications = Vec::with_capacity(solutions.len());
        for (question, solution) in generated.iter().zip(solutions) {
            let (solution, verdict) = self.verify_question(question, solution.clone()).await?;
            final_solutions.push(solution);
            verifications.push(verdict);
        }
        Ok((final_solutions, verifications))
    }

    /// Grades one solution, regenerating it while attempts remain.
    ///
    /// Returns the final solution together with the last verdict.
    pub async fn verify_question(
        &self,
        question: &GeneratedQuestion,
        mut solution: Solution,
    ) -> AgentResult<(Solution, VerificationResult)> {
        let max_attempts = self.config.max_verification_attempts.max(1);
        let mut attempt = 1;

        loop {
            let verdict = self.grade(question, &solution, attempt).await?;
            self.store
                .update_solution_verification(
                    solution.id,
                    verdict.score,
                    verdict.passed,
                    &verdict.feedback,
                )
                .await?;
            solution.apply_verification(&verdict);

            if verdict.passed {
                debug!(question_id = question.id, attempt, score = verdict.score, "Solution passed");
                return Ok((solution, verdict));
            }

            if attempt >= max_attempts {
                warn!(
                    question_id = question.id,
                    attempts = attempt,
                    score = verdict.score,
                    "Solution still failing after last attempt, keeping it for review"
                );
                return Ok((solution, verdict));
            }

            info!(
                question_id = question.id,
                attempt,
                score = verdict.score,
                "Solution failed verification, regenerating"
            );
            let content = self.solver.solve(question).await?;
            self.store
                .update_solution_content(solution.id, &content.thinking_chain, &content.answer)
                .await?;
            solution.replace_content(content.thinking_chain, content.answer);
            attempt += 1;
        }
    }

    async fn grade(
        &self,
        question: &GeneratedQuestion,
        solution: &Solution,
        attempt: u32,
    ) -> AgentResult<VerificationResult> {
        let prompt = build_verify_prompt(
            &question.domain_tags,
            &question.question_type,
            &question.question,
            &solution.thinking_chain,
            &solution.answer,
        );
        let record = request_record(
            self.llm.as_ref(),
            STAGE_NAME,
            prompt,
            Some(VERIFY_TEMPERATURE),
        )
        .await?;
        let response: VerdictResponse = decode_record(record)?;
        interpret_verdict(response, self.config.pass_score_threshold, attempt)
    }
}

/// Normalizes a grader reply.
///
/// Float and numeric-string scores are rounded. A missing or unreadable
/// `passed` is derived from the score and the threshold.
fn interpret_verdict(
    response: VerdictResponse,
    pass_score_threshold: i64,
    attempt: u32,
) -> AgentResult<VerificationResult> {
    let score = response
        .score
        .as_ref()
        .and_then(score_value)
        .ok_or_else(|| {
            AgentError::InvalidResponse("verification response has no numeric `score`".to_string())
        })?;

    let passed = response
        .passed
        .as_ref()
        .and_then(flag_value)
        .unwrap_or(score >= pass_score_threshold);

    let suggestions = match response.suggestions {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .filter(|s| !s.trim().is_empty())
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s],
        _ => Vec::new(),
    };

    Ok(VerificationResult {
        score,
        passed,
        feedback: response.feedback,
        suggestions,
        attempts: attempt,
    })
}

fn score_value(value: &Value) -> Option<i64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then(|| number.round() as i64)
}

fn flag_value(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "pass" | "passed" => Some(true),
            "false" | "no" | "fail" | "failed" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
