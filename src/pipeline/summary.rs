//! Projection of a finished run into its reportable result.

use serde::Serialize;

use super::types::{RecordId, RunState, Solution};

/// Outcome of a run as reported to the caller.
///
/// Serializes untagged: a failure is `{"error": "..."}`, a success is the
/// record of the original question, its generated questions and the
/// verification tally.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResultSummary {
    Failed {
        error: String,
    },
    Success {
        original_question: OriginalQuestionSummary,
        generated_questions: Vec<GeneratedQuestionSummary>,
        verification_summary: VerificationSummary,
    },
}

impl ResultSummary {
    pub fn is_success(&self) -> bool {
        matches!(self, ResultSummary::Success { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OriginalQuestionSummary {
    pub question: String,
    pub domain_tags: Vec<String>,
    pub question_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedQuestionSummary {
    pub id: RecordId,
    pub question: String,
    pub domain_tags: Vec<String>,
    pub question_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solution: Option<SolutionSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolutionSummary {
    pub thinking_chain: String,
    pub answer: String,
    pub verification_score: Option<i64>,
    pub verification_passed: Option<bool>,
    pub verification_feedback: Option<String>,
}

impl From<&Solution> for SolutionSummary {
    fn from(solution: &Solution) -> Self {
        Self {
            thinking_chain: solution.thinking_chain.clone(),
            answer: solution.answer.clone(),
            verification_score: solution.verification_score,
            verification_passed: solution.verification_passed,
            verification_feedback: solution.verification_feedback.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationSummary {
    pub total: usize,
    pub passed: usize,
    /// Mean verification score, `0.0` when nothing was graded.
    pub average_score: f64,
}

/// Projects a run state into its result summary. Pure.
pub fn project_results(state: &RunState) -> ResultSummary {
    if let Some(error) = &state.error {
        return ResultSummary::Failed {
            error: error.clone(),
        };
    }

    let original_question = match &state.tagged {
        Some(tagged) => OriginalQuestionSummary {
            question: tagged.question.clone(),
            domain_tags: tagged.domain_tags.clone(),
            question_type: tagged.question_type.clone(),
        },
        None => OriginalQuestionSummary {
            question: state.seed.question.clone(),
            domain_tags: Vec::new(),
            question_type: String::new(),
        },
    };

    let generated_questions = state
        .generated
        .iter()
        .enumerate()
        .map(|(i, question)| GeneratedQuestionSummary {
            id: question.id,
            question: question.question.clone(),
            domain_tags: question.domain_tags.clone(),
            question_type: question.question_type.clone(),
            solution: state.solutions.get(i).map(SolutionSummary::from),
        })
        .collect();

    let total = state.verifications.len();
    let passed = state.verifications.iter().filter(|v| v.passed).count();
    let average_score = if total == 0 {
        0.0
    } else {
        state.verifications.iter().map(|v| v.score as f64).sum::<f64>() / total as f64
    };

    ResultSummary::Success {
        original_question,
        generated_questions,
        verification_summary: VerificationSummary {
            total,
            passed,
            average_score,
        },
    }
}
