//! Generation stage: persists the tagged seed and derives similar questions from it.

use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::error::{AgentError, AgentResult};
use super::exchange::{decode_record, request_record};
use crate::llm::LlmProvider;
use crate::pipeline::config::PipelineConfig;
use crate::pipeline::types::{
    CandidateQuestion, GeneratedQuestion, RecordId, RunState, Stage, TaggedQuestion,
};
use crate::prompts::build_generation_prompt;
use crate::storage::QuestionStore;

/// Stage name used in error strings and logs.
pub const STAGE_NAME: &str = "generation";

#[derive(Debug, Deserialize)]
struct CandidateList {
    #[serde(default)]
    questions: Option<Vec<CandidateQuestion>>,
}

/// Output of a successful generation stage.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedBatch {
    pub seed_id: RecordId,
    pub questions: Vec<GeneratedQuestion>,
}

/// Produces a batch of questions similar to the tagged seed.
pub struct GeneratorAgent {
    llm: Arc<dyn LlmProvider>,
    store: Arc<dyn QuestionStore>,
    config: PipelineConfig,
}

impl fmt::Debug for GeneratorAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratorAgent")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl GeneratorAgent {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        store: Arc<dyn QuestionStore>,
        config: PipelineConfig,
    ) -> Self {
        Self { llm, store, config }
    }

    /// Runs the stage. A state that already carries an error passes through untouched.
    pub async fn run(&self, mut state: RunState) -> RunState {
        if state.is_failed() {
            return state;
        }

        let result = match state.tagged.as_ref() {
            Some(tagged) => self.generate(tagged).await,
            None => Err(AgentError::MissingInput(
                "seed question has not been tagged".to_string(),
            )),
        };

        match result {
            Ok(batch) => {
                info!(
                    run_id = %state.run_id,
                    seed_id = batch.seed_id,
                    count = batch.questions.len(),
                    "Generated similar questions"
                );
                state.seed_id = Some(batch.seed_id);
                state.generated = batch.questions;
                state.advance_to(Stage::QuestionsGenerated);
            }
            Err(e) => {
                error!(run_id = %state.run_id, error = %e, "Question generation failed");
                state.fail(STAGE_NAME, e);
            }
        }
        state
    }

    /// Persists the seed, asks for candidates and persists each usable one in order.
    pub async fn generate(&self, tagged: &TaggedQuestion) -> AgentResult<GeneratedBatch> {
        let seed_id = self.store.insert_seed(tagged).await?;

        let prompt = build_generation_prompt(
            &tagged.domain_tags,
            &tagged.question_type,
            &tagged.question,
            &tagged.thinking_chain,
            &tagged.answer,
            self.config.target_question_count,
        );
        let record = request_record(self.llm.as_ref(), STAGE_NAME, prompt, None).await?;
        let candidates = decode_record::<CandidateList>(record)?
            .questions
            .ok_or_else(|| {
                AgentError::InvalidResponse("response has no `questions` list".to_string())
            })?;

        let mut questions = Vec::with_capacity(candidates.len());
        for (index, candidate) in candidates.into_iter().enumerate() {
            if candidate.text().trim().is_empty() {
                warn!(index, "Skipping blank generated question");
                continue;
            }

            let draft = candidate.resolve(tagged);
            let id = self
                .store
                .insert_generated(seed_id, &draft.question, &draft.domain_tags, &draft.question_type)
                .await?;
            questions.push(GeneratedQuestion::from_draft(id, seed_id, draft));
        }

        if questions.is_empty() {
            return Err(AgentError::InvalidResponse(
                "model returned no usable questions".to_string(),
            ));
        }

        if questions.len() != self.config.target_question_count {
            warn!(
                requested = self.config.target_question_count,
                received = questions.len(),
                "Model returned a different number of questions than requested"
            );
        }

        Ok(GeneratedBatch { seed_id, questions })
    }
}
