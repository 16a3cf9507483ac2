//! Tagging stage: labels the seed question with domain tags and a question type.

use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::error::{AgentError, AgentResult};
use super::exchange::{decode_record, request_record};
use crate::llm::LlmProvider;
use crate::pipeline::config::PipelineConfig;
use crate::pipeline::types::{
    lenient_label, lenient_tags, RunState, SeedQuestion, Stage, TaggedQuestion,
};
use crate::prompts::build_tagging_prompt;

/// Stage name used in error strings and logs.
pub const STAGE_NAME: &str = "tagging";

#[derive(Debug, Deserialize)]
struct TaggingResponse {
    #[serde(
        default,
        alias = "domain_tags",
        alias = "domainTags",
        deserialize_with = "lenient_tags"
    )]
    tags: Option<Vec<String>>,
    #[serde(default, alias = "questionType", deserialize_with = "lenient_label")]
    question_type: Option<String>,
}

/// Assigns domain tags and a question type to the seed question.
pub struct TaggerAgent {
    llm: Arc<dyn LlmProvider>,
    config: PipelineConfig,
}

impl fmt::Debug for TaggerAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaggerAgent")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TaggerAgent {
    pub fn new(llm: Arc<dyn LlmProvider>, config: PipelineConfig) -> Self {
        Self { llm, config }
    }

    /// Runs the stage. A state that already carries an error passes through untouched.
    pub async fn run(&self, mut state: RunState) -> RunState {
        if state.is_failed() {
            return state;
        }

        match self.tag(&state.seed).await {
            Ok(tagged) => {
                info!(
                    run_id = %state.run_id,
                    tags = ?tagged.domain_tags,
                    question_type = %tagged.question_type,
                    "Seed question tagged"
                );
                state.tagged = Some(tagged);
                state.advance_to(Stage::Tagged);
            }
            Err(e) => {
                error!(run_id = %state.run_id, error = %e, "Tagging failed");
                state.fail(STAGE_NAME, e);
            }
        }
        state
    }

    /// Asks the model to label one seed question.
    pub async fn tag(&self, seed: &SeedQuestion) -> AgentResult<TaggedQuestion> {
        if seed.question.trim().is_empty() {
            return Err(AgentError::MissingInput("seed question is empty".to_string()));
        }

        let prompt = build_tagging_prompt(&seed.question, &seed.thinking_chain, &seed.answer);
        let record = request_record(self.llm.as_ref(), STAGE_NAME, prompt, None).await?;
        let response: TaggingResponse = decode_record(record)?;

        let question_type = response
            .question_type
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| self.config.default_question_type.clone());

        let tagged = TaggedQuestion::new(seed, response.tags.unwrap_or_default(), question_type);
        if tagged.domain_tags.is_empty() {
            warn!("Model returned no domain tags for the seed question");
        }
        Ok(tagged)
    }
}
