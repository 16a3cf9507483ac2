//! Pipeline orchestrator for one seed question.
//!
//! [`QuestionPipeline`] runs the four stages in order on a single
//! [`RunState`]. Each stage passes a failed state through untouched, so the
//! first failure short-circuits the rest. A panic inside any stage is caught
//! at this boundary and reported as a failed run.

use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::agents::{GeneratorAgent, SolverAgent, TaggerAgent, VerifierAgent};
use crate::llm::LlmProvider;
use crate::storage::QuestionStore;

use super::config::PipelineConfig;
use super::types::{RunState, SeedQuestion};

/// Sequences tagging, generation, solving and verification.
pub struct QuestionPipeline {
    tagger: TaggerAgent,
    generator: GeneratorAgent,
    solver: SolverAgent,
    verifier: VerifierAgent,
    config: PipelineConfig,
}

impl fmt::Debug for QuestionPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuestionPipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl QuestionPipeline {
    /// Wires the stage agents to one model provider and one store.
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        store: Arc<dyn QuestionStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            tagger: TaggerAgent::new(Arc::clone(&llm), config.clone()),
            generator: GeneratorAgent::new(Arc::clone(&llm), Arc::clone(&store), config.clone()),
            solver: SolverAgent::new(Arc::clone(&llm), Arc::clone(&store)),
            verifier: VerifierAgent::new(llm, store, config.clone()),
            config,
        }
    }

    /// Runs every stage on `seed` and returns the final state.
    ///
    /// Never panics: a panic inside a stage yields a `Failed` state that
    /// still carries the seed and the run id.
    pub async fn run(&self, seed: SeedQuestion) -> RunState {
        let state = RunState::new(seed.clone());
        let run_id = state.run_id;
        let started = Instant::now();
        info!(%run_id, "Starting question pipeline");

        let state = match AssertUnwindSafe(self.run_stages(state)).catch_unwind().await {
            Ok(state) => state,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(%run_id, panic = %message, "Pipeline stage panicked");
                let mut state = RunState::new(seed);
                state.run_id = run_id;
                state.fault(message);
                state
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &state.error {
            Some(e) => warn!(%run_id, elapsed_ms, error = %e, "Pipeline finished with an error"),
            None => info!(
                %run_id,
                elapsed_ms,
                generated = state.generated.len(),
                passed = state.verifications.iter().filter(|v| v.passed).count(),
                "Pipeline finished"
            ),
        }
        state
    }

    async fn run_stages(&self, state: RunState) -> RunState {
        let state = self.tagger.run(state).await;
        let state = self.generator.run(state).await;
        let state = self.solver.run(state).await;
        self.verifier.run(state).await
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::mocks::{
        generation_reply, solve_reply, tagging_reply, verify_reply, MemoryStore, Reply,
        ScriptedLlm,
    };
    use crate::pipeline::types::Stage;
    use crate::prompts::{
        GENERATION_SYSTEM_PROMPT, SOLVING_SYSTEM_PROMPT, TAGGING_SYSTEM_PROMPT,
        VERIFICATION_SYSTEM_PROMPT,
    };

    fn seed() -> SeedQuestion {
        SeedQuestion::new(
            "There are 5 apples and you eat 2. How many are left?",
            "5 - 2 = 3",
            "3",
        )
    }

    fn happy_llm() -> ScriptedLlm {
        ScriptedLlm::new()
            .always(TAGGING_SYSTEM_PROMPT, tagging_reply())
            .always(GENERATION_SYSTEM_PROMPT, generation_reply(5))
            .always(SOLVING_SYSTEM_PROMPT, solve_reply("3"))
            .always(VERIFICATION_SYSTEM_PROMPT, verify_reply(92, true))
    }

    #[tokio::test]
    async fn test_full_run_reaches_verified() {
        let store = Arc::new(MemoryStore::new());
        let llm = Arc::new(happy_llm());
        let pipeline = QuestionPipeline::new(llm.clone(), store.clone(), PipelineConfig::default());

        let state = pipeline.run(seed()).await;

        assert!(state.error.is_none());
        assert_eq!(state.current_stage, Stage::Verified);
        assert_eq!(state.generated.len(), 5);
        assert_eq!(state.solutions.len(), 5);
        assert_eq!(state.verifications.len(), 5);
        for (question, solution) in state.generated.iter().zip(&state.solutions) {
            assert_eq!(solution.question_id, question.id);
            assert_eq!(solution.verification_passed, Some(true));
        }
        assert_eq!(llm.calls(TAGGING_SYSTEM_PROMPT), 1);
        assert_eq!(llm.calls(GENERATION_SYSTEM_PROMPT), 1);
        assert_eq!(llm.calls(SOLVING_SYSTEM_PROMPT), 5);
        assert_eq!(llm.calls(VERIFICATION_SYSTEM_PROMPT), 5);
        assert_eq!(store.seed_count(), 1);
    }

    #[tokio::test]
    async fn test_tagging_failure_short_circuits() {
        let llm = Arc::new(
            happy_llm().always(TAGGING_SYSTEM_PROMPT, Reply::Fail("bad gateway".to_string())),
        );
        let store = Arc::new(MemoryStore::new());
        let state = QuestionPipeline::new(llm.clone(), store.clone(), PipelineConfig::default())
            .run(seed())
            .await;

        assert_eq!(state.current_stage, Stage::Failed);
        assert_eq!(
            state.error.as_deref(),
            Some("tagging failed: HTTP request failed: bad gateway")
        );
        assert_eq!(llm.calls(GENERATION_SYSTEM_PROMPT), 0);
        assert_eq!(llm.calls(SOLVING_SYSTEM_PROMPT), 0);
        assert_eq!(store.seed_count(), 0);
    }

    #[tokio::test]
    async fn test_panic_becomes_fault() {
        let llm = Arc::new(
            happy_llm().always(GENERATION_SYSTEM_PROMPT, Reply::Panic("model exploded".to_string())),
        );
        let state = QuestionPipeline::new(llm, Arc::new(MemoryStore::new()), PipelineConfig::default())
            .run(seed())
            .await;

        assert_eq!(state.current_stage, Stage::Failed);
        assert_eq!(state.error.as_deref(), Some("pipeline fault: model exploded"));
        assert_eq!(state.seed, seed());
        assert!(state.generated.is_empty());
    }

    #[test]
    fn test_panic_message_payloads() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
