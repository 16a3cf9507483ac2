//! End-to-end pipeline tests against a real SQLite database and a scripted model.

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use question_forge::llm::{GenerationRequest, GenerationResponse, LlmProvider};
use question_forge::prompts::{
    GENERATION_SYSTEM_PROMPT, SOLVING_SYSTEM_PROMPT, TAGGING_SYSTEM_PROMPT,
    VERIFICATION_SYSTEM_PROMPT,
};
use question_forge::storage::Database;
use question_forge::{
    project_results, LlmError, PipelineConfig, QuestionPipeline, ResultSummary, SeedQuestion,
    Stage,
};

type Handler = Box<dyn Fn(&GenerationRequest) -> Result<String, LlmError> + Send + Sync>;

/// Model double that answers through a closure and records every request.
struct FnLlm {
    handler: Handler,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl FnLlm {
    fn new(
        handler: impl Fn(&GenerationRequest) -> Result<String, LlmError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self, system: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.system_prompt() == Some(system))
            .count()
    }
}

#[async_trait]
impl LlmProvider for FnLlm {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let reply = (self.handler)(&request);
        self.requests.lock().unwrap().push(request);
        Ok(GenerationResponse::from_content("scripted", reply?))
    }
}

fn pool_seed() -> SeedQuestion {
    SeedQuestion::new(
        "An inlet pipe fills 1/10 of a pool per hour and an outlet pipe drains 1/15 per hour. \
         Starting empty with both open, how many hours until the pool is full?",
        "Net rate = 1/10 - 1/15 = 1/30, so it takes 30 hours.",
        "30 hours",
    )
}

fn user_prompt(request: &GenerationRequest) -> &str {
    request
        .messages
        .last()
        .map(|m| m.content.as_str())
        .unwrap_or_default()
}

/// Replies for tagging and generation shared by every scenario.
fn common_reply(system: &str) -> Option<String> {
    if system == TAGGING_SYSTEM_PROMPT {
        return Some(r#"{"tags": ["math"], "question_type": "computation"}"#.to_string());
    }
    if system == GENERATION_SYSTEM_PROMPT {
        let questions: Vec<String> = (1..=5)
            .map(|i| format!("A tank fills at 1/{} per hour. How long to fill it?", i * 4))
            .collect();
        return Some(json!({ "questions": questions }).to_string());
    }
    None
}

async fn open_db(dir: &TempDir) -> Database {
    let path = dir.path().join("questions.db");
    Database::open(path.to_str().unwrap()).await.unwrap()
}

#[tokio::test]
async fn test_pool_scenario_end_to_end() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir).await;

    let llm = Arc::new(FnLlm::new(|request| {
        let system = request.system_prompt().unwrap_or_default();
        if let Some(reply) = common_reply(system) {
            return Ok(reply);
        }
        if system == SOLVING_SYSTEM_PROMPT {
            // Literal newline inside a string value, as models often emit.
            return Ok("```json\n{\"thinking_chain\": \"Invert the rate.\nDone.\", \"answer\": \"4 hours\",}\n```"
                .to_string());
        }
        Ok(r#"{"score": 92, "passed": true, "feedback": "Correct.", "suggestions": []}"#.to_string())
    }));

    let pipeline = QuestionPipeline::new(llm.clone(), Arc::new(db.clone()), PipelineConfig::default());
    let state = pipeline.run(pool_seed()).await;

    assert_eq!(state.error, None);
    assert_eq!(state.current_stage, Stage::Verified);
    let tagged = state.tagged.as_ref().unwrap();
    assert_eq!(tagged.domain_tags, vec!["math".to_string()]);
    assert_eq!(tagged.question_type, "computation");
    assert_eq!(state.generated.len(), 5);
    assert_eq!(state.solutions.len(), 5);
    assert_eq!(state.verifications.len(), 5);
    for question in &state.generated {
        assert_eq!(question.domain_tags, tagged.domain_tags);
        assert_eq!(question.question_type, "computation");
    }
    assert_eq!(state.solutions[0].thinking_chain, "Invert the rate.\nDone.");

    let summary = project_results(&state);
    let value = serde_json::to_value(&summary).unwrap();
    assert_eq!(value["generated_questions"].as_array().unwrap().len(), 5);
    assert_eq!(value["verification_summary"]["total"], 5);
    assert_eq!(value["verification_summary"]["passed"], 5);
    assert_eq!(value["verification_summary"]["average_score"], 92.0);

    let stats = db.stats().await.unwrap();
    assert_eq!(stats.original, 1);
    assert_eq!(stats.generated, 5);
    assert_eq!(stats.solutions, 5);
    assert_eq!(stats.verified, 5);
    assert_eq!(stats.passed, 5);

    let seed_id = state.seed_id.unwrap();
    let rows = db.list_solutions(Some(seed_id), None).await.unwrap();
    assert_eq!(rows.len(), 5);
    assert!(rows.iter().all(|r| r.verification_passed == Some(true)));

    let context = db
        .solution_context(state.solutions[2].id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(context.original_question.id, seed_id);
    assert_eq!(context.generated_question.question, state.generated[2].question);

    assert_eq!(llm.calls(SOLVING_SYSTEM_PROMPT), 5);
    assert_eq!(llm.calls(VERIFICATION_SYSTEM_PROMPT), 5);
}

#[tokio::test]
async fn test_solve_failure_reports_error_only() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir).await;

    let llm = Arc::new(FnLlm::new(|request| {
        let system = request.system_prompt().unwrap_or_default();
        match common_reply(system) {
            Some(reply) => Ok(reply),
            None => Err(LlmError::RequestFailed("connection reset".to_string())),
        }
    }));

    let state = QuestionPipeline::new(llm.clone(), Arc::new(db.clone()), PipelineConfig::default())
        .run(pool_seed())
        .await;

    assert_eq!(state.current_stage, Stage::Failed);
    assert_eq!(state.generated.len(), 5);
    assert!(state.solutions.is_empty());
    assert!(state.verifications.is_empty());
    assert_eq!(llm.calls(VERIFICATION_SYSTEM_PROMPT), 0);

    let summary = project_results(&state);
    assert!(matches!(summary, ResultSummary::Failed { .. }));
    assert_eq!(
        serde_json::to_value(&summary).unwrap(),
        json!({"error": "solving failed: HTTP request failed: connection reset"})
    );

    // Partial writes are kept.
    let stats = db.stats().await.unwrap();
    assert_eq!(stats.generated, 5);
    assert_eq!(stats.solutions, 0);
}

#[tokio::test]
async fn test_failed_solutions_are_regenerated_and_persisted() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir).await;
    let solves = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&solves);
    let llm = Arc::new(FnLlm::new(move |request| {
        let system = request.system_prompt().unwrap_or_default();
        if let Some(reply) = common_reply(system) {
            return Ok(reply);
        }
        if system == SOLVING_SYSTEM_PROMPT {
            let answer = if counter.fetch_add(1, Ordering::SeqCst) < 5 {
                "wrong"
            } else {
                "right"
            };
            return Ok(json!({"thinking_chain": "Work it out.", "answer": answer}).to_string());
        }
        // Grader without a `passed` field: the threshold decides.
        if user_prompt(request).contains("Answer: right") {
            Ok(r#"{"score": 88.4, "feedback": "Good."}"#.to_string())
        } else {
            Ok(r#"{"score": "35", "feedback": "Wrong answer."}"#.to_string())
        }
    }));

    let state = QuestionPipeline::new(llm.clone(), Arc::new(db.clone()), PipelineConfig::default())
        .run(pool_seed())
        .await;

    assert_eq!(state.current_stage, Stage::Verified);
    assert_eq!(llm.calls(SOLVING_SYSTEM_PROMPT), 10);
    assert_eq!(llm.calls(VERIFICATION_SYSTEM_PROMPT), 10);
    for (solution, verdict) in state.solutions.iter().zip(&state.verifications) {
        assert_eq!(solution.answer, "right");
        assert_eq!(solution.verification_passed, Some(true));
        assert_eq!(verdict.score, 88);
        assert_eq!(verdict.attempts, 2);
    }

    let rows = db.list_solutions(state.seed_id, None).await.unwrap();
    assert_eq!(rows.len(), 5);
    for row in rows {
        assert_eq!(row.answer, "right");
        assert_eq!(row.verification_score, Some(88));
        assert_eq!(row.verification_feedback.as_deref(), Some("Good."));
    }
}

#[tokio::test]
async fn test_exhausted_attempts_keep_failing_solution() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir).await;

    let llm = Arc::new(FnLlm::new(|request| {
        let system = request.system_prompt().unwrap_or_default();
        if let Some(reply) = common_reply(system) {
            return Ok(reply);
        }
        if system == SOLVING_SYSTEM_PROMPT {
            return Ok(r#"{"thinking_chain": "Guess.", "answer": "7"}"#.to_string());
        }
        Ok(r#"{"score": 20, "passed": false, "feedback": "No."}"#.to_string())
    }));

    let state = QuestionPipeline::new(llm.clone(), Arc::new(db.clone()), PipelineConfig::default())
        .run(pool_seed())
        .await;

    assert_eq!(state.current_stage, Stage::Verified);
    assert_eq!(state.verifications.len(), 5);
    assert!(state.verifications.iter().all(|v| !v.passed));
    assert_eq!(llm.calls(VERIFICATION_SYSTEM_PROMPT), 10);
    assert_eq!(llm.calls(SOLVING_SYSTEM_PROMPT), 10);

    let stats = db.stats().await.unwrap();
    assert_eq!(stats.verified, 5);
    assert_eq!(stats.passed, 0);
}

#[tokio::test]
async fn test_stage_panic_yields_failed_state() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir).await;

    let llm = Arc::new(FnLlm::new(|request| {
        let system = request.system_prompt().unwrap_or_default();
        if system == TAGGING_SYSTEM_PROMPT {
            panic!("tagger blew up");
        }
        Ok(String::new())
    }));

    let state = QuestionPipeline::new(llm, Arc::new(db), PipelineConfig::default())
        .run(pool_seed())
        .await;

    assert_eq!(state.current_stage, Stage::Failed);
    assert_eq!(state.seed, pool_seed());
    assert_eq!(state.error.as_deref(), Some("pipeline fault: tagger blew up"));
    assert!(state.tagged.is_none());
}
