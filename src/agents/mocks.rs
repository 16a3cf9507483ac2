//! Test doubles for the stage agents.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::error::LlmError;
use crate::llm::{GenerationRequest, GenerationResponse, LlmProvider};
use crate::pipeline::types::{RecordId, TaggedQuestion};
use crate::storage::{DatabaseError, QuestionStore};

/// What a scripted model does for one call.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Text(String),
    Fail(String),
    Panic(String),
}

/// Model double that answers by stage, keyed on the request's system prompt.
///
/// Queued replies are consumed first; after that the stage's standing reply
/// is used. Every request is recorded.
#[derive(Default)]
pub(crate) struct ScriptedLlm {
    queued: Mutex<HashMap<String, VecDeque<Reply>>>,
    standing: Mutex<HashMap<String, Reply>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedLlm {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queues a one-shot reply for the stage with this system prompt.
    pub(crate) fn then(self, system: &str, reply: Reply) -> Self {
        self.queued
            .lock()
            .unwrap()
            .entry(system.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    /// Sets the reply used once the stage's queue is empty.
    pub(crate) fn always(self, system: &str, reply: Reply) -> Self {
        self.standing
            .lock()
            .unwrap()
            .insert(system.to_string(), reply);
        self
    }

    /// Number of requests sent with this system prompt.
    pub(crate) fn calls(&self, system: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.system_prompt() == Some(system))
            .count()
    }

    pub(crate) fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let system = request.system_prompt().unwrap_or_default().to_string();
        self.requests.lock().unwrap().push(request);

        let queued = self
            .queued
            .lock()
            .unwrap()
            .get_mut(&system)
            .and_then(|queue| queue.pop_front());
        let reply = queued
            .or_else(|| self.standing.lock().unwrap().get(&system).cloned())
            .unwrap_or_else(|| Reply::Fail("no scripted reply".to_string()));

        match reply {
            Reply::Text(text) => Ok(GenerationResponse::from_content("scripted", text)),
            Reply::Fail(message) => Err(LlmError::RequestFailed(message)),
            Reply::Panic(message) => panic!("{}", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StoredSolution {
    pub question_id: RecordId,
    pub thinking_chain: String,
    pub answer: String,
    pub score: Option<i64>,
    pub passed: Option<bool>,
    pub feedback: Option<String>,
    pub content_updates: usize,
}

#[derive(Default)]
struct MemoryTables {
    next_id: RecordId,
    seeds: Vec<(RecordId, TaggedQuestion)>,
    generated: Vec<(RecordId, RecordId, String)>,
    solutions: HashMap<RecordId, StoredSolution>,
}

/// In-memory store with an optional failing operation.
#[derive(Default)]
pub(crate) struct MemoryStore {
    tables: Mutex<MemoryTables>,
    fail_on: Option<&'static str>,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A store whose named operation always fails.
    pub(crate) fn failing(operation: &'static str) -> Self {
        Self {
            tables: Mutex::default(),
            fail_on: Some(operation),
        }
    }

    pub(crate) fn seed_count(&self) -> usize {
        self.tables.lock().unwrap().seeds.len()
    }

    pub(crate) fn generated_count(&self) -> usize {
        self.tables.lock().unwrap().generated.len()
    }

    pub(crate) fn solution(&self, id: RecordId) -> Option<StoredSolution> {
        self.tables.lock().unwrap().solutions.get(&id).cloned()
    }

    pub(crate) fn solution_count(&self) -> usize {
        self.tables.lock().unwrap().solutions.len()
    }

    fn check(&self, operation: &str) -> Result<(), DatabaseError> {
        if self.fail_on == Some(operation) {
            return Err(DatabaseError::ConnectionFailed(format!(
                "{} unavailable",
                operation
            )));
        }
        Ok(())
    }

    fn next_id(tables: &mut MemoryTables) -> RecordId {
        tables.next_id += 1;
        tables.next_id
    }
}

#[async_trait]
impl QuestionStore for MemoryStore {
    async fn insert_seed(&self, seed: &TaggedQuestion) -> Result<RecordId, DatabaseError> {
        self.check("insert_seed")?;
        let mut tables = self.tables.lock().unwrap();
        let id = Self::next_id(&mut tables);
        tables.seeds.push((id, seed.clone()));
        Ok(id)
    }

    async fn insert_generated(
        &self,
        parent_id: RecordId,
        question: &str,
        _domain_tags: &[String],
        _question_type: &str,
    ) -> Result<RecordId, DatabaseError> {
        self.check("insert_generated")?;
        let mut tables = self.tables.lock().unwrap();
        let id = Self::next_id(&mut tables);
        tables.generated.push((id, parent_id, question.to_string()));
        Ok(id)
    }

    async fn insert_solution(
        &self,
        question_id: RecordId,
        thinking_chain: &str,
        answer: &str,
    ) -> Result<RecordId, DatabaseError> {
        self.check("insert_solution")?;
        let mut tables = self.tables.lock().unwrap();
        let id = Self::next_id(&mut tables);
        tables.solutions.insert(
            id,
            StoredSolution {
                question_id,
                thinking_chain: thinking_chain.to_string(),
                answer: answer.to_string(),
                score: None,
                passed: None,
                feedback: None,
                content_updates: 0,
            },
        );
        Ok(id)
    }

    async fn update_solution_content(
        &self,
        solution_id: RecordId,
        thinking_chain: &str,
        answer: &str,
    ) -> Result<(), DatabaseError> {
        self.check("update_solution_content")?;
        let mut tables = self.tables.lock().unwrap();
        let solution = tables
            .solutions
            .get_mut(&solution_id)
            .ok_or_else(|| DatabaseError::NotFound(format!("solution {}", solution_id)))?;
        solution.thinking_chain = thinking_chain.to_string();
        solution.answer = answer.to_string();
        solution.score = None;
        solution.passed = None;
        solution.feedback = None;
        solution.content_updates += 1;
        Ok(())
    }

    async fn update_solution_verification(
        &self,
        solution_id: RecordId,
        score: i64,
        passed: bool,
        feedback: &str,
    ) -> Result<(), DatabaseError> {
        self.check("update_solution_verification")?;
        let mut tables = self.tables.lock().unwrap();
        let solution = tables
            .solutions
            .get_mut(&solution_id)
            .ok_or_else(|| DatabaseError::NotFound(format!("solution {}", solution_id)))?;
        solution.score = Some(score);
        solution.passed = Some(passed);
        solution.feedback = Some(feedback.to_string());
        Ok(())
    }
}

/// Tagging reply for a math computation question.
pub(crate) fn tagging_reply() -> Reply {
    Reply::Text(r#"{"tags": ["math"], "question_type": "computation"}"#.to_string())
}

/// Generation reply with `n` plain questions.
pub(crate) fn generation_reply(n: usize) -> Reply {
    let questions: Vec<String> = (1..=n)
        .map(|i| format!("\"How many apples are left if you start with {} and eat one?\"", i + 1))
        .collect();
    Reply::Text(format!("{{\"questions\": [{}]}}", questions.join(", ")))
}

pub(crate) fn solve_reply(answer: &str) -> Reply {
    Reply::Text(format!(
        "{{\"thinking_chain\": \"Subtract one.\", \"answer\": \"{}\"}}",
        answer
    ))
}

pub(crate) fn verify_reply(score: i64, passed: bool) -> Reply {
    Reply::Text(format!(
        "{{\"score\": {}, \"passed\": {}, \"feedback\": \"graded\", \"suggestions\": []}}",
        score, passed
    ))
}
