//! Persistence seam used by the pipeline stages.

use async_trait::async_trait;

use super::database::DatabaseError;
use crate::pipeline::types::{RecordId, TaggedQuestion};

/// Write operations the pipeline performs while a run progresses.
///
/// [`super::Database`] implements this over SQLite; tests use in-memory
/// doubles.
#[async_trait]
pub trait QuestionStore: Send + Sync {
    /// Persists a labelled seed question and returns its id.
    async fn insert_seed(&self, seed: &TaggedQuestion) -> Result<RecordId, DatabaseError>;

    /// Persists one generated question under its seed.
    async fn insert_generated(
        &self,
        parent_id: RecordId,
        question: &str,
        domain_tags: &[String],
        question_type: &str,
    ) -> Result<RecordId, DatabaseError>;

    /// Persists a fresh, unverified solution.
    async fn insert_solution(
        &self,
        question_id: RecordId,
        thinking_chain: &str,
        answer: &str,
    ) -> Result<RecordId, DatabaseError>;

    /// Overwrites a solution's content after regeneration.
    async fn update_solution_content(
        &self,
        solution_id: RecordId,
        thinking_chain: &str,
        answer: &str,
    ) -> Result<(), DatabaseError>;

    /// Records a grading verdict on a solution.
    async fn update_solution_verification(
        &self,
        solution_id: RecordId,
        score: i64,
        passed: bool,
        feedback: &str,
    ) -> Result<(), DatabaseError>;
}
