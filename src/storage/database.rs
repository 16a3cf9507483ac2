//! SQLite database client for persistent storage.
//!
//! Stores seed questions, generated questions and their solutions, and
//! answers the read-side queries behind the record viewer.

use async_trait::async_trait;
use serde::Serialize;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

use super::migrations::{MigrationError, MigrationRunner};
use super::store::QuestionStore;
use crate::pipeline::types::{RecordId, TaggedQuestion};

/// Errors that can occur during database operations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Connection to the database failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(#[from] sqlx::Error),

    /// Record not found.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Migration error.
    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),
}

/// Row counts and tag distribution.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DatabaseStats {
    pub original: i64,
    pub generated: i64,
    pub solutions: i64,
    /// Solutions that carry a verification score.
    pub verified: i64,
    pub passed: i64,
    /// Seed tag frequencies, most frequent first.
    pub tag_counts: Vec<TagCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagCount {
    pub tag: String,
    pub count: i64,
}

/// A solution joined with the text of its question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolutionRow {
    pub solution_id: RecordId,
    pub question_id: RecordId,
    pub question: String,
    pub thinking_chain: String,
    pub answer: String,
    pub verification_score: Option<i64>,
    pub verification_passed: Option<bool>,
    pub verification_feedback: Option<String>,
    pub created_at: Option<String>,
}

/// A stored generated question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredQuestion {
    pub id: RecordId,
    pub question: String,
    pub domain_tags: Vec<String>,
    pub question_type: Option<String>,
    pub created_at: Option<String>,
}

/// A stored seed question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredSeed {
    pub id: RecordId,
    pub question: String,
    pub thinking_chain: String,
    pub answer: String,
    pub domain_tags: Vec<String>,
    pub question_type: Option<String>,
    pub created_at: Option<String>,
}

/// A solution with the generated question and seed it descends from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolutionContext {
    pub solution: SolutionRow,
    pub generated_question: StoredQuestion,
    pub original_question: StoredSeed,
}

/// SQLite database client.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connects to the database and returns a new client.
    ///
    /// Accepts `sqlite://path`, `sqlite::memory:` or a bare file path. The
    /// file is created if missing.
    pub async fn connect(database_url: &str) -> Result<Self, DatabaseError> {
        let url = if database_url.starts_with("sqlite:") {
            database_url.to_string()
        } else {
            format!("sqlite://{}", database_url)
        };
        let in_memory = url.contains(":memory:");

        let mut opts = SqliteConnectOptions::from_str(&url)
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?
            .create_if_missing(true)
            .foreign_keys(true);
        if !in_memory {
            opts = opts
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal);
        }

        // Every in-memory connection is its own database.
        let max_connections = if in_memory { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Connects and brings the schema up to date.
    pub async fn open(database_url: &str) -> Result<Self, DatabaseError> {
        let db = Self::connect(database_url).await?;
        db.run_migrations().await?;
        tracing::info!(url = database_url, "Question database opened");
        Ok(db)
    }

    /// Runs database migrations.
    pub async fn run_migrations(&self) -> Result<(), DatabaseError> {
        MigrationRunner::new(self.pool.clone())
            .run_migrations()
            .await?;
        Ok(())
    }

    // =========================================================================
    // Read-side queries
    // =========================================================================

    /// Row counts plus the frequency of each seed tag.
    pub async fn stats(&self) -> Result<DatabaseStats, DatabaseError> {
        let original = self.count("SELECT COUNT(*) FROM original_questions").await?;
        let generated = self.count("SELECT COUNT(*) FROM generated_questions").await?;
        let solutions = self.count("SELECT COUNT(*) FROM question_solutions").await?;
        let verified = self
            .count("SELECT COUNT(*) FROM question_solutions WHERE verification_score IS NOT NULL")
            .await?;
        let passed = self
            .count("SELECT COUNT(*) FROM question_solutions WHERE verification_passed = 1")
            .await?;

        let tag_rows: Vec<String> = sqlx::query_scalar("SELECT domain_tags FROM original_questions")
            .fetch_all(&self.pool)
            .await?;

        let mut counts: HashMap<String, i64> = HashMap::new();
        for raw in &tag_rows {
            for tag in decode_tags(raw)? {
                *counts.entry(tag).or_insert(0) += 1;
            }
        }
        let mut tag_counts: Vec<TagCount> = counts
            .into_iter()
            .map(|(tag, count)| TagCount { tag, count })
            .collect();
        tag_counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));

        Ok(DatabaseStats {
            original,
            generated,
            solutions,
            verified,
            passed,
            tag_counts,
        })
    }

    /// Solutions joined with their question text, newest first.
    ///
    /// `seed_id` restricts the list to one seed's descendants.
    pub async fn list_solutions(
        &self,
        seed_id: Option<RecordId>,
        limit: Option<u32>,
    ) -> Result<Vec<SolutionRow>, DatabaseError> {
        // LIMIT -1 means no limit in SQLite
        let limit = limit.map(i64::from).unwrap_or(-1);

        let rows = sqlx::query(
            r#"
            SELECT qs.id AS solution_id, qs.question_id, gq.question, qs.thinking_chain,
                   qs.answer, qs.verification_score, qs.verification_passed,
                   qs.verification_feedback, qs.created_at
            FROM question_solutions qs
            JOIN generated_questions gq ON qs.question_id = gq.id
            WHERE ?1 IS NULL OR gq.original_question_id = ?1
            ORDER BY qs.created_at DESC, qs.id DESC
            LIMIT ?2
            "#,
        )
        .bind(seed_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(solution_row).collect())
    }

    /// A solution with its generated question and seed, if the id exists.
    pub async fn solution_context(
        &self,
        solution_id: RecordId,
    ) -> Result<Option<SolutionContext>, DatabaseError> {
        let row = sqlx::query(
            r#"
            SELECT qs.id AS solution_id, qs.question_id, gq.question, qs.thinking_chain,
                   qs.answer, qs.verification_score, qs.verification_passed,
                   qs.verification_feedback, qs.created_at,
                   gq.domain_tags AS generated_tags, gq.question_type AS generated_type,
                   gq.created_at AS generated_created_at,
                   oq.id AS original_id, oq.question AS original_question,
                   oq.thinking_chain AS original_thinking, oq.answer AS original_answer,
                   oq.domain_tags AS original_tags, oq.question_type AS original_type,
                   oq.created_at AS original_created_at
            FROM question_solutions qs
            JOIN generated_questions gq ON qs.question_id = gq.id
            JOIN original_questions oq ON gq.original_question_id = oq.id
            WHERE qs.id = ?1
            "#,
        )
        .bind(solution_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let solution = solution_row(&row);
        let generated_question = StoredQuestion {
            id: solution.question_id,
            question: solution.question.clone(),
            domain_tags: decode_tags(&row.get::<String, _>("generated_tags"))?,
            question_type: row.get("generated_type"),
            created_at: row.get("generated_created_at"),
        };
        let original_question = StoredSeed {
            id: row.get("original_id"),
            question: row.get("original_question"),
            thinking_chain: row.get("original_thinking"),
            answer: row.get("original_answer"),
            domain_tags: decode_tags(&row.get::<String, _>("original_tags"))?,
            question_type: row.get("original_type"),
            created_at: row.get("original_created_at"),
        };

        Ok(Some(SolutionContext {
            solution,
            generated_question,
            original_question,
        }))
    }

    async fn count(&self, sql: &str) -> Result<i64, DatabaseError> {
        let count: i64 = sqlx::query_scalar(sql).fetch_one(&self.pool).await?;
        Ok(count)
    }
}

fn solution_row(row: &SqliteRow) -> SolutionRow {
    SolutionRow {
        solution_id: row.get("solution_id"),
        question_id: row.get("question_id"),
        question: row.get("question"),
        thinking_chain: row.get("thinking_chain"),
        answer: row.get("answer"),
        verification_score: row.get("verification_score"),
        verification_passed: row
            .get::<Option<i64>, _>("verification_passed")
            .map(|v| v != 0),
        verification_feedback: row.get("verification_feedback"),
        created_at: row.get("created_at"),
    }
}

fn decode_tags(raw: &str) -> Result<Vec<String>, DatabaseError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(raw)?)
}

#[async_trait]
impl QuestionStore for Database {
    async fn insert_seed(&self, seed: &TaggedQuestion) -> Result<RecordId, DatabaseError> {
        let tags = serde_json::to_string(&seed.domain_tags)?;
        let result = sqlx::query(
            r#"
            INSERT INTO original_questions
                (question, thinking_chain, answer, domain_tags, question_type)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&seed.question)
        .bind(&seed.thinking_chain)
        .bind(&seed.answer)
        .bind(&tags)
        .bind(&seed.question_type)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn insert_generated(
        &self,
        parent_id: RecordId,
        question: &str,
        domain_tags: &[String],
        question_type: &str,
    ) -> Result<RecordId, DatabaseError> {
        let tags = serde_json::to_string(domain_tags)?;
        let result = sqlx::query(
            r#"
            INSERT INTO generated_questions
                (original_question_id, question, domain_tags, question_type)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(parent_id)
        .bind(question)
        .bind(&tags)
        .bind(question_type)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn insert_solution(
        &self,
        question_id: RecordId,
        thinking_chain: &str,
        answer: &str,
    ) -> Result<RecordId, DatabaseError> {
        let result = sqlx::query(
            "INSERT INTO question_solutions (question_id, thinking_chain, answer) VALUES (?1, ?2, ?3)",
        )
        .bind(question_id)
        .bind(thinking_chain)
        .bind(answer)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn update_solution_content(
        &self,
        solution_id: RecordId,
        thinking_chain: &str,
        answer: &str,
    ) -> Result<(), DatabaseError> {
        // A new answer invalidates the previous verdict.
        let result = sqlx::query(
            r#"
            UPDATE question_solutions
            SET thinking_chain = ?1, answer = ?2,
                verification_score = NULL, verification_passed = NULL,
                verification_feedback = NULL, updated_at = datetime('now')
            WHERE id = ?3
            "#,
        )
        .bind(thinking_chain)
        .bind(answer)
        .bind(solution_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("solution {}", solution_id)));
        }
        Ok(())
    }

    async fn update_solution_verification(
        &self,
        solution_id: RecordId,
        score: i64,
        passed: bool,
        feedback: &str,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE question_solutions
            SET verification_score = ?1, verification_passed = ?2,
                verification_feedback = ?3, updated_at = datetime('now')
            WHERE id = ?4
            "#,
        )
        .bind(score)
        .bind(passed as i64)
        .bind(feedback)
        .bind(solution_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("solution {}", solution_id)));
        }
        Ok(())
    }
}
