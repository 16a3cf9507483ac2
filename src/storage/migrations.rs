//! Database migration helpers.
//!
//! Migrations are tracked by name in a `_migrations` table so running them
//! again is a no-op.

use sqlx::{Row, SqlitePool};
use thiserror::Error;
use tracing::info;

use super::schema;

/// Name of the step that upgrades databases created before the current schema.
const LEGACY_COLUMNS_MIGRATION: &str = "legacy_columns_v2";

/// Errors that can occur during migration operations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Database query failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration script failed to execute.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

/// Migration runner for applying schema changes.
pub struct MigrationRunner {
    pool: SqlitePool,
}

impl MigrationRunner {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Runs all pending migrations.
    ///
    /// Idempotent: applied steps are skipped and every DDL statement uses
    /// `IF NOT EXISTS`.
    pub async fn run_migrations(&self) -> Result<(), MigrationError> {
        self.ensure_migrations_table().await?;

        for (idx, statement) in schema::all_schema_statements().iter().enumerate() {
            let migration_name = format!("schema_v1_part_{}", idx);

            if !self.is_migration_applied(&migration_name).await? {
                self.apply_migration(&migration_name, statement).await?;
            }
        }

        if !self.is_migration_applied(LEGACY_COLUMNS_MIGRATION).await? {
            self.upgrade_legacy_columns().await?;
        }

        Ok(())
    }

    async fn ensure_migrations_table(&self) -> Result<(), MigrationError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn is_migration_applied(&self, name: &str) -> Result<bool, MigrationError> {
        let result: Option<(i64,)> = sqlx::query_as("SELECT id FROM _migrations WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(result.is_some())
    }

    async fn apply_migration(&self, name: &str, sql: &str) -> Result<(), MigrationError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| MigrationError::MigrationFailed(format!("{}: {}", name, e)))?;

        sqlx::query("INSERT INTO _migrations (name) VALUES (?1)")
            .bind(name)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }

    /// Adds columns introduced after the first schema to tables that lack them.
    async fn upgrade_legacy_columns(&self) -> Result<(), MigrationError> {
        let mut tx = self.pool.begin().await?;

        for (table, column, column_type) in schema::LEGACY_COLUMNS {
            let existing: Vec<String> = sqlx::query(&format!("PRAGMA table_info({})", table))
                .fetch_all(&mut *tx)
                .await?
                .iter()
                .map(|row| row.get::<String, _>("name"))
                .collect();

            if existing.iter().any(|c| c == column) {
                continue;
            }

            sqlx::query(&format!(
                "ALTER TABLE {} ADD COLUMN {} {}",
                table, column, column_type
            ))
            .execute(&mut *tx)
            .await
            .map_err(|e| MigrationError::MigrationFailed(format!("{}.{}: {}", table, column, e)))?;

            info!(table = *table, column = *column, "Added missing column");
        }

        sqlx::query("INSERT INTO _migrations (name) VALUES (?1)")
            .bind(LEGACY_COLUMNS_MIGRATION)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }

    /// Returns the names of applied migrations in application order.
    pub async fn list_applied_migrations(&self) -> Result<Vec<String>, MigrationError> {
        self.ensure_migrations_table().await?;

        let names = sqlx::query_scalar("SELECT name FROM _migrations ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    async fn columns(pool: &SqlitePool, table: &str) -> Vec<String> {
        sqlx::query(&format!("PRAGMA table_info({})", table))
            .fetch_all(pool)
            .await
            .unwrap()
            .iter()
            .map(|row| row.get::<String, _>("name"))
            .collect()
    }

    #[test]
    fn test_migration_error_display() {
        let err = MigrationError::MigrationFailed("test error".to_string());
        assert!(err.to_string().contains("test error"));
    }

    #[tokio::test]
    async fn test_run_migrations_is_idempotent() {
        let pool = memory_pool().await;
        let runner = MigrationRunner::new(pool.clone());

        runner.run_migrations().await.unwrap();
        let first = runner.list_applied_migrations().await.unwrap();
        runner.run_migrations().await.unwrap();
        let second = runner.list_applied_migrations().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), schema::all_schema_statements().len() + 1);
        assert_eq!(first.last().map(String::as_str), Some(LEGACY_COLUMNS_MIGRATION));
    }

    #[tokio::test]
    async fn test_legacy_database_is_upgraded() {
        let pool = memory_pool().await;
        sqlx::query(
            r#"
            CREATE TABLE original_questions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                question TEXT NOT NULL,
                thinking_chain TEXT NOT NULL,
                answer TEXT NOT NULL,
                domain_tags TEXT NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            );
            CREATE TABLE question_solutions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                question_id INTEGER NOT NULL,
                thinking_chain TEXT NOT NULL,
                answer TEXT NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            );
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        MigrationRunner::new(pool.clone())
            .run_migrations()
            .await
            .unwrap();

        let original = columns(&pool, "original_questions").await;
        assert!(original.contains(&"question_type".to_string()));

        let solutions = columns(&pool, "question_solutions").await;
        for column in ["verification_score", "verification_passed", "verification_feedback", "updated_at"] {
            assert!(solutions.contains(&column.to_string()), "missing {}", column);
        }
    }
}
