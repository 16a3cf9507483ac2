//! Database schema constants.
//!
//! This module contains the SQL schema definitions for the SQLite storage
//! backend. Tag lists are stored as JSON text.

/// SQL schema for creating the original_questions table.
pub const CREATE_ORIGINAL_QUESTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS original_questions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    question TEXT NOT NULL,
    thinking_chain TEXT NOT NULL,
    answer TEXT NOT NULL,
    domain_tags TEXT NOT NULL DEFAULT '[]',
    question_type TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
)
"#;

/// SQL schema for creating the generated_questions table.
pub const CREATE_GENERATED_QUESTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS generated_questions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    original_question_id INTEGER NOT NULL REFERENCES original_questions(id),
    question TEXT NOT NULL,
    domain_tags TEXT NOT NULL DEFAULT '[]',
    question_type TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
)
"#;

/// SQL schema for creating the question_solutions table.
pub const CREATE_QUESTION_SOLUTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS question_solutions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    question_id INTEGER NOT NULL REFERENCES generated_questions(id),
    thinking_chain TEXT NOT NULL,
    answer TEXT NOT NULL,
    verification_score INTEGER,
    verification_passed INTEGER,
    verification_feedback TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
)
"#;

/// SQL for creating the foreign key indexes.
pub const CREATE_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_generated_questions_original ON generated_questions(original_question_id);
CREATE INDEX IF NOT EXISTS idx_question_solutions_question ON question_solutions(question_id);
"#;

/// Returns all schema statements in the order they should be executed.
pub fn all_schema_statements() -> Vec<&'static str> {
    vec![
        CREATE_ORIGINAL_QUESTIONS_TABLE,
        CREATE_GENERATED_QUESTIONS_TABLE,
        CREATE_QUESTION_SOLUTIONS_TABLE,
        CREATE_INDEXES,
    ]
}

/// Columns added after the first release, as `(table, column, type)`.
///
/// Databases created before these existed are upgraded in place.
pub const LEGACY_COLUMNS: &[(&str, &str, &str)] = &[
    (tables::ORIGINAL_QUESTIONS, "question_type", "TEXT"),
    (tables::GENERATED_QUESTIONS, "question_type", "TEXT"),
    (tables::QUESTION_SOLUTIONS, "verification_score", "INTEGER"),
    (tables::QUESTION_SOLUTIONS, "verification_passed", "INTEGER"),
    (tables::QUESTION_SOLUTIONS, "verification_feedback", "TEXT"),
    (tables::QUESTION_SOLUTIONS, "updated_at", "TEXT"),
];

/// Table names in the schema.
pub mod tables {
    /// Seed questions table name.
    pub const ORIGINAL_QUESTIONS: &str = "original_questions";
    /// Generated questions table name.
    pub const GENERATED_QUESTIONS: &str = "generated_questions";
    /// Solutions table name.
    pub const QUESTION_SOLUTIONS: &str = "question_solutions";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_schema_statements_order() {
        let statements = all_schema_statements();
        assert_eq!(statements.len(), 4);
        // Parents before children
        assert!(statements[0].contains("original_questions"));
        assert!(statements[1].contains("REFERENCES original_questions"));
        assert!(statements[2].contains("REFERENCES generated_questions"));
        assert!(statements[3].contains("CREATE INDEX"));
    }

    #[test]
    fn test_legacy_columns_exist_in_current_schema() {
        for (table, column, _) in LEGACY_COLUMNS {
            let ddl = all_schema_statements()
                .into_iter()
                .find(|s| s.contains(&format!("CREATE TABLE IF NOT EXISTS {} ", table)))
                .unwrap();
            assert!(ddl.contains(column), "{} missing from {}", column, table);
        }
    }
}
