//! SQLite persistent storage.
//!
//! # Overview
//!
//! - **Database**: SQLite client holding seed questions, generated questions
//!   and solutions, plus the read-side queries behind the record viewer
//! - **QuestionStore**: the write seam the pipeline stages persist through
//! - **Migrations**: schema creation and in-place upgrades of older databases
//!
//! # Usage
//!
//! ```rust,ignore
//! use question_forge::storage::{Database, QuestionStore};
//!
//! let db = Database::open("sqlite://questions.db").await?;
//! let seed_id = db.insert_seed(&tagged).await?;
//! let stats = db.stats().await?;
//! let latest = db.list_solutions(Some(seed_id), Some(10)).await?;
//! ```

pub mod database;
pub mod migrations;
pub mod schema;
pub mod store;

pub use database::{
    Database, DatabaseError, DatabaseStats, SolutionContext, SolutionRow, StoredQuestion,
    StoredSeed, TagCount,
};
pub use migrations::{MigrationError, MigrationRunner};
pub use store::QuestionStore;
