//! Persistence for review progress.
//!
//! `ReviewStore` is the contract every backend satisfies. Two backends ship:
//! [`SqliteStore`] survives restarts, [`MemoryStore`] keeps everything in the
//! process. Both apply `start_review`, `mark_reviewed` and `reset_review` as
//! all-or-nothing units, so a failed call leaves the previous state untouched.

mod memory;
pub mod schema;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{NextFile, ReviewFile, ReviewSession};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("review store is not initialized")]
    NotInitialized,
    #[error("no review session for PR {0}")]
    SessionNotFound(String),
    #[error("file {path} is not part of the review for PR {pr_id}")]
    FileNotFound { pr_id: String, path: String },
    #[error("file {path} is not the next file to review for PR {pr_id}")]
    NotAtCursor { pr_id: String, path: String },
    #[error("file {path} appears more than once in the review for PR {pr_id}")]
    DuplicateFile { pr_id: String, path: String },
    #[error("invalid review status in store: {0}")]
    InvalidStatus(String),
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to prepare database location: {0}")]
    Io(#[from] std::io::Error),
    #[error("store task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait ReviewStore: Send + Sync {
    /// Opens underlying resources and applies the schema. Idempotent.
    async fn initialize(&self) -> Result<()>;

    /// True iff a session exists for `pr_id` and is still in progress.
    async fn is_in_progress(&self, pr_id: &str) -> Result<bool>;

    /// Replaces the session and its whole file list with a fresh, unreviewed
    /// review of `files`, in the given order.
    async fn start_review(&self, pr_id: &str, files: &[String]) -> Result<()>;

    /// The unreviewed file at the cursor of an in-progress session, if any.
    async fn get_next_file(&self, pr_id: &str) -> Result<Option<NextFile>>;

    /// Flags `file_path` reviewed and moves the cursor forward by one.
    ///
    /// Only the unreviewed file at the cursor of an in-progress session can be
    /// marked; any other known file fails with `NotAtCursor` and changes nothing.
    async fn mark_reviewed(&self, pr_id: &str, file_path: &str) -> Result<()>;

    /// Marks the session completed. No-op when there is no session.
    async fn complete_review(&self, pr_id: &str) -> Result<()>;

    /// Deletes the session and all of its files. No-op when there is no session.
    async fn reset_review(&self, pr_id: &str) -> Result<()>;

    async fn get_session(&self, pr_id: &str) -> Result<Option<ReviewSession>>;

    /// Files of the session ordered by `review_order`.
    async fn list_files(&self, pr_id: &str) -> Result<Vec<ReviewFile>>;

    /// Releases underlying resources. Later calls fail with `NotInitialized`
    /// until `initialize` is called again.
    async fn close(&self) -> Result<()>;
}

fn duplicate_path(files: &[String]) -> Option<&str> {
    let mut seen = std::collections::HashSet::with_capacity(files.len());
    files
        .iter()
        .find(|path| !seen.insert(path.as_str()))
        .map(String::as_str)
}
