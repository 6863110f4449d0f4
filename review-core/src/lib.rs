//! Core library for the PR reviewer.
//!
//! This crate owns review progress: the models, the persistence contract with
//! its SQLite and in-memory backends, and the state machine that walks a pull
//! request file by file. It knows nothing about the code-hosting API or the
//! transport the operations are called over.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use review_core::{Advance, ReviewMachine, ReviewStore, SqliteStore};
//!
//! # async fn run() -> Result<(), review_core::ReviewError> {
//! let store = Arc::new(SqliteStore::new("reviews.db"));
//! store.initialize().await?;
//!
//! let machine = ReviewMachine::new(store.clone());
//! machine.start("42", &["src/lib.rs".to_string()]).await?;
//! while let Advance::Item(next) = machine.advance_file("42").await? {
//!     println!("{} ({}/{})", next.file_path, next.current, next.total);
//! }
//! store.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod db;
pub mod machine;
pub mod models;

// Re-export commonly used types at crate root
pub use db::{MemoryStore, ReviewStore, SqliteStore, StoreError};
pub use machine::{Advance, ReviewError, ReviewMachine, ReviewState};
