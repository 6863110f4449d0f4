//! Lifecycle of a single review, keyed by pull-request id.
//!
//! ```text
//! Absent --start--> InProgress --advance--> InProgress
//!                              --advance (exhausted)--> Completed
//! InProgress | Completed --reset--> Absent
//! ```
//!
//! The machine itself is stateless; everything lives in the [`ReviewStore`],
//! so it can be rebuilt freely around a shared store.
//!
//! `start` checks `is_in_progress` and then writes. The check is not
//! linearizable: two concurrent starts for the same id can both pass it, and
//! the later write replaces the earlier session. The store keeps each write
//! atomic, so the result is always one complete session, never a mix of two.

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::db::{ReviewStore, StoreError};
use crate::models::NextFile;

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("a review is already in progress for PR {0}")]
    AlreadyInProgress(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewState {
    Absent,
    InProgress { current_index: u32, total_files: u32 },
    Completed { total_files: u32 },
}

/// Result of one `advance`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance<T> {
    Item(T),
    /// Nothing left to hand out; the session (if any) is now completed.
    Complete,
}

#[derive(Clone)]
pub struct ReviewMachine {
    store: Arc<dyn ReviewStore>,
}

impl ReviewMachine {
    pub fn new(store: Arc<dyn ReviewStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ReviewStore> {
        &self.store
    }

    pub async fn state(&self, pr_id: &str) -> Result<ReviewState, ReviewError> {
        let state = match self.store.get_session(pr_id).await? {
            None => ReviewState::Absent,
            Some(session) if session.is_in_progress() => ReviewState::InProgress {
                current_index: session.current_index,
                total_files: session.total_files,
            },
            Some(session) => ReviewState::Completed {
                total_files: session.total_files,
            },
        };
        Ok(state)
    }

    /// Begins a review of `files` in the given order. The order is fixed from
    /// here on. A completed review may be started again.
    pub async fn start(&self, pr_id: &str, files: &[String]) -> Result<(), ReviewError> {
        if self.store.is_in_progress(pr_id).await? {
            return Err(ReviewError::AlreadyInProgress(pr_id.to_owned()));
        }

        self.store.start_review(pr_id, files).await?;
        info!("Started review of PR {} with {} files", pr_id, files.len());
        Ok(())
    }

    /// Hands out the file at the cursor.
    ///
    /// `load` turns the file into whatever the caller returns (typically by
    /// fetching its diff). The file is marked reviewed only after `load`
    /// succeeds, so a failed load leaves the cursor where it was and the call
    /// can simply be repeated.
    ///
    /// `load` suspends between reading the cursor and marking the file, so an
    /// overlapping call may hand the same file out first. The mark then fails
    /// with `NotAtCursor` and this call moves on to the file now at the
    /// cursor; every file is handed out exactly once.
    ///
    /// With no file left (or no session at all) the session is completed and
    /// `Advance::Complete` is returned.
    pub async fn advance<T, E, F, Fut>(&self, pr_id: &str, mut load: F) -> Result<Advance<T>, E>
    where
        F: FnMut(NextFile) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<ReviewError>,
    {
        loop {
            let next = self
                .store
                .get_next_file(pr_id)
                .await
                .map_err(ReviewError::from)?;

            let Some(next) = next else {
                self.complete(pr_id).await?;
                return Ok(Advance::Complete);
            };

            let file_path = next.file_path.clone();
            let position = (next.current, next.total);
            let item = load(next).await?;

            match self.store.mark_reviewed(pr_id, &file_path).await {
                Ok(()) => {
                    debug!(
                        "PR {}: handed out {} ({}/{})",
                        pr_id, file_path, position.0, position.1
                    );
                    return Ok(Advance::Item(item));
                }
                Err(StoreError::NotAtCursor { .. }) => {
                    debug!(
                        "PR {}: {} was handed out concurrently, moving on",
                        pr_id, file_path
                    );
                }
                Err(err) => return Err(ReviewError::from(err).into()),
            }
        }
    }

    /// `advance` without any loading step.
    pub async fn advance_file(&self, pr_id: &str) -> Result<Advance<NextFile>, ReviewError> {
        self.advance(pr_id, |next| async move { Ok::<_, ReviewError>(next) })
            .await
    }

    pub async fn complete(&self, pr_id: &str) -> Result<(), ReviewError> {
        self.store.complete_review(pr_id).await?;
        info!("Review of PR {} completed", pr_id);
        Ok(())
    }

    /// Forgets everything about `pr_id`. Succeeds whether or not a review existed.
    pub async fn reset(&self, pr_id: &str) -> Result<(), ReviewError> {
        self.store.reset_review(pr_id).await?;
        info!("Reset review of PR {}", pr_id);
        Ok(())
    }
}
