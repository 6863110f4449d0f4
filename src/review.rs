//! Review orchestration: ties the review state machine to the code host.

use std::sync::Arc;

use review_core::{Advance, ReviewError, ReviewMachine, ReviewStore, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::bitbucket::BitbucketError;
use crate::filter::ExclusionFilter;
use crate::source::ChangeSource;

pub const COMPLETION_PROMPT: &str = "PR review completed!";

/// One file handed to the reviewer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileDiff {
    pub file_path: String,
    pub diff: String,
    pub current: u32,
    pub total: u32,
    pub custom_prompt: String,
}

impl FileDiff {
    /// Returned once every file has been handed out, or when there is nothing to review.
    pub fn completed() -> Self {
        Self {
            file_path: String::new(),
            diff: String::new(),
            current: 0,
            total: 0,
            custom_prompt: COMPLETION_PROMPT.to_string(),
        }
    }

    pub fn is_completion(&self) -> bool {
        self.file_path.is_empty() && self.custom_prompt == COMPLETION_PROMPT
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("a review is already in progress for PR {0}")]
    AlreadyInProgress(String),
    #[error("no files to review for PR {0} after applying exclude patterns")]
    NoFilesToReview(String),
    #[error(transparent)]
    Upstream(#[from] BitbucketError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ReviewError> for ServiceError {
    fn from(err: ReviewError) -> Self {
        match err {
            ReviewError::AlreadyInProgress(pr_id) => Self::AlreadyInProgress(pr_id),
            ReviewError::Store(err) => Self::Store(err),
        }
    }
}

/// Stateless; cheap to clone and rebuild around a shared store.
#[derive(Clone)]
pub struct ReviewService {
    machine: ReviewMachine,
    source: Arc<dyn ChangeSource>,
    filter: ExclusionFilter,
    custom_prompt: String,
}

impl ReviewService {
    pub fn new(
        store: Arc<dyn ReviewStore>,
        source: Arc<dyn ChangeSource>,
        filter: ExclusionFilter,
        custom_prompt: impl Into<String>,
    ) -> Self {
        Self {
            machine: ReviewMachine::new(store),
            source,
            filter,
            custom_prompt: custom_prompt.into(),
        }
    }

    pub fn machine(&self) -> &ReviewMachine {
        &self.machine
    }

    /// Starts a review and returns the first file.
    ///
    /// The changed-file list is fetched and filtered once, here; its order
    /// becomes the review order.
    pub async fn start_review(&self, pr_id: &str) -> Result<FileDiff, ServiceError> {
        if self.machine.store().is_in_progress(pr_id).await? {
            return Err(ServiceError::AlreadyInProgress(pr_id.to_owned()));
        }

        let changed = self.source.list_changed_files(pr_id).await?;
        let listed = changed.len();
        let files: Vec<String> = self
            .filter
            .apply(changed)
            .into_iter()
            .map(|file| file.path)
            .collect();

        if files.is_empty() {
            warn!(
                "PR {}: all {} changed files matched exclude patterns",
                pr_id, listed
            );
            return Err(ServiceError::NoFilesToReview(pr_id.to_owned()));
        }

        info!(
            "PR {}: reviewing {} of {} changed files",
            pr_id,
            files.len(),
            listed
        );
        self.machine.start(pr_id, &files).await?;
        self.next_review_item(pr_id).await
    }

    /// Hands out the next file with its diff, or the completion result once
    /// the review is exhausted. The diff is fetched only for this file.
    pub async fn next_review_item(&self, pr_id: &str) -> Result<FileDiff, ServiceError> {
        let source = &self.source;
        let custom_prompt = &self.custom_prompt;

        let advance = self
            .machine
            .advance(pr_id, |next| async move {
                let diff = source.fetch_file_diff(pr_id, &next.file_path).await?;
                Ok::<_, ServiceError>(FileDiff {
                    file_path: next.file_path,
                    diff,
                    current: next.current,
                    total: next.total,
                    custom_prompt: custom_prompt.clone(),
                })
            })
            .await?;

        Ok(match advance {
            Advance::Item(file) => file,
            Advance::Complete => FileDiff::completed(),
        })
    }

    pub async fn reset_review(&self, pr_id: &str) -> Result<(), ServiceError> {
        self.machine.reset(pr_id).await?;
        Ok(())
    }
}
