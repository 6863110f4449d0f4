//! Volatile review store. Holds everything in a map behind one lock; all
//! state is lost when the process exits.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{duplicate_path, Result, ReviewStore, StoreError};
use crate::models::{NextFile, ReviewFile, ReviewSession, ReviewStatus};

#[derive(Debug, Clone)]
struct Entry {
    session: ReviewSession,
    /// Indexed by `review_order`.
    files: Vec<ReviewFile>,
}

/// In-memory review store.
///
/// `None` means not initialized. Every mutation validates its input before
/// touching the map and then applies under a single write guard, so readers
/// see either the old or the new state and never a mix.
#[derive(Default)]
pub struct MemoryStore {
    reviews: RwLock<Option<HashMap<String, Entry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReviewStore for MemoryStore {
    async fn initialize(&self) -> Result<()> {
        let mut reviews = self.reviews.write().await;
        if reviews.is_none() {
            *reviews = Some(HashMap::new());
            tracing::info!("Using in-memory review store");
        }
        Ok(())
    }

    async fn is_in_progress(&self, pr_id: &str) -> Result<bool> {
        let reviews = self.reviews.read().await;
        let reviews = reviews.as_ref().ok_or(StoreError::NotInitialized)?;
        Ok(reviews
            .get(pr_id)
            .is_some_and(|entry| entry.session.is_in_progress()))
    }

    async fn start_review(&self, pr_id: &str, files: &[String]) -> Result<()> {
        let mut reviews = self.reviews.write().await;
        let reviews = reviews.as_mut().ok_or(StoreError::NotInitialized)?;

        if let Some(path) = duplicate_path(files) {
            return Err(StoreError::DuplicateFile {
                pr_id: pr_id.to_owned(),
                path: path.to_owned(),
            });
        }

        let now = Utc::now();
        let mut session = ReviewSession::new(pr_id, files.len() as u32, now);
        if let Some(previous) = reviews.get(pr_id) {
            session.created_at = previous.session.created_at;
        }

        let files = files
            .iter()
            .enumerate()
            .map(|(order, path)| ReviewFile {
                file_path: path.clone(),
                reviewed: false,
                review_order: order as u32,
            })
            .collect();

        reviews.insert(pr_id.to_owned(), Entry { session, files });
        Ok(())
    }

    async fn get_next_file(&self, pr_id: &str) -> Result<Option<NextFile>> {
        let reviews = self.reviews.read().await;
        let reviews = reviews.as_ref().ok_or(StoreError::NotInitialized)?;

        let Some(entry) = reviews.get(pr_id) else {
            return Ok(None);
        };
        if !entry.session.is_in_progress() {
            return Ok(None);
        }

        let cursor = entry.session.current_index;
        Ok(entry
            .files
            .get(cursor as usize)
            .filter(|file| !file.reviewed)
            .map(|file| NextFile {
                file_path: file.file_path.clone(),
                current: cursor + 1,
                total: entry.session.total_files,
            }))
    }

    async fn mark_reviewed(&self, pr_id: &str, file_path: &str) -> Result<()> {
        let mut reviews = self.reviews.write().await;
        let reviews = reviews.as_mut().ok_or(StoreError::NotInitialized)?;

        let entry = reviews
            .get_mut(pr_id)
            .ok_or_else(|| StoreError::SessionNotFound(pr_id.to_owned()))?;
        let position = entry
            .files
            .iter()
            .position(|file| file.file_path == file_path)
            .ok_or_else(|| StoreError::FileNotFound {
                pr_id: pr_id.to_owned(),
                path: file_path.to_owned(),
            })?;

        let at_cursor = entry.session.is_in_progress()
            && position == entry.session.current_index as usize
            && !entry.files[position].reviewed;
        if !at_cursor {
            return Err(StoreError::NotAtCursor {
                pr_id: pr_id.to_owned(),
                path: file_path.to_owned(),
            });
        }

        entry.files[position].reviewed = true;
        let session = &mut entry.session;
        session.current_index = (session.current_index + 1).min(session.total_files);
        session.updated_at = Utc::now();
        Ok(())
    }

    async fn complete_review(&self, pr_id: &str) -> Result<()> {
        let mut reviews = self.reviews.write().await;
        let reviews = reviews.as_mut().ok_or(StoreError::NotInitialized)?;

        if let Some(entry) = reviews.get_mut(pr_id) {
            entry.session.status = ReviewStatus::Completed;
            entry.session.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn reset_review(&self, pr_id: &str) -> Result<()> {
        let mut reviews = self.reviews.write().await;
        let reviews = reviews.as_mut().ok_or(StoreError::NotInitialized)?;
        reviews.remove(pr_id);
        Ok(())
    }

    async fn get_session(&self, pr_id: &str) -> Result<Option<ReviewSession>> {
        let reviews = self.reviews.read().await;
        let reviews = reviews.as_ref().ok_or(StoreError::NotInitialized)?;
        Ok(reviews.get(pr_id).map(|entry| entry.session.clone()))
    }

    async fn list_files(&self, pr_id: &str) -> Result<Vec<ReviewFile>> {
        let reviews = self.reviews.read().await;
        let reviews = reviews.as_ref().ok_or(StoreError::NotInitialized)?;
        Ok(reviews
            .get(pr_id)
            .map(|entry| entry.files.clone())
            .unwrap_or_default())
    }

    async fn close(&self) -> Result<()> {
        self.reviews.write().await.take();
        Ok(())
    }
}
