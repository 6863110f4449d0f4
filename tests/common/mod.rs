#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::StatusCode;

use pr_reviewer::bitbucket::BitbucketError;
use pr_reviewer::filter::ExclusionFilter;
use pr_reviewer::review::ReviewService;
use pr_reviewer::source::{ChangeSource, ChangeType, ChangedFile, CommentAck};
use review_core::{MemoryStore, ReviewStore};

pub const PROMPT: &str = "Review this carefully.";

/// In-process code host with scripted changes and failure switches.
#[derive(Default)]
pub struct FakeSource {
    changes: Mutex<HashMap<String, Vec<ChangedFile>>>,
    pub diff_requests: Mutex<Vec<String>>,
    pub fail_listing: Mutex<bool>,
    pub fail_diffs: Mutex<bool>,
}

impl FakeSource {
    pub fn with_changes(pr_id: &str, paths: &[&str]) -> Arc<Self> {
        let source = Self::default();
        source.set_changes(pr_id, paths);
        Arc::new(source)
    }

    pub fn set_changes(&self, pr_id: &str, paths: &[&str]) {
        let files = paths
            .iter()
            .map(|p| ChangedFile::new(*p, ChangeType::Modify))
            .collect();
        self.changes.lock().unwrap().insert(pr_id.to_string(), files);
    }

    pub fn diff_requests(&self) -> Vec<String> {
        self.diff_requests.lock().unwrap().clone()
    }

    pub fn fail_diffs(&self, fail: bool) {
        *self.fail_diffs.lock().unwrap() = fail;
    }

    pub fn fail_listing(&self, fail: bool) {
        *self.fail_listing.lock().unwrap() = fail;
    }

    fn upstream_failure() -> BitbucketError {
        BitbucketError::Status {
            status: StatusCode::BAD_GATEWAY,
            body: "upstream unavailable".into(),
        }
    }
}

#[async_trait]
impl ChangeSource for FakeSource {
    async fn list_changed_files(&self, pr_id: &str) -> Result<Vec<ChangedFile>, BitbucketError> {
        if *self.fail_listing.lock().unwrap() {
            return Err(Self::upstream_failure());
        }
        Ok(self
            .changes
            .lock()
            .unwrap()
            .get(pr_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_file_diff(&self, pr_id: &str, path: &str) -> Result<String, BitbucketError> {
        if *self.fail_diffs.lock().unwrap() {
            return Err(Self::upstream_failure());
        }
        self.diff_requests.lock().unwrap().push(path.to_string());
        // Suspend like a real request so overlapping calls interleave.
        tokio::task::yield_now().await;
        Ok(format!("diff --git a/{path} b/{path} (PR {pr_id})"))
    }

    async fn post_comment(
        &self,
        _pr_id: &str,
        _path: &str,
        _line: u32,
        _text: &str,
    ) -> Result<CommentAck, BitbucketError> {
        Ok(CommentAck::default())
    }
}

pub async fn memory_store() -> Arc<dyn ReviewStore> {
    let store: Arc<dyn ReviewStore> = Arc::new(MemoryStore::new());
    store.initialize().await.unwrap();
    store
}

pub fn service(store: Arc<dyn ReviewStore>, source: Arc<FakeSource>) -> ReviewService {
    let filter = ExclusionFilter::new([r"\.md$", "^docs/"]).unwrap();
    ReviewService::new(store, source, filter, PROMPT)
}
