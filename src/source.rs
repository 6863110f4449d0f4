//! The code-hosting collaborator the review flow depends on.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::bitbucket::BitbucketError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeType {
    Add,
    Modify,
    Delete,
    Rename,
    Copy,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChangedFile {
    pub path: String,
    pub change_type: ChangeType,
}

impl ChangedFile {
    pub fn new(path: impl Into<String>, change_type: ChangeType) -> Self {
        Self {
            path: path.into(),
            change_type,
        }
    }
}

/// Acknowledgement for a posted comment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommentAck {
    pub id: Option<u64>,
    pub version: Option<u64>,
}

#[async_trait]
pub trait ChangeSource: Send + Sync {
    /// Changed files of the pull request, in the order the host lists them.
    async fn list_changed_files(&self, pr_id: &str) -> Result<Vec<ChangedFile>, BitbucketError>;

    /// Raw text diff of one file.
    async fn fetch_file_diff(&self, pr_id: &str, path: &str) -> Result<String, BitbucketError>;

    async fn post_comment(
        &self,
        pr_id: &str,
        path: &str,
        line: u32,
        text: &str,
    ) -> Result<CommentAck, BitbucketError>;
}
