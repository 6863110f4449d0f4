use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Review progress for one pull request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSession {
    pub pr_id: String,
    pub status: ReviewStatus,
    /// Number of files already handed out; also the review order of the next file.
    pub current_index: u32,
    pub total_files: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReviewSession {
    pub fn new(pr_id: impl Into<String>, total_files: u32, now: DateTime<Utc>) -> Self {
        Self {
            pr_id: pr_id.into(),
            status: ReviewStatus::InProgress,
            current_index: 0,
            total_files,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_in_progress(&self) -> bool {
        self.status == ReviewStatus::InProgress
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    InProgress,
    Completed,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}
