use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReviewFile {
    pub file_path: String,
    pub reviewed: bool,
    pub review_order: u32,
}

/// The file a session's cursor currently points at.
///
/// `current` is 1-based for display; `total` is the file count snapshotted at start.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NextFile {
    pub file_path: String,
    pub current: u32,
    pub total: u32,
}
