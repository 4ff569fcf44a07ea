use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Per-file status as tracked locally and as reported by the task API.
///
/// The server may report states beyond the three the workflow itself sets
/// (for example `RUNNING` while a conversion is underway); those are kept
/// verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UploadStatus {
    Uploading,
    Failed,
    Completed,
    Other(String),
}

impl UploadStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStatus::Completed | UploadStatus::Failed)
    }

    pub fn as_str(&self) -> &str {
        match self {
            UploadStatus::Uploading => "UPLOADING",
            UploadStatus::Failed => "FAILED",
            UploadStatus::Completed => "COMPLETED",
            UploadStatus::Other(s) => s,
        }
    }
}

impl From<String> for UploadStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "UPLOADING" => UploadStatus::Uploading,
            "FAILED" => UploadStatus::Failed,
            "COMPLETED" => UploadStatus::Completed,
            _ => UploadStatus::Other(value),
        }
    }
}

impl From<UploadStatus> for String {
    fn from(value: UploadStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Workflow phase shown above the file list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uploading,
    /// Server is fetching a remote source.
    Importing,
    /// Background tasks are running after finalize.
    Processing,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Uploading => f.write_str("Uploading"),
            Phase::Importing => f.write_str("Importing"),
            Phase::Processing => f.write_str("Importing..."),
        }
    }
}

/// A file on local disk selected for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
}

impl LocalFile {
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let size = std::fs::metadata(path)?.len();
        let name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        Ok(Self {
            path: path.to_path_buf(),
            name,
            size,
        })
    }
}

/// What a single upload session should send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadRequest {
    pub files: Vec<LocalFile>,
    pub remote_source: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InitResponse {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct FilepartResponse {
    pub uuid: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FinalizeResponse {
    #[serde(default)]
    pub running_tasks: Vec<serde_json::Value>,

    #[serde(deserialize_with = "string_or_number")]
    pub document_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TaskStatusResponse {
    pub status: UploadStatus,

    #[serde(default)]
    pub subtasks: Vec<Subtask>,
}

impl TaskStatusResponse {
    pub fn is_done(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn subtask_for(&self, filepart_id: &str) -> Option<&Subtask> {
        self.subtasks
            .iter()
            .find(|t| t.filepart_id.as_deref() == Some(filepart_id))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Subtask {
    #[serde(default)]
    pub filepart_id: Option<String>,
    pub status: UploadStatus,
}

/// Accepts ids the server renders either as JSON strings or numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}
