//! Upload session state and its transitions.
//!
//! `UploadSession` is a plain value. Every change goes through
//! [`UploadSession::apply`], which returns the next session and leaves the
//! current one untouched, so observers always see whole snapshots.

use super::types::{LocalFile, Phase, TaskStatusResponse, UploadRequest, UploadStatus};

/// Tracked state of one file (or of the remote fetch in URL mode).
#[derive(Debug, Clone, PartialEq)]
pub struct FileSlot {
    pub filepart_id: Option<String>,
    pub status: UploadStatus,
    /// Bytes sent so far.
    pub loaded: u64,
}

impl Default for FileSlot {
    fn default() -> Self {
        Self {
            filepart_id: None,
            status: UploadStatus::Uploading,
            loaded: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadSession {
    pub files: Vec<LocalFile>,
    pub remote_source: Option<String>,
    pub upload_id: Option<String>,
    pub phase: Phase,
    /// Index-aligned with `files`; a single slot when there are no files.
    pub slots: Vec<FileSlot>,
    pub errors: Vec<String>,
    pub total_size: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    UploadInitialized { upload_id: String },
    PhaseChanged(Phase),
    Progress { index: usize, loaded: u64 },
    FilepartStored { index: usize, filepart_id: String },
    TransferFailed { index: usize, error: String },
    ErrorRecorded(String),
    TaskStatusReceived(TaskStatusResponse),
    /// Finalize reported no background work.
    TransferSettled,
    /// The workflow cannot make further progress.
    Abandoned,
}

impl UploadSession {
    pub fn new(request: &UploadRequest) -> Self {
        let slot_count = request.files.len().max(1);

        Self {
            files: request.files.clone(),
            remote_source: request.remote_source.clone(),
            upload_id: None,
            phase: Phase::Uploading,
            slots: vec![FileSlot::default(); slot_count],
            errors: Vec::new(),
            total_size: request.files.iter().map(|f| f.size).sum(),
        }
    }

    pub fn apply(&self, event: &SessionEvent) -> Self {
        let mut next = self.clone();

        match event {
            SessionEvent::UploadInitialized { upload_id } => {
                next.upload_id = Some(upload_id.clone());
            }
            SessionEvent::PhaseChanged(phase) => next.phase = *phase,
            SessionEvent::Progress { index, loaded } => {
                if let Some(slot) = next.slots.get_mut(*index) {
                    slot.loaded = slot.loaded.max(*loaded);
                }
            }
            SessionEvent::FilepartStored { index, filepart_id } => {
                let size = next.files.get(*index).map(|f| f.size).unwrap_or(0);
                if let Some(slot) = next.slots.get_mut(*index) {
                    slot.filepart_id = Some(filepart_id.clone());
                    slot.loaded = slot.loaded.max(size);
                }
            }
            SessionEvent::TransferFailed { index, error } => {
                if let Some(slot) = next.slots.get_mut(*index) {
                    slot.status = UploadStatus::Failed;
                }
                next.errors.push(error.clone());
            }
            SessionEvent::ErrorRecorded(error) => next.errors.push(error.clone()),
            SessionEvent::TaskStatusReceived(result) => {
                for slot in next.slots.iter_mut() {
                    // Slots without a file part never reached the server
                    let Some(id) = slot.filepart_id.as_deref() else {
                        continue;
                    };
                    slot.status = match result.subtask_for(id) {
                        Some(task) => task.status.clone(),
                        None => UploadStatus::Completed,
                    };
                }
            }
            SessionEvent::TransferSettled => {
                for slot in next.slots.iter_mut() {
                    if slot.status == UploadStatus::Uploading && slot.filepart_id.is_some() {
                        slot.status = UploadStatus::Completed;
                    }
                }
            }
            SessionEvent::Abandoned => {
                for slot in next.slots.iter_mut().filter(|s| !s.status.is_terminal()) {
                    slot.status = UploadStatus::Failed;
                }
            }
        }

        next
    }

    /// True once every slot is `COMPLETED` or `FAILED`.
    pub fn is_upload_complete(&self) -> bool {
        self.slots.iter().all(|s| s.status.is_terminal())
    }

    pub fn total_loaded(&self) -> u64 {
        self.slots.iter().map(|s| s.loaded).sum()
    }

    pub fn progress_fraction(&self) -> f64 {
        if self.total_size == 0 {
            return 0.0;
        }
        (self.total_loaded() as f64 / self.total_size as f64).min(1.0)
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Document title sent when the upload is initialized.
    pub fn title<'a>(&'a self, placeholder: &'a str) -> &'a str {
        match self.files.as_slice() {
            [single] => &single.name,
            _ => placeholder,
        }
    }
}
