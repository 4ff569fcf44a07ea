use crate::upload::{UploadSession, UploadStatus};
use crate::utils::file_size::format_transfer;

/// Display numbers derived from an upload session snapshot.
pub struct ProgressView<'a> {
    session: &'a UploadSession,
}

impl<'a> ProgressView<'a> {
    pub fn new(session: &'a UploadSession) -> Self {
        Self { session }
    }

    pub fn get_progress_percentage(&self) -> f32 {
        (self.session.progress_fraction() * 100.0) as f32
    }

    fn count(&self, status: &UploadStatus) -> usize {
        self.session
            .slots
            .iter()
            .filter(|s| &s.status == status)
            .count()
    }

    pub fn get_status_text(&self) -> String {
        let total = self.session.slots.len();
        let completed = self.count(&UploadStatus::Completed);
        let failed = self.count(&UploadStatus::Failed);

        if self.session.files.is_empty() {
            return format!(
                "{}: remote source | ✅ Done: {} | ❌ Failed: {}",
                self.session.phase, completed, failed
            );
        }

        format!(
            "{}: {:.0}% ({}) | {}/{} files | ✅ Done: {} | ❌ Failed: {}",
            self.session.phase,
            self.get_progress_percentage(),
            format_transfer(self.session.total_loaded(), self.session.total_size),
            completed + failed,
            total,
            completed,
            failed
        )
    }

    /// One line per tracked file, followed by the error list.
    pub fn get_details(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .session
            .files
            .iter()
            .zip(&self.session.slots)
            .map(|(file, slot)| format!("{} [{}]", file.name, slot.status))
            .collect();

        if let Some(url) = &self.session.remote_source {
            if self.session.files.is_empty() {
                lines.push(format!(
                    "Fetching content from {} [{}]",
                    url, self.session.slots[0].status
                ));
            }
        }

        lines.extend(self.session.errors.iter().map(|e| format!("Error: {}", e)));
        lines
    }
}
