mod state;

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Settings;
use crate::documents::columns::{self, DocumentView, WidthClass, AGGREGATE_COLUMNS, COLUMNS};
use crate::error::AppError;
use crate::upload::{
    DocumentApi, HttpDocumentApi, LocalFile, UploadListener, UploadRequest, UploadSession, Uploader,
};
pub use state::ProgressView;

/// Reports workflow callbacks on the terminal.
struct TerminalListener;

impl UploadListener for TerminalListener {
    fn upload_complete(&self) {
        info!("Upload complete");
    }

    fn folder_created(&self) {
        info!("Folder created");
    }

    fn upload_files(&self, files: &[LocalFile]) {
        let total: u64 = files.iter().map(|f| f.size).sum();
        info!(
            count = files.len(),
            size = %crate::utils::file_size::format_size(total),
            "Files selected for upload"
        );
    }
}

pub struct DocumentUploader {
    settings: Settings,
    api: Arc<HttpDocumentApi>,
}

impl DocumentUploader {
    pub fn new(settings: Settings) -> Result<Self, AppError> {
        let api = HttpDocumentApi::new(&settings.server).map_err(AppError::Client)?;
        info!(server = %settings.server.base_url, "Document server configured");

        Ok(Self {
            settings,
            api: Arc::new(api),
        })
    }

    /// Runs one upload session to the end and returns its final state.
    ///
    /// Ctrl-C requests a cancel, which only takes effect once every file has
    /// reached a terminal status.
    pub async fn start_upload(&self, request: UploadRequest) -> Result<UploadSession, AppError> {
        if request.files.is_empty() && request.remote_source.is_none() {
            return Err(AppError::NoInput);
        }

        let listener = Arc::new(TerminalListener);
        listener.upload_files(&request.files);

        let handle = Uploader::start(
            self.api.clone(),
            request,
            self.settings.upload.clone(),
            listener,
        );
        let mut updates = handle.subscribe();
        let mut last_status = String::new();

        loop {
            tokio::select! {
                _ = handle.wait() => break,
                changed = updates.changed() => {
                    if changed.is_err() {
                        return Err(AppError::Interrupted);
                    }
                    let status = ProgressView::new(&updates.borrow_and_update()).get_status_text();
                    if status != last_status {
                        info!("{}", status);
                        last_status = status;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    if handle.request_cancel() {
                        break;
                    }
                    warn!("Upload still in progress, cancel ignored");
                }
            }
        }

        let session = handle.snapshot();
        let view = ProgressView::new(&session);
        info!("{}", view.get_status_text());
        for line in view.get_details() {
            println!("{}", line);
        }

        Ok(session)
    }

    pub async fn create_folder(
        &self,
        title: Option<String>,
        parent: Option<String>,
    ) -> Result<(), AppError> {
        let title = title.unwrap_or_else(|| self.settings.upload.folder_title.clone());
        self.api.create_folder(&title, parent.as_deref()).await?;
        TerminalListener.folder_created();
        Ok(())
    }
}

/// Lines describing the table columns applicable to `view`.
pub fn describe_columns(view: Option<DocumentView>, expand: bool) -> Vec<String> {
    let mut ids: Vec<String> = AGGREGATE_COLUMNS
        .iter()
        .map(|(d, _)| d.id)
        .chain(COLUMNS.iter().map(|d| d.id))
        .map(str::to_string)
        .collect();

    if let Some(view) = view {
        ids = columns::filter_by_view(&ids, view);
    }
    if expand {
        let mut seen = HashSet::new();
        ids = columns::expand_aggregated_columns(&ids);
        ids.retain(|id| seen.insert(id.clone()));
    }

    ids.iter()
        .map(|id| {
            let label = columns::header_name(id).unwrap_or("-");
            let width = columns::column_width(id).map_or("-", WidthClass::as_str);
            let span = columns::get_span(width)
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string());
            format!("{:<18} {:<20} {:<3} {}", id, label, width, span)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn my_documents_listing_hides_shared_columns() {
        let lines = describe_columns(Some(DocumentView::MyDocuments), false);
        assert_eq!(lines.len(), 15);
        assert!(lines[0].starts_with("agg_document"));
        assert!(lines[0].ends_with("XL  6"));
        assert!(lines.iter().any(|l| l.starts_with("has_clones") && l.ends_with("S   1")));
        assert!(!lines.iter().any(|l| l.starts_with("owner")));
    }

    #[test]
    fn expanded_listing_shows_underlying_columns() {
        let lines = describe_columns(None, true);
        assert!(lines[0].starts_with("author"));
        assert!(lines[1].starts_with("document"));
        assert!(lines[1].ends_with("-   -"));
        assert_eq!(lines.iter().filter(|l| l.starts_with("author ")).count(), 1);
        assert_eq!(lines.len(), 18);
    }
}
