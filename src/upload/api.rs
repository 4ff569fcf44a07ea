use std::future::Future;
use std::sync::Arc;

use super::types::{FinalizeResponse, LocalFile, TaskStatusResponse};
use crate::error::ApiError;

/// Receives the number of bytes sent so far for one file.
pub type ProgressFn = Arc<dyn Fn(u64) + Send + Sync>;

/// Operations the upload workflow needs from the document server.
pub trait DocumentApi: Send + Sync + 'static {
    /// Create the document record; returns the upload id.
    fn init_document(&self, title: &str) -> impl Future<Output = Result<String, ApiError>> + Send;

    /// Send one file into the upload; returns the file part id.
    fn upload_file(
        &self,
        upload_id: &str,
        file: &LocalFile,
        on_progress: ProgressFn,
    ) -> impl Future<Output = Result<String, ApiError>> + Send;

    /// Ask the server to fetch content from `url`; returns the file part id.
    fn register_url(
        &self,
        upload_id: &str,
        url: &str,
    ) -> impl Future<Output = Result<String, ApiError>> + Send;

    fn finalize(
        &self,
        upload_id: &str,
    ) -> impl Future<Output = Result<FinalizeResponse, ApiError>> + Send;

    fn task_status(
        &self,
        document_id: &str,
    ) -> impl Future<Output = Result<TaskStatusResponse, ApiError>> + Send;

    fn create_folder(
        &self,
        title: &str,
        parent: Option<&str>,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;
}
