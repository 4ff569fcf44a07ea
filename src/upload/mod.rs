mod api;
mod client;
mod orchestrator;
pub mod session;
mod types;

pub use api::DocumentApi;
pub use client::HttpDocumentApi;
pub use orchestrator::{UploadHandle, UploadListener, Uploader};
pub use session::UploadSession;
pub use types::{LocalFile, UploadRequest, UploadStatus};
