use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while talking to the document server.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Server returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ApiError {
    /// Text shown to the user in the upload error list.
    ///
    /// The server's response body is preferred, since that is what it meant
    /// the user to read.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Status { message, .. } if !message.trim().is_empty() => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Top-level application errors.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("{0}")]
    Api(#[from] ApiError),

    #[error("Failed to build HTTP client")]
    Client(#[source] reqwest::Error),

    #[error("Cannot read {path}: {message}")]
    Input { path: PathBuf, message: String },

    #[error("Invalid include pattern '{pattern}'")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("Unknown document view: {0}")]
    UnknownView(String),

    #[error("Nothing to upload: give at least one file or --url")]
    NoInput,

    #[error("Upload workflow stopped unexpectedly")]
    Interrupted,

    #[error("Upload finished with {count} error(s)")]
    UploadErrors { count: usize },
}
