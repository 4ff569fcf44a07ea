//! Layered settings: built-in defaults, an optional TOML file, then
//! `DOCUPLOAD__SECTION__KEY` environment variables.

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::AppError;

const DEFAULT_CONFIG_FILE: &str = "docupload";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub upload: UploadSettings,
}

/// Document server connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Limit for the small JSON requests. File transfers are only bound by
    /// the connect timeout, since large files may take long to send.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Upload workflow settings
#[derive(Debug, Clone, Deserialize)]
pub struct UploadSettings {
    /// Delay between two task status requests while the server is processing.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Document title used when more than one file is uploaded.
    #[serde(default = "default_placeholder_title")]
    pub placeholder_title: String,

    #[serde(default = "default_folder_title")]
    pub folder_title: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            placeholder_title: default_placeholder_title(),
            folder_title: default_folder_title(),
        }
    }
}

impl UploadSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Settings {
    /// Load settings. An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("DOCUPLOAD")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Ok(settings)
    }
}

fn default_base_url() -> String {
    "http://localhost:9000".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_user_agent() -> String {
    format!("docupload/{}", env!("CARGO_PKG_VERSION"))
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_placeholder_title() -> String {
    "New document".to_string()
}

fn default_folder_title() -> String {
    "Unnamed Folder".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_apply_to_missing_sections() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[server]\nbase_url = \"https://docs.example.org\"").unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.server.base_url, "https://docs.example.org");
        assert_eq!(settings.server.connect_timeout_secs, 10);
        assert_eq!(settings.server.request_timeout_secs, 60);
        assert_eq!(settings.upload.poll_interval(), Duration::from_secs(1));
        assert_eq!(settings.upload.placeholder_title, "New document");
        assert_eq!(settings.upload.folder_title, "Unnamed Folder");
    }

    #[test]
    fn zero_poll_interval_is_clamped() {
        let settings = UploadSettings {
            poll_interval_ms: 0,
            ..UploadSettings::default()
        };
        assert_eq!(settings.poll_interval(), Duration::from_millis(1));
    }

    #[test]
    fn explicit_file_must_exist() {
        let missing = Path::new("/nonexistent/docupload-settings.toml");
        assert!(matches!(
            Settings::load(Some(missing)),
            Err(AppError::Config(_))
        ));
    }
}
