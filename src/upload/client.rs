use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, ClientBuilder, Response};
use serde_json::json;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::debug;

use super::api::{DocumentApi, ProgressFn};
use super::types::{
    FilepartResponse, FinalizeResponse, InitResponse, LocalFile, TaskStatusResponse,
};
use crate::config::ServerSettings;
use crate::error::ApiError;

/// `DocumentApi` backed by the server's HTTP endpoints.
#[derive(Clone)]
pub struct HttpDocumentApi {
    client: Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpDocumentApi {
    pub fn new(settings: &ServerSettings) -> Result<Self, reqwest::Error> {
        let client = Self::client_builder(settings).build()?;
        Ok(Self::with_client(client, settings))
    }

    fn client_builder(settings: &ServerSettings) -> ClientBuilder {
        // Every request is flagged as AJAX so the server answers with JSON
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("x-requested-with"),
            HeaderValue::from_static("XMLHttpRequest"),
        );

        // No client-wide timeout: it would also cap file transfers
        Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .user_agent(settings.user_agent.as_str())
    }

    fn with_client(client: Client, settings: &ServerSettings) -> Self {
        Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(settings.request_timeout_secs),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        Err(ApiError::Status {
            status: status.as_u16(),
            message: response.text().await.unwrap_or_default(),
        })
    }
}

impl DocumentApi for HttpDocumentApi {
    async fn init_document(&self, title: &str) -> Result<String, ApiError> {
        let form = Form::new().text("title", title.to_string());
        let response = self
            .client
            .post(self.url("/my/upload"))
            .timeout(self.request_timeout)
            .multipart(form)
            .send()
            .await?;

        let init: InitResponse = Self::check(response).await?.json().await?;
        debug!(upload_id = %init.id, title, "Upload initialized");
        Ok(init.id)
    }

    async fn upload_file(
        &self,
        upload_id: &str,
        file: &LocalFile,
        on_progress: ProgressFn,
    ) -> Result<String, ApiError> {
        let handle = tokio::fs::File::open(&file.path)
            .await
            .map_err(|source| ApiError::Io {
                path: file.path.clone(),
                source,
            })?;

        let mut loaded = 0u64;
        let stream = ReaderStream::new(handle).map(move |chunk| {
            if let Ok(bytes) = &chunk {
                loaded += bytes.len() as u64;
                on_progress(loaded);
            }
            chunk
        });

        let part = Part::stream_with_length(Body::wrap_stream(stream), file.size)
            .file_name(file.name.clone());
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(self.url(&format!("/my/upload/{}/file", upload_id)))
            .multipart(form)
            .send()
            .await?;

        let part: FilepartResponse = Self::check(response).await?.json().await?;
        debug!(upload_id, file = %file.name, filepart_id = %part.uuid, "File part stored");
        Ok(part.uuid)
    }

    async fn register_url(&self, upload_id: &str, url: &str) -> Result<String, ApiError> {
        let form = Form::new().text("url", url.to_string());
        let response = self
            .client
            .post(self.url(&format!("/my/upload/{}/file", upload_id)))
            .timeout(self.request_timeout)
            .multipart(form)
            .send()
            .await?;

        let part: FilepartResponse = Self::check(response).await?.json().await?;
        debug!(upload_id, url, filepart_id = %part.uuid, "Remote source registered");
        Ok(part.uuid)
    }

    async fn finalize(&self, upload_id: &str) -> Result<FinalizeResponse, ApiError> {
        let response = self
            .client
            .post(self.url(&format!("/my/upload/{}/finalize", upload_id)))
            .timeout(self.request_timeout)
            .send()
            .await?;

        Ok(Self::check(response).await?.json().await?)
    }

    async fn task_status(&self, document_id: &str) -> Result<TaskStatusResponse, ApiError> {
        let response = self
            .client
            .get(self.url("/api/task"))
            .timeout(self.request_timeout)
            .query(&[("id", document_id)])
            .send()
            .await?;

        Ok(Self::check(response).await?.json().await?)
    }

    async fn create_folder(&self, title: &str, parent: Option<&str>) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.url("/api/folder"))
            .timeout(self.request_timeout)
            .json(&json!({ "title": title, "parent": parent }))
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }
}
