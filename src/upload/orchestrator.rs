//! Multi-stage upload workflow.
//!
//! One document usually consists of several files, so an upload runs in
//! stages: the document is initialized and assigned an upload id, the files
//! (or a remote URL) are sent into it, the upload is finalized, and any
//! background processing the server starts is polled until it finishes.

use derivative::Derivative;
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, info, warn};

use super::api::{DocumentApi, ProgressFn};
use super::session::{SessionEvent, UploadSession};
use super::types::{LocalFile, Phase, UploadRequest};
use crate::config::UploadSettings;

/// Callbacks into the embedding application.
pub trait UploadListener: Send + Sync + 'static {
    /// The upload is over and its progress view can be closed.
    fn upload_complete(&self);

    fn folder_created(&self) {}

    /// Files were picked for upload.
    fn upload_files(&self, _files: &[LocalFile]) {}
}

/// Fires `upload_complete` at most once per session.
struct Completion {
    fired: AtomicBool,
    listener: Arc<dyn UploadListener>,
}

impl Completion {
    fn fire(&self) {
        if !self.fired.swap(true, Ordering::SeqCst) {
            self.listener.upload_complete();
        }
    }
}

/// A running upload session.
///
/// Dropping the handle stops the workflow, including a pending poll timer.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct UploadHandle<A: DocumentApi> {
    #[derivative(Debug = "ignore")]
    api: Arc<A>,
    settings: UploadSettings,
    #[derivative(Debug = "ignore")]
    listener: Arc<dyn UploadListener>,
    request: UploadRequest,
    #[derivative(Debug = "ignore")]
    state: Arc<watch::Sender<UploadSession>>,
    #[derivative(Debug = "ignore")]
    completion: Arc<Completion>,
    cancel: CancellationToken,
    done: CancellationToken,
}

pub struct Uploader;

impl Uploader {
    /// Reset state for `request` and start the workflow right away.
    pub fn start<A: DocumentApi>(
        api: Arc<A>,
        request: UploadRequest,
        settings: UploadSettings,
        listener: Arc<dyn UploadListener>,
    ) -> UploadHandle<A> {
        let (state, _) = watch::channel(UploadSession::new(&request));
        let completion = Arc::new(Completion {
            fired: AtomicBool::new(false),
            listener: listener.clone(),
        });

        let mut handle = UploadHandle {
            api,
            settings,
            listener,
            request,
            state: Arc::new(state),
            completion,
            cancel: CancellationToken::new(),
            done: CancellationToken::new(),
        };
        handle.spawn();
        handle
    }
}

impl<A: DocumentApi> UploadHandle<A> {
    fn spawn(&mut self) {
        self.cancel = CancellationToken::new();
        self.done = CancellationToken::new();
        self.completion = Arc::new(Completion {
            fired: AtomicBool::new(false),
            listener: self.listener.clone(),
        });
        self.state.send_replace(UploadSession::new(&self.request));

        let workflow = Workflow {
            api: self.api.clone(),
            settings: self.settings.clone(),
            state: self.state.clone(),
            completion: self.completion.clone(),
            cancel: self.cancel.clone(),
        };
        let cancel = self.cancel.clone();
        let done = self.done.clone();

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => debug!("Upload workflow cancelled"),
                _ = workflow.run() => {}
            }
            done.cancel();
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<UploadSession> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> UploadSession {
        self.state.borrow().clone()
    }

    /// Resolves once the workflow has stopped, either finished or cancelled.
    pub fn wait(&self) -> WaitForCancellationFuture<'_> {
        self.done.cancelled()
    }

    /// Close the session. Only honored once every file has reached a
    /// terminal status; returns whether it was.
    pub fn request_cancel(&self) -> bool {
        if !self.state.borrow().is_upload_complete() {
            debug!("Cancel ignored, upload still in progress");
            return false;
        }

        self.cancel.cancel();
        self.completion.fire();
        true
    }

    /// Switch to a new request, restarting the workflow unless the files and
    /// remote source are unchanged.
    pub fn restart(&mut self, request: UploadRequest) {
        if request == self.request {
            return;
        }

        self.cancel.cancel();
        self.request = request;
        self.spawn();
    }
}

impl<A: DocumentApi> Drop for UploadHandle<A> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Workflow<A> {
    api: Arc<A>,
    settings: UploadSettings,
    state: Arc<watch::Sender<UploadSession>>,
    completion: Arc<Completion>,
    cancel: CancellationToken,
}

impl<A: DocumentApi> Workflow<A> {
    fn publish(&self, event: SessionEvent) {
        publish(&self.state, &self.cancel, &event);
    }

    fn snapshot(&self) -> UploadSession {
        self.state.borrow().clone()
    }

    async fn run(self) {
        let session = self.snapshot();
        let title = session.title(&self.settings.placeholder_title).to_string();

        match self.api.init_document(&title).await {
            Ok(upload_id) => {
                info!(%upload_id, title = %title, "Document initialized");
                self.publish(SessionEvent::UploadInitialized {
                    upload_id: upload_id.clone(),
                });

                if !session.files.is_empty() {
                    self.upload_files(&upload_id, &session.files).await;
                } else if let Some(url) = &session.remote_source {
                    self.register_url(&upload_id, url).await;
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to initialize document");
                self.publish(SessionEvent::ErrorRecorded(e.user_message()));
            }
        }

        self.finalize().await;
    }

    /// Uploads all files concurrently. A failed file does not affect the others.
    async fn upload_files(&self, upload_id: &str, files: &[LocalFile]) {
        let uploads = files.iter().enumerate().map(|(index, file)| {
            let state = self.state.clone();
            let cancel = self.cancel.clone();
            let on_progress: ProgressFn = Arc::new(move |loaded| {
                publish(&state, &cancel, &SessionEvent::Progress { index, loaded });
            });

            async move {
                match self.api.upload_file(upload_id, file, on_progress).await {
                    Ok(filepart_id) => {
                        debug!(index, file = %file.name, %filepart_id, "File uploaded");
                        self.publish(SessionEvent::FilepartStored { index, filepart_id });
                    }
                    Err(e) => {
                        warn!(index, file = %file.name, error = %e, "File upload failed");
                        self.publish(SessionEvent::TransferFailed {
                            index,
                            error: e.user_message(),
                        });
                    }
                }
            }
        });

        join_all(uploads).await;
    }

    async fn register_url(&self, upload_id: &str, url: &str) {
        self.publish(SessionEvent::PhaseChanged(Phase::Importing));

        match self.api.register_url(upload_id, url).await {
            Ok(filepart_id) => {
                debug!(url, %filepart_id, "Remote source registered");
                self.publish(SessionEvent::FilepartStored {
                    index: 0,
                    filepart_id,
                });
            }
            Err(e) => {
                warn!(url, error = %e, "Remote source registration failed");
                self.publish(SessionEvent::TransferFailed {
                    index: 0,
                    error: e.user_message(),
                });
            }
        }
    }

    async fn finalize(&self) {
        let Some(upload_id) = self.snapshot().upload_id else {
            debug!("No upload id, nothing to finalize");
            self.publish(SessionEvent::Abandoned);
            return;
        };

        match self.api.finalize(&upload_id).await {
            Ok(result) if result.running_tasks.is_empty() => {
                info!(%upload_id, document_id = %result.document_id, "Upload complete");
                self.publish(SessionEvent::TransferSettled);
                self.completion.fire();
            }
            Ok(result) => {
                info!(
                    %upload_id,
                    document_id = %result.document_id,
                    tasks = result.running_tasks.len(),
                    "Waiting for background tasks"
                );
                self.publish(SessionEvent::PhaseChanged(Phase::Processing));
                self.poll_task_progress(&result.document_id).await;
            }
            Err(e) => {
                // Not surfaced in the error list; only the slots are settled
                warn!(%upload_id, error = %e, "Failed to finalize upload");
                self.publish(SessionEvent::TransferSettled);
                self.publish(SessionEvent::Abandoned);
            }
        }
    }

    /// Polls at a fixed interval until the task reports COMPLETED or FAILED.
    async fn poll_task_progress(&self, document_id: &str) {
        let mut ticker = tokio::time::interval(self.settings.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            match self.api.task_status(document_id).await {
                Ok(result) => {
                    let done = result.is_done();
                    debug!(document_id, status = %result.status, "Task status");
                    self.publish(SessionEvent::TaskStatusReceived(result));
                    if done {
                        info!(document_id, "Background tasks finished");
                        self.completion.fire();
                        return;
                    }
                }
                Err(e) => warn!(document_id, error = %e, "Task status request failed"),
            }
        }
    }
}

/// Events from a cancelled workflow are dropped so a restarted session
/// never sees them.
fn publish(
    state: &watch::Sender<UploadSession>,
    cancel: &CancellationToken,
    event: &SessionEvent,
) {
    if cancel.is_cancelled() {
        return;
    }
    state.send_modify(|session| *session = session.apply(event));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::upload::types::{FinalizeResponse, Subtask, TaskStatusResponse, UploadStatus};
    use std::collections::{HashMap, VecDeque};
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct FakeApi {
        fail_init: bool,
        fail_finalize: bool,
        running_tasks: usize,
        failing_files: Vec<String>,
        gated_file: Option<String>,
        gate: Arc<Notify>,
        statuses: Mutex<VecDeque<Result<TaskStatusResponse, u16>>>,
        filepart_ids: Mutex<HashMap<String, String>>,
        init_titles: Mutex<Vec<String>>,
        upload_calls: AtomicUsize,
        finalize_calls: AtomicUsize,
        poll_calls: AtomicUsize,
    }

    impl FakeApi {
        fn with_statuses(mut self, statuses: Vec<Result<TaskStatusResponse, u16>>) -> Self {
            self.statuses = Mutex::new(statuses.into());
            self
        }
    }

    impl DocumentApi for FakeApi {
        async fn init_document(&self, title: &str) -> Result<String, ApiError> {
            self.init_titles.lock().unwrap().push(title.to_string());
            if self.fail_init {
                return Err(ApiError::Status {
                    status: 403,
                    message: "Upload quota exceeded".to_string(),
                });
            }
            Ok("17".to_string())
        }

        async fn upload_file(
            &self,
            _upload_id: &str,
            file: &LocalFile,
            on_progress: ProgressFn,
        ) -> Result<String, ApiError> {
            self.upload_calls.fetch_add(1, Ordering::SeqCst);
            on_progress(file.size / 2);
            if self.gated_file.as_ref() == Some(&file.name) {
                self.gate.notified().await;
            }
            if self.failing_files.contains(&file.name) {
                return Err(ApiError::Status {
                    status: 415,
                    message: format!("Unsupported format: {}", file.name),
                });
            }
            on_progress(file.size);

            let id = format!("part-{}", file.name);
            self.filepart_ids
                .lock()
                .unwrap()
                .insert(file.name.clone(), id.clone());
            Ok(id)
        }

        async fn register_url(&self, _upload_id: &str, _url: &str) -> Result<String, ApiError> {
            Ok("part-remote".to_string())
        }

        async fn finalize(&self, upload_id: &str) -> Result<FinalizeResponse, ApiError> {
            assert_eq!(upload_id, "17");
            self.finalize_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_finalize {
                return Err(ApiError::Status {
                    status: 500,
                    message: "Finalize failed".to_string(),
                });
            }
            Ok(FinalizeResponse {
                running_tasks: vec![serde_json::json!("IMAGE_TILING"); self.running_tasks],
                document_id: "doc-1".to_string(),
            })
        }

        async fn task_status(&self, document_id: &str) -> Result<TaskStatusResponse, ApiError> {
            assert_eq!(document_id, "doc-1");
            self.poll_calls.fetch_add(1, Ordering::SeqCst);

            let mut statuses = self.statuses.lock().unwrap();
            let next = if statuses.len() > 1 {
                statuses.pop_front()
            } else {
                statuses.front().cloned()
            };
            match next {
                Some(Ok(status)) => Ok(status),
                Some(Err(code)) => Err(ApiError::Status {
                    status: code,
                    message: String::new(),
                }),
                None => Ok(running(Vec::new())),
            }
        }

        async fn create_folder(&self, _title: &str, _parent: Option<&str>) -> Result<(), ApiError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingListener {
        completes: AtomicUsize,
    }

    impl CountingListener {
        fn count(&self) -> usize {
            self.completes.load(Ordering::SeqCst)
        }
    }

    impl UploadListener for CountingListener {
        fn upload_complete(&self) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn running(subtasks: Vec<Subtask>) -> TaskStatusResponse {
        TaskStatusResponse {
            status: UploadStatus::Other("RUNNING".to_string()),
            subtasks,
        }
    }

    fn subtask(filepart_id: &str, status: UploadStatus) -> Subtask {
        Subtask {
            filepart_id: Some(filepart_id.to_string()),
            status,
        }
    }

    fn file(name: &str, size: u64) -> LocalFile {
        LocalFile {
            path: PathBuf::from(name),
            name: name.to_string(),
            size,
        }
    }

    fn files(files: Vec<LocalFile>) -> UploadRequest {
        UploadRequest {
            files,
            remote_source: None,
        }
    }

    fn settings() -> UploadSettings {
        UploadSettings {
            poll_interval_ms: 1,
            ..UploadSettings::default()
        }
    }

    fn start(
        api: FakeApi,
        request: UploadRequest,
    ) -> (Arc<FakeApi>, Arc<CountingListener>, UploadHandle<FakeApi>) {
        let api = Arc::new(api);
        let listener = Arc::new(CountingListener::default());
        let handle = Uploader::start(api.clone(), request, settings(), listener.clone());
        (api, listener, handle)
    }

    async fn finish(handle: &UploadHandle<FakeApi>) -> UploadSession {
        tokio::time::timeout(Duration::from_secs(5), handle.wait())
            .await
            .expect("workflow did not finish");
        handle.snapshot()
    }

    #[tokio::test]
    async fn completes_without_polling_when_no_tasks_run() {
        let (api, listener, handle) =
            start(FakeApi::default(), files(vec![file("a.txt", 100), file("b.txt", 40)]));

        let session = finish(&handle).await;

        assert_eq!(listener.count(), 1);
        assert_eq!(api.poll_calls.load(Ordering::SeqCst), 0);
        assert_eq!(api.upload_calls.load(Ordering::SeqCst), 2);
        assert_eq!(*api.init_titles.lock().unwrap(), vec!["New document"]);
        assert_eq!(session.upload_id.as_deref(), Some("17"));
        assert_eq!(session.slots.len(), 2);
        assert_eq!(session.slots[0].filepart_id.as_deref(), Some("part-a.txt"));
        assert_eq!(session.slots[1].filepart_id.as_deref(), Some("part-b.txt"));
        assert_eq!(session.total_loaded(), 140);
        assert!(session.is_upload_complete());
        assert!(!session.has_errors());
    }

    #[tokio::test]
    async fn polls_until_task_completes() {
        let api = FakeApi {
            running_tasks: 1,
            ..FakeApi::default()
        }
        .with_statuses(vec![
            Ok(running(vec![subtask(
                "part-scan.jpg",
                UploadStatus::Other("RUNNING".to_string()),
            )])),
            Ok(TaskStatusResponse {
                status: UploadStatus::Completed,
                subtasks: vec![subtask("part-scan.jpg", UploadStatus::Completed)],
            }),
        ]);

        let (api, listener, handle) = start(api, files(vec![file("scan.jpg", 10)]));
        let session = finish(&handle).await;

        assert_eq!(listener.count(), 1);
        assert_eq!(api.poll_calls.load(Ordering::SeqCst), 2);
        assert_eq!(*api.init_titles.lock().unwrap(), vec!["scan.jpg"]);
        assert_eq!(session.phase, Phase::Processing);
        assert_eq!(session.slots[0].status, UploadStatus::Completed);
    }

    #[tokio::test]
    async fn failed_poll_requests_are_retried() {
        let api = FakeApi {
            running_tasks: 1,
            ..FakeApi::default()
        }
        .with_statuses(vec![
            Err(502),
            Ok(TaskStatusResponse {
                status: UploadStatus::Failed,
                subtasks: vec![subtask("part-a", UploadStatus::Failed)],
            }),
        ]);

        let (api, listener, handle) = start(api, files(vec![file("a", 1)]));
        let session = finish(&handle).await;

        assert_eq!(api.poll_calls.load(Ordering::SeqCst), 2);
        assert_eq!(listener.count(), 1);
        assert_eq!(session.slots[0].status, UploadStatus::Failed);
    }

    #[tokio::test]
    async fn cancel_is_ignored_until_files_are_terminal() {
        let api = FakeApi {
            gated_file: Some("a".to_string()),
            ..FakeApi::default()
        };
        let gate = api.gate.clone();
        let (_api, listener, handle) = start(api, files(vec![file("a", 8)]));

        assert!(!handle.request_cancel());
        tokio::task::yield_now().await;
        assert!(!handle.request_cancel());
        assert_eq!(listener.count(), 0);
        assert_eq!(handle.snapshot().slots[0].status, UploadStatus::Uploading);

        gate.notify_one();
        finish(&handle).await;

        assert!(handle.request_cancel());
        assert_eq!(listener.count(), 1);
    }

    #[tokio::test]
    async fn failed_file_does_not_stop_siblings() {
        let api = FakeApi {
            failing_files: vec!["bad.pdf".to_string()],
            ..FakeApi::default()
        };
        let (api, listener, handle) =
            start(api, files(vec![file("good.txt", 5), file("bad.pdf", 5)]));

        let session = finish(&handle).await;

        assert_eq!(api.finalize_calls.load(Ordering::SeqCst), 1);
        assert_eq!(listener.count(), 1);
        assert_eq!(session.slots[0].status, UploadStatus::Completed);
        assert_eq!(session.slots[1].status, UploadStatus::Failed);
        assert_eq!(session.errors, vec!["Unsupported format: bad.pdf".to_string()]);
    }

    #[tokio::test]
    async fn init_failure_records_error_and_settles() {
        let api = FakeApi {
            fail_init: true,
            ..FakeApi::default()
        };
        let (api, listener, handle) = start(api, files(vec![file("a", 1), file("b", 1)]));

        let session = finish(&handle).await;

        assert_eq!(api.upload_calls.load(Ordering::SeqCst), 0);
        assert_eq!(api.finalize_calls.load(Ordering::SeqCst), 0);
        assert_eq!(session.errors, vec!["Upload quota exceeded".to_string()]);
        assert!(session
            .slots
            .iter()
            .all(|s| s.status == UploadStatus::Failed));
        assert_eq!(listener.count(), 0);

        assert!(handle.request_cancel());
        assert_eq!(listener.count(), 1);
    }

    #[tokio::test]
    async fn finalize_failure_is_only_logged() {
        let api = FakeApi {
            fail_finalize: true,
            failing_files: vec!["bad".to_string()],
            ..FakeApi::default()
        };
        let (api, listener, handle) = start(api, files(vec![file("a", 1), file("bad", 1)]));

        let session = finish(&handle).await;

        assert_eq!(api.finalize_calls.load(Ordering::SeqCst), 1);
        assert_eq!(api.poll_calls.load(Ordering::SeqCst), 0);
        assert_eq!(session.errors, vec!["Unsupported format: bad".to_string()]);
        assert_eq!(session.slots[0].status, UploadStatus::Completed);
        assert_eq!(session.slots[1].status, UploadStatus::Failed);
        assert!(session.is_upload_complete());
        assert_eq!(listener.count(), 0);

        assert!(handle.request_cancel());
        assert_eq!(listener.count(), 1);
    }

    #[tokio::test]
    async fn remote_source_is_registered_and_polled() {
        let api = FakeApi {
            running_tasks: 1,
            ..FakeApi::default()
        }
        .with_statuses(vec![Ok(TaskStatusResponse {
            status: UploadStatus::Completed,
            subtasks: Vec::new(),
        })]);
        let request = UploadRequest {
            files: Vec::new(),
            remote_source: Some("https://example.org/iiif/manifest.json".to_string()),
        };

        let (api, listener, handle) = start(api, request);
        let session = finish(&handle).await;

        assert_eq!(api.upload_calls.load(Ordering::SeqCst), 0);
        assert_eq!(listener.count(), 1);
        assert_eq!(session.slots.len(), 1);
        assert_eq!(session.slots[0].filepart_id.as_deref(), Some("part-remote"));
        assert_eq!(session.slots[0].status, UploadStatus::Completed);
    }

    #[tokio::test]
    async fn restart_replaces_a_changed_request() {
        let api = FakeApi {
            gated_file: Some("slow".to_string()),
            ..FakeApi::default()
        };
        let request = files(vec![file("slow", 4)]);
        let (api, listener, mut handle) = start(api, request.clone());
        while api.upload_calls.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        handle.restart(request);
        tokio::task::yield_now().await;
        assert_eq!(api.init_titles.lock().unwrap().len(), 1);

        handle.restart(files(vec![file("b", 2), file("c", 2)]));
        assert_eq!(handle.snapshot().slots.len(), 2);
        assert_eq!(handle.snapshot().total_size, 4);

        let session = finish(&handle).await;
        assert_eq!(
            *api.init_titles.lock().unwrap(),
            vec!["slow".to_string(), "New document".to_string()]
        );
        assert_eq!(session.slots.len(), 2);
        assert!(session
            .slots
            .iter()
            .all(|s| s.status == UploadStatus::Completed));
        assert_eq!(listener.count(), 1);
    }

    #[tokio::test]
    async fn dropping_the_handle_stops_polling() {
        let api = FakeApi {
            running_tasks: 1,
            ..FakeApi::default()
        };
        let (api, listener, handle) = start(api, files(vec![file("a", 1)]));

        while api.poll_calls.load(Ordering::SeqCst) < 3 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        drop(handle);

        let polls = api.poll_calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(api.poll_calls.load(Ordering::SeqCst) <= polls + 1);
        assert_eq!(listener.count(), 0);
    }
}
