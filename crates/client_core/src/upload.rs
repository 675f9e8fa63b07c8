//! Upload workflow: XML selection, repository coordinates, submission to the
//! seed key resolver, and the transient status lifecycle around it.
//!
//! Validation runs before the controller enters `Loading`, so an incomplete form
//! never produces a request. `Success` and `Error` are transient: each arms a
//! visible countdown that returns the controller to `Idle`.

use std::{
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use shared::{
    domain::UploadState,
    error::ErrorBody,
    protocol::ResolveResponse,
};
use tokio::{sync::broadcast, time::Instant};
use tracing::{debug, info, warn};

use crate::{
    api::{ApiReply, BackendApi, ResolveRequest, TransportError, DEFAULT_XML_MEDIA_TYPE},
    download::{DownloadArtifact, DownloadSink},
    session::SessionContext,
    timer::DelayedTask,
};

pub const NO_FILE_LABEL: &str = "No XML file selected";
pub const INVALID_FILE_LABEL: &str = "Invalid file type (XML only)";
pub const DEFAULT_STATUS_CLEAR_DELAY_SECS: u64 = 5;
const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

pub const MSG_INVALID_FILE_TYPE: &str = "Please select an XML file (.xml).";
pub const MSG_MISSING_FILE: &str = "Please select an XML file.";
pub const MSG_MISSING_REPOSITORY: &str = "Please enter a repository URL.";
pub const MSG_MISSING_BRANCH: &str = "Please enter a branch name.";
pub const MSG_MISSING_PATH: &str = "Please enter the relative file path.";
pub const MSG_RESOLVING: &str = "Resolving placeholders...";
pub const MSG_UNEXPECTED_BODY: &str = "Received unexpected data structure from server.";
pub const MSG_NO_RESPONSE: &str = "No response from server. Check network or backend status.";
pub const MSG_UNKNOWN_FAILURE: &str = "An unknown processing error occurred.";
pub const MSG_REQUEST_ABANDONED: &str = "The resolve request was cancelled before it completed.";
pub const MSG_NOTHING_TO_DOWNLOAD: &str = "No resolved data available to download.";
pub const MSG_DOWNLOAD_FAILED: &str = "Could not initiate download.";

const XML_MEDIA_TYPES: &[&str] = &["text/xml", "application/xml"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub name: String,
    pub media_type: String,
    pub content: Vec<u8>,
}

impl SelectedFile {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            content,
        }
    }

    /// Either the declared media type or the name extension must say XML.
    pub fn is_xml(&self) -> bool {
        let media_type = self
            .media_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        XML_MEDIA_TYPES.contains(&media_type.as_str())
            || self.name.to_ascii_lowercase().ends_with(".xml")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadStatus {
    Idle,
    Loading { message: String },
    Success { message: String, document: String },
    Error { message: String },
}

impl UploadStatus {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn state(&self) -> UploadState {
        match self {
            Self::Idle => UploadState::Idle,
            Self::Loading { .. } => UploadState::Loading,
            Self::Success { .. } => UploadState::Success,
            Self::Error { .. } => UploadState::Error,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Idle => "",
            Self::Loading { message } | Self::Success { message, .. } | Self::Error { message } => {
                message
            }
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success { .. } | Self::Error { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadEvent {
    StatusChanged(UploadStatus),
    Countdown(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Another submit was already in flight.
    Ignored,
    /// The form was incomplete; nothing was sent.
    Invalid,
    Resolved,
    Failed,
}

/// Render-ready view of the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSnapshot {
    pub status: UploadStatus,
    pub countdown_seconds: u64,
    pub file_label: String,
    pub has_file: bool,
    pub repository_url: String,
    pub branch_name: String,
    pub relative_file_path: String,
    pub in_flight: bool,
    pub can_submit: bool,
    pub can_preview_or_download: bool,
    pub show_preview: bool,
    pub resolved_document: Option<String>,
}

impl UploadSnapshot {
    pub fn state(&self) -> UploadState {
        self.status.state()
    }
}

struct UploadForm {
    file: Option<SelectedFile>,
    file_label: String,
    repository_url: String,
    branch_name: String,
    relative_file_path: String,
}

impl UploadForm {
    fn new() -> Self {
        Self {
            file: None,
            file_label: NO_FILE_LABEL.to_string(),
            repository_url: String::new(),
            branch_name: String::new(),
            relative_file_path: String::new(),
        }
    }

    fn first_missing(&self) -> Option<&'static str> {
        if self.file.is_none() {
            Some(MSG_MISSING_FILE)
        } else if is_blank(&self.repository_url) {
            Some(MSG_MISSING_REPOSITORY)
        } else if is_blank(&self.branch_name) {
            Some(MSG_MISSING_BRANCH)
        } else if is_blank(&self.relative_file_path) {
            Some(MSG_MISSING_PATH)
        } else {
            None
        }
    }

    fn to_request(&self) -> Option<ResolveRequest> {
        let file = self.file.as_ref()?;
        Some(ResolveRequest {
            file_name: file.name.clone(),
            media_type: file.media_type.clone(),
            content: file.content.clone(),
            repository_url: self.repository_url.trim().to_string(),
            branch_name: self.branch_name.trim().to_string(),
            relative_file_path: self.relative_file_path.trim().to_string(),
        })
    }

    /// Everything but the label, which later names the download.
    fn clear_inputs(&mut self) {
        self.file = None;
        self.repository_url.clear();
        self.branch_name.clear();
        self.relative_file_path.clear();
    }
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

struct UploadInner {
    form: UploadForm,
    status: UploadStatus,
    /// Bumped on every status change; countdown tasks compare against it.
    status_epoch: u64,
    /// Bumped on every submit and reset; stale completions compare against it.
    request_seq: u64,
    in_flight: bool,
    countdown_seconds: u64,
    resolved_document: Option<String>,
    show_preview: bool,
}

impl UploadInner {
    fn new() -> Self {
        Self {
            form: UploadForm::new(),
            status: UploadStatus::Idle,
            status_epoch: 0,
            request_seq: 0,
            in_flight: false,
            countdown_seconds: 0,
            resolved_document: None,
            show_preview: false,
        }
    }

    fn can_preview_or_download(&self) -> bool {
        !self.in_flight
            && matches!(self.status, UploadStatus::Success { .. })
            && self.resolved_document.is_some()
    }
}

fn lock_inner(shared: &Mutex<UploadInner>) -> MutexGuard<'_, UploadInner> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Maps a resolver round trip to either the resolved payload or the message the
/// user should see.
pub fn classify_resolve_result(
    result: Result<ApiReply, TransportError>,
) -> Result<ResolveResponse, String> {
    match result {
        Ok(reply) if reply.is_success() => {
            if reply.status == 200 {
                if let Some(parsed) = reply.body.as_ref().and_then(ResolveResponse::from_value) {
                    return Ok(parsed);
                }
            }
            Err(ErrorBody::from_value(reply.body.as_ref())
                .message_then_error()
                .unwrap_or(MSG_UNEXPECTED_BODY)
                .to_string())
        }
        Ok(reply) => Err(ErrorBody::from_value(reply.body.as_ref())
            .error_then_message()
            .map(str::to_string)
            .unwrap_or_else(|| format!("Server Error ({})", reply.status))),
        Err(TransportError::NoResponse(_)) => Err(MSG_NO_RESPONSE.to_string()),
        Err(TransportError::Request(text)) if text.trim().is_empty() => {
            Err(MSG_UNKNOWN_FAILURE.to_string())
        }
        Err(TransportError::Request(text)) => Err(text),
    }
}

pub struct UploadController {
    shared: Arc<Mutex<UploadInner>>,
    api: Arc<dyn BackendApi>,
    session: SessionContext,
    events: broadcast::Sender<UploadEvent>,
    clear_timer: DelayedTask,
    clear_delay_secs: u64,
}

impl UploadController {
    pub fn new(api: Arc<dyn BackendApi>, session: SessionContext) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            shared: Arc::new(Mutex::new(UploadInner::new())),
            api,
            session,
            events,
            clear_timer: DelayedTask::new(),
            clear_delay_secs: DEFAULT_STATUS_CLEAR_DELAY_SECS,
        }
    }

    pub fn with_clear_delay(mut self, delay: Duration) -> Self {
        self.clear_delay_secs = delay.as_secs().max(1);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.events.subscribe()
    }

    pub fn status(&self) -> UploadStatus {
        self.lock().status.clone()
    }

    pub fn snapshot(&self) -> UploadSnapshot {
        let inner = self.lock();
        let has_file = inner.form.file.is_some();
        UploadSnapshot {
            status: inner.status.clone(),
            countdown_seconds: inner.countdown_seconds,
            file_label: inner.form.file_label.clone(),
            has_file,
            repository_url: inner.form.repository_url.clone(),
            branch_name: inner.form.branch_name.clone(),
            relative_file_path: inner.form.relative_file_path.clone(),
            in_flight: inner.in_flight,
            can_submit: !inner.in_flight && inner.form.first_missing().is_none(),
            can_preview_or_download: inner.can_preview_or_download(),
            show_preview: inner.show_preview,
            resolved_document: inner.resolved_document.clone(),
        }
    }

    /// Returns `false` when the selection was ignored because a request is in
    /// flight.
    pub fn select_file(&self, file: Option<SelectedFile>) -> bool {
        let mut inner = self.lock();
        if inner.in_flight {
            debug!("ignoring file selection while a resolve request is in flight");
            return false;
        }

        inner.resolved_document = None;
        inner.show_preview = false;

        let status = match file {
            Some(mut file) if file.is_xml() => {
                if file.media_type.trim().is_empty() {
                    file.media_type = DEFAULT_XML_MEDIA_TYPE.to_string();
                }
                debug!(file = %file.name, bytes = file.content.len(), "xml file selected");
                inner.form.file_label = file.name.clone();
                inner.form.relative_file_path = file.name.clone();
                inner.form.file = Some(file);
                UploadStatus::Idle
            }
            Some(file) => {
                warn!(file = %file.name, media_type = %file.media_type, "rejected non-xml file");
                inner.form.file = None;
                inner.form.file_label = INVALID_FILE_LABEL.to_string();
                inner.form.relative_file_path.clear();
                UploadStatus::error(MSG_INVALID_FILE_TYPE)
            }
            None => {
                inner.form.file = None;
                inner.form.file_label = NO_FILE_LABEL.to_string();
                inner.form.relative_file_path.clear();
                UploadStatus::Idle
            }
        };
        self.transition(&mut inner, status);
        true
    }

    pub fn set_repository_url(&self, value: impl Into<String>) -> bool {
        self.edit_field(|form| form.repository_url = value.into())
    }

    pub fn set_branch_name(&self, value: impl Into<String>) -> bool {
        self.edit_field(|form| form.branch_name = value.into())
    }

    pub fn set_relative_file_path(&self, value: impl Into<String>) -> bool {
        self.edit_field(|form| form.relative_file_path = value.into())
    }

    fn edit_field(&self, edit: impl FnOnce(&mut UploadForm)) -> bool {
        let mut inner = self.lock();
        if inner.in_flight {
            return false;
        }
        edit(&mut inner.form);
        true
    }

    pub async fn submit(&self) -> SubmitOutcome {
        let (request, seq) = {
            let mut inner = self.lock();
            if inner.in_flight {
                debug!("submit ignored; a resolve request is already in flight");
                return SubmitOutcome::Ignored;
            }
            if let Some(message) = inner.form.first_missing() {
                self.transition(&mut inner, UploadStatus::error(message));
                return SubmitOutcome::Invalid;
            }
            let Some(request) = inner.form.to_request() else {
                self.transition(&mut inner, UploadStatus::error(MSG_MISSING_FILE));
                return SubmitOutcome::Invalid;
            };

            inner.show_preview = false;
            inner.resolved_document = None;
            inner.in_flight = true;
            inner.request_seq += 1;
            let seq = inner.request_seq;
            self.transition(
                &mut inner,
                UploadStatus::Loading {
                    message: MSG_RESOLVING.to_string(),
                },
            );
            (request, seq)
        };

        info!(
            file = %request.file_name,
            repository = %request.repository_url,
            branch = %request.branch_name,
            path = %request.relative_file_path,
            "submitting xml for seed key resolution"
        );

        let mut guard = InFlightGuard {
            controller: self,
            seq,
            settled: false,
        };
        let credential = self.session.credential();
        let result = self.api.resolve(credential.as_deref(), request).await;
        guard.settled = true;

        let mut inner = self.lock();
        if inner.request_seq != seq {
            debug!(seq, "discarding completion of a superseded resolve request");
            return SubmitOutcome::Ignored;
        }
        inner.in_flight = false;

        match classify_resolve_result(result) {
            Ok(resolved) => {
                let message = resolved
                    .message
                    .unwrap_or_else(|| format!("Successfully resolved {}", inner.form.file_label));
                info!(bytes = resolved.data.len(), "seed keys resolved");
                inner.resolved_document = Some(resolved.data.clone());
                inner.form.clear_inputs();
                self.transition(
                    &mut inner,
                    UploadStatus::Success {
                        message,
                        document: resolved.data,
                    },
                );
                SubmitOutcome::Resolved
            }
            Err(message) => {
                warn!(%message, "seed key resolution failed");
                inner.resolved_document = None;
                self.transition(&mut inner, UploadStatus::error(message));
                SubmitOutcome::Failed
            }
        }
    }

    /// Flips the preview flag; returns the new value, or `false` when there is
    /// nothing to preview.
    pub fn toggle_preview(&self) -> bool {
        let mut inner = self.lock();
        if !inner.can_preview_or_download() {
            return false;
        }
        inner.show_preview = !inner.show_preview;
        inner.show_preview
    }

    pub fn download(&self, sink: &dyn DownloadSink) -> Option<PathBuf> {
        let artifact = {
            let mut inner = self.lock();
            let available = inner.can_preview_or_download();
            let Some(document) = inner.resolved_document.clone().filter(|_| available) else {
                warn!("download requested without a resolved document");
                self.transition(&mut inner, UploadStatus::error(MSG_NOTHING_TO_DOWNLOAD));
                return None;
            };
            DownloadArtifact::resolved(&inner.form.file_label, document)
        };

        match sink.save(&artifact) {
            Ok(path) => {
                info!(file = %artifact.file_name, "resolved document saved");
                Some(path)
            }
            Err(err) => {
                warn!(error = %err, "failed to save resolved document");
                let mut inner = self.lock();
                self.transition(&mut inner, UploadStatus::error(MSG_DOWNLOAD_FAILED));
                None
            }
        }
    }

    /// Back to a pristine form; a request still in flight will be discarded.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.request_seq += 1;
        inner.in_flight = false;
        inner.form = UploadForm::new();
        inner.resolved_document = None;
        inner.show_preview = false;
        self.transition(&mut inner, UploadStatus::Idle);
    }

    fn lock(&self) -> MutexGuard<'_, UploadInner> {
        lock_inner(&self.shared)
    }

    fn transition(&self, inner: &mut UploadInner, status: UploadStatus) {
        inner.status_epoch += 1;
        inner.status = status.clone();

        if status.is_terminal() {
            inner.countdown_seconds = self.clear_delay_secs;
            self.clear_timer.arm(run_countdown(
                Arc::clone(&self.shared),
                self.events.clone(),
                inner.status_epoch,
            ));
        } else {
            inner.countdown_seconds = 0;
            self.clear_timer.cancel();
        }

        let _ = self.events.send(UploadEvent::StatusChanged(status));
    }

    fn abandon(&self, seq: u64) {
        let mut inner = self.lock();
        if inner.request_seq != seq || !inner.in_flight {
            return;
        }
        warn!(seq, "resolve request dropped before completion");
        inner.in_flight = false;
        self.transition(&mut inner, UploadStatus::error(MSG_REQUEST_ABANDONED));
    }
}

/// Turns a dropped submit future into an `Error` instead of a stuck `Loading`.
struct InFlightGuard<'a> {
    controller: &'a UploadController,
    seq: u64,
    settled: bool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.controller.abandon(self.seq);
        }
    }
}

async fn run_countdown(
    shared: Arc<Mutex<UploadInner>>,
    events: broadcast::Sender<UploadEvent>,
    epoch: u64,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + COUNTDOWN_TICK, COUNTDOWN_TICK);
    loop {
        ticker.tick().await;
        if !countdown_step(&shared, &events, epoch) {
            return;
        }
    }
}

/// Returns `false` once the countdown is over or no longer owns the status.
fn countdown_step(
    shared: &Mutex<UploadInner>,
    events: &broadcast::Sender<UploadEvent>,
    epoch: u64,
) -> bool {
    let mut inner = lock_inner(shared);
    if inner.status_epoch != epoch {
        return false;
    }

    inner.countdown_seconds = inner.countdown_seconds.saturating_sub(1);
    if inner.countdown_seconds > 0 {
        let _ = events.send(UploadEvent::Countdown(inner.countdown_seconds));
        return true;
    }

    debug!("status auto-cleared");
    inner.status_epoch += 1;
    inner.status = UploadStatus::Idle;
    inner.form.file_label = NO_FILE_LABEL.to_string();
    let _ = events.send(UploadEvent::Countdown(0));
    let _ = events.send(UploadEvent::StatusChanged(UploadStatus::Idle));
    false
}

#[cfg(test)]
#[path = "tests/upload_tests.rs"]
mod tests;
