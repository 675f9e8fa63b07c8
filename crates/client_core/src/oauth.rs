//! GitHub connection flow driven through an authorization popup.
//!
//! A started episode owns one [`OAuthSubscription`]: a single task that both
//! listens on the [`MessageBus`] for the completion message and polls the
//! popup's closed flag. Whichever fires first settles the episode and the task
//! ends, taking the listener with it.

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use serde_json::Value;
use shared::{domain::ConnectionState, protocol::GithubAuthResult};
use thiserror::Error;
use tokio::{
    runtime::Handle,
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, info, warn};

use crate::timer::runtime_handle;

pub const POPUP_NAME: &str = "githubAuthPopup";
pub const POPUP_WIDTH: i32 = 600;
pub const POPUP_HEIGHT: i32 = 700;
pub const DEFAULT_POPUP_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub const MSG_CONFIG_ERROR: &str = "Configuration error: Cannot initiate GitHub connection.";
pub const MSG_POPUP_BLOCKED: &str = "Popup blocked! Please allow popups for this site.";
pub const MSG_REDIRECTING: &str = "Redirecting to GitHub for authorization...";
pub const MSG_CONNECTED: &str = "Successfully connected to GitHub!";
pub const MSG_CONNECTION_FAILED: &str = "GitHub connection failed: Unknown error";
pub const MSG_CANCELLED: &str = "Connection process cancelled.";

/// Window-level message channel shared by the parent frame and its popups.
#[derive(Clone)]
pub struct MessageBus {
    sender: broadcast::Sender<Value>,
}

impl MessageBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(16);
        Self { sender }
    }

    /// Returns how many listeners received the message.
    pub fn post(&self, message: Value) -> usize {
        self.sender.send(message).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Value> {
        self.sender.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Screen rectangle of the parent window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowFrame {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopupFeatures {
    pub width: i32,
    pub height: i32,
    pub left: i32,
    pub top: i32,
}

impl PopupFeatures {
    pub fn centered_on(parent: WindowFrame) -> Self {
        Self {
            width: POPUP_WIDTH,
            height: POPUP_HEIGHT,
            left: parent.left + (parent.width - POPUP_WIDTH) / 2,
            top: parent.top + (parent.height - POPUP_HEIGHT) / 2,
        }
    }
}

impl fmt::Display for PopupFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "width={},height={},left={},top={},resizable=yes,scrollbars=yes",
            self.width, self.height, self.left, self.top
        )
    }
}

#[derive(Debug, Error)]
pub enum PopupError {
    #[error("popup blocked")]
    Blocked,
    #[error("popup unavailable: {0}")]
    Unavailable(String),
}

pub trait PopupWindow: Send + Sync {
    fn is_closed(&self) -> bool;
    fn focus(&self);
}

/// Windowing seam: opens named child windows next to a parent frame.
pub trait PopupHost: Send + Sync {
    fn parent_frame(&self) -> WindowFrame;

    fn open(
        &self,
        url: &str,
        name: &str,
        features: &PopupFeatures,
    ) -> Result<Arc<dyn PopupWindow>, PopupError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OAuthStatus {
    Idle { message: String },
    Connecting { message: String },
    Success { message: String },
    Error { message: String },
}

impl OAuthStatus {
    pub fn idle() -> Self {
        Self::Idle {
            message: String::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        match self {
            Self::Idle { .. } => ConnectionState::Idle,
            Self::Connecting { .. } => ConnectionState::Connecting,
            Self::Success { .. } => ConnectionState::Success,
            Self::Error { .. } => ConnectionState::Error,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Idle { message }
            | Self::Connecting { message }
            | Self::Success { message }
            | Self::Error { message } => message,
        }
    }

    fn from_result(result: &GithubAuthResult) -> Self {
        if result.is_success() {
            Self::Success {
                message: result
                    .message
                    .clone()
                    .unwrap_or_else(|| MSG_CONNECTED.to_string()),
            }
        } else {
            Self::Error {
                message: result
                    .message
                    .clone()
                    .unwrap_or_else(|| MSG_CONNECTION_FAILED.to_string()),
            }
        }
    }
}

/// Message listener plus popup poll for one connection episode.
///
/// Closing or dropping the handle stops both.
pub struct OAuthSubscription {
    task: JoinHandle<()>,
}

impl OAuthSubscription {
    pub fn close(&self) {
        self.task.abort();
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for OAuthSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct OAuthInner {
    status: OAuthStatus,
    episode: u64,
}

fn lock_inner(shared: &Mutex<OAuthInner>) -> MutexGuard<'_, OAuthInner> {
    shared
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Episode tasks run on the tokio runtime current at construction, so
/// [`OAuthController::start`] may be called from a non-runtime thread.
pub struct OAuthController {
    shared: Arc<Mutex<OAuthInner>>,
    runtime: Option<Handle>,
    host: Arc<dyn PopupHost>,
    bus: MessageBus,
    start_url: Option<String>,
    poll_interval: Duration,
    events: broadcast::Sender<OAuthStatus>,
    subscription: Mutex<Option<OAuthSubscription>>,
}

impl OAuthController {
    pub fn new(
        host: Arc<dyn PopupHost>,
        bus: MessageBus,
        start_url: Option<String>,
        poll_interval: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            shared: Arc::new(Mutex::new(OAuthInner {
                status: OAuthStatus::idle(),
                episode: 0,
            })),
            runtime: Handle::try_current().ok(),
            host,
            bus,
            start_url: start_url.filter(|url| !url.trim().is_empty()),
            poll_interval: poll_interval.max(Duration::from_millis(1)),
            events,
            subscription: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OAuthStatus> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> OAuthStatus {
        lock_inner(&self.shared).status.clone()
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn subscription_active(&self) -> bool {
        self.subscription_slot()
            .as_ref()
            .is_some_and(OAuthSubscription::is_active)
    }

    /// Opens the authorization popup and starts listening for its result.
    pub fn start(&self) -> OAuthStatus {
        let mut inner = lock_inner(&self.shared);
        if matches!(inner.status, OAuthStatus::Connecting { .. }) {
            debug!("connection already in progress");
            return inner.status.clone();
        }
        if let Some(previous) = self.subscription_slot().take() {
            previous.close();
        }

        let Some(url) = self.start_url.as_deref() else {
            warn!("github auth start url is not configured");
            return self.publish(&mut inner, OAuthStatus::Error {
                message: MSG_CONFIG_ERROR.to_string(),
            });
        };

        let Some(runtime) = runtime_handle(self.runtime.as_ref()) else {
            warn!("no tokio runtime available to watch the authorization popup");
            return self.publish(&mut inner, OAuthStatus::Error {
                message: MSG_CONNECTION_FAILED.to_string(),
            });
        };

        let features = PopupFeatures::centered_on(self.host.parent_frame());
        let popup = match self.host.open(url, POPUP_NAME, &features) {
            Ok(popup) if !popup.is_closed() => popup,
            Ok(_) => {
                warn!("authorization popup closed immediately");
                return self.blocked(&mut inner);
            }
            Err(err) => {
                warn!(error = %err, "authorization popup could not be opened");
                return self.blocked(&mut inner);
            }
        };

        let receiver = self.bus.subscribe();
        let status = self.publish(&mut inner, OAuthStatus::Connecting {
            message: MSG_REDIRECTING.to_string(),
        });
        popup.focus();
        info!(episode = inner.episode, "github authorization started");

        let task = runtime.spawn(watch_episode(
            Arc::clone(&self.shared),
            self.events.clone(),
            receiver,
            popup,
            self.poll_interval,
            inner.episode,
        ));
        *self.subscription_slot() = Some(OAuthSubscription { task });
        status
    }

    fn blocked(&self, inner: &mut OAuthInner) -> OAuthStatus {
        self.publish(inner, OAuthStatus::Error {
            message: MSG_POPUP_BLOCKED.to_string(),
        })
    }

    fn publish(&self, inner: &mut OAuthInner, status: OAuthStatus) -> OAuthStatus {
        settle(inner, &self.events, status)
    }

    fn subscription_slot(&self) -> MutexGuard<'_, Option<OAuthSubscription>> {
        self.subscription
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn settle(
    inner: &mut OAuthInner,
    events: &broadcast::Sender<OAuthStatus>,
    status: OAuthStatus,
) -> OAuthStatus {
    inner.episode += 1;
    inner.status = status.clone();
    let _ = events.send(status.clone());
    status
}

async fn watch_episode(
    shared: Arc<Mutex<OAuthInner>>,
    events: broadcast::Sender<OAuthStatus>,
    mut receiver: broadcast::Receiver<Value>,
    popup: Arc<dyn PopupWindow>,
    poll_interval: Duration,
    episode: u64,
) {
    let mut poll = tokio::time::interval_at(Instant::now() + poll_interval, poll_interval);
    loop {
        tokio::select! {
            received = receiver.recv() => match received {
                Ok(message) => {
                    let Some(result) = GithubAuthResult::from_message(&message) else {
                        debug!("ignoring untagged window message");
                        continue;
                    };
                    finish(&shared, &events, episode, OAuthStatus::from_result(&result));
                    return;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "window messages dropped while connecting");
                }
                Err(RecvError::Closed) => return,
            },
            _ = poll.tick() => {
                if popup.is_closed() {
                    info!("authorization popup closed by user");
                    finish(&shared, &events, episode, OAuthStatus::Idle {
                        message: MSG_CANCELLED.to_string(),
                    });
                    return;
                }
                if lock_inner(&shared).episode != episode {
                    return;
                }
            }
        }
    }
}

fn finish(
    shared: &Mutex<OAuthInner>,
    events: &broadcast::Sender<OAuthStatus>,
    episode: u64,
    status: OAuthStatus,
) {
    let mut inner = lock_inner(shared);
    if inner.episode != episode || !matches!(inner.status, OAuthStatus::Connecting { .. }) {
        return;
    }
    info!(state = ?status.state(), "github authorization finished");
    settle(&mut inner, events, status);
}

#[cfg(test)]
#[path = "tests/oauth_tests.rs"]
mod tests;
