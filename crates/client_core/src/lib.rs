//! Client core for Catalyst: session handling, the seed key upload workflow,
//! the GitHub connection popup flow and the navigation rules around them.

pub mod api;
pub mod auth;
pub mod config;
pub mod download;
pub mod navigation;
pub mod oauth;
pub mod routes;
pub mod session;
pub mod timer;
pub mod upload;

pub use api::{ApiReply, BackendApi, HttpBackend, ResolveRequest, TransportError};
pub use auth::{AuthController, SignInError, SignedIn, SignedOut};
pub use config::{load_settings, ClientSettings, Endpoints};
pub use download::{DirectorySink, DownloadArtifact, DownloadError, DownloadSink};
pub use navigation::{NavEntry, NavigationShell};
pub use oauth::{
    MessageBus, OAuthController, OAuthStatus, OAuthSubscription, PopupError, PopupFeatures,
    PopupHost, PopupWindow, WindowFrame,
};
pub use routes::{RouteDecision, RouteGuard, Section, View};
pub use session::{
    FileSessionStorage, MemorySessionStorage, PersistedSession, SessionContext, SessionStorage,
    SessionStorageError,
};
pub use upload::{
    SelectedFile, SubmitOutcome, UploadController, UploadEvent, UploadSnapshot, UploadStatus,
};
