//! Sign-in and sign-out: the only writers of the [`SessionContext`].

use std::sync::Arc;

use shared::{
    domain::Session,
    protocol::{SignInRequest, SignInResponse},
};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    api::BackendApi,
    routes::{HOME_PATH, SIGN_IN_PATH},
    session::{SessionContext, SessionStorageError},
};

pub const MSG_CONNECTION_FAILURE: &str =
    "An error occurred connecting to the server. Please try again later.";
pub const MSG_BLANK_CREDENTIALS: &str = "Please enter your email and password.";

#[derive(Debug, Error)]
pub enum SignInError {
    #[error("{}", MSG_BLANK_CREDENTIALS)]
    BlankCredentials,
    /// Backend answered but refused the sign-in.
    #[error("{0}")]
    Rejected(String),
    #[error("{}", MSG_CONNECTION_FAILURE)]
    Unreachable,
    #[error("failed to persist session: {0}")]
    Storage(#[from] SessionStorageError),
}

impl SignInError {
    /// Text shown next to the sign-in form.
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedIn {
    pub identity: String,
    pub redirect_to: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedOut {
    /// Whether the backend acknowledged the sign-out; informational only.
    pub acknowledged: bool,
    pub redirect_to: &'static str,
}

#[derive(Clone)]
pub struct AuthController {
    api: Arc<dyn BackendApi>,
    session: SessionContext,
}

impl AuthController {
    pub fn new(api: Arc<dyn BackendApi>, session: SessionContext) -> Self {
        Self { api, session }
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<SignedIn, SignInError> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(SignInError::BlankCredentials);
        }

        let reply = self
            .api
            .sign_in(&SignInRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .await
            .map_err(|err| {
                warn!(error = %err, "sign-in request failed");
                SignInError::Unreachable
            })?;

        let parsed = reply
            .body
            .as_ref()
            .and_then(|body| serde_json::from_value::<SignInResponse>(body.clone()).ok());

        if !reply.is_success() {
            let message = parsed
                .and_then(|parsed| parsed.message)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| format!("Sign-in failed (Status: {})", reply.status));
            info!(status = reply.status, "sign-in rejected");
            return Err(SignInError::Rejected(message));
        }

        let Some(parsed) = parsed else {
            warn!(status = reply.status, "sign-in response was not readable");
            return Err(SignInError::Unreachable);
        };

        match (parsed.success, parsed.email, parsed.access_token) {
            (true, Some(identity), Some(credential)) if !credential.is_empty() => {
                self.session
                    .establish(Session::new(identity.clone(), credential))
                    .await?;
                info!(identity = %identity, "signed in");
                Ok(SignedIn {
                    identity,
                    redirect_to: HOME_PATH,
                })
            }
            _ => Err(SignInError::Rejected(
                parsed
                    .message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "Sign-in failed".to_string()),
            )),
        }
    }

    /// Clears the local session, then tells the backend on a best-effort basis.
    pub async fn sign_out(&self) -> SignedOut {
        let credential = self.session.credential();
        if let Err(err) = self.session.clear().await {
            warn!(error = %err, "failed to clear persisted session");
        }

        let acknowledged = match self.api.sign_out(credential.as_deref()).await {
            Ok(reply) if reply.is_success() => {
                info!("backend acknowledged sign-out");
                true
            }
            Ok(reply) => {
                warn!(status = reply.status, "backend rejected sign-out");
                false
            }
            Err(err) => {
                warn!(error = %err, "sign-out request failed");
                false
            }
        };

        SignedOut {
            acknowledged,
            redirect_to: SIGN_IN_PATH,
        }
    }
}

#[cfg(test)]
#[path = "tests/auth_tests.rs"]
mod tests;
