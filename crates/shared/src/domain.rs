use serde::{Deserialize, Serialize};

/// Storage key holding the bare bearer credential.
pub const CREDENTIAL_STORAGE_KEY: &str = "access_token";
/// Storage key holding the serialized [`StoredUser`].
pub const USER_STORAGE_KEY: &str = "user";

/// Authenticated identity plus the bearer credential the backend issued for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub identity: String,
    pub credential: String,
}

impl Session {
    pub fn new(identity: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            credential: credential.into(),
        }
    }
}

/// Shape persisted under [`USER_STORAGE_KEY`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredUser {
    pub email: String,
    pub access_token: String,
}

impl From<&Session> for StoredUser {
    fn from(session: &Session) -> Self {
        Self {
            email: session.identity.clone(),
            access_token: session.credential.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    Idle,
    Loading,
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Idle,
    Connecting,
    Success,
    Error,
}
