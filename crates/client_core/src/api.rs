//! REST seam to the Catalyst backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Client, RequestBuilder,
};
use serde_json::Value;
use shared::protocol::{
    SignInRequest, RESOLVE_FIELD_BRANCH, RESOLVE_FIELD_FILE, RESOLVE_FIELD_RELATIVE_PATH,
    RESOLVE_FIELD_REPOSITORY,
};
use thiserror::Error;
use tracing::warn;

use crate::config::Endpoints;

/// Used for uploads whose declared type is missing or unparseable.
pub const DEFAULT_XML_MEDIA_TYPE: &str = "text/xml";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Status code plus whatever JSON the backend sent back.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiReply {
    pub status: u16,
    /// `None` when the body was empty or not JSON.
    pub body: Option<Value>,
}

impl ApiReply {
    pub fn new(status: u16, body: Option<Value>) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The request left but nothing came back.
    #[error("no response from backend: {0}")]
    NoResponse(String),
    #[error("{0}")]
    Request(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_request() {
            Self::NoResponse(err.to_string())
        } else {
            Self::Request(err.to_string())
        }
    }
}

/// XML document plus repository coordinates, ready to submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveRequest {
    pub file_name: String,
    pub media_type: String,
    pub content: Vec<u8>,
    pub repository_url: String,
    pub branch_name: String,
    pub relative_file_path: String,
}

#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn sign_in(&self, request: &SignInRequest) -> Result<ApiReply, TransportError>;
    async fn sign_out(&self, credential: Option<&str>) -> Result<ApiReply, TransportError>;
    async fn resolve(
        &self,
        credential: Option<&str>,
        request: ResolveRequest,
    ) -> Result<ApiReply, TransportError>;
}

pub struct HttpBackend {
    http: Client,
    endpoints: Endpoints,
}

impl HttpBackend {
    pub fn new(endpoints: Endpoints) -> Self {
        let http = Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|err| {
                warn!(error = %err, "falling back to default http client");
                Client::new()
            });
        Self::with_client(http, endpoints)
    }

    pub fn with_client(http: Client, endpoints: Endpoints) -> Self {
        Self { http, endpoints }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    async fn send(request: RequestBuilder) -> Result<ApiReply, TransportError> {
        let res = request.send().await?;
        let status = res.status().as_u16();
        let raw = res.text().await?;
        let body = if raw.trim().is_empty() {
            None
        } else {
            serde_json::from_str::<Value>(&raw).ok()
        };
        Ok(ApiReply { status, body })
    }
}

/// Declared type when it parses, otherwise [`DEFAULT_XML_MEDIA_TYPE`].
fn xml_part(content: Vec<u8>, file_name: String, media_type: &str) -> Result<Part, TransportError> {
    let declared = media_type.trim();
    if !declared.is_empty() {
        match Part::bytes(content.clone())
            .file_name(file_name.clone())
            .mime_str(declared)
        {
            Ok(part) => return Ok(part),
            Err(err) => warn!(media_type = declared, error = %err, "unusable media type for upload"),
        }
    }
    Part::bytes(content)
        .file_name(file_name)
        .mime_str(DEFAULT_XML_MEDIA_TYPE)
        .map_err(|err| TransportError::Request(err.to_string()))
}

fn with_bearer(request: RequestBuilder, credential: Option<&str>) -> RequestBuilder {
    match credential {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn sign_in(&self, request: &SignInRequest) -> Result<ApiReply, TransportError> {
        let builder = self
            .http
            .post(&self.endpoints.sign_in)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(request);
        Self::send(builder).await
    }

    async fn sign_out(&self, credential: Option<&str>) -> Result<ApiReply, TransportError> {
        let builder = with_bearer(self.http.post(&self.endpoints.sign_out), credential);
        Self::send(builder).await
    }

    async fn resolve(
        &self,
        credential: Option<&str>,
        request: ResolveRequest,
    ) -> Result<ApiReply, TransportError> {
        let file = xml_part(request.content, request.file_name, &request.media_type)?;
        let form = Form::new()
            .part(RESOLVE_FIELD_FILE, file)
            .text(RESOLVE_FIELD_BRANCH, request.branch_name)
            .text(RESOLVE_FIELD_REPOSITORY, request.repository_url)
            .text(RESOLVE_FIELD_RELATIVE_PATH, request.relative_file_path);

        let builder = with_bearer(self.http.post(&self.endpoints.resolve), credential).multipart(form);
        Self::send(builder).await
    }
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
