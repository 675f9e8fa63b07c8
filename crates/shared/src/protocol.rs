use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Multipart field carrying the XML document.
pub const RESOLVE_FIELD_FILE: &str = "xmlFile";
pub const RESOLVE_FIELD_BRANCH: &str = "branch";
pub const RESOLVE_FIELD_REPOSITORY: &str = "repository";
pub const RESOLVE_FIELD_RELATIVE_PATH: &str = "relativePath";

/// Discriminant of the completion message posted by the GitHub auth popup.
pub const GITHUB_AUTH_RESULT_TYPE: &str = "github_auth_result";
pub const GITHUB_AUTH_SUCCESS_STATUS: &str = "success";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Successful resolver payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveResponse {
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ResolveResponse {
    /// Accepts only bodies whose `data` is a non-empty string.
    pub fn from_value(body: &Value) -> Option<Self> {
        let data = body.get("data")?.as_str().filter(|data| !data.is_empty())?;
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .filter(|message| !message.is_empty())
            .map(str::to_string);
        Some(Self {
            data: data.to_string(),
            message,
        })
    }
}

/// Completion message of the GitHub authorization popup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GithubAuthResult {
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl GithubAuthResult {
    pub fn new(status: impl Into<String>, message: Option<String>) -> Self {
        Self {
            kind: GITHUB_AUTH_RESULT_TYPE.to_string(),
            status: status.into(),
            message,
        }
    }

    /// Parses a window message, returning `None` for anything not tagged as a
    /// GitHub auth result.
    pub fn from_message(message: &Value) -> Option<Self> {
        if message.get("type").and_then(Value::as_str) != Some(GITHUB_AUTH_RESULT_TYPE) {
            return None;
        }
        let status = message
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let message = message
            .get("message")
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
            .map(str::to_string);
        Some(Self {
            kind: GITHUB_AUTH_RESULT_TYPE.to_string(),
            status,
            message,
        })
    }

    pub fn is_success(&self) -> bool {
        self.status == GITHUB_AUTH_SUCCESS_STATUS
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn resolve_response_requires_string_data() {
        assert_eq!(
            ResolveResponse::from_value(&json!({"data": "<xml/>", "message": "ok"})),
            Some(ResolveResponse {
                data: "<xml/>".into(),
                message: Some("ok".into()),
            })
        );
        assert!(ResolveResponse::from_value(&json!({})).is_none());
        assert!(ResolveResponse::from_value(&json!({"data": 42})).is_none());
        assert!(ResolveResponse::from_value(&json!({"data": ""})).is_none());
    }

    #[test]
    fn github_result_ignores_untagged_messages() {
        assert!(GithubAuthResult::from_message(&json!({"status": "success"})).is_none());
        assert!(GithubAuthResult::from_message(&json!("github_auth_result")).is_none());

        let parsed = GithubAuthResult::from_message(&json!({
            "type": "github_auth_result",
            "status": "denied",
        }))
        .expect("tagged message");
        assert!(!parsed.is_success());
        assert_eq!(parsed.message, None);
    }

    #[test]
    fn sign_in_response_reads_camel_case_token() {
        let parsed: SignInResponse = serde_json::from_value(json!({
            "success": true,
            "email": "dev@example.com",
            "accessToken": "tok",
        }))
        .expect("parse");
        assert!(parsed.success);
        assert_eq!(parsed.access_token.as_deref(), Some("tok"));
    }
}
