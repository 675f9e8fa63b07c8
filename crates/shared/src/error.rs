use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error body the backend returns alongside non-success responses.
///
/// Both fields are optional; callers pick whichever the endpoint fills in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorBody {
    /// Reads `error`/`message` from an arbitrary JSON body, ignoring non-string
    /// and empty values.
    pub fn from_value(body: Option<&Value>) -> Self {
        let text = |key: &str| {
            body.and_then(|value| value.get(key))
                .and_then(Value::as_str)
                .filter(|text| !text.is_empty())
                .map(str::to_string)
        };
        Self {
            error: text("error"),
            message: text("message"),
        }
    }

    /// Field-specific error first, then the generic message.
    pub fn error_then_message(&self) -> Option<&str> {
        self.error.as_deref().or(self.message.as_deref())
    }

    /// Generic message first, then the field-specific error.
    pub fn message_then_error(&self) -> Option<&str> {
        self.message.as_deref().or(self.error.as_deref())
    }
}
