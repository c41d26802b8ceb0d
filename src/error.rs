use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// Failures raised by commands before or while resolving identifiers.
///
/// The `Display` text is what the user sees.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{message} Found: {}.", ids.join(", "))]
    MultipleFound { message: String, ids: Vec<String> },

    #[error("{0}")]
    Failed(String),
}

impl CommandError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// A non-success response from Graph, SharePoint or the identity platform.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    /// Builds the error from a raw response body, extracting the most specific message available.
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        let message = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|json| extract_message(&json))
            .unwrap_or_else(|| {
                if body.trim().is_empty() {
                    status.to_string()
                } else {
                    body.to_string()
                }
            });

        Self { status, message }
    }
}

fn extract_message(json: &Value) -> Option<String> {
    let error = json.get("error");

    // Graph
    if let Some(message) = error
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
    {
        return Some(message.to_string());
    }

    // SharePoint verbose/nometadata payloads
    let odata = error
        .and_then(|e| e.get("odata.error"))
        .or_else(|| json.get("odata.error"));
    if let Some(message) = odata
        .and_then(|e| e.pointer("/message/value"))
        .and_then(Value::as_str)
    {
        return Some(message.to_string());
    }

    // Identity platform
    json.get("error_description")
        .and_then(Value::as_str)
        .map(str::to_string)
}
