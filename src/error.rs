//! Error Types
//!
//! One error enum for the library. Upstream API failures keep the Graph API
//! error code and subcode so the delivery policy can recognise a closed
//! messaging window without string matching.

use serde::Deserialize;
use thiserror::Error;

/// Graph API code for "Re-engagement message": more than 24 hours since the
/// customer last replied.
pub const WINDOW_CLOSED_CODE: i64 = 131_047;

/// Pre-2022 On-Premises code carrying the same meaning, still returned by
/// some accounts.
pub const LEGACY_WINDOW_CLOSED_CODE: i64 = 470;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Non-2xx response from the messaging platform or the LLM provider.
    #[error("{service} API error (HTTP {status}): {error}")]
    Api {
        service: &'static str,
        status: u16,
        error: ApiError,
    },

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("media error: {0}")]
    Media(String),

    #[error("LLM provider not configured")]
    LlmUnavailable,

    #[error("empty response from {0}")]
    EmptyResponse(&'static str),
}

impl Error {
    /// True when the platform refused free text because the 24h window is closed.
    pub fn is_window_closed(&self) -> bool {
        matches!(self, Error::Api { error, .. } if error.is_window_closed())
    }
}

/// Provider error object, parsed from `{"error": {...}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default, rename = "error_subcode")]
    pub subcode: Option<i64>,
    #[serde(default)]
    pub message: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorEnvelope {
    error: ApiError,
}

impl ApiError {
    /// Parse an error body. Anything that is not a provider error envelope
    /// keeps the raw (truncated) body as the message.
    pub fn from_body(body: &str) -> Self {
        match serde_json::from_str::<ApiErrorEnvelope>(body) {
            Ok(envelope) => envelope.error,
            Err(_) => ApiError {
                message: body.chars().take(300).collect(),
                ..Default::default()
            },
        }
    }

    pub fn is_window_closed(&self) -> bool {
        matches!(
            self.code,
            Some(WINDOW_CLOSED_CODE) | Some(LEGACY_WINDOW_CLOSED_CODE)
        )
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}
