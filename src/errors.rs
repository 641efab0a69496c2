#[cfg(feature = "server")]
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
#[cfg(feature = "server")]
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LookupError {
    #[error("Could not resolve client address: {0}")]
    AddressResolutionFailed(String),

    #[error("Lookup timed out")]
    Timeout,

    #[error("No whois server found for {0:?}")]
    NoReferralFound(String),

    #[error("Transport error: {0}")]
    Transport(#[from] tokio::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid whois query: {0}")]
    InvalidQuery(String),

    #[error("Response too large")]
    ResponseTooLarge,

    #[error("Invalid UTF-8 in response")]
    InvalidUtf8,

    #[error("Reverse DNS failed: {0}")]
    Dns(String),

    #[error("No user agent supplied")]
    ClassificationUnavailable,

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<tokio::time::error::Elapsed> for LookupError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        LookupError::Timeout
    }
}

impl LookupError {
    /// Short, stable label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            LookupError::AddressResolutionFailed(_) => "address_resolution",
            LookupError::Timeout => "timeout",
            LookupError::NoReferralFound(_) => "no_referral",
            LookupError::Transport(_) => "transport",
            LookupError::Parse(_) => "parse",
            LookupError::InvalidQuery(_) => "invalid_query",
            LookupError::ResponseTooLarge => "response_too_large",
            LookupError::InvalidUtf8 => "invalid_utf8",
            LookupError::Dns(_) => "dns",
            LookupError::ClassificationUnavailable => "classification_unavailable",
            LookupError::Config(_) => "config",
            LookupError::Internal(_) => "internal",
        }
    }
}

#[cfg(feature = "server")]
impl IntoResponse for LookupError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            LookupError::AddressResolutionFailed(_) | LookupError::Parse(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            LookupError::Timeout => (StatusCode::REQUEST_TIMEOUT, self.to_string()),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string()),
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}
