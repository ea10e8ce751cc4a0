//! Gateway error taxonomy.
//!
//! One enum for everything that can reject or degrade a send request. Each
//! variant maps to a machine-readable `code` and an HTTP status; retryability
//! is a property of the channel layer error, not a type hierarchy.

use axum::http::StatusCode;
use thiserror::Error;

use crate::channels::ChannelError;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Malformed or semantically invalid request (400).
    #[error("{message}")]
    Validation {
        code: &'static str,
        message: String,
    },

    /// Missing/invalid/expired request signature (401).
    #[error("{message}")]
    Authentication {
        code: &'static str,
        message: String,
    },

    /// Template, per-channel content, or channel config missing (404).
    #[error("{message}")]
    NotFound {
        code: &'static str,
        message: String,
    },

    /// Threat scan rejected the request content (400).
    #[error("security threat detected: {0}")]
    Security(String),

    /// Required template variables absent (400, details list the names).
    #[error("missing template variables: {0:?}")]
    MissingVariables(Vec<String>),

    /// A channel adapter call failed; carries the retryable flag.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Store or queue unreachable (503, retryable).
    #[error("infrastructure error: {0}")]
    Infrastructure(String),

    /// Bug (500).
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        GatewayError::Validation {
            code,
            message: message.into(),
        }
    }

    pub fn authentication(code: &'static str, message: impl Into<String>) -> Self {
        GatewayError::Authentication {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        GatewayError::NotFound {
            code,
            message: message.into(),
        }
    }

    /// Machine-readable error code for the response envelope.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Validation { code, .. } => code,
            GatewayError::Authentication { code, .. } => code,
            GatewayError::NotFound { code, .. } => code,
            GatewayError::Security(_) => "SECURITY_THREAT_DETECTED",
            GatewayError::MissingVariables(_) => "MISSING_TEMPLATE_VARIABLES",
            GatewayError::Channel(_) => "CHANNEL_ERROR",
            GatewayError::Infrastructure(_) => "INTERNAL_ERROR",
            GatewayError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Validation { .. } => StatusCode::BAD_REQUEST,
            GatewayError::Authentication { .. } => StatusCode::UNAUTHORIZED,
            GatewayError::NotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::Security(_) => StatusCode::BAD_REQUEST,
            GatewayError::MissingVariables(_) => StatusCode::BAD_REQUEST,
            GatewayError::Channel(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Infrastructure(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Structured detail payload, when the variant carries one.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            GatewayError::MissingVariables(names) => Some(serde_json::json!({
                "missing_variables": names,
            })),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for GatewayError {
    fn from(e: sqlx::Error) -> Self {
        GatewayError::Infrastructure(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_statuses_follow_the_taxonomy() {
        let e = GatewayError::validation("INVALID_CHANNELS", "channels must be non-empty");
        assert_eq!(e.code(), "INVALID_CHANNELS");
        assert_eq!(e.status(), StatusCode::BAD_REQUEST);

        let e = GatewayError::authentication("REQUEST_EXPIRED", "timestamp outside window");
        assert_eq!(e.code(), "REQUEST_EXPIRED");
        assert_eq!(e.status(), StatusCode::UNAUTHORIZED);

        let e = GatewayError::not_found("TEMPLATE_NOT_FOUND", "no active template 'welcome'");
        assert_eq!(e.status(), StatusCode::NOT_FOUND);

        let e = GatewayError::Security("null byte in content".to_owned());
        assert_eq!(e.code(), "SECURITY_THREAT_DETECTED");
        assert_eq!(e.status(), StatusCode::BAD_REQUEST);

        let e = GatewayError::Infrastructure("pool timed out".to_owned());
        assert_eq!(e.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn missing_variables_carry_details() {
        let e = GatewayError::MissingVariables(vec!["username".to_owned(), "link".to_owned()]);
        assert_eq!(e.code(), "MISSING_TEMPLATE_VARIABLES");
        let details = e.details().unwrap();
        assert_eq!(details["missing_variables"][0], "username");
        assert_eq!(details["missing_variables"][1], "link");
    }
}
