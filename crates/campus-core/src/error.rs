//! Error types for the campus client.
//!
//! This module provides a unified error type with explicit variants for
//! transport, authentication, protocol, input validation and storage errors.
//! Every variant is `Clone` so a single outcome can be handed to many waiters.

use std::fmt;
use thiserror::Error;

/// The unified error type for campus operations.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Network transport errors (connection, timeout, undecodable body).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Authentication and session errors.
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Non-success responses from the service.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Input validation errors (bad base URL, unserialisable body).
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InvalidInputError),

    /// Credential store failures.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl Error {
    /// Returns true if the caller should treat the session as ended.
    pub fn is_session_expired(&self) -> bool {
        matches!(
            self,
            Error::Auth(AuthError::SessionExpired(_) | AuthError::RefreshFailed(_))
        )
    }

    /// Returns true for network-level failures.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

/// Transport-level errors.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Network connection failed.
    #[error("connection failed: {message}")]
    Connection { message: String },

    /// Request timed out.
    #[error("request timed out")]
    Timeout,

    /// The response body could not be decoded.
    #[error("invalid response body: {message}")]
    Decode { message: String },

    /// Generic HTTP error.
    #[error("HTTP error: {message}")]
    Http { message: String },
}

/// Authentication-related errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Login or registration was refused by the service.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The service rejected the request after the single refresh retry.
    #[error("unauthorized")]
    Unauthorized,

    /// The refresh endpoint rejected the refresh token.
    #[error("token refresh failed: {0}")]
    RefreshFailed(ExpiryReason),

    /// The session ended while serving this request; sign in again.
    #[error("session expired: {0}")]
    SessionExpired(ExpiryReason),

    /// The operation needs an authenticated identity.
    #[error("not authenticated")]
    NotAuthenticated,
}

/// Why a session could not be kept alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryReason {
    /// No refresh token was stored.
    MissingRefreshToken,
    /// The service reports the refresh token as expired or otherwise invalid.
    Expired,
    /// The refresh token was blacklisted (e.g. by a logout elsewhere).
    Revoked,
    /// The refresh endpoint refused the request for another reason.
    Rejected,
    /// A logout or new login happened while the refresh was in flight.
    SessionReplaced,
}

impl fmt::Display for ExpiryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ExpiryReason::MissingRefreshToken => "no refresh token stored",
            ExpiryReason::Expired => "refresh token expired",
            ExpiryReason::Revoked => "refresh token revoked",
            ExpiryReason::Rejected => "refresh token rejected",
            ExpiryReason::SessionReplaced => "session was replaced",
        };
        f.write_str(text)
    }
}

/// Protocol-level errors from non-success responses.
#[derive(Debug, Clone)]
pub struct ProtocolError {
    /// HTTP status code.
    pub status: u16,
    /// Machine-readable error code (if present).
    pub code: Option<String>,
    /// Human-readable detail from the server.
    pub detail: Option<String>,
    /// The raw JSON body, when the server sent one.
    pub body: Option<serde_json::Value>,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {}", self.status)?;
        if let Some(ref code) = self.code {
            write!(f, " [{}]", code)?;
        }
        if let Some(ref detail) = self.detail {
            write!(f, ": {}", detail)?;
        } else {
            let fields = self.field_errors();
            if !fields.is_empty() {
                let joined = fields
                    .iter()
                    .map(|(field, message)| format!("{}: {}", field, message))
                    .collect::<Vec<_>>()
                    .join("; ");
                write!(f, ": {}", joined)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ProtocolError {}

impl ProtocolError {
    /// Build a protocol error from a status and an optional JSON body.
    pub fn new(status: u16, body: Option<serde_json::Value>) -> Self {
        let text = |key: &str| {
            body.as_ref()
                .and_then(|b| b.get(key))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };
        Self {
            status,
            code: text("code"),
            detail: text("detail"),
            body,
        }
    }

    /// Check if this is an authentication error.
    pub fn is_auth_error(&self) -> bool {
        self.status == 401
    }

    /// Check if this is a client-side validation error (4xx other than 401).
    pub fn is_validation_error(&self) -> bool {
        (400..500).contains(&self.status) && self.status != 401
    }

    /// Per-field validation messages, as `(field, message)` pairs.
    ///
    /// Field errors arrive as `{"email": ["already taken"]}`; the `detail`
    /// and `code` keys are not fields.
    pub fn field_errors(&self) -> Vec<(String, String)> {
        let Some(serde_json::Value::Object(map)) = &self.body else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for (field, value) in map {
            if field == "detail" || field == "code" {
                continue;
            }
            match value {
                serde_json::Value::Array(items) => {
                    for item in items {
                        if let Some(message) = item.as_str() {
                            out.push((field.clone(), message.to_string()));
                        }
                    }
                }
                serde_json::Value::String(message) => out.push((field.clone(), message.clone())),
                _ => {}
            }
        }
        out
    }
}

/// Input validation errors.
#[derive(Debug, Clone, Error)]
pub enum InvalidInputError {
    /// Invalid API base URL.
    #[error("invalid API URL '{value}': {reason}")]
    ApiUrl { value: String, reason: String },

    /// A request body could not be serialised.
    #[error("invalid request body: {message}")]
    Body { message: String },

    /// Generic invalid input.
    #[error("invalid input: {message}")]
    Other { message: String },
}

/// Credential store errors.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// Reading or writing the backing medium failed.
    #[error("I/O error: {message}")]
    Io { message: String },

    /// The stored document could not be parsed.
    #[error("corrupt credential store: {message}")]
    Corrupt { message: String },
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn protocol_error_reads_detail_and_code() {
        let err = ProtocolError::new(
            401,
            Some(json!({"detail": "Token is invalid or expired", "code": "token_not_valid"})),
        );
        assert_eq!(err.code.as_deref(), Some("token_not_valid"));
        assert!(err.is_auth_error());
        assert_eq!(
            err.to_string(),
            "HTTP 401 [token_not_valid]: Token is invalid or expired"
        );
    }

    #[test]
    fn protocol_error_lists_field_errors() {
        let err = ProtocolError::new(
            400,
            Some(json!({"email": ["user with this email already exists."], "password": "too short"})),
        );
        assert!(err.is_validation_error());
        let fields = err.field_errors();
        assert_eq!(fields.len(), 2);
        assert!(fields.contains(&(
            "email".to_string(),
            "user with this email already exists.".to_string()
        )));
        assert!(err.to_string().contains("password: too short"));
    }

    #[test]
    fn protocol_error_without_body() {
        let err = ProtocolError::new(503, None);
        assert_eq!(err.to_string(), "HTTP 503");
        assert!(err.field_errors().is_empty());
    }

    #[test]
    fn session_expired_classification() {
        let err: Error = AuthError::SessionExpired(ExpiryReason::Revoked).into();
        assert!(err.is_session_expired());
        assert!(!err.is_transport());
        assert_eq!(
            err.to_string(),
            "authentication error: session expired: refresh token revoked"
        );
    }
}
