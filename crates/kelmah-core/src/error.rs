// ── Core error types ──
//
// Errors surfaced by service calls (bid mutations, normalization, context
// construction). Query handles never return these directly; they expose a
// `QueryError` inside `QueryState` instead.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    // ── Session errors ───────────────────────────────────────────────
    #[error("Session expired -- sign in again")]
    SessionExpired,

    #[error("Not authorized: {message}")]
    Unauthorized { message: String },

    // ── Connectivity errors ──────────────────────────────────────────
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Kelmah is unreachable: {message}")]
    Unreachable { message: String },

    #[error("Operation cancelled")]
    Cancelled,

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// Backend error code (e.g. "BID_TOO_LOW").
        code: Option<String>,
        status: Option<u16>,
    },

    #[error("Unexpected response shape: {message}")]
    Decode { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    /// The HTTP status this error originated from, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => *status,
            Self::Unauthorized { .. } => Some(401),
            _ => None,
        }
    }
}

// ── Conversion from pipeline errors ──────────────────────────────────

impl From<kelmah_api::Error> for CoreError {
    fn from(err: kelmah_api::Error) -> Self {
        match err {
            kelmah_api::Error::SessionExpired => CoreError::SessionExpired,
            kelmah_api::Error::Unauthorized { message } => CoreError::Unauthorized { message },
            kelmah_api::Error::Timeout { timeout_ms } => CoreError::Timeout { timeout_ms },
            kelmah_api::Error::Network { message } => CoreError::Unreachable { message },
            kelmah_api::Error::Aborted => CoreError::Cancelled,
            kelmah_api::Error::Http {
                status,
                message,
                code,
            } => CoreError::Api {
                message,
                code,
                status: Some(status),
            },
            kelmah_api::Error::RetryExhausted { attempts, source } => CoreError::Unreachable {
                message: format!("gave up after {attempts} attempts: {source}"),
            },
            kelmah_api::Error::Deserialization { message, body: _ } => {
                CoreError::Decode { message }
            }
            kelmah_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            kelmah_api::Error::Tls(msg) => CoreError::Config {
                message: format!("TLS error: {msg}"),
            },
            kelmah_api::Error::TokenStore(msg) => CoreError::Config {
                message: format!("Token store error: {msg}"),
            },
        }
    }
}
