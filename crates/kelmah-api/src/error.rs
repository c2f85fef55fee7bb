use thiserror::Error;

/// Top-level error type for the `kelmah-api` crate.
///
/// Covers every failure mode of the request pipeline: transport,
/// HTTP status, authentication recovery, retry exhaustion, and
/// cancellation. `kelmah-core` maps these into user-facing state.
#[derive(Debug, Clone, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// The transport-level wall-clock budget elapsed.
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Connection refused, DNS failure, reset, or a body that could not be read.
    #[error("Network failure: {message}")]
    Network { message: String },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS setup or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── HTTP ────────────────────────────────────────────────────────
    /// Non-2xx response other than 401.
    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        message: String,
        code: Option<String>,
    },

    // ── Authentication ──────────────────────────────────────────────
    /// The backend rejected the bearer token (HTTP 401).
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    /// Token refresh failed or no refresh credential was stored.
    /// Credentials have been cleared; the user must sign in again.
    #[error("Session expired -- sign in again")]
    SessionExpired,

    /// Reading or writing the token store failed.
    #[error("Token store error: {0}")]
    TokenStore(String),

    // ── Orchestration ───────────────────────────────────────────────
    /// Cooperative cancellation. Not a failure.
    #[error("Request aborted")]
    Aborted,

    /// Every attempt failed with a transient error.
    #[error("Request failed after {attempts} attempts: {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying:
    /// transport timeouts, network failures, and 5xx responses.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Network { .. } => true,
            Self::Http { status, .. } => (500..=599).contains(status),
            _ => false,
        }
    }

    /// Returns `true` if this error represents intentional cancellation.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    /// The HTTP status code carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Unauthorized { .. } => Some(401),
            Self::RetryExhausted { source, .. } => source.status(),
            _ => None,
        }
    }
}
