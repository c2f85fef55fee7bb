// ── Query state ──
//
// The reactive snapshot a consumer renders from. UI code reads flags only;
// it never sees pipeline errors directly.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::normalize::Page;

/// Category of a user-visible failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// The logical query timeout elapsed.
    TimedOut,
    /// Every retry attempt failed with a transient error.
    Unavailable,
    /// Credentials are gone; route to sign-in.
    SessionExpired,
    /// The backend still rejects the token after a refresh.
    Unauthorized,
    /// A permanent 4xx answer.
    Rejected,
    /// The response did not have a supported shape.
    InvalidResponse,
    /// Local setup problem (URL, TLS, token store, missing runtime).
    Configuration,
}

/// A failure as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub message: String,
    pub status: Option<u16>,
}

impl QueryError {
    pub(crate) fn timed_out(timeout_ms: u64) -> Self {
        Self {
            kind: QueryErrorKind::TimedOut,
            message: format!("The request took longer than {}s. Please try again.", timeout_ms.div_ceil(1000)),
            status: None,
        }
    }

    pub(crate) fn invalid_response(message: impl Into<String>) -> Self {
        Self {
            kind: QueryErrorKind::InvalidResponse,
            message: message.into(),
            status: None,
        }
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self {
            kind: QueryErrorKind::Configuration,
            message: message.into(),
            status: None,
        }
    }

    /// Map a pipeline error to what the user sees. `None` for cancellation,
    /// which is never surfaced.
    pub fn from_api(err: &kelmah_api::Error) -> Option<Self> {
        use kelmah_api::Error;

        let (kind, message) = match err {
            Error::Aborted => return None,
            Error::RetryExhausted { .. } | Error::Network { .. } => (
                QueryErrorKind::Unavailable,
                "We couldn't reach Kelmah. Check your connection and try again.".to_owned(),
            ),
            Error::Timeout { .. } => (
                QueryErrorKind::Unavailable,
                "The server took too long to respond. Please try again.".to_owned(),
            ),
            Error::Http { status, .. } if *status >= 500 => (
                QueryErrorKind::Unavailable,
                "Kelmah is having trouble right now. Please try again.".to_owned(),
            ),
            Error::Http { message, .. } => (QueryErrorKind::Rejected, message.clone()),
            Error::SessionExpired => (
                QueryErrorKind::SessionExpired,
                "Your session has expired. Please sign in again.".to_owned(),
            ),
            Error::Unauthorized { .. } => (
                QueryErrorKind::Unauthorized,
                "You are not allowed to view this.".to_owned(),
            ),
            Error::Deserialization { message, .. } => {
                (QueryErrorKind::InvalidResponse, message.clone())
            }
            Error::InvalidUrl(_) | Error::Tls(_) | Error::TokenStore(_) => {
                (QueryErrorKind::Configuration, err.to_string())
            }
        };

        Some(Self {
            kind,
            message,
            status: err.status(),
        })
    }
}

/// Everything a consumer renders.
#[derive(Debug)]
pub struct QueryState<T> {
    pub data: Option<Arc<Page<T>>>,
    /// No data to show yet and a fetch is running.
    pub loading: bool,
    /// Stale data is shown while a fetch is running.
    pub refreshing: bool,
    pub error: Option<QueryError>,
    pub timed_out: bool,
    pub last_updated: Option<DateTime<Utc>>,
    /// Number of user-initiated retries.
    pub attempt_count: u32,
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self {
            data: None,
            loading: false,
            refreshing: false,
            error: None,
            timed_out: false,
            last_updated: None,
            attempt_count: 0,
        }
    }
}

impl<T> Clone for QueryState<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            loading: self.loading,
            refreshing: self.refreshing,
            error: self.error.clone(),
            timed_out: self.timed_out,
            last_updated: self.last_updated,
            attempt_count: self.attempt_count,
        }
    }
}

impl<T> QueryState<T> {
    /// A fetch is running.
    pub fn is_busy(&self) -> bool {
        self.loading || self.refreshing
    }

    /// Current items, empty when nothing has loaded.
    pub fn items(&self) -> &[T] {
        match &self.data {
            Some(page) => &page.items,
            None => &[],
        }
    }
}
