// Authentication recovery
//
// Wraps a `Transport` and resolves a single 401 per call: refresh the
// access token with the stored refresh credential, then replay the
// original request once. A failed refresh ends the session: tokens are
// cleared and a `SessionEvent` is broadcast to every subscriber.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::request::{ApiRequest, ApiResponse};
use crate::transport::Transport;

/// Default refresh endpoint, relative to the API base.
pub const DEFAULT_REFRESH_PATH: &str = "auth/refresh-token";

const SESSION_EVENT_CHANNEL_SIZE: usize = 16;

// ── Token storage ────────────────────────────────────────────────────

/// Persistent key-value storage for the access and refresh tokens.
///
/// Read by the transport on every authenticated call and by
/// [`AuthRecovery`] when a refresh is needed. Implementations must be
/// cheap to read; the keyring-backed store lives in `kelmah-config`.
pub trait TokenStore: Send + Sync {
    fn access_token(&self) -> Result<Option<SecretString>, Error>;
    fn refresh_token(&self) -> Result<Option<SecretString>, Error>;
    fn set_access_token(&self, token: SecretString) -> Result<(), Error>;
    fn set_refresh_token(&self, token: SecretString) -> Result<(), Error>;
    /// Remove both tokens.
    fn clear(&self) -> Result<(), Error>;
}

/// In-process token store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryTokenStore {
    access: RwLock<Option<SecretString>>,
    refresh: RwLock<Option<SecretString>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with an existing session.
    pub fn with_tokens(access: impl Into<String>, refresh: Option<String>) -> Self {
        Self {
            access: RwLock::new(Some(SecretString::from(access.into()))),
            refresh: RwLock::new(refresh.map(SecretString::from)),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn access_token(&self) -> Result<Option<SecretString>, Error> {
        Ok(self
            .access
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn refresh_token(&self) -> Result<Option<SecretString>, Error> {
        Ok(self
            .refresh
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn set_access_token(&self, token: SecretString) -> Result<(), Error> {
        *self.access.write().unwrap_or_else(PoisonError::into_inner) = Some(token);
        Ok(())
    }

    fn set_refresh_token(&self, token: SecretString) -> Result<(), Error> {
        *self.refresh.write().unwrap_or_else(PoisonError::into_inner) = Some(token);
        Ok(())
    }

    fn clear(&self) -> Result<(), Error> {
        *self.access.write().unwrap_or_else(PoisonError::into_inner) = None;
        *self.refresh.write().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

// ── Session events ───────────────────────────────────────────────────

/// Why the session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEndReason {
    /// The refresh endpoint rejected the refresh credential or failed.
    RefreshFailed,
    /// A 401 arrived and no refresh credential was stored.
    NoRefreshToken,
    /// The application signed out explicitly.
    SignedOut,
}

/// Global session lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Credentials were cleared; UI should route to the sign-in entry point.
    Ended { reason: SessionEndReason },
}

// ── Refresh response shape ───────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct RefreshTokens {
    #[serde(default, alias = "accessToken")]
    token: Option<String>,
    #[serde(default, rename = "refreshToken")]
    refresh_token: Option<String>,
}

/// The refresh endpoint answers either `{ data: { token, refreshToken } }`
/// or the same fields at the top level.
#[derive(Debug, Deserialize)]
struct RefreshEnvelope {
    #[serde(default)]
    data: Option<RefreshTokens>,
    #[serde(flatten)]
    top: RefreshTokens,
}

impl RefreshEnvelope {
    fn into_tokens(self) -> (Option<String>, Option<String>) {
        let data = self.data.unwrap_or_default();
        (
            data.token.or(self.top.token),
            data.refresh_token.or(self.top.refresh_token),
        )
    }
}

// ── AuthRecovery ─────────────────────────────────────────────────────

/// Drop-in [`Transport`] wrapper that recovers from one expired token per call.
///
/// Concurrent 401s are coalesced: callers serialize on a refresh gate and
/// a caller that finds the token already rotated by someone else replays
/// with the new token instead of refreshing again.
pub struct AuthRecovery {
    transport: Arc<dyn Transport>,
    tokens: Arc<dyn TokenStore>,
    refresh_path: String,
    refresh_gate: Mutex<()>,
    events: broadcast::Sender<SessionEvent>,
}

impl AuthRecovery {
    pub fn new(transport: Arc<dyn Transport>, tokens: Arc<dyn TokenStore>) -> Self {
        let (events, _) = broadcast::channel(SESSION_EVENT_CHANNEL_SIZE);
        Self {
            transport,
            tokens,
            refresh_path: DEFAULT_REFRESH_PATH.to_owned(),
            refresh_gate: Mutex::new(()),
            events,
        }
    }

    /// Override the refresh endpoint path.
    pub fn with_refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = path.into();
        self
    }

    /// Subscribe to session lifecycle events.
    pub fn session_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// The token store this layer reads and rotates.
    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    /// Clear credentials and broadcast the end of the session.
    pub fn end_session(&self, reason: SessionEndReason) {
        if let Err(e) = self.tokens.clear() {
            warn!(error = %e, "failed to clear stored tokens");
        }
        info!(?reason, "session ended");
        let _ = self.events.send(SessionEvent::Ended { reason });
    }

    /// Make sure a usable access token exists after `stale` was rejected.
    async fn recover(&self, stale: Option<&SecretString>) -> Result<(), Error> {
        let _gate = self.refresh_gate.lock().await;

        let current = self.tokens.access_token()?;
        match (current.as_ref(), stale) {
            (Some(now), Some(old)) if now.expose_secret() != old.expose_secret() => {
                debug!("access token already rotated by a concurrent refresh");
                return Ok(());
            }
            (Some(_), None) => {
                debug!("access token stored since the request was sent");
                return Ok(());
            }
            (None, Some(_)) => {
                debug!("session already ended by a concurrent refresh");
                return Err(Error::SessionExpired);
            }
            _ => {}
        }

        let Some(refresh) = self.tokens.refresh_token()? else {
            self.end_session(SessionEndReason::NoRefreshToken);
            return Err(Error::SessionExpired);
        };

        match self.refresh(&refresh).await {
            Ok(()) => {
                info!("access token refreshed");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed");
                self.end_session(SessionEndReason::RefreshFailed);
                Err(Error::SessionExpired)
            }
        }
    }

    async fn refresh(&self, refresh: &SecretString) -> Result<(), Error> {
        let request = ApiRequest::post(self.refresh_path.as_str())
            .json(json!({ "refreshToken": refresh.expose_secret() }))
            .unauthenticated();

        let resp = self.transport.send(&request).await?;
        let envelope: RefreshEnvelope = resp.json()?;
        let (access, rotated) = envelope.into_tokens();

        let access = access.ok_or_else(|| Error::Deserialization {
            message: "refresh response carried no access token".into(),
            body: String::new(),
        })?;

        self.tokens.set_access_token(SecretString::from(access))?;
        if let Some(rotated) = rotated {
            self.tokens.set_refresh_token(SecretString::from(rotated))?;
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for AuthRecovery {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, Error> {
        let used = self.tokens.access_token()?;

        match self.transport.send(request).await {
            Err(Error::Unauthorized { message }) if request.authenticated => {
                debug!(path = %request.path, %message, "401 received; recovering session");
            }
            other => return other,
        }

        self.recover(used.as_ref()).await?;

        match self.transport.send(request).await {
            Err(Error::Unauthorized { message }) => {
                warn!(path = %request.path, "401 after token refresh; giving up");
                Err(Error::Unauthorized { message })
            }
            other => other,
        }
    }
}
