// Composed request pipeline: RetryPolicy → AuthRecovery → Transport.
//
// This is the only entry point higher layers use to reach the network.
// Every call takes a cancellation token that is threaded through the
// retry sleep and the in-flight transport future.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::auth::{AuthRecovery, SessionEndReason, SessionEvent, TokenStore};
use crate::error::Error;
use crate::request::{ApiRequest, ApiResponse};
use crate::retry::RetryPolicy;
use crate::transport::{HttpTransport, Transport, TransportConfig};

/// Resilient client for the Kelmah REST backend.
pub struct ApiClient {
    auth: AuthRecovery,
    retry: RetryPolicy,
    /// Known only when built over `HttpTransport`.
    transport_timeout: Option<Duration>,
}

impl ApiClient {
    /// Assemble the pipeline over an arbitrary transport.
    pub fn new(transport: Arc<dyn Transport>, tokens: Arc<dyn TokenStore>, retry: RetryPolicy) -> Self {
        Self {
            auth: AuthRecovery::new(transport, tokens),
            retry,
            transport_timeout: None,
        }
    }

    /// Assemble the pipeline over the production HTTP transport.
    pub fn http(
        base_url: &str,
        transport: &TransportConfig,
        tokens: Arc<dyn TokenStore>,
        retry: RetryPolicy,
    ) -> Result<Self, Error> {
        let http = HttpTransport::new(base_url, transport, Arc::clone(&tokens))?;
        Ok(Self {
            transport_timeout: Some(transport.timeout),
            ..Self::new(Arc::new(http), tokens, retry)
        })
    }

    /// Override the token refresh endpoint path.
    pub fn with_refresh_path(mut self, path: impl Into<String>) -> Self {
        self.auth = self.auth.with_refresh_path(path);
        self
    }

    /// Issue a request through retry and auth recovery.
    pub async fn execute(
        &self,
        request: &ApiRequest,
        cancel: &CancellationToken,
    ) -> Result<ApiResponse, Error> {
        self.retry
            .execute(cancel, |attempt| {
                trace!(attempt, path = %request.path, "pipeline attempt");
                self.auth.send(request)
            })
            .await
    }

    /// Subscribe to session lifecycle events (e.g. expiry after a failed refresh).
    pub fn session_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.auth.session_events()
    }

    /// Clear stored credentials and notify subscribers.
    pub fn sign_out(&self) {
        self.auth.end_session(SessionEndReason::SignedOut);
    }

    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        self.auth.tokens()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn transport_timeout(&self) -> Option<Duration> {
        self.transport_timeout
    }
}
