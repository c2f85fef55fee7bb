// HTTP transport: the leaf of the request pipeline.
//
// Builds the `reqwest::Client` from shared settings, injects the bearer
// token and a per-call correlation id, applies the wall-clock timeout,
// and maps HTTP status codes into `Error`. It never retries or caches.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use secrecy::ExposeSecret;
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;
use uuid::Uuid;

use crate::auth::TokenStore;
use crate::error::Error;
use crate::request::{ApiRequest, ApiResponse};

/// Header carrying the per-call correlation id.
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

const USER_AGENT: &str = concat!("kelmah-api/", env!("CARGO_PKG_VERSION"));

/// TLS verification mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsMode {
    /// Use the system certificate store.
    #[default]
    System,
    /// Use a custom CA certificate from the given PEM file.
    CustomCa(PathBuf),
    /// Accept any certificate (local development backends only).
    DangerAcceptInvalid,
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    /// Hard network-level budget per call.
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::System,
            timeout: Duration::from_secs(8),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT);

        match &self.tls {
            TlsMode::System => {}
            TlsMode::CustomCa(path) => {
                let cert_pem = std::fs::read(path)
                    .map_err(|e| Error::Tls(format!("failed to read CA cert: {e}")))?;
                let cert = reqwest::Certificate::from_pem(&cert_pem)
                    .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
                builder = builder.add_root_certificate(cert);
            }
            TlsMode::DangerAcceptInvalid => {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

/// The pipeline's leaf contract. Auth recovery wraps any implementation,
/// which lets tests substitute scripted transports for the network.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, Error>;
}

/// Generate a fresh correlation id.
pub fn new_request_id() -> String {
    format!("req_{}", Uuid::new_v4().simple())
}

fn preview(body: &str) -> String {
    body.chars().take(200).collect()
}

// ── Error response shape from the backend ────────────────────────────

#[derive(serde::Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    error: Option<Value>,
}

impl ErrorResponse {
    /// The backend nests `{ error: { message, code } }` on some services
    /// and uses a flat `{ message, code }` on others.
    fn into_parts(self) -> (Option<String>, Option<String>) {
        let nested = self.error.as_ref();
        let nested_str = |field: &str| {
            nested
                .and_then(|e| e.get(field))
                .and_then(Value::as_str)
                .map(String::from)
        };
        let message = self
            .message
            .or_else(|| nested_str("message"))
            .or_else(|| nested.and_then(Value::as_str).map(String::from));
        let code = self.code.or_else(|| nested_str("code"));
        (message, code)
    }
}

// ── HttpTransport ────────────────────────────────────────────────────

/// Production transport over `reqwest`.
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: Url,
    config: TransportConfig,
    tokens: Arc<dyn TokenStore>,
}

impl HttpTransport {
    /// Build from a base URL (e.g. `https://api.kelmah.com/api`) and transport config.
    pub fn new(
        base_url: &str,
        config: &TransportConfig,
        tokens: Arc<dyn TokenStore>,
    ) -> Result<Self, Error> {
        let http = config.build_client()?;
        Ok(Self {
            http,
            base_url: Self::normalize_base_url(base_url)?,
            config: config.clone(),
            tokens,
        })
    }

    /// The normalized base URL (always ends with `/`).
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Ensure a trailing slash so relative joins append rather than replace.
    fn normalize_base_url(raw: &str) -> Result<Url, Error> {
        let mut url = Url::parse(raw)?;
        let path = url.path().trim_end_matches('/').to_owned();
        url.set_path(&format!("{path}/"));
        Ok(url)
    }

    fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    fn bearer(&self) -> Result<Option<HeaderValue>, Error> {
        let Some(token) = self.tokens.access_token()? else {
            return Ok(None);
        };
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
            .map_err(|e| Error::TokenStore(format!("invalid token header value: {e}")))?;
        value.set_sensitive(true);
        Ok(Some(value))
    }

    fn map_send_error(&self, err: &reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout {
                timeout_ms: self.config.timeout_ms(),
            }
        } else {
            Error::Network {
                message: err.to_string(),
            }
        }
    }

    async fn handle_response(
        &self,
        resp: reqwest::Response,
        request_id: String,
    ) -> Result<ApiResponse, Error> {
        let status = resp.status();
        let raw = resp.text().await.map_err(|e| self.map_send_error(&e))?;

        if status.is_success() {
            let body = if raw.trim().is_empty() {
                Value::Null
            } else {
                serde_json::from_str(&raw).map_err(|e| {
                    let shown = preview(&raw);
                    Error::Deserialization {
                        message: format!("{e} (body preview: {shown:?})"),
                        body: raw.clone(),
                    }
                })?
            };
            return Ok(ApiResponse {
                status: status.as_u16(),
                request_id,
                body,
            });
        }

        let (message, code) = serde_json::from_str::<ErrorResponse>(&raw)
            .map(ErrorResponse::into_parts)
            .unwrap_or((None, None));

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::Unauthorized {
                message: message.unwrap_or_else(|| "token missing, invalid or expired".into()),
            });
        }

        Err(Error::Http {
            status: status.as_u16(),
            message: message.unwrap_or_else(|| {
                if raw.is_empty() {
                    status.to_string()
                } else {
                    preview(&raw)
                }
            }),
            code,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, Error> {
        let url = self.url(&request.path)?;
        let request_id = new_request_id();

        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .header(REQUEST_ID_HEADER, &request_id);

        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }
        if request.authenticated {
            if let Some(bearer) = self.bearer()? {
                builder = builder.header(AUTHORIZATION, bearer);
            }
        }

        debug!(method = %request.method, path = %request.path, %request_id, "sending request");
        let started = Instant::now();

        let resp = builder
            .send()
            .await
            .map_err(|e| self.map_send_error(&e))?;

        trace!(
            %request_id,
            status = resp.status().as_u16(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "response received"
        );

        self.handle_response(resp, request_id).await
    }
}
