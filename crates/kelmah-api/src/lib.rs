// kelmah-api: resilient async request pipeline for the Kelmah REST backend
//
// Layers, leaf first: Transport (reqwest, headers, timeout) →
// AuthRecovery (one refresh + one replay per 401) → RetryPolicy
// (exponential backoff for transient failures) → ApiClient.

pub mod auth;
pub mod client;
pub mod error;
pub mod request;
pub mod retry;
pub mod transport;

pub use auth::{
    AuthRecovery, MemoryTokenStore, SessionEndReason, SessionEvent, TokenStore,
    DEFAULT_REFRESH_PATH,
};
pub use client::ApiClient;
pub use error::Error;
pub use request::{ApiRequest, ApiResponse};
pub use retry::RetryPolicy;
pub use transport::{
    HttpTransport, REQUEST_ID_HEADER, TlsMode, Transport, TransportConfig, new_request_id,
};

pub use reqwest::Method;
pub use tokio_util::sync::CancellationToken;
