// Scripted in-memory transport shared by the integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use kelmah_api::{
    ApiClient, ApiRequest, ApiResponse, Error, MemoryTokenStore, RetryPolicy, TokenStore, Transport,
};
use kelmah_core::{AppContext, QueryOptions};
use serde_json::{Value, json};

/// What the transport does for one call.
pub enum Step {
    Respond(Value),
    Fail(Error),
    /// Wait, then perform the inner step.
    Delay(Duration, Box<Step>),
    /// Never resolve.
    Hang,
}

impl Step {
    pub fn status(status: u16) -> Self {
        Self::Fail(Error::Http {
            status,
            message: format!("status {status}"),
            code: None,
        })
    }

    pub fn unauthorized() -> Self {
        Self::Fail(Error::Unauthorized {
            message: "jwt expired".into(),
        })
    }

    pub fn network() -> Self {
        Self::Fail(Error::Network {
            message: "connection refused".into(),
        })
    }

    pub fn delayed(delay: Duration, step: Step) -> Self {
        Self::Delay(delay, Box::new(step))
    }
}

/// Counts calls that were dropped before completing.
struct DropGuard<'a> {
    abandoned: &'a AtomicUsize,
    done: bool,
}

impl Drop for DropGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.abandoned.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<ApiRequest>>,
    abandoned: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(steps.into_iter().collect()),
            ..Self::default()
        })
    }

    pub fn push(&self, step: Step) {
        self.script.lock().unwrap().push_back(step);
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Calls whose future was dropped before it resolved.
    pub fn abandoned(&self) -> usize {
        self.abandoned.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, Error> {
        self.requests.lock().unwrap().push(request.clone());
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Step::Respond(json!({ "data": [] })));

        let mut guard = DropGuard {
            abandoned: &self.abandoned,
            done: false,
        };
        let mut step = step;
        let result = loop {
            match step {
                Step::Respond(body) => {
                    break Ok(ApiResponse {
                        status: 200,
                        request_id: kelmah_api::new_request_id(),
                        body,
                    });
                }
                Step::Fail(err) => break Err(err),
                Step::Delay(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    step = *inner;
                }
                Step::Hang => break std::future::pending().await,
            }
        };
        guard.done = true;
        result
    }
}

pub fn signed_in_tokens() -> Arc<MemoryTokenStore> {
    Arc::new(MemoryTokenStore::with_tokens("access-1", Some("refresh-1".into())))
}

pub fn client(transport: &Arc<ScriptedTransport>) -> Arc<ApiClient> {
    client_with(transport, signed_in_tokens())
}

pub fn client_with(transport: &Arc<ScriptedTransport>, tokens: Arc<MemoryTokenStore>) -> Arc<ApiClient> {
    let tokens: Arc<dyn TokenStore> = tokens;
    Arc::new(ApiClient::new(
        Arc::clone(transport) as Arc<dyn Transport>,
        tokens,
        RetryPolicy::default(),
    ))
}

pub fn context(transport: &Arc<ScriptedTransport>) -> AppContext {
    AppContext::new(client(transport), QueryOptions::default())
}

/// A proposals page in the `{ data, meta }` envelope.
pub fn proposals_body(ids: &[&str], pagination: Value) -> Value {
    let items: Vec<Value> = ids
        .iter()
        .map(|id| json!({ "_id": id, "status": "pending", "proposedRate": 100.0 }))
        .collect();
    json!({
        "success": true,
        "data": items,
        "meta": { "pagination": pagination }
    })
}
