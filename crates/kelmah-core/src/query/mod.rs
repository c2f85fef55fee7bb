// ── Abortable query orchestration ──
//
// One `AbortableQuery` per consumer. It decides between the cache and the
// network, keeps at most one fetch in flight, enforces the logical
// timeout, and publishes `QueryState` through a `watch` channel.
//
// Every teardown (drop, parameter change, refresh, retry, cancel) goes
// through `Shared::teardown`, which cancels the live token and bumps the
// generation. A fetch commits to the cache and state only while its
// generation is still current, checked under the same lock.

mod key;
mod state;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use kelmah_api::{ApiClient, ApiRequest, CancellationToken};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cache::{CacheEntry, CacheStore};
use crate::config::QueryOptions;
use crate::error::CoreError;
use crate::normalize::{Page, PageRequest, normalize_page};

pub use key::{QueryKey, QueryKeyBuilder};
pub use state::{QueryError, QueryErrorKind, QueryState};

/// The shape of one consumer's query.
///
/// Implementors are plain parameter structs; the query handle calls these
/// to derive the cache key and the request each time it runs.
pub trait QuerySpec: Clone + Send + Sync + 'static {
    type Item: DeserializeOwned + Send + Sync + 'static;

    /// Resource-named collection field accepted by normalization.
    const COLLECTION: &'static str;

    fn key(&self) -> QueryKey;

    fn request(&self) -> ApiRequest;

    fn page_request(&self) -> PageRequest {
        PageRequest::default()
    }

    /// Freshness window override for this resource.
    fn ttl(&self) -> Option<Duration> {
        None
    }

    fn normalize(&self, body: &Value) -> Result<Page<Self::Item>, CoreError> {
        normalize_page(body, Self::COLLECTION, self.page_request())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Skip the cache even when the entry is fresh.
    pub force_refresh: bool,
}

impl RunOptions {
    pub fn force() -> Self {
        Self {
            force_refresh: true,
        }
    }
}

/// A live network call for the query.
struct InFlight {
    cancel: CancellationToken,
    generation: u64,
    started_at: Instant,
}

struct Shared<S> {
    spec: S,
    generation: u64,
    in_flight: Option<InFlight>,
    /// Key of the data currently published in `QueryState`.
    shown_key: Option<QueryKey>,
}

impl<S> Shared<S> {
    /// Cancel the live fetch (if any) and invalidate its generation.
    fn teardown(&mut self) {
        if let Some(prev) = self.in_flight.take() {
            debug!(
                generation = prev.generation,
                elapsed_ms = u64::try_from(prev.started_at.elapsed().as_millis()).unwrap_or(u64::MAX),
                "tearing down in-flight fetch"
            );
            prev.cancel.cancel();
        }
        self.generation += 1;
    }
}

struct QueryInner<S: QuerySpec> {
    client: Arc<ApiClient>,
    cache: Arc<dyn CacheStore<S::Item>>,
    options: QueryOptions,
    shared: Mutex<Shared<S>>,
    state: watch::Sender<QueryState<S::Item>>,
}

enum Outcome {
    Done(Result<kelmah_api::ApiResponse, kelmah_api::Error>),
    TimedOut,
    Aborted,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<S: QuerySpec> QueryInner<S> {
    fn ttl(&self, spec: &S) -> Duration {
        spec.ttl().unwrap_or(self.options.ttl)
    }

    fn run(self: &Arc<Self>, options: RunOptions) {
        let mut shared = lock(&self.shared);
        shared.teardown();

        let key = shared.spec.key();
        let cached = self.cache.get(key.as_str());
        let ttl = self.ttl(&shared.spec);

        if !options.force_refresh {
            if let Some(entry) = cached.as_ref().filter(|e| self.cache.is_fresh(e, ttl)) {
                debug!(%key, age_ms = u64::try_from(entry.age().as_millis()).unwrap_or(u64::MAX), "serving fresh cache entry");
                self.publish_entry(&mut shared, &key, entry);
                return;
            }
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(%key, "query run outside a Tokio runtime");
            self.state.send_modify(|s| {
                s.loading = false;
                s.refreshing = false;
                s.error = Some(QueryError::configuration("no async runtime available"));
            });
            return;
        };

        let generation = shared.generation;
        let cancel = CancellationToken::new();
        shared.in_flight = Some(InFlight {
            cancel: cancel.clone(),
            generation,
            started_at: Instant::now(),
        });

        let has_stale = cached.is_some();
        let keep_shown = shared.shown_key.as_ref() == Some(&key);
        if let Some(entry) = &cached {
            shared.shown_key = Some(key.clone());
            let payload = Arc::clone(&entry.payload);
            let fetched = entry.fetched_at_utc;
            self.state.send_modify(|s| {
                s.data = Some(payload);
                s.last_updated = Some(fetched);
            });
        } else if !keep_shown {
            shared.shown_key = None;
            self.state.send_modify(|s| {
                s.data = None;
                s.last_updated = None;
            });
        }
        self.state.send_modify(|s| {
            s.loading = !has_stale;
            s.refreshing = has_stale;
            s.error = None;
            s.timed_out = false;
        });

        debug!(%key, generation, force = options.force_refresh, stale = has_stale, "starting fetch");
        let spec = shared.spec.clone();
        drop(shared);

        let inner = Arc::clone(self);
        runtime.spawn(async move { inner.fetch(spec, key, cancel, generation).await });
    }

    fn publish_entry(&self, shared: &mut Shared<S>, key: &QueryKey, entry: &CacheEntry<S::Item>) {
        shared.shown_key = Some(key.clone());
        let payload = Arc::clone(&entry.payload);
        let fetched = entry.fetched_at_utc;
        self.state.send_modify(|s| {
            s.data = Some(payload);
            s.loading = false;
            s.refreshing = false;
            s.error = None;
            s.timed_out = false;
            s.last_updated = Some(fetched);
        });
    }

    async fn fetch(self: Arc<Self>, spec: S, key: QueryKey, cancel: CancellationToken, generation: u64) {
        let request = spec.request();
        let timeout = self.options.timeout;

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => Outcome::Aborted,
            () = tokio::time::sleep(timeout) => {
                cancel.cancel();
                Outcome::TimedOut
            }
            result = self.client.execute(&request, &cancel) => Outcome::Done(result),
        };

        let mut shared = lock(&self.shared);
        if shared.generation != generation {
            debug!(%key, generation, current = shared.generation, "discarding superseded result");
            return;
        }
        shared.in_flight = None;

        match outcome {
            Outcome::Done(Ok(resp)) => match spec.normalize(&resp.body) {
                Ok(page) => {
                    let entry = self.cache.set(key.as_str(), Arc::new(page));
                    debug!(%key, items = entry.payload.len(), request_id = %resp.request_id, "fetch committed");
                    self.publish_entry(&mut shared, &key, &entry);
                }
                Err(e) => {
                    warn!(%key, error = %e, "response could not be normalized");
                    self.fail(QueryError::invalid_response(e.to_string()), false);
                }
            },
            Outcome::Done(Err(err)) => match QueryError::from_api(&err) {
                Some(query_err) => {
                    warn!(%key, error = %err, "fetch failed");
                    self.fail(query_err, false);
                }
                None => self.settle_silently(),
            },
            Outcome::TimedOut => {
                warn!(%key, timeout_ms = self.options.timeout_ms(), "query timed out");
                self.fail(QueryError::timed_out(self.options.timeout_ms()), true);
            }
            Outcome::Aborted => self.settle_silently(),
        }
    }

    fn fail(&self, error: QueryError, timed_out: bool) {
        self.state.send_modify(|s| {
            s.loading = false;
            s.refreshing = false;
            s.error = Some(error);
            s.timed_out = timed_out;
        });
    }

    fn settle_silently(&self) {
        self.state.send_modify(|s| {
            s.loading = false;
            s.refreshing = false;
        });
    }
}

/// Cache-aware, cancellable fetch state for one consumer.
///
/// Dropping the handle tears down any in-flight fetch.
pub struct AbortableQuery<S: QuerySpec> {
    inner: Arc<QueryInner<S>>,
}

impl<S: QuerySpec> AbortableQuery<S> {
    /// Create an idle query. Nothing is fetched until [`run`](Self::run).
    pub fn new(
        client: Arc<ApiClient>,
        cache: Arc<dyn CacheStore<S::Item>>,
        options: QueryOptions,
        spec: S,
    ) -> Self {
        if let Some(transport) = client.transport_timeout() {
            if options.timeout < transport {
                warn!(
                    query_timeout_ms = options.timeout_ms(),
                    transport_timeout_ms = u64::try_from(transport.as_millis()).unwrap_or(u64::MAX),
                    "logical query timeout is shorter than the transport timeout"
                );
            }
        }
        let (state, _) = watch::channel(QueryState::default());
        Self {
            inner: Arc::new(QueryInner {
                client,
                cache,
                options,
                shared: Mutex::new(Shared {
                    spec,
                    generation: 0,
                    in_flight: None,
                    shown_key: None,
                }),
                state,
            }),
        }
    }

    /// Serve from the cache when fresh, otherwise start a fetch.
    ///
    /// Synchronous: a fresh hit is visible in [`state`](Self::state) on
    /// return, and a fetch is spawned on the current runtime.
    pub fn run(&self, options: RunOptions) {
        self.inner.run(options);
    }

    /// Bypass the cache.
    pub fn refresh(&self) {
        self.inner.run(RunOptions::force());
    }

    /// User-initiated retry after a failure.
    pub fn retry(&self) {
        self.inner.state.send_modify(|s| s.attempt_count += 1);
        self.inner.run(RunOptions::force());
    }

    /// Drop this query's cache entry without fetching.
    pub fn invalidate_cache(&self) {
        let key = lock(&self.inner.shared).spec.key();
        self.inner.cache.invalidate(Some(key.as_str()));
    }

    /// Replace the parameters and run again.
    pub fn set_params(&self, spec: S) {
        lock(&self.inner.shared).spec = spec;
        self.inner.run(RunOptions::default());
    }

    /// Abort the in-flight fetch, if any. No error is recorded.
    pub fn cancel(&self) {
        lock(&self.inner.shared).teardown();
        self.inner.settle_silently();
    }

    pub fn params(&self) -> S {
        lock(&self.inner.shared).spec.clone()
    }

    pub fn key(&self) -> QueryKey {
        lock(&self.inner.shared).spec.key()
    }

    /// `true` while a network call is outstanding.
    pub fn is_in_flight(&self) -> bool {
        lock(&self.inner.shared).in_flight.is_some()
    }

    pub fn state(&self) -> QueryState<S::Item> {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<QueryState<S::Item>> {
        self.inner.state.subscribe()
    }

    /// Wait until no fetch is running and return the resulting state.
    pub async fn settled(&self) -> QueryState<S::Item> {
        let mut rx = self.inner.state.subscribe();
        match rx.wait_for(|s| !s.is_busy()).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        }
    }
}

impl<S: QuerySpec> Drop for AbortableQuery<S> {
    fn drop(&mut self) {
        lock(&self.inner.shared).teardown();
    }
}
