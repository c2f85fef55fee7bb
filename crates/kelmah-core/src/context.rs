// ── Application root ──
//
// Owns the shared client, one cache per resource, and the query defaults.
// Every consumer handle is vended from here.

use std::sync::Arc;
use std::time::Duration;

use kelmah_api::{ApiClient, SessionEvent, TokenStore};
use tokio::sync::broadcast;
use tracing::info;

use crate::cache::{Caches, CacheStore};
use crate::config::{ClientConfig, QueryOptions};
use crate::error::CoreError;
use crate::query::{AbortableQuery, QuerySpec, RunOptions};
use crate::resources::{
    BidQuery, BidService, LocationQuery, ProposalQuery, ProposalService, QuickJob, QuickJobQuery,
    QuickJobTracker, WorkerSearch,
};

pub struct AppContext {
    client: Arc<ApiClient>,
    caches: Caches,
    options: QueryOptions,
    poll_interval: Duration,
}

impl AppContext {
    pub fn new(client: Arc<ApiClient>, options: QueryOptions) -> Self {
        Self {
            client,
            caches: Caches::new(),
            options,
            poll_interval: Duration::from_secs(15),
        }
    }

    /// Validate `config` and build the HTTP pipeline with `tokens`.
    pub fn from_config(config: &ClientConfig, tokens: Arc<dyn TokenStore>) -> Result<Self, CoreError> {
        config.validate()?;

        let client = ApiClient::http(config.api_url.as_str(), &config.transport, tokens, config.retry)?
            .with_refresh_path(config.refresh_path.as_str());
        info!(api_url = %config.api_url, "client context ready");

        Ok(Self {
            poll_interval: config.poll_interval,
            ..Self::new(Arc::new(client), config.query)
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn client(&self) -> &Arc<ApiClient> {
        &self.client
    }

    pub fn caches(&self) -> &Caches {
        &self.caches
    }

    pub fn options(&self) -> QueryOptions {
        self.options
    }

    fn mount<S: QuerySpec>(&self, spec: S, cache: Arc<dyn CacheStore<S::Item>>) -> AbortableQuery<S> {
        let query = AbortableQuery::new(Arc::clone(&self.client), cache, self.options, spec);
        query.run(RunOptions::default());
        query
    }

    // ── Consumers ────────────────────────────────────────────────────
    //
    // Each returns a query that has already been run once.

    pub fn proposals(&self, query: ProposalQuery) -> AbortableQuery<ProposalQuery> {
        self.mount(query, self.caches.proposals.clone())
    }

    pub fn workers(&self, search: WorkerSearch) -> AbortableQuery<WorkerSearch> {
        self.mount(search, self.caches.workers.clone())
    }

    pub fn bids(&self, query: BidQuery) -> AbortableQuery<BidQuery> {
        self.mount(query, self.caches.bids.clone())
    }

    pub fn locations(&self, query: LocationQuery) -> AbortableQuery<LocationQuery> {
        self.mount(query, self.caches.locations.clone())
    }

    pub fn proposal_service(&self) -> ProposalService {
        ProposalService::new(Arc::clone(&self.client), self.caches.proposals.clone())
    }

    pub fn bid_service(&self) -> BidService {
        BidService::new(Arc::clone(&self.client), self.caches.bids.clone())
    }

    /// Start tracking a quick job; polling stops when the tracker is dropped.
    pub fn track_quick_job(&self, job_id: impl Into<String>) -> QuickJobTracker {
        let cache: Arc<dyn CacheStore<QuickJob>> = self.caches.quick_jobs.clone();
        let query = AbortableQuery::new(
            Arc::clone(&self.client),
            cache,
            self.options,
            QuickJobQuery { id: job_id.into() },
        );
        QuickJobTracker::start(query, self.poll_interval)
    }

    // ── Session ──────────────────────────────────────────────────────

    pub fn session_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.client.session_events()
    }

    /// Clear credentials and every cached result.
    pub fn sign_out(&self) {
        self.client.sign_out();
        self.caches.invalidate_all();
    }
}
