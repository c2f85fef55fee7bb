//! Query orchestration between `kelmah-api` and UI consumers.
//!
//! - **[`AbortableQuery`]**: one per consumer. Serves fresh results from the
//!   [`RequestCache`], otherwise runs a single cancellable fetch through
//!   [`ApiClient`](kelmah_api::ApiClient) under a logical timeout, and
//!   publishes [`QueryState`] on a `watch` channel.
//!
//! - **[`RequestCache`]**: per-resource `DashMap` of fetch results with a
//!   freshness window. [`Caches`] holds one per resource type.
//!
//! - **Consumers** ([`resources`]): proposals (with [`ProposalService`]
//!   mutations), worker search, bids (with [`BidService`] mutations), quick-job tracking ([`QuickJobTracker`]), and
//!   location search.
//!
//! - **[`AppContext`]**: the application root that owns the client and the
//!   caches and vends consumer handles.

pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod normalize;
pub mod query;
pub mod resources;

// ── Primary re-exports ──────────────────────────────────────────────
pub use cache::{CacheEntry, CacheStore, Caches, RequestCache};
pub use config::{ClientConfig, QueryOptions};
pub use context::AppContext;
pub use error::CoreError;
pub use normalize::{Page, PageRequest, Pagination};
pub use query::{
    AbortableQuery, QueryError, QueryErrorKind, QueryKey, QuerySpec, QueryState, RunOptions,
};
pub use resources::{
    Bid, BidQuery, BidService, BidStatus, LocationQuery, LocationSuggestion, NewBid, Proposal,
    ProposalAggregates, ProposalDecision, ProposalQuery, ProposalService, ProposalStatus, QuickJob,
    QuickJobQuery, QuickJobStatus, QuickJobTracker, Worker, WorkerSearch,
};
