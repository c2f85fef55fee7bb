// ── Resource consumers ──
//
// Each module declares a query shape (`QuerySpec`) and its item type.
// `AppContext` wires them to the shared client and caches.

pub mod bids;
pub mod locations;
pub mod proposals;
pub mod quick_jobs;
pub mod workers;

pub use bids::{Bid, BidQuery, BidService, BidStatus, NewBid};
pub use locations::{LOCATION_TTL, LocationQuery, LocationSuggestion};
pub use proposals::{
    Proposal, ProposalAggregates, ProposalDecision, ProposalQuery, ProposalService, ProposalStatus,
};
pub use quick_jobs::{QuickJob, QuickJobQuery, QuickJobStatus, QuickJobTracker};
pub use workers::{Worker, WorkerSearch};
