// ── Proposals ──
//
// Hirer-side listing of proposals received on their jobs, filtered by
// status and paginated. The backend attaches per-status counts as
// `meta.aggregates`. Accepting or rejecting goes through
// `ProposalService` and invalidates the proposals cache.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use kelmah_api::{ApiClient, ApiRequest, CancellationToken};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::cache::CacheStore;
use crate::error::CoreError;
use crate::normalize::{Page, PageRequest};
use crate::query::{QueryKey, QuerySpec};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    #[default]
    All,
    Pending,
    UnderReview,
    Accepted,
    Rejected,
    Withdrawn,
    /// Any status this client does not know yet.
    #[serde(other)]
    Unknown,
}

impl ProposalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Pending => "pending",
            Self::UnderReview => "under_review",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Withdrawn => "withdrawn",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub worker_name: Option<String>,
    #[serde(default)]
    pub cover_letter: Option<String>,
    #[serde(default)]
    pub proposed_rate: Option<f64>,
    #[serde(default)]
    pub status: Option<ProposalStatus>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Summary block sent alongside a proposals page.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalAggregates {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub status_counts: BTreeMap<String, u64>,
    #[serde(default)]
    pub average_rate: Option<f64>,
}

impl ProposalAggregates {
    /// Typed view of a page's aggregates; `None` when absent or malformed.
    pub fn from_page(page: &Page<Proposal>) -> Option<Self> {
        page.aggregates
            .as_ref()
            .and_then(|v| Self::deserialize(v).ok())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalQuery {
    pub status: ProposalStatus,
    pub page: u32,
    pub limit: u32,
}

impl Default for ProposalQuery {
    fn default() -> Self {
        Self {
            status: ProposalStatus::All,
            page: 1,
            limit: 10,
        }
    }
}

impl QuerySpec for ProposalQuery {
    type Item = Proposal;
    const COLLECTION: &'static str = "proposals";

    fn key(&self) -> QueryKey {
        QueryKey::builder()
            .segment(self.status)
            .segment(self.page)
            .segment(self.limit)
            .build()
    }

    fn request(&self) -> ApiRequest {
        let status = (self.status != ProposalStatus::All).then_some(self.status);
        ApiRequest::get("proposals")
            .param_opt("status", status)
            .param("page", self.page)
            .param("limit", self.limit)
    }

    fn page_request(&self) -> PageRequest {
        PageRequest {
            page: self.page,
            limit: self.limit,
        }
    }
}

/// A hirer's answer to a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalDecision {
    Accept,
    Reject,
}

impl ProposalDecision {
    pub fn status(self) -> ProposalStatus {
        match self {
            Self::Accept => ProposalStatus::Accepted,
            Self::Reject => ProposalStatus::Rejected,
        }
    }
}

/// Proposal mutations.
pub struct ProposalService {
    client: Arc<ApiClient>,
    cache: Arc<dyn CacheStore<Proposal>>,
}

impl ProposalService {
    pub fn new(client: Arc<ApiClient>, cache: Arc<dyn CacheStore<Proposal>>) -> Self {
        Self { client, cache }
    }

    /// Accept or reject `proposal_id` on `job_id`, with optional notes
    /// for the worker.
    pub async fn respond(
        &self,
        job_id: &str,
        proposal_id: &str,
        decision: ProposalDecision,
        notes: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<(), CoreError> {
        if job_id.trim().is_empty() || proposal_id.trim().is_empty() {
            return Err(CoreError::ValidationFailed {
                message: "both a job id and a proposal id are required".into(),
            });
        }

        let status = decision.status();
        let request = ApiRequest::put(format!("jobs/{job_id}/applications/{proposal_id}"))
            .json(json!({ "status": status, "notes": notes }));
        let resp = self.client.execute(&request, cancel).await?;

        self.cache.invalidate(None);
        debug!(path = %request.path, request_id = %resp.request_id, "proposals cache invalidated");
        info!(job_id, proposal_id, %status, "proposal answered");
        Ok(())
    }
}
