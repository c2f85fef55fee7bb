// ── Bids ──
//
// Reads go through `AbortableQuery<BidQuery>`. Mutations go through
// `BidService`: same pipeline (retry + auth recovery), never cached, and
// every successful mutation invalidates the bid cache so the next read
// refetches.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use kelmah_api::{ApiClient, ApiRequest, CancellationToken};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::cache::CacheStore;
use crate::error::CoreError;
use crate::normalize::{PageRequest, normalize_one};
use crate::query::{QueryKey, QuerySpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BidStatus {
    Pending,
    Accepted,
    Rejected,
    Withdrawn,
    Expired,
    #[serde(other)]
    Unknown,
}

impl BidStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Withdrawn => "withdrawn",
            Self::Expired => "expired",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for BidStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default, alias = "job")]
    pub job_id: Option<String>,
    #[serde(default, alias = "bidAmount")]
    pub amount: f64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub status: Option<BidStatus>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// The signed-in worker's bids, optionally filtered by status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidQuery {
    pub worker_id: String,
    pub status: Option<BidStatus>,
    pub page: u32,
    pub limit: u32,
}

impl BidQuery {
    pub fn for_worker(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            status: None,
            page: 1,
            limit: 10,
        }
    }
}

impl QuerySpec for BidQuery {
    type Item = Bid;
    const COLLECTION: &'static str = "bids";

    fn key(&self) -> QueryKey {
        QueryKey::builder()
            .segment(&self.worker_id)
            .optional(self.status)
            .segment(self.page)
            .segment(self.limit)
            .build()
    }

    fn request(&self) -> ApiRequest {
        ApiRequest::get(format!("bids/worker/{}", self.worker_id))
            .param_opt("status", self.status)
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

/// A new bid on a job.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBid {
    pub job_id: String,
    pub amount: f64,
    pub message: Option<String>,
}

impl NewBid {
    fn validate(&self) -> Result<(), CoreError> {
        if self.job_id.trim().is_empty() {
            return Err(CoreError::ValidationFailed {
                message: "a bid needs a job".into(),
            });
        }
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(CoreError::ValidationFailed {
                message: format!("bid amount must be positive, got {}", self.amount),
            });
        }
        Ok(())
    }
}

/// Bid mutations.
pub struct BidService {
    client: Arc<ApiClient>,
    cache: Arc<dyn CacheStore<Bid>>,
}

impl BidService {
    pub fn new(client: Arc<ApiClient>, cache: Arc<dyn CacheStore<Bid>>) -> Self {
        Self { client, cache }
    }

    pub async fn submit(&self, bid: &NewBid, cancel: &CancellationToken) -> Result<Bid, CoreError> {
        bid.validate()?;
        let request = ApiRequest::post("bids").json(json!({
            "jobId": bid.job_id,
            "bidAmount": bid.amount,
            "message": bid.message,
        }));
        let created = self.mutate(&request, cancel).await?;
        info!(bid_id = %created.id, job_id = %bid.job_id, "bid submitted");
        Ok(created)
    }

    pub async fn withdraw(&self, bid_id: &str, cancel: &CancellationToken) -> Result<Bid, CoreError> {
        if bid_id.trim().is_empty() {
            return Err(CoreError::ValidationFailed {
                message: "bid id is required".into(),
            });
        }
        let request = ApiRequest::patch(format!("bids/{bid_id}/withdraw"));
        let withdrawn = self.mutate(&request, cancel).await?;
        info!(bid_id, "bid withdrawn");
        Ok(withdrawn)
    }

    async fn mutate(&self, request: &ApiRequest, cancel: &CancellationToken) -> Result<Bid, CoreError> {
        let resp = self.client.execute(request, cancel).await?;
        self.cache.invalidate(None);
        debug!(path = %request.path, request_id = %resp.request_id, "bid cache invalidated");
        normalize_one(&resp.body, "bid")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn key_distinguishes_status_filter() {
        let all = BidQuery::for_worker("w1");
        let pending = BidQuery {
            status: Some(BidStatus::Pending),
            ..BidQuery::for_worker("w1")
        };
        assert_eq!(all.key().as_str(), "w1:-:1:10");
        assert_eq!(pending.key().as_str(), "w1:pending:1:10");
    }

    #[test]
    fn unrecognized_status_does_not_fail_the_bid() {
        let bid: Bid =
            serde_json::from_value(serde_json::json!({ "_id": "b1", "status": "on_hold" })).unwrap();
        assert_eq!(bid.status, Some(BidStatus::Unknown));
    }

    #[test]
    fn request_targets_worker_path() {
        let req = BidQuery::for_worker("w1").request();
        assert_eq!(req.path, "bids/worker/w1");
    }

    #[test]
    fn invalid_bids_are_rejected_locally() {
        let zero = NewBid {
            job_id: "j1".into(),
            amount: 0.0,
            message: None,
        };
        assert!(matches!(zero.validate(), Err(CoreError::ValidationFailed { .. })));

        let no_job = NewBid {
            job_id: " ".into(),
            amount: 50.0,
            message: None,
        };
        assert!(no_job.validate().is_err());

        let nan = NewBid {
            job_id: "j1".into(),
            amount: f64::NAN,
            message: None,
        };
        assert!(nan.validate().is_err());
    }
}
