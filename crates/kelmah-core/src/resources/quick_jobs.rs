// ── Quick-job tracking ──
//
// A single quick job, refreshed on an interval while the tracking view is
// open. The poll loop runs until the tracker is dropped or the job reaches
// a terminal status.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kelmah_api::{ApiRequest, CancellationToken};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::query::{AbortableQuery, QueryKey, QuerySpec, QueryState, RunOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuickJobStatus {
    Pending,
    Quoted,
    Accepted,
    Funded,
    WorkerOnWay,
    WorkerArrived,
    InProgress,
    Completed,
    Approved,
    Disputed,
    Cancelled,
    /// No quotes arrived within the time limit.
    Expired,
    #[serde(other)]
    Unknown,
}

impl QuickJobStatus {
    /// No further progress is expected without user action elsewhere.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Cancelled | Self::Expired)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickJob {
    #[serde(alias = "_id")]
    pub id: String,
    pub status: QuickJobStatus,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Populated quote as sent by the backend; shape varies by role.
    #[serde(default)]
    pub accepted_quote: Option<Value>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuickJobQuery {
    pub id: String,
}

impl QuerySpec for QuickJobQuery {
    type Item = QuickJob;
    const COLLECTION: &'static str = "quickJobs";

    fn key(&self) -> QueryKey {
        QueryKey::builder().segment(&self.id).build()
    }

    fn request(&self) -> ApiRequest {
        ApiRequest::get(format!("quick-jobs/{}", self.id))
    }
}

/// Live view of one quick job, polled until dropped.
pub struct QuickJobTracker {
    query: Arc<AbortableQuery<QuickJobQuery>>,
    shutdown: CancellationToken,
}

impl QuickJobTracker {
    /// Run the query now and poll every `interval` on the current runtime.
    ///
    /// Outside a runtime nothing is polled: the query records a
    /// configuration error and [`is_polling`](Self::is_polling) is `false`.
    pub fn start(query: AbortableQuery<QuickJobQuery>, interval: Duration) -> Self {
        let query = Arc::new(query);
        let shutdown = CancellationToken::new();
        query.run(RunOptions::default());

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(poll_task(Arc::clone(&query), interval, shutdown.clone()));
            }
            Err(_) => {
                warn!(job_id = %query.params().id, "quick job tracker started outside a Tokio runtime");
                shutdown.cancel();
            }
        }
        Self { query, shutdown }
    }

    /// The tracked job, once loaded.
    pub fn job(&self) -> Option<QuickJob> {
        self.query.state().items().first().cloned()
    }

    pub fn state(&self) -> QueryState<QuickJob> {
        self.query.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<QueryState<QuickJob>> {
        self.query.subscribe()
    }

    pub fn refresh(&self) {
        self.query.refresh();
    }

    pub fn retry(&self) {
        self.query.retry();
    }

    pub async fn settled(&self) -> QueryState<QuickJob> {
        self.query.settled().await
    }

    /// `false` once polling has stopped.
    pub fn is_polling(&self) -> bool {
        !self.shutdown.is_cancelled()
    }
}

impl Drop for QuickJobTracker {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.query.cancel();
    }
}

async fn poll_task(
    query: Arc<AbortableQuery<QuickJobQuery>>,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            _ = interval.tick() => {
                let state = query.state();
                if let Some(job) = state.items().first() {
                    if job.status.is_terminal() {
                        debug!(job_id = %job.id, status = ?job.status, "quick job finished; polling stopped");
                        shutdown.cancel();
                        break;
                    }
                }
                // A slow fetch is still running; let it finish.
                if !state.is_busy() {
                    query.refresh();
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn single_job_response_is_one_item_page() {
        let q = QuickJobQuery { id: "qj1".into() };
        let page = q
            .normalize(&json!({
                "success": true,
                "data": { "_id": "qj1", "status": "worker_on_way", "category": "plumbing" }
            }))
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page.items[0].status, QuickJobStatus::WorkerOnWay);
        assert_eq!(q.key().as_str(), "qj1");
        assert_eq!(q.request().path, "quick-jobs/qj1");
    }

    #[test]
    fn unknown_status_is_tolerated() {
        let job: QuickJob =
            serde_json::from_value(json!({ "id": "x", "status": "teleporting" })).unwrap();
        assert_eq!(job.status, QuickJobStatus::Unknown);
        assert!(!job.status.is_terminal());
    }
}
