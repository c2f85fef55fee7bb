#![allow(clippy::unwrap_used, clippy::float_cmp)]
// Consumer-level tests: AppContext wiring, bid mutations, quick-job
// polling, and per-resource cache behavior.

mod common;

use std::sync::Arc;
use std::time::Duration;

use kelmah_api::{Method, SessionEndReason, SessionEvent, TokenStore};
use kelmah_core::{
    AppContext, BidQuery, BidStatus, CacheStore, CoreError, LocationQuery, NewBid,
    ProposalDecision, ProposalQuery, ProposalStatus, QueryErrorKind, QueryOptions, QuickJobStatus,
    RunOptions, WorkerSearch,
};
use serde_json::json;

use common::{ScriptedTransport, Step, proposals_body};

fn bids_body() -> serde_json::Value {
    json!({
        "data": {
            "items": [
                { "_id": "b1", "jobId": "j1", "bidAmount": 250.0, "status": "pending" },
                { "_id": "b2", "jobId": "j2", "bidAmount": 90.0, "status": "accepted" }
            ],
            "pagination": { "page": 1, "totalPages": 1, "totalItems": 2, "limit": 10 }
        }
    })
}

fn quick_job_body(status: &str) -> serde_json::Value {
    json!({ "success": true, "data": { "_id": "qj1", "status": status, "category": "plumbing" } })
}

// ── AppContext ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_context_queries_are_mounted_and_cached_per_resource() {
    let transport = ScriptedTransport::new(vec![
        Step::Respond(proposals_body(&["p1"], json!({ "page": 1, "totalPages": 1 }))),
        Step::Respond(json!({ "workers": [{ "_id": "w1", "firstName": "Ama", "skills": ["tiling"] }] })),
    ]);
    let ctx = common::context(&transport);

    let proposals = ctx.proposals(ProposalQuery {
        status: ProposalStatus::Pending,
        ..ProposalQuery::default()
    });
    let proposals_state = proposals.settled().await;
    assert_eq!(proposals_state.items()[0].id, "p1");

    let workers = ctx.workers(WorkerSearch {
        query: Some("tiler".into()),
        ..WorkerSearch::default()
    });
    let workers_state = workers.settled().await;
    assert_eq!(workers_state.items()[0].display_name(), "Ama");

    assert_eq!(ctx.caches().proposals.len(), 1);
    assert_eq!(ctx.caches().workers.len(), 1);
    assert!(ctx.caches().proposals.get("pending:1:10").is_some());

    let requests = transport.requests();
    assert_eq!(requests[1].path, "workers/search");
    assert!(requests[1].params.contains(&("query".to_owned(), "tiler".to_owned())));
}

#[tokio::test(start_paused = true)]
async fn test_second_consumer_reuses_fresh_cache() {
    let transport = ScriptedTransport::new(vec![Step::Respond(proposals_body(
        &["p1", "p2"],
        json!({}),
    ))]);
    let ctx = common::context(&transport);

    let first = ctx.proposals(ProposalQuery::default());
    first.settled().await;
    drop(first);

    let second = ctx.proposals(ProposalQuery::default());
    let state = second.state();
    assert!(!state.is_busy());
    assert_eq!(state.items().len(), 2);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_locations_go_stale_after_thirty_seconds() {
    let transport = ScriptedTransport::new(vec![
        Step::Respond(json!({ "locations": [{ "placeId": "p1", "name": "Accra" }] })),
        Step::Respond(json!({ "locations": [{ "placeId": "p1", "name": "Accra" }] })),
    ]);
    let ctx = common::context(&transport);

    let query = ctx.locations(LocationQuery::new("acc"));
    query.settled().await;

    tokio::time::advance(Duration::from_secs(31)).await;
    query.run(RunOptions::default());
    assert!(query.state().refreshing);
    query.settled().await;
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_sign_out_clears_tokens_and_caches() {
    let transport = ScriptedTransport::new(vec![Step::Respond(bids_body())]);
    let tokens = common::signed_in_tokens();
    let ctx = AppContext::new(
        common::client_with(&transport, Arc::clone(&tokens)),
        QueryOptions::default(),
    );
    let mut events = ctx.session_events();

    let bids = ctx.bids(BidQuery::for_worker("w1"));
    bids.settled().await;
    assert_eq!(ctx.caches().bids.len(), 1);

    ctx.sign_out();

    assert!(ctx.caches().bids.is_empty());
    assert!(tokens.access_token().unwrap().is_none());
    assert!(tokens.refresh_token().unwrap().is_none());
    assert_eq!(
        events.try_recv().unwrap(),
        SessionEvent::Ended {
            reason: SessionEndReason::SignedOut
        }
    );
}

// ── Proposals ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_mixed_statuses_keep_the_whole_page() {
    let transport = ScriptedTransport::new(vec![Step::Respond(json!({
        "data": [
            { "_id": "p1", "status": "pending" },
            { "_id": "p2", "status": "under_review" },
            { "_id": "p3", "status": "archived" }
        ]
    }))]);
    let ctx = common::context(&transport);

    let proposals = ctx.proposals(ProposalQuery::default());
    let state = proposals.settled().await;

    assert!(state.error.is_none(), "{:?}", state.error);
    let statuses: Vec<_> = state.items().iter().map(|p| p.status).collect();
    assert_eq!(
        statuses,
        vec![
            Some(ProposalStatus::Pending),
            Some(ProposalStatus::UnderReview),
            Some(ProposalStatus::Unknown),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_accepting_a_proposal_invalidates_the_list() {
    let transport = ScriptedTransport::new(vec![
        Step::Respond(proposals_body(&["p1", "p2"], json!({}))),
        Step::Respond(json!({ "success": true, "data": { "_id": "p1", "status": "accepted" } })),
        Step::Respond(proposals_body(&["p2"], json!({}))),
    ]);
    let ctx = common::context(&transport);
    let proposals = ctx.proposals(ProposalQuery::default());
    proposals.settled().await;
    assert_eq!(ctx.caches().proposals.len(), 1);

    ctx.proposal_service()
        .respond(
            "j1",
            "p1",
            ProposalDecision::Accept,
            Some("See you Monday"),
            &kelmah_api::CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(ctx.caches().proposals.is_empty());
    let request = &transport.requests()[1];
    assert_eq!(request.method, Method::PUT);
    assert_eq!(request.path, "jobs/j1/applications/p1");
    assert_eq!(
        request.body,
        Some(json!({ "status": "accepted", "notes": "See you Monday" }))
    );

    proposals.run(RunOptions::default());
    let state = proposals.settled().await;
    assert_eq!(state.items().len(), 1);
    assert_eq!(transport.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_failed_response_keeps_the_cache() {
    let transport = ScriptedTransport::new(vec![
        Step::Respond(proposals_body(&["p1"], json!({}))),
        Step::status(404),
    ]);
    let ctx = common::context(&transport);
    let proposals = ctx.proposals(ProposalQuery::default());
    proposals.settled().await;

    let err = ctx
        .proposal_service()
        .respond(
            "j1",
            "p1",
            ProposalDecision::Reject,
            None,
            &kelmah_api::CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(404));
    assert_eq!(ctx.caches().proposals.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_proposal_response_needs_ids() {
    let transport = ScriptedTransport::new(vec![]);
    let ctx = common::context(&transport);

    let err = ctx
        .proposal_service()
        .respond(
            "",
            "p1",
            ProposalDecision::Accept,
            None,
            &kelmah_api::CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::ValidationFailed { .. }));
    assert_eq!(transport.calls(), 0);
}

// ── Bids ────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_bid_list_decodes_aliases() {
    let transport = ScriptedTransport::new(vec![Step::Respond(bids_body())]);
    let ctx = common::context(&transport);

    let bids = ctx.bids(BidQuery::for_worker("w1"));
    let state = bids.settled().await;

    assert_eq!(state.items().len(), 2);
    assert_eq!(state.items()[0].amount, 250.0);
    assert_eq!(state.items()[1].status, Some(BidStatus::Accepted));
    assert_eq!(transport.requests()[0].path, "bids/worker/w1");
}

#[tokio::test(start_paused = true)]
async fn test_submit_bid_invalidates_bid_cache() {
    let transport = ScriptedTransport::new(vec![
        Step::Respond(bids_body()),
        Step::Respond(json!({ "data": { "_id": "b3", "jobId": "j9", "bidAmount": 400.0, "status": "pending" } })),
        Step::Respond(bids_body()),
    ]);
    let ctx = common::context(&transport);
    let bids = ctx.bids(BidQuery::for_worker("w1"));
    bids.settled().await;
    assert_eq!(ctx.caches().bids.len(), 1);

    let created = ctx
        .bid_service()
        .submit(
            &NewBid {
                job_id: "j9".into(),
                amount: 400.0,
                message: Some("Available tomorrow".into()),
            },
            &kelmah_api::CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(created.id, "b3");
    assert!(ctx.caches().bids.is_empty());

    let submit = &transport.requests()[1];
    assert_eq!(submit.method, Method::POST);
    assert_eq!(submit.path, "bids");
    assert_eq!(submit.body.as_ref().unwrap()["bidAmount"], 400.0);

    // The next read goes back to the network.
    bids.run(RunOptions::default());
    bids.settled().await;
    assert_eq!(transport.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_withdraw_uses_patch() {
    let transport = ScriptedTransport::new(vec![Step::Respond(json!({
        "data": { "bid": { "_id": "b1", "bidAmount": 250.0, "status": "withdrawn" } }
    }))]);
    let ctx = common::context(&transport);

    let bid = ctx
        .bid_service()
        .withdraw("b1", &kelmah_api::CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(bid.status, Some(BidStatus::Withdrawn));
    let request = &transport.requests()[0];
    assert_eq!(request.method, Method::PATCH);
    assert_eq!(request.path, "bids/b1/withdraw");
}

#[tokio::test(start_paused = true)]
async fn test_invalid_bid_never_reaches_network() {
    let transport = ScriptedTransport::new(vec![]);
    let ctx = common::context(&transport);

    let err = ctx
        .bid_service()
        .submit(
            &NewBid {
                job_id: "j1".into(),
                amount: -5.0,
                message: None,
            },
            &kelmah_api::CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::ValidationFailed { .. }));
    assert_eq!(transport.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_bid_keeps_backend_code() {
    let transport = ScriptedTransport::new(vec![Step::Fail(kelmah_api::Error::Http {
        status: 409,
        message: "You already bid on this job".into(),
        code: Some("DUPLICATE_BID".into()),
    })]);
    let ctx = common::context(&transport);

    let err = ctx
        .bid_service()
        .submit(
            &NewBid {
                job_id: "j1".into(),
                amount: 100.0,
                message: None,
            },
            &kelmah_api::CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(409));
    assert!(matches!(err, CoreError::Api { code: Some(ref c), .. } if c == "DUPLICATE_BID"));
    assert_eq!(transport.calls(), 1);
}

// ── Quick-job tracking ──────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_tracker_polls_until_dropped() {
    let transport = ScriptedTransport::new(vec![
        Step::Respond(quick_job_body("funded")),
        Step::Respond(quick_job_body("worker_on_way")),
        Step::Respond(quick_job_body("worker_arrived")),
    ]);
    let ctx = common::context(&transport).with_poll_interval(Duration::from_secs(15));

    let tracker = ctx.track_quick_job("qj1");
    tracker.settled().await;
    assert_eq!(tracker.job().unwrap().status, QuickJobStatus::Funded);
    assert_eq!(transport.calls(), 1);

    tokio::time::sleep(Duration::from_secs(16)).await;
    assert_eq!(transport.calls(), 2);
    assert_eq!(tracker.job().unwrap().status, QuickJobStatus::WorkerOnWay);
    assert_eq!(transport.requests()[1].path, "quick-jobs/qj1");

    drop(tracker);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_tracker_stops_on_terminal_status() {
    let transport = ScriptedTransport::new(vec![Step::Respond(quick_job_body("approved"))]);
    let ctx = common::context(&transport);

    let tracker = ctx.track_quick_job("qj1");
    tracker.settled().await;
    assert!(tracker.is_polling());

    tokio::time::sleep(Duration::from_secs(16)).await;
    assert!(!tracker.is_polling());
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_tracker_stops_when_job_expires() {
    let transport = ScriptedTransport::new(vec![
        Step::Respond(quick_job_body("expired")),
        Step::Respond(quick_job_body("expired")),
        Step::Respond(quick_job_body("expired")),
    ]);
    let ctx = common::context(&transport);

    let tracker = ctx.track_quick_job("qj1");
    tracker.settled().await;
    assert_eq!(tracker.job().unwrap().status, QuickJobStatus::Expired);

    tokio::time::sleep(Duration::from_secs(46)).await;
    assert!(!tracker.is_polling());
    assert_eq!(transport.calls(), 1);
}

#[test]
fn test_tracker_outside_runtime_does_not_poll() {
    let transport = ScriptedTransport::new(vec![]);
    let ctx = common::context(&transport);

    let tracker = ctx.track_quick_job("qj1");

    assert!(!tracker.is_polling());
    let state = tracker.state();
    assert!(!state.is_busy());
    assert_eq!(state.error.unwrap().kind, QueryErrorKind::Configuration);
    assert_eq!(transport.calls(), 0);
}

// ── Construction from config ────────────────────────────────────────

#[tokio::test]
async fn test_from_config_builds_http_pipeline() {
    let mut config = kelmah_core::ClientConfig::new("https://api.kelmah.test/api".parse().unwrap());
    config.poll_interval = Duration::from_secs(30);
    let tokens: Arc<dyn TokenStore> = Arc::new(kelmah_api::MemoryTokenStore::new());

    let ctx = AppContext::from_config(&config, tokens).unwrap();

    assert_eq!(ctx.options(), QueryOptions::default());
    assert_eq!(ctx.client().transport_timeout(), Some(config.transport.timeout));
}

#[tokio::test]
async fn test_from_config_rejects_short_query_timeout() {
    let mut config = kelmah_core::ClientConfig::new("https://api.kelmah.test/api".parse().unwrap());
    config.query.timeout = Duration::from_secs(1);
    let tokens: Arc<dyn TokenStore> = Arc::new(kelmah_api::MemoryTokenStore::new());

    let err = AppContext::from_config(&config, tokens).err().unwrap();
    assert!(matches!(err, CoreError::Config { .. }));
}
