//! In-process scenario tests for mdk-daemon HTTP endpoints.
//!
//! The router is driven via `tower::ServiceExt::oneshot`; no socket is bound.

use std::sync::Arc;

use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use mdk_daemon::{routes, state};
use serde_json::{json, Value};
use tower::ServiceExt; // oneshot

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn make_state() -> Arc<state::AppState> {
    Arc::new(state::AppState::in_memory())
}

async fn call(router: axum::Router, req: Request<axum::body::Body>) -> (StatusCode, bytes::Bytes) {
    let resp = router.oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let body = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    (status, body)
}

fn parse_json(b: bytes::Bytes) -> Value {
    serde_json::from_slice(&b).expect("body is not valid JSON")
}

fn get(uri: &str) -> Request<axum::body::Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<axum::body::Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(axum::body::Body::from(body.to_string()))
        .unwrap()
}

fn post_empty(uri: &str) -> Request<axum::body::Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap()
}

fn post_raw(uri: &str, body: &str) -> Request<axum::body::Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(axum::body::Body::from(body.to_string()))
        .unwrap()
}

async fn submit_leak(st: &Arc<state::AppState>) -> String {
    let (status, body) = call(
        routes::build_router(Arc::clone(st)),
        post_json(
            "/v1/memos",
            json!({"title": "Leak", "raisedBy": "Alice", "complaint": "pipe leak"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    parse_json(body)["id"].as_str().unwrap().to_string()
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_returns_200_ok_true() {
    let (status, body) = call(routes::build_router(make_state()), get("/v1/health")).await;
    assert_eq!(status, StatusCode::OK);

    let json = parse_json(body);
    assert_eq!(json["ok"], true);
    assert_eq!(json["service"], "mdk-daemon");
    assert_eq!(json["store"], "memory");
}

// ---------------------------------------------------------------------------
// Memo lifecycle over HTTP
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_returns_pending_memo_with_camel_case_fields() {
    let st = make_state();
    let id = submit_leak(&st).await;

    let (status, body) = call(routes::build_router(st), get(&format!("/v1/memos/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    let memo = parse_json(body);
    assert_eq!(memo["status"], "Pending");
    assert_eq!(memo["escalationLevel"], 0);
    assert_eq!(memo["natureOfComplaint"], "pipe leak");
    assert_eq!(memo["raisedBy"], "Alice");
    assert!(memo["assignedTo"].is_null());
}

#[tokio::test]
async fn submit_without_raiser_is_422() {
    let (status, body) = call(
        routes::build_router(make_state()),
        post_json("/v1/memos", json!({"title": "Leak", "complaint": "pipe leak"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(parse_json(body)["kind"], "validation");
}

#[tokio::test]
async fn escalate_twice_then_withhold_then_complete_is_409() {
    let st = make_state();
    let id = submit_leak(&st).await;

    for _ in 0..2 {
        let (status, _) = call(
            routes::build_router(Arc::clone(&st)),
            post_empty(&format!("/v1/memos/{id}/escalate")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = call(
        routes::build_router(Arc::clone(&st)),
        post_json(
            &format!("/v1/memos/{id}/withhold"),
            json!({"reason": "no parts", "actor": "dean-1"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let memo = parse_json(body);
    assert_eq!(memo["status"], "Withheld");
    assert_eq!(memo["escalationLevel"], 2);
    assert_eq!(memo["notes"], "no parts");

    let (status, body) = call(
        routes::build_router(Arc::clone(&st)),
        post_empty(&format!("/v1/memos/{id}/complete")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(parse_json(body)["kind"], "invalid_transition");
}

#[tokio::test]
async fn approve_with_assignee_then_complete() {
    let st = make_state();
    let id = submit_leak(&st).await;

    let (status, body) = call(
        routes::build_router(Arc::clone(&st)),
        post_json(
            &format!("/v1/memos/{id}/approve"),
            json!({"assignedTo": "Plumbing", "actor": "dean-1"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse_json(body)["assignedTo"], "Plumbing");

    let (status, body) = call(
        routes::build_router(Arc::clone(&st)),
        post_empty(&format!("/v1/memos/{id}/approve")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "re-approval must be refused");
    assert_eq!(parse_json(body)["kind"], "invalid_transition");

    let (status, body) = call(
        routes::build_router(st),
        post_empty(&format!("/v1/memos/{id}/complete")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse_json(body)["status"], "Completed");
}

#[tokio::test]
async fn complete_without_assignee_is_422() {
    let st = make_state();
    let id = submit_leak(&st).await;
    let (status, _) = call(
        routes::build_router(Arc::clone(&st)),
        post_empty(&format!("/v1/memos/{id}/approve")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(
        routes::build_router(st),
        post_empty(&format!("/v1/memos/{id}/complete")),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(parse_json(body)["kind"], "validation");
}

#[tokio::test]
async fn tag_is_idempotent_over_http() {
    let st = make_state();
    let id = submit_leak(&st).await;
    call(
        routes::build_router(Arc::clone(&st)),
        post_empty(&format!("/v1/memos/{id}/escalate")),
    )
    .await;

    for _ in 0..2 {
        let (status, body) = call(
            routes::build_router(Arc::clone(&st)),
            post_json(&format!("/v1/memos/{id}/tag"), json!({"department": "Civil"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(parse_json(body)["taggedDepartments"], json!(["Civil"]));
    }
}

#[tokio::test]
async fn unknown_and_malformed_ids() {
    let st = make_state();
    let missing = "00000000-0000-4000-8000-000000000000";
    let (status, body) = call(
        routes::build_router(Arc::clone(&st)),
        get(&format!("/v1/memos/{missing}")),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(parse_json(body)["kind"], "not_found");

    let (status, _) = call(routes::build_router(st), get("/v1/memos/not-a-uuid")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn list_filters_by_status_and_rejects_unknown_status() {
    let st = make_state();
    let a = submit_leak(&st).await;
    let _b = submit_leak(&st).await;
    call(
        routes::build_router(Arc::clone(&st)),
        post_json(&format!("/v1/memos/{a}/approve"), json!({"assignedTo": "Civil"})),
    )
    .await;

    let (status, body) = call(
        routes::build_router(Arc::clone(&st)),
        get("/v1/memos?status=Pending"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let list = parse_json(body);
    let items = list.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert!(items.iter().all(|m| m["status"] == "Pending"));

    let (status, body) = call(
        routes::build_router(Arc::clone(&st)),
        get("/v1/memos?assignedTo=Civil"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let list = parse_json(body);
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["id"], a.as_str());

    let (status, body) = call(routes::build_router(st), get("/v1/memos?status=Lost")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(parse_json(body)["kind"], "validation");
}

// ---------------------------------------------------------------------------
// Users / roles / catalog
// ---------------------------------------------------------------------------

#[tokio::test]
async fn register_and_fetch_user() {
    let st = make_state();
    let (status, body) = call(
        routes::build_router(Arc::clone(&st)),
        post_json(
            "/v1/users",
            json!({"userId": "uid-1", "phone": "+910000000001", "role": "Dean"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
        parse_json(body)["privileges"],
        json!(["approve", "escalate", "monitor"])
    );

    let (status, body) = call(routes::build_router(Arc::clone(&st)), get("/v1/users/uid-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse_json(body)["role"], "Dean");

    let (status, body) = call(routes::build_router(st), get("/v1/users/nobody")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(parse_json(body)["kind"], "user_not_found");
}

#[tokio::test]
async fn register_with_unknown_role_is_422() {
    let (status, _) = call(
        routes::build_router(make_state()),
        post_json(
            "/v1/users",
            json!({"userId": "uid-2", "phone": "+910000000002", "role": "Cook"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn role_privileges_lookup_is_permissive() {
    let st = make_state();
    let (status, body) = call(
        routes::build_router(Arc::clone(&st)),
        get("/v1/roles/Electrician/privileges"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse_json(body)["privileges"], json!(["respond", "escalate"]));

    let (status, body) = call(routes::build_router(st), get("/v1/roles/Cook/privileges")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse_json(body)["privileges"], json!([]));
}

#[tokio::test]
async fn catalog_lists_roles_and_departments() {
    let (status, body) = call(routes::build_router(make_state()), get("/v1/catalog")).await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json["roles"], json!(["Nurse", "Electrician", "Plumber", "Dean"]));
    assert_eq!(
        json["departments"],
        json!(["Civil", "Electrical", "Laundry", "Plumbing"])
    );
}

// ---------------------------------------------------------------------------
// GET /v1/memos/stream
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stream_opens_with_filtered_snapshot() {
    let st = make_state();
    let _id = submit_leak(&st).await;

    let resp = routes::build_router(st)
        .oneshot(get("/v1/memos/stream?status=Pending"))
        .await
        .expect("oneshot failed");
    assert_eq!(resp.status(), StatusCode::OK);

    let mut body = resp.into_body();
    let frame = tokio::time::timeout(std::time::Duration::from_secs(2), body.frame())
        .await
        .expect("no SSE frame within 2s")
        .expect("stream ended")
        .expect("frame error");
    let data = frame.into_data().expect("not a data frame");
    let text = String::from_utf8_lossy(&data);
    assert!(text.contains("event: snapshot"), "got: {text}");
    assert!(text.contains("\"Pending\""), "got: {text}");
}

#[tokio::test]
async fn stream_with_unknown_status_is_422() {
    let (status, _) = call(
        routes::build_router(make_state()),
        get("/v1/memos/stream?status=Lost"),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

// ---------------------------------------------------------------------------
// Store write failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_store_write_is_503_and_memo_unchanged() {
    let store = Arc::new(mdk_db::MemoryMemoStore::new());
    let service = mdk_lifecycle::LifecycleService::from_store(Arc::clone(&store));
    let st = Arc::new(state::AppState::new(Arc::new(service), "memory"));
    let id = submit_leak(&st).await;

    store.fail_writes_for_test(true);
    let (status, body) = call(
        routes::build_router(Arc::clone(&st)),
        post_empty(&format!("/v1/memos/{id}/escalate")),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(parse_json(body)["kind"], "write");

    store.fail_writes_for_test(false);
    let (status, body) = call(routes::build_router(st), get(&format!("/v1/memos/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    let memo = parse_json(body);
    assert_eq!(memo["status"], "Pending");
    assert_eq!(memo["escalationLevel"], 0);
}

// ---------------------------------------------------------------------------
// Audit trail
// ---------------------------------------------------------------------------

#[tokio::test]
async fn transitions_over_http_land_in_audit_trail() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");
    let writer = mdk_audit::AuditWriter::new(&path, true).unwrap();
    let service = mdk_lifecycle::LifecycleService::from_store(Arc::new(
        mdk_db::MemoryMemoStore::new(),
    ))
    .with_audit(writer);
    let st = Arc::new(state::AppState::new(Arc::new(service), "memory"));

    let id = submit_leak(&st).await;
    let (status, _) = call(
        routes::build_router(Arc::clone(&st)),
        post_json(&format!("/v1/memos/{id}/escalate"), json!({"actor": "dean-1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let verdict = mdk_audit::verify_hash_chain(&path).unwrap();
    assert_eq!(verdict, mdk_audit::VerifyResult::Valid { lines: 2 });

    let log = std::fs::read_to_string(&path).unwrap();
    let last: Value = serde_json::from_str(log.lines().last().unwrap()).unwrap();
    assert_eq!(last["actor"], "dean-1");
    assert_eq!(last["action"], "escalate");
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[tokio::test]
async fn approve_with_mistyped_body_is_422_and_memo_stays_pending() {
    let st = make_state();
    let id = submit_leak(&st).await;

    let (status, body) = call(
        routes::build_router(Arc::clone(&st)),
        post_json(&format!("/v1/memos/{id}/approve"), json!({"assignedTo": ["Civil"]})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(parse_json(body)["kind"], "validation");

    let (_, body) = call(routes::build_router(st), get(&format!("/v1/memos/{id}"))).await;
    let memo = parse_json(body);
    assert_eq!(memo["status"], "Pending");
    assert!(memo["assignedTo"].is_null());
}

#[tokio::test]
async fn approve_body_without_content_type_is_still_honoured() {
    let st = make_state();
    let id = submit_leak(&st).await;

    let (status, body) = call(
        routes::build_router(Arc::clone(&st)),
        post_raw(&format!("/v1/memos/{id}/approve"), r#"{"assignedTo":"Civil"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let memo = parse_json(body);
    assert_eq!(memo["status"], "Approved");
    assert_eq!(memo["assignedTo"], "Civil");

    let (status, body) = call(
        routes::build_router(st),
        post_empty(&format!("/v1/memos/{id}/complete")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse_json(body)["status"], "Completed");
}

#[tokio::test]
async fn escalate_with_garbage_body_is_422_and_level_unchanged() {
    let st = make_state();
    let id = submit_leak(&st).await;

    let (status, body) = call(
        routes::build_router(Arc::clone(&st)),
        post_raw(&format!("/v1/memos/{id}/escalate"), "actor=dean-1"),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(parse_json(body)["kind"], "validation");

    let (_, body) = call(routes::build_router(st), get(&format!("/v1/memos/{id}"))).await;
    assert_eq!(parse_json(body)["escalationLevel"], 0);
}

#[tokio::test]
async fn missing_or_malformed_required_bodies_are_json_422() {
    let st = make_state();
    let id = submit_leak(&st).await;
    call(
        routes::build_router(Arc::clone(&st)),
        post_empty(&format!("/v1/memos/{id}/escalate")),
    )
    .await;

    let cases = [
        post_empty(&format!("/v1/memos/{id}/withhold")),
        post_json(&format!("/v1/memos/{id}/withhold"), json!({"reason": 7})),
        post_empty(&format!("/v1/memos/{id}/tag")),
        post_raw(&format!("/v1/memos/{id}/tag"), "{not json"),
        post_empty("/v1/memos"),
        post_json("/v1/users", json!({"userId": "uid-3"})),
    ];
    for req in cases {
        let uri = req.uri().to_string();
        let (status, body) = call(routes::build_router(Arc::clone(&st)), req).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{uri}");
        let err = parse_json(body);
        assert_eq!(err["kind"], "validation", "{uri}");
        assert!(err["error"].as_str().unwrap().contains("malformed request body"), "{uri}");
    }

    let (_, body) = call(routes::build_router(st), get(&format!("/v1/memos/{id}"))).await;
    let memo = parse_json(body);
    assert_eq!(memo["status"], "Escalated");
    assert_eq!(memo["taggedDepartments"], json!([]));
}

#[tokio::test]
async fn stream_forwards_bus_heartbeats() {
    let st = make_state();
    let resp = routes::build_router(Arc::clone(&st))
        .oneshot(get("/v1/memos/stream"))
        .await
        .expect("oneshot failed");
    let mut body = resp.into_body();

    let wait = std::time::Duration::from_secs(2);
    let first = tokio::time::timeout(wait, body.frame())
        .await
        .expect("no snapshot frame")
        .expect("stream ended")
        .expect("frame error");
    assert!(String::from_utf8_lossy(first.data_ref().unwrap()).contains("event: snapshot"));

    st.bus
        .send(state::BusMsg::Heartbeat { ts_millis: 42 })
        .expect("stream holds a bus receiver");
    let next = tokio::time::timeout(wait, body.frame())
        .await
        .expect("no heartbeat frame")
        .expect("stream ended")
        .expect("frame error");
    let text = String::from_utf8_lossy(next.data_ref().unwrap()).to_string();
    assert!(text.contains("event: heartbeat"), "got: {text}");
    assert!(text.contains(r#""type":"heartbeat""#), "got: {text}");
    assert!(text.contains(r#""ts_millis":42"#), "got: {text}");
}
