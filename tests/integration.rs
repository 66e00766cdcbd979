use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use donation_matcher::api::rest::router;
use donation_matcher::config::{IngestPolicy, MatchingConfig};
use donation_matcher::data::ingest;
use donation_matcher::engine::MatchEngine;
use donation_matcher::state::AppState;
use serde_json::{json, Value};
use tower::ServiceExt;

const RUN_AT: &str = "2025-01-01T08:00:00Z";

fn empty_state() -> Arc<AppState> {
    let engine = MatchEngine::new(MatchingConfig::default()).unwrap();
    Arc::new(AppState::new(engine, 64))
}

/// State holding one pantry, one produce need and two produce donations
/// expiring relative to the current time.
fn seeded_state() -> Arc<AppState> {
    let state = empty_state();
    let now = Utc::now();
    let loaded = ingest(
        vec![profile_json("b1")],
        vec![need_json("n1", "b1", "Produce", 10.0, "High")],
        vec![
            donation_json("d-soon", "Produce", "Chilled", 12.0, &(now + Duration::days(1)).to_rfc3339()),
            donation_json("d-later", "Produce", "Ambient", 12.0, &(now + Duration::days(9)).to_rfc3339()),
        ],
        IngestPolicy::Strict,
    )
    .unwrap();
    state.load(loaded.snapshot);
    state
}

fn profile_json(id: &str) -> Value {
    json!({
        "id": id,
        "name": "Tampines Community Pantry",
        "address": "2 Tampines Central 5",
        "location": { "lat": 1.3530, "lng": 103.9440 },
        "categories_needed": ["Produce", "Bakery"],
        "storage_capabilities": ["Ambient", "Chilled"],
        "weekly_capacity_kg": 500
    })
}

fn need_json(id: &str, beneficiary_id: &str, category: &str, min_qty: f64, urgency: &str) -> Value {
    json!({
        "id": id,
        "beneficiary_id": beneficiary_id,
        "category": category,
        "min_qty": min_qty,
        "urgency": urgency,
        "can_accept": ["Ambient", "Chilled"],
        "created_at": "2025-01-01T07:00:00Z",
        "lat": 1.3530,
        "lng": 103.9440,
        "address": "2 Tampines Central 5"
    })
}

fn donation_json(id: &str, category: &str, storage: &str, quantity: f64, expiry: &str) -> Value {
    json!({
        "id": id,
        "donor_id": "donor-1",
        "donor_name": "FairPrice Tampines",
        "title": "Surplus stock",
        "category": category,
        "quantity": quantity,
        "unit": "kg",
        "storage": storage,
        "expiry_date": expiry,
        "pickup_start": "2025-01-01T09:00:00Z",
        "pickup_end": "2025-01-01T12:00:00Z",
        "address": "1 Tampines Ave",
        "location": { "lat": 1.3530, "lng": 103.9440 },
        "created_at": "2025-01-01T06:00:00Z"
    })
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn post_empty(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn delete_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn health_returns_ok() {
    let app = router(empty_state());
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["beneficiaries"], 0);
    assert_eq!(body["needs"], 0);
    assert_eq!(body["donations"], 0);
    assert_eq!(body["claims"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let app = router(empty_state());
    let response = app.oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("matches_created_total"));
}

#[tokio::test]
async fn stateless_match_scores_and_explains() {
    let app = router(empty_state());
    let response = app
        .oneshot(json_request(
            "POST",
            "/match",
            json!({
                "now": RUN_AT,
                "profiles": [profile_json("b1")],
                "needs": [need_json("n1", "b1", "Produce", 10.0, "High")],
                "donations": [
                    donation_json("d1", "Produce", "Chilled", 12.0, "2025-01-02T08:00:00Z"),
                    donation_json("d-frozen", "Produce", "Frozen", 50.0, "2025-01-02T08:00:00Z")
                ]
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let matches = body["matches"].as_array().unwrap();
    assert_eq!(matches.len(), 1);

    let top = &matches[0];
    assert_eq!(top["donation_id"], "d1");
    assert_eq!(top["need_id"], "n1");
    assert_eq!(top["beneficiary_id"], "b1");
    assert_eq!(top["geographic_proximity_score"], 100.0);
    assert_eq!(top["expiry_urgency_score"], 100.0);
    assert_eq!(top["storage_compatibility_score"], 85.0);
    assert_eq!(top["category_match_score"], 100.0);
    assert!((top["overall_match_score"].as_f64().unwrap() - 97.0).abs() < 1e-9);
    assert_eq!(top["match_status"], "EXCELLENT");
    assert!(!top["reasoning"].as_str().unwrap().is_empty());

    let allocation = &body["allocations"][0];
    assert_eq!(allocation["quantity"], 12.0);
    let tags: Vec<&str> = allocation["tags"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(tags.contains(&"FEFO"));
    assert!(tags.contains(&"Nearby"));
    assert!(tags.contains(&"Urgent"));

    assert!(body["unmatched_needs"].as_array().unwrap().is_empty());
    assert!(body["rejected_records"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn stateless_match_reports_rejected_records_and_unmatched_needs() {
    let app = router(empty_state());
    let response = app
        .oneshot(json_request(
            "POST",
            "/match",
            json!({
                "now": RUN_AT,
                "profiles": [profile_json("b1")],
                "needs": [
                    need_json("n1", "b1", "Bakery", 5.0, "Medium"),
                    need_json("n-orphan", "nobody", "Bakery", 5.0, "Medium")
                ],
                "donations": [
                    donation_json("d1", "Produce", "Ambient", 10.0, "2025-01-05"),
                    donation_json("d-empty", "Produce", "Ambient", 0.0, "2025-01-05")
                ]
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert!(body["matches"].as_array().unwrap().is_empty());
    assert_eq!(body["unmatched_needs"][0]["need_id"], "n1");
    assert_eq!(body["unmatched_needs"][0]["reason"], "NO_COMPATIBLE_DONATION");

    let rejected = body["rejected_records"].as_array().unwrap();
    assert_eq!(rejected.len(), 2);
    assert_eq!(rejected[0]["collection"], "needs");
    assert_eq!(rejected[0]["id"], "n-orphan");
    assert_eq!(rejected[1]["collection"], "donations");
    assert_eq!(rejected[1]["index"], 1);
}

#[tokio::test]
async fn stateless_match_strict_mode_rejects_request() {
    let app = router(empty_state());
    let response = app
        .oneshot(json_request(
            "POST",
            "/match",
            json!({
                "now": RUN_AT,
                "strict": true,
                "profiles": [profile_json("b1")],
                "needs": [],
                "donations": [donation_json("d1", "Produce", "Ambient", -1.0, "2025-01-05")]
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("donations[0]"));
}

#[tokio::test]
async fn stateless_match_with_bad_timestamp_returns_400() {
    let app = router(empty_state());
    let response = app
        .oneshot(json_request("POST", "/match", json!({ "now": "yesterday" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn run_claims_and_streams_nothing_twice() {
    let state = seeded_state();
    let mut events = state.claim_events_tx.subscribe();

    let response = router(state.clone()).oneshot(post_empty("/runs")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let matches = body["matches"].as_array().unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0]["donation_id"], "d-soon");

    let event = events.try_recv().unwrap();
    assert_eq!(event.donation_id, "d-soon");
    assert_eq!(event.need_id, "n1");

    let response = router(state.clone())
        .oneshot(get_request("/donations/d-soon"))
        .await
        .unwrap();
    let donation = body_json(response).await;
    assert_eq!(donation["status"], "CLAIMED");
    assert_eq!(donation["quantity"], 0.0);

    let response = router(state.clone()).oneshot(post_empty("/runs")).await.unwrap();
    let body = body_json(response).await;
    assert!(body["matches"].as_array().unwrap().is_empty());

    let response = router(state.clone()).oneshot(get_request("/claims")).await.unwrap();
    let claims = body_json(response).await;
    assert_eq!(claims.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn kpis_reflect_claims() {
    let state = seeded_state();
    router(state.clone()).oneshot(post_empty("/runs")).await.unwrap();

    let response = router(state).oneshot(get_request("/kpis")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["total_claims"], 1);
    assert_eq!(body["match_rate"], 100.0);
    assert_eq!(body["fill_rate"], 120.0);
    assert_eq!(body["wastage_avoided"], 12.0);
}

#[tokio::test]
async fn get_nonexistent_donation_returns_404() {
    let app = router(empty_state());
    let response = app.oneshot(get_request("/donations/missing")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("missing"));
}

#[tokio::test]
async fn create_donation_then_list_available() {
    let state = empty_state();
    let expiry = (Utc::now() + Duration::days(3)).to_rfc3339();
    let payload = donation_json("d-new", "Bakery", "Ambient", 6.0, &expiry);

    let response = router(state.clone())
        .oneshot(json_request("POST", "/donations", payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["id"], "d-new");
    assert_eq!(body["status"], "AVAILABLE");

    let response = router(state)
        .oneshot(get_request("/donations?status=AVAILABLE"))
        .await
        .unwrap();
    let list = body_json(response).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn create_donation_with_zero_quantity_returns_422() {
    let app = router(empty_state());
    let expiry = (Utc::now() + Duration::days(3)).to_rfc3339();
    let response = app
        .oneshot(json_request(
            "POST",
            "/donations",
            donation_json("d-zero", "Bakery", "Ambient", 0.0, &expiry),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn create_expired_donation_returns_422() {
    let app = router(empty_state());
    let response = app
        .oneshot(json_request(
            "POST",
            "/donations",
            donation_json("d-old", "Bakery", "Ambient", 3.0, "2020-01-01"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn duplicate_donation_returns_409() {
    let state = seeded_state();
    let expiry = (Utc::now() + Duration::days(3)).to_rfc3339();
    let response = router(state)
        .oneshot(json_request(
            "POST",
            "/donations",
            donation_json("d-soon", "Bakery", "Ambient", 3.0, &expiry),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn create_need_defaults_to_profile_location() {
    let state = seeded_state();
    let response = router(state.clone())
        .oneshot(json_request(
            "POST",
            "/needs",
            json!({
                "beneficiary_id": "b1",
                "category": "Bakery",
                "min_qty": 4,
                "urgency": "Low",
                "can_accept": ["Ambient"]
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["lat"], 1.3530);
    assert_eq!(body["address"], "2 Tampines Central 5");

    let response = router(state).oneshot(get_request("/needs")).await.unwrap();
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn create_need_for_unknown_beneficiary_returns_422() {
    let app = router(seeded_state());
    let response = app
        .oneshot(json_request(
            "POST",
            "/needs",
            json!({
                "beneficiary_id": "ghost",
                "category": "Bakery",
                "min_qty": 4,
                "urgency": "Low",
                "can_accept": ["Ambient"]
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn list_beneficiaries_returns_loaded_profiles() {
    let app = router(seeded_state());
    let response = app.oneshot(get_request("/beneficiaries")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body[0]["id"], "b1");
}

#[tokio::test]
async fn claim_is_approved_routed_and_completed() {
    let state = seeded_state();
    router(state.clone()).oneshot(post_empty("/runs")).await.unwrap();
    let claim_id = state.claims.iter().next().unwrap().id;

    let response = router(state.clone())
        .oneshot(json_request("PATCH", &format!("/claims/{claim_id}"), json!({ "status": "ROUTED" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = router(state.clone())
        .oneshot(json_request(
            "POST",
            &format!("/claims/{claim_id}/approve"),
            json!({ "approved_by": "ops-lead" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["approved_by"], "ops-lead");
    assert_eq!(body["status"], "PENDING_PICKUP");

    for next in ["ROUTED", "COMPLETED"] {
        let response = router(state.clone())
            .oneshot(json_request("PATCH", &format!("/claims/{claim_id}"), json!({ "status": next })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = router(state.clone())
        .oneshot(get_request(&format!("/claims/{claim_id}")))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["status"], "COMPLETED");

    let response = router(state)
        .oneshot(json_request("PATCH", &format!("/claims/{claim_id}"), json!({ "status": "CANCELLED" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn cancelled_claim_reopens_need_without_freeing_donation() {
    let state = seeded_state();
    router(state.clone()).oneshot(post_empty("/runs")).await.unwrap();
    let claim_id = state.claims.iter().next().unwrap().id;

    let response = router(state.clone())
        .oneshot(json_request("PATCH", &format!("/claims/{claim_id}"), json!({ "status": "CANCELLED" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = router(state.clone())
        .oneshot(get_request("/donations/d-soon"))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["status"], "CLAIMED");

    let response = router(state.clone()).oneshot(post_empty("/runs")).await.unwrap();
    let body = body_json(response).await;
    let matches = body["matches"].as_array().unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0]["donation_id"], "d-later");

    let response = router(state).oneshot(get_request("/kpis")).await.unwrap();
    assert_eq!(body_json(response).await["total_claims"], 1);
}

#[tokio::test]
async fn unknown_claim_returns_404() {
    let state = empty_state();
    let missing = uuid::Uuid::new_v4();

    let response = router(state.clone())
        .oneshot(get_request(&format!("/claims/{missing}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = router(state)
        .oneshot(json_request(
            "POST",
            &format!("/claims/{missing}/approve"),
            json!({ "approved_by": "ops-lead" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_refuses_records_with_open_claims() {
    let state = seeded_state();
    router(state.clone()).oneshot(post_empty("/runs")).await.unwrap();

    let response = router(state.clone())
        .oneshot(delete_request("/donations/d-soon"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = router(state.clone())
        .oneshot(delete_request("/needs/n1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = router(state.clone())
        .oneshot(delete_request("/donations/d-later"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["id"], "d-later");

    let response = router(state)
        .oneshot(delete_request("/donations/d-later"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_unclaimed_need() {
    let state = seeded_state();

    let response = router(state.clone())
        .oneshot(delete_request("/needs/n1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(state.needs.is_empty());

    let response = router(state).oneshot(delete_request("/needs/n1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
