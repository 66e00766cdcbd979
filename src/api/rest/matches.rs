use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::config::IngestPolicy;
use crate::data::{ingest, RecordError};
use crate::engine::kpis::{self, Kpis};
use crate::engine::runner::run_and_claim;
use crate::error::AppError;
use crate::models::beneficiary::Need;
use crate::models::common::parse_timestamp;
use crate::models::donation::Donation;
use crate::models::matching::{Claim, ClaimStatus, MatchReport};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/match", post(match_snapshot))
        .route("/runs", post(create_run))
        .route("/claims", get(list_claims))
        .route("/claims/:id", get(get_claim).patch(update_claim))
        .route("/claims/:id/approve", post(approve_claim))
        .route("/kpis", get(get_kpis))
}

#[derive(Deserialize)]
pub struct MatchRequest {
    #[serde(default)]
    pub profiles: Vec<Value>,
    #[serde(default)]
    pub needs: Vec<Value>,
    #[serde(default)]
    pub donations: Vec<Value>,
    /// Run time; defaults to the current time.
    pub now: Option<String>,
    #[serde(default)]
    pub strict: bool,
}

#[derive(Serialize)]
pub struct MatchResponse {
    #[serde(flatten)]
    pub report: MatchReport,
    pub rejected_records: Vec<RecordError>,
}

/// Stateless run over the records in the body. Nothing is claimed.
async fn match_snapshot(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<MatchRequest>,
) -> Result<Json<MatchResponse>, AppError> {
    let now = match payload.now.as_deref() {
        Some(raw) => parse_timestamp(raw).map_err(AppError::BadRequest)?,
        None => Utc::now(),
    };
    let policy = if payload.strict {
        IngestPolicy::Strict
    } else {
        IngestPolicy::Lenient
    };

    let loaded = ingest(payload.profiles, payload.needs, payload.donations, policy)?;

    let start = Instant::now();
    let report = state.engine.run(&loaded.snapshot, now);
    state
        .metrics
        .match_run_latency_seconds
        .with_label_values(&["stateless"])
        .observe(start.elapsed().as_secs_f64());
    state
        .metrics
        .match_runs_total
        .with_label_values(&["stateless"])
        .inc();

    info!(
        run_id = %report.run_id,
        matches = report.matches.len(),
        rejected = loaded.rejected.len(),
        "stateless match run"
    );

    Ok(Json(MatchResponse {
        report,
        rejected_records: loaded.rejected,
    }))
}

/// Runs over the stored records and claims every allocation.
async fn create_run(State(state): State<Arc<AppState>>) -> Result<Json<MatchReport>, AppError> {
    let report = run_and_claim(&state, Utc::now())?;
    Ok(Json(report))
}

async fn list_claims(State(state): State<Arc<AppState>>) -> Json<Vec<Claim>> {
    let mut claims: Vec<Claim> = state
        .claims
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    claims.sort_by(|a, b| a.claimed_at.cmp(&b.claimed_at).then_with(|| a.id.cmp(&b.id)));

    Json(claims)
}

async fn get_claim(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Claim>, AppError> {
    state
        .claims
        .get(&id)
        .map(|entry| Json(entry.value().clone()))
        .ok_or_else(|| AppError::NotFound(format!("claim {id} not found")))
}

#[derive(Deserialize)]
pub struct ApproveClaimRequest {
    pub approved_by: String,
}

async fn approve_claim(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ApproveClaimRequest>,
) -> Result<Json<Claim>, AppError> {
    state.approve_claim(id, &payload.approved_by).map(Json)
}

#[derive(Deserialize)]
pub struct UpdateClaimRequest {
    pub status: ClaimStatus,
}

async fn update_claim(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateClaimRequest>,
) -> Result<Json<Claim>, AppError> {
    state.update_claim_status(id, payload.status).map(Json)
}

async fn get_kpis(State(state): State<Arc<AppState>>) -> Json<Kpis> {
    let claims: Vec<Claim> = state
        .claims
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    let needs: Vec<Need> = state.needs.iter().map(|entry| entry.value().clone()).collect();
    let donations: Vec<Donation> = state
        .donations
        .iter()
        .map(|entry| entry.value().clone())
        .collect();

    Json(kpis::compute(&claims, &needs, &donations))
}
