use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{delete, get};
use axum::Json;
use axum::Router;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::data::validate::validate_need;
use crate::error::AppError;
use crate::models::beneficiary::{BeneficiaryProfile, Need, Urgency};
use crate::models::common::{Category, Storage};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/needs", get(list_needs).post(create_need))
        .route("/needs/:id", delete(delete_need))
        .route("/beneficiaries", get(list_beneficiaries))
}

/// Location, address and delivery preference fall back to the
/// beneficiary's profile when omitted.
#[derive(Deserialize)]
pub struct CreateNeedRequest {
    pub id: Option<String>,
    pub beneficiary_id: String,
    pub category: Category,
    pub min_qty: f64,
    pub urgency: Urgency,
    pub can_accept: Vec<Storage>,
    pub delivery_preferred: Option<bool>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub address: Option<String>,
}

async fn create_need(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateNeedRequest>,
) -> Result<Json<Need>, AppError> {
    let profile = state
        .profiles
        .get(&payload.beneficiary_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| {
            AppError::Validation(format!("unknown beneficiary '{}'", payload.beneficiary_id))
        })?;

    let need = Need {
        id: payload.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        beneficiary_id: profile.id,
        category: payload.category,
        min_qty: payload.min_qty,
        urgency: payload.urgency,
        can_accept: payload.can_accept,
        delivery_preferred: payload.delivery_preferred.unwrap_or(profile.delivery_preferred),
        created_at: Utc::now(),
        lat: payload.lat.unwrap_or(profile.location.lat),
        lng: payload.lng.unwrap_or(profile.location.lng),
        address: payload.address.unwrap_or(profile.address),
    };

    validate_need(&need).map_err(AppError::Validation)?;

    match state.needs.entry(need.id.clone()) {
        Entry::Occupied(_) => Err(AppError::Conflict(format!("need {} already exists", need.id))),
        Entry::Vacant(slot) => {
            slot.insert(need.clone());
            info!(
                need_id = %need.id,
                beneficiary_id = %need.beneficiary_id,
                urgency = need.urgency.as_str(),
                "need created"
            );
            Ok(Json(need))
        }
    }
}

async fn list_needs(State(state): State<Arc<AppState>>) -> Json<Vec<Need>> {
    let mut needs: Vec<Need> = state.needs.iter().map(|entry| entry.value().clone()).collect();
    needs.sort_by(|a, b| a.id.cmp(&b.id));

    Json(needs)
}

async fn list_beneficiaries(State(state): State<Arc<AppState>>) -> Json<Vec<BeneficiaryProfile>> {
    let mut profiles: Vec<BeneficiaryProfile> = state
        .profiles
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    profiles.sort_by(|a, b| a.id.cmp(&b.id));

    Json(profiles)
}

async fn delete_need(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Need>, AppError> {
    let removed = state.delete_need(&id)?;
    info!(need_id = %removed.id, "need deleted");
    Ok(Json(removed))
}
