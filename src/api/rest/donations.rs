use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::data::validate::validate_donation;
use crate::error::AppError;
use crate::models::common::{deserialize_timestamp, Category, Location, Storage};
use crate::models::donation::{Donation, DonationStatus, Unit};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/donations", get(list_donations).post(create_donation))
        .route("/donations/:id", get(get_donation).delete(delete_donation))
}

#[derive(Deserialize)]
pub struct CreateDonationRequest {
    pub id: Option<String>,
    pub donor_id: String,
    pub donor_name: String,
    pub title: String,
    pub category: Category,
    pub quantity: f64,
    pub unit: Unit,
    pub storage: Storage,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub expiry_date: DateTime<Utc>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub pickup_start: DateTime<Utc>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub pickup_end: DateTime<Utc>,
    pub address: String,
    pub location: Location,
}

#[derive(Deserialize)]
pub struct DonationFilter {
    pub status: Option<DonationStatus>,
}

async fn create_donation(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateDonationRequest>,
) -> Result<Json<Donation>, AppError> {
    let now = Utc::now();
    let donation = Donation {
        id: payload.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        donor_id: payload.donor_id,
        donor_name: payload.donor_name,
        title: payload.title,
        category: payload.category,
        quantity: payload.quantity,
        unit: payload.unit,
        storage: payload.storage,
        expiry_date: payload.expiry_date,
        pickup_start: payload.pickup_start,
        pickup_end: payload.pickup_end,
        address: payload.address,
        location: payload.location,
        status: DonationStatus::Available,
        created_at: now,
    };

    validate_donation(&donation).map_err(AppError::Validation)?;
    if donation.is_expired_at(now) {
        return Err(AppError::Validation(format!(
            "expiry_date {} is already in the past",
            donation.expiry_date
        )));
    }

    match state.donations.entry(donation.id.clone()) {
        Entry::Occupied(_) => Err(AppError::Conflict(format!(
            "donation {} already exists",
            donation.id
        ))),
        Entry::Vacant(slot) => {
            slot.insert(donation.clone());
            info!(
                donation_id = %donation.id,
                category = %donation.category,
                quantity = donation.quantity,
                "donation created"
            );
            Ok(Json(donation))
        }
    }
}

async fn list_donations(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<DonationFilter>,
) -> Json<Vec<Donation>> {
    let mut donations: Vec<Donation> = state
        .donations
        .iter()
        .filter(|entry| filter.status.is_none_or(|status| entry.status == status))
        .map(|entry| entry.value().clone())
        .collect();
    donations.sort_by(|a, b| a.id.cmp(&b.id));

    Json(donations)
}

async fn get_donation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Donation>, AppError> {
    let donation = state
        .donations
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("donation {id} not found")))?;

    Ok(Json(donation.value().clone()))
}

async fn delete_donation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Donation>, AppError> {
    let removed = state.delete_donation(&id)?;
    info!(donation_id = %removed.id, "donation deleted");
    Ok(Json(removed))
}
