use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::common::{deserialize_timestamp, Category, Location, Storage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Kg,
    #[serde(alias = "pieces")]
    Pcs,
    Crates,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Kg => "kg",
            Unit::Pcs => "pcs",
            Unit::Crates => "crates",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DonationStatus {
    #[default]
    Available,
    Claimed,
    Expired,
}

impl DonationStatus {
    /// AVAILABLE may move to CLAIMED or EXPIRED; both of those are terminal.
    pub fn can_transition_to(&self, next: DonationStatus) -> bool {
        matches!(
            (self, next),
            (DonationStatus::Available, DonationStatus::Claimed)
                | (DonationStatus::Available, DonationStatus::Expired)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Donation {
    pub id: String,
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
    #[serde(default)]
    pub status: DonationStatus,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Donation {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry_date <= now
    }

    /// Eligible for matching at `now`: still AVAILABLE, not past expiry and
    /// something left to give.
    pub fn is_matchable_at(&self, now: DateTime<Utc>) -> bool {
        self.status == DonationStatus::Available && !self.is_expired_at(now) && self.quantity > 0.0
    }

    pub fn days_to_expiry(&self, now: DateTime<Utc>) -> f64 {
        let seconds = (self.expiry_date - now).num_seconds().max(0) as f64;
        seconds / 86_400.0
    }
}
