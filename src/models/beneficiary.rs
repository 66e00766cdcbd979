use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::common::{deserialize_timestamp, Category, Location, Storage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Urgency {
    Low,
    Medium,
    High,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Low => "Low",
            Urgency::Medium => "Medium",
            Urgency::High => "High",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeneficiaryProfile {
    pub id: String,
    pub name: String,
    pub address: String,
    pub location: Location,
    pub categories_needed: Vec<Category>,
    pub storage_capabilities: Vec<Storage>,
    #[serde(default = "default_true")]
    pub delivery_preferred: bool,
    pub weekly_capacity_kg: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Need {
    pub id: String,
    pub beneficiary_id: String,
    pub category: Category,
    pub min_qty: f64,
    pub urgency: Urgency,
    pub can_accept: Vec<Storage>,
    #[serde(default = "default_true")]
    pub delivery_preferred: bool,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
    pub lat: f64,
    pub lng: f64,
    pub address: String,
}

impl Need {
    pub fn location(&self) -> Location {
        Location {
            lat: self.lat,
            lng: self.lng,
        }
    }

    pub fn accepts(&self, storage: Storage) -> bool {
        self.can_accept.contains(&storage)
    }

    /// Least strict storage condition this need can take, if any.
    pub fn baseline_storage(&self) -> Option<Storage> {
        self.can_accept.iter().copied().min()
    }
}

fn default_true() -> bool {
    true
}
