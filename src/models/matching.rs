use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::donation::Unit;

/// Quantities closer than this are treated as equal.
pub const QUANTITY_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub proximity_score: f64,
    pub expiry_score: f64,
    pub storage_score: f64,
    pub category_score: f64,
}

impl ScoreBreakdown {
    pub fn clamped(self) -> Self {
        Self {
            proximity_score: clamp_score(self.proximity_score),
            expiry_score: clamp_score(self.expiry_score),
            storage_score: clamp_score(self.storage_score),
            category_score: clamp_score(self.category_score),
        }
    }
}

fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 100.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    Excellent,
    Good,
    Fair,
    Acceptable,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Excellent => "EXCELLENT",
            MatchStatus::Good => "GOOD",
            MatchStatus::Fair => "FAIR",
            MatchStatus::Acceptable => "ACCEPTABLE",
        }
    }
}

/// Flat match record, one per (donation, need) allocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchOutput {
    pub donation_id: String,
    pub need_id: String,
    pub beneficiary_id: String,
    pub match_status: MatchStatus,
    pub geographic_proximity_score: f64,
    pub expiry_urgency_score: f64,
    pub storage_compatibility_score: f64,
    pub category_match_score: f64,
    pub overall_match_score: f64,
    pub reasoning: String,
}

impl MatchOutput {
    pub fn breakdown(&self) -> ScoreBreakdown {
        ScoreBreakdown {
            proximity_score: self.geographic_proximity_score,
            expiry_score: self.expiry_urgency_score,
            storage_score: self.storage_compatibility_score,
            category_score: self.category_match_score,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchBatch {
    pub matches: Vec<MatchOutput>,
}

/// Quantity and context for the match at the same index of the batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub donation_id: String,
    pub need_id: String,
    pub quantity: f64,
    pub unit: Unit,
    pub distance_km: f64,
    pub days_to_expiry: f64,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnmatchedReason {
    NoCompatibleDonation,
    DonationsExhausted,
    CapacityReached,
    PartiallyFilled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmatchedNeed {
    pub need_id: String,
    pub beneficiary_id: String,
    pub reason: UnmatchedReason,
    pub outstanding_qty: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub matches: Vec<MatchOutput>,
    pub allocations: Vec<Allocation>,
    pub unmatched_needs: Vec<UnmatchedNeed>,
    pub truncated_candidates: usize,
}

impl MatchReport {
    pub fn batch(&self) -> MatchBatch {
        MatchBatch {
            matches: self.matches.clone(),
        }
    }

    /// Removes the match and its allocation at `index`.
    pub fn retract(&mut self, index: usize) -> Option<(MatchOutput, Allocation)> {
        if index >= self.matches.len() || index >= self.allocations.len() {
            return None;
        }
        Some((self.matches.remove(index), self.allocations.remove(index)))
    }

    pub fn allocated_to(&self, need_id: &str) -> f64 {
        self.allocations
            .iter()
            .filter(|allocation| allocation.need_id == need_id)
            .map(|allocation| allocation.quantity)
            .sum()
    }

    /// Recomputes the unmatched entry for one need from the allocations that
    /// are left, after matches for it were retracted.
    pub fn reconcile_need(&mut self, need_id: &str, beneficiary_id: &str, min_qty: f64) {
        self.unmatched_needs.retain(|entry| entry.need_id != need_id);

        let allocated = self.allocated_to(need_id);
        let outstanding = (min_qty - allocated).max(0.0);

        let reason = if allocated <= QUANTITY_EPSILON {
            UnmatchedReason::DonationsExhausted
        } else if outstanding > QUANTITY_EPSILON {
            UnmatchedReason::PartiallyFilled
        } else {
            return;
        };

        self.unmatched_needs.push(UnmatchedNeed {
            need_id: need_id.to_string(),
            beneficiary_id: beneficiary_id.to_string(),
            reason,
            outstanding_qty: outstanding,
        });
    }
}

/// Where a claim is in its pickup lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimStatus {
    #[default]
    PendingPickup,
    Routed,
    Completed,
    Cancelled,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::PendingPickup => "PENDING_PICKUP",
            ClaimStatus::Routed => "ROUTED",
            ClaimStatus::Completed => "COMPLETED",
            ClaimStatus::Cancelled => "CANCELLED",
        }
    }

    /// Completed and cancelled claims are terminal.
    pub fn can_transition_to(&self, next: ClaimStatus) -> bool {
        matches!(
            (self, next),
            (ClaimStatus::PendingPickup, ClaimStatus::Routed)
                | (ClaimStatus::PendingPickup, ClaimStatus::Cancelled)
                | (ClaimStatus::Routed, ClaimStatus::Completed)
                | (ClaimStatus::Routed, ClaimStatus::Cancelled)
        )
    }

    /// Still holding goods for its need.
    pub fn is_open(&self) -> bool {
        matches!(self, ClaimStatus::PendingPickup | ClaimStatus::Routed)
    }
}

/// A donation (or part of one) taken off the shelf for a need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub id: Uuid,
    pub run_id: Uuid,
    pub donation_id: String,
    pub need_id: String,
    pub beneficiary_id: String,
    pub quantity: f64,
    pub overall_match_score: f64,
    pub match_status: MatchStatus,
    #[serde(default)]
    pub status: ClaimStatus,
    #[serde(default)]
    pub approved_by: Option<String>,
    pub claimed_at: DateTime<Utc>,
}

impl Claim {
    /// Counts toward the need it was made for; cancelled claims do not.
    pub fn serves_need(&self) -> bool {
        self.status != ClaimStatus::Cancelled
    }
}
