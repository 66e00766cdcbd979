use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::info;
use uuid::Uuid;

use crate::engine::{MatchEngine, Snapshot};
use crate::error::AppError;
use crate::models::beneficiary::{BeneficiaryProfile, Need};
use crate::models::donation::{Donation, DonationStatus};
use crate::models::matching::{Claim, ClaimStatus, QUANTITY_EPSILON};
use crate::observability::metrics::Metrics;

pub struct AppState {
    pub profiles: DashMap<String, BeneficiaryProfile>,
    pub needs: DashMap<String, Need>,
    pub donations: DashMap<String, Donation>,
    pub claims: DashMap<Uuid, Claim>,
    pub claim_events_tx: broadcast::Sender<Claim>,
    pub engine: MatchEngine,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(engine: MatchEngine, event_buffer_size: usize) -> Self {
        let (claim_events_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        Self {
            profiles: DashMap::new(),
            needs: DashMap::new(),
            donations: DashMap::new(),
            claims: DashMap::new(),
            claim_events_tx,
            engine,
            metrics: Metrics::new(),
        }
    }

    pub fn load(&self, snapshot: Snapshot) {
        for profile in snapshot.profiles {
            self.profiles.insert(profile.id.clone(), profile);
        }
        for need in snapshot.needs {
            self.needs.insert(need.id.clone(), need);
        }
        for donation in snapshot.donations {
            self.donations.insert(donation.id.clone(), donation);
        }
    }

    /// Copies the current collections, sorted by id so repeated runs over the
    /// same data see the same order. Needs carry only the quantity still
    /// outstanding after earlier claims; fully served needs are left out.
    /// Cancelled claims no longer count toward their need.
    pub fn snapshot(&self) -> Snapshot {
        let mut claimed: HashMap<String, f64> = HashMap::new();
        for entry in self.claims.iter().filter(|entry| entry.serves_need()) {
            *claimed.entry(entry.need_id.clone()).or_default() += entry.quantity;
        }

        let mut profiles: Vec<BeneficiaryProfile> =
            self.profiles.iter().map(|entry| entry.value().clone()).collect();
        let mut needs: Vec<Need> = self
            .needs
            .iter()
            .filter_map(|entry| {
                let mut need = entry.value().clone();
                let served = claimed.get(&need.id).copied().unwrap_or_default();
                need.min_qty -= served;
                (need.min_qty > QUANTITY_EPSILON).then_some(need)
            })
            .collect();
        let mut donations: Vec<Donation> =
            self.donations.iter().map(|entry| entry.value().clone()).collect();

        profiles.sort_by(|a, b| a.id.cmp(&b.id));
        needs.sort_by(|a, b| a.id.cmp(&b.id));
        donations.sort_by(|a, b| a.id.cmp(&b.id));

        Snapshot {
            profiles,
            needs,
            donations,
        }
    }

    /// Atomically takes `quantity` off an AVAILABLE donation. The entry lock is
    /// held for the whole check-and-set, so two runs can never both claim the
    /// same goods. The donation becomes CLAIMED once nothing is left.
    pub fn claim_donation(
        &self,
        donation_id: &str,
        quantity: f64,
        now: DateTime<Utc>,
    ) -> Result<Donation, AppError> {
        let mut donation = self
            .donations
            .get_mut(donation_id)
            .ok_or_else(|| AppError::NotFound(format!("donation {donation_id} not found")))?;

        if donation.status != DonationStatus::Available {
            return Err(AppError::Conflict(format!(
                "donation {donation_id} is {:?}, not available",
                donation.status
            )));
        }

        if donation.is_expired_at(now) {
            donation.status = DonationStatus::Expired;
            self.metrics.donations_expired_total.inc();
            return Err(AppError::Conflict(format!(
                "donation {donation_id} expired before it could be claimed"
            )));
        }

        if donation.quantity + QUANTITY_EPSILON < quantity {
            return Err(AppError::Conflict(format!(
                "donation {donation_id} has {} left, cannot claim {quantity}",
                donation.quantity
            )));
        }

        donation.quantity = (donation.quantity - quantity).max(0.0);
        if donation.quantity <= QUANTITY_EPSILON {
            donation.quantity = 0.0;
            donation.status = DonationStatus::Claimed;
        }

        Ok(donation.clone())
    }

    /// Records ops sign-off on a pending claim. Only approved claims can be
    /// routed.
    pub fn approve_claim(&self, claim_id: Uuid, approved_by: &str) -> Result<Claim, AppError> {
        let approved_by = approved_by.trim();
        if approved_by.is_empty() {
            return Err(AppError::BadRequest("approved_by must not be empty".to_string()));
        }

        let updated = {
            let mut claim = self
                .claims
                .get_mut(&claim_id)
                .ok_or_else(|| AppError::NotFound(format!("claim {claim_id} not found")))?;

            if claim.status != ClaimStatus::PendingPickup {
                return Err(AppError::Conflict(format!(
                    "claim {claim_id} is {}, only PENDING_PICKUP claims can be approved",
                    claim.status.as_str()
                )));
            }
            if let Some(existing) = &claim.approved_by {
                return Err(AppError::Conflict(format!(
                    "claim {claim_id} was already approved by {existing}"
                )));
            }

            claim.approved_by = Some(approved_by.to_string());
            claim.clone()
        };

        info!(claim_id = %claim_id, approved_by, "claim approved");
        let _ = self.claim_events_tx.send(updated.clone());
        Ok(updated)
    }

    /// Moves a claim along PENDING_PICKUP -> ROUTED -> COMPLETED, or cancels
    /// it. Cancelling reopens the need but leaves the donation CLAIMED; the
    /// goods are not put back on the shelf.
    pub fn update_claim_status(&self, claim_id: Uuid, next: ClaimStatus) -> Result<Claim, AppError> {
        let updated = {
            let mut claim = self
                .claims
                .get_mut(&claim_id)
                .ok_or_else(|| AppError::NotFound(format!("claim {claim_id} not found")))?;

            if !claim.status.can_transition_to(next) {
                return Err(AppError::Conflict(format!(
                    "claim {claim_id} cannot move from {} to {}",
                    claim.status.as_str(),
                    next.as_str()
                )));
            }
            if next == ClaimStatus::Routed && claim.approved_by.is_none() {
                return Err(AppError::Conflict(format!(
                    "claim {claim_id} must be approved before it is routed"
                )));
            }

            claim.status = next;
            claim.clone()
        };

        info!(claim_id = %claim_id, status = next.as_str(), "claim status changed");
        let _ = self.claim_events_tx.send(updated.clone());
        Ok(updated)
    }

    fn has_open_claim(&self, refers: impl Fn(&Claim) -> bool) -> bool {
        self.claims
            .iter()
            .any(|entry| entry.status.is_open() && refers(entry.value()))
    }

    /// Removes a donation no open claim points at.
    pub fn delete_donation(&self, donation_id: &str) -> Result<Donation, AppError> {
        if !self.donations.contains_key(donation_id) {
            return Err(AppError::NotFound(format!("donation {donation_id} not found")));
        }
        if self.has_open_claim(|claim| claim.donation_id == donation_id) {
            return Err(AppError::Conflict(format!(
                "donation {donation_id} has open claims"
            )));
        }

        self.donations
            .remove(donation_id)
            .map(|(_, donation)| donation)
            .ok_or_else(|| AppError::NotFound(format!("donation {donation_id} not found")))
    }

    /// Removes a need no open claim points at.
    pub fn delete_need(&self, need_id: &str) -> Result<Need, AppError> {
        if !self.needs.contains_key(need_id) {
            return Err(AppError::NotFound(format!("need {need_id} not found")));
        }
        if self.has_open_claim(|claim| claim.need_id == need_id) {
            return Err(AppError::Conflict(format!("need {need_id} has open claims")));
        }

        self.needs
            .remove(need_id)
            .map(|(_, need)| need)
            .ok_or_else(|| AppError::NotFound(format!("need {need_id} not found")))
    }

    /// Moves every AVAILABLE donation whose expiry has passed to EXPIRED.
    pub fn expire_due(&self, now: DateTime<Utc>) -> usize {
        let mut expired = 0;

        for mut entry in self.donations.iter_mut() {
            let donation = entry.value_mut();
            if donation.is_expired_at(now)
                && donation.status.can_transition_to(DonationStatus::Expired)
            {
                donation.status = DonationStatus::Expired;
                expired += 1;
            }
        }

        if expired > 0 {
            self.metrics.donations_expired_total.inc_by(expired as u64);
        }
        expired
    }
}
