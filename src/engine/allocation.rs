use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::config::AllocationMode;
use crate::engine::matcher::RunContext;
use crate::engine::scoring::CandidatePair;
use crate::models::donation::Unit;
use crate::models::matching::{
    QUANTITY_EPSILON, ScoreBreakdown, UnmatchedNeed, UnmatchedReason,
};

#[derive(Debug, Clone, Copy)]
pub struct ScoredCandidate<'a> {
    pub pair: CandidatePair<'a>,
    pub breakdown: ScoreBreakdown,
    pub overall: f64,
}

/// Quantity of the candidate at `candidate` (an index into the ranked list)
/// handed to its need.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grant {
    pub candidate: usize,
    pub quantity: f64,
}

#[derive(Debug, Default)]
pub struct AllocationPlan {
    pub grants: Vec<Grant>,
    pub unmatched: Vec<UnmatchedNeed>,
}

/// Allocation order: urgent needs first, then better matches, then donations
/// that expire sooner, then older offers. Ids settle whatever is left so the
/// order is total.
pub fn rank_order(a: &ScoredCandidate<'_>, b: &ScoredCandidate<'_>) -> Ordering {
    b.pair
        .need
        .urgency
        .cmp(&a.pair.need.urgency)
        .then_with(|| b.overall.total_cmp(&a.overall))
        .then_with(|| tie_break(a, b))
}

fn tie_break(a: &ScoredCandidate<'_>, b: &ScoredCandidate<'_>) -> Ordering {
    a.pair
        .donation
        .expiry_date
        .cmp(&b.pair.donation.expiry_date)
        .then_with(|| a.pair.donation.created_at.cmp(&b.pair.donation.created_at))
        .then_with(|| a.pair.donation.id.cmp(&b.pair.donation.id))
        .then_with(|| a.pair.need.id.cmp(&b.pair.need.id))
}

/// Keeps at most `max` candidates, dropping the lowest overall scores first.
/// Returns how many were dropped.
pub fn truncate_low_scores(candidates: &mut Vec<ScoredCandidate<'_>>, max: usize) -> usize {
    if candidates.len() <= max {
        return 0;
    }

    candidates.sort_by(|a, b| b.overall.total_cmp(&a.overall).then_with(|| tie_break(a, b)));
    let dropped = candidates.len() - max;
    candidates.truncate(max);
    dropped
}

pub fn rank(candidates: &mut [ScoredCandidate<'_>]) {
    candidates.sort_by(rank_order);
}

/// First-fit allocation over candidates already sorted by [`rank`].
pub fn allocate(ranked: &[ScoredCandidate<'_>], ctx: &RunContext<'_>) -> AllocationPlan {
    let config = ctx.config;
    let mut plan = AllocationPlan::default();

    let mut donation_left: HashMap<&str, f64> = HashMap::new();
    let mut need_outstanding: HashMap<&str, f64> = ctx
        .snapshot
        .needs
        .iter()
        .map(|need| (need.id.as_str(), need.min_qty))
        .collect();
    let mut need_served: HashSet<&str> = HashSet::new();
    let mut capacity_left: HashMap<&str, f64> = ctx
        .snapshot
        .profiles
        .iter()
        .map(|profile| (profile.id.as_str(), profile.weekly_capacity_kg))
        .collect();
    let mut capacity_blocked: HashSet<&str> = HashSet::new();

    for (index, candidate) in ranked.iter().enumerate() {
        let donation = candidate.pair.donation;
        let need = candidate.pair.need;

        let left = *donation_left
            .entry(donation.id.as_str())
            .or_insert(donation.quantity);
        if left <= QUANTITY_EPSILON {
            continue;
        }

        let outstanding = need_outstanding
            .get(need.id.as_str())
            .copied()
            .unwrap_or(need.min_qty);

        let mut quantity = match config.allocation_mode {
            AllocationMode::Exclusive => {
                if need_served.contains(need.id.as_str()) {
                    continue;
                }
                // Whole lot: donations are never split in this mode.
                left
            }
            AllocationMode::Split => {
                if outstanding <= QUANTITY_EPSILON {
                    continue;
                }
                left.min(outstanding)
            }
        };

        let counts_against_capacity = config.respect_weekly_capacity && donation.unit == Unit::Kg;
        if counts_against_capacity {
            if let Some(capacity) = capacity_left.get(need.beneficiary_id.as_str()).copied() {
                match config.allocation_mode {
                    AllocationMode::Exclusive if quantity > capacity + QUANTITY_EPSILON => {
                        capacity_blocked.insert(need.id.as_str());
                        continue;
                    }
                    AllocationMode::Split if capacity <= QUANTITY_EPSILON => {
                        capacity_blocked.insert(need.id.as_str());
                        continue;
                    }
                    AllocationMode::Split => quantity = quantity.min(capacity),
                    AllocationMode::Exclusive => {}
                }
                capacity_left.insert(need.beneficiary_id.as_str(), (capacity - quantity).max(0.0));
            }
        }

        donation_left.insert(donation.id.as_str(), (left - quantity).max(0.0));
        need_outstanding.insert(need.id.as_str(), (outstanding - quantity).max(0.0));
        need_served.insert(need.id.as_str());

        debug!(
            donation_id = %donation.id,
            need_id = %need.id,
            quantity,
            overall = candidate.overall,
            "allocated donation"
        );

        plan.grants.push(Grant {
            candidate: index,
            quantity,
        });
    }

    let with_candidates: HashSet<&str> = ranked
        .iter()
        .map(|candidate| candidate.pair.need.id.as_str())
        .collect();

    for need in &ctx.snapshot.needs {
        let outstanding = need_outstanding
            .get(need.id.as_str())
            .copied()
            .unwrap_or(need.min_qty);

        let reason = if !need_served.contains(need.id.as_str()) {
            if !with_candidates.contains(need.id.as_str()) {
                UnmatchedReason::NoCompatibleDonation
            } else if capacity_blocked.contains(need.id.as_str()) {
                UnmatchedReason::CapacityReached
            } else {
                UnmatchedReason::DonationsExhausted
            }
        } else if outstanding > QUANTITY_EPSILON {
            UnmatchedReason::PartiallyFilled
        } else {
            continue;
        };

        plan.unmatched.push(UnmatchedNeed {
            need_id: need.id.clone(),
            beneficiary_id: need.beneficiary_id.clone(),
            reason,
            outstanding_qty: outstanding,
        });
    }

    plan
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::*;
    use crate::config::MatchingConfig;
    use crate::engine::matcher::Snapshot;
    use crate::engine::test_support::{donation, need, profile};
    use crate::models::common::{Category, Storage};

    fn scored<'a>(pair: CandidatePair<'a>, overall: f64) -> ScoredCandidate<'a> {
        ScoredCandidate {
            pair,
            breakdown: ScoreBreakdown {
                proximity_score: overall,
                expiry_score: overall,
                storage_score: overall,
                category_score: overall,
            },
            overall,
        }
    }

    fn pair<'a>(
        donation: &'a crate::models::donation::Donation,
        need: &'a crate::models::beneficiary::Need,
    ) -> CandidatePair<'a> {
        CandidatePair {
            donation,
            need,
            distance_km: 0.0,
            days_to_expiry: 1.0,
        }
    }

    #[test]
    fn high_urgency_ranks_before_better_score() {
        let now = Utc::now();
        let d = donation("d1", Category::Bakery, Storage::Ambient, 10.0, now + Duration::days(1));
        let mut low = need("low", Category::Bakery, &[Storage::Ambient], 5.0);
        low.urgency = crate::models::beneficiary::Urgency::Low;
        let mut high = need("high", Category::Bakery, &[Storage::Ambient], 5.0);
        high.urgency = crate::models::beneficiary::Urgency::High;

        let mut candidates = vec![scored(pair(&d, &low), 95.0), scored(pair(&d, &high), 60.0)];
        rank(&mut candidates);

        assert_eq!(candidates[0].pair.need.id, "high");
    }

    #[test]
    fn equal_scores_fall_back_to_creation_time() {
        let now = Utc::now();
        let expiry = now + Duration::days(1);
        let mut older = donation("z-older", Category::Bakery, Storage::Ambient, 10.0, expiry);
        older.created_at = now - Duration::days(2);
        let mut newer = donation("a-newer", Category::Bakery, Storage::Ambient, 10.0, expiry);
        newer.created_at = now - Duration::days(1);
        let n = need("n1", Category::Bakery, &[Storage::Ambient], 5.0);

        let mut candidates = vec![scored(pair(&newer, &n), 80.0), scored(pair(&older, &n), 80.0)];
        rank(&mut candidates);

        assert_eq!(candidates[0].pair.donation.id, "z-older");
    }

    #[test]
    fn truncation_drops_lowest_scores() {
        let now = Utc::now();
        let d = donation("d1", Category::Bakery, Storage::Ambient, 10.0, now + Duration::days(1));
        let a = need("a", Category::Bakery, &[Storage::Ambient], 5.0);
        let b = need("b", Category::Bakery, &[Storage::Ambient], 5.0);
        let c = need("c", Category::Bakery, &[Storage::Ambient], 5.0);

        let mut candidates = vec![
            scored(pair(&d, &a), 40.0),
            scored(pair(&d, &b), 90.0),
            scored(pair(&d, &c), 70.0),
        ];
        let dropped = truncate_low_scores(&mut candidates, 2);

        assert_eq!(dropped, 1);
        assert!(candidates.iter().all(|c| c.pair.need.id != "a"));
    }

    #[test]
    fn split_mode_never_over_allocates_a_donation() {
        let now = Utc::now();
        let d = donation("d1", Category::Bakery, Storage::Ambient, 12.0, now + Duration::days(1));
        let a = need("a", Category::Bakery, &[Storage::Ambient], 8.0);
        let b = need("b", Category::Bakery, &[Storage::Ambient], 8.0);

        let snapshot = Snapshot {
            profiles: vec![profile("b1")],
            needs: vec![a.clone(), b.clone()],
            donations: vec![d.clone()],
        };
        let config = MatchingConfig {
            allocation_mode: AllocationMode::Split,
            ..MatchingConfig::default()
        };
        let ctx = RunContext {
            run_id: Uuid::nil(),
            now,
            snapshot: &snapshot,
            config: &config,
        };

        let mut candidates = vec![scored(pair(&d, &a), 90.0), scored(pair(&d, &b), 80.0)];
        rank(&mut candidates);
        let plan = allocate(&candidates, &ctx);

        let total: f64 = plan.grants.iter().map(|g| g.quantity).sum();
        assert!((total - 12.0).abs() < 1e-9);
        assert_eq!(plan.grants[0].quantity, 8.0);
        assert_eq!(plan.grants[1].quantity, 4.0);
        assert_eq!(plan.unmatched.len(), 1);
        assert_eq!(plan.unmatched[0].reason, UnmatchedReason::PartiallyFilled);
        assert!((plan.unmatched[0].outstanding_qty - 4.0).abs() < 1e-9);
    }

    #[test]
    fn weekly_capacity_blocks_oversized_lot() {
        let now = Utc::now();
        let d = donation("d1", Category::Bakery, Storage::Ambient, 500.0, now + Duration::days(1));
        let n = need("n1", Category::Bakery, &[Storage::Ambient], 50.0);

        let mut small = profile("b1");
        small.weekly_capacity_kg = 100.0;
        let snapshot = Snapshot {
            profiles: vec![small],
            needs: vec![n.clone()],
            donations: vec![d.clone()],
        };
        let config = MatchingConfig::default();
        let ctx = RunContext {
            run_id: Uuid::nil(),
            now,
            snapshot: &snapshot,
            config: &config,
        };

        let candidates = vec![scored(pair(&d, &n), 90.0)];
        let plan = allocate(&candidates, &ctx);

        assert!(plan.grants.is_empty());
        assert_eq!(plan.unmatched[0].reason, UnmatchedReason::CapacityReached);
    }

    #[test]
    fn split_mode_trims_grant_to_weekly_capacity() {
        let now = Utc::now();
        let d = donation("d1", Category::Bakery, Storage::Ambient, 50.0, now + Duration::days(1));
        let n = need("n1", Category::Bakery, &[Storage::Ambient], 40.0);

        let mut small = profile("b1");
        small.weekly_capacity_kg = 15.0;
        let snapshot = Snapshot {
            profiles: vec![small],
            needs: vec![n.clone()],
            donations: vec![d.clone()],
        };
        let config = MatchingConfig {
            allocation_mode: AllocationMode::Split,
            ..MatchingConfig::default()
        };
        let ctx = RunContext {
            run_id: Uuid::nil(),
            now,
            snapshot: &snapshot,
            config: &config,
        };

        let candidates = vec![scored(pair(&d, &n), 90.0)];
        let plan = allocate(&candidates, &ctx);

        assert_eq!(plan.grants.len(), 1);
        assert!((plan.grants[0].quantity - 15.0).abs() < 1e-9);
        assert_eq!(plan.unmatched.len(), 1);
        assert_eq!(plan.unmatched[0].reason, UnmatchedReason::PartiallyFilled);
        assert!((plan.unmatched[0].outstanding_qty - 25.0).abs() < 1e-9);
    }
}
