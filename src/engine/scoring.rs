use crate::config::{ScoringWeights, StatusThresholds};
use crate::engine::filters::category_fit;
use crate::engine::matcher::RunContext;
use crate::models::beneficiary::Need;
use crate::models::common::Storage;
use crate::models::donation::Donation;
use crate::models::matching::{MatchStatus, ScoreBreakdown};

/// Donations expiring within this many days get the full urgency score.
pub const FEFO_WINDOW_DAYS: f64 = 2.0;
const EXPIRY_SCORE_FLOOR: f64 = 10.0;
const STORAGE_STEP_PENALTY: f64 = 15.0;

/// A (donation, need) pair that passed the hard filters.
#[derive(Debug, Clone, Copy)]
pub struct CandidatePair<'a> {
    pub donation: &'a Donation,
    pub need: &'a Need,
    pub distance_km: f64,
    pub days_to_expiry: f64,
}

/// Scoring strategy. Implementations only produce the four component scores;
/// the engine derives the overall score and status from them.
pub trait Scorer: Send + Sync {
    fn score(&self, pair: &CandidatePair<'_>, ctx: &RunContext<'_>) -> ScoreBreakdown;
}

/// Deterministic multi-criteria scorer: proximity, expiry urgency, storage and
/// category fit.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedScorer;

impl Scorer for RuleBasedScorer {
    fn score(&self, pair: &CandidatePair<'_>, ctx: &RunContext<'_>) -> ScoreBreakdown {
        ScoreBreakdown {
            proximity_score: proximity_score(pair.distance_km, ctx.config.max_radius_km),
            expiry_score: expiry_score(pair.days_to_expiry),
            storage_score: storage_score(pair.donation.storage, pair.need),
            category_score: category_fit(
                pair.donation.category,
                pair.need.category,
                &ctx.config.category_substitutions,
            )
            .unwrap_or(0.0),
        }
    }
}

pub fn weighted_score(breakdown: &ScoreBreakdown, weights: &ScoringWeights) -> f64 {
    (breakdown.proximity_score * weights.proximity)
        + (breakdown.expiry_score * weights.expiry)
        + (breakdown.storage_score * weights.storage)
        + (breakdown.category_score * weights.category)
}

pub fn match_status(overall: f64, thresholds: &StatusThresholds) -> MatchStatus {
    if overall >= thresholds.excellent {
        MatchStatus::Excellent
    } else if overall >= thresholds.good {
        MatchStatus::Good
    } else if overall >= thresholds.fair {
        MatchStatus::Fair
    } else {
        MatchStatus::Acceptable
    }
}

/// 100 at the same spot, exponential decay with distance, reaching 0 exactly
/// at the useful radius. The curve is shifted and rescaled so there is no
/// step at the radius.
pub fn proximity_score(distance_km: f64, max_radius_km: f64) -> f64 {
    let distance_km = distance_km.max(0.0);
    if distance_km == 0.0 {
        return 100.0;
    }
    if distance_km >= max_radius_km {
        return 0.0;
    }

    let half_radius = max_radius_km * 0.5;
    let at_radius = (-max_radius_km / half_radius).exp();
    let decay = (-distance_km / half_radius).exp();
    (100.0 * (decay - at_radius) / (1.0 - at_radius)).clamp(0.0, 100.0)
}

/// Full score inside the FEFO window, then falling off as `2 / days`, never
/// below the floor.
pub fn expiry_score(days_to_expiry: f64) -> f64 {
    let days = days_to_expiry.max(0.0);
    if days <= FEFO_WINDOW_DAYS {
        return 100.0;
    }

    (100.0 * FEFO_WINDOW_DAYS / days).max(EXPIRY_SCORE_FLOOR)
}

/// 100 when the donation needs exactly the need's least strict accepted
/// condition, minus a step penalty for each level stricter, 0 if not accepted.
pub fn storage_score(storage: Storage, need: &Need) -> f64 {
    if !need.accepts(storage) {
        return 0.0;
    }

    let Some(baseline) = need.baseline_storage() else {
        return 0.0;
    };

    let steps = storage.strictness().saturating_sub(baseline.strictness()) as f64;
    (100.0 - steps * STORAGE_STEP_PENALTY).max(0.0)
}
