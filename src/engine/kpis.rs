use std::collections::{HashMap, HashSet};

use chrono::Duration;
use serde::Serialize;

use crate::models::beneficiary::Need;
use crate::models::donation::Donation;
use crate::models::matching::Claim;

/// Claims on donations expiring within this window count as wastage avoided.
const WASTAGE_WINDOW_DAYS: i64 = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kpis {
    pub total_claims: usize,
    pub match_rate: f64,
    pub fill_rate: f64,
    pub wastage_avoided: f64,
    pub time_to_match_p50_mins: i64,
    pub time_to_match_p90_mins: i64,
}

/// Cancelled claims are left out of every figure.
pub fn compute<'a>(
    claims: &[Claim],
    needs: impl IntoIterator<Item = &'a Need>,
    donations: impl IntoIterator<Item = &'a Donation>,
) -> Kpis {
    let needs: HashMap<&str, &Need> = needs.into_iter().map(|n| (n.id.as_str(), n)).collect();
    let donations: HashMap<&str, &Donation> =
        donations.into_iter().map(|d| (d.id.as_str(), d)).collect();
    let claims: Vec<&Claim> = claims.iter().filter(|claim| claim.serves_need()).collect();

    let served: HashSet<&str> = claims
        .iter()
        .map(|claim| claim.need_id.as_str())
        .filter(|id| needs.contains_key(id))
        .collect();
    let match_rate = percent(served.len() as f64, needs.len() as f64);

    let requested: f64 = needs.values().map(|need| need.min_qty).sum();
    let claimed: f64 = claims
        .iter()
        .filter(|claim| needs.contains_key(claim.need_id.as_str()))
        .map(|claim| claim.quantity)
        .sum();
    let fill_rate = percent(claimed, requested);

    let wastage_avoided: f64 = claims
        .iter()
        .filter(|claim| {
            donations
                .get(claim.donation_id.as_str())
                .is_some_and(|d| d.expiry_date - claim.claimed_at <= Duration::days(WASTAGE_WINDOW_DAYS))
        })
        .map(|claim| claim.quantity)
        .sum();

    let mut waits: Vec<i64> = claims
        .iter()
        .filter_map(|claim| {
            needs
                .get(claim.need_id.as_str())
                .map(|need| (claim.claimed_at - need.created_at).num_minutes())
        })
        .collect();
    waits.sort_unstable();

    Kpis {
        total_claims: claims.len(),
        match_rate: round_tenth(match_rate),
        fill_rate: round_tenth(fill_rate),
        wastage_avoided: round_tenth(wastage_avoided),
        time_to_match_p50_mins: percentile(&waits, 0.5),
        time_to_match_p90_mins: percentile(&waits, 0.9),
    }
}

fn percent(part: f64, whole: f64) -> f64 {
    if whole > 0.0 { part / whole * 100.0 } else { 0.0 }
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Nearest-rank on a sorted slice: the element at `floor(len * p)`.
fn percentile(sorted: &[i64], p: f64) -> i64 {
    if sorted.is_empty() {
        return 0;
    }
    let index = ((sorted.len() as f64 * p).floor() as usize).min(sorted.len() - 1);
    sorted[index]
}
