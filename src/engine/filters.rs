use chrono::{DateTime, Utc};

use crate::config::CategorySubstitution;
use crate::engine::scoring::CandidatePair;
use crate::geo::haversine_km;
use crate::models::beneficiary::Need;
use crate::models::common::Category;
use crate::models::donation::Donation;

/// Category score for an offered category against a requested one: 100 on
/// equality, the table score for a listed substitution, `None` otherwise.
#[inline]
pub fn category_fit(
    offered: Category,
    requested: Category,
    substitutions: &[CategorySubstitution],
) -> Option<f64> {
    if offered == requested {
        return Some(100.0);
    }

    substitutions
        .iter()
        .find(|sub| sub.offered == offered && sub.requested == requested)
        .map(|sub| sub.score.clamp(0.0, 99.0))
}

/// Cold-chain check: the donation's storage must be one the need accepts.
#[inline]
pub fn storage_compatible(donation: &Donation, need: &Need) -> bool {
    need.accepts(donation.storage)
}

#[inline]
pub fn is_candidate(
    donation: &Donation,
    need: &Need,
    now: DateTime<Utc>,
    substitutions: &[CategorySubstitution],
) -> bool {
    donation.is_matchable_at(now)
        && category_fit(donation.category, need.category, substitutions).is_some()
        && storage_compatible(donation, need)
}

/// Every (donation, need) pair that survives the hard filters, with distance
/// and time-to-expiry precomputed for the scorers.
pub fn candidate_pairs<'a>(
    donations: &'a [Donation],
    needs: &'a [Need],
    now: DateTime<Utc>,
    substitutions: &[CategorySubstitution],
) -> Vec<CandidatePair<'a>> {
    let mut pairs = Vec::new();
    for need in needs {
        let need_location = need.location();
        for donation in donations {
            if !is_candidate(donation, need, now, substitutions) {
                continue;
            }

            pairs.push(CandidatePair {
                donation,
                need,
                distance_km: haversine_km(&donation.location, &need_location),
                days_to_expiry: donation.days_to_expiry(now),
            });
        }
    }

    pairs
}
