use crate::config::ScoringWeights;
use crate::engine::scoring::{CandidatePair, FEFO_WINDOW_DAYS};
use crate::models::beneficiary::Urgency;
use crate::models::matching::ScoreBreakdown;

const NEARBY_KM: f64 = 5.0;
const SURPLUS_FACTOR: f64 = 1.5;

pub fn tags(pair: &CandidatePair<'_>) -> Vec<String> {
    let mut tags = Vec::new();

    if pair.days_to_expiry <= FEFO_WINDOW_DAYS {
        tags.push("FEFO".to_string());
    }
    if pair.distance_km <= NEARBY_KM {
        tags.push("Nearby".to_string());
    }
    if pair.need.urgency == Urgency::High {
        tags.push("Urgent".to_string());
    }
    if pair.donation.quantity >= pair.need.min_qty * SURPLUS_FACTOR {
        tags.push("Surplus".to_string());
    }

    tags
}

/// Deterministic explanation of a match: what fits, how far, how fresh, and
/// which component contributed most to the overall score.
pub fn explain(
    pair: &CandidatePair<'_>,
    breakdown: &ScoreBreakdown,
    weights: &ScoringWeights,
    overall: f64,
    quantity: f64,
) -> String {
    let donation = pair.donation;
    let need = pair.need;

    let category = if donation.category == need.category {
        format!("{} offer matches the {} need exactly", donation.category, need.category)
    } else {
        format!(
            "{} offer substitutes for the {} need (category score {:.0})",
            donation.category, need.category, breakdown.category_score
        )
    };

    let storage = match need.baseline_storage() {
        Some(baseline) if baseline == donation.storage => {
            format!("{} storage is accepted as-is", donation.storage)
        }
        Some(baseline) => format!(
            "{} storage is stricter than the need's {} baseline",
            donation.storage, baseline
        ),
        None => format!("{} storage", donation.storage),
    };

    let expiry = if pair.days_to_expiry <= FEFO_WINDOW_DAYS {
        format!("expires in {:.1} days (first-expiry-first-out)", pair.days_to_expiry)
    } else {
        format!("expires in {:.1} days", pair.days_to_expiry)
    };

    let contributions = [
        ("geographic proximity", breakdown.proximity_score * weights.proximity),
        ("expiry urgency", breakdown.expiry_score * weights.expiry),
        ("storage compatibility", breakdown.storage_score * weights.storage),
        ("category match", breakdown.category_score * weights.category),
    ];
    // First maximum wins so equal contributions resolve the same way every run.
    let (driver, points) = contributions
        .iter()
        .copied()
        .fold(contributions[0], |best, current| {
            if current.1 > best.1 { current } else { best }
        });

    format!(
        "{category}; {storage}; pickup is {:.1} km from the beneficiary; {expiry}; {} urgency need; allocating {} {}. Strongest factor: {driver} ({points:.1} of {overall:.1} points).",
        pair.distance_km,
        need.urgency.as_str(),
        format_quantity(quantity),
        donation.unit.as_str(),
    )
}

fn format_quantity(quantity: f64) -> String {
    if (quantity - quantity.round()).abs() < 1e-9 {
        format!("{}", quantity.round() as i64)
    } else {
        format!("{quantity:.2}")
    }
}
