use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::matching::{Claim, ClaimStatus, MatchReport};
use crate::state::AppState;

/// Runs the engine over the stored snapshot and claims every allocation.
///
/// Allocations whose donation was claimed by a concurrent run (or expired)
/// in the meantime are retracted from the report and their needs reported
/// again as unmatched or partially filled.
pub fn run_and_claim(state: &AppState, now: DateTime<Utc>) -> Result<MatchReport, AppError> {
    let start = Instant::now();
    let result = execute(state, now);
    let elapsed = start.elapsed().as_secs_f64();

    let outcome = if result.is_ok() { "success" } else { "error" };
    state
        .metrics
        .match_run_latency_seconds
        .with_label_values(&[outcome])
        .observe(elapsed);
    state
        .metrics
        .match_runs_total
        .with_label_values(&[outcome])
        .inc();

    result
}

fn execute(state: &AppState, now: DateTime<Utc>) -> Result<MatchReport, AppError> {
    let expired = state.expire_due(now);
    if expired > 0 {
        info!(expired, "expired donations before match run");
    }

    let snapshot = state.snapshot();
    let mut report = state.engine.run(&snapshot, now);

    let mut lost = Vec::new();
    let mut claims = Vec::with_capacity(report.matches.len());

    for (index, (output, allocation)) in report
        .matches
        .iter()
        .zip(report.allocations.iter())
        .enumerate()
    {
        match state.claim_donation(&allocation.donation_id, allocation.quantity, now) {
            Ok(_) => claims.push(Claim {
                id: Uuid::new_v4(),
                run_id: report.run_id,
                donation_id: output.donation_id.clone(),
                need_id: output.need_id.clone(),
                beneficiary_id: output.beneficiary_id.clone(),
                quantity: allocation.quantity,
                overall_match_score: output.overall_match_score,
                match_status: output.match_status,
                status: ClaimStatus::PendingPickup,
                approved_by: None,
                claimed_at: now,
            }),
            Err(AppError::Conflict(reason)) | Err(AppError::NotFound(reason)) => {
                warn!(
                    run_id = %report.run_id,
                    donation_id = %allocation.donation_id,
                    need_id = %allocation.need_id,
                    reason = %reason,
                    "claim lost; dropping match"
                );
                state.metrics.claim_conflicts_total.inc();
                lost.push(index);
            }
            Err(err) => return Err(err),
        }
    }

    for index in lost.iter().rev() {
        if let Some((output, _)) = report.retract(*index) {
            let min_qty = snapshot
                .need(&output.need_id)
                .map(|need| need.min_qty)
                .unwrap_or_default();
            report.reconcile_need(&output.need_id, &output.beneficiary_id, min_qty);
        }
    }
    report.unmatched_needs.sort_by(|a, b| a.need_id.cmp(&b.need_id));

    for claim in claims {
        state.claims.insert(claim.id, claim.clone());
        let _ = state.claim_events_tx.send(claim);
    }

    state
        .metrics
        .matches_created_total
        .inc_by(report.matches.len() as u64);
    state
        .metrics
        .unmatched_needs
        .set(report.unmatched_needs.len() as i64);

    info!(
        run_id = %report.run_id,
        matches = report.matches.len(),
        unmatched = report.unmatched_needs.len(),
        conflicts = lost.len(),
        "match run claimed"
    );

    Ok(report)
}
