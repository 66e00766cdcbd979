use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::MatchingConfig;
use crate::engine::allocation::{allocate, rank, truncate_low_scores, ScoredCandidate};
use crate::engine::filters::candidate_pairs;
use crate::engine::reasoning::{explain, tags};
use crate::engine::scoring::{match_status, weighted_score, RuleBasedScorer, Scorer};
use crate::error::AppError;
use crate::models::beneficiary::{BeneficiaryProfile, Need};
use crate::models::donation::Donation;
use crate::models::matching::{Allocation, MatchOutput, MatchReport};

/// The profiles, needs and donations one run looks at. Never mutated while a
/// run is in progress.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub profiles: Vec<BeneficiaryProfile>,
    pub needs: Vec<Need>,
    pub donations: Vec<Donation>,
}

impl Snapshot {
    pub fn need(&self, id: &str) -> Option<&Need> {
        self.needs.iter().find(|need| need.id == id)
    }
}

/// Everything a single run needs, passed explicitly through every stage.
#[derive(Debug, Clone, Copy)]
pub struct RunContext<'a> {
    pub run_id: Uuid,
    pub now: DateTime<Utc>,
    pub snapshot: &'a Snapshot,
    pub config: &'a MatchingConfig,
}

/// Filter, score, rank, allocate and explain.
///
/// The scoring strategy is pluggable; the overall score and the qualitative
/// status are always derived here from the scorer's breakdown and the
/// configured weights and thresholds.
#[derive(Clone)]
pub struct MatchEngine {
    config: MatchingConfig,
    scorer: Arc<dyn Scorer>,
}

impl std::fmt::Debug for MatchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl MatchEngine {
    pub fn new(config: MatchingConfig) -> Result<Self, AppError> {
        Self::with_scorer(config, Arc::new(RuleBasedScorer))
    }

    pub fn with_scorer(config: MatchingConfig, scorer: Arc<dyn Scorer>) -> Result<Self, AppError> {
        config.validate()?;
        Ok(Self { config, scorer })
    }

    pub fn run(&self, snapshot: &Snapshot, now: DateTime<Utc>) -> MatchReport {
        let ctx = RunContext {
            run_id: Uuid::new_v4(),
            now,
            snapshot,
            config: &self.config,
        };
        self.run_with(&ctx)
    }

    pub fn run_with(&self, ctx: &RunContext<'_>) -> MatchReport {
        let pairs = candidate_pairs(
            &ctx.snapshot.donations,
            &ctx.snapshot.needs,
            ctx.now,
            &ctx.config.category_substitutions,
        );
        let total_candidates = pairs.len();

        let mut candidates: Vec<ScoredCandidate<'_>> = pairs
            .into_iter()
            .map(|pair| {
                let breakdown = self.scorer.score(&pair, ctx).clamped();
                let overall = weighted_score(&breakdown, &ctx.config.weights);
                ScoredCandidate {
                    pair,
                    breakdown,
                    overall,
                }
            })
            .collect();

        let truncated = truncate_low_scores(&mut candidates, ctx.config.max_candidate_pairs);
        if truncated > 0 {
            info!(
                run_id = %ctx.run_id,
                truncated,
                kept = candidates.len(),
                "candidate cap reached; dropped lowest scoring pairs"
            );
        }

        rank(&mut candidates);
        let plan = allocate(&candidates, ctx);

        let mut matches = Vec::with_capacity(plan.grants.len());
        let mut allocations = Vec::with_capacity(plan.grants.len());

        for grant in &plan.grants {
            let candidate = &candidates[grant.candidate];
            let pair = &candidate.pair;
            let status = match_status(candidate.overall, &ctx.config.thresholds);

            matches.push(MatchOutput {
                donation_id: pair.donation.id.clone(),
                need_id: pair.need.id.clone(),
                beneficiary_id: pair.need.beneficiary_id.clone(),
                match_status: status,
                geographic_proximity_score: candidate.breakdown.proximity_score,
                expiry_urgency_score: candidate.breakdown.expiry_score,
                storage_compatibility_score: candidate.breakdown.storage_score,
                category_match_score: candidate.breakdown.category_score,
                overall_match_score: candidate.overall,
                reasoning: explain(
                    pair,
                    &candidate.breakdown,
                    &ctx.config.weights,
                    candidate.overall,
                    grant.quantity,
                ),
            });

            allocations.push(Allocation {
                donation_id: pair.donation.id.clone(),
                need_id: pair.need.id.clone(),
                quantity: grant.quantity,
                unit: pair.donation.unit,
                distance_km: pair.distance_km,
                days_to_expiry: pair.days_to_expiry,
                tags: tags(pair),
            });

            debug!(
                run_id = %ctx.run_id,
                donation_id = %pair.donation.id,
                need_id = %pair.need.id,
                status = status.as_str(),
                overall = candidate.overall,
                "match emitted"
            );
        }

        info!(
            run_id = %ctx.run_id,
            candidates = total_candidates,
            matches = matches.len(),
            unmatched = plan.unmatched.len(),
            "match run complete"
        );

        MatchReport {
            run_id: ctx.run_id,
            generated_at: ctx.now,
            matches,
            allocations,
            unmatched_needs: plan.unmatched,
            truncated_candidates: truncated,
        }
    }
}
