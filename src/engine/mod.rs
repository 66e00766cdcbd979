pub mod allocation;
pub mod expiry;
pub mod filters;
pub mod kpis;
pub mod matcher;
pub mod reasoning;
pub mod runner;
pub mod scoring;

pub use matcher::{MatchEngine, RunContext, Snapshot};
pub use scoring::{CandidatePair, RuleBasedScorer, Scorer};
