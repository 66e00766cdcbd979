use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::common::Category;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub event_buffer_size: usize,
    pub beneficiaries_path: PathBuf,
    pub donations_path: PathBuf,
    pub ingest_policy: IngestPolicy,
    pub expiry_sweep_secs: u64,
    pub matching: MatchingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// What to do with an input record that fails validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestPolicy {
    /// Drop the record, report it, keep going.
    Lenient,
    /// Fail the whole load.
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationMode {
    /// A donation goes whole to at most one need, a need takes at most one donation.
    Exclusive,
    /// Donations may be split across needs and needs filled from several donations.
    Split,
}

impl FromStr for AllocationMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "exclusive" => Ok(AllocationMode::Exclusive),
            "split" => Ok(AllocationMode::Split),
            other => Err(format!("unknown allocation mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub proximity: f64,
    pub expiry: f64,
    pub storage: f64,
    pub category: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            proximity: 0.25,
            expiry: 0.30,
            storage: 0.20,
            category: 0.25,
        }
    }
}

impl ScoringWeights {
    pub fn sum(&self) -> f64 {
        self.proximity + self.expiry + self.storage + self.category
    }
}

/// Lower bounds (inclusive) of the overall score for each qualitative status.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatusThresholds {
    pub excellent: f64,
    pub good: f64,
    pub fair: f64,
}

impl Default for StatusThresholds {
    fn default() -> Self {
        Self {
            excellent: 85.0,
            good: 70.0,
            fair: 50.0,
        }
    }
}

/// An offered category that may stand in for a requested one, with the
/// category score it earns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategorySubstitution {
    pub offered: Category,
    pub requested: Category,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingConfig {
    pub weights: ScoringWeights,
    pub thresholds: StatusThresholds,
    pub max_radius_km: f64,
    pub allocation_mode: AllocationMode,
    pub max_candidate_pairs: usize,
    pub respect_weekly_capacity: bool,
    pub category_substitutions: Vec<CategorySubstitution>,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            thresholds: StatusThresholds::default(),
            max_radius_km: 25.0,
            allocation_mode: AllocationMode::Exclusive,
            max_candidate_pairs: 50_000,
            respect_weekly_capacity: true,
            category_substitutions: Vec::new(),
        }
    }
}

impl MatchingConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        let w = &self.weights;
        let all_weights = [w.proximity, w.expiry, w.storage, w.category];
        if all_weights.iter().any(|weight| !weight.is_finite() || *weight < 0.0) {
            return Err(AppError::Config(
                "scoring weights must be finite and non-negative".to_string(),
            ));
        }
        if (w.sum() - 1.0).abs() > 1e-6 {
            return Err(AppError::Config(format!(
                "scoring weights must sum to 1, got {}",
                w.sum()
            )));
        }

        let t = &self.thresholds;
        let ordered = t.excellent >= t.good && t.good >= t.fair;
        let in_range = [t.excellent, t.good, t.fair]
            .iter()
            .all(|value| (0.0..=100.0).contains(value));
        if !ordered || !in_range {
            return Err(AppError::Config(
                "status thresholds must lie in [0, 100] with excellent >= good >= fair".to_string(),
            ));
        }

        if !self.max_radius_km.is_finite() || self.max_radius_km <= 0.0 {
            return Err(AppError::Config("max radius must be > 0 km".to_string()));
        }

        if self.max_candidate_pairs == 0 {
            return Err(AppError::Config(
                "max candidate pairs must be > 0".to_string(),
            ));
        }

        if let Some(bad) = self
            .category_substitutions
            .iter()
            .find(|sub| !sub.score.is_finite() || sub.score < 0.0 || sub.score >= 100.0)
        {
            return Err(AppError::Config(format!(
                "substitution {} -> {} must score in [0, 100), got {}",
                bad.offered, bad.requested, bad.score
            )));
        }

        Ok(())
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = MatchingConfig::default();
        let default_weights = defaults.weights;
        let default_thresholds = defaults.thresholds;

        let matching = MatchingConfig {
            weights: ScoringWeights {
                proximity: parse_or_default(&lookup, "MATCH_WEIGHT_PROXIMITY", default_weights.proximity)?,
                expiry: parse_or_default(&lookup, "MATCH_WEIGHT_EXPIRY", default_weights.expiry)?,
                storage: parse_or_default(&lookup, "MATCH_WEIGHT_STORAGE", default_weights.storage)?,
                category: parse_or_default(&lookup, "MATCH_WEIGHT_CATEGORY", default_weights.category)?,
            },
            thresholds: StatusThresholds {
                excellent: parse_or_default(&lookup, "MATCH_THRESHOLD_EXCELLENT", default_thresholds.excellent)?,
                good: parse_or_default(&lookup, "MATCH_THRESHOLD_GOOD", default_thresholds.good)?,
                fair: parse_or_default(&lookup, "MATCH_THRESHOLD_FAIR", default_thresholds.fair)?,
            },
            max_radius_km: parse_or_default(&lookup, "MATCH_MAX_RADIUS_KM", defaults.max_radius_km)?,
            allocation_mode: parse_or_default(&lookup, "MATCH_ALLOCATION_MODE", defaults.allocation_mode)?,
            max_candidate_pairs: parse_or_default(
                &lookup,
                "MATCH_MAX_CANDIDATE_PAIRS",
                defaults.max_candidate_pairs,
            )?,
            respect_weekly_capacity: parse_or_default(
                &lookup,
                "MATCH_RESPECT_WEEKLY_CAPACITY",
                defaults.respect_weekly_capacity,
            )?,
            category_substitutions: match lookup("MATCH_CATEGORY_SUBSTITUTIONS") {
                Some(raw) => parse_substitutions(&raw)?,
                None => defaults.category_substitutions,
            },
        };
        matching.validate()?;

        let ingest_policy = if parse_or_default(&lookup, "INGEST_STRICT", false)? {
            IngestPolicy::Strict
        } else {
            IngestPolicy::Lenient
        };

        let event_buffer_size = parse_or_default(&lookup, "EVENT_BUFFER_SIZE", 1024)?;
        if event_buffer_size == 0 {
            return Err(AppError::Config("EVENT_BUFFER_SIZE must be > 0".to_string()));
        }
        let expiry_sweep_secs = parse_or_default(&lookup, "EXPIRY_SWEEP_SECS", 300)?;
        if expiry_sweep_secs == 0 {
            return Err(AppError::Config("EXPIRY_SWEEP_SECS must be > 0".to_string()));
        }

        Ok(Self {
            http_port: parse_or_default(&lookup, "HTTP_PORT", 3000)?,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_format: parse_or_default(&lookup, "LOG_FORMAT", LogFormat::Compact)?,
            event_buffer_size,
            beneficiaries_path: lookup("BENEFICIARIES_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/beneficiaries.json")),
            donations_path: lookup("DONATIONS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/donations.json")),
            ingest_policy,
            expiry_sweep_secs,
            matching,
        })
    }
}

fn parse_or_default<F, T>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|err| AppError::Config(format!("invalid {key}: {err}"))),
        None => Ok(default),
    }
}

/// Parses `Offered:Requested:score` entries separated by commas.
fn parse_substitutions(raw: &str) -> Result<Vec<CategorySubstitution>, AppError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let parts: Vec<&str> = entry.split(':').collect();
            let [offered, requested, score] = parts.as_slice() else {
                return Err(AppError::Config(format!(
                    "invalid category substitution '{entry}', expected Offered:Requested:score"
                )));
            };

            Ok(CategorySubstitution {
                offered: offered.parse().map_err(AppError::Config)?,
                requested: requested.parse().map_err(AppError::Config)?,
                score: score.trim().parse().map_err(|err| {
                    AppError::Config(format!("invalid substitution score in '{entry}': {err}"))
                })?,
            })
        })
        .collect()
}
