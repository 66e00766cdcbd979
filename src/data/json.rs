use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::IngestPolicy;
use crate::data::validate::{validate_donation, validate_need, validate_profile, Collection, RecordError};
use crate::engine::Snapshot;
use crate::error::AppError;
use crate::models::beneficiary::{BeneficiaryProfile, Need};
use crate::models::donation::Donation;

/// A snapshot together with the records that were dropped while building it.
#[derive(Debug, Default)]
pub struct LoadedSnapshot {
    pub snapshot: Snapshot,
    pub rejected: Vec<RecordError>,
}

#[derive(Debug, Deserialize)]
struct BeneficiaryDocument {
    #[serde(default)]
    profiles: Vec<Value>,
    #[serde(default)]
    needs: Vec<Value>,
}

pub fn load_snapshot(
    beneficiaries_path: &Path,
    donations_path: &Path,
    policy: IngestPolicy,
) -> Result<LoadedSnapshot, AppError> {
    let beneficiaries = fs::read_to_string(beneficiaries_path)?;
    let donations = fs::read_to_string(donations_path)?;

    let loaded = parse_snapshot(&beneficiaries, &donations, policy)?;
    info!(
        beneficiaries_path = %beneficiaries_path.display(),
        donations_path = %donations_path.display(),
        profiles = loaded.snapshot.profiles.len(),
        needs = loaded.snapshot.needs.len(),
        donations = loaded.snapshot.donations.len(),
        rejected = loaded.rejected.len(),
        "snapshot loaded"
    );
    Ok(loaded)
}

/// Parses the beneficiaries document (`{profiles, needs}`) and the donations
/// document (an array). A malformed document always fails; individual bad
/// records are handled according to `policy`.
pub fn parse_snapshot(
    beneficiaries: &str,
    donations: &str,
    policy: IngestPolicy,
) -> Result<LoadedSnapshot, AppError> {
    let document: BeneficiaryDocument = serde_json::from_str(beneficiaries)
        .map_err(|err| AppError::BadRequest(format!("malformed beneficiaries document: {err}")))?;
    let donations: Vec<Value> = serde_json::from_str(donations)
        .map_err(|err| AppError::BadRequest(format!("malformed donations document: {err}")))?;

    ingest(document.profiles, document.needs, donations, policy)
}

/// Deserialises and validates each record on its own.
pub fn ingest(
    profiles: Vec<Value>,
    needs: Vec<Value>,
    donations: Vec<Value>,
    policy: IngestPolicy,
) -> Result<LoadedSnapshot, AppError> {
    let mut ingestor = Ingestor {
        policy,
        rejected: Vec::new(),
    };

    let profiles: Vec<BeneficiaryProfile> = ingestor.collect(
        Collection::Profiles,
        profiles,
        |p: &BeneficiaryProfile| &p.id,
        validate_profile,
    )?;

    let known: HashSet<String> = profiles.iter().map(|p| p.id.clone()).collect();
    let needs: Vec<Need> = ingestor.collect(
        Collection::Needs,
        needs,
        |n: &Need| &n.id,
        |need: &Need| {
            validate_need(need)?;
            if !known.contains(&need.beneficiary_id) {
                return Err(format!("unknown beneficiary '{}'", need.beneficiary_id));
            }
            Ok(())
        },
    )?;

    let donations: Vec<Donation> = ingestor.collect(
        Collection::Donations,
        donations,
        |d: &Donation| &d.id,
        validate_donation,
    )?;

    Ok(LoadedSnapshot {
        snapshot: Snapshot {
            profiles,
            needs,
            donations,
        },
        rejected: ingestor.rejected,
    })
}

struct Ingestor {
    policy: IngestPolicy,
    rejected: Vec<RecordError>,
}

impl Ingestor {
    fn collect<T, I, V>(
        &mut self,
        collection: Collection,
        raw: Vec<Value>,
        id_of: I,
        validate: V,
    ) -> Result<Vec<T>, AppError>
    where
        T: DeserializeOwned,
        I: Fn(&T) -> &String,
        V: Fn(&T) -> Result<(), String>,
    {
        let mut seen = HashSet::new();
        let mut accepted = Vec::with_capacity(raw.len());

        for (index, value) in raw.into_iter().enumerate() {
            let raw_id = value.get("id").and_then(Value::as_str).map(str::to_string);

            let outcome = serde_json::from_value::<T>(value)
                .map_err(|err| err.to_string())
                .and_then(|record| {
                    validate(&record)?;
                    if !seen.insert(id_of(&record).clone()) {
                        return Err(format!("duplicate id '{}'", id_of(&record)));
                    }
                    Ok(record)
                });

            match outcome {
                Ok(record) => accepted.push(record),
                Err(reason) => self.reject(RecordError {
                    collection,
                    index,
                    id: raw_id,
                    reason,
                })?,
            }
        }

        Ok(accepted)
    }

    fn reject(&mut self, error: RecordError) -> Result<(), AppError> {
        match self.policy {
            IngestPolicy::Strict => Err(AppError::Validation(error.to_string())),
            IngestPolicy::Lenient => {
                warn!(
                    collection = %error.collection,
                    index = error.index,
                    id = error.id.as_deref().unwrap_or("-"),
                    reason = %error.reason,
                    "record rejected"
                );
                self.rejected.push(error);
                Ok(())
            }
        }
    }
}
