use std::fmt;

use serde::Serialize;

use crate::models::beneficiary::{BeneficiaryProfile, Need};
use crate::models::common::Location;
use crate::models::donation::Donation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Profiles,
    Needs,
    Donations,
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Collection::Profiles => "profiles",
            Collection::Needs => "needs",
            Collection::Donations => "donations",
        };
        f.write_str(name)
    }
}

/// An input record that was rejected during ingestion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordError {
    pub collection: Collection,
    pub index: usize,
    pub id: Option<String>,
    pub reason: String,
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{}[{}] ({id}): {}", self.collection, self.index, self.reason),
            None => write!(f, "{}[{}]: {}", self.collection, self.index, self.reason),
        }
    }
}

pub fn validate_profile(profile: &BeneficiaryProfile) -> Result<(), String> {
    require_id(&profile.id)?;
    require_location(&profile.location)?;
    if !profile.weekly_capacity_kg.is_finite() || profile.weekly_capacity_kg < 0.0 {
        return Err(format!(
            "weekly_capacity_kg must be a non-negative number, got {}",
            profile.weekly_capacity_kg
        ));
    }
    Ok(())
}

pub fn validate_need(need: &Need) -> Result<(), String> {
    require_id(&need.id)?;
    if need.beneficiary_id.trim().is_empty() {
        return Err("beneficiary_id must not be empty".to_string());
    }
    require_positive("min_qty", need.min_qty)?;
    if need.can_accept.is_empty() {
        return Err("can_accept must list at least one storage condition".to_string());
    }
    require_location(&need.location())
}

pub fn validate_donation(donation: &Donation) -> Result<(), String> {
    require_id(&donation.id)?;
    require_positive("quantity", donation.quantity)?;
    require_location(&donation.location)?;
    if donation.pickup_start > donation.pickup_end {
        return Err(format!(
            "pickup_start {} is after pickup_end {}",
            donation.pickup_start, donation.pickup_end
        ));
    }
    Ok(())
}

fn require_id(id: &str) -> Result<(), String> {
    if id.trim().is_empty() {
        return Err("id must not be empty".to_string());
    }
    Ok(())
}

fn require_positive(field: &str, value: f64) -> Result<(), String> {
    if !value.is_finite() || value <= 0.0 {
        return Err(format!("{field} must be greater than zero, got {value}"));
    }
    Ok(())
}

fn require_location(location: &Location) -> Result<(), String> {
    if !location.is_valid() {
        return Err(format!(
            "coordinates ({}, {}) are out of range",
            location.lat, location.lng
        ));
    }
    Ok(())
}
