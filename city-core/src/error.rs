//! Error taxonomy.
//!
//! - [`StructuralError`]: the housing hierarchy or an occupancy link would be
//!   corrupted. Fatal; the run halts at the current step.
//! - [`PolicyError`]: a configuration parameter is missing or out of range.
//!   Raised before any step runs.
//! - [`SimError`]: what `Simulation::run` returns.
//!
//! Skipped agent actions (a developer without capital, a council denial) and
//! empty supply or demand are not errors.

use thiserror::Error;

use crate::types::{BlockId, DistrictId, HouseholdId, ResidenceId, Step, UnitId};

/// Capacity or hierarchy invariant violated
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StructuralError {
    #[error("Unknown district: {0:?}")]
    UnknownDistrict(DistrictId),

    #[error("Unknown block: {0:?}")]
    UnknownBlock(BlockId),

    #[error("Unknown residence: {0:?}")]
    UnknownResidence(ResidenceId),

    #[error("Unknown unit: {0:?}")]
    UnknownUnit(UnitId),

    #[error("Unknown household: {0:?}")]
    UnknownHousehold(HouseholdId),

    #[error("Residence {residence:?} capacity exceeded: requested {requested}, zoned for {zoned}")]
    CapacityExceeded {
        residence: ResidenceId,
        requested: u32,
        zoned: u32,
    },

    #[error("Unit {0:?} is already at capacity")]
    UnitFull(UnitId),

    #[error("Household {household:?} does not occupy unit {unit:?}")]
    NotOccupant { unit: UnitId, household: HouseholdId },

    #[error("Block {block:?} has {available} sqft available, residence needs {required}")]
    InsufficientLand {
        block: BlockId,
        required: f64,
        available: f64,
    },

    #[error("Residence plan has no units")]
    EmptyResidence,

    #[error("Invalid unit capacity {0}")]
    InvalidCapacity(u32),

    #[error("Invalid price {price} for unit {unit:?}")]
    InvalidPrice { unit: Option<UnitId>, price: f64 },

    #[error("Dangling link: {0}")]
    Orphan(String),
}

/// Invalid or out-of-range configuration parameter
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PolicyError {
    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("District {0} has no zoning entry for step 0")]
    MissingInitialZoning(usize),

    #[error("Config parse error: {0}")]
    Json(String),
}

impl PolicyError {
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for PolicyError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}

/// Errors returned by a simulation run
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    #[error("Structural error: {0}")]
    Structural(#[from] StructuralError),

    #[error("Simulation halted after a fatal error at step {step}")]
    Halted { step: Step },
}
