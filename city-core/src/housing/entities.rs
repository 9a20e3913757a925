use serde::{Deserialize, Serialize};

use crate::types::{
    BlockId, DistrictId, HouseholdId, MIN_UNIT_SIZE, Price, ResidenceId, Step, UnitId, Zone,
    min_residence_size,
};

// ============================================================================
// Unit - A living space inside a Residence
// ============================================================================

/// Smallest tradable entity. Cannot be moved to another residence or resized.
/// Its price follows inflation and demand spikes; it never falls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    /// Creation order across the whole city. Breaks price ties in matching.
    pub serial: u64,
    pub residence: ResidenceId,
    pub capacity: u32,
    pub size: f64,
    pub price: Price,
    pub occupants: Vec<HouseholdId>,
    pub owner: Option<HouseholdId>,
}

impl Unit {
    pub fn free_slots(&self) -> u32 {
        self.capacity.saturating_sub(self.occupants.len() as u32)
    }

    pub fn is_vacant(&self) -> bool {
        self.free_slots() > 0
    }

    pub fn is_occupied_by(&self, household: HouseholdId) -> bool {
        self.occupants.contains(&household)
    }
}

// ============================================================================
// Residence - The only building type
// ============================================================================

/// A building on a block. A residence with one unit is a single-family home.
/// Its footprint is land area; with several floors the interior area for units
/// is `footprint * floors`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Residence {
    pub id: ResidenceId,
    pub block: BlockId,
    pub footprint: f64,
    pub floors: u32,
    /// Zoning of the block when this residence was built. Never changes.
    pub zone: Zone,
    /// Maximum total unit capacity its zoning allows.
    pub zoned_capacity: u32,
    pub units: Vec<UnitId>,
    pub built: Step,
    /// Age already reached at `built` (for residences standing at step 0).
    pub initial_age: u64,
}

impl Residence {
    /// Units allowed in a building: one on single-family land, otherwise as many
    /// minimum-size units as fit in the interior.
    pub fn zoned_capacity_for(zone: Zone, footprint: f64, floors: u32) -> u32 {
        if zone <= 1 {
            1
        } else {
            ((footprint * floors as f64) / MIN_UNIT_SIZE).floor().max(1.0) as u32
        }
    }

    pub fn interior(&self) -> f64 {
        self.footprint * self.floors as f64
    }

    pub fn age(&self, step: Step) -> u64 {
        step.saturating_sub(self.built) + self.initial_age
    }

    /// Built for lower zoning than its block now allows, making it a
    /// candidate for redevelopment.
    pub fn is_underzoned(&self, block_zone: Zone) -> bool {
        (self.floors as f64) < (block_zone as f64).sqrt()
    }

    pub fn is_single_unit(&self) -> bool {
        self.units.len() == 1
    }
}

// ============================================================================
// Block - Buildable land
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub district: DistrictId,
    pub area: f64,
    /// Land covered by residence footprints.
    pub area_used: f64,
    /// Follows the district's zone, refreshed at the start of every step.
    pub zone: Zone,
    pub residences: Vec<ResidenceId>,
}

impl Block {
    pub fn area_available(&self) -> f64 {
        (self.area - self.area_used).max(0.0)
    }

    pub fn min_residence_size(&self) -> f64 {
        min_residence_size(self.zone)
    }

    pub fn has_room_to_build(&self) -> bool {
        self.area_available() >= self.min_residence_size()
    }
}

// ============================================================================
// District - A group of blocks zoned together
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct District {
    pub id: DistrictId,
    pub zone: Zone,
    /// Zone decided by a council, applied at the start of the next step.
    pub pending_zone: Option<Zone>,
    pub blocks: Vec<BlockId>,
}
