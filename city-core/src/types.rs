use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

// ============================================================================
// IDs - Using slotmap for generational indices
// ============================================================================

new_key_type! {
    pub struct DistrictId;
    pub struct BlockId;
    pub struct ResidenceId;
    pub struct UnitId;
    pub struct HouseholdId;
    pub struct DeveloperId;
    pub struct CouncilId;
}

/// Trait for converting SlotMap keys to u64 for tabular output
pub trait KeyToU64 {
    fn to_u64(self) -> u64;
}

macro_rules! impl_key_to_u64 {
    ($($key:ty),* $(,)?) => {
        $(
            impl KeyToU64 for $key {
                fn to_u64(self) -> u64 {
                    self.0.as_ffi()
                }
            }
        )*
    };
}

impl_key_to_u64!(
    DistrictId,
    BlockId,
    ResidenceId,
    UnitId,
    HouseholdId,
    DeveloperId,
    CouncilId,
);

// ============================================================================
// Scalars
// ============================================================================

/// Simulation step. One step is one year; step 0 is the initial city.
pub type Step = u64;
/// Currency per step.
pub type Price = f64;
/// Zoning level. 1 is single-family; higher levels allow taller, denser buildings.
pub type Zone = u32;

// ============================================================================
// Geometry constants (square feet)
// ============================================================================

/// Land area of one generated block.
pub const BLOCK_SIZE: f64 = 51_000.0;
/// Smallest footprint a residence may have on a zone-1 block.
pub const MIN_RESIDENCE_SIZE: f64 = 425.0;
/// Smallest interior area of a single unit.
pub const MIN_UNIT_SIZE: f64 = 425.0;

/// Minimum residence footprint allowed on a block with the given zoning.
/// Higher-zoned blocks require somewhat bigger buildings.
pub fn min_residence_size(zone: Zone) -> f64 {
    if zone <= 1 {
        MIN_RESIDENCE_SIZE
    } else {
        MIN_RESIDENCE_SIZE * (zone as f64 / 2.0)
    }
}

// ============================================================================
// Tenure tags
// ============================================================================

/// Flat tag for a household's tenure state, used in snapshots and rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TenureTag {
    Seeking,
    Housed,
    Departed,
}

impl TenureTag {
    pub fn name(self) -> &'static str {
        match self {
            Self::Seeking => "seeking",
            Self::Housed => "housed",
            Self::Departed => "departed",
        }
    }
}

/// Why a household moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MoveKind {
    MoveIn,
    EvictedUnaffordable,
    EvictedDemolition,
    Departed,
}

impl MoveKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::MoveIn => "move_in",
            Self::EvictedUnaffordable => "evicted_unaffordable",
            Self::EvictedDemolition => "evicted_demolition",
            Self::Departed => "departed",
        }
    }
}
