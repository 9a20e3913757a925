//! Append-only per-step record of every live entity.
//!
//! Records are captured once at the end of a step and never edited. Demolished
//! residences and units simply stop appearing from the step they were removed;
//! their earlier records stay.

use std::collections::HashMap;
use std::hash::Hash;

use serde::Serialize;
use slotmap::SlotMap;

use crate::agents::{Council, Developer, Household, Tenure};
use crate::housing::City;
use crate::types::{
    BlockId, CouncilId, DeveloperId, DistrictId, HouseholdId, MoveKind, Price, ResidenceId, Step,
    TenureTag, UnitId, Zone,
};

// ============================================================================
// Snapshots
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitSnapshot {
    pub id: UnitId,
    pub residence: ResidenceId,
    pub capacity: u32,
    pub size: f64,
    pub price: Price,
    pub occupants: Vec<HouseholdId>,
    pub owner: Option<HouseholdId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResidenceSnapshot {
    pub id: ResidenceId,
    pub block: BlockId,
    pub footprint: f64,
    pub floors: u32,
    pub zone: Zone,
    pub zoned_capacity: u32,
    pub units: Vec<UnitId>,
    pub age: u64,
}

impl ResidenceSnapshot {
    pub fn interior(&self) -> f64 {
        self.footprint * self.floors as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockSnapshot {
    pub id: BlockId,
    pub district: DistrictId,
    pub area: f64,
    pub area_used: f64,
    pub zone: Zone,
    pub residences: Vec<ResidenceId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistrictSnapshot {
    pub id: DistrictId,
    pub zone: Zone,
    pub blocks: Vec<BlockId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HouseholdSnapshot {
    pub id: HouseholdId,
    pub spending_power: Price,
    pub status: TenureTag,
    pub unit: Option<UnitId>,
    /// Step the household moved into its current unit.
    pub since: Option<Step>,
    pub arrived: Step,
    pub unhoused_steps: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeveloperSnapshot {
    pub id: DeveloperId,
    pub capital: f64,
    pub blocks: usize,
    pub residences_built: u64,
    pub residences_demolished: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CouncilSnapshot {
    pub id: CouncilId,
    pub districts: usize,
    pub construct_p: f64,
    pub demolish_p: f64,
    pub approved: u64,
    pub denied: u64,
}

/// Market outcome of one step.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MarketSnapshot {
    pub seeking: usize,
    pub matched: usize,
    pub unmet: usize,
    pub spike: f64,
    pub ceiling: Price,
    pub repriced: usize,
    pub price_per_sqft: Price,
    pub income_mean: f64,
    pub arrivals: usize,
    pub departures: usize,
    pub evictions: usize,
    pub constructions: usize,
    pub demolitions: usize,
}

/// A household moving in or out.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MoveRecord {
    pub step: Step,
    pub household: HouseholdId,
    pub unit: Option<UnitId>,
    pub kind: MoveKind,
}

// ============================================================================
// IndexedLog
// ============================================================================

/// Rows in capture order with lookup by id.
#[derive(Debug, Clone, Serialize)]
pub struct IndexedLog<K, S> {
    rows: Vec<S>,
    #[serde(skip)]
    index: HashMap<K, usize>,
}

impl<K, S> Default for IndexedLog<K, S> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<K: Copy + Eq + Hash, S> IndexedLog<K, S> {
    pub fn push(&mut self, key: K, row: S) {
        self.index.insert(key, self.rows.len());
        self.rows.push(row);
    }

    pub fn get(&self, key: K) -> Option<&S> {
        self.index.get(&key).map(|&i| &self.rows[i])
    }

    pub fn contains(&self, key: K) -> bool {
        self.index.contains_key(&key)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, S> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl<K: Copy + Eq + Hash, S> FromIterator<(K, S)> for IndexedLog<K, S> {
    fn from_iter<I: IntoIterator<Item = (K, S)>>(iter: I) -> Self {
        let mut log = Self::default();
        for (key, row) in iter {
            log.push(key, row);
        }
        log
    }
}

// ============================================================================
// StepRecord
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub step: Step,
    pub districts: IndexedLog<DistrictId, DistrictSnapshot>,
    pub blocks: IndexedLog<BlockId, BlockSnapshot>,
    pub residences: IndexedLog<ResidenceId, ResidenceSnapshot>,
    pub units: IndexedLog<UnitId, UnitSnapshot>,
    /// Live households only; departed ones are not recorded.
    pub households: IndexedLog<HouseholdId, HouseholdSnapshot>,
    pub developers: IndexedLog<DeveloperId, DeveloperSnapshot>,
    pub councils: IndexedLog<CouncilId, CouncilSnapshot>,
    pub market: MarketSnapshot,
    pub moves: Vec<MoveRecord>,
}

impl StepRecord {
    pub fn capture(
        step: Step,
        city: &City,
        households: &SlotMap<HouseholdId, Household>,
        developers: &SlotMap<DeveloperId, Developer>,
        councils: &SlotMap<CouncilId, Council>,
        market: MarketSnapshot,
        moves: Vec<MoveRecord>,
    ) -> Self {
        let districts = city
            .districts()
            .values()
            .map(|d| {
                (d.id, DistrictSnapshot {
                    id: d.id,
                    zone: d.zone,
                    blocks: d.blocks.clone(),
                })
            })
            .collect();
        let blocks = city
            .blocks()
            .values()
            .map(|b| {
                (b.id, BlockSnapshot {
                    id: b.id,
                    district: b.district,
                    area: b.area,
                    area_used: b.area_used,
                    zone: b.zone,
                    residences: b.residences.clone(),
                })
            })
            .collect();
        let residences = city
            .residences()
            .values()
            .map(|r| {
                (r.id, ResidenceSnapshot {
                    id: r.id,
                    block: r.block,
                    footprint: r.footprint,
                    floors: r.floors,
                    zone: r.zone,
                    zoned_capacity: r.zoned_capacity,
                    units: r.units.clone(),
                    age: r.age(step),
                })
            })
            .collect();
        let units = city
            .units()
            .values()
            .map(|u| {
                (u.id, UnitSnapshot {
                    id: u.id,
                    residence: u.residence,
                    capacity: u.capacity,
                    size: u.size,
                    price: u.price,
                    occupants: u.occupants.clone(),
                    owner: u.owner,
                })
            })
            .collect();
        let households = households
            .values()
            .filter(|h| !h.is_departed())
            .map(|h| {
                let since = match h.tenure {
                    Tenure::Housed { since, .. } => Some(since),
                    _ => None,
                };
                (h.id, HouseholdSnapshot {
                    id: h.id,
                    spending_power: h.spending_power,
                    status: h.tenure.tag(),
                    unit: h.unit(),
                    since,
                    arrived: h.arrived,
                    unhoused_steps: h.unhoused_steps,
                })
            })
            .collect();
        let developers = developers
            .values()
            .map(|d| {
                (d.id, DeveloperSnapshot {
                    id: d.id,
                    capital: d.capital,
                    blocks: d.territory.len(),
                    residences_built: d.residences_built,
                    residences_demolished: d.residences_demolished,
                })
            })
            .collect();
        let councils = councils
            .values()
            .map(|c| {
                (c.id, CouncilSnapshot {
                    id: c.id,
                    districts: c.schedules.len(),
                    construct_p: c.construct_p,
                    demolish_p: c.demolish_p,
                    approved: c.approved,
                    denied: c.denied,
                })
            })
            .collect();

        Self {
            step,
            districts,
            blocks,
            residences,
            units,
            households,
            developers,
            councils,
            market,
            moves,
        }
    }

    /// Resolve a unit to its residence, block and district as recorded this step.
    pub fn unit_chain(&self, unit: UnitId) -> Option<(ResidenceId, BlockId, DistrictId)> {
        let residence = self.residences.get(self.units.get(unit)?.residence)?;
        let block = self.blocks.get(residence.block)?;
        Some((residence.id, block.id, block.district))
    }
}

// ============================================================================
// Ledger
// ============================================================================

#[derive(Debug, Clone, Default, Serialize)]
pub struct Ledger {
    records: Vec<StepRecord>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn append(&mut self, record: StepRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    pub fn record(&self, step: Step) -> Option<&StepRecord> {
        // Steps are recorded contiguously from 0.
        self.records.get(usize::try_from(step).ok()?)
    }

    pub fn latest(&self) -> Option<&StepRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn unit(&self, step: Step, id: UnitId) -> Option<&UnitSnapshot> {
        self.record(step)?.units.get(id)
    }

    pub fn residence(&self, step: Step, id: ResidenceId) -> Option<&ResidenceSnapshot> {
        self.record(step)?.residences.get(id)
    }

    pub fn block(&self, step: Step, id: BlockId) -> Option<&BlockSnapshot> {
        self.record(step)?.blocks.get(id)
    }

    pub fn district(&self, step: Step, id: DistrictId) -> Option<&DistrictSnapshot> {
        self.record(step)?.districts.get(id)
    }

    pub fn household(&self, step: Step, id: HouseholdId) -> Option<&HouseholdSnapshot> {
        self.record(step)?.households.get(id)
    }

    pub fn developer(&self, step: Step, id: DeveloperId) -> Option<&DeveloperSnapshot> {
        self.record(step)?.developers.get(id)
    }

    pub fn council(&self, step: Step, id: CouncilId) -> Option<&CouncilSnapshot> {
        self.record(step)?.councils.get(id)
    }

    pub fn market(&self, step: Step) -> Option<&MarketSnapshot> {
        self.record(step).map(|r| &r.market)
    }

    /// Every move across the run, in order.
    pub fn moves(&self) -> impl Iterator<Item = &MoveRecord> {
        self.records.iter().flat_map(|r| r.moves.iter())
    }
}
