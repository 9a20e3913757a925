// City arena: owns every district, block, residence and unit.

use serde::Serialize;
use slotmap::SlotMap;

use crate::error::StructuralError;
use crate::types::{BlockId, DistrictId, HouseholdId, Price, ResidenceId, Step, UnitId, Zone};

use super::entities::{Block, District, Residence, Unit};

/// A unit to be created inside a residence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitPlan {
    pub capacity: u32,
    pub size: f64,
    pub price: Price,
}

/// A residence to be built on a block.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidencePlan {
    pub footprint: f64,
    pub floors: u32,
    pub zone: Zone,
    pub initial_age: u64,
    pub units: Vec<UnitPlan>,
}

/// Part of the hierarchy an aggregate query runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    City,
    District(DistrictId),
    Block(BlockId),
    Residence(ResidenceId),
}

/// Lazy, restartable sequence of units with a free slot inside a scope.
/// Clone it to start over from the beginning.
#[derive(Clone)]
pub struct VacantUnits<'a> {
    city: &'a City,
    scope: Scope,
    inner: slotmap::basic::Iter<'a, UnitId, Unit>,
}

impl<'a> Iterator for VacantUnits<'a> {
    type Item = &'a Unit;

    fn next(&mut self) -> Option<Self::Item> {
        let (city, scope) = (self.city, self.scope);
        self.inner
            .by_ref()
            .map(|(_, unit)| unit)
            .find(|unit| unit.is_vacant() && city.unit_in_scope(unit, scope))
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct City {
    districts: SlotMap<DistrictId, District>,
    blocks: SlotMap<BlockId, Block>,
    residences: SlotMap<ResidenceId, Residence>,
    units: SlotMap<UnitId, Unit>,
    next_unit_serial: u64,
}

impl City {
    pub fn new() -> Self {
        Self::default()
    }

    // === Read access ===

    pub fn districts(&self) -> &SlotMap<DistrictId, District> {
        &self.districts
    }

    pub fn blocks(&self) -> &SlotMap<BlockId, Block> {
        &self.blocks
    }

    pub fn residences(&self) -> &SlotMap<ResidenceId, Residence> {
        &self.residences
    }

    pub fn units(&self) -> &SlotMap<UnitId, Unit> {
        &self.units
    }

    pub fn district(&self, id: DistrictId) -> Option<&District> {
        self.districts.get(id)
    }

    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id)
    }

    pub fn residence(&self, id: ResidenceId) -> Option<&Residence> {
        self.residences.get(id)
    }

    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(id)
    }

    /// Resolve unit → residence → block → district.
    pub fn unit_chain(&self, id: UnitId) -> Option<(ResidenceId, BlockId, DistrictId)> {
        let unit = self.units.get(id)?;
        let residence = self.residences.get(unit.residence)?;
        let block = self.blocks.get(residence.block)?;
        Some((residence.id, block.id, block.district))
    }

    fn unit_in_scope(&self, unit: &Unit, scope: Scope) -> bool {
        match scope {
            Scope::City => true,
            Scope::Residence(r) => unit.residence == r,
            Scope::Block(b) => self
                .residences
                .get(unit.residence)
                .is_some_and(|r| r.block == b),
            Scope::District(d) => self
                .residences
                .get(unit.residence)
                .and_then(|r| self.blocks.get(r.block))
                .is_some_and(|b| b.district == d),
        }
    }

    pub fn vacant_units(&self, scope: Scope) -> VacantUnits<'_> {
        VacantUnits {
            city: self,
            scope,
            inner: self.units.iter(),
        }
    }

    pub fn total_capacity(&self, scope: Scope) -> u64 {
        self.units
            .values()
            .filter(|u| self.unit_in_scope(u, scope))
            .map(|u| u.capacity as u64)
            .sum()
    }

    // === Construction (initialization only) ===

    pub fn add_district(&mut self, zone: Zone) -> DistrictId {
        self.districts.insert_with_key(|id| District {
            id,
            zone,
            pending_zone: None,
            blocks: Vec::new(),
        })
    }

    pub fn add_block(&mut self, district: DistrictId, area: f64) -> Result<BlockId, StructuralError> {
        let zone = self
            .districts
            .get(district)
            .ok_or(StructuralError::UnknownDistrict(district))?
            .zone;
        let id = self.blocks.insert_with_key(|id| Block {
            id,
            district,
            area,
            area_used: 0.0,
            zone,
            residences: Vec::new(),
        });
        if let Some(d) = self.districts.get_mut(district) {
            d.blocks.push(id);
        }
        Ok(id)
    }

    // === Residences and units ===

    /// Build a residence with all its units on a block.
    /// Nothing is added if any part of the plan violates the hierarchy.
    pub fn add_residence(
        &mut self,
        block_id: BlockId,
        plan: &ResidencePlan,
        step: Step,
    ) -> Result<ResidenceId, StructuralError> {
        let block = self
            .blocks
            .get(block_id)
            .ok_or(StructuralError::UnknownBlock(block_id))?;
        if plan.units.is_empty() {
            return Err(StructuralError::EmptyResidence);
        }
        if plan.footprint > block.area_available() + 1e-9 {
            return Err(StructuralError::InsufficientLand {
                block: block_id,
                required: plan.footprint,
                available: block.area_available(),
            });
        }

        let zoned_capacity = Residence::zoned_capacity_for(plan.zone, plan.footprint, plan.floors);
        let id = self.residences.insert_with_key(|id| Residence {
            id,
            block: block_id,
            footprint: plan.footprint,
            floors: plan.floors,
            zone: plan.zone,
            zoned_capacity,
            units: Vec::new(),
            built: step,
            initial_age: plan.initial_age,
        });

        // Validate the whole plan before touching the block.
        let requested: u32 = plan.units.iter().map(|u| u.capacity).sum();
        let bad_unit = plan
            .units
            .iter()
            .find(|u| u.capacity == 0 || !u.price.is_finite() || u.price < 0.0);
        let failure = if requested > zoned_capacity {
            Some(StructuralError::CapacityExceeded {
                residence: id,
                requested,
                zoned: zoned_capacity,
            })
        } else {
            bad_unit.map(|u| {
                if u.capacity == 0 {
                    StructuralError::InvalidCapacity(0)
                } else {
                    StructuralError::InvalidPrice {
                        unit: None,
                        price: u.price,
                    }
                }
            })
        };
        if let Some(e) = failure {
            self.residences.remove(id);
            return Err(e);
        }

        for unit in &plan.units {
            self.add_unit(id, *unit)?;
        }
        if let Some(block) = self.blocks.get_mut(block_id) {
            block.area_used += plan.footprint;
            block.residences.push(id);
        }
        Ok(id)
    }

    /// Add one unit to an existing residence.
    pub fn add_unit(&mut self, residence_id: ResidenceId, plan: UnitPlan) -> Result<UnitId, StructuralError> {
        let residence = self
            .residences
            .get(residence_id)
            .ok_or(StructuralError::UnknownResidence(residence_id))?;
        if plan.capacity == 0 {
            return Err(StructuralError::InvalidCapacity(0));
        }
        if !plan.price.is_finite() || plan.price < 0.0 {
            return Err(StructuralError::InvalidPrice {
                unit: None,
                price: plan.price,
            });
        }
        let current: u32 = residence
            .units
            .iter()
            .filter_map(|u| self.units.get(*u))
            .map(|u| u.capacity)
            .sum();
        if current + plan.capacity > residence.zoned_capacity {
            return Err(StructuralError::CapacityExceeded {
                residence: residence_id,
                requested: current + plan.capacity,
                zoned: residence.zoned_capacity,
            });
        }

        let serial = self.next_unit_serial;
        self.next_unit_serial += 1;
        let id = self.units.insert_with_key(|id| Unit {
            id,
            serial,
            residence: residence_id,
            capacity: plan.capacity,
            size: plan.size,
            price: plan.price,
            occupants: Vec::new(),
            owner: None,
        });
        if let Some(r) = self.residences.get_mut(residence_id) {
            r.units.push(id);
        }
        Ok(id)
    }

    /// Demolish a residence: every occupant is evicted first, then the
    /// residence and its units leave the hierarchy for good.
    /// Returns the evicted households.
    pub fn remove_residence(&mut self, id: ResidenceId) -> Result<Vec<HouseholdId>, StructuralError> {
        let residence = self
            .residences
            .remove(id)
            .ok_or(StructuralError::UnknownResidence(id))?;

        let mut evicted = Vec::new();
        for unit_id in &residence.units {
            if let Some(mut unit) = self.units.remove(*unit_id) {
                evicted.append(&mut unit.occupants);
            }
        }

        let block = self
            .blocks
            .get_mut(residence.block)
            .ok_or(StructuralError::UnknownBlock(residence.block))?;
        block.residences.retain(|r| *r != id);
        block.area_used = (block.area_used - residence.footprint).max(0.0);

        Ok(evicted)
    }

    // === Occupancy ===

    pub fn occupy(&mut self, unit_id: UnitId, household: HouseholdId) -> Result<(), StructuralError> {
        let unit = self
            .units
            .get_mut(unit_id)
            .ok_or(StructuralError::UnknownUnit(unit_id))?;
        if !unit.is_vacant() {
            return Err(StructuralError::UnitFull(unit_id));
        }
        unit.occupants.push(household);
        Ok(())
    }

    /// Clear a household from a unit, including any ownership it held.
    pub fn vacate(&mut self, unit_id: UnitId, household: HouseholdId) -> Result<(), StructuralError> {
        let unit = self
            .units
            .get_mut(unit_id)
            .ok_or(StructuralError::UnknownUnit(unit_id))?;
        let pos = unit
            .occupants
            .iter()
            .position(|h| *h == household)
            .ok_or(StructuralError::NotOccupant {
                unit: unit_id,
                household,
            })?;
        unit.occupants.remove(pos);
        if unit.owner == Some(household) {
            unit.owner = None;
        }
        Ok(())
    }

    pub fn set_owner(&mut self, unit_id: UnitId, household: HouseholdId) -> Result<(), StructuralError> {
        let unit = self
            .units
            .get_mut(unit_id)
            .ok_or(StructuralError::UnknownUnit(unit_id))?;
        if !unit.is_occupied_by(household) {
            return Err(StructuralError::NotOccupant {
                unit: unit_id,
                household,
            });
        }
        unit.owner = Some(household);
        Ok(())
    }

    // === Prices ===

    /// Multiply the price of every unit matching `filter` by `factor`.
    /// Returns how many units changed.
    pub(crate) fn scale_prices(&mut self, factor: f64, filter: impl Fn(&Unit) -> bool) -> usize {
        let mut changed = 0;
        for unit in self.units.values_mut().filter(|u| filter(u)) {
            unit.price *= factor;
            changed += 1;
        }
        changed
    }

    // === Zoning ===

    pub fn schedule_zone(&mut self, district: DistrictId, zone: Zone) -> Result<(), StructuralError> {
        let d = self
            .districts
            .get_mut(district)
            .ok_or(StructuralError::UnknownDistrict(district))?;
        d.pending_zone = Some(zone);
        Ok(())
    }

    /// Apply pending district zones and pass each district's zone down to its blocks.
    /// Returns the districts whose zone changed.
    pub fn commit_pending_zoning(&mut self) -> Vec<(DistrictId, Zone)> {
        let mut changed = Vec::new();
        for district in self.districts.values_mut() {
            if let Some(zone) = district.pending_zone.take() {
                if zone != district.zone {
                    changed.push((district.id, zone));
                }
                district.zone = zone;
            }
        }
        for block in self.blocks.values_mut() {
            if let Some(d) = self.districts.get(block.district) {
                block.zone = d.zone;
            }
        }
        changed
    }

    // === Invariants ===

    pub fn check_invariants(&self) -> Result<(), StructuralError> {
        for unit in self.units.values() {
            if !unit.price.is_finite() || unit.price < 0.0 {
                return Err(StructuralError::InvalidPrice {
                    unit: Some(unit.id),
                    price: unit.price,
                });
            }
            if unit.occupants.len() as u32 > unit.capacity {
                return Err(StructuralError::UnitFull(unit.id));
            }
            let residence = self
                .residences
                .get(unit.residence)
                .ok_or_else(|| StructuralError::Orphan(format!("unit {:?} has no residence", unit.id)))?;
            if !residence.units.contains(&unit.id) {
                return Err(StructuralError::Orphan(format!(
                    "residence {:?} does not list unit {:?}",
                    residence.id, unit.id
                )));
            }
        }
        for residence in self.residences.values() {
            let capacity: u32 = residence
                .units
                .iter()
                .filter_map(|u| self.units.get(*u))
                .map(|u| u.capacity)
                .sum();
            if capacity > residence.zoned_capacity {
                return Err(StructuralError::CapacityExceeded {
                    residence: residence.id,
                    requested: capacity,
                    zoned: residence.zoned_capacity,
                });
            }
            let block = self
                .blocks
                .get(residence.block)
                .ok_or(StructuralError::UnknownBlock(residence.block))?;
            if !block.residences.contains(&residence.id) {
                return Err(StructuralError::Orphan(format!(
                    "block {:?} does not list residence {:?}",
                    block.id, residence.id
                )));
            }
        }
        Ok(())
    }
}
