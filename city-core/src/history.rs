//! Flattens the ledger into fixed-schema tables and yearly summaries.
//!
//! Every row is derived from a single step's record: a household's unit,
//! residence, block and district are resolved through the snapshots taken
//! in that same step, never through the live city.

use serde::Serialize;

use crate::ledger::{Ledger, StepRecord};
use crate::types::{HouseholdId, KeyToU64, Price, Step, TenureTag};
use crate::world::Simulation;

// ============================================================================
// Rows
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitRow {
    pub step: Step,
    pub unit: u64,
    pub residence: u64,
    pub block: Option<u64>,
    pub district: Option<u64>,
    pub capacity: u32,
    pub size: f64,
    pub price: Price,
    pub age: Option<u64>,
    pub occupants: u32,
    pub owner: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResidenceRow {
    pub step: Step,
    pub residence: u64,
    pub block: u64,
    pub district: Option<u64>,
    pub footprint: f64,
    pub floors: u32,
    pub interior: f64,
    pub zone: u32,
    pub zoned_capacity: u32,
    pub units: u32,
    pub age: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockRow {
    pub step: Step,
    pub block: u64,
    pub district: u64,
    pub area: f64,
    pub area_used: f64,
    pub area_available: f64,
    pub zone: u32,
    pub residences: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistrictRow {
    pub step: Step,
    pub district: u64,
    pub zone: u32,
    pub blocks: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HouseholdRow {
    pub step: Step,
    pub household: u64,
    pub spending_power: Price,
    pub status: &'static str,
    pub unit: Option<u64>,
    pub residence: Option<u64>,
    pub block: Option<u64>,
    pub district: Option<u64>,
    pub rent: Option<Price>,
    /// Steps spent in the current unit.
    pub tenure: Option<u64>,
    pub unhoused_steps: u64,
    pub owns: bool,
    /// Steps since arrival.
    pub age: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeveloperRow {
    pub step: Step,
    pub developer: u64,
    pub capital: f64,
    pub blocks: u32,
    pub residences_built: u64,
    pub residences_demolished: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CouncilRow {
    pub step: Step,
    pub council: u64,
    pub districts: u32,
    pub construct_p: f64,
    pub demolish_p: f64,
    pub approved: u64,
    pub denied: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketRow {
    pub step: Step,
    pub seeking: u64,
    pub matched: u64,
    pub unmet: u64,
    pub spike: f64,
    pub ceiling: Price,
    pub repriced: u64,
    pub price_per_sqft: Price,
    pub income_mean: f64,
    pub arrivals: u64,
    pub departures: u64,
    pub evictions: u64,
    pub constructions: u64,
    pub demolitions: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoveRow {
    pub step: Step,
    pub household: u64,
    pub unit: Option<u64>,
    pub kind: &'static str,
}

// ============================================================================
// Summaries
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistrictSummary {
    pub step: Step,
    pub district: u64,
    pub zone: u32,
    pub empty_land: f64,
    pub residences: u64,
    pub single_unit_residences: u64,
    pub multi_unit_residences: u64,
    /// Mean total unit area per residence.
    pub mean_residence_size: f64,
    pub units: u64,
    pub mean_unit_size: f64,
    pub mean_unit_price: Price,
    /// Occupied units.
    pub households: u64,
    pub mean_spending_power: f64,
    pub owners: u64,
    pub renters: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CitySummary {
    pub step: Step,
    pub empty_land: f64,
    pub residences: u64,
    pub single_unit_residences: u64,
    pub multi_unit_residences: u64,
    pub mean_residence_size: f64,
    pub units: u64,
    pub mean_unit_size: f64,
    pub mean_unit_price: Price,
    pub households: u64,
    pub housed: u64,
    pub unhoused: u64,
    pub mean_spending_power: f64,
    pub owners: u64,
    pub renters: u64,
    pub mean_household_age: f64,
    pub spike: f64,
    pub ceiling: Price,
    pub price_per_sqft: Price,
}

/// One household's situation at one step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HouseholdTracePoint {
    pub step: Step,
    pub spending_power: Price,
    /// Rent paid; `None` while unhoused.
    pub rent: Option<Price>,
    pub unit_size: Option<f64>,
    pub district_zone: Option<u32>,
}

fn mean(sum: f64, count: u64) -> f64 {
    if count == 0 { 0.0 } else { sum / count as f64 }
}

// ============================================================================
// History
// ============================================================================

/// Tabular view of a simulation's ledger.
#[derive(Debug, Clone)]
pub struct History<'a> {
    ledger: &'a Ledger,
    pub units: Vec<UnitRow>,
    pub residences: Vec<ResidenceRow>,
    pub blocks: Vec<BlockRow>,
    pub districts: Vec<DistrictRow>,
    pub households: Vec<HouseholdRow>,
    pub developers: Vec<DeveloperRow>,
    pub councils: Vec<CouncilRow>,
    pub market: Vec<MarketRow>,
    pub moves: Vec<MoveRow>,
}

impl<'a> History<'a> {
    pub fn new(sim: &'a Simulation) -> Self {
        Self::from_ledger(sim.ledger())
    }

    pub fn from_ledger(ledger: &'a Ledger) -> Self {
        let mut history = Self {
            ledger,
            units: Vec::new(),
            residences: Vec::new(),
            blocks: Vec::new(),
            districts: Vec::new(),
            households: Vec::new(),
            developers: Vec::new(),
            councils: Vec::new(),
            market: Vec::new(),
            moves: Vec::new(),
        };
        for record in ledger.records() {
            history.append_step(record);
        }
        history
    }

    fn append_step(&mut self, record: &StepRecord) {
        let step = record.step;

        for u in record.units.iter() {
            let chain = record.unit_chain(u.id);
            self.units.push(UnitRow {
                step,
                unit: u.id.to_u64(),
                residence: u.residence.to_u64(),
                block: chain.map(|(_, b, _)| b.to_u64()),
                district: chain.map(|(_, _, d)| d.to_u64()),
                capacity: u.capacity,
                size: u.size,
                price: u.price,
                age: record.residences.get(u.residence).map(|r| r.age),
                occupants: u.occupants.len() as u32,
                owner: u.owner.map(KeyToU64::to_u64),
            });
        }

        for r in record.residences.iter() {
            self.residences.push(ResidenceRow {
                step,
                residence: r.id.to_u64(),
                block: r.block.to_u64(),
                district: record.blocks.get(r.block).map(|b| b.district.to_u64()),
                footprint: r.footprint,
                floors: r.floors,
                interior: r.interior(),
                zone: r.zone,
                zoned_capacity: r.zoned_capacity,
                units: r.units.len() as u32,
                age: r.age,
            });
        }

        for b in record.blocks.iter() {
            self.blocks.push(BlockRow {
                step,
                block: b.id.to_u64(),
                district: b.district.to_u64(),
                area: b.area,
                area_used: b.area_used,
                area_available: (b.area - b.area_used).max(0.0),
                zone: b.zone,
                residences: b.residences.len() as u32,
            });
        }

        for d in record.districts.iter() {
            self.districts.push(DistrictRow {
                step,
                district: d.id.to_u64(),
                zone: d.zone,
                blocks: d.blocks.len() as u32,
            });
        }

        for h in record.households.iter() {
            let unit = h.unit.and_then(|u| record.units.get(u));
            let chain = h.unit.and_then(|u| record.unit_chain(u));
            self.households.push(HouseholdRow {
                step,
                household: h.id.to_u64(),
                spending_power: h.spending_power,
                status: h.status.name(),
                unit: h.unit.map(KeyToU64::to_u64),
                residence: chain.map(|(r, _, _)| r.to_u64()),
                block: chain.map(|(_, b, _)| b.to_u64()),
                district: chain.map(|(_, _, d)| d.to_u64()),
                rent: unit.map(|u| u.price),
                tenure: h.since.map(|since| step.saturating_sub(since)),
                unhoused_steps: h.unhoused_steps,
                owns: unit.is_some_and(|u| u.owner == Some(h.id)),
                age: step.saturating_sub(h.arrived),
            });
        }

        for d in record.developers.iter() {
            self.developers.push(DeveloperRow {
                step,
                developer: d.id.to_u64(),
                capital: d.capital,
                blocks: d.blocks as u32,
                residences_built: d.residences_built,
                residences_demolished: d.residences_demolished,
            });
        }

        for c in record.councils.iter() {
            self.councils.push(CouncilRow {
                step,
                council: c.id.to_u64(),
                districts: c.districts as u32,
                construct_p: c.construct_p,
                demolish_p: c.demolish_p,
                approved: c.approved,
                denied: c.denied,
            });
        }

        let m = &record.market;
        self.market.push(MarketRow {
            step,
            seeking: m.seeking as u64,
            matched: m.matched as u64,
            unmet: m.unmet as u64,
            spike: m.spike,
            ceiling: m.ceiling,
            repriced: m.repriced as u64,
            price_per_sqft: m.price_per_sqft,
            income_mean: m.income_mean,
            arrivals: m.arrivals as u64,
            departures: m.departures as u64,
            evictions: m.evictions as u64,
            constructions: m.constructions as u64,
            demolitions: m.demolitions as u64,
        });

        for mv in &record.moves {
            self.moves.push(MoveRow {
                step: mv.step,
                household: mv.household.to_u64(),
                unit: mv.unit.map(KeyToU64::to_u64),
                kind: mv.kind.name(),
            });
        }
    }

    /// Per (step, district) land, building, unit and occupant aggregates.
    pub fn district_summary(&self) -> Vec<DistrictSummary> {
        let mut out = Vec::new();
        for record in self.ledger.records() {
            for d in record.districts.iter() {
                let mut s = DistrictSummary {
                    step: record.step,
                    district: d.id.to_u64(),
                    zone: d.zone,
                    empty_land: 0.0,
                    residences: 0,
                    single_unit_residences: 0,
                    multi_unit_residences: 0,
                    mean_residence_size: 0.0,
                    units: 0,
                    mean_unit_size: 0.0,
                    mean_unit_price: 0.0,
                    households: 0,
                    mean_spending_power: 0.0,
                    owners: 0,
                    renters: 0,
                };
                let (mut unit_area, mut prices, mut spending) = (0.0, 0.0, 0.0);

                for b in d.blocks.iter().filter_map(|b| record.blocks.get(*b)) {
                    s.empty_land += (b.area - b.area_used).max(0.0);
                    for r in b.residences.iter().filter_map(|r| record.residences.get(*r)) {
                        s.residences += 1;
                        if r.units.len() == 1 {
                            s.single_unit_residences += 1;
                        } else {
                            s.multi_unit_residences += 1;
                        }
                        for u in r.units.iter().filter_map(|u| record.units.get(*u)) {
                            s.units += 1;
                            unit_area += u.size;
                            prices += u.price;
                            for occupant in &u.occupants {
                                s.households += 1;
                                if let Some(h) = record.households.get(*occupant) {
                                    spending += h.spending_power;
                                }
                                if u.owner == Some(*occupant) {
                                    s.owners += 1;
                                } else {
                                    s.renters += 1;
                                }
                            }
                        }
                    }
                }

                s.mean_residence_size = mean(unit_area, s.residences);
                s.mean_unit_size = mean(unit_area, s.units);
                s.mean_unit_price = mean(prices, s.units);
                s.mean_spending_power = mean(spending, s.households);
                out.push(s);
            }
        }
        out
    }

    /// Per step city-wide totals.
    pub fn city_summary(&self) -> Vec<CitySummary> {
        self.ledger
            .records()
            .iter()
            .map(|record| {
                let empty_land: f64 = record
                    .blocks
                    .iter()
                    .map(|b| (b.area - b.area_used).max(0.0))
                    .sum();
                let single = record.residences.iter().filter(|r| r.units.len() == 1).count() as u64;
                let residences = record.residences.len() as u64;
                let units = record.units.len() as u64;
                let unit_area: f64 = record.units.iter().map(|u| u.size).sum();
                let prices: f64 = record.units.iter().map(|u| u.price).sum();

                let households = record.households.len() as u64;
                let housed = record
                    .households
                    .iter()
                    .filter(|h| h.status == TenureTag::Housed)
                    .count() as u64;
                let owners = record
                    .units
                    .iter()
                    .filter(|u| u.owner.is_some_and(|o| u.occupants.contains(&o)))
                    .count() as u64;
                let spending: f64 = record.households.iter().map(|h| h.spending_power).sum();
                let ages: u64 = record
                    .households
                    .iter()
                    .map(|h| record.step.saturating_sub(h.arrived))
                    .sum();

                CitySummary {
                    step: record.step,
                    empty_land,
                    residences,
                    single_unit_residences: single,
                    multi_unit_residences: residences - single,
                    mean_residence_size: mean(unit_area, residences),
                    units,
                    mean_unit_size: mean(unit_area, units),
                    mean_unit_price: mean(prices, units),
                    households,
                    housed,
                    unhoused: households - housed,
                    mean_spending_power: mean(spending, households),
                    owners,
                    renters: housed.saturating_sub(owners),
                    mean_household_age: mean(ages as f64, households),
                    spike: record.market.spike,
                    ceiling: record.market.ceiling,
                    price_per_sqft: record.market.price_per_sqft,
                }
            })
            .collect()
    }

    /// Spending power, rent, unit size and district zone of one household for
    /// every step it was live.
    pub fn household_trace(&self, id: HouseholdId) -> Vec<HouseholdTracePoint> {
        self.ledger
            .records()
            .iter()
            .filter_map(|record| {
                let h = record.households.get(id)?;
                let unit = h.unit.and_then(|u| record.units.get(u));
                let district_zone = h
                    .unit
                    .and_then(|u| record.unit_chain(u))
                    .and_then(|(_, _, d)| record.districts.get(d))
                    .map(|d| d.zone);
                Some(HouseholdTracePoint {
                    step: record.step,
                    spending_power: h.spending_power,
                    rent: unit.map(|u| u.price),
                    unit_size: unit.map(|u| u.size),
                    district_zone,
                })
            })
            .collect()
    }
}

// ============================================================================
// Tables
// ============================================================================

#[cfg(feature = "instrument")]
mod tables {
    use instrument::{Cell, Row, TableSet, table_from_rows};
    use polars::prelude::{DataFrame, PolarsResult};
    use std::collections::BTreeMap;

    use super::*;

    impl Row for UnitRow {
        fn cells(&self) -> Vec<(&'static str, Cell)> {
            vec![
                ("step", self.step.into()),
                ("unit", self.unit.into()),
                ("residence", self.residence.into()),
                ("block", self.block.into()),
                ("district", self.district.into()),
                ("capacity", self.capacity.into()),
                ("size", self.size.into()),
                ("price", self.price.into()),
                ("age", self.age.into()),
                ("occupants", self.occupants.into()),
                ("owner", self.owner.into()),
            ]
        }
    }

    impl Row for ResidenceRow {
        fn cells(&self) -> Vec<(&'static str, Cell)> {
            vec![
                ("step", self.step.into()),
                ("residence", self.residence.into()),
                ("block", self.block.into()),
                ("district", self.district.into()),
                ("footprint", self.footprint.into()),
                ("floors", self.floors.into()),
                ("interior", self.interior.into()),
                ("zone", self.zone.into()),
                ("zoned_capacity", self.zoned_capacity.into()),
                ("units", self.units.into()),
                ("age", self.age.into()),
            ]
        }
    }

    impl Row for BlockRow {
        fn cells(&self) -> Vec<(&'static str, Cell)> {
            vec![
                ("step", self.step.into()),
                ("block", self.block.into()),
                ("district", self.district.into()),
                ("area", self.area.into()),
                ("area_used", self.area_used.into()),
                ("area_available", self.area_available.into()),
                ("zone", self.zone.into()),
                ("residences", self.residences.into()),
            ]
        }
    }

    impl Row for DistrictRow {
        fn cells(&self) -> Vec<(&'static str, Cell)> {
            vec![
                ("step", self.step.into()),
                ("district", self.district.into()),
                ("zone", self.zone.into()),
                ("blocks", self.blocks.into()),
            ]
        }
    }

    impl Row for HouseholdRow {
        fn cells(&self) -> Vec<(&'static str, Cell)> {
            vec![
                ("step", self.step.into()),
                ("household", self.household.into()),
                ("spending_power", self.spending_power.into()),
                ("status", self.status.into()),
                ("unit", self.unit.into()),
                ("residence", self.residence.into()),
                ("block", self.block.into()),
                ("district", self.district.into()),
                ("rent", self.rent.into()),
                ("tenure", self.tenure.into()),
                ("unhoused_steps", self.unhoused_steps.into()),
                ("owns", self.owns.into()),
                ("age", self.age.into()),
            ]
        }
    }

    impl Row for DeveloperRow {
        fn cells(&self) -> Vec<(&'static str, Cell)> {
            vec![
                ("step", self.step.into()),
                ("developer", self.developer.into()),
                ("capital", self.capital.into()),
                ("blocks", self.blocks.into()),
                ("residences_built", self.residences_built.into()),
                ("residences_demolished", self.residences_demolished.into()),
            ]
        }
    }

    impl Row for CouncilRow {
        fn cells(&self) -> Vec<(&'static str, Cell)> {
            vec![
                ("step", self.step.into()),
                ("council", self.council.into()),
                ("districts", self.districts.into()),
                ("construct_p", self.construct_p.into()),
                ("demolish_p", self.demolish_p.into()),
                ("approved", self.approved.into()),
                ("denied", self.denied.into()),
            ]
        }
    }

    impl Row for MarketRow {
        fn cells(&self) -> Vec<(&'static str, Cell)> {
            vec![
                ("step", self.step.into()),
                ("seeking", self.seeking.into()),
                ("matched", self.matched.into()),
                ("unmet", self.unmet.into()),
                ("spike", self.spike.into()),
                ("ceiling", self.ceiling.into()),
                ("repriced", self.repriced.into()),
                ("price_per_sqft", self.price_per_sqft.into()),
                ("income_mean", self.income_mean.into()),
                ("arrivals", self.arrivals.into()),
                ("departures", self.departures.into()),
                ("evictions", self.evictions.into()),
                ("constructions", self.constructions.into()),
                ("demolitions", self.demolitions.into()),
            ]
        }
    }

    impl Row for MoveRow {
        fn cells(&self) -> Vec<(&'static str, Cell)> {
            vec![
                ("step", self.step.into()),
                ("household", self.household.into()),
                ("unit", self.unit.into()),
                ("kind", self.kind.into()),
            ]
        }
    }

    impl History<'_> {
        /// Every row table, keyed by entity name.
        pub fn to_tables(&self) -> TableSet {
            let mut set = TableSet::default();
            set.insert("units", table_from_rows(&self.units));
            set.insert("residences", table_from_rows(&self.residences));
            set.insert("blocks", table_from_rows(&self.blocks));
            set.insert("districts", table_from_rows(&self.districts));
            set.insert("households", table_from_rows(&self.households));
            set.insert("developers", table_from_rows(&self.developers));
            set.insert("councils", table_from_rows(&self.councils));
            set.insert("market", table_from_rows(&self.market));
            set.insert("moves", table_from_rows(&self.moves));
            set
        }

        pub fn to_dataframes(&self) -> PolarsResult<BTreeMap<String, DataFrame>> {
            self.to_tables().to_dataframes()
        }
    }
}
