use rand::Rng;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use crate::config::DemolitionPolicy;
use crate::error::StructuralError;
use crate::housing::{Block, City, ResidencePlan, UnitPlan};
#[cfg(feature = "instrument")]
use crate::types::KeyToU64;
use crate::types::{
    BlockId, CouncilId, DeveloperId, DistrictId, HouseholdId, MIN_UNIT_SIZE, Price, ResidenceId,
    Step, Zone,
};

use super::{Agent, Council, Phase, Project, StepContext};

/// Builds and tears down residences across its territory. A developer does
/// not watch vacancies or demand; it builds wherever land, zoning, capital and
/// the council allow, and demolishes whatever has become eligible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Developer {
    pub id: DeveloperId,
    pub capital: f64,
    /// Blocks this developer works, in visiting order.
    pub territory: Vec<BlockId>,
    pub residences_built: u64,
    pub residences_demolished: u64,
}

/// What a developer did in one phase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeveloperOutcome {
    pub built: Vec<ResidenceId>,
    pub demolished: Vec<ResidenceId>,
    /// Occupants of demolished residences, already cleared from their units.
    pub evicted: Vec<HouseholdId>,
}

/// A planned building with its economics.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub plan: ResidencePlan,
    pub cost: f64,
    pub revenue: f64,
}

fn council_for<'c>(
    councils: &'c mut Option<&mut SlotMap<CouncilId, Council>>,
    district: DistrictId,
) -> Option<&'c mut Council> {
    councils
        .as_deref_mut()?
        .values_mut()
        .find(|c| c.governs(district))
}

impl Developer {
    pub fn new(id: DeveloperId, capital: f64) -> Self {
        Self {
            id,
            capital,
            territory: Vec::new(),
            residences_built: 0,
            residences_demolished: 0,
        }
    }

    /// Construction attempts per block: more, smaller buildings on low-zoned land.
    pub fn build_attempts(zoning_max: Zone, zone: Zone) -> u32 {
        zoning_max.div_ceil(zone.max(1))
    }

    /// Demolitions allowed per block per step.
    pub fn demolition_cap(zoning_max: Zone, zone: Zone) -> usize {
        (zoning_max as f64 / zone.max(1) as f64).round() as usize
    }

    /// Draw a residence for `block`: footprint, floors and unit split, with
    /// every unit priced at the current price per sqft.
    pub fn plan_residence(
        block: &Block,
        price_per_sqft: Price,
        cost_per_sqft: Price,
        rng: &mut impl Rng,
    ) -> Proposal {
        let zone = block.zone.max(1);
        let min_size = block.min_residence_size();
        let available = block.area_available();

        let mut max_size = min_size * 5.0 * zone as f64;
        if max_size > available {
            max_size = if available > block.area / 2.0 {
                block.area / 2.0
            } else {
                available
            };
        }
        let max_size = max_size.max(min_size).min(available);
        let footprint = if max_size > min_size {
            rng.random_range(min_size..=max_size)
        } else {
            min_size
        };

        let floors = if zone == 1 { 1 } else { rng.random_range(2..=zone) };
        let interior = footprint * floors as f64;

        let unit_count = if zone == 1 {
            1
        } else {
            // At least one unit per floor, at most as many minimum-size units as fit.
            let most = (interior / MIN_UNIT_SIZE).floor().max(1.0) as u32;
            rng.random_range(floors.min(most)..=most)
        };
        let unit_size = interior / unit_count as f64;
        let units = (0..unit_count)
            .map(|_| UnitPlan {
                capacity: 1,
                size: unit_size,
                price: unit_size * price_per_sqft,
            })
            .collect();

        Proposal {
            plan: ResidencePlan {
                footprint,
                floors,
                zone,
                initial_age: 0,
                units,
            },
            cost: interior * cost_per_sqft,
            revenue: interior * price_per_sqft,
        }
    }

    fn construct(&mut self, ctx: &mut StepContext<'_>) -> Result<DeveloperOutcome, StructuralError> {
        let policy = &ctx.config.construction;
        let zoning_max = ctx.config.zoning_max();
        let mut outcome = DeveloperOutcome::default();

        for &block_id in &self.territory {
            let zone = ctx
                .city
                .block(block_id)
                .ok_or(StructuralError::UnknownBlock(block_id))?
                .zone;

            for _ in 0..Self::build_attempts(zoning_max, zone) {
                let block = ctx
                    .city
                    .block(block_id)
                    .ok_or(StructuralError::UnknownBlock(block_id))?;
                if !block.has_room_to_build() {
                    break;
                }

                let approved = match council_for(&mut ctx.councils, block.district) {
                    Some(council) => council.approve(Project::Construction, ctx.rng),
                    None => false,
                };
                if !approved {
                    #[cfg(feature = "instrument")]
                    tracing::debug!(
                        target: "construction_skipped",
                        phase = ctx.phase.name(),
                        step = ctx.step,
                        developer = self.id.to_u64(),
                        block = block_id.to_u64(),
                        reason = "denied",
                    );
                    continue;
                }

                let proposal = Self::plan_residence(
                    block,
                    ctx.market.price_per_sqft,
                    policy.cost_per_sqft,
                    ctx.rng,
                );
                let profitable = proposal.revenue >= proposal.cost * (1.0 + policy.min_margin);
                if !profitable || self.capital < proposal.cost {
                    #[cfg(feature = "instrument")]
                    tracing::debug!(
                        target: "construction_skipped",
                        phase = ctx.phase.name(),
                        step = ctx.step,
                        developer = self.id.to_u64(),
                        block = block_id.to_u64(),
                        reason = if profitable { "capital" } else { "margin" },
                    );
                    continue;
                }

                let residence = ctx.city.add_residence(block_id, &proposal.plan, ctx.step)?;
                self.capital += proposal.revenue * policy.sale_share - proposal.cost;
                self.residences_built += 1;
                outcome.built.push(residence);

                #[cfg(feature = "instrument")]
                tracing::info!(
                    target: "construction",
                    step = ctx.step,
                    developer = self.id.to_u64(),
                    block = block_id.to_u64(),
                    residence = residence.to_u64(),
                    footprint = proposal.plan.footprint,
                    floors = proposal.plan.floors,
                    units = proposal.plan.units.len(),
                    cost = proposal.cost,
                    capital = self.capital,
                );
            }
        }
        Ok(outcome)
    }

    /// Whether a residence may be torn down at `step` on a block zoned `block_zone`.
    pub fn is_demolishable(
        city: &City,
        residence: ResidenceId,
        block_zone: Zone,
        step: Step,
        policy: &DemolitionPolicy,
    ) -> bool {
        let Some(r) = city.residence(residence) else {
            return false;
        };
        let age = r.age(step);
        if age < policy.min_age {
            return false;
        }
        let too_old = policy.max_age.is_some_and(|max| age >= max);
        let below_value = policy.value_floor > 0.0 && {
            let prices: Vec<Price> = r
                .units
                .iter()
                .filter_map(|u| city.unit(*u))
                .map(|u| u.price)
                .collect();
            !prices.is_empty()
                && prices.iter().sum::<Price>() / (prices.len() as f64) < policy.value_floor
        };
        r.is_underzoned(block_zone) || too_old || below_value
    }

    fn demolish(&mut self, ctx: &mut StepContext<'_>) -> Result<DeveloperOutcome, StructuralError> {
        let policy = &ctx.config.demolition;
        let zoning_max = ctx.config.zoning_max();
        let step = ctx.step;
        let mut outcome = DeveloperOutcome::default();

        for &block_id in &self.territory {
            let (district, eligible) = {
                let city: &City = ctx.city;
                let block = city
                    .block(block_id)
                    .ok_or(StructuralError::UnknownBlock(block_id))?;
                let eligible: Vec<ResidenceId> = block
                    .residences
                    .iter()
                    .copied()
                    .filter(|r| Self::is_demolishable(city, *r, block.zone, step, policy))
                    .take(Self::demolition_cap(zoning_max, block.zone))
                    .collect();
                (block.district, eligible)
            };

            for residence in eligible {
                let approved = match council_for(&mut ctx.councils, district) {
                    Some(council) => council.approve(Project::Demolition, ctx.rng),
                    None => false,
                };
                if !approved {
                    #[cfg(feature = "instrument")]
                    tracing::debug!(
                        target: "demolition_skipped",
                        phase = ctx.phase.name(),
                        step = step,
                        developer = self.id.to_u64(),
                        residence = residence.to_u64(),
                        reason = "denied",
                    );
                    continue;
                }

                let evicted = ctx.city.remove_residence(residence)?;
                self.residences_demolished += 1;

                #[cfg(feature = "instrument")]
                tracing::info!(
                    target: "demolition",
                    step = step,
                    developer = self.id.to_u64(),
                    block = block_id.to_u64(),
                    residence = residence.to_u64(),
                    evicted = evicted.len(),
                );

                outcome.demolished.push(residence);
                outcome.evicted.extend(evicted);
            }
        }
        Ok(outcome)
    }
}

impl Agent for Developer {
    type Outcome = DeveloperOutcome;

    fn act(&mut self, ctx: &mut StepContext<'_>) -> Result<Self::Outcome, StructuralError> {
        match ctx.phase {
            Phase::Construction => self.construct(ctx),
            Phase::Demolition => self.demolish(ctx),
            Phase::Zoning | Phase::Affordability => Ok(DeveloperOutcome::default()),
        }
    }
}
