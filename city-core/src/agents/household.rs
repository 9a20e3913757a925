use serde::{Deserialize, Serialize};

use crate::error::StructuralError;
use crate::types::{HouseholdId, Price, Step, TenureTag, UnitId};

use super::{Agent, Phase, StepContext};

/// Where a household stands. Exactly one state at a time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Tenure {
    Seeking,
    Housed { unit: UnitId, since: Step },
    /// Left the city. Terminal.
    Departed { step: Step },
}

impl Tenure {
    pub fn tag(&self) -> TenureTag {
        match self {
            Self::Seeking => TenureTag::Seeking,
            Self::Housed { .. } => TenureTag::Housed,
            Self::Departed { .. } => TenureTag::Departed,
        }
    }
}

/// The unit of population. A household seeks a unit it can afford and stays
/// until the rent rises above its spending power or its residence is torn
/// down. Spending power is the share of income available for housing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Household {
    pub id: HouseholdId,
    /// Arrival order across the whole run. Breaks spending-power ties in matching.
    pub serial: u64,
    pub spending_power: Price,
    pub arrived: Step,
    pub tenure: Tenure,
    /// Completed steps this household has ended without a unit, in a row.
    pub unhoused_steps: u64,
}

/// What a household did in the affordability phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HouseholdAction {
    Stayed,
    Waiting,
    Evicted { unit: UnitId },
    Departed,
}

impl Household {
    pub fn new(id: HouseholdId, serial: u64, spending_power: Price, arrived: Step) -> Self {
        Self {
            id,
            serial,
            spending_power: spending_power.max(0.0),
            arrived,
            tenure: Tenure::Seeking,
            unhoused_steps: 0,
        }
    }

    pub fn unit(&self) -> Option<UnitId> {
        match self.tenure {
            Tenure::Housed { unit, .. } => Some(unit),
            _ => None,
        }
    }

    pub fn is_seeking(&self) -> bool {
        self.tenure == Tenure::Seeking
    }

    pub fn is_departed(&self) -> bool {
        matches!(self.tenure, Tenure::Departed { .. })
    }

    pub fn age(&self, step: Step) -> u64 {
        step.saturating_sub(self.arrived)
    }

    pub fn grow_income(&mut self, growth_rate: f64) {
        if !self.is_departed() {
            self.spending_power *= 1.0 + growth_rate;
        }
    }

    pub fn move_in(&mut self, unit: UnitId, step: Step) {
        self.tenure = Tenure::Housed { unit, since: step };
        self.unhoused_steps = 0;
    }

    /// Back to seeking after losing a unit. The unit side must already be cleared.
    pub fn evict(&mut self) {
        self.tenure = Tenure::Seeking;
    }

    /// Count a step that ended without a unit.
    pub fn mark_unhoused(&mut self) {
        if self.is_seeking() {
            self.unhoused_steps += 1;
        }
    }
}

impl Agent for Household {
    type Outcome = HouseholdAction;

    /// In the affordability phase a renter whose rent now exceeds its spending
    /// power moves out, and a household that has gone unhoused for longer than
    /// the grace period leaves the city.
    fn act(&mut self, ctx: &mut StepContext<'_>) -> Result<Self::Outcome, StructuralError> {
        if ctx.phase != Phase::Affordability {
            return Ok(HouseholdAction::Stayed);
        }
        match self.tenure {
            Tenure::Departed { .. } => Ok(HouseholdAction::Stayed),
            Tenure::Housed { unit, .. } => {
                let u = ctx
                    .city
                    .unit(unit)
                    .ok_or(StructuralError::UnknownUnit(unit))?;
                let owns = u.owner == Some(self.id);
                if u.price > self.spending_power && !owns {
                    ctx.city.vacate(unit, self.id)?;
                    self.evict();
                    Ok(HouseholdAction::Evicted { unit })
                } else {
                    Ok(HouseholdAction::Stayed)
                }
            }
            Tenure::Seeking => {
                if self.unhoused_steps > ctx.config.household.departure_grace {
                    self.tenure = Tenure::Departed { step: ctx.step };
                    Ok(HouseholdAction::Departed)
                } else {
                    Ok(HouseholdAction::Waiting)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::housing::{City, ResidencePlan, UnitPlan};
    use crate::market::MarketState;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use slotmap::SlotMap;

    struct Fixture {
        city: City,
        unit: UnitId,
        config: SimConfig,
        market: MarketState,
        rng: StdRng,
    }

    fn fixture(price: Price) -> Fixture {
        let mut city = City::new();
        let district = city.add_district(1);
        let block = city.add_block(district, 10_000.0).unwrap();
        let plan = ResidencePlan {
            footprint: 1_000.0,
            floors: 1,
            zone: 1,
            initial_age: 0,
            units: vec![UnitPlan {
                capacity: 1,
                size: 1_000.0,
                price,
            }],
        };
        let residence = city.add_residence(block, &plan, 0).unwrap();
        let unit = city.residence(residence).unwrap().units[0];
        let config = SimConfig::default();
        let market = MarketState::new(&config.pricing, &config.income);
        Fixture {
            city,
            unit,
            config,
            market,
            rng: StdRng::seed_from_u64(42),
        }
    }

    fn affordability(f: &mut Fixture, household: &mut Household, step: Step) -> HouseholdAction {
        let mut ctx = StepContext {
            step,
            phase: Phase::Affordability,
            city: &mut f.city,
            rng: &mut f.rng,
            config: &f.config,
            market: &f.market,
            councils: None,
        };
        household.act(&mut ctx).unwrap()
    }

    fn household_id() -> HouseholdId {
        let mut ids: SlotMap<HouseholdId, ()> = SlotMap::with_key();
        ids.insert(())
    }

    #[test]
    fn test_renter_evicted_when_rent_exceeds_spending_power() {
        let mut f = fixture(1_000.0);
        let mut household = Household::new(household_id(), 0, 1_500.0, 0);
        f.city.occupy(f.unit, household.id).unwrap();
        household.move_in(f.unit, 0);

        assert_eq!(affordability(&mut f, &mut household, 1), HouseholdAction::Stayed);

        household.spending_power = 900.0;
        assert_eq!(
            affordability(&mut f, &mut household, 2),
            HouseholdAction::Evicted { unit: f.unit }
        );
        assert!(household.is_seeking());
        assert!(f.city.unit(f.unit).unwrap().is_vacant());
    }

    #[test]
    fn test_owner_is_never_priced_out() {
        let mut f = fixture(1_000.0);
        let mut household = Household::new(household_id(), 0, 100.0, 0);
        f.city.occupy(f.unit, household.id).unwrap();
        f.city.set_owner(f.unit, household.id).unwrap();
        household.move_in(f.unit, 0);

        assert_eq!(affordability(&mut f, &mut household, 1), HouseholdAction::Stayed);
        assert_eq!(household.unit(), Some(f.unit));
    }

    #[test]
    fn test_departs_after_grace_period() {
        let mut f = fixture(1_000.0);
        let grace = f.config.household.departure_grace;
        let mut household = Household::new(household_id(), 0, 10.0, 0);

        for step in 1..=grace + 1 {
            assert_eq!(affordability(&mut f, &mut household, step), HouseholdAction::Waiting);
            household.mark_unhoused();
        }
        assert_eq!(
            affordability(&mut f, &mut household, grace + 2),
            HouseholdAction::Departed
        );
        assert_eq!(household.tenure.tag(), TenureTag::Departed);

        let before = household.spending_power;
        household.grow_income(0.5);
        assert_eq!(household.spending_power, before);
    }

    #[test]
    fn test_negative_income_clamped() {
        let household = Household::new(household_id(), 0, -50.0, 0);
        assert_eq!(household.spending_power, 0.0);
    }
}
