// Simulation state: the city, its agents and the ledger of every step so far.

use rand::SeedableRng;
use rand::rngs::StdRng;
use slotmap::SlotMap;

use crate::agents::{Council, Developer, Household, ZoningSchedule};
use crate::config::SimConfig;
use crate::error::{PolicyError, SimError, StructuralError};
use crate::housing::{City, ResidencePlan, UnitPlan};
use crate::ledger::Ledger;
use crate::market::MarketState;
use crate::types::{BlockId, CouncilId, DeveloperId, HouseholdId, Step};

/// A running simulation. Owns the city and every agent exclusively.
#[derive(Debug, Clone)]
pub struct Simulation {
    pub(crate) config: SimConfig,
    pub(crate) step: Step,
    pub(crate) city: City,
    pub(crate) households: SlotMap<HouseholdId, Household>,
    pub(crate) developers: SlotMap<DeveloperId, Developer>,
    pub(crate) councils: SlotMap<CouncilId, Council>,
    pub(crate) market: MarketState,
    pub(crate) ledger: Ledger,
    pub(crate) rng: StdRng,
    pub(crate) next_household_serial: u64,
    /// Step at which a fatal error stopped the run.
    pub(crate) halted: Option<Step>,
}

fn city_error(e: StructuralError) -> PolicyError {
    PolicyError::invalid("city", e.to_string())
}

impl Simulation {
    /// Validate `config`, lay out the initial city and run step 0:
    /// initial zoning, development rounds, the first cohort and its matching.
    pub fn new(config: SimConfig) -> Result<Self, PolicyError> {
        config.validate()?;

        let mut sim = Self {
            step: 0,
            city: City::new(),
            households: SlotMap::with_key(),
            developers: SlotMap::with_key(),
            councils: SlotMap::with_key(),
            market: MarketState::new(&config.pricing, &config.income),
            ledger: Ledger::new(),
            rng: StdRng::seed_from_u64(config.seed),
            next_household_serial: 0,
            halted: None,
            config,
        };
        sim.lay_out_city()?;
        sim.initialize().map_err(city_error)?;
        Ok(sim)
    }

    /// Build districts, blocks and standing residences from the config, and
    /// deal districts to councils and blocks to developers round-robin.
    fn lay_out_city(&mut self) -> Result<(), PolicyError> {
        let (construct_p, demolish_p) = (self.config.council.construct_p, self.config.council.demolish_p);
        let council_ids: Vec<CouncilId> = (0..self.config.council.councils)
            .map(|_| {
                self.councils
                    .insert_with_key(|id| Council::new(id, construct_p, demolish_p))
            })
            .collect();

        let mut blocks: Vec<BlockId> = Vec::new();
        for (i, spec) in self.config.city.districts.iter().enumerate() {
            let zone = spec
                .zoning
                .get(&0)
                .copied()
                .ok_or(PolicyError::MissingInitialZoning(i))?;
            let district = self.city.add_district(zone);
            if let Some(council) = council_ids
                .get(i % council_ids.len().max(1))
                .and_then(|id| self.councils.get_mut(*id))
            {
                council.schedules.push(ZoningSchedule {
                    district,
                    zoning: spec.zoning.clone(),
                });
            }

            for block_spec in &spec.blocks {
                let block = self.city.add_block(district, block_spec.area).map_err(city_error)?;
                blocks.push(block);
                for residence in &block_spec.residences {
                    let plan = ResidencePlan {
                        footprint: residence.footprint,
                        floors: residence.floors,
                        zone,
                        initial_age: residence.age,
                        units: residence
                            .units
                            .iter()
                            .map(|u| UnitPlan {
                                capacity: u.capacity,
                                size: u.size,
                                price: u.price.unwrap_or(u.size * self.market.price_per_sqft),
                            })
                            .collect(),
                    };
                    self.city.add_residence(block, &plan, 0).map_err(city_error)?;
                }
            }
        }

        let capital = self.config.construction.initial_capital;
        let developer_ids: Vec<DeveloperId> = (0..self.config.construction.developers)
            .map(|_| {
                self.developers
                    .insert_with_key(|id| Developer::new(id, capital))
            })
            .collect();
        for (i, block) in blocks.into_iter().enumerate() {
            if let Some(developer) = developer_ids
                .get(i % developer_ids.len().max(1))
                .and_then(|id| self.developers.get_mut(*id))
            {
                developer.territory.push(block);
            }
        }

        self.city.check_invariants().map_err(city_error)
    }

    /// Advance `n_steps` steps. Stops at the first fatal error, after which
    /// every further call reports the simulation as halted.
    pub fn run(&mut self, n_steps: u64) -> Result<(), SimError> {
        if let Some(step) = self.halted {
            return Err(SimError::Halted { step });
        }
        for _ in 0..n_steps {
            let step = self.step + 1;
            if let Err(e) = self.advance(step) {
                self.halted = Some(step);
                #[cfg(feature = "instrument")]
                tracing::error!(target: "halt", step = step, error = %e);
                return Err(e.into());
            }
        }
        Ok(())
    }

    // === Read access ===

    /// Last completed step.
    pub fn step(&self) -> Step {
        self.step
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn city(&self) -> &City {
        &self.city
    }

    /// Every household that ever arrived, departed ones included.
    pub fn households(&self) -> &SlotMap<HouseholdId, Household> {
        &self.households
    }

    pub fn developers(&self) -> &SlotMap<DeveloperId, Developer> {
        &self.developers
    }

    pub fn councils(&self) -> &SlotMap<CouncilId, Council> {
        &self.councils
    }

    pub fn market(&self) -> &MarketState {
        &self.market
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    pub fn live_household_count(&self) -> usize {
        self.households.values().filter(|h| !h.is_departed()).count()
    }
}
