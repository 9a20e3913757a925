// Per-step phase sequence.
//
// 0. start of step: zoning commit, inflation, income growth
// 1. arrivals
// 2. construction
// 3. zoning for the next step
// 4. demolition
// 5. affordability (evictions, departures)
// 6. matching and repricing
// 7. snapshot

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::agents::{Agent, Household, HouseholdAction, Phase, StepContext};
use crate::error::StructuralError;
use crate::housing::Scope;
use crate::ledger::{MarketSnapshot, MoveRecord, StepRecord};
use crate::market::{self, Bidder, ClearingReport, Offer, RepriceReport};
#[cfg(feature = "instrument")]
use crate::types::KeyToU64;
use crate::types::{HouseholdId, MoveKind, Step, UnitId};
use crate::world::Simulation;

/// Counts and moves gathered while a step runs.
#[derive(Debug, Default)]
struct StepLog {
    moves: Vec<MoveRecord>,
    arrivals: usize,
    departures: usize,
    evictions: usize,
    constructions: usize,
    demolitions: usize,
}

impl StepLog {
    fn record_move(
        &mut self,
        step: Step,
        household: HouseholdId,
        unit: Option<UnitId>,
        kind: MoveKind,
    ) {
        self.moves.push(MoveRecord {
            step,
            household,
            unit,
            kind,
        });
    }
}

impl Simulation {
    /// Step 0: zoning for step 1, initial development, the first cohort and
    /// its matching. Prices are not adjusted at step 0.
    pub(crate) fn initialize(&mut self) -> Result<(), StructuralError> {
        let mut log = StepLog::default();
        self.zone(0)?;
        for _ in 0..self.config.initial_development_rounds {
            self.develop(0, Phase::Construction, &mut log)?;
        }
        self.arrive(0, self.config.initial_households as u64, &mut log);
        let report = self.match_households(0, &mut log)?;
        self.city.check_invariants()?;
        self.snapshot(0, &report, RepriceReport::default(), log);
        Ok(())
    }

    pub(crate) fn advance(&mut self, step: Step) -> Result<(), StructuralError> {
        let mut log = StepLog::default();

        self.begin_step();

        let arrivals = self
            .config
            .arrivals
            .arrivals_for(step, self.live_household_count());
        self.arrive(step, arrivals, &mut log);

        self.develop(step, Phase::Construction, &mut log)?;
        self.zone(step)?;
        self.develop(step, Phase::Demolition, &mut log)?;
        self.check_affordability(step, &mut log)?;

        let report = self.match_households(step, &mut log)?;
        let repriced = market::reprice(&mut self.city, &mut self.market, &report, &self.config.pricing);

        #[cfg(feature = "instrument")]
        {
            if repriced.repriced > 0 {
                tracing::info!(
                    target: "repricing",
                    step = step,
                    units = repriced.repriced,
                    factor = repriced.factor,
                    ceiling = report.ceiling,
                    price_per_sqft = self.market.price_per_sqft,
                );
            }
        }

        self.city.check_invariants()?;
        self.snapshot(step, &report, repriced, log);
        self.step = step;
        Ok(())
    }

    /// Phase 0: apply last step's rezoning, inflate prices, grow incomes.
    fn begin_step(&mut self) {
        self.city.commit_pending_zoning();

        let inflation = self.config.pricing.inflation;
        self.city.scale_prices(1.0 + inflation, |_| true);
        self.market.inflate(inflation);

        let growth = self.config.income.growth_rate;
        for household in self.households.values_mut() {
            household.grow_income(growth);
        }
        self.market.grow_incomes(growth);
    }

    /// Phase 1: new households arrive seeking, spending power drawn from the
    /// current income distribution.
    fn arrive(&mut self, step: Step, count: u64, log: &mut StepLog) {
        let Self {
            households,
            rng,
            market,
            next_household_serial,
            ..
        } = self;
        let dist = Normal::new(market.income_mean, market.income_std).ok();

        for _ in 0..count {
            let spending_power = dist
                .map_or(market.income_mean, |d| d.sample(rng))
                .max(0.0);
            let serial = *next_household_serial;
            *next_household_serial += 1;
            let id = households.insert_with_key(|id| Household::new(id, serial, spending_power, step));
            log.arrivals += 1;

            #[cfg(feature = "instrument")]
            tracing::info!(
                target: "arrival",
                step = step,
                household = id.to_u64(),
                spending_power = spending_power,
            );
            let _ = id;
        }
    }

    /// Phases 2 and 4: every developer builds or demolishes. Occupants of
    /// demolished residences go back to seeking in the same step.
    fn develop(&mut self, step: Step, phase: Phase, log: &mut StepLog) -> Result<(), StructuralError> {
        let Self {
            config,
            city,
            households,
            developers,
            councils,
            market,
            rng,
            ..
        } = self;

        for developer in developers.values_mut() {
            let mut ctx = StepContext {
                step,
                phase,
                city: &mut *city,
                rng: &mut *rng,
                config: &*config,
                market: &*market,
                councils: Some(&mut *councils),
            };
            let outcome = developer.act(&mut ctx)?;
            log.constructions += outcome.built.len();
            log.demolitions += outcome.demolished.len();

            for id in outcome.evicted {
                let household = households
                    .get_mut(id)
                    .ok_or(StructuralError::UnknownHousehold(id))?;
                let unit = household.unit();
                household.evict();
                log.evictions += 1;
                log.record_move(step, id, unit, MoveKind::EvictedDemolition);

                #[cfg(feature = "instrument")]
                tracing::info!(
                    target: "eviction",
                    step = step,
                    household = id.to_u64(),
                    unit = unit.map(|u| u.to_u64()),
                    reason = MoveKind::EvictedDemolition.name(),
                );
            }
        }
        Ok(())
    }

    /// Phase 3: councils schedule the rezoning that takes effect next step.
    fn zone(&mut self, step: Step) -> Result<(), StructuralError> {
        let Self {
            config,
            city,
            councils,
            market,
            rng,
            ..
        } = self;
        for council in councils.values_mut() {
            let mut ctx = StepContext {
                step,
                phase: Phase::Zoning,
                city: &mut *city,
                rng: &mut *rng,
                config: &*config,
                market: &*market,
                councils: None,
            };
            let _scheduled = council.act(&mut ctx)?;

            #[cfg(feature = "instrument")]
            {
                for (district, zone) in &_scheduled {
                    tracing::info!(
                        target: "zoning",
                        step = step,
                        council = council.id.to_u64(),
                        district = district.to_u64(),
                        effective = step + 1,
                        zone = *zone,
                    );
                }
            }
        }
        Ok(())
    }

    /// Phase 5: renters priced out move out, long-unhoused households leave.
    fn check_affordability(&mut self, step: Step, log: &mut StepLog) -> Result<(), StructuralError> {
        let Self {
            config,
            city,
            households,
            market,
            rng,
            ..
        } = self;
        for household in households.values_mut() {
            let mut ctx = StepContext {
                step,
                phase: Phase::Affordability,
                city: &mut *city,
                rng: &mut *rng,
                config: &*config,
                market: &*market,
                councils: None,
            };
            match household.act(&mut ctx)? {
                HouseholdAction::Evicted { unit } => {
                    log.evictions += 1;
                    log.record_move(step, household.id, Some(unit), MoveKind::EvictedUnaffordable);

                    #[cfg(feature = "instrument")]
                    tracing::info!(
                        target: "eviction",
                        step = step,
                        household = household.id.to_u64(),
                        unit = unit.to_u64(),
                        reason = MoveKind::EvictedUnaffordable.name(),
                        spending_power = household.spending_power,
                    );
                }
                HouseholdAction::Departed => {
                    log.departures += 1;
                    log.record_move(step, household.id, None, MoveKind::Departed);

                    #[cfg(feature = "instrument")]
                    tracing::info!(
                        target: "departure",
                        step = step,
                        household = household.id.to_u64(),
                        unhoused_steps = household.unhoused_steps,
                    );
                }
                HouseholdAction::Stayed | HouseholdAction::Waiting => {}
            }
        }
        Ok(())
    }

    /// Phase 6: match seekers to vacant slots. Single-unit residences may be
    /// bought instead of rented. Unmatched seekers count another unhoused step.
    fn match_households(&mut self, step: Step, log: &mut StepLog) -> Result<ClearingReport, StructuralError> {
        let bidders: Vec<Bidder> = self
            .households
            .values()
            .filter(|h| h.is_seeking())
            .map(|h| Bidder {
                household: h.id,
                serial: h.serial,
                spending_power: h.spending_power,
            })
            .collect();
        let offers: Vec<Offer> = self
            .city
            .vacant_units(Scope::City)
            .flat_map(|u| {
                let offer = Offer {
                    unit: u.id,
                    serial: u.serial,
                    price: u.price,
                };
                std::iter::repeat_n(offer, u.free_slots() as usize)
            })
            .collect();

        let report = market::clear(bidders, offers, &self.config.pricing);

        let own_p = self.config.household.own_p;
        for &(household_id, unit_id) in &report.matched {
            self.city.occupy(unit_id, household_id)?;
            let household = self
                .households
                .get_mut(household_id)
                .ok_or(StructuralError::UnknownHousehold(household_id))?;
            household.move_in(unit_id, step);

            let single_unit = self
                .city
                .unit(unit_id)
                .and_then(|u| self.city.residence(u.residence))
                .is_some_and(|r| r.is_single_unit());
            if single_unit && own_p > 0.0 && self.rng.random_bool(own_p) {
                self.city.set_owner(unit_id, household_id)?;
            }
            log.record_move(step, household_id, Some(unit_id), MoveKind::MoveIn);
        }
        for id in &report.unmet {
            if let Some(household) = self.households.get_mut(*id) {
                household.mark_unhoused();
            }
        }

        #[cfg(feature = "instrument")]
        tracing::info!(
            target: "clearing",
            step = step,
            seeking = report.seeking,
            matched = report.matched.len(),
            unmet = report.unmet.len(),
            spike = report.spike,
            ceiling = report.ceiling,
        );

        Ok(report)
    }

    /// Phase 7: append the step's record to the ledger.
    fn snapshot(&mut self, step: Step, report: &ClearingReport, repriced: RepriceReport, log: StepLog) {
        let market = MarketSnapshot {
            seeking: report.seeking,
            matched: report.matched.len(),
            unmet: report.unmet.len(),
            spike: report.spike,
            ceiling: report.ceiling,
            repriced: repriced.repriced,
            price_per_sqft: self.market.price_per_sqft,
            income_mean: self.market.income_mean,
            arrivals: log.arrivals,
            departures: log.departures,
            evictions: log.evictions,
            constructions: log.constructions,
            demolitions: log.demolitions,
        };
        let record = StepRecord::capture(
            step,
            &self.city,
            &self.households,
            &self.developers,
            &self.councils,
            market,
            log.moves,
        );

        #[cfg(feature = "instrument")]
        tracing::info!(
            target: "step_stats",
            step = step,
            households = record.households.len(),
            residences = record.residences.len(),
            units = record.units.len(),
            vacant = self.city.vacant_units(Scope::City).count(),
            arrivals = record.market.arrivals,
            departures = record.market.departures,
            evictions = record.market.evictions,
            spike = record.market.spike,
            price_per_sqft = record.market.price_per_sqft,
        );

        self.ledger.append(record);
    }
}
