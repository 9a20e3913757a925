//! End-to-end market scenarios on small hand-built cities.

use std::collections::BTreeMap;

use city_core::config::{BlockSpec, CityShape, DistrictSpec, ResidenceSpec, UnitSpec};
use city_core::housing::{City, ResidencePlan, Scope, UnitPlan};
use city_core::market::{self, Bidder, MarketState, Offer};
use city_core::{HouseholdId, MoveKind, SimConfig, Simulation, TenureTag};
use slotmap::SlotMap;

/// One block exactly covered by a three-unit building on zone-4 land, which
/// is already underzoned at step 0. Step 1's demolition phase is the first to
/// act on it; the rezoning to 16 only raises the demolition cap. The block
/// leaves no room for anything new.
fn doomed_triplex() -> SimConfig {
    let mut config = SimConfig::default();
    config.initial_households = 3;
    config.initial_development_rounds = 0;
    config.income.std_dev = 0.0;
    config.arrivals.growth_rate = 0.0;
    config.city = CityShape {
        districts: vec![DistrictSpec {
            zoning: BTreeMap::from([(0, 4), (1, 16)]),
            blocks: vec![BlockSpec {
                area: 1_500.0,
                residences: vec![ResidenceSpec {
                    footprint: 1_500.0,
                    floors: 1,
                    age: 10,
                    units: (0..3)
                        .map(|_| UnitSpec {
                            capacity: 1,
                            size: 425.0,
                            price: Some(100.0),
                        })
                        .collect(),
                }],
            }],
        }],
    };
    config
}

#[test]
fn scenario_a_excess_demand_raises_prices_under_ceiling() {
    let mut city = City::new();
    let district = city.add_district(4);
    let block = city.add_block(district, 100_000.0).unwrap();
    let fourplex = ResidencePlan {
        footprint: 1_000.0,
        floors: 2,
        zone: 4,
        initial_age: 0,
        units: vec![
            UnitPlan {
                capacity: 1,
                size: 500.0,
                price: 1_000.0,
            };
            4
        ],
    };
    for _ in 0..25 {
        city.add_residence(block, &fourplex, 0).unwrap();
    }
    // An occupied cheap unit outside the round, to observe the price rise.
    let cottage = ResidencePlan {
        units: vec![UnitPlan {
            capacity: 1,
            size: 500.0,
            price: 300.0,
        }],
        ..fourplex.clone()
    };
    let cottage = city.add_residence(block, &cottage, 0).unwrap();
    let cottage_unit = city.residence(cottage).unwrap().units[0];

    let mut keys: SlotMap<HouseholdId, ()> = SlotMap::with_key();
    let sitting_tenant = keys.insert(());
    city.occupy(cottage_unit, sitting_tenant).unwrap();

    // 100 households can afford 1000, 20 cannot.
    let bidders: Vec<Bidder> = (0..120u64)
        .map(|i| Bidder {
            household: keys.insert(()),
            serial: i,
            spending_power: if i < 100 { 1_500.0 + i as f64 } else { 400.0 + i as f64 },
        })
        .collect();
    let offers: Vec<Offer> = city
        .vacant_units(Scope::City)
        .map(|u| Offer {
            unit: u.id,
            serial: u.serial,
            price: u.price,
        })
        .collect();
    assert_eq!(offers.len(), 100);

    let config = SimConfig::default();
    let report = market::clear(bidders, offers, &config.pricing);
    assert_eq!(report.matched.len(), 100);
    assert_eq!(report.unmet.len(), 20);
    assert!((report.spike - 20.0 / 120.0).abs() < 1e-12);
    assert_eq!(report.ceiling, 519.0);

    let mut state = MarketState::new(&config.pricing, &config.income);
    let repriced = market::reprice(&mut city, &mut state, &report, &config.pricing);
    assert_eq!(repriced.repriced, 1);

    let expected = 300.0 * (1.0 + config.pricing.k * 20.0 / 120.0);
    assert!((city.unit(cottage_unit).unwrap().price - expected).abs() < 1e-9);
    for unit in city.units().values().filter(|u| u.id != cottage_unit) {
        assert_eq!(unit.price, 1_000.0);
    }
}

#[test]
fn scenario_b_no_seekers_means_no_spike() {
    let mut config = SimConfig::default();
    config.initial_households = 0;
    config.arrivals.growth_rate = 0.0;
    let inflation = config.pricing.inflation;
    let mut sim = Simulation::new(config).unwrap();
    sim.run(1).unwrap();

    let ledger = sim.ledger();
    let market = ledger.market(1).unwrap();
    assert_eq!(market.seeking, 0);
    assert_eq!(market.spike, 0.0);
    assert_eq!(market.repriced, 0);

    let before = ledger.record(0).unwrap();
    let after = ledger.record(1).unwrap();
    for unit in before.units.iter() {
        if let Some(later) = after.units.get(unit.id) {
            assert!((later.price - unit.price * (1.0 + inflation)).abs() < 1e-9);
        }
    }
}

#[test]
fn scenario_c_demolition_evicts_every_occupant() {
    let mut sim = Simulation::new(doomed_triplex()).unwrap();
    let start = sim.ledger().latest().unwrap();
    assert_eq!(start.residences.len(), 1);
    assert!(
        start
            .households
            .iter()
            .all(|h| h.status == TenureTag::Housed)
    );
    let residence = start.residences.iter().next().unwrap().id;

    sim.run(1).unwrap();

    let evictions: Vec<_> = sim
        .ledger()
        .moves()
        .filter(|m| m.kind == MoveKind::EvictedDemolition)
        .collect();
    assert_eq!(evictions.len(), 3);
    assert!(evictions.iter().all(|m| m.step == 1));

    let after = sim.ledger().record(1).unwrap();
    assert_eq!(after.market.demolitions, 1);
    assert!(after.residences.is_empty());
    assert!(after.units.is_empty());
    assert!(after.households.iter().all(|h| h.status == TenureTag::Seeking));
    assert!(sim.city().residence(residence).is_none());

    // Still on record for the step before.
    assert!(sim.ledger().residence(0, residence).is_some());
    assert_eq!(sim.ledger().record(0).unwrap().units.len(), 3);
}

#[test]
fn scenario_d_long_unhoused_households_depart_for_good() {
    let mut config = doomed_triplex();
    config.household.departure_grace = 1;
    let mut sim = Simulation::new(config).unwrap();

    sim.run(3).unwrap();
    assert_eq!(sim.live_household_count(), 0);
    let departures = sim
        .ledger()
        .moves()
        .filter(|m| m.kind == MoveKind::Departed)
        .count();
    assert_eq!(departures, 3);
    assert_eq!(sim.ledger().market(3).unwrap().departures, 3);
    assert!(sim.ledger().record(3).unwrap().households.is_empty());

    sim.run(2).unwrap();
    for step in 4..=5 {
        assert_eq!(sim.ledger().market(step).unwrap().seeking, 0);
    }
    assert!(sim.households().values().all(|h| h.is_departed()));
}
