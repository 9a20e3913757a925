//! Invariants that must hold at every recorded step of a run.

use std::collections::BTreeMap;

use city_core::config::CityShape;
use city_core::{BLOCK_SIZE, MoveKind, SimConfig, Simulation, TenureTag};

/// A busier city: three districts, one of them upzoned mid-run, with
/// demand that outruns supply.
fn growing_city(seed: u64) -> SimConfig {
    let mut config = SimConfig::default();
    config.seed = seed;
    config.initial_households = 150;
    config.arrivals.growth_rate = 0.08;
    config.household.own_p = 0.3;
    config.city = CityShape::generated(
        9.0 * BLOCK_SIZE,
        vec![
            BTreeMap::from([(0, 1)]),
            BTreeMap::from([(0, 1), (3, 4)]),
            BTreeMap::from([(0, 2), (5, 8)]),
        ],
    );
    config
}

#[test]
fn test_every_step_respects_capacity_and_prices() {
    let mut sim = Simulation::new(growing_city(11)).unwrap();
    sim.run(10).unwrap();

    for record in sim.ledger().records() {
        for unit in record.units.iter() {
            assert!(unit.price >= 0.0, "negative price at step {}", record.step);
            assert!(unit.occupants.len() as u32 <= unit.capacity);
            if let Some(owner) = unit.owner {
                assert!(unit.occupants.contains(&owner));
            }
        }
        for residence in record.residences.iter() {
            let capacity: u32 = residence
                .units
                .iter()
                .filter_map(|u| record.units.get(*u))
                .map(|u| u.capacity)
                .sum();
            assert!(capacity <= residence.zoned_capacity);
        }
        for block in record.blocks.iter() {
            assert!(block.area_used <= block.area + 1e-6);
        }
    }
}

#[test]
fn test_household_links_resolve_within_each_step() {
    let mut sim = Simulation::new(growing_city(3)).unwrap();
    sim.run(8).unwrap();

    for record in sim.ledger().records() {
        for household in record.households.iter() {
            match household.status {
                TenureTag::Housed => {
                    let unit = household.unit.and_then(|u| record.units.get(u));
                    let unit = unit.expect("housed household's unit is recorded");
                    assert!(unit.occupants.contains(&household.id));
                    assert!(record.unit_chain(unit.id).is_some());
                }
                TenureTag::Seeking => assert_eq!(household.unit, None),
                TenureTag::Departed => panic!("departed household recorded"),
            }
        }
    }
}

#[test]
fn test_population_is_conserved() {
    let mut sim = Simulation::new(growing_city(5)).unwrap();
    sim.run(10).unwrap();

    let mut live = 0usize;
    for record in sim.ledger().records() {
        live = live + record.market.arrivals - record.market.departures;
        assert_eq!(record.households.len(), live, "step {}", record.step);

        let housed = record
            .households
            .iter()
            .filter(|h| h.status == TenureTag::Housed)
            .count();
        let occupants: usize = record.units.iter().map(|u| u.occupants.len()).sum();
        assert_eq!(housed, occupants);
        assert_eq!(
            record.market.matched + record.market.unmet,
            record.market.seeking
        );
        let departed = record
            .moves
            .iter()
            .filter(|m| m.kind == MoveKind::Departed)
            .count();
        assert_eq!(departed, record.market.departures);
    }
    assert_eq!(sim.live_household_count(), live);
}

#[test]
fn test_prices_never_fall() {
    let mut sim = Simulation::new(growing_city(9)).unwrap();
    sim.run(10).unwrap();

    let records = sim.ledger().records();
    for pair in records.windows(2) {
        for unit in pair[0].units.iter() {
            if let Some(later) = pair[1].units.get(unit.id) {
                assert!(later.price >= unit.price);
            }
        }
        assert!(pair[1].market.price_per_sqft >= pair[0].market.price_per_sqft);
    }
}

#[test]
fn test_same_seed_same_ledger() {
    let mut a = Simulation::new(growing_city(21)).unwrap();
    let mut b = Simulation::new(growing_city(21)).unwrap();
    a.run(6).unwrap();
    b.run(6).unwrap();
    assert_eq!(
        serde_json::to_string(a.ledger()).unwrap(),
        serde_json::to_string(b.ledger()).unwrap()
    );
}

#[test]
fn test_split_runs_match_single_run() {
    let mut split = Simulation::new(growing_city(4)).unwrap();
    split.run(3).unwrap();
    split.run(2).unwrap();

    let mut whole = Simulation::new(growing_city(4)).unwrap();
    whole.run(5).unwrap();

    assert_eq!(split.step(), 5);
    assert_eq!(
        serde_json::to_string(split.ledger()).unwrap(),
        serde_json::to_string(whole.ledger()).unwrap()
    );
}

#[test]
fn test_zero_steps_changes_nothing() {
    let mut sim = Simulation::new(growing_city(1)).unwrap();
    let before = serde_json::to_string(sim.ledger()).unwrap();
    sim.run(0).unwrap();
    assert_eq!(sim.step(), 0);
    assert_eq!(serde_json::to_string(sim.ledger()).unwrap(), before);
}

#[test]
fn test_pricing_law_holds_across_a_run() {
    let config = growing_city(8);
    let (k, inflation) = (config.pricing.k, config.pricing.inflation);
    let mut sim = Simulation::new(config).unwrap();
    sim.run(8).unwrap();

    let mut checked = 0;
    for pair in sim.ledger().records().windows(2) {
        let market = &pair[1].market;
        let raised = market.spike > 0.0 && market.ceiling > 0.0;
        for unit in pair[0].units.iter() {
            let Some(later) = pair[1].units.get(unit.id) else {
                continue;
            };
            // Inflation applies at step start, before the round's repricing.
            let inflated = unit.price * (1.0 + inflation);
            let expected = if raised && inflated < market.ceiling {
                inflated * (1.0 + k * market.spike)
            } else {
                inflated
            };
            assert!(
                (later.price - expected).abs() <= 1e-9 * expected.max(1.0),
                "unit {:?} at step {}: {} != {}",
                unit.id,
                pair[1].step,
                later.price,
                expected
            );
            checked += 1;
        }
    }
    assert!(checked > 0);
}
