//! Tabular history and recorded events of a short run.

use std::collections::BTreeMap;

use city_core::config::CityShape;
use city_core::{BLOCK_SIZE, History, SimConfig, Simulation};

fn rezoned_city() -> SimConfig {
    let mut config = SimConfig::default();
    config.arrivals.growth_rate = 0.1;
    config.city = CityShape::generated(
        4.0 * BLOCK_SIZE,
        vec![BTreeMap::from([(0, 1)]), BTreeMap::from([(0, 1), (2, 4)])],
    );
    config
}

#[test]
fn test_rows_match_live_entities() {
    let mut sim = Simulation::new(rezoned_city()).unwrap();
    sim.run(5).unwrap();
    let history = History::new(&sim);

    for record in sim.ledger().records() {
        let step = record.step;
        let count = |steps: &mut dyn Iterator<Item = u64>| steps.filter(|s| *s == step).count();
        assert_eq!(
            count(&mut history.households.iter().map(|r| r.step)),
            record.households.len()
        );
        assert_eq!(count(&mut history.units.iter().map(|r| r.step)), record.units.len());
        assert_eq!(
            count(&mut history.residences.iter().map(|r| r.step)),
            record.residences.len()
        );
        assert_eq!(count(&mut history.blocks.iter().map(|r| r.step)), 4);
        assert_eq!(count(&mut history.districts.iter().map(|r| r.step)), 2);
    }

    let latest = sim.ledger().latest().unwrap();
    assert_eq!(
        history
            .households
            .iter()
            .filter(|r| r.step == latest.step)
            .count(),
        sim.live_household_count()
    );
}

#[test]
fn test_zone_change_shows_in_district_rows() {
    let mut sim = Simulation::new(rezoned_city()).unwrap();
    sim.run(3).unwrap();
    let history = History::new(&sim);

    let zones: Vec<(u64, u32)> = history
        .districts
        .iter()
        .filter(|r| r.zone == 4)
        .map(|r| (r.step, r.zone))
        .collect();
    assert_eq!(zones, vec![(2, 4), (3, 4)]);
}

#[test]
fn test_summaries_agree_with_rows() {
    let mut sim = Simulation::new(rezoned_city()).unwrap();
    sim.run(4).unwrap();
    let history = History::new(&sim);

    let districts = history.district_summary();
    for city in history.city_summary() {
        let same_step = districts.iter().filter(|d| d.step == city.step);
        let (units, residences, occupied): (u64, u64, u64) = same_step.fold((0, 0, 0), |acc, d| {
            (acc.0 + d.units, acc.1 + d.residences, acc.2 + d.households)
        });
        assert_eq!(units, city.units);
        assert_eq!(residences, city.residences);
        assert_eq!(occupied, city.housed);
        assert_eq!(city.owners + city.renters, city.housed);
    }
}

#[test]
fn test_household_trace_follows_one_household() {
    let mut sim = Simulation::new(rezoned_city()).unwrap();
    sim.run(4).unwrap();
    let id = sim
        .ledger()
        .record(0)
        .unwrap()
        .households
        .iter()
        .next()
        .unwrap()
        .id;
    let trace = History::new(&sim).household_trace(id);

    assert!(!trace.is_empty());
    assert_eq!(trace[0].step, 0);
    for pair in trace.windows(2) {
        assert_eq!(pair[1].step, pair[0].step + 1);
        assert!(pair[1].spending_power >= pair[0].spending_power);
    }
    for point in &trace {
        assert_eq!(point.rent.is_some(), point.unit_size.is_some());
        assert_eq!(point.rent.is_some(), point.district_zone.is_some());
    }
}

#[test]
fn test_tables_convert_to_dataframes() {
    let mut sim = Simulation::new(rezoned_city()).unwrap();
    sim.run(3).unwrap();
    let history = History::new(&sim);

    let dfs = history.to_dataframes().unwrap();
    assert_eq!(dfs["households"].height(), history.households.len());
    assert_eq!(dfs["market"].height(), 4);
    assert_eq!(dfs["units"].width(), 11);
    assert!(dfs.contains_key("moves"));
}

#[test]
fn test_run_events_are_recorded() {
    let _guard = city_core::instrument::install_thread_subscriber();
    city_core::instrument::clear();

    let mut sim = Simulation::new(rezoned_city()).unwrap();
    sim.run(3).unwrap();

    let events = city_core::instrument::drain();
    // One clearing and one summary per step, step 0 included.
    assert_eq!(events.rows("clearing"), 4);
    assert_eq!(events.rows("step_stats"), 4);
    let arrivals: usize = sim.ledger().records().iter().map(|r| r.market.arrivals).sum();
    assert_eq!(events.rows("arrival"), arrivals);
    assert!(events.rows("zoning") >= 1);
}
