// Matching of seeking households to vacant unit slots, and the demand spike
// that drives repricing. Pure functions over plain data.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::config::PricingPolicy;
use crate::types::{HouseholdId, Price, UnitId};

/// A seeking household's bid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bidder {
    pub household: HouseholdId,
    pub serial: u64,
    pub spending_power: Price,
}

/// One free slot in a unit. A unit with `n` free slots yields `n` offers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Offer {
    pub unit: UnitId,
    pub serial: u64,
    pub price: Price,
}

/// Result of one clearing round
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClearingReport {
    /// Households that entered the round seeking.
    pub seeking: usize,
    /// (household, unit) pairs in match order.
    pub matched: Vec<(HouseholdId, UnitId)>,
    /// Seeking households left without a unit, richest first.
    pub unmet: Vec<HouseholdId>,
    /// Unmet fraction of seekers, clamped when non-zero.
    pub spike: f64,
    /// Highest spending power among unmet households; 0 when all were housed.
    pub ceiling: Price,
}

/// Richest first; equal spending power keeps insertion order.
fn bidder_order(a: &Bidder, b: &Bidder) -> Ordering {
    b.spending_power
        .total_cmp(&a.spending_power)
        .then(a.serial.cmp(&b.serial))
}

/// Cheapest first; equal prices keep insertion order.
fn offer_order(a: &Offer, b: &Offer) -> Ordering {
    a.price.total_cmp(&b.price).then(a.serial.cmp(&b.serial))
}

/// Fraction of seekers left unmet, clamped to `[spike_floor, spike_cap]`
/// when at least one household is unmet.
pub fn demand_spike(unmet: usize, seeking: usize, policy: &PricingPolicy) -> f64 {
    if unmet == 0 || seeking == 0 {
        return 0.0;
    }
    let raw = unmet as f64 / seeking as f64;
    raw.clamp(policy.spike_floor, policy.spike_cap)
}

/// Match bidders against offers in lockstep.
///
/// Bidders are sorted by descending spending power and offers by ascending
/// price. Bidder `i` takes offer `i` if it can afford it. The first bidder
/// that cannot afford its offer ends the round: every bidder after it is
/// poorer and every remaining offer is dearer.
pub fn clear(
    mut bidders: Vec<Bidder>,
    mut offers: Vec<Offer>,
    policy: &PricingPolicy,
) -> ClearingReport {
    bidders.sort_by(bidder_order);
    offers.sort_by(offer_order);

    let seeking = bidders.len();
    let mut matched = Vec::with_capacity(seeking.min(offers.len()));
    for (bidder, offer) in bidders.iter().zip(&offers) {
        if offer.price > bidder.spending_power {
            break;
        }
        matched.push((bidder.household, offer.unit));
    }

    let unmet_bidders = &bidders[matched.len()..];
    let unmet: Vec<HouseholdId> = unmet_bidders.iter().map(|b| b.household).collect();
    // Sorted richest first, so the ceiling is the first unmet bidder.
    let ceiling = unmet_bidders.first().map_or(0.0, |b| b.spending_power.max(0.0));
    let spike = demand_spike(unmet.len(), seeking, policy);

    ClearingReport {
        seeking,
        matched,
        unmet,
        spike,
        ceiling,
    }
}

/// Price multiplier applied to units below the ceiling.
pub fn price_factor(spike: f64, policy: &PricingPolicy) -> f64 {
    1.0 + policy.k * spike
}

/// New price for a unit after a round: raised by the spike factor when
/// priced under the ceiling, otherwise unchanged. Never lower than `price`.
pub fn repriced(price: Price, report: &ClearingReport, policy: &PricingPolicy) -> Price {
    if price < report.ceiling {
        price * price_factor(report.spike, policy)
    } else {
        price
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    struct Ids {
        households: Vec<HouseholdId>,
        units: Vec<UnitId>,
    }

    fn ids(n: usize) -> Ids {
        let mut households: SlotMap<HouseholdId, ()> = SlotMap::with_key();
        let mut units: SlotMap<UnitId, ()> = SlotMap::with_key();
        Ids {
            households: (0..n).map(|_| households.insert(())).collect(),
            units: (0..n).map(|_| units.insert(())).collect(),
        }
    }

    fn bidders(ids: &Ids, powers: &[f64]) -> Vec<Bidder> {
        powers
            .iter()
            .enumerate()
            .map(|(i, &p)| Bidder {
                household: ids.households[i],
                serial: i as u64,
                spending_power: p,
            })
            .collect()
    }

    fn offers(ids: &Ids, prices: &[f64]) -> Vec<Offer> {
        prices
            .iter()
            .enumerate()
            .map(|(i, &p)| Offer {
                unit: ids.units[i],
                serial: i as u64,
                price: p,
            })
            .collect()
    }

    #[test]
    fn test_richest_takes_cheapest_in_lockstep() {
        let ids = ids(3);
        let report = clear(
            bidders(&ids, &[100.0, 300.0, 200.0]),
            offers(&ids, &[150.0, 50.0, 250.0]),
            &PricingPolicy::default(),
        );
        // 300 takes 50, 200 takes 150, 100 cannot afford 250.
        assert_eq!(
            report.matched,
            vec![(ids.households[1], ids.units[1]), (ids.households[2], ids.units[0])]
        );
        assert_eq!(report.unmet, vec![ids.households[0]]);
        assert!((report.spike - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(report.ceiling, 100.0);
    }

    #[test]
    fn test_first_failure_stops_matching() {
        let ids = ids(3);
        // 100 cannot afford 200; matching stops there.
        let report = clear(
            bidders(&ids, &[500.0, 100.0, 90.0]),
            offers(&ids, &[100.0, 200.0, 300.0]),
            &PricingPolicy::default(),
        );
        assert_eq!(report.matched.len(), 1);
        assert_eq!(report.unmet, vec![ids.households[1], ids.households[2]]);
        assert_eq!(report.ceiling, 100.0);
    }

    #[test]
    fn test_equal_spending_power_keeps_insertion_order() {
        let ids = ids(2);
        let report = clear(
            bidders(&ids, &[100.0, 100.0]),
            offers(&ids, &[50.0]),
            &PricingPolicy::default(),
        );
        assert_eq!(report.matched, vec![(ids.households[0], ids.units[0])]);
        assert_eq!(report.unmet, vec![ids.households[1]]);
    }

    #[test]
    fn test_empty_supply_and_demand_are_zero_states() {
        let ids = ids(2);
        let policy = PricingPolicy::default();

        let nobody = clear(Vec::new(), offers(&ids, &[10.0]), &policy);
        assert_eq!(nobody.seeking, 0);
        assert_eq!(nobody.spike, 0.0);
        assert_eq!(nobody.ceiling, 0.0);

        let nothing = clear(bidders(&ids, &[10.0, 20.0]), Vec::new(), &policy);
        assert!(nothing.matched.is_empty());
        assert_eq!(nothing.spike, 1.0);
        assert_eq!(nothing.ceiling, 20.0);
    }

    #[test]
    fn test_spike_is_clamped_only_when_unmet() {
        let policy = PricingPolicy {
            spike_floor: 0.01,
            spike_cap: 0.2,
            ..PricingPolicy::default()
        };
        assert_eq!(demand_spike(0, 10, &policy), 0.0);
        assert_eq!(demand_spike(5, 10, &policy), 0.2);
        assert_eq!(demand_spike(1, 1000, &policy), 0.01);
        assert_eq!(demand_spike(1, 20, &policy), 0.05);
    }

    #[test]
    fn test_repricing_only_below_ceiling() {
        let policy = PricingPolicy {
            k: 2.0,
            ..PricingPolicy::default()
        };
        let report = ClearingReport {
            seeking: 4,
            matched: Vec::new(),
            unmet: Vec::new(),
            spike: 0.25,
            ceiling: 100.0,
        };
        assert_eq!(repriced(50.0, &report, &policy), 75.0);
        assert_eq!(repriced(100.0, &report, &policy), 100.0);
        assert_eq!(repriced(150.0, &report, &policy), 150.0);
    }
}
