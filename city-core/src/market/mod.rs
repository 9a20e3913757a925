pub mod clearing;

pub use clearing::*;

use serde::{Deserialize, Serialize};

use crate::config::{IncomePolicy, PricingPolicy};
use crate::housing::City;
use crate::types::Price;

/// City-wide market parameters that drift over time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketState {
    /// Price per sqft of newly built units.
    pub price_per_sqft: Price,
    /// Spending-power distribution of arriving households.
    pub income_mean: f64,
    pub income_std: f64,
}

impl MarketState {
    pub fn new(pricing: &PricingPolicy, income: &IncomePolicy) -> Self {
        Self {
            price_per_sqft: pricing.price_per_sqft,
            income_mean: income.mean,
            income_std: income.std_dev,
        }
    }

    pub fn inflate(&mut self, inflation: f64) {
        self.price_per_sqft *= 1.0 + inflation;
    }

    pub fn grow_incomes(&mut self, growth_rate: f64) {
        self.income_mean *= 1.0 + growth_rate;
        self.income_std *= 1.0 + growth_rate;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RepriceReport {
    pub repriced: usize,
    pub factor: f64,
}

/// Raise every unit priced under the round's ceiling, and the price per sqft
/// of new construction with it. Prices never go down here.
pub fn reprice(
    city: &mut City,
    market: &mut MarketState,
    report: &ClearingReport,
    policy: &PricingPolicy,
) -> RepriceReport {
    let factor = price_factor(report.spike, policy);
    if report.spike <= 0.0 || report.ceiling <= 0.0 {
        return RepriceReport {
            repriced: 0,
            factor: 1.0,
        };
    }
    let ceiling = report.ceiling;
    let repriced = city.scale_prices(factor, |unit| unit.price < ceiling);
    market.price_per_sqft *= factor;
    RepriceReport { repriced, factor }
}
