//! Simulation hyperparameters.
//!
//! Every field has a default so partial JSON configs deserialize. `validate`
//! turns anything out of range into a [`PolicyError`] before a single step runs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::types::{BLOCK_SIZE, Price, Step, Zone};

// ============================================================================
// City shape
// ============================================================================

/// One unit inside an initial residence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitSpec {
    pub capacity: u32,
    pub size: f64,
    /// Posted price. `None` prices the unit at `size * pricing.price_per_sqft`.
    pub price: Option<Price>,
}

impl Default for UnitSpec {
    fn default() -> Self {
        Self {
            capacity: 1,
            size: 1_000.0,
            price: None,
        }
    }
}

/// An initial residence standing on a block at step 0.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResidenceSpec {
    pub footprint: f64,
    pub floors: u32,
    /// Age of the building at step 0.
    pub age: u64,
    pub units: Vec<UnitSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockSpec {
    pub area: f64,
    pub residences: Vec<ResidenceSpec>,
}

impl Default for BlockSpec {
    fn default() -> Self {
        Self {
            area: BLOCK_SIZE,
            residences: Vec::new(),
        }
    }
}

/// A district, its blocks, and the council's zoning instructions for it.
/// `zoning` maps a step to the zone the district takes from that step on and
/// must contain step 0.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DistrictSpec {
    pub zoning: BTreeMap<Step, Zone>,
    pub blocks: Vec<BlockSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CityShape {
    pub districts: Vec<DistrictSpec>,
}

impl CityShape {
    /// Fill `land_area` with empty `BLOCK_SIZE` blocks and deal them out to one
    /// district per zoning schedule, round-robin. Leftover land smaller than a
    /// block is dropped.
    pub fn generated(land_area: f64, schedules: Vec<BTreeMap<Step, Zone>>) -> Self {
        let mut districts: Vec<DistrictSpec> = schedules
            .into_iter()
            .map(|zoning| DistrictSpec {
                zoning,
                blocks: Vec::new(),
            })
            .collect();
        if districts.is_empty() {
            return Self { districts };
        }

        let block_count = (land_area / BLOCK_SIZE).floor().max(0.0) as usize;
        let district_count = districts.len();
        for i in 0..block_count {
            districts[i % district_count].blocks.push(BlockSpec::default());
        }
        Self { districts }
    }

    /// Highest zone any district is ever scheduled for.
    pub fn zoning_max(&self) -> Zone {
        self.districts
            .iter()
            .flat_map(|d| d.zoning.values().copied())
            .max()
            .unwrap_or(1)
            .max(1)
    }
}

// ============================================================================
// Policies
// ============================================================================

/// Spending-power distribution of arriving households and its growth.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IncomePolicy {
    pub mean: f64,
    pub std_dev: f64,
    /// Per-step growth of every household's spending power (and of `mean`/`std_dev`).
    pub growth_rate: f64,
}

impl Default for IncomePolicy {
    fn default() -> Self {
        Self {
            mean: 20_000.0,
            std_dev: 8_000.0,
            growth_rate: 0.02,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArrivalPolicy {
    /// Arrivals per step as a fraction of the live population.
    pub growth_rate: f64,
    /// Explicit arrivals; entry `i` is used at step `i + 1`. Overrides `growth_rate`.
    pub schedule: Vec<u64>,
}

impl Default for ArrivalPolicy {
    fn default() -> Self {
        Self {
            growth_rate: 0.02,
            schedule: Vec::new(),
        }
    }
}

impl ArrivalPolicy {
    pub fn arrivals_for(&self, step: Step, live_households: usize) -> u64 {
        let scheduled = step
            .checked_sub(1)
            .and_then(|i| self.schedule.get(i as usize))
            .copied();
        scheduled.unwrap_or_else(|| (self.growth_rate * live_households as f64).round() as u64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingPolicy {
    /// Price response coefficient: `new = price * (1 + k * spike)`.
    pub k: f64,
    /// Lower clamp on a non-zero spike.
    pub spike_floor: f64,
    /// Upper clamp on the spike.
    pub spike_cap: f64,
    /// Per-step inflation of every unit price and of `price_per_sqft`.
    pub inflation: f64,
    /// Price per sqft of newly built units at step 0.
    pub price_per_sqft: Price,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            k: 1.0,
            spike_floor: 0.0,
            spike_cap: 1.0,
            inflation: 0.02,
            price_per_sqft: 10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstructionPolicy {
    pub developers: usize,
    pub initial_capital: f64,
    pub cost_per_sqft: Price,
    /// Required margin of expected revenue over construction cost.
    pub min_margin: f64,
    /// Fraction of the new units' value the developer realises on completion.
    pub sale_share: f64,
}

impl Default for ConstructionPolicy {
    fn default() -> Self {
        Self {
            developers: 1,
            initial_capital: 5_000_000.0,
            cost_per_sqft: 6.0,
            min_margin: 0.1,
            sale_share: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemolitionPolicy {
    /// Residences younger than this are never demolished.
    pub min_age: u64,
    /// Residences at least this old are eligible regardless of zoning.
    pub max_age: Option<u64>,
    /// Residences whose mean unit price is below this are eligible. 0 disables.
    pub value_floor: Price,
}

impl Default for DemolitionPolicy {
    fn default() -> Self {
        Self {
            min_age: 1,
            max_age: None,
            value_floor: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CouncilPolicy {
    pub councils: usize,
    /// Probability a construction project is approved. 1.0 is laissez-faire.
    pub construct_p: f64,
    /// Probability a demolition project is approved.
    pub demolish_p: f64,
}

impl Default for CouncilPolicy {
    fn default() -> Self {
        Self {
            councils: 1,
            construct_p: 1.0,
            demolish_p: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HouseholdPolicy {
    /// Consecutive unhoused steps tolerated before a household departs.
    pub departure_grace: u64,
    /// Probability a household moving into a single-unit residence owns it.
    pub own_p: f64,
}

impl Default for HouseholdPolicy {
    fn default() -> Self {
        Self {
            departure_grace: 3,
            own_p: 0.0,
        }
    }
}

// ============================================================================
// SimConfig
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub seed: u64,
    pub initial_households: usize,
    /// Construction rounds run by developers before the first cohort arrives.
    pub initial_development_rounds: u32,
    pub city: CityShape,
    pub income: IncomePolicy,
    pub arrivals: ArrivalPolicy,
    pub pricing: PricingPolicy,
    pub construction: ConstructionPolicy,
    pub demolition: DemolitionPolicy,
    pub council: CouncilPolicy,
    pub household: HouseholdPolicy,
}

impl Default for SimConfig {
    fn default() -> Self {
        let single_family = BTreeMap::from([(0, 1)]);
        Self {
            seed: 42,
            initial_households: 100,
            initial_development_rounds: 1,
            city: CityShape::generated(4.0 * BLOCK_SIZE, vec![single_family.clone(), single_family]),
            income: IncomePolicy::default(),
            arrivals: ArrivalPolicy::default(),
            pricing: PricingPolicy::default(),
            construction: ConstructionPolicy::default(),
            demolition: DemolitionPolicy::default(),
            council: CouncilPolicy::default(),
            household: HouseholdPolicy::default(),
        }
    }
}

fn finite(name: &'static str, value: f64) -> Result<f64, PolicyError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(PolicyError::invalid(name, format!("must be finite, got {value}")))
    }
}

fn non_negative(name: &'static str, value: f64) -> Result<f64, PolicyError> {
    if finite(name, value)? < 0.0 {
        return Err(PolicyError::invalid(name, format!("must be >= 0, got {value}")));
    }
    Ok(value)
}

fn probability(name: &'static str, value: f64) -> Result<f64, PolicyError> {
    if !(0.0..=1.0).contains(&finite(name, value)?) {
        return Err(PolicyError::invalid(name, format!("must be in [0, 1], got {value}")));
    }
    Ok(value)
}

fn growth(name: &'static str, value: f64) -> Result<f64, PolicyError> {
    if finite(name, value)? <= -1.0 {
        return Err(PolicyError::invalid(name, format!("must be > -1, got {value}")));
    }
    Ok(value)
}

impl SimConfig {
    pub fn from_json_str(json: &str) -> Result<Self, PolicyError> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn zoning_max(&self) -> Zone {
        self.city.zoning_max()
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        // Income
        non_negative("income.mean", self.income.mean)?;
        non_negative("income.std_dev", self.income.std_dev)?;
        growth("income.growth_rate", self.income.growth_rate)?;

        // Arrivals
        non_negative("arrivals.growth_rate", self.arrivals.growth_rate)?;

        // Pricing
        non_negative("pricing.k", self.pricing.k)?;
        probability("pricing.spike_floor", self.pricing.spike_floor)?;
        probability("pricing.spike_cap", self.pricing.spike_cap)?;
        if self.pricing.spike_floor > self.pricing.spike_cap {
            return Err(PolicyError::invalid(
                "pricing.spike_floor",
                format!(
                    "floor {} exceeds cap {}",
                    self.pricing.spike_floor, self.pricing.spike_cap
                ),
            ));
        }
        // Prices never fall, so no deflation either.
        non_negative("pricing.inflation", self.pricing.inflation)?;
        if non_negative("pricing.price_per_sqft", self.pricing.price_per_sqft)? == 0.0 {
            return Err(PolicyError::invalid("pricing.price_per_sqft", "must be > 0"));
        }

        // Construction
        non_negative("construction.initial_capital", self.construction.initial_capital)?;
        non_negative("construction.cost_per_sqft", self.construction.cost_per_sqft)?;
        growth("construction.min_margin", self.construction.min_margin)?;
        non_negative("construction.sale_share", self.construction.sale_share)?;
        if self.construction.developers == 0 && self.initial_development_rounds > 0 {
            return Err(PolicyError::invalid(
                "construction.developers",
                "initial development rounds need at least one developer",
            ));
        }

        // Demolition
        non_negative("demolition.value_floor", self.demolition.value_floor)?;
        if let Some(max_age) = self.demolition.max_age {
            if max_age < self.demolition.min_age {
                return Err(PolicyError::invalid(
                    "demolition.max_age",
                    format!("{max_age} is below min_age {}", self.demolition.min_age),
                ));
            }
        }

        // Council
        if self.council.councils == 0 {
            return Err(PolicyError::invalid("council.councils", "need at least one council"));
        }
        probability("council.construct_p", self.council.construct_p)?;
        probability("council.demolish_p", self.council.demolish_p)?;

        // Households
        probability("household.own_p", self.household.own_p)?;

        self.validate_city()
    }

    fn validate_city(&self) -> Result<(), PolicyError> {
        if self.city.districts.is_empty() {
            return Err(PolicyError::invalid("city.districts", "need at least one district"));
        }
        for (i, district) in self.city.districts.iter().enumerate() {
            if !district.zoning.contains_key(&0) {
                return Err(PolicyError::MissingInitialZoning(i));
            }
            if let Some((step, zone)) = district.zoning.iter().find(|(_, z)| **z == 0) {
                return Err(PolicyError::invalid(
                    "city.districts.zoning",
                    format!("district {i} zoned 0 at step {step} (zone {zone}); zones start at 1"),
                ));
            }
            for block in &district.blocks {
                if non_negative("city.blocks.area", block.area)? == 0.0 {
                    return Err(PolicyError::invalid("city.blocks.area", "must be > 0"));
                }
                for residence in &block.residences {
                    if non_negative("city.residences.footprint", residence.footprint)? == 0.0 {
                        return Err(PolicyError::invalid("city.residences.footprint", "must be > 0"));
                    }
                    if residence.floors == 0 {
                        return Err(PolicyError::invalid("city.residences.floors", "must be >= 1"));
                    }
                    if residence.units.is_empty() {
                        return Err(PolicyError::invalid("city.residences.units", "must not be empty"));
                    }
                    for unit in &residence.units {
                        if unit.capacity == 0 {
                            return Err(PolicyError::invalid("city.units.capacity", "must be >= 1"));
                        }
                        if non_negative("city.units.size", unit.size)? == 0.0 {
                            return Err(PolicyError::invalid("city.units.size", "must be > 0"));
                        }
                        if let Some(price) = unit.price {
                            non_negative("city.units.price", price)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(SimConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_generated_city_deals_blocks_round_robin() {
        let shape = CityShape::generated(
            5.5 * BLOCK_SIZE,
            vec![BTreeMap::from([(0, 1)]), BTreeMap::from([(0, 4), (3, 16)])],
        );
        assert_eq!(shape.districts.len(), 2);
        assert_eq!(shape.districts[0].blocks.len(), 3);
        assert_eq!(shape.districts[1].blocks.len(), 2);
        assert_eq!(shape.zoning_max(), 16);
    }

    #[test]
    fn test_missing_step_zero_zoning_is_policy_error() {
        let mut config = SimConfig::default();
        config.city.districts[1].zoning = BTreeMap::from([(2, 4)]);
        assert_eq!(config.validate(), Err(PolicyError::MissingInitialZoning(1)));
    }

    #[test]
    fn test_out_of_range_parameters_rejected() {
        let mut config = SimConfig::default();
        config.pricing.k = -0.5;
        assert!(matches!(
            config.validate(),
            Err(PolicyError::InvalidParameter { name: "pricing.k", .. })
        ));

        let mut config = SimConfig::default();
        config.council.construct_p = 1.5;
        assert!(config.validate().is_err());

        let mut config = SimConfig::default();
        config.pricing.spike_floor = 0.3;
        config.pricing.spike_cap = 0.2;
        assert!(config.validate().is_err());

        let mut config = SimConfig::default();
        config.income.std_dev = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = SimConfig::from_json_str(
            r#"{
                "seed": 7,
                "pricing": { "k": 0.5 },
                "city": { "districts": [ { "zoning": { "0": 2 }, "blocks": [ {} ] } ] }
            }"#,
        )
        .unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.pricing.k, 0.5);
        assert_eq!(config.pricing.inflation, PricingPolicy::default().inflation);
        assert_eq!(config.city.districts[0].blocks[0].area, BLOCK_SIZE);
        assert_eq!(config.zoning_max(), 2);
    }

    #[test]
    fn test_bad_json_is_policy_error() {
        assert!(matches!(
            SimConfig::from_json_str("{ not json"),
            Err(PolicyError::Json(_))
        ));
    }

    #[test]
    fn test_arrival_schedule_overrides_growth_rate() {
        let policy = ArrivalPolicy {
            growth_rate: 0.1,
            schedule: vec![5, 0],
        };
        assert_eq!(policy.arrivals_for(1, 100), 5);
        assert_eq!(policy.arrivals_for(2, 100), 0);
        assert_eq!(policy.arrivals_for(3, 100), 10);
    }
}
