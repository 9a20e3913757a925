use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::StructuralError;
use crate::types::{CouncilId, DistrictId, Step, Zone};

use super::{Agent, Phase, StepContext};

/// Zoning instructions for one district: the zone it takes from each step on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoningSchedule {
    pub district: DistrictId,
    pub zoning: BTreeMap<Step, Zone>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Project {
    Construction,
    Demolition,
}

/// Governing body for a set of districts. Zones them on schedule and
/// approves each construction and demolition project at random: a council
/// with probability 1 is laissez-faire, one near 0 blocks almost everything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Council {
    pub id: CouncilId,
    pub construct_p: f64,
    pub demolish_p: f64,
    pub schedules: Vec<ZoningSchedule>,
    pub approved: u64,
    pub denied: u64,
}

impl Council {
    pub fn new(id: CouncilId, construct_p: f64, demolish_p: f64) -> Self {
        Self {
            id,
            construct_p,
            demolish_p,
            schedules: Vec::new(),
            approved: 0,
            denied: 0,
        }
    }

    pub fn governs(&self, district: DistrictId) -> bool {
        self.schedules.iter().any(|s| s.district == district)
    }

    pub fn approve(&mut self, project: Project, rng: &mut impl Rng) -> bool {
        let p = match project {
            Project::Construction => self.construct_p,
            Project::Demolition => self.demolish_p,
        };
        let approved = rng.random_bool(p.clamp(0.0, 1.0));
        if approved {
            self.approved += 1;
        } else {
            self.denied += 1;
        }
        approved
    }
}

impl Agent for Council {
    /// Districts given a new pending zone.
    type Outcome = Vec<(DistrictId, Zone)>;

    /// In the zoning phase, record every rezoning scheduled for the next step.
    /// The city applies it when that step starts.
    fn act(&mut self, ctx: &mut StepContext<'_>) -> Result<Self::Outcome, StructuralError> {
        if ctx.phase != Phase::Zoning {
            return Ok(Vec::new());
        }
        let next = ctx.step + 1;
        let mut scheduled = Vec::new();
        for schedule in &self.schedules {
            if let Some(zone) = schedule.zoning.get(&next).copied() {
                ctx.city.schedule_zone(schedule.district, zone)?;
                scheduled.push((schedule.district, zone));
            }
        }
        Ok(scheduled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::housing::City;
    use crate::market::MarketState;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use slotmap::SlotMap;

    #[test]
    fn test_approval_counts() {
        let mut councils: SlotMap<CouncilId, ()> = SlotMap::with_key();
        let mut always = Council::new(councils.insert(()), 1.0, 0.0);
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..10 {
            assert!(always.approve(Project::Construction, &mut rng));
            assert!(!always.approve(Project::Demolition, &mut rng));
        }
        assert_eq!(always.approved, 10);
        assert_eq!(always.denied, 10);
    }

    #[test]
    fn test_zoning_phase_schedules_next_step_only() {
        let mut city = City::new();
        let district = city.add_district(1);
        let mut councils: SlotMap<CouncilId, ()> = SlotMap::with_key();
        let mut council = Council::new(councils.insert(()), 1.0, 1.0);
        council.schedules.push(ZoningSchedule {
            district,
            zoning: BTreeMap::from([(0, 1), (3, 4)]),
        });
        let config = SimConfig::default();
        let market = MarketState::new(&config.pricing, &config.income);
        let mut rng = StdRng::seed_from_u64(42);

        let mut run_at = |step: Step, city: &mut City| {
            let mut ctx = StepContext {
                step,
                phase: Phase::Zoning,
                city,
                rng: &mut rng,
                config: &config,
                market: &market,
                councils: None,
            };
            council.act(&mut ctx).unwrap()
        };

        assert!(run_at(1, &mut city).is_empty());
        assert_eq!(run_at(2, &mut city), vec![(district, 4)]);
        assert_eq!(city.district(district).unwrap().zone, 1);
        assert_eq!(city.district(district).unwrap().pending_zone, Some(4));
    }
}
