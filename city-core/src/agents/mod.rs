pub mod council;
pub mod developer;
pub mod household;

pub use council::*;
pub use developer::*;
pub use household::*;

use rand::rngs::StdRng;
use slotmap::SlotMap;

use crate::config::SimConfig;
use crate::error::StructuralError;
use crate::housing::City;
use crate::market::MarketState;
use crate::types::{CouncilId, Step};

/// Phase of a step. Phases run in this order and never interleave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Construction,
    Zoning,
    Demolition,
    Affordability,
}

impl Phase {
    pub fn name(self) -> &'static str {
        match self {
            Self::Construction => "construction",
            Self::Zoning => "zoning",
            Self::Demolition => "demolition",
            Self::Affordability => "affordability",
        }
    }
}

/// Everything an agent may read or change while acting in a phase.
pub struct StepContext<'a> {
    pub step: Step,
    pub phase: Phase,
    pub city: &'a mut City,
    pub rng: &'a mut StdRng,
    pub config: &'a SimConfig,
    pub market: &'a MarketState,
    /// Councils to ask for project approval. `None` while councils themselves act.
    pub councils: Option<&'a mut SlotMap<CouncilId, Council>>,
}

/// An actor in the simulation. What it does depends on `ctx.phase`;
/// an agent with nothing to do in a phase returns its empty outcome.
pub trait Agent {
    type Outcome;

    fn act(&mut self, ctx: &mut StepContext<'_>) -> Result<Self::Outcome, StructuralError>;
}
