//! Agent-based simulation of a municipal housing market.
//!
//! A city of districts, blocks, residences and units is populated by
//! households who bid for housing, developers who build and demolish, and
//! councils who zone and approve projects. Every step is recorded in an
//! append-only [`Ledger`]; [`History`] flattens it into tables.

pub mod agents;
pub mod config;
pub mod error;
pub mod history;
pub mod housing;
pub mod ledger;
pub mod market;
mod tick;
pub mod types;
mod world;

pub use config::SimConfig;
pub use error::{PolicyError, SimError, StructuralError};
pub use history::History;
pub use ledger::{Ledger, StepRecord};
pub use types::*;
pub use world::Simulation;

#[cfg(feature = "instrument")]
pub use instrument;
