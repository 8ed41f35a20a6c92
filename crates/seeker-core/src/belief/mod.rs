//! Probabilistic belief over the hidden target's cell.
//!
//! This module is composed of:
//! - `state`: the normalized distribution (`BeliefState`) and its two update laws.
//! - `telemetry`: summary metrics (entropy, support, peak) for logging.

mod state;
pub mod telemetry;

pub use state::{
    BeliefPrior, BeliefSnapshot, BeliefState, FailureUpdate, NORMALIZATION_TOLERANCE,
};
