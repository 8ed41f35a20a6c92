//! Fatal conditions raised by the inference core.

use crate::model::cell::Cell;
use crate::transition::TransitionObservation;
use std::fmt;

/// Errors that terminate a search run. None of them are retried.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchError {
    /// A failed search at a cell already holding all of the belief mass.
    CertainBelief { cell: Cell, belief: f64 },
    /// No cell is consistent with the observed terrain transition.
    InconsistentTransition {
        observation: TransitionObservation,
        prior_mass: f64,
    },
    NoValidMove { cell: Cell, dim: usize },
    OutOfBounds { cell: Cell, dim: usize },
    InvalidProbability { name: &'static str, value: f64 },
    InvalidGrid { message: String },
}

impl SearchError {
    /// Belief reached a logically impossible state.
    pub fn is_degenerate(&self) -> bool {
        matches!(
            self,
            SearchError::CertainBelief { .. } | SearchError::InconsistentTransition { .. }
        )
    }
}

impl fmt::Display for SearchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchError::CertainBelief { cell, belief } => {
                write!(
                    f,
                    "degenerate belief: failed search at {cell} with prior belief {belief}"
                )
            }
            SearchError::InconsistentTransition {
                observation,
                prior_mass,
            } => {
                write!(
                    f,
                    "degenerate belief: no cell consistent with transition {observation} \
                     (prior mass on pair {prior_mass})"
                )
            }
            SearchError::NoValidMove { cell, dim } => {
                write!(f, "target at {cell} has no in-bounds move on a {dim}x{dim} grid")
            }
            SearchError::OutOfBounds { cell, dim } => {
                write!(f, "cell {cell} lies outside a {dim}x{dim} grid")
            }
            SearchError::InvalidProbability { name, value } => {
                write!(f, "{name}: {value} is not a valid probability")
            }
            SearchError::InvalidGrid { message } => write!(f, "invalid grid: {message}"),
        }
    }
}

impl std::error::Error for SearchError {}
