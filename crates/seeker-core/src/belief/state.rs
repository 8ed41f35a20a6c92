//! Normalized distribution over cells and its Bayesian update laws.

use crate::error::SearchError;
use crate::model::cell::Cell;
use crate::model::grid::Grid;
use crate::model::terrain::FailureRates;
use crate::transition::TransitionObservation;
use serde::Serialize;

/// Maximum drift of the total mass away from one that callers should tolerate.
pub const NORMALIZATION_TOLERANCE: f64 = 1e-9;

/// How the initial distribution is seeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BeliefPrior {
    /// `1 / dim²` everywhere.
    Uniform,
    /// Proportional to `1 - p_fn(terrain)`, i.e. the chance a search there succeeds.
    DetectionWeighted,
}

/// Probability that the target occupies each cell.
#[derive(Debug, Clone, PartialEq)]
pub struct BeliefState {
    dim: usize,
    probs: Vec<f64>,
    revision: u64,
}

/// Record of a single negative observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FailureUpdate {
    pub cell: Cell,
    pub prior: f64,
    pub posterior: f64,
    /// Mass moved off the searched cell onto every other cell.
    pub released: f64,
}

impl BeliefState {
    pub fn uniform(dim: usize) -> Result<Self, SearchError> {
        if dim == 0 {
            return Err(SearchError::InvalidGrid {
                message: "belief dimension must be at least 1".to_string(),
            });
        }
        let cells = dim * dim;
        Ok(Self {
            dim,
            probs: vec![1.0 / cells as f64; cells],
            revision: 0,
        })
    }

    pub fn detection_weighted(grid: &Grid, rates: &FailureRates) -> Result<Self, SearchError> {
        rates.validate()?;
        let weights = grid
            .iter()
            .map(|(_, terrain)| 1.0 - rates.get(terrain))
            .collect();
        Self::from_weights(grid.dim(), weights)
    }

    pub fn from_prior(
        prior: BeliefPrior,
        grid: &Grid,
        rates: &FailureRates,
    ) -> Result<Self, SearchError> {
        match prior {
            BeliefPrior::Uniform => Self::uniform(grid.dim()),
            BeliefPrior::DetectionWeighted => Self::detection_weighted(grid, rates),
        }
    }

    /// Normalizes arbitrary non-negative row-major weights into a distribution.
    pub fn from_weights(dim: usize, weights: Vec<f64>) -> Result<Self, SearchError> {
        if dim == 0 || weights.len() != dim * dim {
            return Err(SearchError::InvalidGrid {
                message: format!(
                    "expected {} weights for a {dim}x{dim} belief, got {}",
                    dim * dim,
                    weights.len()
                ),
            });
        }
        if let Some(bad) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(SearchError::InvalidProbability {
                name: "belief.weight",
                value: *bad,
            });
        }
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return Err(SearchError::InvalidProbability {
                name: "belief.total",
                value: total,
            });
        }
        Ok(Self {
            dim,
            probs: weights.into_iter().map(|w| w / total).collect(),
            revision: 0,
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of updates applied since construction.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn prob(&self, cell: Cell) -> Result<f64, SearchError> {
        self.get(cell).ok_or(SearchError::OutOfBounds {
            cell,
            dim: self.dim,
        })
    }

    pub fn get(&self, cell: Cell) -> Option<f64> {
        cell.in_bounds(self.dim)
            .then(|| self.probs[cell.index(self.dim)])
    }

    pub fn iter(&self) -> impl Iterator<Item = (Cell, f64)> + '_ {
        let dim = self.dim;
        self.probs
            .iter()
            .enumerate()
            .map(move |(index, prob)| (Cell::from_index(index, dim), *prob))
    }

    pub fn total(&self) -> f64 {
        self.probs.iter().sum()
    }

    pub fn is_normalized(&self) -> bool {
        (self.total() - 1.0).abs() <= NORMALIZATION_TOLERANCE
    }

    /// Most likely cell; ties go to the lowest row, then the lowest column.
    pub fn argmax(&self) -> (Cell, f64) {
        let mut best_index = 0;
        let mut best = self.probs[0];
        for (index, prob) in self.probs.iter().enumerate().skip(1) {
            if *prob > best {
                best = *prob;
                best_index = index;
            }
        }
        (Cell::from_index(best_index, self.dim), best)
    }

    /// Applies the posterior for a search at `cell` that reported "not found".
    ///
    /// `b' = p_fn·b / ((1 − b) + p_fn·b)`; the released mass `b − b'` is spread over
    /// every other cell in proportion to `belief / (1 − b)`.
    pub fn observe_failure(
        &mut self,
        cell: Cell,
        failure_probability: f64,
    ) -> Result<FailureUpdate, SearchError> {
        let prior = self.prob(cell)?;
        if !(failure_probability.is_finite() && (0.0..=1.0).contains(&failure_probability)) {
            return Err(SearchError::InvalidProbability {
                name: "detection_failure_probability",
                value: failure_probability,
            });
        }
        if prior >= 1.0 {
            return Err(SearchError::CertainBelief {
                cell,
                belief: prior,
            });
        }

        let missed = failure_probability * prior;
        let posterior = missed / ((1.0 - prior) + missed);
        let released = prior - posterior;
        let remaining = 1.0 - prior;

        let searched = cell.index(self.dim);
        for (index, prob) in self.probs.iter_mut().enumerate() {
            if index == searched {
                *prob = posterior;
            } else {
                *prob += (*prob / remaining) * released;
            }
        }
        self.revision += 1;

        Ok(FailureUpdate {
            cell,
            prior,
            posterior,
            released,
        })
    }

    /// Re-weights the belief after the target moved across `observation`.
    ///
    /// A cell of one terrain in the pair collects the prior mass of its in-bounds
    /// orthogonal neighbors of the complementary terrain; every other cell drops to zero.
    pub fn refilter_on_transition(
        &mut self,
        grid: &Grid,
        observation: &TransitionObservation,
    ) -> Result<(), SearchError> {
        if grid.dim() != self.dim {
            return Err(SearchError::InvalidGrid {
                message: format!(
                    "grid is {}x{} but belief is {}x{}",
                    grid.dim(),
                    grid.dim(),
                    self.dim,
                    self.dim
                ),
            });
        }

        let mut scores = vec![0.0; self.probs.len()];
        let mut total = 0.0;
        for (cell, terrain) in grid.iter() {
            let Some(source) = observation.complement(terrain) else {
                continue;
            };
            let score: f64 = cell
                .neighbors(self.dim)
                .filter(|neighbor| grid.get(*neighbor) == Some(source))
                .map(|neighbor| self.probs[neighbor.index(self.dim)])
                .sum();
            scores[cell.index(self.dim)] = score;
            total += score;
        }

        if total <= 0.0 {
            let prior_mass = grid
                .iter()
                .filter(|(_, terrain)| observation.contains(*terrain))
                .map(|(cell, _)| self.probs[cell.index(self.dim)])
                .sum();
            return Err(SearchError::InconsistentTransition {
                observation: *observation,
                prior_mass,
            });
        }

        for (prob, score) in self.probs.iter_mut().zip(scores) {
            *prob = score / total;
        }
        self.revision += 1;
        Ok(())
    }

    pub fn snapshot(&self) -> BeliefSnapshot {
        BeliefSnapshot {
            dim: self.dim,
            revision: self.revision,
            rows: self.probs.chunks(self.dim).map(<[f64]>::to_vec).collect(),
        }
    }
}

/// Serializable copy of a belief for reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BeliefSnapshot {
    pub dim: usize,
    pub revision: u64,
    pub rows: Vec<Vec<f64>>,
}
