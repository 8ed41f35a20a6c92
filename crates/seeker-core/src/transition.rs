//! Target motion for the moving-target variant.

use crate::error::SearchError;
use crate::model::cell::Cell;
use crate::model::grid::Grid;
use crate::model::terrain::TerrainType;
use core::fmt;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Unordered pair of terrain types crossed by a target move.
///
/// Stored with the lower terrain first so `{A, B}` and `{B, A}` compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransitionObservation {
    first: TerrainType,
    second: TerrainType,
}

impl TransitionObservation {
    pub fn new(a: TerrainType, b: TerrainType) -> Self {
        if a <= b {
            Self {
                first: a,
                second: b,
            }
        } else {
            Self {
                first: b,
                second: a,
            }
        }
    }

    pub fn terrains(&self) -> (TerrainType, TerrainType) {
        (self.first, self.second)
    }

    pub fn contains(&self, terrain: TerrainType) -> bool {
        self.first == terrain || self.second == terrain
    }

    /// The other member of the pair. A same-type pair is its own complement.
    pub fn complement(&self, terrain: TerrainType) -> Option<TerrainType> {
        if terrain == self.first {
            Some(self.second)
        } else if terrain == self.second {
            Some(self.first)
        } else {
            None
        }
    }

    pub fn label(&self) -> String {
        format!("{}-{}", self.first, self.second)
    }
}

impl fmt::Display for TransitionObservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}, {}}}", self.first, self.second)
    }
}

/// Relocates a target to a uniformly chosen orthogonal neighbor.
#[derive(Debug, Clone)]
pub struct TransitionModel {
    rng: StdRng,
}

impl TransitionModel {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn step(
        &mut self,
        grid: &Grid,
        current: Cell,
    ) -> Result<(Cell, TransitionObservation), SearchError> {
        sample_step(grid, current, &mut self.rng)
    }
}

/// One move of the target plus the terrain pair it reveals.
pub fn sample_step<R: Rng + ?Sized>(
    grid: &Grid,
    current: Cell,
    rng: &mut R,
) -> Result<(Cell, TransitionObservation), SearchError> {
    let departure = grid.terrain(current)?;
    let candidates: Vec<Cell> = current.neighbors(grid.dim()).collect();
    let next = *candidates
        .choose(rng)
        .ok_or(SearchError::NoValidMove {
            cell: current,
            dim: grid.dim(),
        })?;
    let arrival = grid.terrain(next)?;
    Ok((next, TransitionObservation::new(departure, arrival)))
}
