//! Collaborator boundary: the world the searcher queries.
//!
//! The inference core only talks to [`TerrainModel`] (and [`MovingTarget`] for the
//! moving-target variant). [`Landscape`] is the simulation used by the bench and tests.

use crate::error::SearchError;
use crate::model::cell::Cell;
use crate::model::grid::Grid;
use crate::model::terrain::{FailureRates, TerrainType, TerrainWeights};
use crate::transition::{TransitionModel, TransitionObservation};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub trait TerrainModel {
    fn grid(&self) -> &Grid;

    fn failure_rates(&self) -> &FailureRates;

    /// Stochastic: `true` only when `cell` holds the target and the draw beats `p_fn`.
    fn search(&mut self, cell: Cell) -> Result<bool, SearchError>;

    fn dimensions(&self) -> usize {
        self.grid().dim()
    }

    fn terrain(&self, cell: Cell) -> Result<TerrainType, SearchError> {
        self.grid().terrain(cell)
    }

    fn detection_failure_probability(&self, cell: Cell) -> Result<f64, SearchError> {
        let terrain = self.terrain(cell)?;
        Ok(self.failure_rates().get(terrain))
    }
}

/// A model whose hidden target can be moved without revealing where it went.
pub trait MovingTarget: TerrainModel {
    fn advance_target(
        &mut self,
        motion: &mut TransitionModel,
    ) -> Result<TransitionObservation, SearchError>;
}

/// Simulated terrain with a hidden target and its own detection RNG.
#[derive(Debug, Clone)]
pub struct Landscape {
    grid: Grid,
    rates: FailureRates,
    target: Cell,
    rng: StdRng,
}

impl Landscape {
    pub fn new(
        grid: Grid,
        rates: FailureRates,
        target: Cell,
        seed: u64,
    ) -> Result<Self, SearchError> {
        rates.validate()?;
        if !grid.contains(target) {
            return Err(SearchError::OutOfBounds {
                cell: target,
                dim: grid.dim(),
            });
        }
        Ok(Self {
            grid,
            rates,
            target,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Random terrain drawn from `weights` plus a uniformly placed target.
    pub fn generate(
        dim: usize,
        weights: &TerrainWeights,
        rates: FailureRates,
        seed: u64,
    ) -> Result<Self, SearchError> {
        rates.validate()?;
        let mut rng = StdRng::seed_from_u64(seed);
        let grid = Grid::generate(dim, weights, &mut rng)?;
        let target = Cell::new(rng.gen_range(0..dim), rng.gen_range(0..dim));
        Ok(Self {
            grid,
            rates,
            target,
            rng,
        })
    }

    /// Places a uniformly random target on a fixed grid.
    pub fn with_random_target(
        grid: Grid,
        rates: FailureRates,
        seed: u64,
    ) -> Result<Self, SearchError> {
        let mut rng = StdRng::seed_from_u64(seed);
        let dim = grid.dim();
        let target = Cell::new(rng.gen_range(0..dim), rng.gen_range(0..dim));
        let mut landscape = Self::new(grid, rates, target, seed)?;
        landscape.rng = rng;
        Ok(landscape)
    }

    /// Current target cell. For reports; searchers must not read it.
    pub fn target(&self) -> Cell {
        self.target
    }
}

impl TerrainModel for Landscape {
    fn grid(&self) -> &Grid {
        &self.grid
    }

    fn failure_rates(&self) -> &FailureRates {
        &self.rates
    }

    fn search(&mut self, cell: Cell) -> Result<bool, SearchError> {
        let failure = self.detection_failure_probability(cell)?;
        if cell != self.target {
            return Ok(false);
        }
        Ok(self.rng.r#gen::<f64>() >= failure)
    }
}

impl MovingTarget for Landscape {
    fn advance_target(
        &mut self,
        motion: &mut TransitionModel,
    ) -> Result<TransitionObservation, SearchError> {
        let (next, observation) = motion.step(&self.grid, self.target)?;
        self.target = next;
        Ok(observation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_elsewhere_never_succeeds() {
        let grid = Grid::filled(3, TerrainType::Flat).unwrap();
        let mut landscape =
            Landscape::new(grid, FailureRates::default(), Cell::new(2, 2), 1).unwrap();
        for _ in 0..50 {
            assert!(!landscape.search(Cell::new(0, 0)).unwrap());
        }
    }

    #[test]
    fn detection_rate_tracks_failure_probability() {
        let grid = Grid::filled(2, TerrainType::Forested).unwrap();
        let mut landscape =
            Landscape::new(grid, FailureRates::default(), Cell::new(1, 1), 5).unwrap();
        let trials = 4_000;
        let hits = (0..trials)
            .filter(|_| landscape.search(Cell::new(1, 1)).unwrap())
            .count();
        let rate = hits as f64 / trials as f64;
        assert!((rate - 0.3).abs() < 0.05, "observed detection rate {rate}");
    }

    #[test]
    fn rejects_target_outside_grid() {
        let grid = Grid::filled(2, TerrainType::Flat).unwrap();
        let err = Landscape::new(grid, FailureRates::default(), Cell::new(2, 0), 0).unwrap_err();
        assert!(matches!(err, SearchError::OutOfBounds { .. }));
    }

    #[test]
    fn out_of_bounds_search_is_an_error() {
        let mut landscape =
            Landscape::generate(3, &TerrainWeights::default(), FailureRates::default(), 9)
                .unwrap();
        assert!(landscape.search(Cell::new(0, 3)).is_err());
    }

    #[test]
    fn generated_landscapes_are_reproducible() {
        let a = Landscape::generate(6, &TerrainWeights::default(), FailureRates::default(), 77)
            .unwrap();
        let b = Landscape::generate(6, &TerrainWeights::default(), FailureRates::default(), 77)
            .unwrap();
        assert_eq!(a.grid(), b.grid());
        assert_eq!(a.target(), b.target());
        assert_eq!(a.dimensions(), 6);
    }

    #[test]
    fn advancing_moves_target_by_one_step() {
        let grid = Grid::parse("FHW\nCFH\nWCF").unwrap();
        let mut landscape =
            Landscape::new(grid, FailureRates::default(), Cell::new(1, 1), 2).unwrap();
        let mut motion = TransitionModel::with_seed(8);
        let before = landscape.target();
        let observation = landscape.advance_target(&mut motion).unwrap();
        let after = landscape.target();
        assert_eq!(before.manhattan(after), 1);
        assert!(observation.contains(TerrainType::Flat));
        assert!(observation.contains(landscape.terrain(after).unwrap()));
    }

    #[test]
    fn detection_failure_probability_follows_terrain() {
        let grid = Grid::parse("FC\nHW").unwrap();
        let landscape =
            Landscape::new(grid, FailureRates::default(), Cell::new(0, 0), 0).unwrap();
        assert_eq!(
            landscape
                .detection_failure_probability(Cell::new(0, 1))
                .unwrap(),
            0.9
        );
    }
}
