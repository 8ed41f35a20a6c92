use super::cell::Cell;
use super::terrain::{TerrainType, TerrainWeights};
use crate::error::SearchError;
use core::fmt;
use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};

/// Square terrain map, row-major. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    dim: usize,
    cells: Vec<TerrainType>,
}

impl Grid {
    pub fn new(dim: usize, cells: Vec<TerrainType>) -> Result<Self, SearchError> {
        if dim == 0 {
            return Err(SearchError::InvalidGrid {
                message: "grid dimension must be at least 1".to_string(),
            });
        }
        if cells.len() != dim * dim {
            return Err(SearchError::InvalidGrid {
                message: format!(
                    "expected {} cells for a {dim}x{dim} grid, got {}",
                    dim * dim,
                    cells.len()
                ),
            });
        }
        Ok(Self { dim, cells })
    }

    pub fn filled(dim: usize, terrain: TerrainType) -> Result<Self, SearchError> {
        Self::new(dim, vec![terrain; dim * dim])
    }

    /// Builds a grid from rows of layout symbols (see [`TerrainType::symbol`]).
    pub fn from_rows<S: AsRef<str>>(rows: &[S]) -> Result<Self, SearchError> {
        let dim = rows.len();
        let mut cells = Vec::with_capacity(dim * dim);
        for (row_index, row) in rows.iter().enumerate() {
            let row = row.as_ref().trim();
            let width = row.chars().count();
            if width != dim {
                return Err(SearchError::InvalidGrid {
                    message: format!("row {row_index} has {width} cells, expected {dim}"),
                });
            }
            for symbol in row.chars() {
                let terrain =
                    TerrainType::from_symbol(symbol).ok_or_else(|| SearchError::InvalidGrid {
                        message: format!("unknown terrain symbol '{symbol}' in row {row_index}"),
                    })?;
                cells.push(terrain);
            }
        }
        Self::new(dim, cells)
    }

    /// Whitespace-separated rows, e.g. `"FH\nWC"`.
    pub fn parse(layout: &str) -> Result<Self, SearchError> {
        let rows: Vec<&str> = layout.split_whitespace().collect();
        Self::from_rows(&rows)
    }

    /// Draws every cell independently from `weights`.
    pub fn generate<R: Rng + ?Sized>(
        dim: usize,
        weights: &TerrainWeights,
        rng: &mut R,
    ) -> Result<Self, SearchError> {
        weights.validate()?;
        let distribution =
            WeightedIndex::new(weights.as_array()).map_err(|err| SearchError::InvalidGrid {
                message: format!("terrain weights rejected: {err}"),
            })?;
        let cells = (0..dim * dim)
            .map(|_| {
                TerrainType::from_index(distribution.sample(rng)).unwrap_or(TerrainType::Flat)
            })
            .collect();
        Self::new(dim, cells)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn contains(&self, cell: Cell) -> bool {
        cell.in_bounds(self.dim)
    }

    pub fn get(&self, cell: Cell) -> Option<TerrainType> {
        self.contains(cell)
            .then(|| self.cells[cell.index(self.dim)])
    }

    pub fn terrain(&self, cell: Cell) -> Result<TerrainType, SearchError> {
        self.get(cell).ok_or(SearchError::OutOfBounds {
            cell,
            dim: self.dim,
        })
    }

    /// Row-major `(cell, terrain)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (Cell, TerrainType)> + '_ {
        let dim = self.dim;
        self.cells
            .iter()
            .enumerate()
            .map(move |(index, terrain)| (Cell::from_index(index, dim), *terrain))
    }

    pub fn count(&self, terrain: TerrainType) -> usize {
        self.cells.iter().filter(|t| **t == terrain).count()
    }

    pub fn rows(&self) -> Vec<String> {
        self.cells
            .chunks(self.dim)
            .map(|row| row.iter().map(|t| t.symbol()).collect())
            .collect()
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, row) in self.rows().iter().enumerate() {
            if index > 0 {
                f.write_str("\n")?;
            }
            f.write_str(row)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn parses_layout_rows() {
        let grid = Grid::parse("FH\nWC").expect("valid layout");
        assert_eq!(grid.dim(), 2);
        assert_eq!(grid.terrain(Cell::new(0, 1)).unwrap(), TerrainType::Hilly);
        assert_eq!(grid.terrain(Cell::new(1, 0)).unwrap(), TerrainType::Forested);
        assert_eq!(grid.to_string(), "FH\nWC");
    }

    #[test]
    fn rejects_ragged_rows() {
        let err = Grid::parse("FHF\nWC\nCCC").expect_err("ragged");
        assert!(matches!(err, SearchError::InvalidGrid { .. }));
    }

    #[test]
    fn rejects_unknown_symbol() {
        assert!(Grid::parse("FX\nHH").is_err());
    }

    #[test]
    fn out_of_bounds_lookup_is_reported() {
        let grid = Grid::filled(3, TerrainType::Flat).unwrap();
        let err = grid.terrain(Cell::new(3, 0)).expect_err("outside grid");
        assert!(matches!(err, SearchError::OutOfBounds { dim: 3, .. }));
    }

    #[test]
    fn generation_is_seed_deterministic() {
        let weights = TerrainWeights::default();
        let a = Grid::generate(8, &weights, &mut StdRng::seed_from_u64(7)).unwrap();
        let b = Grid::generate(8, &weights, &mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(a, b);
        let total: usize = TerrainType::ALL.iter().map(|t| a.count(*t)).sum();
        assert_eq!(total, 64);
    }

    #[test]
    fn zero_weight_terrain_never_drawn() {
        let weights = TerrainWeights {
            flat: 1.0,
            hilly: 0.0,
            forested: 0.0,
            caves: 1.0,
        };
        let grid = Grid::generate(10, &weights, &mut StdRng::seed_from_u64(99)).unwrap();
        assert_eq!(grid.count(TerrainType::Hilly), 0);
        assert_eq!(grid.count(TerrainType::Forested), 0);
    }
}
