use core::fmt;
use serde::{Deserialize, Serialize};

/// Grid coordinate. Only meaningful relative to a grid dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell {
    pub row: usize,
    pub col: usize,
}

impl Cell {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    pub const fn in_bounds(self, dim: usize) -> bool {
        self.row < dim && self.col < dim
    }

    /// Row-major index into a `dim × dim` buffer. Caller checks bounds.
    pub const fn index(self, dim: usize) -> usize {
        self.row * dim + self.col
    }

    pub const fn from_index(index: usize, dim: usize) -> Self {
        Self::new(index / dim, index % dim)
    }

    pub const fn manhattan(self, other: Cell) -> usize {
        self.row.abs_diff(other.row) + self.col.abs_diff(other.col)
    }

    /// Neighbor in `direction`, or `None` when it would leave `[0, dim)`.
    pub fn step(self, direction: Direction, dim: usize) -> Option<Cell> {
        let (dr, dc) = direction.delta();
        let row = self.row.checked_add_signed(dr)?;
        let col = self.col.checked_add_signed(dc)?;
        let next = Cell::new(row, col);
        next.in_bounds(dim).then_some(next)
    }

    /// In-bounds orthogonal neighbors, in [`Direction::ORDER`].
    pub fn neighbors(self, dim: usize) -> impl Iterator<Item = Cell> {
        Direction::ORDER
            .into_iter()
            .filter_map(move |direction| self.step(direction, dim))
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Down,
    Up,
    Right,
    Left,
}

impl Direction {
    /// Fixed scan order; neighbor ties resolve to the earliest entry.
    pub const ORDER: [Direction; 4] = [
        Direction::Down,
        Direction::Up,
        Direction::Right,
        Direction::Left,
    ];

    pub const fn delta(self) -> (isize, isize) {
        match self {
            Direction::Down => (1, 0),
            Direction::Up => (-1, 0),
            Direction::Right => (0, 1),
            Direction::Left => (0, -1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Cell, Direction};

    #[test]
    fn manhattan_is_symmetric() {
        let a = Cell::new(0, 3);
        let b = Cell::new(4, 1);
        assert_eq!(a.manhattan(b), 6);
        assert_eq!(b.manhattan(a), 6);
        assert_eq!(a.manhattan(a), 0);
    }

    #[test]
    fn corner_has_two_neighbors_in_scan_order() {
        let corner = Cell::new(0, 0);
        let neighbors: Vec<_> = corner.neighbors(3).collect();
        assert_eq!(neighbors, vec![Cell::new(1, 0), Cell::new(0, 1)]);
    }

    #[test]
    fn interior_cell_lists_down_up_right_left() {
        let neighbors: Vec<_> = Cell::new(1, 1).neighbors(3).collect();
        assert_eq!(
            neighbors,
            vec![
                Cell::new(2, 1),
                Cell::new(0, 1),
                Cell::new(1, 2),
                Cell::new(1, 0)
            ]
        );
    }

    #[test]
    fn step_rejects_far_edge() {
        assert_eq!(Cell::new(2, 2).step(Direction::Down, 3), None);
        assert_eq!(Cell::new(2, 2).step(Direction::Right, 3), None);
        assert_eq!(Cell::new(2, 2).step(Direction::Up, 3), Some(Cell::new(1, 2)));
    }

    #[test]
    fn index_roundtrip() {
        let dim = 5;
        for index in 0..dim * dim {
            assert_eq!(Cell::from_index(index, dim).index(dim), index);
        }
    }

    #[test]
    fn single_cell_grid_has_no_neighbors() {
        assert_eq!(Cell::new(0, 0).neighbors(1).count(), 0);
    }
}
