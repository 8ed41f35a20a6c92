use super::{PolicyContext, SearchPolicy, SearchRule, Step, ensure_previous_in_bounds};
use seeker_core::error::SearchError;
use seeker_core::model::cell::Cell;

pub const DEFAULT_DISTANCE_THRESHOLD: f64 = 0.5;

/// Trades belief against travel: walk to the best neighbor, jump only for a confident peak.
#[derive(Debug, Clone, Copy)]
pub struct DistanceAwarePolicy {
    threshold: f64,
}

impl DistanceAwarePolicy {
    pub fn new(threshold: f64) -> Result<Self, SearchError> {
        if !(threshold.is_finite() && (0.0..=1.0).contains(&threshold)) {
            return Err(SearchError::InvalidProbability {
                name: "distance_aware.threshold",
                value: threshold,
            });
        }
        Ok(Self { threshold })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl Default for DistanceAwarePolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_DISTANCE_THRESHOLD,
        }
    }
}

/// Highest-belief in-bounds neighbor of `from`, first in direction order on ties.
fn best_neighbor(ctx: &PolicyContext, from: Cell) -> Option<(Cell, f64)> {
    let dim = ctx.belief.dim();
    let mut best: Option<(Cell, f64)> = None;
    for neighbor in from.neighbors(dim) {
        let Some(prob) = ctx.belief.get(neighbor) else {
            continue;
        };
        match best {
            Some((_, current)) if prob <= current => {}
            _ => best = Some((neighbor, prob)),
        }
    }
    best
}

impl SearchPolicy for DistanceAwarePolicy {
    fn rule(&self) -> SearchRule {
        SearchRule::DistanceAware {
            threshold: self.threshold,
        }
    }

    fn choose(&mut self, ctx: &PolicyContext) -> Result<Step, SearchError> {
        ensure_previous_in_bounds(ctx)?;
        let (max_cell, max_belief) = ctx.belief.argmax();
        let Some(previous) = ctx.previous else {
            return Ok(Step {
                cell: max_cell,
                cost: 1,
            });
        };

        // A 1x1 grid has no neighbors; stay on the only cell.
        let Some((neighbor_cell, neighbor_belief)) = best_neighbor(ctx, previous) else {
            return Ok(Step {
                cell: max_cell,
                cost: 1,
            });
        };

        if max_belief > neighbor_belief && max_belief > self.threshold {
            Ok(Step {
                cell: max_cell,
                cost: previous.manhattan(max_cell).max(1) as u64,
            })
        } else {
            Ok(Step {
                cell: neighbor_cell,
                cost: 1,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seeker_core::belief::BeliefState;

    fn belief_with(dim: usize, entries: &[(Cell, f64)], rest: f64) -> BeliefState {
        let mut weights = vec![rest; dim * dim];
        for (cell, weight) in entries {
            weights[cell.index(dim)] = *weight;
        }
        BeliefState::from_weights(dim, weights).unwrap()
    }

    #[test]
    fn first_step_searches_argmax_at_unit_cost() {
        let belief = belief_with(4, &[(Cell::new(3, 3), 5.0)], 1.0);
        let mut policy = DistanceAwarePolicy::default();
        let step = policy
            .choose(&PolicyContext {
                belief: &belief,
                previous: None,
            })
            .unwrap();
        assert_eq!(step, Step { cell: Cell::new(3, 3), cost: 1 });
    }

    #[test]
    fn jumps_to_confident_peak_paying_manhattan_distance() {
        let belief = belief_with(5, &[(Cell::new(4, 4), 90.0)], 1.0);
        let mut policy = DistanceAwarePolicy::default();
        let step = policy
            .choose(&PolicyContext {
                belief: &belief,
                previous: Some(Cell::new(0, 0)),
            })
            .unwrap();
        assert_eq!(step, Step { cell: Cell::new(4, 4), cost: 8 });
    }

    #[test]
    fn walks_to_neighbor_when_peak_is_below_threshold() {
        let belief = belief_with(
            5,
            &[(Cell::new(4, 4), 3.0), (Cell::new(0, 1), 2.0)],
            1.0,
        );
        let mut policy = DistanceAwarePolicy::default();
        let step = policy
            .choose(&PolicyContext {
                belief: &belief,
                previous: Some(Cell::new(0, 0)),
            })
            .unwrap();
        assert_eq!(step, Step { cell: Cell::new(0, 1), cost: 1 });
    }

    #[test]
    fn walks_when_neighbor_matches_peak() {
        let belief = belief_with(3, &[(Cell::new(1, 0), 1.0)], 0.0);
        let mut policy = DistanceAwarePolicy::default();
        let step = policy
            .choose(&PolicyContext {
                belief: &belief,
                previous: Some(Cell::new(0, 0)),
            })
            .unwrap();
        assert_eq!(step, Step { cell: Cell::new(1, 0), cost: 1 });
    }

    #[test]
    fn never_selects_a_cell_outside_the_grid() {
        let belief = BeliefState::uniform(3).unwrap();
        let mut policy = DistanceAwarePolicy::new(0.0).unwrap();
        for corner in [
            Cell::new(0, 0),
            Cell::new(0, 2),
            Cell::new(2, 0),
            Cell::new(2, 2),
        ] {
            let step = policy
                .choose(&PolicyContext {
                    belief: &belief,
                    previous: Some(corner),
                })
                .unwrap();
            assert!(step.cell.in_bounds(3));
            assert_eq!(step.cost, 1);
            assert_eq!(corner.manhattan(step.cell), 1);
        }
    }

    #[test]
    fn neighbor_ties_follow_direction_order() {
        let belief = BeliefState::uniform(3).unwrap();
        let mut policy = DistanceAwarePolicy::default();
        let step = policy
            .choose(&PolicyContext {
                belief: &belief,
                previous: Some(Cell::new(1, 1)),
            })
            .unwrap();
        assert_eq!(step.cell, Cell::new(2, 1));
    }

    #[test]
    fn single_cell_grid_stays_put() {
        let belief = BeliefState::uniform(1).unwrap();
        let mut policy = DistanceAwarePolicy::default();
        let step = policy
            .choose(&PolicyContext {
                belief: &belief,
                previous: Some(Cell::new(0, 0)),
            })
            .unwrap();
        assert_eq!(step, Step { cell: Cell::new(0, 0), cost: 1 });
    }

    #[test]
    fn threshold_outside_unit_interval_is_rejected() {
        assert!(DistanceAwarePolicy::new(-0.1).is_err());
        assert!(DistanceAwarePolicy::new(f64::NAN).is_err());
        assert!(DistanceAwarePolicy::new(1.0).is_ok());
    }
}
