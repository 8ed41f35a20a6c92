mod distance;
mod greedy;

pub use distance::{DEFAULT_DISTANCE_THRESHOLD, DistanceAwarePolicy};
pub use greedy::MaxBeliefPolicy;

use seeker_core::belief::{BeliefPrior, BeliefState};
use seeker_core::error::SearchError;
use seeker_core::model::cell::Cell;

/// Context provided to policies for each decision
pub struct PolicyContext<'a> {
    pub belief: &'a BeliefState,
    /// Cell searched on the previous iteration, if any.
    pub previous: Option<Cell>,
}

/// Next cell to search and the moves it costs to get there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub cell: Cell,
    pub cost: u64,
}

/// Search strategy, fixed when the controller is built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchRule {
    /// Rule 1: search where the target most likely is.
    MaxContainment,
    /// Rule 2: search where the target is most likely to be found.
    MaxDetection,
    /// Prefer the best neighbor unless a distant cell is both better and above `threshold`.
    DistanceAware { threshold: f64 },
}

impl SearchRule {
    pub const fn distance_aware() -> Self {
        Self::DistanceAware {
            threshold: DEFAULT_DISTANCE_THRESHOLD,
        }
    }

    /// Rule 2 bakes the detection weighting into the prior instead of the argmax.
    pub const fn prior(&self) -> BeliefPrior {
        match self {
            SearchRule::MaxDetection => BeliefPrior::DetectionWeighted,
            SearchRule::MaxContainment | SearchRule::DistanceAware { .. } => BeliefPrior::Uniform,
        }
    }

    pub const fn label(&self) -> &'static str {
        match self {
            SearchRule::MaxContainment => "max_containment",
            SearchRule::MaxDetection => "max_detection",
            SearchRule::DistanceAware { .. } => "distance_aware",
        }
    }

    pub fn spawn_policy(&self) -> Result<Box<dyn SearchPolicy>, SearchError> {
        match *self {
            SearchRule::MaxContainment => Ok(Box::new(MaxBeliefPolicy::containment())),
            SearchRule::MaxDetection => Ok(Box::new(MaxBeliefPolicy::detection())),
            SearchRule::DistanceAware { threshold } => {
                Ok(Box::new(DistanceAwarePolicy::new(threshold)?))
            }
        }
    }
}

/// Interface shared by the search strategies. Choices are deterministic.
pub trait SearchPolicy: Send {
    fn rule(&self) -> SearchRule;

    fn choose(&mut self, ctx: &PolicyContext) -> Result<Step, SearchError>;
}

fn ensure_previous_in_bounds(ctx: &PolicyContext) -> Result<(), SearchError> {
    match ctx.previous {
        Some(cell) if !cell.in_bounds(ctx.belief.dim()) => Err(SearchError::OutOfBounds {
            cell,
            dim: ctx.belief.dim(),
        }),
        _ => Ok(()),
    }
}
