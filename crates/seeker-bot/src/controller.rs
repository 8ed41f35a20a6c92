//! Search loop: pick a cell, search it, update belief, repeat until found.

use crate::policy::{PolicyContext, SearchPolicy, SearchRule, Step};
use seeker_core::belief::telemetry::BeliefMetrics;
use seeker_core::belief::{BeliefState, FailureUpdate};
use seeker_core::error::SearchError;
use seeker_core::model::cell::Cell;
use seeker_core::model::terrain::TerrainType;
use seeker_core::terrain::MovingTarget;
use seeker_core::transition::{TransitionModel, TransitionObservation};
use tracing::{Level, event};

/// Optional move-count ceiling. `None` searches until the target is found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchLimits {
    pub max_moves: Option<u64>,
}

impl SearchLimits {
    pub const fn unbounded() -> Self {
        Self { max_moves: None }
    }

    pub const fn with_max_moves(max_moves: u64) -> Self {
        Self {
            max_moves: Some(max_moves),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    Searching,
    Found { cell: Cell, moves: u64 },
    /// Move ceiling reached before the target turned up.
    Abandoned { moves: u64 },
}

impl SearchState {
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, SearchState::Searching)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchReport {
    pub rule: SearchRule,
    pub state: SearchState,
    pub moves: u64,
    pub searches: u64,
    pub transitions: u64,
    pub revision: u64,
}

impl SearchReport {
    pub fn found_at(&self) -> Option<Cell> {
        match self.state {
            SearchState::Found { cell, .. } => Some(cell),
            _ => None,
        }
    }
}

/// Drives one search episode against a terrain model.
///
/// The controller never sees the target's position: it learns only the search
/// outcome and, in the moving variant, the terrain pair of each transition.
pub struct SearchController<M> {
    terrain: M,
    belief: BeliefState,
    policy: Box<dyn SearchPolicy>,
    motion: Option<TransitionModel>,
    limits: SearchLimits,
    previous: Option<Cell>,
    moves: u64,
    searches: u64,
    transitions: u64,
    state: SearchState,
    belief_details: bool,
}

impl<M: MovingTarget> SearchController<M> {
    /// Target stays put for the whole episode.
    pub fn stationary(terrain: M, rule: SearchRule) -> Result<Self, SearchError> {
        Self::build(terrain, rule, None)
    }

    /// Target takes one step after every failed search, drawn from `motion`.
    pub fn moving(
        terrain: M,
        rule: SearchRule,
        motion: TransitionModel,
    ) -> Result<Self, SearchError> {
        Self::build(terrain, rule, Some(motion))
    }

    fn build(
        terrain: M,
        rule: SearchRule,
        motion: Option<TransitionModel>,
    ) -> Result<Self, SearchError> {
        let belief =
            BeliefState::from_prior(rule.prior(), terrain.grid(), terrain.failure_rates())?;
        let policy = rule.spawn_policy()?;
        Self::with_policy(terrain, belief, policy, motion)
    }

    /// Custom belief and policy. The belief must cover the terrain's grid.
    pub fn with_policy(
        terrain: M,
        belief: BeliefState,
        policy: Box<dyn SearchPolicy>,
        motion: Option<TransitionModel>,
    ) -> Result<Self, SearchError> {
        if belief.dim() != terrain.dimensions() {
            return Err(SearchError::InvalidGrid {
                message: format!(
                    "belief is {0}x{0} but terrain is {1}x{1}",
                    belief.dim(),
                    terrain.dimensions()
                ),
            });
        }
        Ok(Self {
            terrain,
            belief,
            policy,
            motion,
            limits: SearchLimits::default(),
            previous: None,
            moves: 0,
            searches: 0,
            transitions: 0,
            state: SearchState::Searching,
            belief_details: belief_details_enabled(),
        })
    }

    pub fn with_limits(mut self, limits: SearchLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_belief_details(mut self, enabled: bool) -> Self {
        self.belief_details = enabled;
        self
    }

    pub fn belief(&self) -> &BeliefState {
        &self.belief
    }

    pub fn terrain(&self) -> &M {
        &self.terrain
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    pub fn moves(&self) -> u64 {
        self.moves
    }

    pub fn searches(&self) -> u64 {
        self.searches
    }

    pub fn is_moving(&self) -> bool {
        self.motion.is_some()
    }

    /// One iteration: choose, pay, search, then update on failure.
    ///
    /// Terminal states are sticky; stepping a finished controller is a no-op.
    pub fn step(&mut self) -> Result<SearchState, SearchError> {
        if self.state.is_terminal() {
            return Ok(self.state);
        }
        if let Some(max_moves) = self.limits.max_moves {
            if self.moves >= max_moves {
                self.state = SearchState::Abandoned { moves: self.moves };
                return Ok(self.state);
            }
        }

        let Step { cell, cost } = self.policy.choose(&PolicyContext {
            belief: &self.belief,
            previous: self.previous,
        })?;
        self.moves += cost;
        self.searches += 1;
        self.previous = Some(cell);

        if self.terrain.search(cell)? {
            self.state = SearchState::Found {
                cell,
                moves: self.moves,
            };
            self.log_found(cell);
            return Ok(self.state);
        }

        let terrain = self.terrain.terrain(cell)?;
        let failure = self.terrain.failure_rates().get(terrain);
        let update = self.belief.observe_failure(cell, failure)?;
        self.log_failed_search(&update, terrain, failure, cost);

        if let Some(motion) = self.motion.as_mut() {
            let observation = self.terrain.advance_target(motion)?;
            self.belief
                .refilter_on_transition(self.terrain.grid(), &observation)?;
            self.transitions += 1;
            self.log_transition(&observation);
        }

        Ok(self.state)
    }

    /// Steps until a terminal state or the first error.
    pub fn run(&mut self) -> Result<SearchReport, SearchError> {
        while !self.state.is_terminal() {
            self.step()?;
        }
        Ok(self.report())
    }

    pub fn report(&self) -> SearchReport {
        SearchReport {
            rule: self.policy.rule(),
            state: self.state,
            moves: self.moves,
            searches: self.searches,
            transitions: self.transitions,
            revision: self.belief.revision(),
        }
    }

    fn log_failed_search(
        &self,
        update: &FailureUpdate,
        terrain: TerrainType,
        failure: f64,
        cost: u64,
    ) {
        if !tracing::enabled!(Level::INFO) {
            return;
        }
        let rule = self.policy.rule().label();

        if self.belief_details {
            let metrics = BeliefMetrics::from_belief(&self.belief);
            event!(
                target: "seeker_bot::search",
                Level::INFO,
                rule,
                cell = %update.cell,
                terrain = %terrain,
                failure_probability = failure,
                prior = update.prior,
                posterior = update.posterior,
                released = update.released,
                cost,
                moves = self.moves,
                searches = self.searches,
                revision = metrics.revision,
                entropy = metrics.entropy,
                support = metrics.support,
                peak = metrics.peak,
                peak_cell = %metrics.peak_cell,
            );
        } else {
            event!(
                target: "seeker_bot::search",
                Level::INFO,
                rule,
                cell = %update.cell,
                terrain = %terrain,
                failure_probability = failure,
                prior = update.prior,
                posterior = update.posterior,
                released = update.released,
                cost,
                moves = self.moves,
                searches = self.searches,
            );
        }
    }

    fn log_transition(&self, observation: &TransitionObservation) {
        if !tracing::enabled!(Level::INFO) {
            return;
        }
        let (_, peak) = self.belief.argmax();
        event!(
            target: "seeker_bot::transition",
            Level::INFO,
            rule = self.policy.rule().label(),
            pair = %observation.label(),
            transitions = self.transitions,
            peak,
        );
    }

    fn log_found(&self, cell: Cell) {
        if !tracing::enabled!(Level::INFO) {
            return;
        }
        let terrain = self
            .terrain
            .terrain(cell)
            .map(|terrain| terrain.to_string())
            .unwrap_or_default();
        event!(
            target: "seeker_bot::found",
            Level::INFO,
            rule = self.policy.rule().label(),
            cell = %cell,
            terrain = %terrain,
            moves = self.moves,
            searches = self.searches,
            moving = self.motion.is_some(),
        );
    }
}

fn belief_details_enabled() -> bool {
    std::env::var("SEEKER_BELIEF_DETAILS")
        .map(|raw| matches!(raw.trim(), "1" | "true" | "TRUE" | "on" | "ON"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::DistanceAwarePolicy;
    use seeker_core::model::grid::Grid;
    use seeker_core::model::terrain::{FailureRates, TerrainWeights};
    use seeker_core::terrain::{Landscape, TerrainModel};

    fn flat_landscape(dim: usize, target: Cell, seed: u64) -> Landscape {
        let grid = Grid::filled(dim, TerrainType::Flat).unwrap();
        Landscape::new(grid, FailureRates::default(), target, seed).unwrap()
    }

    #[test]
    fn stationary_search_terminates_with_found() {
        let landscape = flat_landscape(4, Cell::new(2, 3), 11);
        let mut controller =
            SearchController::stationary(landscape, SearchRule::MaxContainment).unwrap();
        let report = controller.run().unwrap();
        assert_eq!(report.found_at(), Some(Cell::new(2, 3)));
        assert_eq!(report.moves, report.searches);
        assert_eq!(report.revision, report.searches - 1);
        assert_eq!(report.transitions, 0);
    }

    #[test]
    fn first_search_is_row_major_argmax_of_uniform_prior() {
        let landscape = flat_landscape(3, Cell::new(2, 2), 0);
        let mut controller =
            SearchController::stationary(landscape, SearchRule::MaxContainment).unwrap();
        controller.step().unwrap();
        assert_eq!(controller.searches(), 1);
        assert_eq!(controller.moves(), 1);
        // (0, 0) was searched and its belief dropped below the rest.
        let (peak, _) = controller.belief().argmax();
        assert_eq!(peak, Cell::new(0, 1));
        assert!(controller.belief().prob(Cell::new(0, 0)).unwrap() < 1.0 / 9.0);
    }

    #[test]
    fn single_cell_grid_is_found_without_updates_failing() {
        // The only cell holds all mass, so a miss there is a degenerate update.
        let landscape = flat_landscape(1, Cell::new(0, 0), 3);
        let mut controller =
            SearchController::stationary(landscape, SearchRule::MaxContainment).unwrap();
        match controller.run() {
            Ok(report) => assert_eq!(report.found_at(), Some(Cell::new(0, 0))),
            Err(err) => assert!(matches!(err, SearchError::CertainBelief { .. })),
        }
    }

    #[test]
    fn move_ceiling_abandons_the_search() {
        let grid = Grid::filled(6, TerrainType::Caves).unwrap();
        let rates = FailureRates {
            caves: 0.99,
            ..FailureRates::default()
        };
        let landscape = Landscape::new(grid, rates, Cell::new(5, 5), 1).unwrap();
        let mut controller = SearchController::stationary(landscape, SearchRule::MaxContainment)
            .unwrap()
            .with_limits(SearchLimits::with_max_moves(3));
        let report = controller.run().unwrap();
        assert_eq!(report.state, SearchState::Abandoned { moves: 3 });
        assert_eq!(report.searches, 3);
    }

    #[test]
    fn terminal_state_is_sticky() {
        let landscape = flat_landscape(2, Cell::new(0, 0), 4);
        let mut controller = SearchController::stationary(landscape, SearchRule::MaxContainment)
            .unwrap()
            .with_limits(SearchLimits::with_max_moves(0));
        let first = controller.step().unwrap();
        assert_eq!(first, SearchState::Abandoned { moves: 0 });
        assert_eq!(controller.step().unwrap(), first);
        assert_eq!(controller.searches(), 0);
    }

    #[test]
    fn detection_rule_seeds_weighted_prior() {
        let grid = Grid::parse("CC\nCF").unwrap();
        let landscape =
            Landscape::new(grid, FailureRates::default(), Cell::new(0, 0), 2).unwrap();
        let controller = SearchController::stationary(landscape, SearchRule::MaxDetection).unwrap();
        let (peak, _) = controller.belief().argmax();
        assert_eq!(peak, Cell::new(1, 1));
    }

    #[test]
    fn moving_target_refilters_after_each_failure() {
        let landscape = Landscape::generate(
            6,
            &TerrainWeights::default(),
            FailureRates::default(),
            21,
        )
        .unwrap();
        let mut controller = SearchController::moving(
            landscape,
            SearchRule::MaxContainment,
            TransitionModel::with_seed(22),
        )
        .unwrap()
        .with_limits(SearchLimits::with_max_moves(5));
        while !controller.state().is_terminal() {
            match controller.step() {
                Ok(_) => assert!(controller.belief().is_normalized()),
                Err(err) => {
                    assert!(err.is_degenerate(), "unexpected error {err}");
                    break;
                }
            }
        }
        let report = controller.report();
        assert!(report.transitions <= report.searches);
        assert!(report.revision >= report.transitions);
    }

    #[test]
    fn distance_aware_pays_travel_cost() {
        let grid = Grid::filled(5, TerrainType::Flat).unwrap();
        let landscape =
            Landscape::new(grid.clone(), FailureRates::default(), Cell::new(4, 4), 9).unwrap();
        let mut weights = vec![1.0; 25];
        weights[Cell::new(0, 0).index(5)] = 0.0;
        weights[Cell::new(4, 4).index(5)] = 200.0;
        let belief = BeliefState::from_weights(5, weights).unwrap();
        let policy = Box::new(DistanceAwarePolicy::default());
        let mut controller =
            SearchController::with_policy(landscape, belief, policy, None).unwrap();
        controller.previous = Some(Cell::new(0, 0));

        controller.step().unwrap();

        assert_eq!(controller.searches(), 1);
        assert_eq!(controller.moves(), 8);
    }

    #[test]
    fn mismatched_belief_dimension_is_rejected() {
        let landscape = flat_landscape(3, Cell::new(0, 0), 0);
        let belief = BeliefState::uniform(4).unwrap();
        let policy = SearchRule::MaxContainment.spawn_policy().unwrap();
        let result = SearchController::with_policy(landscape, belief, policy, None);
        assert!(matches!(result, Err(SearchError::InvalidGrid { .. })));
    }

    #[test]
    fn controller_never_reads_the_target_directly() {
        let landscape = flat_landscape(3, Cell::new(1, 1), 5);
        let controller =
            SearchController::stationary(landscape, SearchRule::MaxContainment).unwrap();
        assert_eq!(controller.terrain().dimensions(), 3);
        assert!(!controller.is_moving());
    }

    #[test]
    fn belief_details_can_be_forced_on() {
        let landscape = flat_landscape(3, Cell::new(2, 2), 11);
        let mut controller = SearchController::stationary(landscape, SearchRule::MaxContainment)
            .unwrap()
            .with_belief_details(true);
        assert!(controller.belief_details);
        let report = controller.run().unwrap();
        assert_eq!(report.found_at(), Some(Cell::new(2, 2)));
    }

    #[test]
    fn belief_details_flag_reads_env() {
        unsafe {
            std::env::set_var("SEEKER_BELIEF_DETAILS", "on");
        }
        assert!(super::belief_details_enabled());
        unsafe {
            std::env::remove_var("SEEKER_BELIEF_DETAILS");
        }
    }
}
