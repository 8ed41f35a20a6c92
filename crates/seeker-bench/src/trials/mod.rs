mod options;

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::analytics::{AnalyticsCollector, AnalyticsError};
use crate::config::{BenchmarkConfig, ResolvedOutputs, SearchMode};
use crate::logging::TELEMETRY_FILE;
use crate::telemetry::{
    TelemetryError, TelemetryOutputs, append_highlights_to_markdown, write_summary_outputs,
};
use rand::{RngCore, SeedableRng, rngs::StdRng};
use seeker_bot::{SearchController, SearchLimits, SearchReport, SearchState};
use seeker_core::belief::BeliefSnapshot;
use seeker_core::error::SearchError;
use seeker_core::model::grid::Grid;
use seeker_core::model::terrain::{FailureRates, TerrainType};
use seeker_core::terrain::{Landscape, TerrainModel};
use seeker_core::transition::TransitionModel;
use serde::Serialize;
use thiserror::Error;
use tracing::{Level, event};

pub use options::{PolicyBlueprint, PolicyError};

/// Mixed into the trial seed so target motion draws from its own stream.
const MOTION_SEED_SALT: u64 = 0x5EEC_E12D_0000_0001;

/// Runs every configured policy over a shared sequence of seeded landscapes.
pub struct TrialRunner {
    config: BenchmarkConfig,
    outputs: ResolvedOutputs,
    policies: Vec<PolicyBlueprint>,
    rates: FailureRates,
    fixed_grid: Option<Grid>,
    logging_enabled: bool,
}

/// Summary details returned after a run.
#[derive(Debug)]
pub struct RunSummary {
    pub trials_run: usize,
    pub policies: usize,
    pub rows_written: usize,
    pub degenerate_rows: usize,
    pub jsonl_path: PathBuf,
    pub summary_path: PathBuf,
    pub plot_path: Option<PathBuf>,
    pub telemetry_path: Option<PathBuf>,
    pub telemetry_outputs: Option<TelemetryOutputs>,
}

impl TrialRunner {
    /// Build a runner from a validated configuration.
    pub fn new(config: BenchmarkConfig, outputs: ResolvedOutputs) -> Result<Self, RunnerError> {
        let policies = PolicyBlueprint::from_configs(&config.policies)?;
        let rates = config.terrain.failure_rates();
        rates.validate()?;
        let fixed_grid = config.terrain.fixed_grid()?;

        Ok(Self {
            logging_enabled: config.logging.enable_structured,
            config,
            outputs,
            policies,
            rates,
            fixed_grid,
        })
    }

    /// Execute all trials, streaming JSONL rows to disk.
    pub fn run(&self) -> Result<RunSummary, RunnerError> {
        ensure_parent(self.outputs.jsonl.parent())?;
        ensure_parent(self.outputs.summary_md.parent())?;
        if !self.outputs.plots_dir.as_os_str().is_empty() {
            fs::create_dir_all(&self.outputs.plots_dir)?;
        }

        let mut writer = BufWriter::new(File::create(&self.outputs.jsonl)?);
        let mut rng = StdRng::seed_from_u64(self.config.trials.seed.unwrap_or(0));
        let mut rows_written = 0usize;
        let mut degenerate_rows = 0usize;
        let mut analytics = AnalyticsCollector::new(&self.config)?;

        for trial_index in 0..self.config.trials.count {
            let trial_seed = rng.next_u64();
            let outcome = self.run_trial(trial_index, trial_seed)?;
            analytics.record_trial(&outcome)?;
            degenerate_rows += outcome
                .results
                .iter()
                .filter(|result| result.status == TrialStatus::Degenerate)
                .count();
            rows_written += write_trial_rows(&mut writer, &self.config, &outcome)?;
        }

        writer.flush()?;

        let summary = analytics.finalize()?;
        summary.write_markdown(&self.outputs.summary_md)?;
        let plot_path = match summary.render_plot(&self.outputs.plots_dir) {
            Ok(path) => Some(path),
            Err(err) => {
                eprintln!("WARN: {}", err);
                None
            }
        };

        let telemetry_dir = self.outputs.telemetry_dir();
        let telemetry_path = self
            .logging_enabled
            .then(|| telemetry_dir.join(TELEMETRY_FILE));

        let telemetry_outputs = match telemetry_path.as_ref() {
            Some(path) => write_summary_outputs(path, &telemetry_dir)?,
            None => None,
        };

        if let Some(outputs) = telemetry_outputs.as_ref() {
            append_highlights_to_markdown(&self.outputs.summary_md, outputs)?;
        }

        Ok(RunSummary {
            trials_run: self.config.trials.count,
            policies: self.policies.len(),
            rows_written,
            degenerate_rows,
            jsonl_path: self.outputs.jsonl.clone(),
            summary_path: self.outputs.summary_md.clone(),
            plot_path,
            telemetry_path,
            telemetry_outputs,
        })
    }

    /// One landscape, searched independently by every policy.
    ///
    /// Each policy gets a clone of the same landscape and a motion model seeded
    /// identically, so terrain, target start and detection draws line up.
    pub fn run_trial(&self, trial_index: usize, seed: u64) -> Result<TrialOutcome, RunnerError> {
        let landscape = self.build_landscape(seed)?;
        let start_terrain = landscape.terrain(landscape.target())?;
        let limits = SearchLimits {
            max_moves: self.config.trials.max_moves,
        };

        let mut results = Vec::with_capacity(self.policies.len());
        for blueprint in &self.policies {
            let rule = blueprint.rule();
            let mut controller = match self.config.trials.mode {
                SearchMode::Stationary => SearchController::stationary(landscape.clone(), rule)?,
                SearchMode::Moving => SearchController::moving(
                    landscape.clone(),
                    rule,
                    TransitionModel::with_seed(seed ^ MOTION_SEED_SALT),
                )?,
            }
            .with_limits(limits);
            if self.config.logging.belief_details {
                controller = controller.with_belief_details(true);
            }

            let result = match controller.run() {
                Ok(report) => PolicyResult::from_report(blueprint.name(), &report, None),
                Err(err) if err.is_degenerate() => {
                    PolicyResult::from_report(blueprint.name(), &controller.report(), Some(err))
                        .with_final_belief(controller.belief().snapshot())
                }
                Err(err) => return Err(err.into()),
            };

            if self.logging_enabled && tracing::enabled!(Level::INFO) {
                event!(
                    target: "seeker_bench::trial",
                    Level::INFO,
                    run_id = %self.config.run_id,
                    trial_index = trial_index as u64,
                    policy = %result.policy,
                    rule = result.rule,
                    status = result.status.label(),
                    moves = result.moves,
                    searches = result.searches,
                );
            }

            results.push(result);
        }

        Ok(TrialOutcome {
            trial_index,
            seed,
            start_terrain,
            results,
        })
    }

    fn build_landscape(&self, seed: u64) -> Result<Landscape, SearchError> {
        match self.fixed_grid.as_ref() {
            Some(grid) => Landscape::with_random_target(grid.clone(), self.rates, seed),
            None => Landscape::generate(
                self.config.trials.dim,
                &self.config.terrain.weights,
                self.rates,
                seed,
            ),
        }
    }
}

fn ensure_parent(path: Option<&Path>) -> Result<(), RunnerError> {
    if let Some(dir) = path.filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

fn write_trial_rows(
    writer: &mut BufWriter<File>,
    config: &BenchmarkConfig,
    outcome: &TrialOutcome,
) -> Result<usize, RunnerError> {
    let trial_id = format!("T{:05}", outcome.trial_index);

    let mut rows_written = 0usize;
    for result in &outcome.results {
        let row = TrialLogRow {
            run_id: &config.run_id,
            trial_id: &trial_id,
            trial_index: outcome.trial_index,
            trial_seed: outcome.seed,
            policy: &result.policy,
            rule: result.rule,
            dim: config.trials.dim,
            mode: config.trials.mode,
            status: result.status,
            found: result.status == TrialStatus::Found,
            moves: result.moves,
            searches: result.searches,
            transitions: result.transitions,
            revision: result.revision,
            start_terrain: outcome.start_terrain,
            error: result.error.as_deref(),
            final_belief: result.final_belief.as_ref(),
        };

        serde_json::to_writer(&mut *writer, &row)?;
        writer.write_all(b"\n")?;
        rows_written += 1;
    }

    Ok(rows_written)
}

pub struct TrialOutcome {
    pub trial_index: usize,
    pub seed: u64,
    pub start_terrain: TerrainType,
    pub results: Vec<PolicyResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialStatus {
    Found,
    Abandoned,
    /// Belief collapsed and the search stopped with an error.
    Degenerate,
}

impl TrialStatus {
    pub const fn label(self) -> &'static str {
        match self {
            TrialStatus::Found => "found",
            TrialStatus::Abandoned => "abandoned",
            TrialStatus::Degenerate => "degenerate",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PolicyResult {
    pub policy: String,
    pub rule: &'static str,
    pub status: TrialStatus,
    pub moves: u64,
    pub searches: u64,
    pub transitions: u64,
    pub revision: u64,
    pub error: Option<String>,
    /// Belief at the moment a degenerate search stopped.
    pub final_belief: Option<BeliefSnapshot>,
}

impl PolicyResult {
    fn from_report(policy: &str, report: &SearchReport, error: Option<SearchError>) -> Self {
        let status = match (report.state, error.is_some()) {
            (_, true) => TrialStatus::Degenerate,
            (SearchState::Found { .. }, false) => TrialStatus::Found,
            (SearchState::Abandoned { .. } | SearchState::Searching, false) => {
                TrialStatus::Abandoned
            }
        };
        Self {
            policy: policy.to_string(),
            rule: report.rule.label(),
            status,
            moves: report.moves,
            searches: report.searches,
            transitions: report.transitions,
            revision: report.revision,
            error: error.map(|err| err.to_string()),
            final_belief: None,
        }
    }

    fn with_final_belief(mut self, snapshot: BeliefSnapshot) -> Self {
        self.final_belief = Some(snapshot);
        self
    }
}

#[derive(Serialize)]
struct TrialLogRow<'a> {
    run_id: &'a str,
    trial_id: &'a str,
    trial_index: usize,
    trial_seed: u64,
    policy: &'a str,
    rule: &'static str,
    dim: usize,
    mode: SearchMode,
    status: TrialStatus,
    found: bool,
    moves: u64,
    searches: u64,
    transitions: u64,
    revision: u64,
    start_terrain: TerrainType,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    final_belief: Option<&'a BeliefSnapshot>,
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("{0}")]
    Policy(#[from] PolicyError),
    #[error("search failed: {0}")]
    Search(#[from] SearchError),
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
    #[error("failed to serialize log row: {source}")]
    Serialize {
        #[from]
        source: serde_json::Error,
    },
    #[error("analytics error: {0}")]
    Analytics(#[from] AnalyticsError),
    #[error("telemetry summarisation failed: {0}")]
    Telemetry(#[from] TelemetryError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use seeker_bot::SearchRule;
    use seeker_core::belief::BeliefState;
    use seeker_core::model::cell::Cell;

    fn report(state: SearchState) -> SearchReport {
        SearchReport {
            rule: SearchRule::MaxContainment,
            state,
            moves: 7,
            searches: 7,
            transitions: 0,
            revision: 6,
        }
    }

    #[test]
    fn found_report_maps_to_found_status() {
        let result = PolicyResult::from_report(
            "containment",
            &report(SearchState::Found {
                cell: Cell::new(1, 1),
                moves: 7,
            }),
            None,
        );
        assert_eq!(result.status, TrialStatus::Found);
        assert_eq!(result.rule, "max_containment");
        assert!(result.error.is_none());
    }

    #[test]
    fn degenerate_error_overrides_state() {
        let error = SearchError::CertainBelief {
            cell: Cell::new(0, 0),
            belief: 1.0,
        };
        let result =
            PolicyResult::from_report("walker", &report(SearchState::Searching), Some(error));
        assert_eq!(result.status, TrialStatus::Degenerate);
        assert!(result.error.as_deref().is_some_and(|msg| msg.contains("(0, 0)")));
    }

    fn layout_config() -> BenchmarkConfig {
        let yaml = r#"
run_id: "layout_check"
trials:
  seed: 9
  count: 3
  dim: 2
terrain:
  layout:
    - "FF"
    - "FF"
policies:
  - name: "containment"
    kind: "max_containment"
  - name: "walker"
    kind: "distance_aware"
outputs:
  jsonl: "unused/trials.jsonl"
  summary_md: "unused/summary.md"
  plots_dir: "unused/plots"
metrics:
  baseline: "containment"
logging:
  belief_details: true
"#;
        let mut config: BenchmarkConfig = serde_yaml::from_str(yaml).expect("parse");
        config.validate().expect("valid");
        config
    }

    #[test]
    fn fixed_layout_is_searched_in_every_trial() {
        let config = layout_config();
        let outputs = config.resolved_outputs();
        let runner = TrialRunner::new(config, outputs).expect("runner");
        for (index, seed) in [3u64, 17, 4242].into_iter().enumerate() {
            let outcome = runner.run_trial(index, seed).expect("trial runs");
            assert_eq!(outcome.start_terrain, TerrainType::Flat);
            assert_eq!(outcome.results.len(), 2);
            for result in &outcome.results {
                assert_eq!(result.status, TrialStatus::Found);
                assert!(result.final_belief.is_none());
            }
        }
    }

    #[test]
    fn malformed_layout_fails_runner_construction() {
        let mut config = layout_config();
        config.terrain.layout = Some(vec!["FX".to_string(), "FF".to_string()]);
        let outputs = config.resolved_outputs();
        assert!(matches!(
            TrialRunner::new(config, outputs),
            Err(RunnerError::Search(SearchError::InvalidGrid { .. }))
        ));
    }

    #[test]
    fn degenerate_rows_carry_the_final_belief() {
        let error = SearchError::CertainBelief {
            cell: Cell::new(1, 0),
            belief: 1.0,
        };
        let snapshot = BeliefState::uniform(2).expect("belief").snapshot();
        let result =
            PolicyResult::from_report("walker", &report(SearchState::Searching), Some(error))
                .with_final_belief(snapshot);

        let row = TrialLogRow {
            run_id: "r",
            trial_id: "T00000",
            trial_index: 0,
            trial_seed: 1,
            policy: &result.policy,
            rule: result.rule,
            dim: 2,
            mode: SearchMode::Moving,
            status: result.status,
            found: false,
            moves: result.moves,
            searches: result.searches,
            transitions: result.transitions,
            revision: result.revision,
            start_terrain: TerrainType::Flat,
            error: result.error.as_deref(),
            final_belief: result.final_belief.as_ref(),
        };
        let value = serde_json::to_value(&row).expect("row serializes");
        assert_eq!(value["status"], "degenerate");
        assert_eq!(value["final_belief"]["rows"].as_array().map(Vec::len), Some(2));
        assert_eq!(value["final_belief"]["rows"][1][0], 0.25);

        let found = PolicyResult::from_report(
            "containment",
            &report(SearchState::Found {
                cell: Cell::new(0, 0),
                moves: 7,
            }),
            None,
        );
        assert!(found.final_belief.is_none());
    }

    #[test]
    fn abandoned_report_maps_to_abandoned_status() {
        let result =
            PolicyResult::from_report("detection", &report(SearchState::Abandoned { moves: 7 }), None);
        assert_eq!(result.status, TrialStatus::Abandoned);
        assert_eq!(result.status.label(), "abandoned");
    }
}
