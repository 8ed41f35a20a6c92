use seeker_core::error::SearchError;
use seeker_core::model::grid::Grid;
use seeker_core::model::terrain::{FailureRates, TerrainWeights};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::Level;

const DEFAULT_DIM: usize = 50;
const MAX_DIM: usize = 512;
const RUN_ID_ALLOWED: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789._-";

/// Root benchmark configuration loaded from YAML.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BenchmarkConfig {
    pub run_id: String,
    pub trials: TrialsConfig,
    #[serde(default)]
    pub terrain: TerrainConfig,
    pub policies: Vec<PolicyConfig>,
    pub outputs: OutputsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BenchmarkConfig {
    /// Load configuration from a YAML file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let path_buf = path.to_path_buf();
        let file = File::open(path).map_err(|source| ConfigError::Read {
            source,
            path: path_buf.clone(),
        })?;
        let reader = BufReader::new(file);
        let mut cfg: BenchmarkConfig =
            serde_yaml::from_reader(reader).map_err(|source| ConfigError::Parse {
                source,
                path: path_buf.clone(),
            })?;
        cfg.validate().map_err(|source| ConfigError::Invalid {
            path: path_buf,
            source,
        })?;
        Ok(cfg)
    }

    /// Validate the configuration without performing I/O.
    pub fn validate(&mut self) -> Result<(), ValidationError> {
        validate_run_id(&self.run_id)?;
        self.trials.validate()?;
        self.terrain.validate(self.trials.dim)?;
        self.outputs.validate(&self.run_id)?;
        self.metrics.validate(&self.policies)?;
        self.logging.normalize();
        validate_policies(&mut self.policies)?;
        Ok(())
    }

    /// Resolve output templates (e.g., `{run_id}` placeholders) into concrete paths.
    pub fn resolved_outputs(&self) -> ResolvedOutputs {
        ResolvedOutputs {
            jsonl: resolve_template(&self.run_id, &self.outputs.jsonl),
            summary_md: resolve_template(&self.run_id, &self.outputs.summary_md),
            plots_dir: resolve_template(&self.run_id, &self.outputs.plots_dir),
        }
    }
}

/// Trial sampling block.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TrialsConfig {
    pub seed: Option<u64>,
    pub count: usize,
    #[serde(default = "default_dim")]
    pub dim: usize,
    #[serde(default)]
    pub mode: SearchMode,
    /// Abandon a search once its move count reaches this ceiling.
    #[serde(default)]
    pub max_moves: Option<u64>,
}

impl TrialsConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.count == 0 {
            return Err(ValidationError::field(
                "trials.count",
                "number of trials must be greater than zero",
            ));
        }

        if self.dim == 0 || self.dim > MAX_DIM {
            return Err(ValidationError::field(
                "trials.dim",
                format!("grid dimension must be between 1 and {MAX_DIM}"),
            ));
        }

        if self.max_moves == Some(0) {
            return Err(ValidationError::field(
                "trials.max_moves",
                "move ceiling must be at least 1 when set",
            ));
        }

        Ok(())
    }
}

fn default_dim() -> usize {
    DEFAULT_DIM
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    #[default]
    Stationary,
    Moving,
}

impl SearchMode {
    pub const fn label(self) -> &'static str {
        match self {
            SearchMode::Stationary => "stationary",
            SearchMode::Moving => "moving",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for SearchMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "stationary" | "static" => Ok(SearchMode::Stationary),
            "moving" => Ok(SearchMode::Moving),
            other => Err(format!("unknown search mode '{other}'")),
        }
    }
}

/// Terrain generation block. Rates fall back to `SEEKER_FN_*` overrides.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct TerrainConfig {
    #[serde(default)]
    pub weights: TerrainWeights,
    #[serde(default)]
    pub failure_rates: Option<FailureRates>,
    /// Fixed rows of `F`/`H`/`W`/`C`; when set every trial reuses this grid.
    #[serde(default)]
    pub layout: Option<Vec<String>>,
}

impl TerrainConfig {
    fn validate(&self, dim: usize) -> Result<(), ValidationError> {
        self.weights
            .validate()
            .map_err(|err| ValidationError::field("terrain.weights", err.to_string()))?;

        if let Some(rates) = self.failure_rates.as_ref() {
            rates
                .validate()
                .map_err(|err| ValidationError::field("terrain.failure_rates", err.to_string()))?;
        }

        let layout = self
            .fixed_grid()
            .map_err(|err| ValidationError::field("terrain.layout", err.to_string()))?;
        if let Some(grid) = layout {
            if grid.dim() != dim {
                return Err(ValidationError::field(
                    "terrain.layout",
                    format!(
                        "layout is {0}x{0} but trials.dim is {dim}",
                        grid.dim()
                    ),
                ));
            }
        }

        Ok(())
    }

    pub fn failure_rates(&self) -> FailureRates {
        self.failure_rates.unwrap_or_else(FailureRates::from_env)
    }

    /// Parsed `layout`, or `None` when terrain is drawn per trial.
    pub fn fixed_grid(&self) -> Result<Option<Grid>, SearchError> {
        self.layout
            .as_ref()
            .map(|rows| Grid::from_rows(rows.as_slice()))
            .transpose()
    }
}

/// Definition of a benchmarked search policy.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PolicyConfig {
    pub name: String,
    pub kind: PolicyKind,
    #[serde(default)]
    pub params: serde_yaml::Value,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    MaxContainment,
    MaxDetection,
    DistanceAware,
}

/// Output artifact configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct OutputsConfig {
    pub jsonl: String,
    pub summary_md: String,
    pub plots_dir: String,
}

impl OutputsConfig {
    fn validate(&self, run_id: &str) -> Result<(), ValidationError> {
        for (label, value) in [
            ("outputs.jsonl", &self.jsonl),
            ("outputs.summary_md", &self.summary_md),
            ("outputs.plots_dir", &self.plots_dir),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::field(label, "path must not be empty"));
            }

            let resolved = resolve_template(run_id, value);
            if resolved.components().count() == 0 {
                return Err(ValidationError::field(label, "resolved path is invalid"));
            }
        }
        Ok(())
    }
}

/// Metrics configuration block.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct MetricsConfig {
    #[serde(default)]
    pub baseline: Option<String>,
}

impl MetricsConfig {
    fn validate(&self, policies: &[PolicyConfig]) -> Result<(), ValidationError> {
        let Some(baseline) = self.baseline.as_ref() else {
            return Err(ValidationError::field(
                "metrics.baseline",
                "baseline policy must be specified",
            ));
        };

        if !policies.iter().any(|p| &p.name == baseline) {
            return Err(ValidationError::field(
                "metrics.baseline",
                format!("baseline policy '{baseline}' is not defined in policies list"),
            ));
        }

        Ok(())
    }
}

/// Logging configuration defaults to disabled structured logs.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default)]
    pub enable_structured: bool,
    #[serde(default = "default_tracing_level")]
    pub tracing_level: String,
    #[serde(default)]
    pub belief_details: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enable_structured: false,
            tracing_level: default_tracing_level(),
            belief_details: false,
        }
    }
}

impl LoggingConfig {
    fn normalize(&mut self) {
        if self.tracing_level.trim().is_empty() {
            self.tracing_level = default_tracing_level();
        }
    }

    pub fn level(&self) -> Option<Level> {
        match self.tracing_level.to_ascii_lowercase().as_str() {
            "trace" => Some(Level::TRACE),
            "debug" => Some(Level::DEBUG),
            "info" => Some(Level::INFO),
            "warn" | "warning" => Some(Level::WARN),
            "error" => Some(Level::ERROR),
            _ => None,
        }
    }
}

fn default_tracing_level() -> String {
    "info".to_string()
}

fn validate_run_id(run_id: &str) -> Result<(), ValidationError> {
    if run_id.trim().is_empty() {
        return Err(ValidationError::field("run_id", "run_id must not be empty"));
    }

    if !run_id.chars().all(|c| RUN_ID_ALLOWED.contains(c)) {
        return Err(ValidationError::field(
            "run_id",
            "run_id may only contain alphanumeric characters, '.', '_' or '-'",
        ));
    }

    Ok(())
}

fn validate_policies(policies: &mut [PolicyConfig]) -> Result<(), ValidationError> {
    if policies.is_empty() {
        return Err(ValidationError::field(
            "policies",
            "at least one policy must be specified",
        ));
    }

    let mut seen = HashSet::new();
    for policy in policies.iter_mut() {
        if policy.name.trim().is_empty() {
            return Err(ValidationError::field(
                "policies.name",
                "policy name must not be empty",
            ));
        }

        if !policy.name.chars().all(|c| RUN_ID_ALLOWED.contains(c)) {
            return Err(ValidationError::field(
                format!("policies[{}].name", policy.name),
                "policy name contains invalid characters",
            ));
        }

        if !seen.insert(policy.name.clone()) {
            return Err(ValidationError::field(
                "policies",
                format!("policy name '{}' defined more than once", policy.name),
            ));
        }

        if policy.params.is_null() {
            policy.params = serde_yaml::Value::Mapping(Default::default());
        }
    }

    Ok(())
}

fn resolve_template(run_id: &str, template: &str) -> PathBuf {
    let replaced = template.replace("{run_id}", run_id);
    PathBuf::from(replaced)
}

/// Fully resolved output paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOutputs {
    pub jsonl: PathBuf,
    pub summary_md: PathBuf,
    pub plots_dir: PathBuf,
}

impl ResolvedOutputs {
    /// Directory holding the summary; telemetry artifacts land next to it.
    pub fn telemetry_dir(&self) -> PathBuf {
        self.summary_md
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Errors surfaced when loading configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("failed to parse config {path:?}: {source}")]
    Parse {
        #[source]
        source: serde_yaml::Error,
        path: PathBuf,
    },
    #[error("invalid configuration in {path:?}: {source}")]
    Invalid {
        path: PathBuf,
        source: ValidationError,
    },
}

impl ConfigError {
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. }
            | ConfigError::Parse { path, .. }
            | ConfigError::Invalid { path, .. } => path.as_path(),
        }
    }
}

/// Validation failures captured with contextual metadata.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field}: {message}")]
    InvalidField { field: String, message: String },
}

impl ValidationError {
    fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationError::InvalidField {
            field: field.into(),
            message: message.into(),
        }
    }
}
