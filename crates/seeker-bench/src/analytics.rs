use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use plotters::prelude::*;
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal};
use thiserror::Error;

use crate::config::{BenchmarkConfig, PolicyKind};
use crate::trials::{PolicyResult, TrialOutcome, TrialStatus};

const CONFIDENCE_Z: f64 = 1.96; // 95% CI

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("baseline policy '{0}' not present in trial results")]
    MissingBaseline(String),
    #[error("policy '{0}' reported in results but missing from configuration")]
    UnknownPolicy(String),
    #[error("baseline '{0}' missing for trial {1}")]
    MissingBaselineTrial(String, String),
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to render plot: {0}")]
    Plot(String),
}

/// Accumulates per-policy move counts and paired differences against the baseline.
pub struct AnalyticsCollector {
    baseline: String,
    policies: HashMap<String, PolicyAccumulator>,
    comparisons: HashMap<String, PairedMoves>,
    policy_order: Vec<String>,
}

impl AnalyticsCollector {
    pub fn new(config: &BenchmarkConfig) -> Result<Self, AnalyticsError> {
        let baseline = config
            .metrics
            .baseline
            .clone()
            .ok_or_else(|| AnalyticsError::MissingBaseline("<unset>".into()))?;

        let mut policies = HashMap::new();
        let mut order = Vec::new();
        for policy in &config.policies {
            policies.insert(
                policy.name.clone(),
                PolicyAccumulator::new(policy.name.clone(), policy.kind),
            );
            order.push(policy.name.clone());
        }

        if !policies.contains_key(&baseline) {
            return Err(AnalyticsError::MissingBaseline(baseline));
        }

        Ok(Self {
            baseline,
            policies,
            comparisons: HashMap::new(),
            policy_order: order,
        })
    }

    pub fn record_trial(&mut self, outcome: &TrialOutcome) -> Result<(), AnalyticsError> {
        let trial_id = format!("T{:05}", outcome.trial_index);

        let baseline = outcome
            .results
            .iter()
            .find(|result| result.policy == self.baseline)
            .ok_or_else(|| {
                AnalyticsError::MissingBaselineTrial(self.baseline.clone(), trial_id.clone())
            })?;
        let baseline_moves = found_moves(baseline);

        for result in &outcome.results {
            let acc = self
                .policies
                .get_mut(&result.policy)
                .ok_or_else(|| AnalyticsError::UnknownPolicy(result.policy.clone()))?;
            acc.record(result);
        }

        for result in &outcome.results {
            if result.policy == self.baseline {
                continue;
            }
            let entry = self
                .comparisons
                .entry(result.policy.clone())
                .or_insert_with(PairedMoves::default);
            // Only trials both policies finished are comparable.
            if let (Some(base), Some(moves)) = (baseline_moves, found_moves(result)) {
                entry.record(moves - base);
            }
        }

        Ok(())
    }

    pub fn finalize(mut self) -> Result<AnalyticsSummary, AnalyticsError> {
        let mut reports = Vec::new();
        for name in &self.policy_order {
            if let Some(acc) = self.policies.remove(name) {
                reports.push(acc.into_report());
            }
        }

        let mut comparisons = Vec::new();
        for report in &mut reports {
            let (p_value, sample_size) = if report.name == self.baseline {
                (1.0, report.found)
            } else {
                let paired = self.comparisons.remove(&report.name).unwrap_or_default();
                report.delta_vs_baseline = mean(&paired.diffs);
                paired.wilcoxon_signed_rank()
            };
            comparisons.push(ComparisonReport {
                policy: report.name.clone(),
                p_value,
                sample_size,
            });
        }

        Ok(AnalyticsSummary {
            baseline: self.baseline,
            policies: reports,
            comparisons,
        })
    }
}

fn found_moves(result: &PolicyResult) -> Option<f64> {
    (result.status == TrialStatus::Found).then_some(result.moves as f64)
}

struct PolicyAccumulator {
    name: String,
    kind: PolicyKind,
    trials: usize,
    found: usize,
    abandoned: usize,
    degenerate: usize,
    moves_when_found: Vec<f64>,
    total_searches: u64,
}

impl PolicyAccumulator {
    fn new(name: String, kind: PolicyKind) -> Self {
        Self {
            name,
            kind,
            trials: 0,
            found: 0,
            abandoned: 0,
            degenerate: 0,
            moves_when_found: Vec::new(),
            total_searches: 0,
        }
    }

    fn record(&mut self, result: &PolicyResult) {
        self.trials += 1;
        self.total_searches += result.searches;
        match result.status {
            TrialStatus::Found => {
                self.found += 1;
                self.moves_when_found.push(result.moves as f64);
            }
            TrialStatus::Abandoned => self.abandoned += 1,
            TrialStatus::Degenerate => self.degenerate += 1,
        }
    }

    fn into_report(self) -> PolicyReport {
        let mean_moves = mean(&self.moves_when_found);
        let mean_searches = if self.trials == 0 {
            0.0
        } else {
            self.total_searches as f64 / self.trials as f64
        };
        let found_rate = if self.trials == 0 {
            0.0
        } else {
            self.found as f64 / self.trials as f64
        };

        PolicyReport {
            ci95: confidence_interval(&self.moves_when_found),
            name: self.name,
            kind: self.kind,
            trials: self.trials,
            found: self.found,
            abandoned: self.abandoned,
            degenerate: self.degenerate,
            found_rate,
            mean_moves,
            mean_searches,
            delta_vs_baseline: 0.0,
        }
    }
}

/// Per-trial move differences (policy minus baseline).
#[derive(Clone, Default)]
struct PairedMoves {
    diffs: Vec<f64>,
}

impl PairedMoves {
    fn record(&mut self, diff: f64) {
        self.diffs.push(diff);
    }

    /// Two-sided p-value via the normal approximation, with tie and continuity corrections.
    fn wilcoxon_signed_rank(self) -> (f64, usize) {
        let mut magnitudes: Vec<(f64, bool)> = self
            .diffs
            .into_iter()
            .filter(|diff| diff.abs() > f64::EPSILON)
            .map(|diff| (diff.abs(), diff > 0.0))
            .collect();
        let n = magnitudes.len();
        if n == 0 {
            return (1.0, 0);
        }
        magnitudes.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut w_plus = 0.0;
        let mut w_minus = 0.0;
        let mut tie_adjustment = 0.0;
        let mut start = 0;
        while start < n {
            let mut end = start;
            while end + 1 < n && (magnitudes[end + 1].0 - magnitudes[start].0).abs() < 1e-12 {
                end += 1;
            }
            let rank = (start + end + 2) as f64 / 2.0;
            for &(_, positive) in &magnitudes[start..=end] {
                if positive {
                    w_plus += rank;
                } else {
                    w_minus += rank;
                }
            }
            let tied = (end - start + 1) as f64;
            if tied > 1.0 {
                tie_adjustment += (tied.powi(3) - tied) / 48.0;
            }
            start = end + 1;
        }

        let n_f = n as f64;
        let mean_w = n_f * (n_f + 1.0) / 4.0;
        let variance_w = n_f * (n_f + 1.0) * (2.0 * n_f + 1.0) / 24.0 - tie_adjustment;
        if variance_w <= 0.0 {
            return (1.0, n);
        }

        let w: f64 = f64::min(w_plus, w_minus);
        let z = ((w - mean_w).abs() - 0.5).max(0.0) / variance_w.sqrt();
        let Ok(normal) = Normal::new(0.0, 1.0) else {
            return (1.0, n);
        };
        let p = 2.0 * (1.0 - normal.cdf(z));
        (p.clamp(0.0, 1.0), n)
    }
}

#[derive(Debug, Serialize)]
pub struct AnalyticsSummary {
    pub baseline: String,
    pub policies: Vec<PolicyReport>,
    pub comparisons: Vec<ComparisonReport>,
}

impl AnalyticsSummary {
    pub fn policy(&self, name: &str) -> Option<&PolicyReport> {
        self.policies.iter().find(|policy| policy.name == name)
    }

    pub fn write_markdown(&self, path: impl AsRef<Path>) -> Result<(), AnalyticsError> {
        let mut rows = String::new();
        rows.push_str("# Search Summary\n\n");
        rows.push_str(&format!("Baseline: `{}`\n\n", self.baseline));
        rows.push_str("| Policy | Kind | Trials | Found % | Mean moves | Paired Δ vs baseline | 95% CI | Mean searches | Abandoned | Degenerate | p-value |\n");
        rows.push_str("|--------|------|--------|---------|------------|---------------|--------|---------------|-----------|------------|---------|\n");

        for policy in &self.policies {
            let p_value = self
                .comparisons
                .iter()
                .find(|c| c.policy == policy.name)
                .map(|c| c.p_value)
                .unwrap_or(1.0);

            rows.push_str(&format!(
                "| {name} | {kind:?} | {trials} | {found:.1}% | {mean:.2} | {delta:+.2} | [{ci_low:.2}, {ci_high:.2}] | {searches:.2} | {abandoned} | {degenerate} | {pval:.3} |\n",
                name = policy.name,
                kind = policy.kind,
                trials = policy.trials,
                found = policy.found_rate * 100.0,
                mean = policy.mean_moves,
                delta = policy.delta_vs_baseline,
                ci_low = policy.ci95.0,
                ci_high = policy.ci95.1,
                searches = policy.mean_searches,
                abandoned = policy.abandoned,
                degenerate = policy.degenerate,
                pval = p_value,
            ));
        }

        fs::write(path.as_ref(), rows).map_err(|source| AnalyticsError::Io {
            context: "writing summary markdown",
            source,
        })
    }

    pub fn render_plot(&self, dir: impl AsRef<Path>) -> Result<PathBuf, AnalyticsError> {
        let dir = dir.as_ref();
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir).map_err(|source| AnalyticsError::Io {
                context: "creating plots directory",
                source,
            })?;
        }

        let output_path = dir.join("delta_moves.png");
        let baseline = self.baseline.clone();
        let mut policies = self.policies.clone();
        policies.sort_by(|a, b| a.delta_vs_baseline.total_cmp(&b.delta_vs_baseline));

        // Font lookup inside plotters can panic on hosts without fonts.
        let prev_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(|_| {}));

        let plot_attempt = std::panic::catch_unwind(move || {
            draw_delta_chart(&output_path, &policies, &baseline).map(|()| output_path)
        });

        std::panic::set_hook(prev_hook);

        match plot_attempt {
            Ok(result) => result,
            Err(_) => Err(AnalyticsError::Plot(
                "plotters panicked while rendering (missing font support?)".into(),
            )),
        }
    }
}

fn draw_delta_chart(
    output_path: &Path,
    policies: &[PolicyReport],
    baseline: &str,
) -> Result<(), AnalyticsError> {
    let root = BitMapBackend::new(output_path, (800, 480)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let (low, high) = policies
        .iter()
        .map(|policy| policy.delta_vs_baseline)
        .fold((0.0f64, 0.0f64), |(low, high), v| (low.min(v), high.max(v)));
    let margin = ((high - low).abs() * 0.1).max(0.5);

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .caption(
            "Mean moves delta vs baseline (lower is better)",
            ("sans-serif", 22),
        )
        .set_label_area_size(LabelAreaPosition::Left, 50)
        .set_label_area_size(LabelAreaPosition::Bottom, 60)
        .build_cartesian_2d(0..policies.len(), (low - margin)..(high + margin))
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .y_desc("Δ mean moves vs baseline")
        .x_desc("Policy")
        .x_label_formatter(&|idx| {
            policies
                .get(*idx)
                .map(|policy| policy.name.clone())
                .unwrap_or_default()
        })
        .draw()
        .map_err(plot_err)?;

    chart
        .draw_series(policies.iter().enumerate().map(|(idx, policy)| {
            let color = if policy.name == baseline {
                &BLUE
            } else if policy.delta_vs_baseline <= 0.0 {
                &GREEN
            } else {
                &RED
            };
            Rectangle::new(
                [(idx, 0.0), (idx + 1, policy.delta_vs_baseline)],
                color.filled(),
            )
        }))
        .map_err(plot_err)?;

    drop(chart);
    root.present().map_err(plot_err)?;
    Ok(())
}

fn plot_err(err: impl std::fmt::Display) -> AnalyticsError {
    AnalyticsError::Plot(err.to_string())
}

#[derive(Debug, Clone, Serialize)]
pub struct PolicyReport {
    pub name: String,
    pub kind: PolicyKind,
    pub trials: usize,
    pub found: usize,
    pub abandoned: usize,
    pub degenerate: usize,
    pub found_rate: f64,
    /// Averaged over trials that ended with the target found.
    pub mean_moves: f64,
    pub ci95: (f64, f64),
    pub mean_searches: f64,
    /// Mean per-trial move difference over trials both this policy and the baseline found.
    #[serde(skip)]
    pub delta_vs_baseline: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport {
    pub policy: String,
    pub p_value: f64,
    pub sample_size: usize,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn confidence_interval(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let mean = mean(values);
    if values.len() == 1 {
        return (mean, mean);
    }
    let variance = values
        .iter()
        .map(|value| (value - mean).powi(2))
        .sum::<f64>()
        / (values.len() as f64 - 1.0);
    let margin = CONFIDENCE_Z * (variance / values.len() as f64).sqrt();
    (mean - margin, mean + margin)
}
