use std::path::PathBuf;

use clap::Parser;

use seeker_bench::config::{BenchmarkConfig, ResolvedOutputs, SearchMode};
use seeker_bench::logging::init_logging;
use seeker_bench::trials::TrialRunner;
use seeker_core::AppInfo;

/// Benchmark harness comparing Bayesian search rules.
#[derive(Debug, Parser)]
#[command(
    name = "seeker-bench",
    author,
    version,
    about = "Deterministic terrain search benchmark"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "bench/bench.yaml")]
    config: PathBuf,

    /// Override the run identifier (substitutes {run_id} templates).
    #[arg(long, value_name = "RUN_ID")]
    run_id: Option<String>,

    /// Override the number of trials.
    #[arg(long, value_name = "COUNT")]
    trials: Option<usize>,

    /// Override the RNG seed for landscape generation.
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,

    /// Override the grid dimension.
    #[arg(long, value_name = "DIM")]
    dim: Option<usize>,

    /// Override the search mode (stationary or moving).
    #[arg(long, value_name = "MODE")]
    mode: Option<SearchMode>,

    /// Abandon each search after this many moves.
    #[arg(long, value_name = "MOVES")]
    max_moves: Option<u64>,

    /// Exit after validating the configuration (no trials are run).
    #[arg(long)]
    validate_only: bool,

    /// Attach belief entropy and support to search events (forces SEEKER_BELIEF_DETAILS=1).
    #[arg(long)]
    log_belief_details: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = BenchmarkConfig::from_path(&cli.config)?;

    if let Some(run_id) = cli.run_id {
        config.run_id = run_id;
    }

    if let Some(trials) = cli.trials {
        config.trials.count = trials;
    }

    if let Some(seed) = cli.seed {
        config.trials.seed = Some(seed);
    }

    if let Some(dim) = cli.dim {
        config.trials.dim = dim;
    }

    if let Some(mode) = cli.mode {
        config.trials.mode = mode;
    }

    if let Some(max_moves) = cli.max_moves {
        config.trials.max_moves = Some(max_moves);
    }

    if cli.log_belief_details {
        config.logging.belief_details = true;
    }

    config.validate()?;

    let outputs: ResolvedOutputs = config.resolved_outputs();
    let policy_count = config.policies.len();
    let run_id = config.run_id.clone();
    let trials = config.trials.count;
    let dim = config.trials.dim;
    let mode = config.trials.mode;

    println!(
        "{} {} ({})",
        AppInfo::name(),
        AppInfo::version(),
        AppInfo::codename()
    );
    println!(
        "Loaded configuration '{run_id}' with {policy_count} polic{} ({trials} trials, {dim}x{dim} grid, {mode} target)",
        if policy_count == 1 { "y" } else { "ies" }
    );

    let _logging_guard = init_logging(&config.logging, &outputs, &run_id)?;
    let runner = TrialRunner::new(config, outputs)?;

    if cli.validate_only {
        println!("Validation-only mode: trial execution skipped.");
        return Ok(());
    }

    let summary = runner.run()?;
    println!(
        "Benchmark complete for '{run_id}': {} trials × {} policies → {} rows at {}",
        summary.trials_run,
        summary.policies,
        summary.rows_written,
        summary.jsonl_path.display()
    );
    if summary.degenerate_rows > 0 {
        println!(
            "  {} searches stopped on a degenerate belief (see `error` in the JSONL rows)",
            summary.degenerate_rows
        );
    }
    println!("Summary table: {}", summary.summary_path.display());
    if let Some(plot_path) = summary.plot_path.as_ref() {
        println!("Mean moves delta plot: {}", plot_path.display());
    }
    if let Some(telemetry_path) = summary.telemetry_path.as_ref() {
        println!("Telemetry log: {}", telemetry_path.display());
    }
    if let Some(outputs) = summary.telemetry_outputs.as_ref() {
        println!("Telemetry summary (JSON): {}", outputs.json_path.display());
        println!(
            "Telemetry summary (Markdown): {}",
            outputs.markdown_path.display()
        );
        let searches = &outputs.summary.searches;
        match searches.avg_released {
            Some(released) => println!(
                "  Failed searches: {} events, avg released mass {:.4}",
                searches.count, released
            ),
            None => println!("  Failed searches: {} events captured", searches.count),
        }
        if !outputs.summary.transitions.pair_counts.is_empty() {
            println!(
                "  Transitions: {:?}",
                outputs.summary.transitions.pair_counts
            );
        }
    }

    Ok(())
}
