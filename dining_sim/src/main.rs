//! Dining philosophers simulator CLI
//!
//! Runs deterministic scenarios on a virtual clock, or the engine live on
//! wall-clock time with `--live`.

use anyhow::{bail, Context, Result};
use clap::Parser;
use dining_core::{EngineConfig, SimulationEngine, TracingObserver};
use dining_sim::{ScenarioId, ScenarioResult, ScenarioRunner};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Dining philosophers simulation CLI
#[derive(Parser, Debug)]
#[command(name = "dining-sim")]
#[command(about = "Run the dining philosophers engine deterministically or live", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Number of consecutive seeds to run (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Scenario to run (cold_start, stop_mid_meal, adjacent_contention,
    /// shuffled_ties, large_ring, pair, reset_cycle, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Maximum simulation duration in seconds
    #[arg(short, long, default_value = "60")]
    duration: f64,

    /// Number of philosophers (ignored by scenarios that fix the table size)
    #[arg(short = 'n', long)]
    philosophers: Option<usize>,

    /// Engine configuration as JSON
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export frames and events of a single scenario to a JSON file
    #[arg(long)]
    export: Option<PathBuf>,

    /// Run the engine on real time instead of the virtual clock
    #[arg(long)]
    live: bool,

    /// Table report interval in live mode (milliseconds)
    #[arg(long, default_value = "1000")]
    report_ms: u64,
}

fn load_config(args: &Args) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(n) = args.philosophers {
        config = config.with_philosophers(n);
    }
    config.validate()?;
    Ok(config)
}

/// Converts `--duration` to a `Duration`, rejecting negative, NaN and
/// out-of-range values.
fn parse_duration(secs: f64) -> Result<Duration> {
    match Duration::try_from_secs_f64(secs) {
        Ok(duration) => Ok(duration),
        Err(e) => bail!("invalid --duration {secs}: {e}"),
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;
    Ok(())
}

/// Runs the engine on the Tokio clock and prints the table periodically.
async fn run_live(config: EngineConfig, duration: Duration, report: Duration) -> Result<()> {
    let engine =
        SimulationEngine::on_current_runtime(config)?.with_observer(Arc::new(TracingObserver));
    engine.start();

    let mut ticker = tokio::time::interval(report.max(Duration::from_millis(10)));
    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = ticker.tick() => {
                let snapshot = engine.snapshot();
                info!("t={:>7}ms  {}", snapshot.at_ms, snapshot.table_line());
            }
        }
    }

    let snapshot = engine.snapshot();
    engine.stop();
    info!(
        "Stopped at {}ms, {} meals, {} failed acquires",
        snapshot.at_ms,
        snapshot.philosophers.iter().map(|p| p.meals).sum::<u64>(),
        snapshot.philosophers.iter().map(|p| p.failed_attempts).sum::<u64>(),
    );
    Ok(())
}

fn report(result: &ScenarioResult) {
    if result.passed {
        info!(
            "✓ {} (seed={}) PASSED - {} meals, max {} eating",
            result.scenario.name(),
            result.seed,
            result.metrics.meals,
            result.metrics.max_concurrent_eaters
        );
    } else {
        error!(
            "✗ {} (seed={}) FAILED: {}",
            result.scenario.name(),
            result.seed,
            result.failure_reason.as_deref().unwrap_or("unknown")
        );
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;
    let config = load_config(&args)?;
    let duration = parse_duration(args.duration)?;

    if args.live {
        info!("Running {} philosophers live for {:.1}s", config.num_philosophers, args.duration);
        let runtime = tokio::runtime::Runtime::new()?;
        return runtime.block_on(run_live(
            config,
            duration,
            Duration::from_millis(args.report_ms),
        ));
    }

    if !args.json {
        info!("Dining philosophers simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        match args.scenario.parse() {
            Ok(scenario) => vec![scenario],
            Err(e) => bail!("{e} (available: {})", available_scenarios()),
        }
    };

    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1)
    } else {
        args.seed
    };

    if let Some(export_path) = &args.export {
        let [scenario] = scenarios.as_slice() else {
            bail!("--export only supports a single scenario, not 'all'");
        };

        let runner = ScenarioRunner::new(base_seed)
            .with_config(config)
            .with_duration(duration);
        let (result, export) = runner.run_with_export(*scenario);
        export
            .write_to_file(export_path)
            .with_context(|| format!("writing {}", export_path.display()))?;
        info!("Exported {} frames to {}", export.frames.len(), export_path.display());

        report(&result);
        if !result.passed {
            std::process::exit(1);
        }
        return Ok(());
    }

    let mut all_results: Vec<ScenarioResult> = Vec::new();
    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = ScenarioRunner::new(seed)
            .with_config(config.clone())
            .with_duration(duration);

        for scenario in &scenarios {
            if args.philosophers.is_some() && scenario.overrides_size() {
                warn!("{} ignores --philosophers", scenario.name());
            }
            let result = runner.run(*scenario);
            if !args.json {
                report(&result);
            }
            all_results.push(result);
        }
    }

    let total = all_results.len();
    let failed_count = all_results.iter().filter(|r| !r.passed).count();

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed_count,
            "failed": failed_count,
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "time_secs": r.final_time_secs,
                    "failure_reason": r.failure_reason,
                    "metrics": r.metrics,
                })
            }).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);
        }
    }

    if failed_count > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn available_scenarios() -> String {
    let mut names: Vec<&str> = ScenarioId::all().iter().map(|s| s.name()).collect();
    names.push("all");
    names.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_accepts_fractional_seconds() {
        assert_eq!(parse_duration(1.5).unwrap(), Duration::from_millis(1_500));
        assert_eq!(parse_duration(0.0).unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_parse_duration_rejects_unrepresentable_values() {
        for secs in [f64::INFINITY, f64::NAN, -1.0, 1e30] {
            let err = parse_duration(secs).unwrap_err();
            assert!(err.to_string().contains("invalid --duration"), "{err}");
        }
    }
}
