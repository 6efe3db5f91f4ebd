//! CLI for sweeping, profiling and reporting on pricer builds.
//!
//! # Usage
//!
//! ```bash
//! # Quick smoke sweep of the release build under ./builds
//! cargo run --bin pricer-sweep -- --root ./builds sweep --preset quick
//!
//! # Full grid with profiling, written as it goes, resumable after a crash
//! cargo run --bin pricer-sweep -- --root ./builds sweep --preset full --profile --incremental
//! cargo run --bin pricer-sweep -- --root ./builds sweep --preset full --profile --resume
//!
//! # One profile run of a single point
//! cargo run --bin pricer-sweep -- profile --variant "Polly Clang-4.0" --divs 4 --smoothing
//!
//! # Reports from a finished artifact
//! cargo run --bin pricer-sweep -- show Results/summarySingleThreaded.csv --divs 8
//! ```

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

use pricer_sweep::checkpoint::IncrementalCsvWriter;
use pricer_sweep::extract::{extract, MetricKind, MetricRecord};
use pricer_sweep::invoker::{Invoker, ProcessInvoker, Purpose};
use pricer_sweep::output::{self, comparison_table, to_markdown, variant_section};
use pricer_sweep::sweep::{FailurePolicy, SweepConfig, SweepPreset, SweepRunner};
use pricer_sweep::{ConfigurationPoint, InvokerConfig, PointError, ProjectConfig, ThreadingMode, VariantId};

/// Benchmark sweeps over instrumented finite-difference pricer builds
#[derive(Parser, Debug)]
#[command(name = "pricer-sweep")]
#[command(about = "Collect instruction counts and timings across pricer build variants")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Directory containing one subdirectory per build variant
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Directory for artifacts, reports and call-graph images
    #[arg(long, global = true)]
    results: Option<PathBuf>,

    /// Kill any single invocation running longer than this many seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Show debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only show warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the program's own timing loop for one configuration point
    Profile {
        #[arg(long)]
        variant: String,

        #[arg(long, default_value = "0")]
        divs: u32,

        #[arg(long, default_value = "1000")]
        iterations: u32,

        #[arg(long)]
        smoothing: bool,

        #[arg(long)]
        acceleration: bool,

        /// single or multi
        #[arg(long, default_value = "single")]
        threading: String,

        /// Also count instructions under the instrumentation tool
        #[arg(long)]
        measure: bool,
    },

    /// Sweep a grid of configuration points and write the result table
    Sweep {
        /// Preset grid: quick or full
        #[arg(short, long, default_value = "quick")]
        preset: String,

        /// JSON project file (overrides --preset)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Variants to sweep (comma-separated)
        #[arg(long)]
        variants: Option<String>,

        /// Largest dividend count; 0..=N are swept
        #[arg(long)]
        max_divs: Option<u32>,

        /// single or multi
        #[arg(long)]
        threading: Option<String>,

        /// Also run the program's timing loop at every point
        #[arg(long)]
        profile: bool,

        /// Iterations for profile runs
        #[arg(long)]
        iterations: Option<u32>,

        /// Record failed points with missing metrics instead of aborting
        #[arg(long)]
        continue_on_error: bool,

        /// Render a call-graph image per variant
        #[arg(long)]
        call_graph: bool,

        /// Append rows to the artifact as each point completes
        #[arg(long)]
        incremental: bool,

        /// Keep rows already in the artifact and skip their points. Rows
        /// recorded as failures (every metric missing) are dropped and their
        /// points run again. Implies --incremental.
        #[arg(long)]
        resume: bool,

        /// Artifact path (default: <results>/summary<Threading>.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print reports from a saved artifact
    Show {
        file: PathBuf,

        /// Only this variant's series
        #[arg(long)]
        variant: Option<String>,

        /// Compare all variants at this dividend count
        #[arg(long)]
        divs: Option<u32>,

        #[arg(long, action = clap::ArgAction::Set, default_value_t = false)]
        smoothing: bool,

        #[arg(long, action = clap::ArgAction::Set, default_value_t = false)]
        acceleration: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.global);

    match cli.command {
        Command::Profile {
            ref variant,
            divs,
            iterations,
            smoothing,
            acceleration,
            ref threading,
            measure,
        } => {
            let threading: ThreadingMode = threading.parse().unwrap_or_else(|e| fail(e));
            let point = ConfigurationPoint {
                variant: VariantId::new(variant.as_str()),
                dividends: divs,
                smoothing,
                acceleration,
                threading,
            };
            let invoker = ProcessInvoker::new(invoker_config(InvokerConfig::default(), &cli.global));
            match profile_point(&invoker, &point, iterations, measure) {
                Ok(metrics) => print_metrics(&point, &metrics),
                Err(e) => fail(format!("Point {} failed: {}", point, e)),
            }
        }
        Command::Sweep {
            ref preset,
            ref config,
            ref variants,
            max_divs,
            ref threading,
            profile,
            iterations,
            continue_on_error,
            call_graph,
            incremental,
            resume,
            ref output,
        } => {
            let mut project = match config {
                Some(path) => ProjectConfig::from_json_file(path).unwrap_or_else(|e| fail(e)),
                None => ProjectConfig {
                    sweep: SweepConfig::from_preset(preset).unwrap_or_else(|e| fail(e)),
                    invoker: InvokerConfig::default(),
                },
            };

            // Apply overrides
            let sweep = &mut project.sweep;
            if let Some(list) = variants {
                sweep.preset = SweepPreset::Custom;
                sweep.variants = list
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(VariantId::from)
                    .collect();
            }
            if let Some(max) = max_divs {
                sweep.max_dividends = max;
            }
            if let Some(mode) = threading {
                sweep.threading = mode.parse().unwrap_or_else(|e| fail(e));
            }
            if profile {
                sweep.include_profiling = true;
            }
            if let Some(n) = iterations {
                sweep.profile_iterations = n;
            }
            if continue_on_error {
                sweep.failure_policy = FailurePolicy::Continue;
            }
            if call_graph {
                project.invoker.call_graph = true;
            }
            project.invoker = invoker_config(project.invoker, &cli.global);

            run_sweep(project, output.clone(), incremental || resume, resume);
        }
        Command::Show {
            ref file,
            ref variant,
            divs,
            smoothing,
            acceleration,
        } => {
            let table = output::load(file).unwrap_or_else(|e| fail(e));
            let mut printed = false;
            if let Some(v) = variant {
                println!("{}", variant_section(&table, &VariantId::new(v.as_str())));
                printed = true;
            }
            if let Some(d) = divs {
                println!("{}", comparison_table(&table, d, smoothing, acceleration));
                printed = true;
            }
            if !printed {
                println!("{}", to_markdown(&table));
            }
        }
    }
}

fn init_logging(global: &GlobalArgs) {
    let level = if global.verbose {
        "debug"
    } else if global.quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn invoker_config(mut config: InvokerConfig, global: &GlobalArgs) -> InvokerConfig {
    if let Some(root) = &global.root {
        config.root_dir = root.clone();
    }
    if let Some(results) = &global.results {
        config.results_dir = results.clone();
    }
    if let Some(secs) = global.timeout {
        config.timeout_secs = Some(secs);
    }
    config
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", message);
    std::process::exit(1);
}

fn profile_point(
    invoker: &dyn Invoker,
    point: &ConfigurationPoint,
    iterations: u32,
    measure: bool,
) -> Result<MetricRecord, PointError> {
    let mut metrics = MetricRecord::default();
    if measure {
        let raw = invoker.invoke(point, Purpose::Measure { call_graph: false })?;
        metrics = extract(&raw, MetricKind::Measure)?;
    }
    let raw = invoker.invoke(point, Purpose::Profile { iterations })?;
    Ok(metrics.merge(extract(&raw, MetricKind::Profile)?))
}

fn print_metrics(point: &ConfigurationPoint, metrics: &MetricRecord) {
    let show = |v: Option<String>| v.unwrap_or_else(|| "missing".to_string());
    println!("{}", point);
    println!("  Instructions:      {}", show(metrics.instruction_count.map(|v| v.to_string())));
    println!("  Avg Time/Op (ms):  {}", show(metrics.avg_time_per_op_ms.map(|v| format!("{:.5}", v))));
    println!("  Ops/Sec:           {}", show(metrics.ops_per_second.map(|v| format!("{:.2}", v))));
}

fn format_eta(secs: f64) -> String {
    if secs < 60.0 {
        format!("{:.0}s", secs)
    } else if secs < 3600.0 {
        format!("{}m {}s", (secs / 60.0) as u64, (secs % 60.0) as u64)
    } else {
        format!(
            "{}h {}m",
            (secs / 3600.0) as u64,
            ((secs % 3600.0) / 60.0) as u64
        )
    }
}

fn make_message(progress: f64, task: &str, elapsed_secs: f64) -> String {
    // ETA only after 5% so early estimates don't swing wildly
    if progress > 0.05 {
        let eta_secs = elapsed_secs / progress * (1.0 - progress);
        format!("ETA: {} | {}", format_eta(eta_secs), task)
    } else if progress > 0.0 {
        format!("estimating... | {}", task)
    } else {
        "starting...".to_string()
    }
}

fn run_sweep(project: ProjectConfig, artifact: Option<PathBuf>, incremental: bool, resume: bool) {
    let ProjectConfig { sweep: config, invoker } = project;
    if let Err(e) = config.validate() {
        fail(e);
    }

    if !invoker.results_dir.exists() {
        if let Err(e) = fs::create_dir_all(&invoker.results_dir) {
            fail(format!("Failed to create results directory: {}", e));
        }
    }
    let artifact_path = artifact.unwrap_or_else(|| {
        invoker
            .results_dir
            .join(output::default_file_name(config.threading))
    });

    println!("=== Pricer Benchmark Sweep ===\n");
    println!("Configuration:");
    println!("  Preset: {}", config.preset.name());
    println!(
        "  Variants: {:?}",
        config.variants.iter().map(|v| v.as_str()).collect::<Vec<_>>()
    );
    println!("  Dividends: 0..={}", config.max_dividends);
    println!(
        "  Quadrants: {:?}",
        config.quadrants.iter().map(|q| q.label()).collect::<Vec<_>>()
    );
    println!("  Threading: {}", config.threading);
    if config.include_profiling {
        println!("  Profiling: {} iterations", config.profile_iterations);
    }
    println!("  Root: {}", invoker.root_dir.display());
    if resume {
        println!("  Checkpoint: RESUME (loading existing results)");
    } else if incremental {
        println!("  Checkpoint: INCREMENTAL (writing results as they complete)");
    }
    println!("  Total points: {}", config.total_points());
    println!();

    let checkpoint = if incremental {
        match IncrementalCsvWriter::new(&artifact_path, resume) {
            Ok(writer) => {
                if writer.resumed_count() > 0 {
                    println!(
                        "  Resuming: {} rows loaded from {}",
                        writer.resumed_count(),
                        writer.path().display()
                    );
                }
                if writer.retried_count() > 0 {
                    println!("  Retrying: {} previously failed points", writer.retried_count());
                }
                Some(writer)
            }
            Err(e) => fail(format!("Failed to open checkpoint file: {}", e)),
        }
    } else {
        None
    };

    let call_graph = invoker.call_graph;
    let runner = SweepRunner::new(Box::new(ProcessInvoker::new(invoker))).with_call_graph(call_graph);

    // indicatif's {eta} is meaningless at position 0, so the ETA lives in the message.
    let total = config.total_points();
    let progress_bar = ProgressBar::new(total as u64);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) | {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    progress_bar.enable_steady_tick(Duration::from_millis(100));
    progress_bar.set_message("starting...");

    let start = Instant::now();
    let result = runner.run_with_checkpoint(&config, checkpoint.as_ref(), |progress, task| {
        progress_bar.set_position((progress * total as f64).round() as u64);
        progress_bar.set_message(make_message(progress, task, start.elapsed().as_secs_f64()));
    });

    let results = match result {
        Ok(results) => {
            progress_bar.finish_with_message("Complete!");
            results
        }
        Err(e) => {
            progress_bar.abandon_with_message("Failed");
            if checkpoint.is_some() {
                eprintln!(
                    "Partial results kept in {}; rerun with --resume to finish",
                    artifact_path.display()
                );
            }
            fail(format!("Sweep failed: {}", e));
        }
    };

    println!("\nCompleted in {:.1}s\n", results.total_time.as_secs_f64());

    if checkpoint.is_some() {
        println!("Rows already written to: {}", artifact_path.display());
    } else if let Err(e) = output::save(&results.table, &artifact_path) {
        fail(format!("Failed to write artifact: {}", e));
    } else {
        println!("Wrote results to: {}", artifact_path.display());
    }

    let report_path = artifact_path.with_extension("md");
    match output::write_report(&results.table, &report_path) {
        Ok(()) => println!("Wrote report to: {}", report_path.display()),
        Err(e) => eprintln!("Failed to write markdown report: {}", e),
    }

    if !results.failures.is_empty() {
        eprintln!("\n{} point(s) failed and were recorded with missing metrics:", results.failures.len());
        for failure in &results.failures {
            eprintln!("  {}: {}", failure.point, failure.error);
        }
    }
}
