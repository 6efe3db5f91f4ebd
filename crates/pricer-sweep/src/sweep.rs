//! Sweep definition, enumeration and execution.
//!
//! This module provides:
//! - `SweepConfig`: the grid to sweep, with presets
//! - [`enumerate`]: the ordered configuration points of a grid
//! - `SweepRunner`: sequential execution of points through an [`Invoker`]
//! - `SweepResults`: the result table plus run bookkeeping
//!
//! # Example
//!
//! ```ignore
//! use pricer_sweep::sweep::{SweepConfig, SweepRunner};
//! use pricer_sweep::{InvokerConfig, ProcessInvoker};
//!
//! let config = SweepConfig::quick();
//! let runner = SweepRunner::new(Box::new(ProcessInvoker::new(InvokerConfig::default())));
//!
//! let results = runner.run(&config, |progress, task| {
//!     println!("{:.0}% - {}", progress * 100.0, task);
//! })?;
//!
//! pricer_sweep::output::save(&results.table, "summarySingleThreaded.csv".as_ref())?;
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::{Duration, Instant};

use crate::checkpoint::{IncrementalCsvWriter, PointKey};
use crate::error::{ConfigurationError, PointError, SweepError};
use crate::extract::{extract, MetricKind, MetricRecord};
use crate::invoker::{Invoker, Purpose};
use crate::table::{ResultRow, ResultTable};
use crate::types::{ConfigurationPoint, Quadrant, ThreadingMode, VariantId};

/// Standard compiler/optimizer builds, in report order.
pub const STANDARD_VARIANTS: [&str; 9] = [
    "Release",
    "Release GCC-7.1",
    "Optimized GCC-7.1",
    "Graphite GCC-7.1",
    "Release Clang-4.0",
    "Optimized Clang-4.0",
    "Polly Clang-4.0",
    "Release Intel",
    "Optimized Intel",
];

/// Preset levels for sweep size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepPreset {
    /// One variant, dividends 0..=2, no improvements.
    #[default]
    Quick,
    /// All standard variants, dividends 0..=8, every quadrant.
    Full,
    /// Built by hand or from a project file.
    Custom,
}

impl SweepPreset {
    pub fn name(&self) -> &'static str {
        match self {
            SweepPreset::Quick => "quick",
            SweepPreset::Full => "full",
            SweepPreset::Custom => "custom",
        }
    }
}

/// What to do when a point fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Abort the sweep on the first failure; no table is returned.
    #[default]
    FailFast,
    /// Record the failure, append a row with every metric missing, go on.
    Continue,
}

/// Configuration for a sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Preset level (informational)
    pub preset: SweepPreset,
    pub variants: Vec<VariantId>,
    /// Dividend counts 0..=max_dividends are swept.
    pub max_dividends: u32,
    /// Smoothing/acceleration combinations, in sweep order.
    pub quadrants: Vec<Quadrant>,
    pub threading: ThreadingMode,
    /// Also run the program's own timing loop for each point.
    pub include_profiling: bool,
    /// Iterations for profile runs.
    pub profile_iterations: u32,
    pub failure_policy: FailurePolicy,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self::quick()
    }
}

impl SweepConfig {
    /// Smoke-test sweep of the plain release build.
    pub fn quick() -> Self {
        Self {
            preset: SweepPreset::Quick,
            variants: vec![VariantId::new(STANDARD_VARIANTS[0])],
            max_dividends: 2,
            quadrants: vec![Quadrant::None],
            threading: ThreadingMode::Single,
            include_profiling: false,
            profile_iterations: 1_000,
            failure_policy: FailurePolicy::FailFast,
        }
    }

    /// The complete benchmark grid: 9 variants × 9 dividend counts × 4 quadrants.
    pub fn full() -> Self {
        Self {
            preset: SweepPreset::Full,
            variants: STANDARD_VARIANTS.iter().map(|v| VariantId::new(*v)).collect(),
            max_dividends: 8,
            quadrants: Quadrant::ALL.to_vec(),
            threading: ThreadingMode::Single,
            include_profiling: true,
            profile_iterations: 10_000,
            failure_policy: FailurePolicy::FailFast,
        }
    }

    pub fn from_preset(name: &str) -> Result<Self, ConfigurationError> {
        match name.to_lowercase().as_str() {
            "quick" => Ok(Self::quick()),
            "full" => Ok(Self::full()),
            other => Err(ConfigurationError::UnknownPreset(other.to_string())),
        }
    }

    /// Reject grids that could not produce a meaningful table.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.variants.is_empty() {
            return Err(ConfigurationError::NoVariants);
        }
        let mut seen = HashSet::new();
        for v in &self.variants {
            if !seen.insert(v) {
                return Err(ConfigurationError::DuplicateVariant(v.to_string()));
            }
        }

        if self.quadrants.is_empty() {
            return Err(ConfigurationError::NoQuadrants);
        }
        let mut seen = HashSet::new();
        for q in &self.quadrants {
            if !seen.insert(q) {
                return Err(ConfigurationError::DuplicateQuadrant(q.label()));
            }
        }

        if self.include_profiling && self.profile_iterations == 0 {
            return Err(ConfigurationError::ZeroIterations);
        }
        if self.threading == ThreadingMode::Multi && !self.include_profiling {
            return Err(ConfigurationError::MultiWithoutProfiling);
        }
        Ok(())
    }

    /// Number of configuration points in the grid.
    pub fn total_points(&self) -> usize {
        self.variants.len() * (self.max_dividends as usize + 1) * self.quadrants.len()
    }

    /// Validated, ordered points of this grid.
    pub fn points(&self) -> Result<Vec<ConfigurationPoint>, ConfigurationError> {
        self.validate()?;
        Ok(enumerate(
            &self.variants,
            self.max_dividends,
            &self.quadrants,
            self.threading,
        ))
    }
}

/// Every point of the grid: variants outermost, then quadrants in the
/// given order, then dividend counts ascending.
///
/// Pure and deterministic; duplicates in the inputs yield duplicate points,
/// so callers should go through [`SweepConfig::points`].
pub fn enumerate(
    variants: &[VariantId],
    max_dividends: u32,
    quadrants: &[Quadrant],
    threading: ThreadingMode,
) -> Vec<ConfigurationPoint> {
    variants
        .iter()
        .flat_map(|variant| {
            quadrants.iter().flat_map(move |quadrant| {
                (0..=max_dividends).map(move |dividends| ConfigurationPoint {
                    variant: variant.clone(),
                    dividends,
                    smoothing: quadrant.smoothing(),
                    acceleration: quadrant.acceleration(),
                    threading,
                })
            })
        })
        .collect()
}

/// Multi-threaded points skip the instrumentation tool, so without
/// profiling they would yield a row with every metric missing.
fn nothing_to_measure(config: &SweepConfig, point: &ConfigurationPoint) -> bool {
    point.threading != ThreadingMode::Single && !config.include_profiling
}

/// A point that failed under [`FailurePolicy::Continue`].
#[derive(Debug)]
pub struct PointFailure {
    pub point: ConfigurationPoint,
    pub error: PointError,
}

/// Outcome of a sweep.
#[derive(Debug)]
pub struct SweepResults {
    pub table: ResultTable,
    pub config: SweepConfig,
    /// Points that failed and were recorded with missing metrics.
    pub failures: Vec<PointFailure>,
    /// Rows carried over from a checkpoint rather than run now.
    pub resumed: usize,
    pub total_time: Duration,
}

/// Sequential sweep runner.
///
/// Points run strictly one at a time: the instruction counts are only
/// comparable without contention from concurrent runs.
pub struct SweepRunner {
    invoker: Box<dyn Invoker>,
    call_graph: bool,
}

impl SweepRunner {
    pub fn new(invoker: Box<dyn Invoker>) -> Self {
        Self {
            invoker,
            call_graph: false,
        }
    }

    /// Request a call-graph image with every measurement.
    pub fn with_call_graph(mut self, call_graph: bool) -> Self {
        self.call_graph = call_graph;
        self
    }

    /// Run every point of `config` and collect one row per point.
    pub fn run<F>(&self, config: &SweepConfig, progress: F) -> Result<SweepResults, SweepError>
    where
        F: FnMut(f64, &str),
    {
        self.run_with_checkpoint(config, None, progress)
    }

    /// Run the sweep with optional incremental writing and resume.
    ///
    /// With a checkpoint, rows already on disk are kept at the top of the
    /// table, their points are skipped, and each new row is flushed to disk
    /// as soon as it is complete.
    pub fn run_with_checkpoint<F>(
        &self,
        config: &SweepConfig,
        checkpoint: Option<&IncrementalCsvWriter>,
        progress: F,
    ) -> Result<SweepResults, SweepError>
    where
        F: FnMut(f64, &str),
    {
        let points = config.points()?;
        self.run_points(&points, config, checkpoint, progress)
    }

    /// Run an explicit point sequence in the given order.
    ///
    /// `config` supplies the profiling and failure settings only; its grid
    /// is ignored and `points` is not checked for duplicates.
    pub fn run_points<F>(
        &self,
        points: &[ConfigurationPoint],
        config: &SweepConfig,
        checkpoint: Option<&IncrementalCsvWriter>,
        mut progress: F,
    ) -> Result<SweepResults, SweepError>
    where
        F: FnMut(f64, &str),
    {
        if let Some(point) = points.iter().find(|p| nothing_to_measure(config, p)) {
            tracing::error!(point = %point, "point would produce no metric");
            return Err(ConfigurationError::MultiWithoutProfiling.into());
        }
        if config.include_profiling && config.profile_iterations == 0 {
            return Err(ConfigurationError::ZeroIterations.into());
        }

        let start = Instant::now();
        let total = points.len();

        let mut table = ResultTable::new();
        let mut failures = Vec::new();
        let mut resumed = 0;

        if let Some(writer) = checkpoint {
            table.append(writer.resumed().clone());
            resumed = writer.resumed_count();
            if resumed > 0 {
                progress(
                    resumed as f64 / total.max(1) as f64,
                    &format!("Resuming ({} already complete)...", resumed),
                );
            }
        }

        let pending: Vec<&ConfigurationPoint> = points
            .iter()
            .filter(|p| {
                checkpoint.map_or(true, |w| !w.is_completed(&PointKey::from_point(p)))
            })
            .collect();
        let mut done = total - pending.len();

        for point in pending {
            let row = match self.run_point(config, point) {
                Ok(metrics) => ResultRow::new(point, metrics),
                Err(error) => match config.failure_policy {
                    FailurePolicy::FailFast => {
                        tracing::error!(point = %point, error = %error, "aborting sweep");
                        return Err(SweepError::point(point, error));
                    }
                    FailurePolicy::Continue => {
                        tracing::warn!(point = %point, error = %error, "point failed; recording missing metrics");
                        failures.push(PointFailure {
                            point: point.clone(),
                            error,
                        });
                        ResultRow::new(point, MetricRecord::default())
                    }
                },
            };

            if let Some(writer) = checkpoint {
                writer.write_row(&row)?;
            }
            tracing::info!(
                variant = %row.variant,
                dividends = row.dividends,
                tag = %row.sweep_tag,
                instructions = ?row.instruction_count,
                "point complete"
            );
            table.push(row);

            done += 1;
            progress(done as f64 / total.max(1) as f64, &point.to_string());
        }

        progress(1.0, "Complete");

        Ok(SweepResults {
            table,
            config: config.clone(),
            failures,
            resumed,
            total_time: start.elapsed(),
        })
    }

    /// Measure (single-threaded only), optionally profile, and merge.
    pub fn run_point(
        &self,
        config: &SweepConfig,
        point: &ConfigurationPoint,
    ) -> Result<MetricRecord, PointError> {
        if nothing_to_measure(config, point) {
            return Err(ConfigurationError::MultiWithoutProfiling.into());
        }
        let mut metrics = MetricRecord::default();

        if point.threading == ThreadingMode::Single {
            let raw = self.invoker.invoke(
                point,
                Purpose::Measure {
                    call_graph: self.call_graph,
                },
            )?;
            tracing::debug!(point = %point, elapsed = ?raw.elapsed, "measurement finished");
            metrics = extract(&raw, MetricKind::Measure)?;
        }

        if config.include_profiling {
            let raw = self.invoker.invoke(
                point,
                Purpose::Profile {
                    iterations: config.profile_iterations,
                },
            )?;
            tracing::debug!(point = %point, elapsed = ?raw.elapsed, "profile run finished");
            metrics = metrics.merge(extract(&raw, MetricKind::Profile)?);
        }

        Ok(metrics)
    }
}
