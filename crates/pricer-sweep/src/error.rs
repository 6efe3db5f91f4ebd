//! Error taxonomy for sweeps.
//!
//! Every variant here aborts the sweep it occurs in unless the runner was
//! configured with [`FailurePolicy::Continue`](crate::sweep::FailurePolicy),
//! in which case per-point failures are recorded instead.

use std::path::PathBuf;
use std::time::Duration;

use crate::types::{ConfigurationPoint, ThreadingMode};

/// The external process could not be run to completion, or it left an
/// ambiguous measurement behind.
#[derive(Debug, thiserror::Error)]
pub enum InvocationError {
    #[error("working directory {} does not exist", .0.display())]
    MissingWorkingDir(PathBuf),

    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("expected exactly one `{pattern}` artifact in {}, found {found}", .dir.display())]
    ArtifactCount {
        dir: PathBuf,
        pattern: String,
        found: usize,
    },

    #[error("`{program}` did not finish within {timeout:?} and was killed")]
    Timeout { program: String, timeout: Duration },

    #[error("I/O error while running `{program}`: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// A metric the caller requires could not be read from captured output.
#[derive(Debug, thiserror::Error)]
#[error("could not extract {metric} from line {line}: {reason}\n--- captured output ---\n{output}")]
pub struct ExtractionError {
    /// Name of the metric (column name).
    pub metric: &'static str,
    /// Zero-based line offset the metric was expected on.
    pub line: usize,
    pub reason: String,
    /// The raw text the metric was searched in.
    pub output: String,
}

/// An unsupported axis value or sweep shape, detected before any launch.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("unknown threading mode '{0}' (expected single or multi)")]
    UnknownThreadingMode(String),

    #[error("unknown quadrant '{0}' (expected none, smoothing, acceleration or all)")]
    UnknownQuadrant(String),

    #[error("unknown preset '{0}' (expected quick or full)")]
    UnknownPreset(String),

    #[error("sweep has no variants")]
    NoVariants,

    #[error("variant '{0}' appears more than once")]
    DuplicateVariant(String),

    #[error("sweep has no smoothing/acceleration quadrants")]
    NoQuadrants,

    #[error("quadrant '{0}' appears more than once")]
    DuplicateQuadrant(&'static str),

    #[error("profile iteration count must be positive")]
    ZeroIterations,

    #[error("multi-threaded points are not instrumented; enable profiling to measure them")]
    MultiWithoutProfiling,

    #[error("{0} threading cannot run under the instrumentation tool")]
    UninstrumentedThreading(ThreadingMode),

    #[error("invalid configuration file {}: {message}", .path.display())]
    InvalidFile { path: PathBuf, message: String },
}

/// The persisted artifact could not be read or written.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed artifact {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("artifact {} has unexpected header {found:?}", .path.display())]
    Header { path: PathBuf, found: Vec<String> },
}

/// Failure of a single configuration point.
#[derive(Debug, thiserror::Error)]
pub enum PointError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Invocation(#[from] InvocationError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

/// Top-level error returned by sweeps.
#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("point {point} failed: {source}")]
    Point {
        point: ConfigurationPoint,
        #[source]
        source: PointError,
    },
}

impl SweepError {
    pub fn point(point: &ConfigurationPoint, source: impl Into<PointError>) -> Self {
        Self::Point {
            point: point.clone(),
            source: source.into(),
        }
    }
}
