//! Benchmark sweep orchestration for instrumented pricer builds.
//!
//! This crate drives an external finite-difference pricing program across a
//! grid of build variants, dividend counts and algorithmic toggles, runs each
//! point under an instruction-counting tool (and optionally the program's own
//! timing loop), and collects one typed row per point into a result table.
//!
//! # Modules
//!
//! - [`types`]: Grid coordinates (variants, quadrants, threading mode)
//! - [`invoker`]: Launching the external program and capturing its output
//! - [`extract`]: Turning captured text into typed metrics
//! - [`sweep`]: Sweep configuration, enumeration and the sequential runner
//! - [`table`]: The accumulated result table
//! - [`output`]: CSV artifact and markdown reports
//! - [`checkpoint`]: Incremental artifact writing and resumability
//! - [`config`]: Invocation settings and JSON project files
//! - [`error`]: Error types
//!
//! # Quick Start
//!
//! ```ignore
//! use pricer_sweep::{
//!     sweep::{SweepConfig, SweepRunner},
//!     InvokerConfig, ProcessInvoker,
//! };
//!
//! let invoker = ProcessInvoker::new(InvokerConfig {
//!     root_dir: "/opt/pricer-builds".into(),
//!     ..InvokerConfig::default()
//! });
//! let runner = SweepRunner::new(Box::new(invoker));
//!
//! let results = runner.run(&SweepConfig::full(), |progress, task| {
//!     println!("{:.0}% - {}", progress * 100.0, task);
//! })?;
//!
//! println!("{}", pricer_sweep::output::to_markdown(&results.table));
//! ```

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod extract;
pub mod invoker;
pub mod output;
pub mod sweep;
pub mod table;
pub mod types;

pub use config::{ArtifactLocation, InvokerConfig, ProjectConfig};
pub use error::{
    ConfigurationError, ExtractionError, InvocationError, PersistenceError, PointError,
    SweepError,
};
pub use extract::{extract, MetricKind, MetricRecord};
pub use invoker::{Invoker, ProcessInvoker, Purpose, RawRunOutput};
pub use sweep::{enumerate, FailurePolicy, SweepConfig, SweepPreset, SweepResults, SweepRunner};
pub use table::{AxisFilter, ResultRow, ResultTable};
pub use types::{ConfigurationPoint, Quadrant, ThreadingMode, VariantId};
