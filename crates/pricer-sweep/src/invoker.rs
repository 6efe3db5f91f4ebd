//! Launching the instrumented program, with or without the instrumentation tool.
//!
//! # Design
//!
//! - The variant's directory is handed to [`Command::current_dir`]; the
//!   process-wide working directory is never touched.
//! - stdout and stderr are redirected to files in a per-invocation scratch
//!   directory, so a timed wait can poll the child without pipes filling up.
//! - A measurement must leave exactly one side-effect artifact. Anything
//!   else fails the point, and no artifact survives the call on any path.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use crate::config::{ArtifactLocation, InvokerConfig};
use crate::error::{ConfigurationError, InvocationError, PointError};
use crate::types::{ConfigurationPoint, ThreadingMode, VariantId};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// What an invocation is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    /// Count retired instructions under the instrumentation tool.
    Measure {
        /// Also render a call-graph image for the variant.
        call_graph: bool,
    },
    /// Run the program's own timing loop.
    Profile { iterations: u32 },
}

/// Captured text of one invocation.
#[derive(Debug, Clone, Default)]
pub struct RawRunOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Where the measurement artifact was found. The file itself is removed
    /// before the invocation returns.
    pub artifact: Option<PathBuf>,
    pub elapsed: Duration,
}

impl RawRunOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs one configuration point.
pub trait Invoker: Send + Sync {
    fn invoke(
        &self,
        point: &ConfigurationPoint,
        purpose: Purpose,
    ) -> Result<RawRunOutput, PointError>;
}

impl<T: Invoker + ?Sized> Invoker for Arc<T> {
    fn invoke(
        &self,
        point: &ConfigurationPoint,
        purpose: Purpose,
    ) -> Result<RawRunOutput, PointError> {
        (**self).invoke(point, purpose)
    }
}

/// [`Invoker`] backed by real child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessInvoker {
    config: InvokerConfig,
}

impl ProcessInvoker {
    pub fn new(config: InvokerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &InvokerConfig {
        &self.config
    }

    /// Absolute variant directory. Children run with it as their cwd, so a
    /// relative path would be resolved a second time against itself.
    fn working_dir(&self, variant: &VariantId) -> Result<PathBuf, InvocationError> {
        let dir = variant.dir(&self.config.root_dir);
        match fs::canonicalize(&dir) {
            Ok(abs) if abs.is_dir() => Ok(abs),
            _ => Err(InvocationError::MissingWorkingDir(dir)),
        }
    }

    fn measure(
        &self,
        point: &ConfigurationPoint,
        call_graph: bool,
    ) -> Result<RawRunOutput, PointError> {
        if point.threading != ThreadingMode::Single {
            return Err(ConfigurationError::UninstrumentedThreading(point.threading).into());
        }

        let work_dir = self.working_dir(&point.variant)?;
        let scratch = scratch_dir(&self.config.valgrind)?;

        // Both bindings must outlive every return below: dropping them is
        // what removes the artifacts.
        let (artifact_dir, _purge) = match self.config.artifact_location {
            ArtifactLocation::Scratch => (scratch.path().to_path_buf(), None),
            ArtifactLocation::WorkingDir => {
                let stale = purge_leftovers(&work_dir, &self.config);
                if stale > 0 {
                    tracing::warn!(
                        dir = %work_dir.display(),
                        stale,
                        "removed artifacts left over from an earlier run"
                    );
                }
                (
                    work_dir.clone(),
                    Some(PurgeGuard {
                        dir: work_dir.clone(),
                        config: &self.config,
                    }),
                )
            }
        };

        let mut args = vec![
            "--tool=callgrind".to_string(),
            "--instr-atstart=no".to_string(),
        ];
        if self.config.artifact_location == ArtifactLocation::Scratch {
            args.push(format!(
                "--callgrind-out-file={}",
                artifact_dir
                    .join(format!("{}.%p", self.config.artifact_prefix))
                    .display()
            ));
        }
        args.push(
            work_dir
                .join(&self.config.executable)
                .to_string_lossy()
                .into_owned(),
        );
        args.extend(program_args(point, self.config.measure_iterations));

        tracing::debug!(
            variant = %point.variant,
            dividends = point.dividends,
            smoothing = point.smoothing,
            acceleration = point.acceleration,
            "launching instrumented measurement"
        );

        let mut raw = run_captured(
            &self.config.valgrind,
            &args,
            &work_dir,
            scratch.path(),
            "measure",
            self.config.timeout(),
        )?;
        if !raw.success() {
            tracing::warn!(
                variant = %point.variant,
                exit_code = ?raw.exit_code,
                "instrumentation tool exited unsuccessfully; extracting anyway"
            );
        }

        let artifact = find_single_artifact(&artifact_dir, &self.config)?;
        if call_graph {
            self.render_call_graph(&artifact, &point.variant, scratch.path());
        }
        raw.artifact = Some(artifact);
        Ok(raw)
    }

    fn profile(
        &self,
        point: &ConfigurationPoint,
        iterations: u32,
    ) -> Result<RawRunOutput, PointError> {
        if iterations == 0 {
            return Err(ConfigurationError::ZeroIterations.into());
        }
        let work_dir = self.working_dir(&point.variant)?;
        let program = work_dir.join(&self.config.executable);
        let program = program.to_string_lossy();
        let scratch = scratch_dir(&program)?;

        tracing::debug!(
            variant = %point.variant,
            dividends = point.dividends,
            threading = %point.threading,
            iterations,
            "launching profile run"
        );

        let raw = run_captured(
            &program,
            &program_args(point, iterations),
            &work_dir,
            scratch.path(),
            "profile",
            self.config.timeout(),
        )?;
        if !raw.success() {
            tracing::warn!(
                variant = %point.variant,
                exit_code = ?raw.exit_code,
                "profile run exited unsuccessfully; extracting anyway"
            );
        }
        Ok(raw)
    }

    /// Best effort: failures are logged and never fail the point.
    ///
    /// Both renderers run inside `scratch`, so every path handed to them
    /// is absolute.
    fn render_call_graph(&self, artifact: &Path, variant: &VariantId, scratch: &Path) {
        let dot_file = scratch.join("out.dot");

        if let Err(e) = fs::create_dir_all(&self.config.results_dir) {
            tracing::warn!(dir = %self.config.results_dir.display(), error = %e, "cannot create results directory");
            return;
        }
        let results_dir = match fs::canonicalize(&self.config.results_dir) {
            Ok(dir) => dir,
            Err(e) => {
                tracing::warn!(dir = %self.config.results_dir.display(), error = %e, "cannot resolve results directory");
                return;
            }
        };
        let image = results_dir.join(format!("{}.png", variant));
        let artifact = fs::canonicalize(artifact).unwrap_or_else(|_| artifact.to_path_buf());

        let gprof = run_captured(
            &self.config.gprof2dot,
            &[
                "--format=callgrind".to_string(),
                format!("--output={}", dot_file.display()),
                artifact.to_string_lossy().into_owned(),
            ],
            scratch,
            scratch,
            "gprof2dot",
            self.config.timeout(),
        );
        match gprof {
            Ok(raw) if raw.success() && dot_file.is_file() => {}
            Ok(raw) => {
                tracing::warn!(exit_code = ?raw.exit_code, stderr = %raw.stderr.trim(), "gprof2dot produced no graph");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "call-graph conversion skipped");
                return;
            }
        }

        let render = run_captured(
            &self.config.dot,
            &[
                "-Tpng".to_string(),
                dot_file.to_string_lossy().into_owned(),
                "-o".to_string(),
                image.to_string_lossy().into_owned(),
            ],
            scratch,
            scratch,
            "dot",
            self.config.timeout(),
        );
        match render {
            Ok(raw) if raw.success() => {
                tracing::info!(image = %image.display(), "rendered call graph");
            }
            Ok(raw) => {
                tracing::warn!(exit_code = ?raw.exit_code, stderr = %raw.stderr.trim(), "dot failed to render call graph");
            }
            Err(e) => tracing::warn!(error = %e, "call-graph rendering skipped"),
        }
    }
}

impl Invoker for ProcessInvoker {
    fn invoke(
        &self,
        point: &ConfigurationPoint,
        purpose: Purpose,
    ) -> Result<RawRunOutput, PointError> {
        match purpose {
            Purpose::Measure { call_graph } => self.measure(point, call_graph),
            Purpose::Profile { iterations } => self.profile(point, iterations),
        }
    }
}

/// Arguments understood by the instrumented program's profile mode.
pub fn program_args(point: &ConfigurationPoint, iterations: u32) -> Vec<String> {
    let mut args = vec![
        "-profile".to_string(),
        "-iter".to_string(),
        iterations.to_string(),
        "-divs".to_string(),
        point.dividends.to_string(),
    ];
    if point.smoothing {
        args.push("-smooth".to_string());
    }
    if point.acceleration {
        args.push("-acc".to_string());
    }
    args.push("-method".to_string());
    args.push(point.threading.as_str().to_string());
    args
}

fn scratch_dir(program: &str) -> Result<TempDir, InvocationError> {
    tempfile::Builder::new()
        .prefix("pricer-sweep-")
        .tempdir()
        .map_err(|source| InvocationError::Io {
            program: program.to_string(),
            source,
        })
}

/// Run `program` in `cwd`, capturing both streams into `capture_dir`.
fn run_captured(
    program: &str,
    args: &[String],
    cwd: &Path,
    capture_dir: &Path,
    tag: &str,
    timeout: Option<Duration>,
) -> Result<RawRunOutput, InvocationError> {
    let io_err = |source| InvocationError::Io {
        program: program.to_string(),
        source,
    };

    let stdout_path = capture_dir.join(format!("{}.stdout", tag));
    let stderr_path = capture_dir.join(format!("{}.stderr", tag));
    let stdout_file = File::create(&stdout_path).map_err(io_err)?;
    let stderr_file = File::create(&stderr_path).map_err(io_err)?;

    let start = Instant::now();
    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout_file))
        .stderr(Stdio::from(stderr_file))
        .spawn()
        .map_err(|source| InvocationError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let status = wait_for_child(&mut child, program, timeout)?;
    let elapsed = start.elapsed();

    let stdout = fs::read(&stdout_path).map_err(io_err)?;
    let stderr = fs::read(&stderr_path).map_err(io_err)?;

    Ok(RawRunOutput {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_code: status.code(),
        artifact: None,
        elapsed,
    })
}

fn wait_for_child(
    child: &mut Child,
    program: &str,
    timeout: Option<Duration>,
) -> Result<ExitStatus, InvocationError> {
    let io_err = |source| InvocationError::Io {
        program: program.to_string(),
        source,
    };

    let Some(timeout) = timeout else {
        return child.wait().map_err(io_err);
    };

    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait().map_err(io_err)? {
            return Ok(status);
        }
        if started.elapsed() >= timeout {
            let _ = child.kill();
            child.wait().map_err(io_err)?;
            return Err(InvocationError::Timeout {
                program: program.to_string(),
                timeout,
            });
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// The single artifact in `dir`, or an error naming how many were found.
pub fn find_single_artifact(dir: &Path, config: &InvokerConfig) -> Result<PathBuf, InvocationError> {
    let entries = fs::read_dir(dir).map_err(|source| InvocationError::Io {
        program: config.valgrind.clone(),
        source,
    })?;

    let mut found: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|entry| config.is_artifact(&entry.file_name().to_string_lossy()))
        .map(|entry| entry.path())
        .collect();

    if found.len() == 1 {
        Ok(found.remove(0))
    } else {
        Err(InvocationError::ArtifactCount {
            dir: dir.to_path_buf(),
            pattern: format!("{}*{}", config.artifact_prefix, config.artifact_suffix),
            found: found.len(),
        })
    }
}

/// Remove every instrumentation leftover in `dir`; returns how many went.
pub fn purge_leftovers(dir: &Path, config: &InvokerConfig) -> usize {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    let mut removed = 0;
    for entry in entries.filter_map(|e| e.ok()) {
        let name = entry.file_name();
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if is_file && config.is_leftover(&name.to_string_lossy()) {
            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(file = %entry.path().display(), error = %e, "could not remove artifact"),
            }
        }
    }
    removed
}

/// Purges a working directory when dropped.
struct PurgeGuard<'a> {
    dir: PathBuf,
    config: &'a InvokerConfig,
}

impl Drop for PurgeGuard<'_> {
    fn drop(&mut self) {
        purge_leftovers(&self.dir, self.config);
    }
}
