//! Invocation settings and the on-disk project configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigurationError;
use crate::sweep::SweepConfig;

/// Where the instrumentation tool deposits its side-effect artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactLocation {
    /// A fresh scratch directory per invocation, passed to the tool through
    /// `--callgrind-out-file`. Removed when the invocation returns.
    #[default]
    Scratch,
    /// The variant's working directory. Stale artifacts are purged before
    /// the run and all artifacts are purged again afterwards.
    WorkingDir,
}

/// External programs and knobs used by [`ProcessInvoker`](crate::invoker::ProcessInvoker).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InvokerConfig {
    /// Directory containing one subdirectory per variant.
    pub root_dir: PathBuf,
    /// Directory receiving call-graph images and default artifacts.
    pub results_dir: PathBuf,
    /// Instrumented program file name inside each variant directory.
    pub executable: String,
    pub valgrind: String,
    pub gprof2dot: String,
    pub dot: String,
    /// Iterations passed to the program when run under the instrumentation tool.
    pub measure_iterations: u32,
    /// Kill an invocation that runs longer than this.
    pub timeout_secs: Option<u64>,
    pub artifact_location: ArtifactLocation,
    /// Artifact file name prefix (tool defined).
    pub artifact_prefix: String,
    /// Artifact file name suffix; the dump produced by the program's explicit
    /// stats request.
    pub artifact_suffix: String,
    /// Render a call-graph image for each measured point.
    pub call_graph: bool,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            results_dir: PathBuf::from("Results"),
            executable: "FiniteDifferencePricing".to_string(),
            valgrind: "valgrind".to_string(),
            gprof2dot: "gprof2dot".to_string(),
            dot: "dot".to_string(),
            measure_iterations: 100,
            timeout_secs: None,
            artifact_location: ArtifactLocation::Scratch,
            artifact_prefix: "callgrind.out".to_string(),
            artifact_suffix: ".1".to_string(),
            call_graph: false,
        }
    }
}

impl InvokerConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Whether `name` is a side-effect artifact produced by a measurement.
    pub fn is_artifact(&self, name: &str) -> bool {
        name.starts_with(&self.artifact_prefix) && name.ends_with(&self.artifact_suffix)
    }

    /// Whether `name` is any leftover of the instrumentation chain
    /// (partial dumps or intermediate graph files).
    pub fn is_leftover(&self, name: &str) -> bool {
        name.starts_with(&self.artifact_prefix) || name.ends_with(".dot")
    }
}

/// Everything a sweep needs, as stored in a JSON project file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub sweep: SweepConfig,
    pub invoker: InvokerConfig,
}

impl ProjectConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigurationError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigurationError::InvalidFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_json_str(&text).map_err(|e| match e {
            ConfigurationError::InvalidFile { message, .. } => ConfigurationError::InvalidFile {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigurationError> {
        let config: ProjectConfig =
            serde_json::from_str(text).map_err(|e| ConfigurationError::InvalidFile {
                path: PathBuf::new(),
                message: e.to_string(),
            })?;
        config.sweep.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Quadrant, ThreadingMode, VariantId};

    #[test]
    fn artifact_matching_uses_prefix_and_suffix() {
        let config = InvokerConfig::default();
        assert!(config.is_artifact("callgrind.out.1234.1"));
        assert!(!config.is_artifact("callgrind.out.1234"));
        assert!(!config.is_artifact("notes.1"));
        assert!(config.is_leftover("callgrind.out.1234"));
        assert!(config.is_leftover("out.dot"));
        assert!(!config.is_leftover("FiniteDifferencePricing"));
    }

    #[test]
    fn partial_project_file_fills_defaults() {
        let config = ProjectConfig::from_json_str(
            r#"{
                "sweep": {
                    "variants": ["Release", "Optimized Clang-4.0"],
                    "max_dividends": 3,
                    "quadrants": ["none", "all"],
                    "threading": "single"
                },
                "invoker": { "root_dir": "/opt/builds", "timeout_secs": 600 }
            }"#,
        )
        .unwrap();

        assert_eq!(
            config.sweep.variants,
            vec![VariantId::new("Release"), VariantId::new("Optimized Clang-4.0")]
        );
        assert_eq!(config.sweep.quadrants, vec![Quadrant::None, Quadrant::All]);
        assert_eq!(config.sweep.threading, ThreadingMode::Single);
        assert_eq!(config.invoker.root_dir, PathBuf::from("/opt/builds"));
        assert_eq!(config.invoker.timeout(), Some(Duration::from_secs(600)));
        assert_eq!(config.invoker.measure_iterations, 100);
        assert_eq!(config.invoker.artifact_location, ArtifactLocation::Scratch);
    }

    #[test]
    fn invalid_sweep_in_file_is_rejected() {
        let err = ProjectConfig::from_json_str(r#"{ "sweep": { "variants": ["A", "A"] } }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::DuplicateVariant(v) if v == "A"));
    }

    #[test]
    fn malformed_json_is_configuration_error() {
        let err = ProjectConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidFile { .. }));
    }
}
