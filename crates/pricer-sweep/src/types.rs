//! Core coordinate types for a benchmark sweep.
//!
//! A sweep is a grid over build variants, dividend counts, the two
//! algorithmic toggles (smoothing, acceleration) and a threading mode.
//! Each [`ConfigurationPoint`] names exactly one external invocation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::ConfigurationError;

/// Label of one build of the instrumented program.
///
/// Doubles as the name of the variant's directory below the sweep root
/// and as the primary grouping key of every downstream report.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariantId(String);

impl VariantId {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Directory holding this variant's build, relative to `root`.
    pub fn dir(&self, root: &Path) -> PathBuf {
        root.join(&self.0)
    }
}

impl fmt::Display for VariantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VariantId {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

impl From<String> for VariantId {
    fn from(label: String) -> Self {
        Self(label)
    }
}

/// How the instrumented program spreads its pricing loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadingMode {
    /// One pricing thread. The only mode routed through the instrumentation tool.
    #[default]
    Single,
    /// One pricing thread per hardware thread.
    Multi,
}

impl ThreadingMode {
    /// Value passed to the program's `-method` flag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Multi => "multi",
        }
    }

    /// Capitalised name used in default artifact file names.
    pub fn file_label(&self) -> &'static str {
        match self {
            Self::Single => "SingleThreaded",
            Self::Multi => "MultiThreaded",
        }
    }
}

impl fmt::Display for ThreadingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThreadingMode {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "single" | "singlethreaded" | "single-threaded" => Ok(Self::Single),
            "multi" | "multithreaded" | "multi-threaded" => Ok(Self::Multi),
            other => Err(ConfigurationError::UnknownThreadingMode(other.to_string())),
        }
    }
}

/// One cell of the smoothing × acceleration toggle grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Quadrant {
    /// Neither improvement enabled.
    None,
    Smoothing,
    Acceleration,
    /// Smoothing and acceleration together.
    All,
}

impl Quadrant {
    /// All four quadrants in canonical sweep order.
    pub const ALL: [Quadrant; 4] = [
        Quadrant::None,
        Quadrant::Smoothing,
        Quadrant::Acceleration,
        Quadrant::All,
    ];

    pub fn from_flags(smoothing: bool, acceleration: bool) -> Self {
        match (smoothing, acceleration) {
            (false, false) => Self::None,
            (true, false) => Self::Smoothing,
            (false, true) => Self::Acceleration,
            (true, true) => Self::All,
        }
    }

    pub fn smoothing(&self) -> bool {
        matches!(self, Self::Smoothing | Self::All)
    }

    pub fn acceleration(&self) -> bool {
        matches!(self, Self::Acceleration | Self::All)
    }

    /// Short label written to the `sweep_tag` column.
    pub fn label(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Smoothing => "smoothing",
            Self::Acceleration => "acceleration",
            Self::All => "all",
        }
    }

    /// Human-readable series name for reports.
    pub fn title(&self) -> &'static str {
        match self {
            Self::None => "No Improvements",
            Self::Smoothing => "Smoothing",
            Self::Acceleration => "Acceleration",
            Self::All => "All",
        }
    }
}

impl FromStr for Quadrant {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "smoothing" | "smooth" => Ok(Self::Smoothing),
            "acceleration" | "acc" => Ok(Self::Acceleration),
            "all" => Ok(Self::All),
            other => Err(ConfigurationError::UnknownQuadrant(other.to_string())),
        }
    }
}

/// One sweep coordinate; identifies exactly one external invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigurationPoint {
    pub variant: VariantId,
    pub dividends: u32,
    pub smoothing: bool,
    pub acceleration: bool,
    pub threading: ThreadingMode,
}

impl ConfigurationPoint {
    pub fn quadrant(&self) -> Quadrant {
        Quadrant::from_flags(self.smoothing, self.acceleration)
    }
}

impl fmt::Display for ConfigurationPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/divs={}/smooth={}/acc={}/{}",
            self.variant, self.dividends, self.smoothing, self.acceleration, self.threading
        )
    }
}
