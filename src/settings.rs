//! Lane settings
//!
//! Knobs for the experiment driver, loadable from a TOML file and
//! overridable by CLI flags:
//!
//! ```toml
//! make_program = "make"
//! jobs = 8
//! build_timeout_seconds = 7200
//! output_root = "results"
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from settings loading
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse settings TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// Experiment lane settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaneSettings {
    /// Build tool program
    #[serde(default = "default_make_program")]
    pub make_program: String,

    /// Parallel build jobs (`-j`)
    #[serde(default = "default_jobs")]
    pub jobs: u32,

    /// Wall-clock deadline per build invocation; absent means no limit
    #[serde(default)]
    pub build_timeout_seconds: Option<u64>,

    /// Directory receiving scratch and chain trees
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,
}

fn default_make_program() -> String {
    "make".to_string()
}

fn default_jobs() -> u32 {
    4
}

fn default_output_root() -> PathBuf {
    PathBuf::from(".")
}

impl Default for LaneSettings {
    fn default() -> Self {
        Self {
            make_program: default_make_program(),
            jobs: default_jobs(),
            build_timeout_seconds: None,
            output_root: default_output_root(),
        }
    }
}

impl LaneSettings {
    /// Load settings from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let text = fs::read_to_string(path)?;
        let settings: Self = toml::from_str(&text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load from a file when given, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Check value bounds.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.jobs == 0 {
            return Err(SettingsError::Invalid("jobs must be at least 1".to_string()));
        }
        if self.make_program.trim().is_empty() {
            return Err(SettingsError::Invalid(
                "make_program must not be empty".to_string(),
            ));
        }
        if self.build_timeout_seconds == Some(0) {
            return Err(SettingsError::Invalid(
                "build_timeout_seconds must be positive when set".to_string(),
            ));
        }
        Ok(())
    }

    /// The per-build deadline as a duration.
    pub fn build_deadline(&self) -> Option<Duration> {
        self.build_timeout_seconds.map(Duration::from_secs)
    }
}
