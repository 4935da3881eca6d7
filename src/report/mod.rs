//! Run report artifact
//!
//! One JSON document per experiment run (`run_report.json` under the
//! output root) recording, per chain, the resolved links, cache hits, and
//! comparative compile durations. Written atomically via write-then-rename
//! so a crash never leaves a torn report.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Schema version for run_report.json
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier for run_report.json
pub const SCHEMA_ID: &str = "kincbench/run_report@1";

/// File name of the report under the output root.
pub const RUN_REPORT_FILE: &str = "run_report.json";

/// Errors for report operations
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Measurements for one link of a chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkReport {
    /// Link position within the chain (0 is the baseline)
    pub index: usize,

    /// Resolved configuration-file path
    pub config: PathBuf,

    /// Scratch tree holding this configuration's from-scratch build
    pub scratch_dir: PathBuf,

    /// Whether the scratch build was reused from the cache
    pub cache_hit: bool,

    /// From-scratch compile duration; absent on cache hits
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scratch_compile_seconds: Option<f64>,

    /// In-place incremental compile duration; absent for link 0
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incremental_compile_seconds: Option<f64>,

    /// Byte size of the working tree's kernel image after this link
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_bytes: Option<u64>,

    /// Non-fatal checker degradations observed at this link
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub checker_warnings: Vec<String>,
}

/// Terminal status of one chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChainStatus {
    /// Every link compiled and was checked
    Completed,
    /// A link failed; later links were not attempted
    Failed,
}

/// Failure details for a chain that did not complete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainFailure {
    /// Link being processed when the chain failed
    pub link: usize,

    /// The underlying tool failure, verbatim
    pub message: String,
}

/// Outcome of one chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainReport {
    /// Chain position within the spec
    pub index: usize,

    /// The chain's working tree
    pub work_dir: PathBuf,

    /// Terminal status
    pub status: ChainStatus,

    /// Per-link measurements, in chain order
    pub links: Vec<LinkReport>,

    /// Present iff `status` is `Failed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<ChainFailure>,
}

impl ChainReport {
    /// A fresh in-progress report for one chain.
    pub fn new(index: usize, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            index,
            work_dir: work_dir.into(),
            status: ChainStatus::Completed,
            links: Vec::new(),
            failure: None,
        }
    }

    /// Mark the chain failed at the given link.
    pub fn fail(&mut self, link: usize, message: String) {
        self.status = ChainStatus::Failed;
        self.failure = Some(ChainFailure { link, message });
    }
}

/// The full run report artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Schema version
    pub schema_version: u32,

    /// Schema identifier
    pub schema_id: String,

    /// When the run started
    pub created_at: DateTime<Utc>,

    /// Pristine kernel source tree the run compiled
    pub kernel: PathBuf,

    /// Per-chain outcomes, in spec order
    pub chains: Vec<ChainReport>,
}

impl RunReport {
    /// Create an empty report for a run over the given kernel.
    pub fn new(kernel: impl Into<PathBuf>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            created_at: Utc::now(),
            kernel: kernel.into(),
            chains: Vec::new(),
        }
    }

    /// True iff every chain completed.
    pub fn all_completed(&self) -> bool {
        self.chains
            .iter()
            .all(|chain| chain.status == ChainStatus::Completed)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Write atomically to a file (write-then-rename).
    pub fn write_to_file(&self, path: &Path) -> Result<(), ReportError> {
        let json = self.to_json()?;
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &json)?;
        fs::rename(&temp_path, path)?;
        Ok(())
    }

    /// Load from a file.
    pub fn from_file(path: &Path) -> Result<Self, ReportError> {
        let json = fs::read_to_string(path)?;
        Ok(Self::from_json(&json)?)
    }

    /// Write as `run_report.json` under the output root.
    pub fn write_to_output_root(&self, output_root: &Path) -> Result<PathBuf, ReportError> {
        let path = output_root.join(RUN_REPORT_FILE);
        self.write_to_file(&path)?;
        Ok(path)
    }
}
