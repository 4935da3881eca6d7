//! Post-build checkers
//!
//! Measurement routines run against a build tree after a compile. Each
//! writes its result artifact inside the inspected tree and returns the
//! artifact path. Checkers never mutate build state; a checker failure is
//! reported and the run continues.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use thiserror::Error;
use walkdir::WalkDir;

use crate::kernel::KernelTree;
use crate::process::{ProcessError, ProcessRequest};

/// Built-in linkage unit name, archive convention (newer kernels).
pub const BUILTIN_ARCHIVE: &str = "built-in.a";

/// Built-in linkage unit name, object convention (older kernels).
pub const BUILTIN_OBJECT: &str = "built-in.o";

/// Relative path of the kernel's bloat comparison script.
pub const BLOAT_O_METER: &str = "scripts/bloat-o-meter";

/// Artifact file names.
pub const BUILTIN_SIZES_FILE: &str = "builtin_sizes.txt";
pub const IMAGE_SIZE_FILE: &str = "image_size";
pub const TIMESTAMPS_FILE: &str = "timestamps.txt";
pub const BLOAT_REPORT_FILE: &str = "bloat_report.txt";

/// Errors from checker runs
#[derive(Debug, Error)]
pub enum CheckerError {
    #[error("no kernel image at {}", .0.display())]
    MissingImage(PathBuf),

    #[error("bloat-o-meter unavailable: {0}")]
    BloatUnavailable(String),

    #[error("process error: {0}")]
    Process(#[from] ProcessError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for checker runs
pub type CheckerResult<T> = Result<T, CheckerError>;

/// List every built-in linkage unit in the tree, largest first.
///
/// Scans for `built-in.a` and silently retries with `built-in.o` when the
/// archive convention yields nothing. Writes one `<bytes>\t<path>` line per
/// unit to `builtin_sizes.txt` in the tree.
pub fn builtin_sizes(tree: &KernelTree) -> CheckerResult<PathBuf> {
    let mut units = collect_units(tree.dir(), BUILTIN_ARCHIVE)?;
    if units.is_empty() {
        units = collect_units(tree.dir(), BUILTIN_OBJECT)?;
    }
    units.sort_by(|a, b| b.0.cmp(&a.0));

    let mut report = String::new();
    for (size, path) in &units {
        let relative = path.strip_prefix(tree.dir()).unwrap_or(path);
        report.push_str(&format!("{size}\t{}\n", relative.display()));
    }

    let artifact = tree.dir().join(BUILTIN_SIZES_FILE);
    fs::write(&artifact, report)?;
    Ok(artifact)
}

fn collect_units(root: &Path, name: &str) -> CheckerResult<Vec<(u64, PathBuf)>> {
    let mut units = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(io::Error::from)?;
        if entry.file_type().is_file() && entry.file_name() == name {
            units.push((entry.metadata().map_err(io::Error::from)?.len(), entry.path().to_path_buf()));
        }
    }
    Ok(units)
}

/// Byte size of the produced kernel image.
///
/// Writes the size to `image_size` in the tree and returns it.
pub fn image_size(tree: &KernelTree) -> CheckerResult<u64> {
    let image = tree.image_path();
    let metadata = fs::metadata(&image).map_err(|_| CheckerError::MissingImage(image.clone()))?;
    let size = metadata.len();
    fs::write(tree.dir().join(IMAGE_SIZE_FILE), format!("{size}\n"))?;
    Ok(size)
}

/// Record the modification time of every file in the tree.
///
/// One `<RFC 3339 mtime>\t<path>` line per file in `timestamps.txt`; used
/// to audit which objects an incremental build actually rebuilt.
pub fn timestamp_dump(tree: &KernelTree) -> CheckerResult<PathBuf> {
    let mut lines = Vec::new();
    for entry in WalkDir::new(tree.dir()) {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let modified = entry
            .metadata()
            .map_err(io::Error::from)?
            .modified()
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let stamp: DateTime<Utc> = modified.into();
        let relative = entry.path().strip_prefix(tree.dir()).unwrap_or(entry.path());
        lines.push(format!("{}\t{}", stamp.to_rfc3339(), relative.display()));
    }
    lines.sort();

    let artifact = tree.dir().join(TIMESTAMPS_FILE);
    fs::write(&artifact, lines.join("\n") + "\n")?;
    Ok(artifact)
}

/// Size-delta report between two trees' kernel images.
///
/// Runs the working tree's `scripts/bloat-o-meter` with the scratch
/// baseline's image as the old binary and the working tree's image as the
/// new one, quantifying the binary cost of incremental vs. scratch
/// compilation. The report lands in `bloat_report.txt` inside the working
/// tree.
pub fn bloat_compare(working: &KernelTree, baseline: &KernelTree) -> CheckerResult<PathBuf> {
    let script = working.dir().join(BLOAT_O_METER);
    if !script.is_file() {
        return Err(CheckerError::BloatUnavailable(format!(
            "{} not found",
            script.display()
        )));
    }
    for image in [baseline.image_path(), working.image_path()] {
        if !image.is_file() {
            return Err(CheckerError::MissingImage(image));
        }
    }

    let outcome = ProcessRequest::new(script.to_string_lossy().into_owned())
        .arg(baseline.image_path().to_string_lossy().into_owned())
        .arg(working.image_path().to_string_lossy().into_owned())
        .run()?;
    if !outcome.success() {
        return Err(CheckerError::BloatUnavailable(outcome.stderr_tail(5)));
    }

    let artifact = working.dir().join(BLOAT_REPORT_FILE);
    fs::write(&artifact, outcome.stdout)?;
    Ok(artifact)
}
