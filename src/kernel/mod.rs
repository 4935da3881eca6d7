//! Kernel build-tree abstraction
//!
//! Wraps one on-disk source tree with the minimum operations the
//! experiments need: generate a configuration, compile (optionally timed),
//! clean back to pristine, and snapshot the tree elsewhere. Anything
//! richer — size listings, timestamp dumps — lives in the checkers and
//! works on the tree from outside.
//!
//! The build tool is invoked as an external process with discrete
//! arguments; its output is not interpreted beyond success/failure and
//! duration.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use walkdir::WalkDir;

use crate::process::{ProcessError, ProcessOutcome, ProcessRequest};
use crate::settings::LaneSettings;

/// Kernel image file produced by a successful build.
pub const IMAGE_FILE: &str = "vmlinux";

/// Active configuration file within a tree.
pub const CONFIG_FILE: &str = ".config";

/// Lines of build-tool stderr kept in failure messages.
const STDERR_TAIL_LINES: usize = 20;

/// Errors from build-tree operations
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("{} is not a directory", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("build tool exited with {code:?}:\n{stderr_tail}")]
    BuildFailed {
        code: Option<i32>,
        stderr_tail: String,
    },

    #[error("process error: {0}")]
    Process(#[from] ProcessError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for build-tree operations
pub type KernelResult<T> = Result<T, KernelError>;

/// How to invoke the external build tool.
#[derive(Debug, Clone)]
pub struct BuildTool {
    /// Program to run (normally `make`)
    pub program: String,
    /// Parallel jobs passed as `-j<n>`
    pub jobs: u32,
    /// Wall-clock deadline per invocation
    pub deadline: Option<Duration>,
}

impl Default for BuildTool {
    fn default() -> Self {
        Self {
            program: "make".to_string(),
            jobs: 4,
            deadline: None,
        }
    }
}

impl From<&LaneSettings> for BuildTool {
    fn from(settings: &LaneSettings) -> Self {
        Self {
            program: settings.make_program.clone(),
            jobs: settings.jobs,
            deadline: settings.build_deadline(),
        }
    }
}

/// Options for one compile invocation.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Configuration file to copy into the tree before building
    pub config: Option<PathBuf>,
    /// Directory to direct build artifacts into (`O=`), out-of-tree
    pub output_dir: Option<PathBuf>,
    /// Record the wall-clock duration of this compile
    pub timed: bool,
}

impl CompileOptions {
    /// Timed in-place compile of the given configuration.
    pub fn timed_with_config(config: impl Into<PathBuf>) -> Self {
        Self {
            config: Some(config.into()),
            output_dir: None,
            timed: true,
        }
    }
}

/// One instance of the kernel source tree.
///
/// Holds exactly one active configuration until the next compile or clean.
/// The tree's directory is never deleted by this type; cleanup is an
/// external concern.
#[derive(Debug)]
pub struct KernelTree {
    dir: PathBuf,
    tool: BuildTool,
    last_compile: Duration,
}

impl KernelTree {
    /// Wrap an existing source tree.
    pub fn new(dir: impl Into<PathBuf>, tool: BuildTool) -> KernelResult<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(KernelError::DirectoryNotFound(dir));
        }
        Ok(Self {
            dir,
            tool,
            last_compile: Duration::ZERO,
        })
    }

    /// The tree's directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Final path component, used to name derived directories.
    pub fn name(&self) -> String {
        self.dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "kernel".to_string())
    }

    /// Path of the kernel image within the tree.
    pub fn image_path(&self) -> PathBuf {
        self.dir.join(IMAGE_FILE)
    }

    /// Path of the active configuration within the tree.
    pub fn config_path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    /// Generate a random configuration. No compilation is performed.
    pub fn randconfig(&self) -> KernelResult<()> {
        self.run_target("randconfig").map(|_| ())
    }

    /// Generate a minimal configuration. No compilation is performed.
    pub fn tinyconfig(&self) -> KernelResult<()> {
        self.run_target("tinyconfig").map(|_| ())
    }

    /// Compile the tree.
    ///
    /// Copies `options.config` into the tree first when given, directs
    /// artifacts out-of-tree via `O=` when `options.output_dir` is given,
    /// and records the wall-clock duration when `options.timed` is set.
    pub fn compile(&mut self, options: &CompileOptions) -> KernelResult<()> {
        if let Some(config) = &options.config {
            fs::copy(config, self.config_path())?;
        }

        let mut request = ProcessRequest::new(&self.tool.program)
            .args([
                "-C".to_string(),
                self.dir.to_string_lossy().into_owned(),
                format!("-j{}", self.tool.jobs),
            ])
            .deadline(self.tool.deadline);
        if let Some(output_dir) = &options.output_dir {
            fs::create_dir_all(output_dir)?;
            request = request.arg(format!("O={}", output_dir.display()));
        }

        let outcome = request.run()?;
        if !outcome.success() {
            return Err(KernelError::BuildFailed {
                code: outcome.exit_code,
                stderr_tail: outcome.stderr_tail(STDERR_TAIL_LINES),
            });
        }
        if options.timed {
            self.last_compile = outcome.duration;
        }
        Ok(())
    }

    /// Reset the tree to pristine state, discarding built objects.
    pub fn clean(&mut self) -> KernelResult<()> {
        self.run_target("mrproper").map(|_| ())
    }

    /// Copy the tree's current state to another location.
    ///
    /// The destination directory is created; existing files under it are
    /// overwritten.
    pub fn snapshot(&self, destination: &Path) -> KernelResult<()> {
        fs::create_dir_all(destination)?;
        for entry in WalkDir::new(&self.dir) {
            let entry = entry.map_err(io::Error::from)?;
            let relative = entry
                .path()
                .strip_prefix(&self.dir)
                .unwrap_or(entry.path());
            if relative.as_os_str().is_empty() {
                continue;
            }
            let target = destination.join(relative);
            if entry.file_type().is_dir() {
                fs::create_dir_all(&target)?;
            } else {
                fs::copy(entry.path(), &target)?;
            }
        }
        Ok(())
    }

    /// Duration of the last timed compile; zero before any.
    pub fn last_compile_duration(&self) -> Duration {
        self.last_compile
    }

    fn run_target(&self, target: &str) -> KernelResult<ProcessOutcome> {
        let outcome = ProcessRequest::new(&self.tool.program)
            .arg("-C")
            .arg(self.dir.to_string_lossy().into_owned())
            .arg(target)
            .deadline(self.tool.deadline)
            .run()?;
        if !outcome.success() {
            return Err(KernelError::BuildFailed {
                code: outcome.exit_code,
                stderr_tail: outcome.stderr_tail(STDERR_TAIL_LINES),
            });
        }
        Ok(outcome)
    }
}
