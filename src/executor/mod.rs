//! Chain executor
//!
//! Orchestrates the experiment: resolves each chain's configurations,
//! consults the build cache to avoid redundant from-scratch compiles,
//! drives the kernel abstraction through scratch and incremental builds,
//! and runs the post-build checkers.
//!
//! Per chain, link 0 establishes the baseline: its scratch build (cached
//! or fresh) is cloned as the chain's working tree. Every later link is
//! compiled in place on that working tree, timed, and compared against its
//! own scratch baseline, which exists purely as a comparison artifact.
//!
//! Chains are mutually independent; a build failure on one chain abandons
//! that chain and the run moves on to the next. Within a chain, links are
//! strictly sequential because each depends on the filesystem state the
//! previous one left behind.
//!
//! Output layout under the output root:
//!
//! ```text
//! scratch/<alias|config<i>-<j>>/   one tree per distinct configuration
//! chain<i>/chain                   resolved link list, for audit
//! chain<i>/work/                   the chain's working tree
//! chain<i>/link<j>/                snapshot of the working tree after link j
//! run_report.json                  the run summary
//! ```

mod state;

pub use state::{ChainProgress, ChainState, InvalidTransition};

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::cache::BuildCache;
use crate::chainspec::{Chain, ChainSpec};
use crate::checker;
use crate::kconfig::{KconfigError, ParsedConfig};
use crate::kernel::{BuildTool, CompileOptions, KernelError, KernelTree};
use crate::report::{ChainReport, LinkReport, ReportError, RunReport};
use crate::settings::LaneSettings;

/// Directory under the output root holding one tree per configuration.
pub const SCRATCH_DIR: &str = "scratch";

/// Audit file listing a chain's resolved links.
pub const CHAIN_FILE: &str = "chain";

/// Compile-duration artifact written beside each timed build.
pub const COMPILE_TIME_FILE: &str = "compile_time";

/// Errors from chain execution
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("state machine error: {0}")]
    State(#[from] InvalidTransition),

    #[error("kernel error: {0}")]
    Kernel(#[from] KernelError),

    #[error("config error: {0}")]
    Kconfig(#[from] KconfigError),

    #[error("report error: {0}")]
    Report(#[from] ReportError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("chain {0} has no links")]
    EmptyChain(usize),
}

/// Result type for executor operations
pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// Result of ensuring a configuration's scratch baseline.
struct ScratchBuild {
    dir: PathBuf,
    cache_hit: bool,
    compile_seconds: Option<f64>,
    warnings: Vec<String>,
}

/// Drives every chain of an experiment over one pristine source tree.
///
/// The executor exclusively owns the build trees it creates; the build
/// cache inside it only references scratch trees by path. The cache lives
/// as long as the executor, so repeated [`run`](Self::run) calls within one
/// process keep reusing earlier scratch builds.
pub struct ChainExecutor {
    pristine: KernelTree,
    tool: BuildTool,
    output_root: PathBuf,
    cache: BuildCache,
}

impl ChainExecutor {
    /// Create an executor over a pristine source tree.
    pub fn new(pristine: KernelTree, settings: &LaneSettings) -> Self {
        Self {
            pristine,
            tool: BuildTool::from(settings),
            output_root: settings.output_root.clone(),
            cache: BuildCache::new(),
        }
    }

    /// The build cache, exposed for inspection.
    pub fn cache(&self) -> &BuildCache {
        &self.cache
    }

    /// Execute every chain of the spec and persist the run report.
    ///
    /// Chains run in spec order but are isolated: a failing chain is
    /// recorded as failed and its successors still run.
    pub fn run(&mut self, spec: &ChainSpec) -> ExecutorResult<RunReport> {
        fs::create_dir_all(self.output_root.join(SCRATCH_DIR))?;

        let mut report = RunReport::new(self.pristine.dir());
        for (index, chain) in spec.resolve().iter().enumerate() {
            report.chains.push(self.run_chain(index, chain, spec));
        }

        report.write_to_output_root(&self.output_root)?;
        Ok(report)
    }

    /// Execute one chain, capturing any failure in the returned report.
    fn run_chain(&mut self, index: usize, chain: &Chain, spec: &ChainSpec) -> ChainReport {
        let chain_dir = self.output_root.join(format!("chain{index}"));
        let mut report = ChainReport::new(index, chain_dir.join("work"));

        let mut current_link = 0;
        if let Err(err) =
            self.run_chain_inner(index, chain, spec, &chain_dir, &mut report, &mut current_link)
        {
            report.fail(current_link, err.to_string());
        }
        report
    }

    fn run_chain_inner(
        &mut self,
        index: usize,
        chain: &Chain,
        spec: &ChainSpec,
        chain_dir: &Path,
        report: &mut ChainReport,
        current_link: &mut usize,
    ) -> ExecutorResult<()> {
        if chain.is_empty() {
            return Err(ExecutorError::EmptyChain(index));
        }

        let mut progress = ChainProgress::new(index);
        progress.advance(ChainState::Link0Resolve)?;

        fs::create_dir_all(chain_dir)?;
        self.write_chain_file(chain_dir, chain)?;

        // Link 0: baseline via the cache, cloned as the working tree.
        let scratch = self.ensure_scratch(index, 0, &chain.links[0], spec)?;
        let work_dir = chain_dir.join("work");
        KernelTree::new(&scratch.dir, self.tool.clone())?.snapshot(&work_dir)?;
        let mut working = KernelTree::new(&work_dir, self.tool.clone())?;
        progress.advance(ChainState::Link0Ready)?;

        let mut link = LinkReport {
            index: 0,
            config: chain.links[0].clone(),
            scratch_dir: scratch.dir.clone(),
            cache_hit: scratch.cache_hit,
            scratch_compile_seconds: scratch.compile_seconds,
            incremental_compile_seconds: None,
            image_bytes: None,
            checker_warnings: scratch.warnings,
        };
        match checker::image_size(&working) {
            Ok(bytes) => link.image_bytes = Some(bytes),
            Err(err) => link.checker_warnings.push(err.to_string()),
        }
        report.links.push(link);
        working.snapshot(&chain_dir.join("link0"))?;

        for (position, config) in chain.links.iter().enumerate().skip(1) {
            *current_link = position;
            progress.advance(ChainState::IncrementalCompile)?;
            working.compile(&CompileOptions::timed_with_config(config))?;
            let incremental_seconds = working.last_compile_duration().as_secs_f64();
            write_compile_time(working.dir(), incremental_seconds)?;

            // The scratch baseline for this link exists only for comparison.
            let scratch = self.ensure_scratch(index, position, config, spec)?;
            progress.advance(ChainState::ScratchBaselineReady)?;

            progress.advance(ChainState::Check)?;
            let mut link = LinkReport {
                index: position,
                config: config.clone(),
                scratch_dir: scratch.dir.clone(),
                cache_hit: scratch.cache_hit,
                scratch_compile_seconds: scratch.compile_seconds,
                incremental_compile_seconds: Some(incremental_seconds),
                image_bytes: None,
                checker_warnings: scratch.warnings,
            };
            if let Err(err) = checker::builtin_sizes(&working) {
                link.checker_warnings.push(err.to_string());
            }
            if let Err(err) = checker::timestamp_dump(&working) {
                link.checker_warnings.push(err.to_string());
            }
            match KernelTree::new(&scratch.dir, self.tool.clone()) {
                Ok(baseline) => {
                    if let Err(err) = checker::bloat_compare(&working, &baseline) {
                        link.checker_warnings.push(err.to_string());
                    }
                }
                Err(err) => link.checker_warnings.push(err.to_string()),
            }
            match checker::image_size(&working) {
                Ok(bytes) => link.image_bytes = Some(bytes),
                Err(err) => link.checker_warnings.push(err.to_string()),
            }
            report.links.push(link);

            working.snapshot(&chain_dir.join(format!("link{position}")))?;
        }

        progress.advance(ChainState::Done)?;
        Ok(())
    }

    /// Make sure a from-scratch build exists for the configuration.
    ///
    /// On a cache hit the recorded tree is reused. On a miss the pristine
    /// tree is cleaned, compiled with the configuration (timed), and the
    /// built tree is snapshotted into the scratch directory — named after
    /// the spec's alias for this path when one exists, else synthesized
    /// from the chain and link indices — then the pristine tree is cleaned
    /// again and the entry recorded.
    fn ensure_scratch(
        &mut self,
        chain_index: usize,
        link_index: usize,
        config_path: &Path,
        spec: &ChainSpec,
    ) -> ExecutorResult<ScratchBuild> {
        let parsed = ParsedConfig::from_file(config_path)?;
        if let Some(dir) = self.cache.lookup(&parsed) {
            return Ok(ScratchBuild {
                dir: dir.to_path_buf(),
                cache_hit: true,
                compile_seconds: None,
                warnings: Vec::new(),
            });
        }

        let name = match spec.alias_for(config_path) {
            Some(alias) => alias.to_string(),
            None => format!("config{chain_index}-{link_index}"),
        };
        let scratch_dir = self.output_root.join(SCRATCH_DIR).join(name);

        self.pristine.clean()?;
        self.pristine
            .compile(&CompileOptions::timed_with_config(config_path))?;
        let seconds = self.pristine.last_compile_duration().as_secs_f64();

        self.pristine.snapshot(&scratch_dir)?;
        write_compile_time(&scratch_dir, seconds)?;

        let mut warnings = Vec::new();
        let scratch_tree = KernelTree::new(&scratch_dir, self.tool.clone())?;
        if let Err(err) = checker::builtin_sizes(&scratch_tree) {
            warnings.push(err.to_string());
        }

        self.pristine.clean()?;
        self.cache.record(&parsed, &scratch_dir);

        Ok(ScratchBuild {
            dir: scratch_dir,
            cache_hit: false,
            compile_seconds: Some(seconds),
            warnings,
        })
    }

    fn write_chain_file(&self, chain_dir: &Path, chain: &Chain) -> io::Result<()> {
        let mut listing = chain
            .links
            .iter()
            .map(|link| link.display().to_string())
            .collect::<Vec<_>>()
            .join("\n");
        listing.push('\n');
        fs::write(chain_dir.join(CHAIN_FILE), listing)
    }
}

fn write_compile_time(dir: &Path, seconds: f64) -> io::Result<()> {
    fs::write(dir.join(COMPILE_TIME_FILE), format!("{seconds:.3}\n"))
}
