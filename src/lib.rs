//! kincbench — controlled experiments in incremental kernel compilation
//!
//! Given a chain of configuration changes, the lane determines, for each
//! link, whether an equivalent configuration was already built from a
//! clean state during this run, builds incrementally otherwise, and
//! records comparative measurements (binary size deltas, timestamps,
//! compile durations) between incremental and from-scratch builds.

pub mod cache;
pub mod chainspec;
pub mod checker;
pub mod executor;
pub mod kconfig;
pub mod kernel;
pub mod process;
pub mod report;
pub mod settings;

pub use cache::BuildCache;
pub use chainspec::{Chain, ChainElement, ChainSpec, SpecError};
pub use executor::{ChainExecutor, ChainState, ExecutorError};
pub use kconfig::{diff, ConfigDiff, ParsedConfig};
pub use kernel::{BuildTool, CompileOptions, KernelError, KernelTree};
pub use report::{ChainStatus, RunReport};
pub use settings::LaneSettings;
