//! kincbench CLI
//!
//! Entry point for the `kincbench` command-line tool.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use kincbench::chainspec;
use kincbench::kconfig::{self, ParsedConfig};
use kincbench::kernel::{BuildTool, KernelTree};
use kincbench::report::ChainStatus;
use kincbench::ChainExecutor;
use kincbench::LaneSettings;

#[derive(Parser)]
#[command(name = "kincbench")]
#[command(about = "Controlled experiments in incremental kernel compilation", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the experiment described by a chain spec
    Run {
        /// File describing the configuration chains to compile
        spec: PathBuf,

        /// Path to the pristine kernel source tree
        kernel: PathBuf,

        /// Directory receiving scratch and chain trees (default: .)
        #[arg(long)]
        output_root: Option<PathBuf>,

        /// Path to a lane settings TOML file
        #[arg(long, short = 's')]
        settings: Option<PathBuf>,

        /// Parallel build jobs
        #[arg(long, short = 'j')]
        jobs: Option<u32>,

        /// Wall-clock deadline per build invocation, in seconds
        #[arg(long)]
        timeout_seconds: Option<u64>,
    },

    /// Compare two configuration files field by field
    Diffconfig {
        /// First configuration file
        a: PathBuf,

        /// Second configuration file
        b: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Run {
            spec,
            kernel,
            output_root,
            settings,
            jobs,
            timeout_seconds,
        } => run_experiment(&spec, &kernel, output_root, settings, jobs, timeout_seconds),
        Commands::Diffconfig { a, b } => run_diffconfig(&a, &b),
    };
    process::exit(code);
}

fn run_experiment(
    spec_path: &PathBuf,
    kernel_path: &PathBuf,
    output_root: Option<PathBuf>,
    settings_path: Option<PathBuf>,
    jobs: Option<u32>,
    timeout_seconds: Option<u64>,
) -> i32 {
    let mut settings = match LaneSettings::load(settings_path.as_deref()) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("Error loading settings: {err}");
            return 1;
        }
    };
    if let Some(output_root) = output_root {
        settings.output_root = output_root;
    }
    if let Some(jobs) = jobs {
        settings.jobs = jobs;
    }
    if let Some(timeout) = timeout_seconds {
        settings.build_timeout_seconds = Some(timeout);
    }
    if let Err(err) = settings.validate() {
        eprintln!("Error: {err}");
        return 1;
    }

    // Parse-time errors abort before anything touches the filesystem.
    let spec = match chainspec::parse_file(spec_path) {
        Ok(spec) => spec,
        Err(err) => {
            eprintln!("Error parsing {}: {err}", spec_path.display());
            return 2;
        }
    };

    let pristine = match KernelTree::new(kernel_path, BuildTool::from(&settings)) {
        Ok(tree) => tree,
        Err(err) => {
            eprintln!("Error: {err}");
            return 1;
        }
    };

    let chain_count = spec.resolve().len();
    println!(
        "Running {chain_count} chain(s) against {}",
        kernel_path.display()
    );

    let mut executor = ChainExecutor::new(pristine, &settings);
    let report = match executor.run(&spec) {
        Ok(report) => report,
        Err(err) => {
            eprintln!("Error: {err}");
            return 1;
        }
    };

    for chain in &report.chains {
        match chain.status {
            ChainStatus::Completed => {
                println!("chain{}: completed, {} link(s)", chain.index, chain.links.len());
            }
            ChainStatus::Failed => {
                let detail = chain
                    .failure
                    .as_ref()
                    .map(|failure| format!("link {}: {}", failure.link, failure.message))
                    .unwrap_or_else(|| "unknown failure".to_string());
                eprintln!("chain{}: FAILED at {detail}", chain.index);
            }
        }
    }
    println!(
        "Report: {}",
        settings
            .output_root
            .join(kincbench::report::RUN_REPORT_FILE)
            .display()
    );

    if report.all_completed() {
        0
    } else {
        1
    }
}

fn run_diffconfig(a: &PathBuf, b: &PathBuf) -> i32 {
    let parsed_a = match ParsedConfig::from_file(a) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {err}");
            return 1;
        }
    };
    let parsed_b = match ParsedConfig::from_file(b) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {err}");
            return 1;
        }
    };

    print!("{}", kconfig::diff(&parsed_a, &parsed_b));
    0
}
