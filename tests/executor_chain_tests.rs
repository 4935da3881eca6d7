//! Chain executor integration tests
//!
//! Drive full chains through the executor against a stub build tool,
//! asserting the scratch/incremental build accounting, cache behavior,
//! artifact layout, and per-chain failure isolation.

mod common;

use std::fs;

use kincbench::chainspec;
use kincbench::kernel::{BuildTool, KernelTree};
use kincbench::report::{ChainStatus, RUN_REPORT_FILE};
use kincbench::{ChainExecutor, RunReport};

use common::Lane;

fn executor_for(lane: &Lane) -> ChainExecutor {
    let pristine = KernelTree::new(&lane.kernel_dir, BuildTool::from(&lane.settings)).unwrap();
    ChainExecutor::new(pristine, &lane.settings)
}

#[test]
fn test_three_link_chain_build_accounting() {
    let lane = common::setup();
    let a = lane.write_config("a.config", "CONFIG_A=y\n");
    let b = lane.write_config("b.config", "CONFIG_A=y\nCONFIG_B=y\n");
    let c = lane.write_config("c.config", "CONFIG_A=y\nCONFIG_C=m\n");
    let text = format!(
        "a : {}\nb : {}\nc : {}\na -> b -> c\n",
        a.display(),
        b.display(),
        c.display()
    );
    let spec = chainspec::parse(&text).unwrap();

    let mut executor = executor_for(&lane);
    let report = executor.run(&spec).unwrap();

    // One scratch build per distinct configuration.
    assert_eq!(lane.scratch_builds(), 3);
    // Two in-place incremental compiles on the chain's working tree.
    let work_dir = lane.settings.output_root.join("chain0/work");
    assert_eq!(lane.builds_on(&work_dir), 2);

    assert_eq!(report.chains.len(), 1);
    let chain = &report.chains[0];
    assert_eq!(chain.status, ChainStatus::Completed);
    assert_eq!(chain.links.len(), 3);
    assert!(!chain.links[0].cache_hit);
    assert!(chain.links[0].scratch_compile_seconds.is_some());
    assert!(chain.links[0].incremental_compile_seconds.is_none());
    assert!(chain.links[1].incremental_compile_seconds.is_some());
    assert!(chain.links[2].incremental_compile_seconds.is_some());
}

#[test]
fn test_scratch_dirs_named_from_aliases() {
    let lane = common::setup();
    let a = lane.write_config("a.config", "CONFIG_A=y\n");
    let b = lane.write_config("b.config", "CONFIG_B=y\n");
    // One aliased configuration, one literal path.
    let text = format!("tiny : {}\ntiny -> %{}\n", a.display(), b.display());
    let spec = chainspec::parse(&text).unwrap();

    executor_for(&lane).run(&spec).unwrap();

    let scratch = lane.settings.output_root.join("scratch");
    assert!(scratch.join("tiny").is_dir());
    assert!(scratch.join("config0-1").is_dir());
}

#[test]
fn test_equivalent_configs_share_one_scratch_build() {
    let lane = common::setup();
    let a = lane.write_config("a.config", "#\n# S\n#\nCONFIG_A=y\nCONFIG_B=m\n");
    // Same content, different comments and feature order.
    let b = lane.write_config(
        "b.config",
        "#\n# S\n#\n# reshuffled by hand\nCONFIG_B=m\n\nCONFIG_A=y\n",
    );
    let text = format!("a : {}\nb : {}\na -> b\n", a.display(), b.display());
    let spec = chainspec::parse(&text).unwrap();

    let mut executor = executor_for(&lane);
    let report = executor.run(&spec).unwrap();

    // The second from-scratch build is skipped; the first tree is reused.
    assert_eq!(lane.scratch_builds(), 1);
    let chain = &report.chains[0];
    assert!(!chain.links[0].cache_hit);
    assert!(chain.links[1].cache_hit);
    assert_eq!(chain.links[0].scratch_dir, chain.links[1].scratch_dir);
    assert_eq!(executor.cache().len(), 1);
}

#[test]
fn test_rerun_reuses_link0_cache_entry() {
    let lane = common::setup();
    let a = lane.write_config("a.config", "CONFIG_A=y\n");
    let text = format!("a : {}\na\n", a.display());
    let spec = chainspec::parse(&text).unwrap();

    let mut executor = executor_for(&lane);
    executor.run(&spec).unwrap();
    assert_eq!(lane.scratch_builds(), 1);

    // Second run within the same process: no second scratch build.
    let report = executor.run(&spec).unwrap();
    assert_eq!(lane.scratch_builds(), 1);
    assert!(report.chains[0].links[0].cache_hit);
}

#[test]
fn test_single_link_chain_completes_without_incremental_compile() {
    let lane = common::setup();
    let a = lane.write_config("a.config", "CONFIG_A=y\n");
    let text = format!("a : {}\na\n", a.display());
    let spec = chainspec::parse(&text).unwrap();

    let report = executor_for(&lane).run(&spec).unwrap();

    let chain = &report.chains[0];
    assert_eq!(chain.status, ChainStatus::Completed);
    assert_eq!(chain.links.len(), 1);
    let work_dir = lane.settings.output_root.join("chain0/work");
    assert_eq!(lane.builds_on(&work_dir), 0);
    // The working tree is a clone of the scratch build.
    assert!(work_dir.join("vmlinux").is_file());
}

#[test]
fn test_chain_failure_is_isolated() {
    let lane = common::setup();
    let bad = lane.write_config("bad.config", "CONFIG_BREAK=y\n");
    let good = lane.write_config("good.config", "CONFIG_A=y\n");
    let text = format!("bad : {}\ngood : {}\nbad\ngood\n", bad.display(), good.display());
    let spec = chainspec::parse(&text).unwrap();

    let report = executor_for(&lane).run(&spec).unwrap();

    assert_eq!(report.chains.len(), 2);
    let failed = &report.chains[0];
    assert_eq!(failed.status, ChainStatus::Failed);
    let failure = failed.failure.as_ref().unwrap();
    assert_eq!(failure.link, 0);
    // The underlying tool failure is surfaced verbatim.
    assert!(failure.message.contains("broken configuration"));

    assert_eq!(report.chains[1].status, ChainStatus::Completed);
    assert!(!report.all_completed());
}

#[test]
fn test_failure_mid_chain_keeps_earlier_links() {
    let lane = common::setup();
    let a = lane.write_config("a.config", "CONFIG_A=y\n");
    let bad = lane.write_config("bad.config", "CONFIG_BREAK=y\n");
    let text = format!("a : {}\nbad : {}\na -> bad\n", a.display(), bad.display());
    let spec = chainspec::parse(&text).unwrap();

    let report = executor_for(&lane).run(&spec).unwrap();

    let chain = &report.chains[0];
    assert_eq!(chain.status, ChainStatus::Failed);
    assert_eq!(chain.links.len(), 1);
    assert_eq!(chain.failure.as_ref().unwrap().link, 1);
}

#[test]
fn test_failure_after_link_report_keeps_link_index() {
    let lane = common::setup();
    let a = lane.write_config("a.config", "CONFIG_A=y\n");
    let b = lane.write_config("b.config", "CONFIG_B=y\n");
    let text = format!("a : {}\nb : {}\na -> b\n", a.display(), b.display());
    let spec = chainspec::parse(&text).unwrap();

    // A file squatting on the link-1 snapshot path makes that snapshot
    // fail after the link's measurements are already recorded.
    let link1 = lane.settings.output_root.join("chain0/link1");
    fs::create_dir_all(link1.parent().unwrap()).unwrap();
    fs::write(&link1, "in the way").unwrap();

    let report = executor_for(&lane).run(&spec).unwrap();

    let chain = &report.chains[0];
    assert_eq!(chain.status, ChainStatus::Failed);
    assert_eq!(chain.links.len(), 2);
    // The failure points at the link being processed, not one past it.
    assert_eq!(chain.failure.as_ref().unwrap().link, 1);
}

#[test]
fn test_artifacts_written_beside_trees() {
    let lane = common::setup();
    let a = lane.write_config("a.config", "CONFIG_A=y\n");
    let b = lane.write_config("b.config", "CONFIG_B=y\n");
    let text = format!("a : {}\nb : {}\na -> b\n", a.display(), b.display());
    let spec = chainspec::parse(&text).unwrap();

    executor_for(&lane).run(&spec).unwrap();

    let out = &lane.settings.output_root;
    let work = out.join("chain0/work");

    // Resolved link list for audit.
    let chain_file = fs::read_to_string(out.join("chain0/chain")).unwrap();
    assert_eq!(
        chain_file,
        format!("{}\n{}\n", a.display(), b.display())
    );

    // Scratch trees carry their compile duration and size listing.
    assert!(out.join("scratch/a/compile_time").is_file());
    assert!(out.join("scratch/a/builtin_sizes.txt").is_file());

    // Working tree carries the per-link measurement artifacts.
    assert!(work.join("compile_time").is_file());
    assert!(work.join("builtin_sizes.txt").is_file());
    assert!(work.join("timestamps.txt").is_file());
    assert!(work.join("bloat_report.txt").is_file());
    assert!(work.join("image_size").is_file());

    // Post-link snapshots of the working tree.
    assert!(out.join("chain0/link0/vmlinux").is_file());
    assert!(out.join("chain0/link1/vmlinux").is_file());
}

#[test]
fn test_run_report_persisted_and_loadable() {
    let lane = common::setup();
    let a = lane.write_config("a.config", "CONFIG_A=y\n");
    let text = format!("a : {}\na\n", a.display());
    let spec = chainspec::parse(&text).unwrap();

    executor_for(&lane).run(&spec).unwrap();

    let path = lane.settings.output_root.join(RUN_REPORT_FILE);
    let report = RunReport::from_file(&path).unwrap();
    assert_eq!(report.chains.len(), 1);
    assert_eq!(report.kernel, lane.kernel_dir);
}

#[test]
fn test_duplicate_chains_run_once() {
    let lane = common::setup();
    let a = lane.write_config("a.config", "CONFIG_A=y\n");
    let text = format!("a : {}\na\na\n", a.display());
    let spec = chainspec::parse(&text).unwrap();

    let report = executor_for(&lane).run(&spec).unwrap();
    assert_eq!(report.chains.len(), 1);
}
