//! Content-equivalence build cache
//!
//! Process-scoped memo mapping a configuration's structural content to the
//! scratch tree already built from a clean state for it. Two configuration
//! files that differ in comments, blank lines, or feature order but agree
//! on every section/feature/value hit the same entry, so the run performs
//! at most one scratch build per semantic configuration.
//!
//! Keys are the canonical digest of the parsed configuration, giving
//! average O(1) lookups. Entries live for the process lifetime and are
//! never evicted. The cache stores paths it does not own: an entry goes
//! stale if the referenced tree is removed externally, an accepted risk
//! within a single run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::kconfig::ParsedConfig;

/// Memo of from-scratch builds, keyed by configuration content.
#[derive(Debug, Default)]
pub struct BuildCache {
    entries: HashMap<String, PathBuf>,
}

impl BuildCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the scratch tree built for an equivalent configuration.
    pub fn lookup(&self, config: &ParsedConfig) -> Option<&Path> {
        self.entries
            .get(&config.canonical_digest())
            .map(PathBuf::as_path)
    }

    /// Record the scratch tree built for a configuration.
    ///
    /// Re-recording an equivalent configuration overwrites the entry.
    pub fn record(&mut self, config: &ParsedConfig, tree: impl Into<PathBuf>) {
        self.entries.insert(config.canonical_digest(), tree.into());
    }

    /// Number of distinct configurations recorded.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True iff nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
