//! Configuration-file model
//!
//! Parses the kernel's `.config` format into a section → feature → value
//! mapping. In the extract below, `HID support` is a section, `HID` is a
//! feature, and `y` is its value; the commented-out feature is absent from
//! the model.
//!
//! ```text
//! #
//! # HID support
//! #
//! CONFIG_HID=y
//! # CONFIG_HID_GENERIC is not set
//! ```
//!
//! Section order is preserved as read. The generator's boilerplate banner
//! (`# Automatically generated file; DO NOT EDIT.`) is skipped without
//! opening a section. Two configurations with identical mappings compare
//! equal regardless of comments, blank lines, or feature order; the
//! [`canonical_digest`](ParsedConfig::canonical_digest) turns that
//! equivalence into a stable map key.

mod diff;

pub use diff::{diff, ConfigDiff, FeatureChange, SectionDiff};

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use regex_lite::Regex;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Prefix of feature assignment lines.
pub const FEATURE_PREFIX: &str = "CONFIG_";

/// Section that collects features seen before any section banner.
pub const DEFAULT_SECTION: &str = "core";

/// Banner line marking the generator's boilerplate header.
const BOILERPLATE_BANNER: &str = "# Automatically generated file; DO NOT EDIT.";

/// Lines skipped after the boilerplate banner (version line and closer).
const BOILERPLATE_TRAILER_LINES: usize = 3;

/// Errors from configuration parsing
#[derive(Debug, Error)]
pub enum KconfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
}

/// Result type for configuration operations
pub type KconfigResult<T> = Result<T, KconfigError>;

/// A parsed configuration file: section → feature → value.
///
/// Equality (`==`) is deep structural equality of the mappings, the
/// relation the build cache memoizes on.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedConfig {
    sections: IndexMap<String, IndexMap<String, String>>,
}

impl ParsedConfig {
    /// Parse a configuration file from disk.
    pub fn from_file(path: &Path) -> KconfigResult<Self> {
        let text = fs::read_to_string(path).map_err(|source| KconfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&text))
    }

    /// Parse configuration text.
    ///
    /// Feature lines are `CONFIG_<NAME>=<VALUE>`. A three-line comment
    /// block (`#` / `# <title>` / `#`) opens a section, unless the title is
    /// the boilerplate banner, which is skipped without a section change.
    /// Disabled-feature comments, blank lines, and anything else that
    /// matches neither form are ignored.
    pub fn parse(text: &str) -> Self {
        let feature_line = match Regex::new(r"^CONFIG_([A-Za-z0-9_]+)=(.+)$") {
            Ok(re) => re,
            // The pattern is a literal; compilation cannot fail.
            Err(_) => unreachable!("invalid feature-line pattern"),
        };

        let lines: Vec<&str> = text.lines().collect();
        let mut sections: IndexMap<String, IndexMap<String, String>> = IndexMap::new();
        sections.insert(DEFAULT_SECTION.to_string(), IndexMap::new());
        let mut current = DEFAULT_SECTION.to_string();

        let mut i = 0;
        while i < lines.len() {
            let line = lines[i];
            if line == "#" {
                match lines.get(i + 1) {
                    Some(&title) if title == BOILERPLATE_BANNER => {
                        // Banner plus its trailer, no section change.
                        i += 2 + BOILERPLATE_TRAILER_LINES;
                    }
                    Some(&title) => {
                        let name = title.trim_start_matches('#').trim().to_string();
                        sections.entry(name.clone()).or_default();
                        current = name;
                        // Skip the title and the closing '#'.
                        i += 3;
                    }
                    None => break,
                }
                continue;
            }

            if !line.starts_with('#') && !line.trim().is_empty() {
                if let Some(captures) = feature_line.captures(line) {
                    let feature = captures[1].to_string();
                    let value = captures[2].to_string();
                    sections
                        .entry(current.clone())
                        .or_default()
                        .insert(feature, value);
                }
            }
            i += 1;
        }

        // Drop the implicit opening section when nothing landed in it.
        if sections
            .get(DEFAULT_SECTION)
            .is_some_and(|features| features.is_empty())
        {
            sections.shift_remove(DEFAULT_SECTION);
        }

        Self { sections }
    }

    /// The section → feature → value mapping, in file order.
    pub fn sections(&self) -> &IndexMap<String, IndexMap<String, String>> {
        &self.sections
    }

    /// Features of one section, if present.
    pub fn section(&self, name: &str) -> Option<&IndexMap<String, String>> {
        self.sections.get(name)
    }

    /// Total number of enabled features across all sections.
    pub fn feature_count(&self) -> usize {
        self.sections.values().map(IndexMap::len).sum()
    }

    /// True iff no section carries any feature.
    pub fn is_empty(&self) -> bool {
        self.feature_count() == 0
    }

    /// Full structural equivalence with another configuration.
    ///
    /// Strictly stronger than an empty [`diff`]: every section must agree,
    /// not just the shared ones.
    pub fn equivalent(&self, other: &ParsedConfig) -> bool {
        self == other
    }

    /// Canonical content digest, hex-encoded SHA-256.
    ///
    /// Computed over the sorted `(section, feature, value)` tuples, so two
    /// files that differ only in comments, blank lines, or ordering share a
    /// digest. Used as the build-cache key.
    pub fn canonical_digest(&self) -> String {
        let mut tuples: Vec<(&str, &str, &str)> = self
            .sections
            .iter()
            .flat_map(|(section, features)| {
                features
                    .iter()
                    .map(move |(feature, value)| (section.as_str(), feature.as_str(), value.as_str()))
            })
            .collect();
        tuples.sort_unstable();

        let mut hasher = Sha256::new();
        for (section, feature, value) in tuples {
            hasher.update(section.as_bytes());
            hasher.update([0]);
            hasher.update(feature.as_bytes());
            hasher.update([0]);
            hasher.update(value.as_bytes());
            hasher.update([b'\n']);
        }
        hex::encode(hasher.finalize())
    }
}
