//! Field-wise configuration diff
//!
//! Compares two parsed configurations section by section instead of as a
//! flat sorted list, so a change reads in the context of the menu that owns
//! it. Each section carries up to three groups: features only in the second
//! config (added), features only in the first (removed), and features in
//! both with different values (changed).

use std::fmt;

use indexmap::IndexMap;

use super::ParsedConfig;

/// Old and new value of a feature present in both configurations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureChange {
    pub old: String,
    pub new: String,
}

/// Differences within one section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionDiff {
    /// Features only in the second configuration
    pub added: IndexMap<String, String>,
    /// Features only in the first configuration
    pub removed: IndexMap<String, String>,
    /// Features in both, with differing values
    pub changed: IndexMap<String, FeatureChange>,
}

impl SectionDiff {
    /// True iff the section shows no difference.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// A full field-wise diff between two configurations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDiff {
    /// Per-section differences, first configuration's section order, then
    /// sections only the second configuration has
    pub sections: IndexMap<String, SectionDiff>,
}

impl ConfigDiff {
    /// True iff the two configurations agreed on every section.
    pub fn is_empty(&self) -> bool {
        self.sections.values().all(SectionDiff::is_empty)
    }
}

/// Compare two configurations field by field.
///
/// Sections of `a` are visited in order; a section missing from `b` has all
/// its features reported as removed, and a section only `b` has gets all
/// its features reported as added. Shared sections compare feature by
/// feature. Because both directions are covered, an empty diff coincides
/// with [`ParsedConfig::equivalent`].
pub fn diff(a: &ParsedConfig, b: &ParsedConfig) -> ConfigDiff {
    let mut sections: IndexMap<String, SectionDiff> = IndexMap::new();

    for (name, features_a) in a.sections() {
        let mut section = SectionDiff::default();
        match b.section(name) {
            Some(features_b) => {
                for (feature, value_a) in features_a {
                    match features_b.get(feature) {
                        Some(value_b) if value_a != value_b => {
                            section.changed.insert(
                                feature.clone(),
                                FeatureChange {
                                    old: value_a.clone(),
                                    new: value_b.clone(),
                                },
                            );
                        }
                        Some(_) => {}
                        None => {
                            section.removed.insert(feature.clone(), value_a.clone());
                        }
                    }
                }
                for (feature, value_b) in features_b {
                    if !features_a.contains_key(feature) {
                        section.added.insert(feature.clone(), value_b.clone());
                    }
                }
            }
            None => {
                section.removed = features_a.clone();
            }
        }
        sections.insert(name.clone(), section);
    }

    for (name, features_b) in b.sections() {
        if a.section(name).is_none() {
            sections.insert(
                name.clone(),
                SectionDiff {
                    added: features_b.clone(),
                    ..SectionDiff::default()
                },
            );
        }
    }

    ConfigDiff { sections }
}

impl fmt::Display for ConfigDiff {
    /// The report format of the standalone differ: one `*` line per
    /// section, then `+` added, `-` removed, and `~ old -> new` changed
    /// entries.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, section) in &self.sections {
            writeln!(f, "* {name}")?;
            if section.is_empty() {
                writeln!(f, "\t No changes")?;
                continue;
            }
            for (feature, value) in &section.added {
                writeln!(f, "\t+ {feature}: {value}")?;
            }
            for (feature, value) in &section.removed {
                writeln!(f, "\t- {feature}: {value}")?;
            }
            for (feature, change) in &section.changed {
                writeln!(f, "\t~ {feature}: {} -> {}", change.old, change.new)?;
            }
        }
        Ok(())
    }
}
