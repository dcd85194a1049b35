//! Build identity: which engine fork produced a package.
//!
//! Forks sometimes change a layout without bumping the file version, so the
//! readers consult the resolved [`BuildIdentity`] in addition to the version.

use std::ops::RangeInclusive;
use std::str::FromStr;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct BuildFlags: u32 {
        /// An extra i32 follows the package flags in the summary.
        const EXTRA_SUMMARY_INT = 1 << 0;
        /// Names carry an instance number regardless of the file version.
        const NUMBERED_NAMES = 1 << 1;
        /// Export records end with an extra dependency index.
        const EXPORT_TRAILING_DEPENDENCY = 1 << 2;
        /// Cooked for a console; editor-only data is stripped.
        const CONSOLE_COOKED = 1 << 3;
        /// The whole file is XOR obfuscated (see `LoaderConfig::xor_key`).
        const XOR_ENCODED = 1 << 4;
    }
}

impl FromStr for BuildFlags {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        BuildFlags::from_name(&s.trim().to_ascii_uppercase())
            .ok_or_else(|| Error::Config(format!("unknown build flag {:?}", s)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildEntry {
    pub id: String,
    pub versions: RangeInclusive<u16>,
    pub licensees: RangeInclusive<u16>,
    pub flags: BuildFlags,
}

impl BuildEntry {
    pub fn new(
        id: impl Into<String>,
        versions: RangeInclusive<u16>,
        licensees: RangeInclusive<u16>,
        flags: BuildFlags,
    ) -> Self {
        Self {
            id: id.into(),
            versions,
            licensees,
            flags,
        }
    }

    pub fn matches(&self, version: u16, licensee: u16) -> bool {
        self.versions.contains(&version) && self.licensees.contains(&licensee)
    }
}

/// Serialized form of a [`BuildEntry`] as it appears in the loader config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildEntryConfig {
    pub id: String,
    pub min_version: u16,
    pub max_version: u16,
    #[serde(default)]
    pub min_licensee: u16,
    #[serde(default = "max_licensee")]
    pub max_licensee: u16,
    #[serde(default)]
    pub flags: Vec<String>,
}

fn max_licensee() -> u16 {
    u16::MAX
}

impl TryFrom<&BuildEntryConfig> for BuildEntry {
    type Error = Error;

    fn try_from(cfg: &BuildEntryConfig) -> Result<Self> {
        let mut flags = BuildFlags::empty();
        for name in &cfg.flags {
            flags |= name.parse::<BuildFlags>()?;
        }
        Ok(BuildEntry::new(
            cfg.id.clone(),
            cfg.min_version..=cfg.max_version,
            cfg.min_licensee..=cfg.max_licensee,
            flags,
        ))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildIdentity {
    /// `None` when no table entry matched.
    pub id: Option<String>,
    pub flags: BuildFlags,
}

impl BuildIdentity {
    pub fn generic() -> Self {
        Self::default()
    }

    pub fn has(&self, flag: BuildFlags) -> bool {
        self.flags.contains(flag)
    }

    pub fn name(&self) -> &str {
        self.id.as_deref().unwrap_or("Generic")
    }
}

/// Ordered list of known builds, matched first-hit by linear scan.
#[derive(Debug, Clone)]
pub struct BuildTable {
    entries: Vec<BuildEntry>,
}

impl BuildTable {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, entry: BuildEntry) {
        self.entries.push(entry);
    }

    /// Entries inserted here are matched before the existing ones.
    pub fn prepend(&mut self, entries: impl IntoIterator<Item = BuildEntry>) {
        let mut merged: Vec<BuildEntry> = entries.into_iter().collect();
        merged.append(&mut self.entries);
        self.entries = merged;
    }

    pub fn entries(&self) -> &[BuildEntry] {
        &self.entries
    }

    pub fn resolve(&self, version: u16, licensee: u16) -> BuildIdentity {
        match self.entries.iter().find(|e| e.matches(version, licensee)) {
            Some(entry) => {
                log::debug!(
                    "build {} matched for version {}/{}",
                    entry.id,
                    version,
                    licensee
                );
                BuildIdentity {
                    id: Some(entry.id.clone()),
                    flags: entry.flags,
                }
            }
            None => BuildIdentity::generic(),
        }
    }
}

impl Default for BuildTable {
    fn default() -> Self {
        let none = BuildFlags::empty();
        Self {
            entries: vec![
                BuildEntry::new("Unreal1", 61..=63, 0..=0, none),
                BuildEntry::new("UT99", 68..=69, 0..=0, none),
                BuildEntry::new("UT2003", 119..=120, 0..=28, none),
                BuildEntry::new("UT2004", 121..=129, 0..=29, none),
                BuildEntry::new("GoW1", 490..=490, 9..=9, BuildFlags::CONSOLE_COOKED),
                BuildEntry::new("UT3", 512..=512, 0..=0, none),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_match_wins() {
        let mut table = BuildTable::default();
        table.prepend([BuildEntry::new(
            "Custom",
            512..=512,
            0..=0,
            BuildFlags::EXTRA_SUMMARY_INT,
        )]);
        let build = table.resolve(512, 0);
        assert_eq!(build.name(), "Custom");
        assert!(build.has(BuildFlags::EXTRA_SUMMARY_INT));
    }

    #[test]
    fn unknown_versions_are_generic() {
        let build = BuildTable::default().resolve(300, 77);
        assert_eq!(build, BuildIdentity::generic());
        assert_eq!(build.name(), "Generic");
    }

    #[test]
    fn config_flags_parse() {
        let cfg = BuildEntryConfig {
            id: "Fork".into(),
            min_version: 100,
            max_version: 110,
            min_licensee: 0,
            max_licensee: 5,
            flags: vec!["numbered_names".into(), "EXTRA_SUMMARY_INT".into()],
        };
        let entry = BuildEntry::try_from(&cfg).unwrap();
        assert!(entry.matches(105, 5));
        assert!(!entry.matches(105, 6));
        assert_eq!(
            entry.flags,
            BuildFlags::NUMBERED_NAMES | BuildFlags::EXTRA_SUMMARY_INT
        );
        let bad = BuildEntryConfig {
            flags: vec!["nope".into()],
            ..cfg
        };
        assert!(BuildEntry::try_from(&bad).is_err());
    }
}
