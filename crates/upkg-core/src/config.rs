use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::build::{BuildEntry, BuildEntryConfig, BuildTable};
use crate::decoder::XorDecoder;
use crate::error::{Error, Result};

pub const DEFAULT_EXTENSIONS: &[&str] = &["u", "upk", "uc", "uax", "utx", "usx", "ukx", "umx", "xxx"];

/// Loader settings, usually read from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoaderConfig {
    /// Directories searched for imported packages.
    pub search_roots: Vec<PathBuf>,
    /// File extensions accepted for packages, without the dot.
    pub extensions: Vec<String>,
    /// Extra build entries, matched before the built-in ones.
    pub builds: Vec<BuildEntryConfig>,
    /// Key for packages of builds flagged `XOR_ENCODED`.
    pub xor_key: Option<u8>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            search_roots: Vec::new(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            builds: Vec::new(),
            xor_key: None,
        }
    }
}

impl LoaderConfig {
    /// Read `path`; a missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::info!("{} not found, using the default loader config", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Built-in build table with the configured entries in front.
    pub fn build_table(&self) -> Result<BuildTable> {
        let mut table = BuildTable::default();
        let extra = self
            .builds
            .iter()
            .map(BuildEntry::try_from)
            .collect::<Result<Vec<_>>>()?;
        table.prepend(extra);
        Ok(table)
    }

    pub fn xor_decoder(&self) -> Option<XorDecoder> {
        self.xor_key.map(XorDecoder::single)
    }
}

/// Builds a [`LoaderConfig`] from code.
#[derive(Default)]
pub struct LoaderConfigBuilder {
    config: LoaderConfig,
}

impl LoaderConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a loaded configuration.
    pub fn from_config(config: LoaderConfig) -> Self {
        Self { config }
    }

    pub fn with_search_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.search_roots.push(root.into());
        self
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_build(mut self, build: BuildEntryConfig) -> Self {
        self.config.builds.push(build);
        self
    }

    pub fn with_xor_key(mut self, key: u8) -> Self {
        self.config.xor_key = Some(key);
        self
    }

    pub fn get(self) -> LoaderConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::BuildFlags;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_toml() {
        let cfg = LoaderConfig::from_toml(
            r#"
search_roots = ["/games/ut/System"]
xor_key = 0x5A

[[builds]]
id = "Fork"
min_version = 128
max_version = 128
min_licensee = 3
max_licensee = 3
flags = ["EXTRA_SUMMARY_INT"]
"#,
        )
        .unwrap();
        assert_eq!(cfg.search_roots, vec![PathBuf::from("/games/ut/System")]);
        assert_eq!(cfg.extensions.len(), DEFAULT_EXTENSIONS.len());
        assert_eq!(cfg.xor_key, Some(0x5A));

        let table = cfg.build_table().unwrap();
        let build = table.resolve(128, 3);
        assert_eq!(build.name(), "Fork");
        assert!(build.has(BuildFlags::EXTRA_SUMMARY_INT));
        assert_eq!(table.resolve(128, 0).name(), "UT2004");
    }

    #[test]
    fn missing_file_is_default() {
        let cfg = LoaderConfig::load("/nonexistent/upkg.toml").unwrap();
        assert_eq!(cfg, LoaderConfig::default());
    }

    #[test]
    fn malformed_toml() {
        assert!(matches!(
            LoaderConfig::from_toml("search_roots = 3"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn builder() {
        let cfg = LoaderConfigBuilder::new()
            .with_search_root("a")
            .with_extensions(["u"])
            .with_xor_key(1)
            .get();
        assert_eq!(cfg.search_roots, vec![PathBuf::from("a")]);
        assert_eq!(cfg.extensions, vec!["u".to_string()]);
        assert!(cfg.xor_decoder().is_some());
    }

    #[test]
    fn builder_extends_a_loaded_config() {
        let loaded = LoaderConfig::from_toml("search_roots = [\"base\"]\nextensions = [\"upk\"]").unwrap();
        let cfg = LoaderConfigBuilder::from_config(loaded)
            .with_search_root("next")
            .get();
        assert_eq!(cfg.search_roots, vec![PathBuf::from("base"), PathBuf::from("next")]);
        assert_eq!(cfg.extensions, vec!["upk".to_string()]);
        assert!(cfg.xor_decoder().is_none());
    }
}
