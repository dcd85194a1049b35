//! Locating sibling packages for cross-file imports.

use std::path::{Path, PathBuf};

use crate::config::LoaderConfig;
use crate::error::Result;

pub trait PackageProvider {
    /// Raw bytes of the package called `name`, or `None` if it cannot be found.
    ///
    /// `requesting` names the package whose import triggered the lookup. May be
    /// called while that package is still being linked.
    fn get_package(&self, name: &str, requesting: &str) -> Result<Option<Vec<u8>>>;
}

/// Provider that never finds anything; every cross-file import becomes a
/// placeholder object.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProvider;

impl PackageProvider for NullProvider {
    fn get_package(&self, _name: &str, _requesting: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

/// Searches a list of directories for `<name>.<ext>`.
#[derive(Debug, Clone)]
pub struct FsPackageProvider {
    search_roots: Vec<PathBuf>,
    extensions: Vec<String>,
}

impl FsPackageProvider {
    pub fn new(search_roots: Vec<PathBuf>, extensions: Vec<String>) -> Self {
        Self {
            search_roots,
            extensions,
        }
    }

    pub fn from_config(config: &LoaderConfig) -> Self {
        Self::new(config.search_roots.clone(), config.extensions.clone())
    }

    pub fn add_root(&mut self, root: impl Into<PathBuf>) {
        let root = root.into();
        if !self.search_roots.contains(&root) {
            self.search_roots.push(root);
        }
    }

    pub fn locate(&self, name: &str) -> Option<PathBuf> {
        for root in &self.search_roots {
            for ext in &self.extensions {
                let candidate = root.join(format!("{}.{}", name, ext));
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
            if let Some(found) = find_case_insensitive(root, name, &self.extensions) {
                return Some(found);
            }
        }
        None
    }
}

fn find_case_insensitive(root: &Path, name: &str, extensions: &[String]) -> Option<PathBuf> {
    let entries = std::fs::read_dir(root).ok()?;
    entries.filter_map(|e| e.ok()).map(|e| e.path()).find(|path| {
        let stem = path.file_stem().and_then(|s| s.to_str());
        let ext = path.extension().and_then(|s| s.to_str());
        match (stem, ext) {
            (Some(stem), Some(ext)) => {
                stem.eq_ignore_ascii_case(name)
                    && extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
            }
            _ => false,
        }
    })
}

impl PackageProvider for FsPackageProvider {
    fn get_package(&self, name: &str, requesting: &str) -> Result<Option<Vec<u8>>> {
        match self.locate(name) {
            Some(path) => {
                log::debug!("{} imports {} from {}", requesting, name, path.display());
                Ok(Some(std::fs::read(path)?))
            }
            None => {
                log::debug!("{} imports {}, which was not found", requesting, name);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_package_by_extension() {
        let dir = std::env::temp_dir().join(format!("upkg-provider-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("Engine.u"), b"engine").unwrap();
        std::fs::write(dir.join("CORE.U"), b"core").unwrap();

        let provider = FsPackageProvider::new(vec![dir.clone()], vec!["u".into()]);
        assert_eq!(
            provider.get_package("Engine", "Test").unwrap().as_deref(),
            Some(&b"engine"[..])
        );
        assert_eq!(
            provider.get_package("Core", "Test").unwrap().as_deref(),
            Some(&b"core"[..])
        );
        assert!(provider.get_package("Missing", "Test").unwrap().is_none());

        std::fs::remove_dir_all(dir).unwrap();
    }
}
