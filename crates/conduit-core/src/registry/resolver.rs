//! Resolution of logical catalog paths to files on disk.

use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};
use crate::validate::normalize_path;

/// Environment variable that overrides the configured catalog root.
pub const CATALOG_ROOT_ENV: &str = "CONDUIT_CATALOG_ROOT";

/// Maps a path relative to the catalog into an absolute path.
pub trait ResourceResolver: Send + Sync {
    fn resolve(&self, relative: &Path) -> Result<PathBuf>;
}

/// Resolver rooted at a catalog directory.
///
/// Refuses references that are absolute or that escape the root, since file
/// references come from catalog documents that may not be trusted.
#[derive(Debug, Clone)]
pub struct CatalogRoot {
    root: PathBuf,
}

impl CatalogRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Use `CONDUIT_CATALOG_ROOT` when set, otherwise the given default.
    pub fn from_env_or(default: impl Into<PathBuf>) -> Self {
        match std::env::var_os(CATALOG_ROOT_ENV) {
            Some(value) if !value.is_empty() => Self::new(PathBuf::from(value)),
            _ => Self::new(default),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ResourceResolver for CatalogRoot {
    fn resolve(&self, relative: &Path) -> Result<PathBuf> {
        if relative.is_absolute() || relative.components().any(|c| matches!(c, Component::Prefix(_))) {
            return Err(Error::PathTraversal {
                field: "catalog file reference",
                value: relative.display().to_string(),
            });
        }

        let root = normalize_path(&self.root);
        let candidate = normalize_path(&self.root.join(relative));
        if !candidate.starts_with(&root) {
            return Err(Error::PathTraversal {
                field: "catalog file reference",
                value: relative.display().to_string(),
            });
        }

        if !candidate.is_file() {
            return Err(Error::CatalogNotFound { path: candidate });
        }
        Ok(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn resolves_files_inside_root() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("development")).unwrap();
        std::fs::write(temp.path().join("development/github.yml"), "name: github").unwrap();

        let resolver = CatalogRoot::new(temp.path());
        let path = resolver.resolve(Path::new("development/github.yml")).unwrap();
        assert!(path.ends_with("development/github.yml"));
    }

    #[test]
    fn missing_file_is_not_found() {
        let temp = TempDir::new().unwrap();
        let resolver = CatalogRoot::new(temp.path());
        let err = resolver.resolve(Path::new("missing.yml")).unwrap_err();
        assert!(matches!(err, Error::CatalogNotFound { .. }));
    }

    #[test]
    fn rejects_references_escaping_root() {
        let temp = TempDir::new().unwrap();
        let resolver = CatalogRoot::new(temp.path().join("catalog"));
        for reference in ["../secrets.yml", "a/../../b.yml", "/etc/passwd"] {
            let err = resolver.resolve(Path::new(reference)).unwrap_err();
            assert!(
                matches!(err, Error::PathTraversal { .. }),
                "{reference} should be rejected"
            );
        }
    }
}
