//! Conduit's own settings file (`config.toml`).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::store::ConcurrencyCheck;
use crate::error::{Error, Result};
use crate::host::{HostKind, HostLocator};
use crate::registry::{CatalogRoot, DEFAULT_CACHE_TTL, IndexLoader, RegistryCache};

/// Settings passed explicitly into the registry and installer constructors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub catalog: CatalogSettings,
    pub host: HostSettings,
    pub install: InstallSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    /// Catalog directory; `CONDUIT_CATALOG_ROOT` takes precedence
    pub root: Option<PathBuf>,
    /// Index document, relative to the root
    pub index: PathBuf,
    pub cache_ttl_secs: u64,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            root: None,
            index: PathBuf::from("registry.yml"),
            cache_ttl_secs: DEFAULT_CACHE_TTL.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSettings {
    pub kind: HostKind,
    /// Explicit host config file, bypassing detection
    pub config_path: Option<PathBuf>,
    /// Executable used for the external-tool strategy
    pub tool: String,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            kind: HostKind::default(),
            config_path: None,
            tool: "claude".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallSettings {
    pub backup: bool,
    pub concurrency: ConcurrencyCheck,
}

impl Default for InstallSettings {
    fn default() -> Self {
        Self {
            backup: true,
            concurrency: ConcurrencyCheck::default(),
        }
    }
}

impl Settings {
    /// Default location: `<config_dir>/conduit/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("conduit").join("config.toml"))
    }

    /// Load the settings file at the default location, or defaults when absent.
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| Error::io("read settings", path, e))?;
        parse_settings_str(&content).map_err(|message| Error::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.catalog.cache_ttl_secs)
    }

    /// Catalog resolver, honouring the environment override.
    pub fn catalog_resolver(&self) -> CatalogRoot {
        let configured = self
            .catalog
            .root
            .clone()
            .unwrap_or_else(default_catalog_root);
        CatalogRoot::from_env_or(configured)
    }

    pub fn registry_cache(&self) -> RegistryCache {
        let loader = IndexLoader::new(Arc::new(self.catalog_resolver()), &self.catalog.index);
        RegistryCache::with_ttl(loader, self.cache_ttl())
    }

    /// Host config file: the configured path, or the detected one.
    pub fn host_config_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.host.config_path {
            return Ok(path.clone());
        }
        let locator = HostLocator::from_system()?;
        Ok(locator.resolve(self.host.kind).config_path)
    }
}

fn default_catalog_root() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("conduit").join("catalog"))
        .unwrap_or_else(|| PathBuf::from("catalog"))
}

/// Parse settings, pointing at the offending line on error.
pub fn parse_settings_str(content: &str) -> std::result::Result<Settings, String> {
    toml::from_str(content).map_err(|error| match error.span() {
        Some(span) => {
            let line = content[..span.start.min(content.len())].matches('\n').count() + 1;
            format!("{}\n{}", error.message(), line_context(content, line))
        }
        None => error.message().to_string(),
    })
}

fn line_context(content: &str, line_num: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let start = line_num.saturating_sub(2);
    let end = (line_num + 1).min(lines.len());

    lines[start.min(end)..end]
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let num = start + i + 1;
            let marker = if num == line_num { ">>>" } else { "   " };
            format!("{marker} {num:4} | {line}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_settings_use_defaults() {
        let settings = parse_settings_str("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.cache_ttl(), Duration::from_secs(900));
        assert_eq!(settings.host.tool, "claude");
        assert!(settings.install.backup);
    }

    #[test]
    fn parses_all_sections() {
        let settings = parse_settings_str(
            r#"
[catalog]
root = "/srv/catalog"
index = "index.json"
cache_ttl_secs = 60

[host]
kind = "claude-desktop"
config_path = "/tmp/desktop.json"
tool = "/usr/local/bin/claude"

[install]
backup = false
concurrency = "detect-external-edits"
"#,
        )
        .unwrap();

        assert_eq!(settings.catalog.root, Some(PathBuf::from("/srv/catalog")));
        assert_eq!(settings.catalog.index, PathBuf::from("index.json"));
        assert_eq!(settings.cache_ttl(), Duration::from_secs(60));
        assert_eq!(settings.host.kind, HostKind::ClaudeDesktop);
        assert_eq!(
            settings.host_config_path().unwrap(),
            PathBuf::from("/tmp/desktop.json")
        );
        assert!(!settings.install.backup);
        assert_eq!(
            settings.install.concurrency,
            ConcurrencyCheck::DetectExternalEdits
        );
    }

    #[test]
    fn parse_error_points_at_line() {
        let err = parse_settings_str("[catalog]\ncache_ttl_secs = \"soon\"\n").unwrap_err();
        assert!(err.contains(">>>    2 | cache_ttl_secs"), "{err}");
    }
}
