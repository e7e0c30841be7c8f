//! Host tool detection.
//!
//! Finds the config file of the tool servers are installed into. An
//! environment variable per host kind overrides the standard location.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostKind {
    #[default]
    ClaudeCode,
    ClaudeDesktop,
}

impl HostKind {
    pub fn id(&self) -> &'static str {
        match self {
            HostKind::ClaudeCode => "claude-code",
            HostKind::ClaudeDesktop => "claude-desktop",
        }
    }

    /// Environment variable that points at this host's config file.
    pub fn override_env(&self) -> &'static str {
        match self {
            HostKind::ClaudeCode => "CLAUDE_CODE_CONFIG",
            HostKind::ClaudeDesktop => "CLAUDE_DESKTOP_CONFIG",
        }
    }

    pub fn all() -> [HostKind; 2] {
        [HostKind::ClaudeCode, HostKind::ClaudeDesktop]
    }
}

impl fmt::Display for HostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostKind::ClaudeCode => f.write_str("Claude Code"),
            HostKind::ClaudeDesktop => f.write_str("Claude Desktop"),
        }
    }
}

impl std::str::FromStr for HostKind {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "claude-code" | "code" => Ok(HostKind::ClaudeCode),
            "claude-desktop" | "desktop" => Ok(HostKind::ClaudeDesktop),
            other => Err(format!(
                "unsupported host: {other} (claude-code|claude-desktop)"
            )),
        }
    }
}

/// A host whose config file exists, or whose config directory exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInstallation {
    pub kind: HostKind,
    pub config_path: PathBuf,
    pub version: Option<String>,
}

impl fmt::Display for HostInstallation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at {} (version: {})",
            self.kind,
            self.config_path.display(),
            self.version.as_deref().unwrap_or("unknown")
        )
    }
}

#[derive(Debug, Clone)]
pub struct HostLocator {
    home_dir: PathBuf,
    config_dir: PathBuf,
    overrides: HashMap<HostKind, PathBuf>,
}

impl HostLocator {
    pub fn new(home_dir: PathBuf, config_dir: PathBuf) -> Self {
        Self {
            home_dir,
            config_dir,
            overrides: HashMap::new(),
        }
    }

    /// Standard directories plus any `CLAUDE_*_CONFIG` overrides set in the
    /// environment.
    pub fn from_system() -> Result<Self> {
        let home_dir = dirs::home_dir().ok_or_else(|| Error::HostNotFound {
            host: "home directory".to_string(),
        })?;
        let config_dir = dirs::config_dir().unwrap_or_else(|| home_dir.join(".config"));

        let mut locator = Self::new(home_dir, config_dir);
        for kind in HostKind::all() {
            if let Some(path) = std::env::var_os(kind.override_env()).filter(|v| !v.is_empty()) {
                tracing::debug!(host = kind.id(), path = ?path, "using config override");
                locator = locator.with_override(kind, PathBuf::from(path));
            }
        }
        Ok(locator)
    }

    /// Use `path` for `kind` instead of the standard location.
    pub fn with_override(mut self, kind: HostKind, path: PathBuf) -> Self {
        self.overrides.insert(kind, path);
        self
    }

    /// Standard config path for `kind` on this platform.
    pub fn standard_path(&self, kind: HostKind) -> PathBuf {
        match kind {
            HostKind::ClaudeCode => self.home_dir.join(".claude.json"),
            HostKind::ClaudeDesktop => self
                .config_dir
                .join("Claude")
                .join("claude_desktop_config.json"),
        }
    }

    /// Config path for `kind`: its override, or the standard location.
    pub fn config_path(&self, kind: HostKind) -> PathBuf {
        self.overrides
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| self.standard_path(kind))
    }

    pub fn detect(&self, kind: HostKind) -> Option<HostInstallation> {
        detect_at(&self.config_path(kind), kind)
    }

    /// Every detected host, without duplicate config paths.
    pub fn detect_all(&self) -> Vec<HostInstallation> {
        let mut found: Vec<HostInstallation> = Vec::new();
        for kind in HostKind::all() {
            if let Some(installation) = self.detect(kind)
                && !found
                    .iter()
                    .any(|existing| existing.config_path == installation.config_path)
            {
                found.push(installation);
            }
        }
        found
    }

    /// Detected installation, or the standard path when nothing is there yet.
    pub fn resolve(&self, kind: HostKind) -> HostInstallation {
        self.detect(kind).unwrap_or_else(|| HostInstallation {
            kind,
            config_path: self.config_path(kind),
            version: None,
        })
    }
}

/// Pick one installation, preferring Claude Code.
pub fn select_installation(installations: &[HostInstallation]) -> Result<&HostInstallation> {
    installations
        .iter()
        .find(|i| i.kind == HostKind::ClaudeCode)
        .or_else(|| installations.first())
        .ok_or_else(|| Error::HostNotFound {
            host: "Claude".to_string(),
        })
}

fn detect_at(path: &Path, kind: HostKind) -> Option<HostInstallation> {
    let present = path.exists() || path.parent().is_some_and(Path::is_dir);
    if !present {
        return None;
    }
    Some(HostInstallation {
        kind,
        config_path: path.to_path_buf(),
        version: detect_version(path),
    })
}

fn detect_version(path: &Path) -> Option<String> {
    let bytes = std::fs::read(path).ok()?;
    let value: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    value.get("version")?.as_str().map(str::to_string)
}
