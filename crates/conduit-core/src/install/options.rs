//! Requests and reports for installer operations.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Where a server entry gets written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "kind", content = "path")]
pub enum Strategy {
    /// Edit the host config file at this path.
    ConfigFile(PathBuf),
    /// Ask the host tool's CLI to do it.
    ExternalTool,
}

impl Strategy {
    pub fn label(&self) -> &'static str {
        match self {
            Strategy::ConfigFile(_) => "config-file",
            Strategy::ExternalTool => "external-tool",
        }
    }

    pub fn config_path(&self) -> Option<&Path> {
        match self {
            Strategy::ConfigFile(path) => Some(path),
            Strategy::ExternalTool => None,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::ConfigFile(path) => write!(f, "config file {}", path.display()),
            Strategy::ExternalTool => f.write_str("external tool"),
        }
    }
}

/// Options for [`Installer::install`](super::Installer::install) and
/// [`Installer::upgrade`](super::Installer::upgrade).
#[derive(Debug, Clone)]
pub struct InstallOptions {
    pub strategy: Strategy,
    pub env: HashMap<String, String>,
    pub dry_run: bool,
    pub no_backup: bool,
    pub interactive: bool,
}

impl InstallOptions {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            env: HashMap::new(),
            dry_run: false,
            no_backup: false,
            interactive: false,
        }
    }

    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    pub fn with_envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn no_backup(mut self, no_backup: bool) -> Self {
        self.no_backup = no_backup;
        self
    }

    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }
}

#[derive(Debug, Clone)]
pub struct RemoveOptions {
    pub strategy: Strategy,
    pub skip_confirmation: bool,
    pub no_backup: bool,
}

impl RemoveOptions {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            skip_confirmation: false,
            no_backup: false,
        }
    }

    pub fn skip_confirmation(mut self, skip: bool) -> Self {
        self.skip_confirmation = skip;
        self
    }

    pub fn no_backup(mut self, no_backup: bool) -> Self {
        self.no_backup = no_backup;
        self
    }
}

/// Environment edits for an installed server. Only the config-file
/// strategy supports this.
#[derive(Debug, Clone)]
pub struct ConfigureOptions {
    pub strategy: Strategy,
    pub set: HashMap<String, String>,
    pub unset: Vec<String>,
    /// Rebuild the entry from the catalog definition before applying `set`.
    pub reset: bool,
    pub no_backup: bool,
}

impl ConfigureOptions {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            set: HashMap::new(),
            unset: Vec::new(),
            reset: false,
            no_backup: false,
        }
    }

    pub fn set(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set.insert(name.into(), value.into());
        self
    }

    pub fn unset(mut self, name: impl Into<String>) -> Self {
        self.unset.push(name.into());
        self
    }

    pub fn reset(mut self, reset: bool) -> Self {
        self.reset = reset;
        self
    }

    pub fn no_backup(mut self, no_backup: bool) -> Self {
        self.no_backup = no_backup;
        self
    }
}

/// Asks the user to approve a destructive step.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// What a dry run would have done.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DryRunPlan {
    pub server: String,
    pub strategy: Strategy,
    pub command: String,
    pub args: Vec<String>,
    /// Variable names with sensitive values masked.
    pub variables: Vec<(String, String)>,
    pub variable_count: usize,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub server: String,
    pub strategy: Strategy,
    pub dry_run: Option<DryRunPlan>,
    pub next_steps: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoveReport {
    pub server: String,
    pub strategy: Strategy,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigureReport {
    pub server: String,
    /// Variables whose value was set, sorted.
    pub set: Vec<String>,
    /// Variables that were removed, sorted.
    pub unset: Vec<String>,
    pub reset: bool,
    pub warnings: Vec<String>,
}
