//! Error types for catalog resolution and server installation.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::Backup;

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced by the registry, validator, config store and tool client.
#[derive(Debug, Error)]
pub enum Error {
    #[error("server name is empty")]
    EmptyName,

    #[error("server not found: {name}")]
    ServerNotFound { name: String },

    #[error("catalog resource not found: {}", .path.display())]
    CatalogNotFound { path: PathBuf },

    #[error("config file does not exist: {}", .path.display())]
    ConfigNotFound { path: PathBuf },

    #[error("{host} installation not found")]
    HostNotFound { host: String },

    #[error("invalid {field} '{value}': {reason}")]
    InvalidFormat {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("path traversal detected in {field}: {value}")]
    PathTraversal { field: &'static str, value: String },

    #[error("path must be absolute: {}", .path.display())]
    RelativePath { path: PathBuf },

    #[error("injection attempt detected in environment variable {name}")]
    Injection { name: String },

    #[error("missing required environment variable {name}")]
    MissingRequired { name: String },

    #[error("environment variable {name} does not match pattern {pattern}")]
    PatternMismatch { name: String, pattern: String },

    #[error("invalid validation pattern for {name}: {source}")]
    InvalidPattern {
        name: String,
        #[source]
        source: regex::Error,
    },

    #[error("interactive prompting is not supported; provide {name} via --env {name}=value")]
    PromptUnsupported { name: String },

    #[error("server already installed: {name} (use upgrade to replace it)")]
    AlreadyInstalled { name: String },

    #[error("server not installed: {name}")]
    NotInstalled { name: String },

    #[error("{tool} executable not found on PATH")]
    ToolUnavailable {
        tool: String,
        #[source]
        source: which::Error,
    },

    #[error("`{command}` failed ({}): {output}", exit_label(.status))]
    ToolFailure {
        command: String,
        status: Option<i32>,
        output: String,
    },

    #[error("could not parse output of `{command}`: {line}")]
    ToolOutput { command: String, line: String },

    #[error("failed to {action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("schema violation in {document}: {reason}")]
    Schema { document: String, reason: String },

    #[error("no backup was taken for {}", .path.display())]
    NoBackup { path: PathBuf },

    #[error("{} changed on disk since it was loaded", .path.display())]
    ConcurrentModification { path: PathBuf },

    #[error("{operation} is not supported with the {strategy} strategy")]
    Unsupported {
        operation: &'static str,
        strategy: &'static str,
    },

    #[error("operation cancelled: {reason}")]
    Cancelled { reason: String },
}

fn exit_label(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}

/// Coarse grouping of [`Error`] variants for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    NotFound,
    ValidationFailure,
    AlreadyInstalled,
    ExternalToolUnavailable,
    ExternalToolFailure,
    PersistenceFailure,
    SchemaViolation,
    Unsupported,
    Cancelled,
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::ServerNotFound { .. }
            | Error::CatalogNotFound { .. }
            | Error::ConfigNotFound { .. }
            | Error::HostNotFound { .. }
            | Error::NotInstalled { .. }
            | Error::NoBackup { .. } => ErrorCategory::NotFound,
            Error::EmptyName
            | Error::InvalidFormat { .. }
            | Error::PathTraversal { .. }
            | Error::RelativePath { .. }
            | Error::Injection { .. }
            | Error::MissingRequired { .. }
            | Error::PatternMismatch { .. }
            | Error::InvalidPattern { .. } => ErrorCategory::ValidationFailure,
            Error::AlreadyInstalled { .. } => ErrorCategory::AlreadyInstalled,
            Error::ToolUnavailable { .. } => ErrorCategory::ExternalToolUnavailable,
            Error::ToolFailure { .. } | Error::ToolOutput { .. } => {
                ErrorCategory::ExternalToolFailure
            }
            Error::Io { .. } | Error::Parse { .. } | Error::ConcurrentModification { .. } => {
                ErrorCategory::PersistenceFailure
            }
            Error::Schema { .. } => ErrorCategory::SchemaViolation,
            Error::PromptUnsupported { .. } | Error::Unsupported { .. } => {
                ErrorCategory::Unsupported
            }
            Error::Cancelled { .. } => ErrorCategory::Cancelled,
        }
    }

    /// True when the config file simply does not exist yet.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::ConfigNotFound { .. })
    }

    pub(crate) fn io(
        action: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Error::Io {
            action,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn schema(document: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Schema {
            document: document.into(),
            reason: reason.into(),
        }
    }
}

/// Installer stage in which an operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolving,
    Configuring,
    CheckingExisting,
    BackingUp,
    Applying,
    Confirming,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Resolving => "resolving server",
            Stage::Configuring => "configuring environment",
            Stage::CheckingExisting => "checking existing installation",
            Stage::BackingUp => "backing up config",
            Stage::Applying => "applying changes",
            Stage::Confirming => "confirming removal",
        };
        f.write_str(label)
    }
}

/// Failure of an installer operation, tagged with the stage that failed.
///
/// When the failure happened after a backup was taken, the backup is handed
/// back untouched so the caller can decide whether to restore it.
#[derive(Debug, Error)]
#[error("{server}: failed while {stage}: {source}")]
pub struct InstallError {
    pub server: String,
    pub stage: Stage,
    #[source]
    pub source: Error,
    pub backup: Option<Backup>,
    /// An upgrade through the host tool removed the server before failing.
    pub server_removed: bool,
}

impl InstallError {
    pub(crate) fn new(server: impl Into<String>, stage: Stage, source: Error) -> Self {
        Self {
            server: server.into(),
            stage,
            source,
            backup: None,
            server_removed: false,
        }
    }

    pub(crate) fn with_backup(mut self, backup: Option<Backup>) -> Self {
        self.backup = backup;
        self
    }

    pub(crate) fn after_removal(mut self) -> Self {
        self.server_removed = true;
        self
    }

    pub fn category(&self) -> ErrorCategory {
        self.source.category()
    }

    /// Suggested recovery step for the user, if any.
    pub fn recovery_hint(&self) -> Option<String> {
        if let Some(backup) = &self.backup {
            return Some(format!(
                "restore the previous config from {} (saved {})",
                backup.path().display(),
                backup.created_at().format("%Y-%m-%d %H:%M:%S")
            ));
        }
        if self.server_removed {
            return Some(format!(
                "{} was removed before the failure; run `conduit install {}` to add it back",
                self.server, self.server
            ));
        }
        match &self.source {
            Error::AlreadyInstalled { name } => Some(format!("run `conduit upgrade {name}`")),
            Error::MissingRequired { name } | Error::PromptUnsupported { name } => {
                Some(format!("pass --env {name}=<value>"))
            }
            _ => None,
        }
    }
}
