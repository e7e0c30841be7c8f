//! Conduit Core Library
//!
//! Catalog lookup, validation and installation of MCP servers into a host
//! tool's configuration, either by editing its config file or through its CLI.

pub mod client;
pub mod config;
pub mod error;
pub mod host;
pub mod install;
pub mod registry;
pub mod validate;

pub use error::{Error, ErrorCategory, InstallError, Result, Stage};

/// Re-exports of commonly used types
pub mod prelude {
    // Errors
    pub use crate::error::{Error, ErrorCategory, InstallError, Result, Stage};

    // Configuration
    pub use crate::config::{Backup, ConcurrencyCheck, ConfigStore, ServerConfig, Settings};

    // Catalog
    pub use crate::registry::{
        CatalogEntryRef, CatalogRoot, InstallationProbe, ListOptions, Registry, RegistryCache,
        ServerDefinition,
    };

    // Host tool
    pub use crate::client::{ClaudeCli, CommandRunner, ServerStatus};
    pub use crate::host::{HostKind, HostLocator};

    // Installation
    pub use crate::install::{
        ConfigureOptions, Confirm, InstallOptions, InstallReport, Installer, RemoveOptions,
        Strategy,
    };
}
