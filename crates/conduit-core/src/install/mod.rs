//! Server installation
//!
//! The [`Installer`] drives one install, upgrade, removal or reconfiguration
//! through the stages in [`Stage`](crate::error::Stage), writing either into
//! the host config file directly or through the host tool's CLI.

pub mod environment;
pub mod installer;
pub mod options;

pub use environment::resolve_environment;
pub use installer::Installer;
pub use options::{
    ConfigureOptions, ConfigureReport, Confirm, DryRunPlan, InstallOptions, InstallReport,
    RemoveOptions, RemoveReport, Strategy,
};
