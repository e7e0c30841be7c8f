//! Configuration files
//!
//! Two kinds of files live here:
//! - the host tool's JSON config, which conduit edits but does not own
//! - conduit's own TOML settings

pub mod settings;
pub mod store;

pub use settings::{CatalogSettings, HostSettings, InstallSettings, Settings, parse_settings_str};
pub use store::{Backup, ConcurrencyCheck, ConfigStore, SERVERS_KEY, ServerConfig};
