//! Server catalog
//!
//! A catalog is one index document listing every installable server plus one
//! definition document per server. The index is loaded eagerly; definitions
//! are loaded on first lookup.

pub mod cache;
pub mod catalog;
pub mod resolver;
pub mod schema;

pub use cache::{CatalogLoader, DEFAULT_CACHE_TTL, IndexLoader, RegistryCache};
pub use catalog::{CatalogListing, InstallationProbe, ListOptions, Registry};
pub use resolver::{CATALOG_ROOT_ENV, CatalogRoot, ResourceResolver};
pub use schema::{
    CatalogEntryRef, CatalogIndex, CategoryMeta, CommandSpec, EnvironmentVar, ServerDefinition,
};
