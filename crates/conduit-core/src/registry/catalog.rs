//! Loaded catalog with lazy, cached server definitions.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;

use super::resolver::ResourceResolver;
use super::schema::{CatalogEntryRef, CatalogIndex, CategoryMeta, ServerDefinition};
use crate::error::{Error, Result};

/// Filters for listing catalog entries.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Case-insensitive exact category match
    pub category: Option<String>,
    /// Case-insensitive substring match on name or description
    pub search: Option<String>,
    /// Only entries reported installed by the probe
    pub installed_only: bool,
    /// Only entries not reported installed by the probe
    pub available_only: bool,
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn installed_only(mut self) -> Self {
        self.installed_only = true;
        self
    }

    pub fn available_only(mut self) -> Self {
        self.available_only = true;
        self
    }
}

/// Something that knows which servers are installed in the host tool.
pub trait InstallationProbe {
    fn installed_servers(&self) -> Result<HashSet<String>>;
}

/// Catalog entry annotated with installation status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogListing {
    pub entry: CatalogEntryRef,
    pub installed: bool,
}

/// A loaded catalog.
///
/// The index is immutable after load. Full definitions are read on first
/// access and cached by lower-cased name; the cache has its own lock so a
/// shared `Arc<Registry>` can serve concurrent lookups.
pub struct Registry {
    index: CatalogIndex,
    index_path: PathBuf,
    resolver: Arc<dyn ResourceResolver>,
    definitions: RwLock<HashMap<String, Arc<ServerDefinition>>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("index_path", &self.index_path)
            .field("entries", &self.index.entries.len())
            .finish()
    }
}

impl Registry {
    /// Load and validate the index document. Definitions are not loaded.
    pub fn load(resolver: Arc<dyn ResourceResolver>, index_ref: &Path) -> Result<Self> {
        let index_path = resolver.resolve(index_ref)?;
        let index: CatalogIndex = read_document(&index_path)?;
        index.validate(&index_path.display().to_string())?;

        tracing::debug!(
            path = %index_path.display(),
            entries = index.entries.len(),
            "loaded server catalog"
        );

        Ok(Self {
            index,
            index_path,
            resolver,
            definitions: RwLock::new(HashMap::new()),
        })
    }

    pub fn index(&self) -> &CatalogIndex {
        &self.index
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn entries(&self) -> &[CatalogEntryRef] {
        &self.index.entries
    }

    /// Look up a full server definition, loading it on first access.
    pub fn get_server(&self, name: &str) -> Result<Arc<ServerDefinition>> {
        if name.is_empty() {
            return Err(Error::EmptyName);
        }
        let key = name.to_lowercase();

        if let Some(found) = self.read_definitions().get(&key) {
            return Ok(Arc::clone(found));
        }

        let entry = self.index.find(name).ok_or_else(|| Error::ServerNotFound {
            name: name.to_string(),
        })?;

        let definition = Arc::new(self.load_definition(entry)?);

        let mut definitions = self
            .definitions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Another thread may have loaded it while we were reading the file.
        let cached = definitions.entry(key).or_insert(definition);
        Ok(Arc::clone(cached))
    }

    /// Entries whose name or description contains `term`, in catalog order.
    pub fn search(&self, term: &str) -> Vec<CatalogEntryRef> {
        self.index
            .entries
            .iter()
            .filter(|entry| matches_term(entry, term))
            .cloned()
            .collect()
    }

    /// Entries in `category`, compared ignoring case.
    pub fn filter_by_category(&self, category: &str) -> Vec<CatalogEntryRef> {
        self.index
            .entries
            .iter()
            .filter(|entry| matches_category(entry, category))
            .cloned()
            .collect()
    }

    /// Apply the category filter, then the search filter.
    pub fn list_servers(&self, options: &ListOptions) -> Vec<CatalogEntryRef> {
        let category = options.category.as_deref().unwrap_or("");
        let search = options.search.as_deref().unwrap_or("");
        self.index
            .entries
            .iter()
            .filter(|entry| matches_category(entry, category))
            .filter(|entry| matches_term(entry, search))
            .cloned()
            .collect()
    }

    /// Like [`Registry::list_servers`], annotated with installation status.
    pub fn list_with_status(
        &self,
        options: &ListOptions,
        probe: &dyn InstallationProbe,
    ) -> Result<Vec<CatalogListing>> {
        let installed: HashSet<String> = probe
            .installed_servers()?
            .into_iter()
            .map(|name| name.to_lowercase())
            .collect();

        Ok(self
            .list_servers(options)
            .into_iter()
            .map(|entry| {
                let is_installed = installed.contains(&entry.name.to_lowercase());
                CatalogListing {
                    entry,
                    installed: is_installed,
                }
            })
            .filter(|listing| !options.installed_only || listing.installed)
            .filter(|listing| !options.available_only || !listing.installed)
            .collect())
    }

    /// Distinct categories used by entries, in first-seen order.
    pub fn categories(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.index
            .entries
            .iter()
            .filter(|entry| !entry.category.is_empty())
            .filter(|entry| seen.insert(entry.category.to_lowercase()))
            .map(|entry| entry.category.clone())
            .collect()
    }

    pub fn category_meta(&self, category: &str) -> Option<&CategoryMeta> {
        self.index
            .categories
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(category))
            .map(|(_, meta)| meta)
    }

    fn load_definition(&self, entry: &CatalogEntryRef) -> Result<ServerDefinition> {
        let path = self.resolver.resolve(Path::new(&entry.file))?;
        let definition: ServerDefinition = read_document(&path)?;
        let document = path.display().to_string();
        definition.validate(&document)?;

        if !definition.name.eq_ignore_ascii_case(&entry.name) {
            return Err(Error::schema(
                document,
                format!(
                    "definition name '{}' does not match catalog entry '{}'",
                    definition.name, entry.name
                ),
            ));
        }

        tracing::debug!(server = %definition.name, path = %path.display(), "loaded server definition");
        Ok(definition)
    }

    fn read_definitions(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<ServerDefinition>>> {
        self.definitions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn matches_term(entry: &CatalogEntryRef, term: &str) -> bool {
    if term.is_empty() {
        return true;
    }
    let term = term.to_lowercase();
    entry.name.to_lowercase().contains(&term) || entry.description.to_lowercase().contains(&term)
}

fn matches_category(entry: &CatalogEntryRef, category: &str) -> bool {
    category.is_empty() || entry.category.eq_ignore_ascii_case(category)
}

/// Read a YAML document, or JSON when the file has a `.json` extension.
fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            Error::CatalogNotFound {
                path: path.to_path_buf(),
            }
        } else {
            Error::io("read", path, source)
        }
    })?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let parsed = if is_json {
        serde_json::from_str(&content).map_err(|e| e.to_string())
    } else {
        serde_yaml::from_str(&content).map_err(|e| e.to_string())
    };

    parsed.map_err(|message| Error::Parse {
        path: path.to_path_buf(),
        message,
    })
}
