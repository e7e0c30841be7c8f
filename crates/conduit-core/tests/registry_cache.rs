//! Integration tests for the catalog registry and its TTL cache.

mod support;

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use conduit_core::Error;
use conduit_core::registry::{
    CatalogLoader, CatalogRoot, ListOptions, Registry, RegistryCache,
};
use tempfile::TempDir;

/// Loader that counts how often it runs.
struct CountingLoader {
    root: std::path::PathBuf,
    loads: Arc<AtomicUsize>,
}

impl CatalogLoader for CountingLoader {
    fn load(&self) -> conduit_core::Result<Registry> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        // Widen the window in which concurrent callers could race.
        thread::sleep(Duration::from_millis(20));
        Registry::load(Arc::new(CatalogRoot::new(&self.root)), Path::new("registry.yml"))
    }
}

fn counting_cache(root: &Path, ttl: Duration) -> (Arc<RegistryCache>, Arc<AtomicUsize>) {
    let loads = Arc::new(AtomicUsize::new(0));
    let loader = CountingLoader {
        root: root.to_path_buf(),
        loads: Arc::clone(&loads),
    };
    (Arc::new(RegistryCache::with_ttl(loader, ttl)), loads)
}

#[test]
fn concurrent_first_access_loads_once() {
    let temp = TempDir::new().unwrap();
    support::write_catalog(temp.path());
    let (cache, loads) = counting_cache(temp.path(), Duration::from_secs(60));

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                cache.get().unwrap()
            })
        })
        .collect();

    let registries: Vec<Arc<Registry>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert!(registries.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
}

#[test]
fn invalidate_forces_reload() {
    let temp = TempDir::new().unwrap();
    support::write_catalog(temp.path());
    let (cache, loads) = counting_cache(temp.path(), Duration::from_secs(60));

    let first = cache.get().unwrap();
    let again = cache.get().unwrap();
    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(loads.load(Ordering::SeqCst), 1);

    cache.invalidate();
    let reloaded = cache.get().unwrap();
    assert!(!Arc::ptr_eq(&first, &reloaded));
    assert_eq!(loads.load(Ordering::SeqCst), 2);
}

#[test]
fn expired_entry_is_reloaded() {
    let temp = TempDir::new().unwrap();
    support::write_catalog(temp.path());
    let (cache, loads) = counting_cache(temp.path(), Duration::ZERO);

    cache.get().unwrap();
    cache.get().unwrap();
    assert_eq!(loads.load(Ordering::SeqCst), 2);
}

#[test]
fn failed_reload_keeps_previous_entry_usable() {
    let temp = TempDir::new().unwrap();
    support::write_catalog(temp.path());
    let cache = support::registry_cache(temp.path());

    let registry = cache.get().unwrap();
    std::fs::remove_file(temp.path().join("registry.yml")).unwrap();
    cache.invalidate();

    assert!(matches!(cache.get(), Err(Error::CatalogNotFound { .. })));
    // A registry handed out earlier keeps working.
    assert_eq!(registry.entries().len(), 2);
}

#[test]
fn definitions_are_cached_after_first_lookup() {
    let temp = TempDir::new().unwrap();
    support::write_catalog(temp.path());
    let registry = support::registry_cache(temp.path()).get().unwrap();

    let first = registry.get_server("github").unwrap();
    std::fs::remove_file(temp.path().join("servers/github.yml")).unwrap();
    let second = registry.get_server("GitHub").unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.command.executable, "npx");
}

#[test]
fn search_and_category_scenario() {
    let temp = TempDir::new().unwrap();
    support::write_catalog(temp.path());
    let registry = support::registry_cache(temp.path()).get().unwrap();

    let names = |entries: Vec<conduit_core::registry::CatalogEntryRef>| {
        entries.into_iter().map(|e| e.name).collect::<Vec<_>>()
    };

    assert_eq!(names(registry.search("git")), vec!["github"]);
    assert_eq!(names(registry.search("")), vec!["github", "postgres"]);
    assert_eq!(names(registry.filter_by_category("DATABASE")), vec!["postgres"]);
    assert_eq!(
        names(registry.list_servers(&ListOptions::new().with_category("development").with_search("post"))),
        Vec::<String>::new()
    );
}

#[test]
fn unknown_server_is_not_found() {
    let temp = TempDir::new().unwrap();
    support::write_catalog(temp.path());
    let registry = support::registry_cache(temp.path()).get().unwrap();

    let err = registry.get_server("slack").unwrap_err();
    assert!(matches!(err, Error::ServerNotFound { ref name } if name == "slack"));
    assert!(matches!(registry.get_server(""), Err(Error::EmptyName)));
}
