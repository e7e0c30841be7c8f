//! Host tool config file: load, mutate, back up and save.
//!
//! The file belongs to the host tool. Only the `mcpServers` key is rewritten
//! on save; every other key keeps its value and position.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::registry::InstallationProbe;

/// Key of the server map inside the host config document.
pub const SERVERS_KEY: &str = "mcpServers";

/// One entry under `mcpServers`.
///
/// Fields other than `command`, `args` and `env` (for example `type` or `url`)
/// are kept in `extra` so they survive a rewrite.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub env: IndexMap<String, String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ServerConfig {
    pub fn stdio(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            ..Self::default()
        }
    }

    pub fn with_env(mut self, env: IndexMap<String, String>) -> Self {
        self.env = env;
        self
    }
}

/// How `save` treats edits made to the file by someone else after `load`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConcurrencyCheck {
    /// Overwrite whatever is on disk.
    #[default]
    LastWriterWins,
    /// Refuse to save if the file content changed since it was loaded.
    DetectExternalEdits,
}

/// Snapshot of a config file taken before a mutation.
///
/// Restoring or discarding consumes the value, so a backup can be used once.
#[derive(Debug)]
pub struct Backup {
    original: PathBuf,
    path: PathBuf,
    created_at: DateTime<Local>,
}

impl Backup {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn original(&self) -> &Path {
        &self.original
    }

    pub fn created_at(&self) -> DateTime<Local> {
        self.created_at
    }

    /// Copy the snapshot back over the original file and delete the snapshot.
    pub fn restore(self) -> Result<()> {
        std::fs::copy(&self.path, &self.original)
            .map_err(|e| Error::io("restore backup to", &self.original, e))?;
        tracing::info!(
            config = %self.original.display(),
            backup = %self.path.display(),
            "restored config from backup"
        );
        self.discard()
    }

    /// Delete the snapshot without restoring it.
    pub fn discard(self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io("remove backup", &self.path, e)),
        }
    }
}

/// In-memory view of a host config file.
///
/// Not meant to be shared between threads or kept across operations; create
/// one per install/remove call.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    raw: Map<String, Value>,
    servers: IndexMap<String, ServerConfig>,
    /// Digest of the bytes seen at load time; `None` when the file was absent.
    loaded_digest: Option<blake3::Hash>,
    concurrency: ConcurrencyCheck,
    backup: Option<Backup>,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            raw: Map::new(),
            servers: IndexMap::new(),
            loaded_digest: None,
            concurrency: ConcurrencyCheck::default(),
            backup: None,
        }
    }

    pub fn with_concurrency(mut self, concurrency: ConcurrencyCheck) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the file. A missing file yields [`Error::ConfigNotFound`], which
    /// callers are expected to check with [`Error::is_not_found`].
    pub fn load(&mut self) -> Result<()> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.reset();
                return Err(Error::ConfigNotFound {
                    path: self.path.clone(),
                });
            }
            Err(e) => return Err(Error::io("read config file", &self.path, e)),
        };

        let raw = match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return Err(self.parse_error("expected a JSON object at the root")),
            Err(e) => return Err(self.parse_error(e.to_string())),
        };

        let servers = match raw.get(SERVERS_KEY) {
            None | Some(Value::Null) => IndexMap::new(),
            Some(Value::Object(entries)) => {
                let mut servers = IndexMap::with_capacity(entries.len());
                for (name, value) in entries {
                    let config: ServerConfig = serde_json::from_value(value.clone())
                        .map_err(|e| self.parse_error(format!("{SERVERS_KEY}.{name}: {e}")))?;
                    servers.insert(name.clone(), config);
                }
                servers
            }
            Some(_) => return Err(self.parse_error(format!("'{SERVERS_KEY}' must be an object"))),
        };

        self.raw = raw;
        self.servers = servers;
        self.loaded_digest = Some(blake3::hash(&bytes));
        Ok(())
    }

    /// Like [`ConfigStore::load`], treating a missing file as an empty config.
    pub fn load_or_default(&mut self) -> Result<()> {
        match self.load() {
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }

    /// Write the server map back into the document and persist it with
    /// owner-only permissions.
    pub fn save(&mut self) -> Result<()> {
        if self.concurrency == ConcurrencyCheck::DetectExternalEdits {
            let on_disk = self.current_digest()?;
            if on_disk != self.loaded_digest {
                return Err(Error::ConcurrentModification {
                    path: self.path.clone(),
                });
            }
        }

        let merged = self.merged_servers()?;
        if !merged.is_empty() || self.raw.contains_key(SERVERS_KEY) {
            self.raw.insert(SERVERS_KEY.to_string(), Value::Object(merged));
        }

        let mut bytes = serde_json::to_vec_pretty(&self.raw)
            .map_err(|e| self.parse_error(format!("failed to serialize: {e}")))?;
        bytes.push(b'\n');

        write_private(&self.path, &bytes)?;
        self.loaded_digest = Some(blake3::hash(&bytes));

        tracing::debug!(
            path = %self.path.display(),
            servers = self.servers.len(),
            "saved host config"
        );
        Ok(())
    }

    /// Copy the current file to a timestamped sibling. Does nothing when the
    /// file does not exist yet.
    pub fn backup(&mut self) -> Result<()> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "no config file to back up");
            return Ok(());
        }

        let created_at = Local::now();
        let backup_path = backup_path_for(&self.path, created_at);
        std::fs::copy(&self.path, &backup_path)
            .map_err(|e| Error::io("create backup", &backup_path, e))?;

        tracing::debug!(backup = %backup_path.display(), "backed up host config");
        if let Some(previous) = self.backup.replace(Backup {
            original: self.path.clone(),
            path: backup_path,
            created_at,
        }) {
            previous.discard()?;
        }
        Ok(())
    }

    /// Restore the backup taken in this session and reload the file.
    pub fn restore(&mut self) -> Result<()> {
        let backup = self.backup.take().ok_or_else(|| Error::NoBackup {
            path: self.path.clone(),
        })?;
        backup.restore()?;
        self.load_or_default()
    }

    /// Backup taken in this session, if any.
    pub fn pending_backup(&self) -> Option<&Backup> {
        self.backup.as_ref()
    }

    /// Hand the session backup to the caller.
    pub fn take_backup(&mut self) -> Option<Backup> {
        self.backup.take()
    }

    pub fn has_server(&self, name: &str) -> bool {
        self.servers.contains_key(name)
    }

    pub fn get_server(&self, name: &str) -> Option<&ServerConfig> {
        self.servers.get(name)
    }

    pub fn add_server(&mut self, name: impl Into<String>, config: ServerConfig) {
        self.servers.insert(name.into(), config);
    }

    pub fn remove_server(&mut self, name: &str) -> Option<ServerConfig> {
        self.servers.shift_remove(name)
    }

    pub fn servers(&self) -> &IndexMap<String, ServerConfig> {
        &self.servers
    }

    fn reset(&mut self) {
        self.raw = Map::new();
        self.servers = IndexMap::new();
        self.loaded_digest = None;
    }

    /// Server entries to write. Entries whose typed view is unchanged keep
    /// their original JSON value.
    fn merged_servers(&self) -> Result<Map<String, Value>> {
        let original = self.raw.get(SERVERS_KEY).and_then(Value::as_object);
        let mut merged = Map::new();
        for (name, config) in &self.servers {
            let untouched = original
                .and_then(|entries| entries.get(name))
                .filter(|value| {
                    serde_json::from_value::<ServerConfig>((*value).clone()).ok().as_ref()
                        == Some(config)
                });
            let value = match untouched {
                Some(value) => value.clone(),
                None => serde_json::to_value(config)
                    .map_err(|e| self.parse_error(format!("{SERVERS_KEY}.{name}: {e}")))?,
            };
            merged.insert(name.clone(), value);
        }
        Ok(merged)
    }

    fn current_digest(&self) -> Result<Option<blake3::Hash>> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(Some(blake3::hash(&bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io("read config file", &self.path, e)),
        }
    }

    fn parse_error(&self, message: impl Into<String>) -> Error {
        Error::Parse {
            path: self.path.clone(),
            message: message.into(),
        }
    }
}

impl InstallationProbe for ConfigStore {
    fn installed_servers(&self) -> Result<HashSet<String>> {
        Ok(self.servers.keys().cloned().collect())
    }
}

fn backup_path_for(path: &Path, at: DateTime<Local>) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "config.json".to_string());
    path.with_file_name(format!(
        "{file_name}.backup.{}",
        at.format("%Y%m%dT%H%M%S%3f")
    ))
}

/// A symlinked config is written at its target so the link itself survives.
fn resolve_link(path: &Path) -> Result<PathBuf> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => {
            std::fs::canonicalize(path).map_err(|e| Error::io("resolve symlink", path, e))
        }
        _ => Ok(path.to_path_buf()),
    }
}

/// Write through a temporary sibling and rename, so readers never see a
/// half-written file.
fn write_private(path: &Path, bytes: &[u8]) -> Result<()> {
    use std::io::Write;

    let path = resolve_link(path)?;
    let path = path.as_path();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::io("create config directory", parent, e))?;
    }

    let tmp = path.with_extension("conduit-tmp");
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options
        .open(&tmp)
        .map_err(|e| Error::io("write config file", &tmp, e))?;
    file.write_all(bytes)
        .and_then(|()| file.sync_all())
        .map_err(|e| Error::io("write config file", &tmp, e))?;
    drop(file);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))
            .map_err(|e| Error::io("set permissions on", &tmp, e))?;
    }

    std::fs::rename(&tmp, path).map_err(|e| Error::io("replace config file", path, e))
}
