//! Install pipeline.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;

use super::environment::resolve_environment;
use super::options::{
    ConfigureOptions, ConfigureReport, Confirm, DryRunPlan, InstallOptions, InstallReport,
    RemoveOptions, RemoveReport, Strategy,
};
use crate::client::{ClaudeCli, ServerStatus};
use crate::config::{ConcurrencyCheck, ConfigStore, ServerConfig, Settings};
use crate::error::{Error, InstallError, Stage};
use crate::registry::{RegistryCache, ServerDefinition};
use crate::validate::{mask_sensitive, validate_environment, validate_name, validate_path};

type Outcome<T> = std::result::Result<T, InstallError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Install,
    Upgrade,
}

/// Installs catalog servers into the host tool.
///
/// Holds no per-operation state; each call loads its own [`ConfigStore`].
#[derive(Debug, Clone)]
pub struct Installer {
    registry: Arc<RegistryCache>,
    tool: ClaudeCli,
    concurrency: ConcurrencyCheck,
}

impl Installer {
    pub fn new(registry: Arc<RegistryCache>, tool: ClaudeCli) -> Self {
        Self {
            registry,
            tool,
            concurrency: ConcurrencyCheck::default(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            Arc::new(settings.registry_cache()),
            ClaudeCli::new(settings.host.tool.clone()),
        )
        .with_concurrency(settings.install.concurrency)
    }

    pub fn with_concurrency(mut self, concurrency: ConcurrencyCheck) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn registry(&self) -> &Arc<RegistryCache> {
        &self.registry
    }

    pub fn tool(&self) -> &ClaudeCli {
        &self.tool
    }

    /// Install a catalog server.
    ///
    /// Fails with [`Error::AlreadyInstalled`] when the server is present,
    /// leaving the config untouched. A dry run reports the plan and writes
    /// nothing.
    pub fn install(&self, name: &str, options: &InstallOptions) -> Outcome<InstallReport> {
        self.apply(name, options, Mode::Install)
    }

    /// Replace an installed server's entry with the current catalog
    /// definition. With the config-file strategy, environment values already
    /// in the entry are kept unless overridden.
    pub fn upgrade(&self, name: &str, options: &InstallOptions) -> Outcome<InstallReport> {
        self.apply(name, options, Mode::Upgrade)
    }

    pub fn remove(
        &self,
        name: &str,
        options: &RemoveOptions,
        confirm: &dyn Confirm,
    ) -> Outcome<RemoveReport> {
        let fail = |stage: Stage| move |e: Error| InstallError::new(name, stage, e);
        validate_name(name).map_err(fail(Stage::Resolving))?;

        let prompt = format!("Remove server '{name}' from {}?", options.strategy);
        let mut warnings = Vec::new();

        match &options.strategy {
            Strategy::ConfigFile(path) => {
                let mut store = self.store(path).map_err(fail(Stage::Resolving))?;
                store.load_or_default().map_err(fail(Stage::CheckingExisting))?;
                if !store.has_server(name) {
                    return Err(fail(Stage::CheckingExisting)(not_installed(name)));
                }
                if !options.skip_confirmation && !confirm.confirm(&prompt) {
                    return Err(fail(Stage::Confirming)(cancelled(name)));
                }
                if !options.no_backup {
                    store.backup().map_err(fail(Stage::BackingUp))?;
                }
                store.remove_server(name);
                if let Err(e) = store.save() {
                    return Err(fail(Stage::Applying)(e).with_backup(store.take_backup()));
                }
                discard_backup(&mut store, &mut warnings);
            }
            Strategy::ExternalTool => {
                self.tool
                    .is_available()
                    .map_err(fail(Stage::CheckingExisting))?;
                let status = self
                    .tool
                    .server_status(name)
                    .map_err(fail(Stage::CheckingExisting))?;
                if !status.installed {
                    return Err(fail(Stage::CheckingExisting)(not_installed(name)));
                }
                if !options.skip_confirmation && !confirm.confirm(&prompt) {
                    return Err(fail(Stage::Confirming)(cancelled(name)));
                }
                self.tool
                    .remove_server(name)
                    .map_err(fail(Stage::Applying))?;
            }
        }

        tracing::info!(server = name, strategy = options.strategy.label(), "removed server");
        Ok(RemoveReport {
            server: name.to_string(),
            strategy: options.strategy.clone(),
            warnings,
        })
    }

    /// Edit the environment of an installed server in the host config file.
    pub fn configure(&self, name: &str, options: &ConfigureOptions) -> Outcome<ConfigureReport> {
        let fail = |stage: Stage| move |e: Error| InstallError::new(name, stage, e);
        validate_name(name).map_err(fail(Stage::Resolving))?;

        let Strategy::ConfigFile(path) = &options.strategy else {
            return Err(fail(Stage::Resolving)(Error::Unsupported {
                operation: "configure",
                strategy: options.strategy.label(),
            }));
        };

        let mut store = self.store(path).map_err(fail(Stage::Resolving))?;
        let definition = self.definition(name).map_err(fail(Stage::Resolving))?;
        validate_environment(&options.set).map_err(fail(Stage::Configuring))?;

        store.load_or_default().map_err(fail(Stage::CheckingExisting))?;
        let Some(existing) = store.get_server(name).cloned() else {
            return Err(fail(Stage::CheckingExisting)(not_installed(name)));
        };

        let mut requested: HashMap<String, String> = if options.reset {
            HashMap::new()
        } else {
            existing.env.clone().into_iter().collect()
        };
        for key in &options.unset {
            requested.remove(key);
        }
        requested.extend(options.set.clone());

        let env = resolve_environment(&definition, &requested, false)
            .map_err(fail(Stage::Configuring))?;

        let config = if options.reset {
            entry_for(&definition, env)
        } else {
            ServerConfig { env, ..existing }
        };

        if !options.no_backup {
            store.backup().map_err(fail(Stage::BackingUp))?;
        }
        store.add_server(name, config);
        if let Err(e) = store.save() {
            return Err(fail(Stage::Applying)(e).with_backup(store.take_backup()));
        }

        let mut warnings = Vec::new();
        discard_backup(&mut store, &mut warnings);

        let mut set: Vec<String> = options.set.keys().cloned().collect();
        set.sort();
        let mut unset = options.unset.clone();
        unset.sort();
        unset.dedup();

        tracing::info!(server = name, set = ?set, unset = ?unset, reset = options.reset, "reconfigured server");
        Ok(ConfigureReport {
            server: name.to_string(),
            set,
            unset,
            reset: options.reset,
            warnings,
        })
    }

    /// Installation and health of one server.
    pub fn status(&self, name: &str, strategy: &Strategy) -> Outcome<ServerStatus> {
        let fail = |stage: Stage| move |e: Error| InstallError::new(name, stage, e);
        validate_name(name).map_err(fail(Stage::Resolving))?;

        let mut status = match strategy {
            Strategy::ConfigFile(path) => {
                let mut store = self.store(path).map_err(fail(Stage::Resolving))?;
                store.load_or_default().map_err(fail(Stage::CheckingExisting))?;
                let mut status = ServerStatus {
                    name: name.to_string(),
                    ..ServerStatus::default()
                };
                if let Some(config) = store.get_server(name) {
                    status.installed = true;
                    if !config.command.is_empty() && which::which(&config.command).is_err() {
                        status
                            .errors
                            .push(format!("command `{}` not found on PATH", config.command));
                    }
                }
                status
            }
            Strategy::ExternalTool => {
                self.tool
                    .is_available()
                    .map_err(fail(Stage::CheckingExisting))?;
                self.tool
                    .server_status(name)
                    .map_err(fail(Stage::CheckingExisting))?
            }
        };

        if status.installed && status.version.is_none() {
            match self.definition(name) {
                Ok(definition) if !definition.version.is_empty() => {
                    status.version = Some(definition.version.clone());
                }
                Ok(_) => {}
                Err(e) => tracing::debug!(server = name, error = %e, "no catalog version"),
            }
        }
        Ok(status)
    }

    fn apply(&self, name: &str, options: &InstallOptions, mode: Mode) -> Outcome<InstallReport> {
        let fail = |stage: Stage| move |e: Error| InstallError::new(name, stage, e);

        validate_name(name).map_err(fail(Stage::Resolving))?;
        let definition = self.definition(name).map_err(fail(Stage::Resolving))?;

        match &options.strategy {
            Strategy::ConfigFile(path) => {
                let mut store = self.store(path).map_err(fail(Stage::Resolving))?;

                // Upgrades reuse the values already configured for the entry,
                // so the store is read before the environment is resolved.
                let existing = if mode == Mode::Upgrade {
                    store.load_or_default().map_err(fail(Stage::CheckingExisting))?;
                    store.get_server(name).cloned()
                } else {
                    None
                };
                let mut requested: HashMap<String, String> = existing
                    .as_ref()
                    .map(|config| config.env.clone().into_iter().collect())
                    .unwrap_or_default();
                requested.extend(options.env.clone());

                let env = resolve_environment(&definition, &requested, options.interactive)
                    .map_err(fail(Stage::Configuring))?;

                if mode == Mode::Install {
                    store.load_or_default().map_err(fail(Stage::CheckingExisting))?;
                }
                let mut warnings = definition_warnings(&definition);
                self.check_existing(name, mode, store.has_server(name), options, &mut warnings)?;

                if options.dry_run {
                    return Ok(dry_run_report(name, &definition, &env, options, warnings));
                }

                let mut config = entry_for(&definition, env);
                if let Some(existing) = existing {
                    config.extra = existing.extra;
                }

                if !options.no_backup {
                    store.backup().map_err(fail(Stage::BackingUp))?;
                }
                store.add_server(name, config);
                if let Err(e) = store.save() {
                    return Err(fail(Stage::Applying)(e).with_backup(store.take_backup()));
                }
                discard_backup(&mut store, &mut warnings);

                tracing::info!(
                    server = name,
                    config = %path.display(),
                    "{} server",
                    if mode == Mode::Upgrade { "upgraded" } else { "installed" }
                );
                Ok(finished_report(name, &definition, options, warnings))
            }
            Strategy::ExternalTool => {
                let env = resolve_environment(&definition, &options.env, options.interactive)
                    .map_err(fail(Stage::Configuring))?;

                self.tool
                    .is_available()
                    .map_err(fail(Stage::CheckingExisting))?;
                let status = self
                    .tool
                    .server_status(name)
                    .map_err(fail(Stage::CheckingExisting))?;
                let mut warnings = definition_warnings(&definition);
                self.check_existing(name, mode, status.installed, options, &mut warnings)?;

                if options.dry_run {
                    return Ok(dry_run_report(name, &definition, &env, options, warnings));
                }

                if mode == Mode::Upgrade {
                    self.tool
                        .remove_server(name)
                        .map_err(fail(Stage::Applying))?;
                }
                self.tool
                    .add_server(
                        name,
                        &definition.command.executable,
                        &definition.command.args,
                        &env,
                    )
                    .map_err(|e| {
                        let err = fail(Stage::Applying)(e);
                        if mode == Mode::Upgrade {
                            tracing::warn!(server = name, "upgrade failed after removing the server");
                            err.after_removal()
                        } else {
                            err
                        }
                    })?;

                Ok(finished_report(name, &definition, options, warnings))
            }
        }
    }

    fn check_existing(
        &self,
        name: &str,
        mode: Mode,
        installed: bool,
        options: &InstallOptions,
        warnings: &mut Vec<String>,
    ) -> Outcome<()> {
        let error = match (mode, installed) {
            (Mode::Install, true) => Error::AlreadyInstalled {
                name: name.to_string(),
            },
            (Mode::Upgrade, false) => not_installed(name),
            _ => return Ok(()),
        };
        if options.dry_run && mode == Mode::Install {
            tracing::warn!(server = name, "dry run for a server that is already installed");
            warnings.push(format!("{error}; a real install would fail"));
            return Ok(());
        }
        Err(InstallError::new(name, Stage::CheckingExisting, error))
    }

    fn definition(&self, name: &str) -> crate::error::Result<Arc<ServerDefinition>> {
        self.registry.get()?.get_server(name)
    }

    /// Store for a caller-supplied config path, validated before any
    /// filesystem access.
    fn store(&self, path: &Path) -> crate::error::Result<ConfigStore> {
        validate_path(path)?;
        Ok(ConfigStore::new(path).with_concurrency(self.concurrency))
    }
}

fn entry_for(definition: &ServerDefinition, env: IndexMap<String, String>) -> ServerConfig {
    ServerConfig::stdio(
        definition.command.executable.clone(),
        definition.command.args.clone(),
    )
    .with_env(env)
}

fn not_installed(name: &str) -> Error {
    Error::NotInstalled {
        name: name.to_string(),
    }
}

fn cancelled(name: &str) -> Error {
    Error::Cancelled {
        reason: format!("removal of {name} was declined"),
    }
}

/// Drop the session backup after a successful save. Failing to delete it is
/// not an error for the operation.
fn discard_backup(store: &mut ConfigStore, warnings: &mut Vec<String>) {
    if let Some(backup) = store.take_backup() {
        let path = backup.path().to_path_buf();
        if let Err(e) = backup.discard() {
            tracing::warn!(backup = %path.display(), error = %e, "could not remove backup");
            warnings.push(format!("backup left at {}", path.display()));
        }
    }
}

fn dry_run_report(
    name: &str,
    definition: &ServerDefinition,
    env: &IndexMap<String, String>,
    options: &InstallOptions,
    warnings: Vec<String>,
) -> InstallReport {
    let target = match options.strategy.config_path() {
        Some(path) => path.display().to_string(),
        None => "claude mcp".to_string(),
    };
    let variables = env
        .iter()
        .map(|(key, value)| {
            (
                key.clone(),
                mask_sensitive(value, definition.is_sensitive(key)),
            )
        })
        .collect();

    tracing::debug!(server = name, env_keys = ?env.keys().collect::<Vec<_>>(), "dry run");
    InstallReport {
        server: name.to_string(),
        strategy: options.strategy.clone(),
        dry_run: Some(DryRunPlan {
            server: name.to_string(),
            strategy: options.strategy.clone(),
            command: definition.command.executable.clone(),
            args: definition.command.args.clone(),
            variables,
            variable_count: env.len(),
            target,
        }),
        next_steps: Vec::new(),
        warnings,
    }
}

fn finished_report(
    name: &str,
    definition: &ServerDefinition,
    options: &InstallOptions,
    warnings: Vec<String>,
) -> InstallReport {
    let mut next_steps = vec![format!("Restart Claude to load {name}")];
    if !definition.verification.test_command.is_empty() {
        next_steps.push(format!(
            "Verify with: {}",
            definition.verification.test_command
        ));
    }
    if let Some(docs) = &definition.links.documentation {
        next_steps.push(format!("Documentation: {docs}"));
    }

    InstallReport {
        server: name.to_string(),
        strategy: options.strategy.clone(),
        dry_run: None,
        next_steps,
        warnings,
    }
}

/// Security notes and platform mismatches worth surfacing before install.
fn definition_warnings(definition: &ServerDefinition) -> Vec<String> {
    let mut warnings = definition.security.warnings.clone();

    let platforms = &definition.compatibility.platforms;
    if !platforms.is_empty() && !platforms.iter().any(|p| platform_matches(p)) {
        warnings.push(format!(
            "{} lists platforms [{}], not {}",
            definition.name,
            platforms.join(", "),
            std::env::consts::OS
        ));
    }
    warnings
}

fn platform_matches(platform: &str) -> bool {
    let os = std::env::consts::OS;
    match platform.to_ascii_lowercase().as_str() {
        "darwin" | "macos" | "mac" => os == "macos",
        "win32" | "windows" => os == "windows",
        other => other == os,
    }
}
