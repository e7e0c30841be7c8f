#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use conduit_core::client::{ClaudeCli, CommandOutput, CommandRunner};
use conduit_core::install::Installer;
use conduit_core::registry::{CatalogRoot, IndexLoader, RegistryCache};

pub const GITHUB_TOKEN: &str = "GITHUB_PERSONAL_ACCESS_TOKEN";

/// Two-server catalog: `github` needs a token, `postgres` has a defaulted URL.
pub fn write_catalog(root: &Path) {
    std::fs::create_dir_all(root.join("servers")).unwrap();
    std::fs::write(
        root.join("registry.yml"),
        r#"
version: "1.0"
updated: "2025-01-10T12:00:00Z"
entries:
  - name: github
    file: servers/github.yml
    category: development
    description: GitHub repository access
  - name: postgres
    file: servers/postgres.yml
    category: database
    description: Read-only Postgres queries
categories:
  development:
    description: Developer tooling
    icon: "🔧"
  database:
    description: Databases
    icon: "🗄"
"#,
    )
    .unwrap();
    std::fs::write(
        root.join("servers/github.yml"),
        r#"
name: github
description: GitHub repository access
category: development
author: Anthropic
version: 0.6.2
command:
  executable: npx
  args: ["-y", "@modelcontextprotocol/server-github"]
environment:
  - name: GITHUB_PERSONAL_ACCESS_TOKEN
    description: Personal access token
    required: true
    sensitive: true
    validation: "^gh[ps]_[A-Za-z0-9]+$"
verification:
  test_command: "claude mcp list"
links:
  documentation: "https://github.com/modelcontextprotocol/servers"
"#,
    )
    .unwrap();
    std::fs::write(
        root.join("servers/postgres.yml"),
        r#"
name: postgres
description: Read-only Postgres queries
category: database
version: 0.3.0
command:
  executable: npx
  args: ["-y", "@modelcontextprotocol/server-postgres"]
environment:
  - name: POSTGRES_URL
    description: Connection string
    required: true
    sensitive: true
    default: "postgresql://localhost/postgres"
"#,
    )
    .unwrap();
}

pub fn registry_cache(root: &Path) -> Arc<RegistryCache> {
    let loader = IndexLoader::new(Arc::new(CatalogRoot::new(root)), "registry.yml");
    Arc::new(RegistryCache::new(loader))
}

/// Records every invocation and answers `mcp list` with canned output.
#[derive(Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<Vec<String>>>,
    list_output: Mutex<String>,
    fail_subcommand: Option<String>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listing(self, output: &str) -> Self {
        *self.list_output.lock().unwrap() = output.to_string();
        self
    }

    pub fn failing(mut self, subcommand: &str) -> Self {
        self.fail_subcommand = Some(subcommand.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls other than `mcp list`.
    pub fn mutating_calls(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|args| args.get(1).map(String::as_str) != Some("list"))
            .collect()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, _program: &str, args: &[String]) -> std::io::Result<CommandOutput> {
        self.calls.lock().unwrap().push(args.to_vec());
        let subcommand = args.get(1).cloned().unwrap_or_default();
        if self.fail_subcommand.as_deref() == Some(subcommand.as_str()) {
            return Ok(CommandOutput {
                status: Some(1),
                stdout: String::new(),
                stderr: format!("{subcommand} failed"),
            });
        }
        let stdout = if subcommand == "list" {
            self.list_output.lock().unwrap().clone()
        } else {
            String::new()
        };
        Ok(CommandOutput {
            status: Some(0),
            stdout,
            stderr: String::new(),
        })
    }

    fn locate(&self, program: &str) -> Result<PathBuf, which::Error> {
        Ok(PathBuf::from("/usr/local/bin").join(program))
    }
}

pub fn installer(root: &Path, runner: Arc<RecordingRunner>) -> Installer {
    let tool = ClaudeCli::new("claude").with_runner(runner);
    Installer::new(registry_cache(root), tool)
}
