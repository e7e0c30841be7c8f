//! Client for the host tool's own `mcp` subcommands.
//!
//! Used by the external-tool install strategy, where the host tool owns its
//! config file and conduit only asks it to add or remove entries.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::registry::InstallationProbe;

/// Captured result of one subprocess run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    fn combined(&self) -> String {
        let stdout = self.stdout.trim_end();
        let stderr = self.stderr.trim_end();
        match (stdout.is_empty(), stderr.is_empty()) {
            (_, true) => stdout.to_string(),
            (true, false) => stderr.to_string(),
            (false, false) => format!("{stdout}\n{stderr}"),
        }
    }
}

/// Runs external programs. Swapped out in tests.
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput>;

    /// Resolve `program` to an executable path.
    fn locate(&self, program: &str) -> std::result::Result<PathBuf, which::Error> {
        which::which(program)
    }
}

/// Runs programs with `std::process::Command`, blocking until they exit.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput> {
        let output = Command::new(program).args(args).output()?;
        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Health of one server as far as conduit can tell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServerStatus {
    pub name: String,
    pub installed: bool,
    pub running: bool,
    pub version: Option<String>,
    pub errors: Vec<String>,
}

/// Wrapper around the `claude` CLI.
#[derive(Clone)]
pub struct ClaudeCli {
    tool: String,
    runner: Arc<dyn CommandRunner>,
}

impl std::fmt::Debug for ClaudeCli {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaudeCli")
            .field("tool", &self.tool)
            .finish_non_exhaustive()
    }
}

impl Default for ClaudeCli {
    fn default() -> Self {
        Self::new("claude")
    }
}

impl ClaudeCli {
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            runner: Arc::new(SystemRunner),
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// Path of the tool executable, or [`Error::ToolUnavailable`].
    pub fn is_available(&self) -> Result<PathBuf> {
        self.runner
            .locate(&self.tool)
            .map_err(|source| Error::ToolUnavailable {
                tool: self.tool.clone(),
                source,
            })
    }

    /// Servers the tool knows about, mapped to whether they are connected.
    pub fn list_servers(&self) -> Result<BTreeMap<String, bool>> {
        let args = vec!["mcp".to_string(), "list".to_string()];
        let output = self.run(&args)?;
        parse_list_output(&self.describe(&args), &output.stdout)
    }

    /// Register a stdio server with the tool.
    ///
    /// With environment variables the entry is passed as JSON through
    /// `mcp add-json`; otherwise `mcp add` is used.
    pub fn add_server(
        &self,
        name: &str,
        executable: &str,
        args: &[String],
        env: &IndexMap<String, String>,
    ) -> Result<()> {
        let command = add_server_args(name, executable, args, env);
        tracing::debug!(
            server = name,
            env_keys = ?env.keys().collect::<Vec<_>>(),
            "registering server with {}",
            self.tool
        );
        self.run(&command)?;
        tracing::info!(server = name, "server added via {}", self.tool);
        Ok(())
    }

    pub fn remove_server(&self, name: &str) -> Result<()> {
        let command = vec!["mcp".to_string(), "remove".to_string(), name.to_string()];
        self.run(&command)?;
        tracing::info!(server = name, "server removed via {}", self.tool);
        Ok(())
    }

    pub fn server_status(&self, name: &str) -> Result<ServerStatus> {
        let servers = self.list_servers()?;
        let mut status = ServerStatus {
            name: name.to_string(),
            ..ServerStatus::default()
        };
        if let Some(&connected) = servers.get(name) {
            status.installed = true;
            status.running = connected;
            if !connected {
                status.errors.push("server is not connected".to_string());
            }
        }
        Ok(status)
    }

    fn run(&self, args: &[String]) -> Result<CommandOutput> {
        let command = self.describe(args);
        tracing::debug!(command = %command, "running external tool");

        let output = self
            .runner
            .run(&self.tool, args)
            .map_err(|e| Error::io("run", PathBuf::from(&self.tool), e))?;
        if !output.success() {
            return Err(Error::ToolFailure {
                command,
                status: output.status,
                output: output.combined(),
            });
        }
        Ok(output)
    }

    /// Command line for logs and errors. Only the subcommand and server
    /// name are shown, since later arguments can carry secrets.
    fn describe(&self, args: &[String]) -> String {
        let mut parts = vec![self.tool.as_str()];
        parts.extend(args.iter().take(3).map(String::as_str));
        parts.join(" ")
    }
}

impl InstallationProbe for ClaudeCli {
    fn installed_servers(&self) -> Result<HashSet<String>> {
        Ok(self.list_servers()?.into_keys().collect())
    }
}

fn add_server_args(
    name: &str,
    executable: &str,
    args: &[String],
    env: &IndexMap<String, String>,
) -> Vec<String> {
    if !env.is_empty() {
        let entry = serde_json::json!({
            "type": "stdio",
            "command": executable,
            "args": args,
            "env": env,
        });
        return vec![
            "mcp".to_string(),
            "add-json".to_string(),
            name.to_string(),
            entry.to_string(),
        ];
    }

    let mut command = vec![
        "mcp".to_string(),
        "add".to_string(),
        name.to_string(),
        executable.to_string(),
    ];
    if !args.is_empty() {
        command.push("--".to_string());
        command.extend(args.iter().cloned());
    }
    command
}

const PROGRESS_PREFIXES: [&str; 2] = ["Checking MCP server health", "No MCP servers configured"];

const CONNECTED_MARKER: char = '✓';

/// Parse the human-readable output of `mcp list`.
///
/// Expects one `name: command - status` line per server. This follows the
/// tool's display format rather than a stable interface, so a change in
/// that format will surface here as [`Error::ToolOutput`].
pub fn parse_list_output(command: &str, text: &str) -> Result<BTreeMap<String, bool>> {
    let mut servers = BTreeMap::new();
    for line in text.lines().map(str::trim) {
        if line.is_empty() || PROGRESS_PREFIXES.iter().any(|p| line.starts_with(p)) {
            continue;
        }
        let name = match line.split_once(':') {
            Some((name, _)) if !name.trim().is_empty() => name.trim(),
            _ => {
                return Err(Error::ToolOutput {
                    command: command.to_string(),
                    line: line.to_string(),
                });
            }
        };
        servers.insert(name.to_string(), line.contains(CONNECTED_MARKER));
    }
    Ok(servers)
}
