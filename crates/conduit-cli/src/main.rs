//! Conduit - MCP server catalog and installer
//!
//! Usage:
//!   conduit list               # Browse the catalog
//!   conduit show <name>        # Show one server definition
//!   conduit install <name> ... # Install into the host tool
//!   conduit status             # Show installed servers

mod prompt;

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use console::style;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use conduit_core::client::ServerStatus;
use conduit_core::config::{ConfigStore, Settings};
use conduit_core::host::{HostLocator, select_installation};
use conduit_core::install::{
    ConfigureOptions, InstallOptions, InstallReport, Installer, RemoveOptions, Strategy,
};
use conduit_core::registry::{CatalogListing, InstallationProbe, ListOptions};
use conduit_core::validate::{mask_sensitive, validate_path};
use conduit_core::InstallError;

use crate::prompt::TerminalConfirm;

#[derive(Parser)]
#[command(name = "conduit")]
#[command(about = "MCP server catalog and installer", long_about = None, version)]
struct Cli {
    /// Settings file (default: <config dir>/conduit/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List catalog servers
    List {
        /// Only servers in this category
        #[arg(long, short)]
        category: Option<String>,
        /// Only servers whose name or description contains this text
        #[arg(long, short)]
        search: Option<String>,
        /// Only installed servers
        #[arg(long, conflicts_with = "available")]
        installed: bool,
        /// Only servers that are not installed
        #[arg(long)]
        available: bool,
        #[command(flatten)]
        target: TargetArgs,
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Show a server definition
    Show {
        name: String,
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Install a server from the catalog
    Install(InstallArgs),

    /// Replace an installed server with the current catalog definition
    Upgrade(InstallArgs),

    /// Remove an installed server
    #[command(alias = "rm")]
    Remove {
        name: String,
        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
        /// Do not back up the host config first
        #[arg(long)]
        no_backup: bool,
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Change environment variables of an installed server
    Configure {
        name: String,
        /// Set a variable (KEY=VALUE)
        #[arg(long, value_name = "KEY=VALUE")]
        set: Vec<String>,
        /// Remove a variable
        #[arg(long, value_name = "KEY")]
        unset: Vec<String>,
        /// Rebuild the entry from the catalog before applying --set
        #[arg(long)]
        reset: bool,
        /// Do not back up the host config first
        #[arg(long)]
        no_backup: bool,
        /// Host config file to edit (default: detected host)
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Show installation status
    Status {
        /// Server to check (default: every installed server)
        name: Option<String>,
        #[command(flatten)]
        target: TargetArgs,
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// List catalog categories
    Categories {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Show detected host tools
    Hosts,
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
}

/// Where installed servers live.
#[derive(Args, Clone)]
struct TargetArgs {
    /// Host config file to edit (default: detected host)
    #[arg(long, value_name = "PATH", conflicts_with = "external_tool")]
    config: Option<PathBuf>,
    /// Go through the host tool's CLI instead of editing its config file
    #[arg(long)]
    external_tool: bool,
}

#[derive(Args)]
struct InstallArgs {
    /// Server name from the catalog
    name: String,
    /// Environment variable for the server (KEY=VALUE)
    #[arg(long, short, value_name = "KEY=VALUE")]
    env: Vec<String>,
    /// Show what would be written without changing anything
    #[arg(long)]
    dry_run: bool,
    /// Do not back up the host config first
    #[arg(long)]
    no_backup: bool,
    /// Prompt for missing required variables
    #[arg(short, long)]
    interactive: bool,
    #[command(flatten)]
    target: TargetArgs,
    /// Output format
    #[arg(short = 'o', long, default_value = "table")]
    format: OutputFormat,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "conduit=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let settings = match &cli.settings {
        Some(path) => Settings::load(path)?,
        None => Settings::load_default()?,
    };

    run_cli(cli.command, &settings)
}

fn run_cli(command: Commands, settings: &Settings) -> Result<()> {
    let installer = Installer::from_settings(settings);

    match command {
        Commands::List {
            category,
            search,
            installed,
            available,
            target,
            format,
        } => {
            let mut options = ListOptions::new();
            if let Some(category) = category {
                options = options.with_category(category);
            }
            if let Some(search) = search {
                options = options.with_search(search);
            }
            if installed {
                options = options.installed_only();
            }
            if available {
                options = options.available_only();
            }
            run_list(&installer, settings, &options, &target, format)?;
        }
        Commands::Show { name, format } => run_show(&installer, &name, format)?,
        Commands::Install(args) => {
            let options = install_options(&args, settings)?;
            let report = installer
                .install(&args.name, &options)
                .map_err(with_hint)?;
            print_install_report(&report, "Installed", args.format)?;
        }
        Commands::Upgrade(args) => {
            let options = install_options(&args, settings)?;
            let report = installer
                .upgrade(&args.name, &options)
                .map_err(with_hint)?;
            print_install_report(&report, "Upgraded", args.format)?;
        }
        Commands::Remove {
            name,
            yes,
            no_backup,
            target,
        } => {
            let options = RemoveOptions::new(strategy(&target, settings)?)
                .skip_confirmation(yes)
                .no_backup(no_backup || !settings.install.backup);
            let report = installer
                .remove(&name, &options, &TerminalConfirm::new())
                .map_err(with_hint)?;
            println!("{} Removed '{}'", style("✓").green(), report.server);
            print_warnings(&report.warnings);
        }
        Commands::Configure {
            name,
            set,
            unset,
            reset,
            no_backup,
            config,
        } => {
            let target = TargetArgs {
                config,
                external_tool: false,
            };
            let mut options = ConfigureOptions::new(strategy(&target, settings)?)
                .reset(reset)
                .no_backup(no_backup || !settings.install.backup);
            options.set = parse_env_pairs(&set)?;
            options.unset = unset;

            let report = installer.configure(&name, &options).map_err(with_hint)?;
            println!("{} Configured '{}'", style("✓").green(), report.server);
            if report.reset {
                println!("  Rebuilt from catalog definition");
            }
            for key in &report.set {
                println!("  set   {key}");
            }
            for key in &report.unset {
                println!("  unset {key}");
            }
            print_warnings(&report.warnings);
        }
        Commands::Status {
            name,
            target,
            format,
        } => run_status(&installer, settings, name, &target, format)?,
        Commands::Categories { format } => run_categories(&installer, format)?,
        Commands::Hosts => run_hosts()?,
    }
    Ok(())
}

fn run_list(
    installer: &Installer,
    settings: &Settings,
    options: &ListOptions,
    target: &TargetArgs,
    format: OutputFormat,
) -> Result<()> {
    let registry = installer.registry().get()?;
    let strategy = strategy(target, settings)?;
    let listings = match &strategy {
        Strategy::ConfigFile(path) => {
            let mut store = ConfigStore::new(path);
            store.load_or_default()?;
            registry.list_with_status(options, &store)?
        }
        Strategy::ExternalTool => {
            installer.tool().is_available()?;
            registry.list_with_status(options, installer.tool())?
        }
    };

    match format {
        OutputFormat::Table => print_listing_table(&listings),
        OutputFormat::Json => {
            let output: Vec<_> = listings
                .iter()
                .map(|l| {
                    serde_json::json!({
                        "name": l.entry.name,
                        "category": l.entry.category,
                        "description": l.entry.description,
                        "installed": l.installed,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn print_listing_table(listings: &[CatalogListing]) {
    if listings.is_empty() {
        println!("No servers match.");
        return;
    }

    println!("{:<3} {:<24} {:<16} Description", "", "Name", "Category");
    println!("{}", "-".repeat(80));
    for listing in listings {
        let marker = if listing.installed {
            style("✓").green().to_string()
        } else {
            " ".to_string()
        };
        println!(
            "{:<3} {:<24} {:<16} {}",
            marker, listing.entry.name, listing.entry.category, listing.entry.description
        );
    }
}

fn run_show(installer: &Installer, name: &str, format: OutputFormat) -> Result<()> {
    let registry = installer.registry().get()?;
    let definition = registry.get_server(name)?;

    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(&*definition)?);
        return Ok(());
    }

    println!("{}", style(&definition.name).bold().cyan());
    println!("  {}", definition.description);
    println!();
    println!("  Category: {}", definition.category);
    if !definition.author.is_empty() {
        println!("  Author:   {}", definition.author);
    }
    if !definition.version.is_empty() {
        println!("  Version:  {}", definition.version);
    }
    println!("  Command:  {}", definition.command.display());

    if !definition.environment.is_empty() {
        println!();
        println!("  {}", style("Environment").bold());
        for var in &definition.environment {
            let flag = if var.required {
                style("required").yellow().to_string()
            } else {
                style("optional").dim().to_string()
            };
            println!("    {:<32} {} {}", var.name, flag, var.description);
            if let Some(default) = &var.default {
                println!("      default: {}", mask_sensitive(default, var.sensitive));
            }
            if let Some(example) = &var.example {
                println!("      example: {}", mask_sensitive(example, var.sensitive));
            }
        }
    }

    if !definition.security.warnings.is_empty() {
        println!();
        println!("  {}", style("Security").bold());
        for warning in &definition.security.warnings {
            println!("    ⚠ {warning}");
        }
    }

    if let Some(homepage) = &definition.links.homepage {
        println!();
        println!("  Homepage: {homepage}");
    }
    Ok(())
}

fn run_status(
    installer: &Installer,
    settings: &Settings,
    name: Option<String>,
    target: &TargetArgs,
    format: OutputFormat,
) -> Result<()> {
    let strategy = strategy(target, settings)?;
    let names = match name {
        Some(name) => vec![name],
        None => {
            let mut installed: Vec<String> = match &strategy {
                Strategy::ConfigFile(path) => {
                    let mut store = ConfigStore::new(path);
                    store.load_or_default()?;
                    store.installed_servers()?
                }
                Strategy::ExternalTool => installer.tool().installed_servers()?,
            }
            .into_iter()
            .collect();
            installed.sort();
            installed
        }
    };

    let statuses = names
        .iter()
        .map(|name| installer.status(name, &strategy).map_err(with_hint))
        .collect::<Result<Vec<ServerStatus>>>()?;

    match format {
        OutputFormat::Table => {
            println!("Target: {strategy}");
            if statuses.is_empty() {
                println!("No servers installed.");
            }
            for status in &statuses {
                let state = match (status.installed, status.errors.is_empty()) {
                    (false, _) => style("not installed").dim().to_string(),
                    (true, true) => style("installed").green().to_string(),
                    (true, false) => style("installed").yellow().to_string(),
                };
                println!(
                    "  {:<24} {:<16} {}",
                    status.name,
                    state,
                    status.version.as_deref().unwrap_or("-")
                );
                for error in &status.errors {
                    println!("    ⚠ {error}");
                }
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&statuses)?),
    }
    Ok(())
}

fn run_categories(installer: &Installer, format: OutputFormat) -> Result<()> {
    let registry = installer.registry().get()?;
    let categories = registry.categories();

    match format {
        OutputFormat::Table => {
            for category in &categories {
                let count = registry.filter_by_category(category).len();
                match registry.category_meta(category) {
                    Some(meta) => println!(
                        "{} {:<20} {:>3}  {}",
                        meta.icon, category, count, meta.description
                    ),
                    None => println!("  {:<20} {:>3}", category, count),
                }
            }
        }
        OutputFormat::Json => {
            let output: Vec<_> = categories
                .iter()
                .map(|category| {
                    let meta = registry.category_meta(category);
                    serde_json::json!({
                        "name": category,
                        "count": registry.filter_by_category(category).len(),
                        "description": meta.map(|m| m.description.as_str()),
                        "icon": meta.map(|m| m.icon.as_str()),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn run_hosts() -> Result<()> {
    let locator = HostLocator::from_system()?;
    let hosts = locator.detect_all();
    let Ok(preferred) = select_installation(&hosts) else {
        println!("No Claude installation detected.");
        return Ok(());
    };
    for host in &hosts {
        let marker = if host == preferred {
            style("*").green()
        } else {
            style("•").cyan()
        };
        println!("{marker} {host} [{}]", style(host.kind.id()).dim());
    }
    Ok(())
}

fn install_options(args: &InstallArgs, settings: &Settings) -> Result<InstallOptions> {
    Ok(InstallOptions::new(strategy(&args.target, settings)?)
        .with_envs(parse_env_pairs(&args.env)?)
        .dry_run(args.dry_run)
        .no_backup(args.no_backup || !settings.install.backup)
        .interactive(args.interactive))
}

fn strategy(target: &TargetArgs, settings: &Settings) -> Result<Strategy> {
    if target.external_tool {
        return Ok(Strategy::ExternalTool);
    }
    let path = match &target.config {
        Some(path) if path.is_relative() => std::env::current_dir()
            .context("Failed to read current directory")?
            .join(path),
        Some(path) => path.clone(),
        None => settings.host_config_path()?,
    };
    validate_path(&path)?;
    Ok(Strategy::ConfigFile(path))
}

fn parse_env_pairs(pairs: &[String]) -> Result<HashMap<String, String>> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.to_string()))
                .ok_or_else(|| anyhow::anyhow!("Invalid variable '{pair}': expected KEY=VALUE"))
        })
        .collect()
}

fn with_hint(err: InstallError) -> anyhow::Error {
    if let Some(hint) = err.recovery_hint() {
        eprintln!("{} {hint}", style("hint:").yellow().bold());
    }
    err.into()
}

fn print_install_report(report: &InstallReport, verb: &str, format: OutputFormat) -> Result<()> {
    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    match &report.dry_run {
        Some(plan) => {
            println!("{} Dry run for '{}'", style("•").cyan(), plan.server);
            println!("  Target:   {}", plan.target);
            println!("  Command:  {} {}", plan.command, plan.args.join(" "));
            println!("  Variables ({}):", plan.variable_count);
            for (key, value) in &plan.variables {
                println!("    {key}={value}");
            }
        }
        None => {
            println!("{} {verb} '{}' via {}", style("✓").green(), report.server, report.strategy);
            for step in &report.next_steps {
                println!("  → {step}");
            }
        }
    }
    print_warnings(&report.warnings);
    Ok(())
}

fn print_warnings(warnings: &[String]) {
    for warning in warnings {
        println!("  {} {warning}", style("⚠").yellow());
    }
}
