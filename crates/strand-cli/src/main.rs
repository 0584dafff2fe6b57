//! Strand CLI - extensible command-line host.
//!
//! Built-in subcommands manage the plugin registry. Everything else comes
//! from plugins: they are discovered and mounted before arguments are
//! parsed, and their commands are grafted onto the parser.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::ffi::OsString;
use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use strand_config::Config;
use strand_core::StrandHome;
use strand_plugins::PluginLoader;

mod commands;
mod config_bridge;
mod dynamic;
mod host;
mod theme;

use commands::{
    capabilities, categories, doctor, hooks, registry, status, validate, watch, workspace,
};
use host::Host;

/// Strand - extensible CLI host
#[derive(Parser)]
#[command(name = "strand")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered plugins
    #[command(visible_alias = "ls")]
    List,

    /// Search registered plugins by name
    Search {
        /// Case-insensitive substring
        query: String,
    },

    /// Show a registered plugin
    Info {
        /// Plugin name
        name: String,
    },

    /// Check directories, the registry and plugin load results
    Doctor,

    /// Install a plugin package
    Install {
        /// Package name, optionally with a version (`pkg@1.2.3`)
        name: String,

        /// Install into the current project instead of the plugin directory
        #[arg(short, long)]
        workspace: bool,
    },

    /// Uninstall a plugin
    #[command(visible_alias = "rm")]
    Uninstall {
        /// Plugin name
        name: String,

        /// Only uninstall a project-scoped plugin
        #[arg(short, long)]
        workspace: bool,
    },

    /// Reinstall a plugin, or refresh a local one
    Update {
        /// Plugin name
        name: String,
    },

    /// Enable a registered plugin
    Enable {
        /// Plugin name
        name: String,
    },

    /// Disable a registered plugin without uninstalling it
    Disable {
        /// Plugin name
        name: String,
    },

    /// Register a local checkout as a plugin
    Link {
        /// Package directory
        path: PathBuf,
    },

    /// Forget a linked plugin
    Unlink {
        /// Plugin name
        name: String,
    },

    /// Check that a package is a valid plugin
    Validate {
        /// Package directory
        path: PathBuf,
    },

    /// List plugin categories
    Categories,

    /// Reload all plugins and show the results
    Reload,

    /// Inspect and run lifecycle hooks
    Hooks {
        #[command(subcommand)]
        command: HookCommands,
    },

    /// Show what plugins contribute
    Capabilities {
        /// Limit to one plugin
        name: Option<String>,
    },

    /// Manage project-scoped plugins
    Workspace {
        #[command(subcommand)]
        command: WorkspaceCommands,
    },

    /// Reload plugins when the plugin directory changes
    Watch,

    /// Show plugin load results
    Status,
}

#[derive(Subcommand)]
enum HookCommands {
    /// List the hooks registered plugins declare
    List,

    /// Show which hooks a plugin implements
    Inspect {
        /// Plugin name
        name: String,
    },

    /// Run a hook of a loaded plugin
    Run {
        /// Plugin name
        plugin: String,

        /// Hook name (onLoad, onRegister, onRun, onCommandRun)
        hook: String,
    },
}

#[derive(Subcommand)]
enum WorkspaceCommands {
    /// Install a plugin into the project and add it to the plugin list
    Add {
        /// Package name
        name: String,
    },

    /// Uninstall a project plugin and drop it from the plugin list
    Remove {
        /// Plugin name
        name: String,
    },

    /// Rewrite the registry file
    Sync,
}

/// Whether `-v`/`--verbose` appears before any `--`. Logging is set up
/// before the full parser exists, so the flag is read ahead of time.
fn verbose_requested<I>(args: I) -> bool
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .skip(1)
        .take_while(|a| a != "--")
        .any(|a| a == "-v" || a == "--verbose")
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let verbose = verbose_requested(std::env::args_os());
    let cwd = std::env::current_dir()?;
    let home = StrandHome::resolve()?;

    // Load unified config for logging setup.
    let loaded = Config::load_with_home(Some(&cwd), home.root());
    let config = loaded
        .as_ref()
        .map(|r| r.config.clone())
        .unwrap_or_default();

    // Set up logging from config, with --verbose override.
    let mut log_config = config_bridge::to_log_config(&config, &home.logs_dir());
    if verbose {
        "debug".clone_into(&mut log_config.level);
    }
    if let Err(e) = strand_telemetry::setup_logging(&log_config) {
        eprintln!("Failed to initialize logging: {e}");
    }
    match &loaded {
        Ok(resolved) => tracing::debug!(files = ?resolved.loaded_files, "configuration loaded"),
        Err(e) => tracing::warn!(error = %e, "invalid configuration, using defaults"),
    }
    if let Err(e) = home.ensure() {
        tracing::warn!(path = %home.root().display(), error = %e, "cannot create strand home");
    }

    let host = Host::new(home, cwd, config, verbose);

    // Mount plugins before parsing so their commands are known.
    let base = Cli::command();
    let mut loader = host.loader(host::host_tree(&base));
    loader.load().await;
    let mut app = dynamic::graft(base, loader.tree());

    let matches = app.clone().get_matches();
    if let Some(invocation) = dynamic::plugin_invocation(loader.tree(), &matches) {
        return dynamic::dispatch(invocation, &mut app).await;
    }
    let cli = Cli::from_arg_matches(&matches)?;
    tracing::trace!(verbose = cli.verbose, "parsed built-in command");

    // Handle commands
    match cli.command {
        Some(Commands::List) => {
            registry::list(&host)?;
        },
        Some(Commands::Search { query }) => {
            registry::search(&host, &query)?;
        },
        Some(Commands::Info { name }) => {
            registry::info(&host, &name)?;
        },
        Some(Commands::Doctor) => {
            doctor::run(&host, &loader)?;
        },
        Some(Commands::Install { name, workspace }) => {
            registry::install(&host, &name, workspace).await?;
        },
        Some(Commands::Uninstall { name, workspace }) => {
            registry::uninstall(&host, &name, workspace).await?;
        },
        Some(Commands::Update { name }) => {
            registry::update(&host, &name).await?;
        },
        Some(Commands::Enable { name }) => {
            registry::enable(&host, &name)?;
        },
        Some(Commands::Disable { name }) => {
            registry::disable(&host, &name)?;
        },
        Some(Commands::Link { path }) => {
            registry::link(&host, &path).await?;
        },
        Some(Commands::Unlink { name }) => {
            registry::unlink(&host, &name)?;
        },
        Some(Commands::Validate { path }) => {
            validate::run(&host, &path).await?;
        },
        Some(Commands::Categories) => {
            categories::run();
        },
        Some(Commands::Reload) => {
            status::reload(&mut loader).await;
        },
        Some(Commands::Hooks { command }) => {
            handle_hooks(&host, &loader, command).await?;
        },
        Some(Commands::Capabilities { name }) => {
            capabilities::run(&host, &loader, name.as_deref())?;
        },
        Some(Commands::Workspace { command }) => {
            handle_workspace(&host, command).await?;
        },
        Some(Commands::Watch) => {
            watch::run(&host, loader).await?;
        },
        Some(Commands::Status) => {
            status::run(&loader);
        },
        None => {
            app.print_help()?;
        },
    }

    Ok(())
}

async fn handle_hooks(host: &Host, loader: &PluginLoader, command: HookCommands) -> Result<()> {
    match command {
        HookCommands::List => hooks::list(host),
        HookCommands::Inspect { name } => hooks::inspect(host, loader, &name),
        HookCommands::Run { plugin, hook } => hooks::run(loader, &plugin, &hook).await,
    }
}

async fn handle_workspace(host: &Host, command: WorkspaceCommands) -> Result<()> {
    match command {
        WorkspaceCommands::Add { name } => workspace::add(host, &name).await,
        WorkspaceCommands::Remove { name } => workspace::remove(host, &name).await,
        WorkspaceCommands::Sync => workspace::sync(host),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn verbose_is_read_before_parsing() {
        assert!(verbose_requested(args(&["strand", "list", "-v"])));
        assert!(verbose_requested(args(&["strand", "--verbose", "deploy"])));
        assert!(!verbose_requested(args(&["strand", "deploy", "--", "-v"])));
        assert!(!verbose_requested(args(&["-v"])));
    }

    #[test]
    fn builtins_parse_from_grafted_matches() {
        let base = Cli::command();
        let tree = host::host_tree(&base);
        let app = dynamic::graft(base, &tree);
        let matches = app
            .try_get_matches_from(["strand", "install", "@strand/plugin-x", "--workspace"])
            .unwrap();
        assert!(dynamic::plugin_invocation(&tree, &matches).is_none());
        let cli = Cli::from_arg_matches(&matches).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Install { ref name, workspace: true }) if name == "@strand/plugin-x"
        ));
    }
}
