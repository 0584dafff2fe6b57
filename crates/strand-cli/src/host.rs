//! Process-wide wiring: home, config, package manager, importers, loader.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use strand_config::Config;
use strand_core::{StrandHome, WorkspaceDir};
use strand_plugins::{
    BuiltinImporter, CandidateScanner, CommandTree, DiscoveryCache, HostEnvironment,
    ImporterChain, NodeId, NodeOrigin, Npm, PluginLoader, PluginRegistry, RegistryContext,
    ScanRoots,
};

use crate::config_bridge;

/// Everything a command handler may need.
pub(crate) struct Host {
    pub(crate) home: StrandHome,
    pub(crate) cwd: PathBuf,
    pub(crate) plugins_dir: PathBuf,
    pub(crate) config: Config,
    pub(crate) npm: Arc<Npm>,
    pub(crate) importer: Arc<ImporterChain>,
    pub(crate) verbose: bool,
}

impl Host {
    /// Wire up from the resolved home, working directory and config.
    pub(crate) fn new(home: StrandHome, cwd: PathBuf, config: Config, verbose: bool) -> Self {
        let npm = Arc::new(Npm::locate(&config.plugins.package_manager));
        let importer = Arc::new(ImporterChain::standard(
            BuiltinImporter::new(),
            config_bridge::to_wasm_config(&config),
        ));
        let plugins_dir = home.plugins_dir();
        Self {
            home,
            cwd,
            plugins_dir,
            config,
            npm,
            importer,
            verbose,
        }
    }

    /// Registry file path.
    pub(crate) fn registry_path(&self) -> PathBuf {
        self.home.registry_path()
    }

    /// Open the persisted registry.
    pub(crate) fn registry(&self) -> Result<PluginRegistry> {
        PluginRegistry::open(self.registry_path()).context("failed to open plugin registry")
    }

    /// Borrowed handles for registry operations that install or inspect.
    pub(crate) fn registry_context(&self) -> RegistryContext<'_> {
        RegistryContext {
            package_manager: self.npm.as_ref(),
            importer: self.importer.as_ref(),
            plugins_dir: &self.plugins_dir,
            cwd: &self.cwd,
        }
    }

    /// The project the host runs in.
    pub(crate) fn workspace(&self) -> WorkspaceDir {
        WorkspaceDir::from_path(&self.cwd)
    }

    /// Scanner over the standard roots.
    pub(crate) fn scanner(&self) -> CandidateScanner {
        CandidateScanner::new(
            ScanRoots::standard(&self.cwd, &self.home),
            config_bridge::to_naming(&self.config),
        )
        .with_package_manager(self.npm.clone())
    }

    /// Discovery cache under the home cache directory, unless disabled.
    pub(crate) fn discovery_cache(&self) -> Option<DiscoveryCache> {
        config_bridge::discovery_cache_ttl(&self.config)
            .map(|ttl| DiscoveryCache::new(self.home.plugin_cache_dir(), ttl))
    }

    /// Drop cached discovery after the set of installed plugins changed.
    pub(crate) fn invalidate_discovery(&self) {
        if let Some(cache) = self.discovery_cache() {
            cache.invalidate();
        }
    }

    /// Loader over `tree`, reading disabled and linked plugins from the
    /// registry.
    pub(crate) fn loader(&self, tree: CommandTree) -> PluginLoader {
        let loader = PluginLoader::new(
            HostEnvironment::new(&self.cwd),
            self.scanner(),
            self.importer.clone(),
            tree,
        )
        .with_options(config_bridge::to_loader_options(&self.config, self.verbose))
        .with_registry(self.registry_path());
        match self.discovery_cache() {
            Some(cache) => loader.with_cache(cache),
            None => loader,
        }
    }
}

/// A tree mirroring the built-in subcommands, so plugins extend them
/// instead of shadowing them.
pub(crate) fn host_tree(cli: &clap::Command) -> CommandTree {
    let mut tree = CommandTree::new(cli.get_name().to_owned());
    let root = tree.root();
    mirror(&mut tree, root, cli);
    tree
}

fn mirror(tree: &mut CommandTree, parent: NodeId, cmd: &clap::Command) {
    for sub in cmd.get_subcommands() {
        match tree.add_child(parent, sub.get_name().to_owned(), NodeOrigin::Host) {
            Ok(id) => {
                for alias in sub.get_all_aliases() {
                    if let Err(e) = tree.add_alias(id, alias) {
                        tracing::debug!(error = %e, "skipping built-in alias");
                    }
                }
                mirror(tree, id, sub);
            },
            Err(e) => tracing::debug!(error = %e, "skipping built-in command"),
        }
    }
}
