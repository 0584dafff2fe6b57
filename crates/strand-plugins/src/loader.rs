//! The load cycle: discover, dedupe, import, validate, mount.
//!
//! A [`PluginLoader`] owns the live command tree and everything derived from
//! a cycle. Every [`load`](PluginLoader::load) starts by detaching the nodes
//! the previous cycle mounted, so a reload always rebuilds from scratch.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tracing::{Instrument, debug, info, warn};

use crate::cache::DiscoveryCache;
use crate::candidate::PluginCandidate;
use crate::command::{CommandTree, MountTable, PluginCli};
use crate::context::{HostEnvironment, PluginContext, PluginRuntimeContext};
use crate::dedup::dedupe_candidates;
use crate::error::{PluginError, PluginResult};
use crate::export::{PluginDefinition, validate_definition};
use crate::hooks::execute_hook;
use crate::importer::{ModuleImporter, import_plugin_module, panic_message};
use crate::manifest::{ContributionKind, HookName, PluginManifest, validate_manifest};
use crate::package::is_file;
use crate::registry::PluginRegistry;
use crate::router::auto_register_commands;
use crate::sandbox::PluginSandbox;
use crate::scanner::CandidateScanner;

/// Outcome of one attempted load.
#[derive(Debug, Clone)]
pub struct PluginStatus {
    /// The candidate that was tried.
    pub candidate: PluginCandidate,
    /// Whether it mounted successfully.
    pub loaded: bool,
    /// Skipped because the registry has it disabled.
    pub disabled: bool,
    /// Why it did not.
    pub error: Option<String>,
    /// When it finished mounting.
    pub installed_at: Option<DateTime<Utc>>,
    /// How long the attempt took.
    pub duration: Option<Duration>,
}

impl PluginStatus {
    fn pending(candidate: PluginCandidate) -> Self {
        Self {
            candidate,
            loaded: false,
            disabled: false,
            error: None,
            installed_at: None,
            duration: None,
        }
    }

    /// Plugin name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.candidate.name()
    }
}

/// Loader switches, normally taken from `[plugins]` in the config.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoaderOptions {
    /// Run hooks and actions through a [`PluginSandbox`].
    pub sandbox: bool,
    /// Chattier sandbox logging.
    pub verbose: bool,
    /// Log "Loaded plugin" lines at info level.
    pub log_lifecycle: bool,
}

/// Counts from one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Candidates left after deduplication.
    pub discovered: usize,
    /// Plugins mounted.
    pub loaded: usize,
    /// Plugins that failed to mount. Disabled plugins are not counted.
    pub failed: usize,
}

/// A contribution name claimed by more than one loaded plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// Contribution kind.
    pub kind: ContributionKind,
    /// The contested name.
    pub name: String,
    /// Plugins providing it, in load order.
    pub plugins: Vec<String>,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Conflict: {} \"{}\" provided by {}",
            self.kind,
            self.name,
            self.plugins.join(", ")
        )
    }
}

/// Orchestrates plugin loading against one command tree.
pub struct PluginLoader {
    env: HostEnvironment,
    scanner: CandidateScanner,
    importer: Arc<dyn ModuleImporter>,
    tree: CommandTree,
    mounts: MountTable,
    options: LoaderOptions,
    registry_path: Option<PathBuf>,
    cache: Option<DiscoveryCache>,
    disabled: HashSet<String>,
    loaded: HashSet<String>,
    candidates: Vec<PluginCandidate>,
    statuses: Vec<PluginStatus>,
    manifests: Vec<Arc<PluginManifest>>,
}

impl fmt::Debug for PluginLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginLoader")
            .field("env", &self.env)
            .field("scanner", &self.scanner)
            .field("tree_nodes", &self.tree.len())
            .field("mounts", &self.mounts)
            .field("options", &self.options)
            .field("registry_path", &self.registry_path)
            .field("cache", &self.cache)
            .field("statuses", &self.statuses.len())
            .finish_non_exhaustive()
    }
}

impl PluginLoader {
    /// Loader mounting into `tree`, which may already hold host commands.
    #[must_use]
    pub fn new(
        env: HostEnvironment,
        scanner: CandidateScanner,
        importer: Arc<dyn ModuleImporter>,
        tree: CommandTree,
    ) -> Self {
        Self {
            env,
            scanner,
            importer,
            tree,
            mounts: MountTable::new(),
            options: LoaderOptions::default(),
            registry_path: None,
            cache: None,
            disabled: HashSet::new(),
            loaded: HashSet::new(),
            candidates: Vec::new(),
            statuses: Vec::new(),
            manifests: Vec::new(),
        }
    }

    /// Set loader switches.
    #[must_use]
    pub fn with_options(mut self, options: LoaderOptions) -> Self {
        self.options = options;
        self
    }

    /// Consult the registry at `path` for disabled and linked plugins on
    /// every cycle.
    #[must_use]
    pub fn with_registry(mut self, path: impl Into<PathBuf>) -> Self {
        self.registry_path = Some(path.into());
        self
    }

    /// Reuse scan results through `cache` until it expires or
    /// [`reload`](Self::reload) drops it.
    #[must_use]
    pub fn with_cache(mut self, cache: DiscoveryCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Host environment.
    #[must_use]
    pub fn env(&self) -> &HostEnvironment {
        &self.env
    }

    /// Scanner in use.
    #[must_use]
    pub fn scanner(&self) -> &CandidateScanner {
        &self.scanner
    }

    /// Live command tree.
    #[must_use]
    pub fn tree(&self) -> &CommandTree {
        &self.tree
    }

    /// Mutable access for host command registration.
    pub fn tree_mut(&mut self) -> &mut CommandTree {
        &mut self.tree
    }

    /// Nodes mounted per plugin in the current cycle.
    #[must_use]
    pub fn mounts(&self) -> &MountTable {
        &self.mounts
    }

    /// Status of every plugin attempted in the last cycle.
    #[must_use]
    pub fn statuses(&self) -> &[PluginStatus] {
        &self.statuses
    }

    /// Candidates that survived deduplication in the last cycle.
    #[must_use]
    pub fn candidates(&self) -> &[PluginCandidate] {
        &self.candidates
    }

    /// Manifests of loaded plugins, in load order.
    #[must_use]
    pub fn manifests(&self) -> &[Arc<PluginManifest>] {
        &self.manifests
    }

    /// Manifest of loaded plugin `name`.
    #[must_use]
    pub fn manifest(&self, name: &str) -> Option<&Arc<PluginManifest>> {
        self.manifests.iter().find(|m| m.name == name)
    }

    /// Run one load cycle. Statuses, manifests and the already-loaded guard
    /// start empty every time.
    pub async fn load(&mut self) -> LoadSummary {
        let span = self.env.span().clone();
        async {
            let detached = self.mounts.detach_all(&mut self.tree);
            if detached > 0 {
                debug!(detached, "detached previous plugin commands");
            }
            self.loaded.clear();
            self.statuses.clear();
            self.manifests.clear();
            self.refresh_from_registry();

            let found = self.discover().await;
            let deduped = dedupe_candidates(found);
            self.candidates = deduped.candidates;

            let candidates = self.candidates.clone();
            for candidate in candidates {
                self.load_candidate(candidate).await;
            }

            if self.candidates.is_empty() {
                info!("No plugins discovered");
            }
            for conflict in self.conflicts() {
                warn!("{conflict}");
            }

            let loaded = self.statuses.iter().filter(|s| s.loaded).count();
            let failed = self
                .statuses
                .iter()
                .filter(|s| !s.loaded && !s.disabled)
                .count();
            LoadSummary {
                discovered: self.candidates.len(),
                loaded,
                failed,
            }
        }
        .instrument(span)
        .await
    }

    /// Forget everything from the previous cycle, including cached
    /// discovery, and load again.
    pub async fn reload(&mut self) -> LoadSummary {
        self.candidates.clear();
        if let Some(cache) = &self.cache {
            cache.invalidate();
        }
        let summary = self.load().await;
        debug!(loaded = summary.loaded, failed = summary.failed, "plugins reloaded");
        summary
    }

    /// Run hook `hook` of loaded plugin `plugin` outside any command.
    ///
    /// # Errors
    ///
    /// [`PluginError::NotFound`] when the plugin is not loaded, or the
    /// hook's own failure.
    pub async fn run_hook(&self, plugin: &str, hook: HookName) -> PluginResult<()> {
        let manifest = self
            .manifest(plugin)
            .cloned()
            .ok_or_else(|| PluginError::NotFound(plugin.to_owned()))?;
        let ctx = PluginRuntimeContext::new(self.env.root_path(), Arc::clone(&manifest));
        let sandbox = self
            .options
            .sandbox
            .then(|| PluginSandbox::new(Arc::clone(&manifest), self.env.root_path(), self.options.verbose));
        execute_hook(&manifest.hooks, hook, &ctx, sandbox.as_ref()).await
    }

    /// Contribution names provided by more than one loaded plugin.
    #[must_use]
    pub fn conflicts(&self) -> Vec<Conflict> {
        let mut conflicts = Vec::new();
        for kind in ContributionKind::ALL {
            let mut owners: BTreeMap<&str, Vec<String>> = BTreeMap::new();
            for manifest in &self.manifests {
                for name in manifest.names_of(kind) {
                    let plugins = owners.entry(name).or_default();
                    if !plugins.contains(&manifest.name) {
                        plugins.push(manifest.name.clone());
                    }
                }
            }
            conflicts.extend(
                owners
                    .into_iter()
                    .filter(|(_, plugins)| plugins.len() > 1)
                    .map(|(name, plugins)| Conflict {
                        kind,
                        name: name.to_owned(),
                        plugins,
                    }),
            );
        }
        conflicts
    }

    async fn discover(&self) -> Vec<PluginCandidate> {
        let linked = &self.scanner.roots().linked;
        if let Some(cache) = &self.cache
            && let Some(cached) = cache.read(linked).await
        {
            debug!(candidates = cached.len(), "using cached plugin discovery");
            return cached;
        }
        let found = self.scanner.scan().await;
        if let Some(cache) = &self.cache {
            cache.store(linked, &found);
        }
        found
    }

    fn refresh_from_registry(&mut self) {
        let Some(path) = &self.registry_path else {
            return;
        };
        match PluginRegistry::open(path.as_path()) {
            Ok(registry) => {
                self.disabled = registry.disabled().map(str::to_owned).collect();
                self.scanner.set_linked(registry.linked_paths());
            },
            Err(e) => warn!(error = %e, "could not read plugin registry"),
        }
    }

    async fn load_candidate(&mut self, candidate: PluginCandidate) {
        let name = candidate.name().to_owned();
        if !self.loaded.insert(name.clone()) {
            return;
        }

        let mut status = PluginStatus::pending(candidate.clone());
        if self.disabled.contains(&name) {
            status.disabled = true;
            status.error = Some("Disabled in registry".to_owned());
            debug!(plugin = %name, "skipping disabled plugin");
            self.statuses.push(status);
            return;
        }

        let started = Instant::now();
        match self.mount(&candidate).await {
            Ok(manifest) => {
                let elapsed = started.elapsed();
                status.loaded = true;
                status.installed_at = Some(Utc::now());
                status.duration = Some(elapsed);
                self.manifests.push(manifest);
                let message = format!(
                    "Loaded plugin: {name} ({}) in {}ms",
                    candidate.runtime_type(),
                    elapsed.as_millis()
                );
                if self.options.log_lifecycle {
                    info!("{message}");
                } else {
                    debug!("{message}");
                }
            },
            Err(reason) => {
                self.mounts.detach_plugin(&mut self.tree, &name);
                warn!("Plugin failed: {name} - Reason: {reason}");
                status.error = Some(reason);
                status.duration = Some(started.elapsed());
            },
        }
        self.statuses.push(status);
    }

    /// Import, validate and mount one candidate. Errors are the reason text
    /// recorded in its status.
    async fn mount(&mut self, candidate: &PluginCandidate) -> Result<Arc<PluginManifest>, String> {
        let cwd = self.env.root_path().to_path_buf();
        let entry = candidate.entry_file();
        if !is_file(entry).await {
            return Err(format!("Entry file missing: {}", entry.display()));
        }

        let module = import_plugin_module(self.importer.as_ref(), entry, &cwd)
            .await
            .ok_or_else(|| "Failed to import module".to_owned())?;
        let definition = module
            .default
            .ok_or(PluginError::InvalidExport)
            .and_then(validate_definition)
            .map_err(|e| e.to_string())?;
        let manifest = Arc::new(
            validate_manifest(&definition.export, candidate.name()).map_err(|e| e.to_string())?,
        );

        let runtime = PluginRuntimeContext::new(&cwd, Arc::clone(&manifest));
        let sandbox = self.options.sandbox.then(|| {
            let sandbox = PluginSandbox::new(Arc::clone(&manifest), &cwd, self.options.verbose);
            sandbox.prepare();
            sandbox.verify_permissions();
            Arc::new(sandbox)
        });

        let hooks = &manifest.hooks;
        execute_hook(hooks, HookName::OnLoad, &runtime, sandbox.as_deref())
            .await
            .map_err(|e| e.to_string())?;

        let plugin_ctx = PluginContext {
            root_path: cwd.clone(),
            plugin_path: candidate.package_root().to_path_buf(),
            plugin_name: candidate.name().to_owned(),
            version: candidate.version().unwrap_or("0.0.0").to_owned(),
            plugin_type: candidate.runtime_type(),
            host_version: self.env.host_version().to_owned(),
            runtime: runtime.clone(),
        };
        install_into(
            &mut self.tree,
            &mut self.mounts,
            &definition,
            &plugin_ctx,
            &manifest,
            sandbox,
        )
        .await?;

        execute_hook(hooks, HookName::OnRegister, &runtime, None)
            .await
            .map_err(|e| e.to_string())?;
        Ok(manifest)
    }
}

/// Call the plugin's `install` and mount its declared commands through one
/// [`PluginCli`] at the tree root.
async fn install_into(
    tree: &mut CommandTree,
    mounts: &mut MountTable,
    definition: &PluginDefinition,
    ctx: &PluginContext,
    manifest: &Arc<PluginManifest>,
    sandbox: Option<Arc<PluginSandbox>>,
) -> Result<(), String> {
    let root = tree.root();
    let mut cli = PluginCli::new(tree, mounts, &ctx.plugin_name, root);

    AssertUnwindSafe(definition.install.install(&mut cli, ctx))
        .catch_unwind()
        .await
        .map_err(|payload| panic_message(payload.as_ref()))?
        .map_err(|e| format!("{e:#}"))?;

    auto_register_commands(&mut cli, manifest, &ctx.runtime, sandbox).map_err(|e| e.to_string())?;
    Ok(())
}
