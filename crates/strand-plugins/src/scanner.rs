//! Candidate discovery across every plugin source.
//!
//! Sources, in scan order:
//! 1. `<cwd>/node_modules`
//! 2. the package manager's global root
//! 3. `<custom>/node_modules`
//! 4. directly installed folders inside `<custom>`
//! 5. names listed in the project and global plugin list files
//! 6. linked paths from the registry
//!
//! Discovery is best-effort: an unreadable root contributes nothing and
//! never fails the scan. Duplicate names across sources are kept; picking a
//! winner is [`dedupe_candidates`](crate::dedupe_candidates)' job.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::candidate::{CandidateDefaults, PluginCandidate, Provenance, RuntimeType, build_candidate};
use crate::error::PluginResult;
use crate::naming::PluginNaming;
use crate::npm::{NpmSpec, PackageManager};

/// Filesystem locations the scanner reads.
#[derive(Debug, Clone)]
pub struct ScanRoots {
    /// Working directory of the host process.
    pub cwd: PathBuf,
    /// Custom plugin directory (also the hot-reload watch root).
    pub custom_dir: PathBuf,
    /// Project plugin list file.
    pub project_list: PathBuf,
    /// Global plugin list file.
    pub global_list: PathBuf,
    /// Package roots linked through the registry.
    pub linked: Vec<PathBuf>,
}

impl ScanRoots {
    /// Standard layout for a project at `cwd` and a strand home.
    #[must_use]
    pub fn standard(cwd: impl Into<PathBuf>, home: &strand_core::StrandHome) -> Self {
        let cwd = cwd.into();
        Self {
            project_list: cwd.join(strand_core::dirs::PLUGIN_LIST_FILE),
            cwd,
            custom_dir: home.plugins_dir(),
            global_list: home.plugin_list_path(),
            linked: Vec::new(),
        }
    }
}

/// `{ "plugins": [...] }` list file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PluginListFile {
    #[serde(default)]
    plugins: Vec<String>,
}

/// Walks every plugin source and produces unvalidated candidates.
#[derive(Clone)]
pub struct CandidateScanner {
    roots: ScanRoots,
    naming: PluginNaming,
    package_manager: Option<Arc<dyn PackageManager>>,
}

impl std::fmt::Debug for CandidateScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandidateScanner")
            .field("roots", &self.roots)
            .field("naming", &self.naming)
            .field("package_manager", &self.package_manager.is_some())
            .finish()
    }
}

impl CandidateScanner {
    /// Create a scanner. Without a package manager the global root is skipped.
    #[must_use]
    pub fn new(roots: ScanRoots, naming: PluginNaming) -> Self {
        Self {
            roots,
            naming,
            package_manager: None,
        }
    }

    /// Resolve the global root through `pm`.
    #[must_use]
    pub fn with_package_manager(mut self, pm: Arc<dyn PackageManager>) -> Self {
        self.package_manager = Some(pm);
        self
    }

    /// Roots being scanned.
    #[must_use]
    pub fn roots(&self) -> &ScanRoots {
        &self.roots
    }

    /// Naming rules in use.
    #[must_use]
    pub fn naming(&self) -> &PluginNaming {
        &self.naming
    }

    /// Replace the linked package roots.
    pub fn set_linked(&mut self, linked: Vec<PathBuf>) {
        self.roots.linked = linked;
    }

    /// Run every source and return candidates in scan order.
    ///
    /// The same package reached twice (same name and package root, e.g.
    /// through both `node_modules` and a list file) is reported once.
    pub async fn scan(&self) -> Vec<PluginCandidate> {
        let roots = &self.roots;
        let global_root = match &self.package_manager {
            Some(pm) => pm.global_root().await,
            None => None,
        };

        let scans: [ScanFuture<'_>; 6] = [
            self.scan_node_modules(roots.cwd.join("node_modules"), Provenance::Local, RuntimeType::Npm),
            self.scan_optional_root(global_root, Provenance::Global, RuntimeType::Global),
            self.scan_node_modules(
                roots.custom_dir.join("node_modules"),
                Provenance::Custom,
                RuntimeType::Npm,
            ),
            Box::pin(self.scan_local_folders()),
            Box::pin(self.scan_plugin_lists()),
            Box::pin(self.scan_linked()),
        ];
        let sources = join_all(scans).await;

        let mut seen = HashSet::new();
        let candidates: Vec<PluginCandidate> = sources
            .into_iter()
            .flatten()
            .filter(|c| seen.insert((c.name().to_owned(), c.package_root().to_path_buf())))
            .collect();
        debug!(count = candidates.len(), "plugin scan complete");
        candidates
    }

    fn scan_optional_root(
        &self,
        root: Option<PathBuf>,
        provenance: Provenance,
        runtime_type: RuntimeType,
    ) -> ScanFuture<'_> {
        match root {
            Some(root) => self.scan_node_modules(root, provenance, runtime_type),
            None => Box::pin(async { Vec::new() }),
        }
    }

    /// Candidates directly inside a `node_modules` root, including the
    /// tool's own scope folder.
    fn scan_node_modules(
        &self,
        root: PathBuf,
        provenance: Provenance,
        runtime_type: RuntimeType,
    ) -> ScanFuture<'_> {
        Box::pin(async move {
            let mut package_roots = Vec::new();
            for (name, path) in list_dirs(&root).await {
                if name.starts_with('@') {
                    if !self.naming.is_own_scope(&name) {
                        continue;
                    }
                    package_roots.extend(
                        list_dirs(&path)
                            .await
                            .into_iter()
                            .filter(|(suffix, _)| self.naming.is_scoped_plugin(suffix))
                            .map(|(_, p)| p),
                    );
                } else if self.naming.is_standalone(&name) {
                    package_roots.push(path);
                }
            }

            join_all(package_roots.iter().map(|p| {
                build_candidate(p, provenance, runtime_type, CandidateDefaults::default())
            }))
            .await
            .into_iter()
            .flatten()
            .collect()
        })
    }

    /// Plain folders dropped straight into the custom directory.
    async fn scan_local_folders(&self) -> Vec<PluginCandidate> {
        let folders: Vec<_> = list_dirs(&self.roots.custom_dir)
            .await
            .into_iter()
            .filter(|(name, _)| name != "node_modules" && !name.starts_with('.'))
            .collect();

        join_all(folders.iter().map(|(name, path)| {
            build_candidate(
                path,
                Provenance::Custom,
                RuntimeType::Local,
                CandidateDefaults::local_folder(name),
            )
        }))
        .await
        .into_iter()
        .flatten()
        .collect()
    }

    /// Packages named in the project and global list files.
    async fn scan_plugin_lists(&self) -> Vec<PluginCandidate> {
        let mut names = read_plugin_list(&self.roots.project_list).await;
        names.extend(read_plugin_list(&self.roots.global_list).await);

        let mut roots = Vec::new();
        for name in names {
            if let Err(e) = NpmSpec::parse(&name) {
                warn!(plugin = %name, error = %e, "ignoring invalid plugin list entry");
                continue;
            }
            match self.resolve_listed(&name).await {
                Some(root) => roots.push((name, root)),
                None => {
                    let in_custom = is_dir(&self.roots.custom_dir.join("node_modules").join(&name)).await;
                    if !in_custom {
                        warn!(plugin = %name, "plugin config references missing package");
                    }
                },
            }
        }

        join_all(roots.iter().map(|(name, root)| {
            build_candidate(
                root,
                Provenance::Project,
                RuntimeType::Npm,
                CandidateDefaults {
                    name: Some(name.clone()),
                    version: None,
                },
            )
        }))
        .await
        .into_iter()
        .flatten()
        .collect()
    }

    /// Resolve a listed package name: the working directory's
    /// `node_modules`, its parent's, then every further ancestor's.
    async fn resolve_listed(&self, name: &str) -> Option<PathBuf> {
        for dir in self.roots.cwd.ancestors() {
            let candidate = dir.join("node_modules").join(name);
            if is_dir(&candidate).await {
                return Some(candidate);
            }
        }
        None
    }

    async fn scan_linked(&self) -> Vec<PluginCandidate> {
        join_all(self.roots.linked.iter().map(|path| {
            let folder = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned());
            build_candidate(
                path,
                Provenance::Linked,
                RuntimeType::Local,
                CandidateDefaults {
                    name: folder,
                    version: None,
                },
            )
        }))
        .await
        .into_iter()
        .flatten()
        .collect()
    }
}

type ScanFuture<'a> =
    std::pin::Pin<Box<dyn std::future::Future<Output = Vec<PluginCandidate>> + Send + 'a>>;

/// Subdirectories of `dir` as `(name, path)` pairs, sorted by name.
///
/// Symlinks to directories count as directories. Any read failure yields an
/// empty listing.
async fn list_dirs(dir: &Path) -> Vec<(String, PathBuf)> {
    let mut read = match tokio::fs::read_dir(dir).await {
        Ok(read) => read,
        Err(e) => {
            debug!(path = %dir.display(), error = %e, "skipping unreadable directory");
            return Vec::new();
        },
    };

    let mut out = Vec::new();
    loop {
        match read.next_entry().await {
            Ok(Some(entry)) => {
                let path = entry.path();
                if is_dir(&path).await {
                    out.push((entry.file_name().to_string_lossy().into_owned(), path));
                }
            },
            Ok(None) => break,
            Err(e) => {
                debug!(path = %dir.display(), error = %e, "directory listing interrupted");
                break;
            },
        }
    }
    out.sort_by(|a, b| a.0.cmp(&b.0));
    out
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok_and(|m| m.is_dir())
}

/// Read a `{ "plugins": [...] }` file. Missing or malformed files list nothing.
pub async fn read_plugin_list(path: &Path) -> Vec<String> {
    let Ok(content) = tokio::fs::read_to_string(path).await else {
        return Vec::new();
    };
    match serde_json::from_str::<PluginListFile>(&content) {
        Ok(list) => list.plugins,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring malformed plugin list file");
            Vec::new()
        },
    }
}

/// Write `names` as a `{ "plugins": [...] }` file, creating parent
/// directories as needed.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be written.
pub async fn write_plugin_list(path: &Path, names: &[String]) -> PluginResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let list = PluginListFile {
        plugins: names.to_vec(),
    };
    let mut body = serde_json::to_string_pretty(&list).map_err(std::io::Error::other)?;
    body.push('\n');
    tokio::fs::write(path, body).await?;
    debug!(path = %path.display(), count = names.len(), "wrote plugin list");
    Ok(())
}
