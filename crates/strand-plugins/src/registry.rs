//! Persistent registry of installed and linked plugins.
//!
//! Stored as `{ "plugins": [...] }` JSON. Reads take a shared advisory lock
//! on a `.lk` sibling, writes an exclusive one, and every write goes to a
//! temporary file that is synced and renamed into place.

use std::fmt;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::candidate::{LOCAL_VERSION, Provenance, RuntimeType};
use crate::error::{PluginError, PluginResult};
use crate::importer::ModuleImporter;
use crate::inspect::inspect_package;
use crate::manifest::ManifestSnapshot;
use crate::npm::{NpmSpec, PackageManager};
use crate::package::read_package_manifest;

/// How a registered plugin got onto this machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrySource {
    /// A folder placed in the custom plugin directory.
    Local,
    /// Installed into the custom plugin directory by the package manager.
    Global,
    /// A linked checkout.
    Linked,
    /// Installed into the current project.
    Workspace,
}

impl fmt::Display for RegistrySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Local => "local",
            Self::Global => "global",
            Self::Linked => "linked",
            Self::Workspace => "workspace",
        })
    }
}

/// Where `install` puts a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallScope {
    /// `<home>/plugins`.
    Global,
    /// The current project.
    Workspace,
}

impl InstallScope {
    fn source(self) -> RegistrySource {
        match self {
            Self::Global => RegistrySource::Global,
            Self::Workspace => RegistrySource::Workspace,
        }
    }
}

/// One registered plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryRecord {
    /// Plugin name.
    pub name: String,
    /// Installed version.
    pub version: String,
    /// Package root.
    pub location: PathBuf,
    /// Whether the loader should load it.
    pub enabled: bool,
    /// How it was installed.
    pub source: RegistrySource,
    /// What it contributes.
    #[serde(default)]
    pub manifest: ManifestSnapshot,
    /// Whether `location` is a linked checkout.
    #[serde(default)]
    pub linked: bool,
    /// When the record was last refreshed.
    pub last_checked: DateTime<Utc>,
}

impl RegistryRecord {
    /// Enabled record checked now.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        location: impl Into<PathBuf>,
        source: RegistrySource,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            location: location.into(),
            enabled: true,
            source,
            manifest: ManifestSnapshot::default(),
            linked: source == RegistrySource::Linked,
            last_checked: Utc::now(),
        }
    }

    /// Attach a manifest snapshot.
    #[must_use]
    pub fn with_manifest(mut self, manifest: ManifestSnapshot) -> Self {
        self.manifest = manifest;
        self
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    plugins: Vec<RegistryRecord>,
}

/// What `install`, `uninstall`, `update` and `link` need besides the file.
#[derive(Clone, Copy)]
pub struct RegistryContext<'a> {
    /// Package manager to run.
    pub package_manager: &'a dyn PackageManager,
    /// Importer used to read manifests.
    pub importer: &'a dyn ModuleImporter,
    /// Global install prefix, normally `<home>/plugins`.
    pub plugins_dir: &'a Path,
    /// Workspace install prefix and import base.
    pub cwd: &'a Path,
}

impl fmt::Debug for RegistryContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryContext")
            .field("plugins_dir", &self.plugins_dir)
            .field("cwd", &self.cwd)
            .finish_non_exhaustive()
    }
}

impl RegistryContext<'_> {
    fn prefix(&self, scope: InstallScope) -> &Path {
        match scope {
            InstallScope::Global => self.plugins_dir,
            InstallScope::Workspace => self.cwd,
        }
    }

    /// Name, version and manifest for the package at `root`. A manifest
    /// that cannot be read is logged and recorded as name and version only.
    async fn describe(
        &self,
        root: &Path,
        provenance: Provenance,
        runtime_type: RuntimeType,
    ) -> PluginResult<(String, String, ManifestSnapshot)> {
        match inspect_package(self.importer, root, self.cwd, provenance, runtime_type).await {
            Ok(inspected) => {
                let snapshot = inspected.manifest.snapshot();
                Ok((snapshot.name.clone(), snapshot.version.clone(), snapshot))
            },
            Err(e @ PluginError::InvalidPackage { .. }) => Err(e),
            Err(e) => {
                warn!(path = %root.display(), error = %e, "could not read plugin manifest");
                let pkg = read_package_manifest(root).await;
                let fallback_name = root
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let pkg = pkg.unwrap_or_default();
                let name = pkg.name.unwrap_or(fallback_name);
                let version = pkg.version.unwrap_or_else(|| LOCAL_VERSION.to_owned());
                let snapshot = ManifestSnapshot {
                    name: name.clone(),
                    version: version.clone(),
                    ..ManifestSnapshot::default()
                };
                Ok((name, version, snapshot))
            },
        }
    }
}

/// The registry file and its records.
#[derive(Debug, Clone)]
pub struct PluginRegistry {
    path: PathBuf,
    records: Vec<RegistryRecord>,
}

impl PluginRegistry {
    /// Load the registry at `path`. A missing file is an empty registry.
    ///
    /// # Errors
    ///
    /// [`PluginError::RegistryError`] when the file exists but cannot be read
    /// or parsed.
    pub fn open(path: impl Into<PathBuf>) -> PluginResult<Self> {
        let path = path.into();
        let _lock = acquire_lock(&path, LockMode::Shared)?;

        let records = match std::fs::read_to_string(&path) {
            Ok(content) => {
                let file: RegistryFile = serde_json::from_str(&content)
                    .map_err(|e| registry_error(&path, format!("failed to parse registry: {e}")))?;
                file.plugins
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(registry_error(&path, format!("failed to read registry: {e}"))),
        };
        debug!(path = %path.display(), records = records.len(), "loaded plugin registry");
        Ok(Self { path, records })
    }

    /// Registry file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All records in insertion order.
    #[must_use]
    pub fn list(&self) -> &[RegistryRecord] {
        &self.records
    }

    /// Record for `name`.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&RegistryRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    /// Records whose name contains `query`, ignoring case.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<&RegistryRecord> {
        let needle = query.to_lowercase();
        self.records
            .iter()
            .filter(|r| r.name.to_lowercase().contains(&needle))
            .collect()
    }

    /// Names of disabled plugins.
    pub fn disabled(&self) -> impl Iterator<Item = &str> {
        self.records
            .iter()
            .filter(|r| !r.enabled)
            .map(|r| r.name.as_str())
    }

    /// Locations of linked plugins.
    #[must_use]
    pub fn linked_paths(&self) -> Vec<PathBuf> {
        self.records
            .iter()
            .filter(|r| r.linked)
            .map(|r| r.location.clone())
            .collect()
    }

    /// Insert `record`, replacing any record with the same name, and save.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be written.
    pub fn add(&mut self, record: RegistryRecord) -> PluginResult<()> {
        match self.records.iter_mut().find(|r| r.name == record.name) {
            Some(existing) => *existing = record,
            None => self.records.push(record),
        }
        self.save()
    }

    /// Remove and return the record for `name`, then save.
    ///
    /// # Errors
    ///
    /// [`PluginError::NotFound`] for an unknown name, or a write failure.
    pub fn remove(&mut self, name: &str) -> PluginResult<RegistryRecord> {
        let idx = self
            .records
            .iter()
            .position(|r| r.name == name)
            .ok_or_else(|| PluginError::NotFound(name.to_owned()))?;
        let record = self.records.remove(idx);
        self.save()?;
        Ok(record)
    }

    /// Mark `name` enabled and save.
    ///
    /// # Errors
    ///
    /// [`PluginError::NotFound`] for an unknown name, or a write failure.
    pub fn enable(&mut self, name: &str) -> PluginResult<()> {
        self.set_enabled(name, true)
    }

    /// Mark `name` disabled and save.
    ///
    /// # Errors
    ///
    /// [`PluginError::NotFound`] for an unknown name, or a write failure.
    pub fn disable(&mut self, name: &str) -> PluginResult<()> {
        self.set_enabled(name, false)
    }

    fn set_enabled(&mut self, name: &str, enabled: bool) -> PluginResult<()> {
        let record = self
            .records
            .iter_mut()
            .find(|r| r.name == name)
            .ok_or_else(|| PluginError::NotFound(name.to_owned()))?;
        record.enabled = enabled;
        record.last_checked = Utc::now();
        self.save()
    }

    /// Register the package at `path` as a linked plugin.
    ///
    /// # Errors
    ///
    /// [`PluginError::InvalidPackage`] when `path` is not a plugin package,
    /// or a write failure.
    pub async fn link(&mut self, ctx: &RegistryContext<'_>, path: &Path) -> PluginResult<&RegistryRecord> {
        let location = std::path::absolute(path)?;
        let (name, version, snapshot) = ctx
            .describe(&location, Provenance::Linked, RuntimeType::Local)
            .await?;
        info!(name = %name, path = %location.display(), "linked plugin");
        let record =
            RegistryRecord::new(name.clone(), version, location, RegistrySource::Linked).with_manifest(snapshot);
        self.add(record)?;
        self.find(&name).ok_or(PluginError::NotFound(name))
    }

    /// Forget a linked plugin. The checkout itself is left alone.
    ///
    /// # Errors
    ///
    /// [`PluginError::NotFound`] for an unknown name,
    /// [`PluginError::NotLinked`] when the record is not linked.
    pub fn unlink(&mut self, name: &str) -> PluginResult<RegistryRecord> {
        let record = self
            .find(name)
            .ok_or_else(|| PluginError::NotFound(name.to_owned()))?;
        if !record.linked {
            return Err(PluginError::NotLinked(name.to_owned()));
        }
        self.remove(name)
    }

    /// Install `name` (`pkg`, `@scope/pkg`, `pkg@1.2.3`) and record it.
    /// Without a version the latest is installed.
    ///
    /// # Errors
    ///
    /// Invalid package names, package manager failures, and packages that
    /// turn out not to be plugins.
    pub async fn install(
        &mut self,
        ctx: &RegistryContext<'_>,
        name: &str,
        scope: InstallScope,
    ) -> PluginResult<&RegistryRecord> {
        let mut spec = NpmSpec::parse(name)?;
        if spec.version.is_none() {
            spec = spec.with_version("latest");
        }
        let prefix = ctx.prefix(scope);
        ctx.package_manager.install(&spec, prefix).await?;

        let root = spec.install_path(prefix);
        let provenance = match scope {
            InstallScope::Global => Provenance::Custom,
            InstallScope::Workspace => Provenance::Local,
        };
        let (_, version, snapshot) = ctx.describe(&root, provenance, RuntimeType::Npm).await?;
        let full_name = spec.full_name();
        info!(name = %full_name, version = %version, scope = %scope.source(), "installed plugin");

        let record = RegistryRecord::new(full_name.clone(), version, root, scope.source())
            .with_manifest(snapshot);
        self.add(record)?;
        self.find(&full_name).ok_or(PluginError::NotFound(full_name))
    }

    /// Uninstall `name` and drop its record.
    ///
    /// Package-manager installs are removed through the package manager and
    /// their directory is deleted. Local folders are deleted. Linked
    /// checkouts are only unregistered.
    ///
    /// # Errors
    ///
    /// [`PluginError::NotFound`] for an unknown name, or any failure of the
    /// removal steps.
    pub async fn uninstall(&mut self, ctx: &RegistryContext<'_>, name: &str) -> PluginResult<RegistryRecord> {
        let record = self
            .find(name)
            .cloned()
            .ok_or_else(|| PluginError::NotFound(name.to_owned()))?;

        let scope = match record.source {
            RegistrySource::Global => Some(InstallScope::Global),
            RegistrySource::Workspace => Some(InstallScope::Workspace),
            RegistrySource::Local | RegistrySource::Linked => None,
        };
        if let Some(scope) = scope {
            let spec = NpmSpec::parse(&record.name)?;
            ctx.package_manager.uninstall(&spec, ctx.prefix(scope)).await?;
        }
        if record.source != RegistrySource::Linked {
            remove_dir_if_present(&record.location).await?;
        }
        info!(name = %record.name, "uninstalled plugin");
        self.remove(name)
    }

    /// Reinstall `name` in its original scope, or re-read the manifest of a
    /// local or linked plugin.
    ///
    /// # Errors
    ///
    /// [`PluginError::NotFound`] for an unknown name, or the install error.
    pub async fn update(&mut self, ctx: &RegistryContext<'_>, name: &str) -> PluginResult<&RegistryRecord> {
        let record = self
            .find(name)
            .cloned()
            .ok_or_else(|| PluginError::NotFound(name.to_owned()))?;

        match record.source {
            RegistrySource::Global => self.install(ctx, &record.name, InstallScope::Global).await,
            RegistrySource::Workspace => self.install(ctx, &record.name, InstallScope::Workspace).await,
            RegistrySource::Local | RegistrySource::Linked => {
                let provenance = if record.linked {
                    Provenance::Linked
                } else {
                    Provenance::Custom
                };
                let (_, version, snapshot) = ctx
                    .describe(&record.location, provenance, RuntimeType::Local)
                    .await?;
                let refreshed = RegistryRecord {
                    version,
                    manifest: snapshot,
                    last_checked: Utc::now(),
                    ..record
                };
                self.add(refreshed)?;
                self.find(name).ok_or_else(|| PluginError::NotFound(name.to_owned()))
            },
        }
    }

    /// Rewrite the file from the in-memory records. Returns the record count.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be written.
    pub fn sync(&self) -> PluginResult<usize> {
        self.save()?;
        Ok(self.records.len())
    }

    /// Write the registry atomically under an exclusive lock.
    ///
    /// # Errors
    ///
    /// [`PluginError::RegistryError`] on any write failure.
    pub fn save(&self) -> PluginResult<()> {
        let path = &self.path;
        let parent = path.parent().unwrap_or(Path::new("."));
        std::fs::create_dir_all(parent)
            .map_err(|e| registry_error(path, format!("failed to create parent directory: {e}")))?;
        let _lock = acquire_lock(path, LockMode::Exclusive)?;

        let file = RegistryFile {
            plugins: self.records.clone(),
        };
        let mut body = serde_json::to_string_pretty(&file)
            .map_err(|e| registry_error(path, format!("failed to serialize registry: {e}")))?;
        body.push('\n');

        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| registry_error(path, format!("failed to create temp file: {e}")))?;
        tmp.write_all(body.as_bytes())
            .map_err(|e| registry_error(path, format!("failed to write temp file: {e}")))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| registry_error(path, format!("failed to sync temp file: {e}")))?;
        tmp.persist(path)
            .map_err(|e| registry_error(path, format!("failed to replace registry: {e}")))?;

        debug!(path = %path.display(), records = self.records.len(), "saved plugin registry");
        Ok(())
    }
}

async fn remove_dir_if_present(path: &Path) -> PluginResult<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn registry_error(path: &Path, message: String) -> PluginError {
    PluginError::RegistryError {
        path: path.to_path_buf(),
        message,
    }
}

#[derive(Clone, Copy)]
enum LockMode {
    Shared,
    Exclusive,
}

/// Advisory lock on `<registry>.lk`, released on drop.
///
/// Readers skip locking when no lock file exists yet: nothing has ever
/// written, so there is nobody to wait for.
fn acquire_lock(path: &Path, mode: LockMode) -> PluginResult<Option<std::fs::File>> {
    let lock_path = path.with_extension("lk");
    match mode {
        LockMode::Shared => match std::fs::OpenOptions::new().read(true).open(&lock_path) {
            Ok(file) => {
                file.lock_shared()
                    .map_err(|e| registry_error(path, format!("failed to acquire shared lock: {e}")))?;
                Ok(Some(file))
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(registry_error(path, format!("failed to open lock file: {e}"))),
        },
        LockMode::Exclusive => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .truncate(false)
                .read(true)
                .write(true)
                .open(&lock_path)
                .map_err(|e| registry_error(path, format!("failed to open lock file: {e}")))?;
            file.lock_exclusive()
                .map_err(|e| registry_error(path, format!("failed to acquire exclusive lock: {e}")))?;
            Ok(Some(file))
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::{Export, install_fn};
    use crate::importer::BuiltinImporter;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Package manager that "installs" by writing a package folder.
    #[derive(Default)]
    struct FakeNpm {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PackageManager for FakeNpm {
        async fn global_root(&self) -> Option<PathBuf> {
            None
        }

        async fn install(&self, spec: &NpmSpec, prefix: &Path) -> PluginResult<()> {
            self.calls.lock().unwrap().push(format!("install {spec}"));
            let root = spec.install_path(prefix);
            std::fs::create_dir_all(&root)?;
            std::fs::write(
                root.join("package.json"),
                format!(r#"{{"name":"{}","version":"2.0.0"}}"#, spec.full_name()),
            )?;
            std::fs::write(root.join("index.js"), "")?;
            Ok(())
        }

        async fn uninstall(&self, spec: &NpmSpec, _prefix: &Path) -> PluginResult<()> {
            self.calls.lock().unwrap().push(format!("uninstall {spec}"));
            Ok(())
        }
    }

    fn record(name: &str) -> RegistryRecord {
        RegistryRecord::new(name, "1.0.0", format!("/plugins/{name}"), RegistrySource::Global)
    }

    #[test]
    fn missing_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let reg = PluginRegistry::open(tmp.path().join("registry.json")).unwrap();
        assert!(reg.list().is_empty());
        assert!(!tmp.path().join("registry.json").exists());
    }

    #[test]
    fn add_upserts_and_persists() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("plugins").join("registry.json");
        let mut reg = PluginRegistry::open(&path).unwrap();
        reg.add(record("strand-plugin-a")).unwrap();
        reg.add(record("strand-plugin-b")).unwrap();
        let mut newer = record("strand-plugin-a");
        newer.version = "1.1.0".into();
        reg.add(newer).unwrap();

        let reopened = PluginRegistry::open(&path).unwrap();
        assert_eq!(reopened.list().len(), 2);
        assert_eq!(reopened.find("strand-plugin-a").unwrap().version, "1.1.0");
        assert_eq!(reopened.list()[0].name, "strand-plugin-a");
        assert!(path.with_extension("lk").exists());

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["plugins"][0]["source"], "global");
        assert!(raw["plugins"][0]["lastChecked"].is_string());
    }

    #[test]
    fn enable_disable_and_unknown_names() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("registry.json");
        let mut reg = PluginRegistry::open(&path).unwrap();
        reg.add(record("strand-plugin-a")).unwrap();

        reg.disable("strand-plugin-a").unwrap();
        assert_eq!(
            PluginRegistry::open(&path).unwrap().disabled().collect::<Vec<_>>(),
            vec!["strand-plugin-a"]
        );
        reg.enable("strand-plugin-a").unwrap();
        assert_eq!(PluginRegistry::open(&path).unwrap().disabled().count(), 0);

        let err = reg.disable("ghost").unwrap_err();
        assert_eq!(err.to_string(), "Plugin \"ghost\" could not be found.");
        assert!(matches!(reg.remove("ghost"), Err(PluginError::NotFound(_))));
    }

    #[test]
    fn search_is_case_insensitive() {
        let tmp = TempDir::new().unwrap();
        let mut reg = PluginRegistry::open(tmp.path().join("registry.json")).unwrap();
        reg.add(record("strand-plugin-Deploy")).unwrap();
        reg.add(record("strand-plugin-lint")).unwrap();
        let hits: Vec<_> = reg.search("DEPLOY").into_iter().map(|r| r.name.as_str()).collect();
        assert_eq!(hits, vec!["strand-plugin-Deploy"]);
        assert_eq!(reg.search("plugin").len(), 2);
    }

    #[test]
    fn unlink_requires_linked_record() {
        let tmp = TempDir::new().unwrap();
        let mut reg = PluginRegistry::open(tmp.path().join("registry.json")).unwrap();
        reg.add(record("strand-plugin-a")).unwrap();
        let err = reg.unlink("strand-plugin-a").unwrap_err();
        assert_eq!(err.to_string(), "Plugin strand-plugin-a is not linked.");
        assert_eq!(reg.list().len(), 1);

        reg.add(RegistryRecord::new("mine", "0.1.0", "/src/mine", RegistrySource::Linked))
            .unwrap();
        assert_eq!(reg.linked_paths(), vec![PathBuf::from("/src/mine")]);
        reg.unlink("mine").unwrap();
        assert!(reg.find("mine").is_none());
    }

    #[tokio::test]
    async fn install_update_uninstall_cycle() {
        let tmp = TempDir::new().unwrap();
        let plugins_dir = tmp.path().join("home/plugins");
        let cwd = tmp.path().join("project");
        std::fs::create_dir_all(&cwd).unwrap();
        let npm = FakeNpm::default();
        let importer = BuiltinImporter::new();
        let ctx = RegistryContext {
            package_manager: &npm,
            importer: &importer,
            plugins_dir: &plugins_dir,
            cwd: &cwd,
        };

        let mut reg = PluginRegistry::open(plugins_dir.join("registry.json")).unwrap();
        let rec = reg
            .install(&ctx, "@strand/plugin-deploy", InstallScope::Global)
            .await
            .unwrap();
        assert_eq!(rec.name, "@strand/plugin-deploy");
        assert_eq!(rec.version, "2.0.0");
        assert_eq!(rec.source, RegistrySource::Global);
        assert_eq!(
            rec.location,
            plugins_dir.join("node_modules/@strand/plugin-deploy")
        );

        reg.update(&ctx, "@strand/plugin-deploy").await.unwrap();
        let removed = reg.uninstall(&ctx, "@strand/plugin-deploy").await.unwrap();
        assert!(!removed.location.exists());
        assert!(reg.list().is_empty());

        assert_eq!(
            *npm.calls.lock().unwrap(),
            vec![
                "install @strand/plugin-deploy@latest",
                "install @strand/plugin-deploy@latest",
                "uninstall @strand/plugin-deploy",
            ]
        );
    }

    #[tokio::test]
    async fn link_reads_manifest_through_importer() {
        let tmp = TempDir::new().unwrap();
        let checkout = tmp.path().join("checkout");
        std::fs::create_dir_all(&checkout).unwrap();
        std::fs::write(
            checkout.join("package.json"),
            r#"{"name":"strand-plugin-dev","version":"0.0.1"}"#,
        )
        .unwrap();
        std::fs::write(checkout.join("index.js"), "").unwrap();

        let importer = BuiltinImporter::new().with_path(checkout.join("index.js"), || {
            Ok(Export::object()
                .with("name", "strand-plugin-dev")
                .with("version", "0.0.1")
                .with("tools", Export::from(serde_json::json!([{"name": "fmt"}])))
                .with("install", install_fn(|_, _| Ok(()))))
        });
        let npm = FakeNpm::default();
        let ctx = RegistryContext {
            package_manager: &npm,
            importer: &importer,
            plugins_dir: tmp.path(),
            cwd: tmp.path(),
        };

        let mut reg = PluginRegistry::open(tmp.path().join("registry.json")).unwrap();
        let rec = reg.link(&ctx, &checkout).await.unwrap();
        assert!(rec.linked);
        assert_eq!(rec.source, RegistrySource::Linked);
        assert_eq!(rec.manifest.tools, vec!["fmt"]);

        let not_a_package = tmp.path().join("nothing");
        std::fs::create_dir_all(&not_a_package).unwrap();
        assert!(matches!(
            reg.link(&ctx, &not_a_package).await,
            Err(PluginError::InvalidPackage { .. })
        ));
    }
}
