//! Plugin candidates: packages found on disk that may turn out to be plugins.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::package::{read_package_manifest, resolve_entry_file};

/// Where a candidate was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// The project's own `node_modules`.
    Local,
    /// The package manager's global root.
    Global,
    /// The custom plugin directory (its `node_modules` or local subfolders).
    Custom,
    /// Named in a project or global plugin list file.
    Project,
    /// A path linked through the registry.
    Linked,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Local => "local",
            Self::Global => "global",
            Self::Custom => "custom",
            Self::Project => "project",
            Self::Linked => "linked",
        })
    }
}

/// How a candidate is installed. Decides which duplicate wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeType {
    /// A plain folder the user dropped in place, or a linked checkout.
    Local,
    /// Installed by the package manager into a `node_modules`.
    Npm,
    /// Installed into the package manager's global root.
    Global,
}

impl RuntimeType {
    /// Dedup priority; higher wins.
    #[must_use]
    pub const fn priority(self) -> u8 {
        match self {
            Self::Local => 3,
            Self::Npm => 2,
            Self::Global => 1,
        }
    }
}

impl fmt::Display for RuntimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Local => "local",
            Self::Npm => "npm",
            Self::Global => "global",
        })
    }
}

/// A discovered package with a resolved entry file.
///
/// Built once during scanning and never modified; identity is [`name`](Self::name).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginCandidate {
    name: String,
    version: Option<String>,
    description: Option<String>,
    package_root: PathBuf,
    entry_file: PathBuf,
    provenance: Provenance,
    runtime_type: RuntimeType,
}

impl PluginCandidate {
    /// Assemble a candidate from already-resolved parts.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        package_root: impl Into<PathBuf>,
        entry_file: impl Into<PathBuf>,
        provenance: Provenance,
        runtime_type: RuntimeType,
    ) -> Self {
        Self {
            name: name.into(),
            version: None,
            description: None,
            package_root: package_root.into(),
            entry_file: entry_file.into(),
            provenance,
            runtime_type,
        }
    }

    /// Set the version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Unique plugin name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Version from `package.json` or the caller's fallback.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Description from `package.json`.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Absolute package root.
    #[must_use]
    pub fn package_root(&self) -> &Path {
        &self.package_root
    }

    /// Absolute path of the resolved entry module.
    #[must_use]
    pub fn entry_file(&self) -> &Path {
        &self.entry_file
    }

    /// Where the candidate was found.
    #[must_use]
    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    /// How the candidate is installed.
    #[must_use]
    pub fn runtime_type(&self) -> RuntimeType {
        self.runtime_type
    }
}

/// Name and version used when `package.json` does not supply them.
#[derive(Debug, Clone, Default)]
pub struct CandidateDefaults {
    /// Fallback name.
    pub name: Option<String>,
    /// Fallback version.
    pub version: Option<String>,
}

impl CandidateDefaults {
    /// Defaults for a directly installed local plugin folder: the folder name
    /// and `0.0.0-local`.
    #[must_use]
    pub fn local_folder(folder: &str) -> Self {
        Self {
            name: Some(folder.to_owned()),
            version: Some(LOCAL_VERSION.to_owned()),
        }
    }
}

/// Version given to local plugins that declare none.
pub const LOCAL_VERSION: &str = "0.0.0-local";

/// Build a candidate for the package rooted at `root`.
///
/// The name comes from `package.json`, then `defaults`, then the folder
/// name. The version falls back to [`LOCAL_VERSION`] for local runtimes.
/// Returns `None` (with a warning) when no entry file resolves, and `None`
/// (quietly) when no name can be found at all.
pub async fn build_candidate(
    root: &Path,
    provenance: Provenance,
    runtime_type: RuntimeType,
    defaults: CandidateDefaults,
) -> Option<PluginCandidate> {
    let manifest = read_package_manifest(root).await.unwrap_or_default();

    let Some(entry) = resolve_entry_file(root, Some(&manifest)).await else {
        warn!("plugin missing entry file at {}", root.display());
        return None;
    };

    let folder = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty());
    let Some(name) = manifest.name.or(defaults.name).or(folder) else {
        debug!(path = %root.display(), "package has no name, skipping");
        return None;
    };

    let version = manifest.version.or(defaults.version).or_else(|| {
        (runtime_type == RuntimeType::Local).then(|| LOCAL_VERSION.to_owned())
    });

    let mut candidate = PluginCandidate::new(name, root, entry, provenance, runtime_type);
    candidate.version = version;
    candidate.description = manifest.description;
    Some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn priorities_are_strictly_ordered() {
        assert!(RuntimeType::Local.priority() > RuntimeType::Npm.priority());
        assert!(RuntimeType::Npm.priority() > RuntimeType::Global.priority());
    }

    #[tokio::test]
    async fn local_folder_falls_back_to_folder_name() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("widget");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("index.js"), "").unwrap();

        let c = build_candidate(
            &root,
            Provenance::Custom,
            RuntimeType::Local,
            CandidateDefaults::local_folder("widget"),
        )
        .await
        .unwrap();
        assert_eq!(c.name(), "widget");
        assert_eq!(c.version(), Some("0.0.0-local"));
        assert_eq!(c.entry_file(), root.join("index.js"));
        assert_eq!(c.runtime_type(), RuntimeType::Local);
    }

    #[tokio::test]
    async fn package_json_beats_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("package.json"),
            r#"{"name":"strand-plugin-real","version":"2.0.0","description":"hi"}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("index.mjs"), "").unwrap();

        let c = build_candidate(
            dir.path(),
            Provenance::Local,
            RuntimeType::Npm,
            CandidateDefaults::local_folder("ignored"),
        )
        .await
        .unwrap();
        assert_eq!(c.name(), "strand-plugin-real");
        assert_eq!(c.version(), Some("2.0.0"));
        assert_eq!(c.description(), Some("hi"));
    }

    #[tokio::test]
    async fn missing_entry_drops_candidate() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("package.json"),
            r#"{"name":"strand-plugin-x","version":"1.0.0"}"#,
        )
        .unwrap();
        let c = build_candidate(
            dir.path(),
            Provenance::Local,
            RuntimeType::Npm,
            CandidateDefaults::default(),
        )
        .await;
        assert!(c.is_none());
    }

    #[tokio::test]
    async fn declared_main_survives_incomplete_package_json() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("package.json"),
            r#"{"name":"strand-plugin-x","main":"lib/entry.js"}"#,
        )
        .unwrap();
        std::fs::create_dir_all(dir.path().join("lib")).unwrap();
        std::fs::write(dir.path().join("lib/entry.js"), "").unwrap();

        let c = build_candidate(
            dir.path(),
            Provenance::Local,
            RuntimeType::Npm,
            CandidateDefaults::default(),
        )
        .await
        .unwrap();
        assert_eq!(c.name(), "strand-plugin-x");
        assert_eq!(c.entry_file(), dir.path().join("lib/entry.js"));
        assert_eq!(c.version(), None);
    }

    #[tokio::test]
    async fn unnamed_package_takes_folder_name() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("strand-plugin-bare");
        std::fs::create_dir_all(root.join("dist")).unwrap();
        std::fs::write(root.join("package.json"), r#"{"module":"dist/main.mjs"}"#).unwrap();
        std::fs::write(root.join("dist/main.mjs"), "").unwrap();

        let c = build_candidate(
            &root,
            Provenance::Linked,
            RuntimeType::Local,
            CandidateDefaults::default(),
        )
        .await
        .unwrap();
        assert_eq!(c.name(), "strand-plugin-bare");
        assert_eq!(c.version(), Some(LOCAL_VERSION));
        assert_eq!(c.entry_file(), root.join("dist/main.mjs"));
    }
}
