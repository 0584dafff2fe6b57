//! `package.json` reading and entry-file resolution.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// Entry files tried, relative to the package root, when neither `module`
/// nor `main` points at a real file. WASM builds win over script builds.
pub const ENTRY_FALLBACKS: &[&str] = &[
    "dist/index.wasm",
    "index.wasm",
    "dist/index.mjs",
    "dist/index.js",
    "index.mjs",
    "index.js",
];

/// Fields of `package.json` the loader cares about.
///
/// Every field is optional: a package with a usable `main` but no version is
/// still a package, and the caller decides the fallbacks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageManifest {
    /// Package name.
    pub name: Option<String>,
    /// Package version.
    pub version: Option<String>,
    /// Optional description.
    pub description: Option<String>,
    /// Declared ES module entry.
    pub module: Option<String>,
    /// Declared main entry.
    pub main: Option<String>,
}

#[derive(Deserialize)]
struct RawPackageJson {
    name: Option<Value>,
    version: Option<Value>,
    description: Option<Value>,
    module: Option<Value>,
    main: Option<Value>,
}

fn string_field(v: Option<Value>) -> Option<String> {
    match v {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

/// Read `<root>/package.json`.
///
/// Returns `None` when the file is missing or unparsable. Neither is an
/// error for discovery. Fields that are not strings read as absent.
pub async fn read_package_manifest(root: &Path) -> Option<PackageManifest> {
    let path = root.join("package.json");
    let content = tokio::fs::read_to_string(&path).await.ok()?;
    let raw: RawPackageJson = match serde_json::from_str(&content) {
        Ok(raw) => raw,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "unparsable package.json");
            return None;
        },
    };

    Some(PackageManifest {
        name: string_field(raw.name),
        version: string_field(raw.version),
        description: string_field(raw.description),
        module: string_field(raw.module),
        main: string_field(raw.main),
    })
}

/// Resolve the entry file of the package at `root`.
///
/// Tries the manifest's `module`, then `main`, then [`ENTRY_FALLBACKS`] in
/// order; the first candidate that is a regular file wins.
pub async fn resolve_entry_file(root: &Path, manifest: Option<&PackageManifest>) -> Option<PathBuf> {
    let declared: Vec<&str> = manifest
        .into_iter()
        .flat_map(|m| [m.module.as_deref(), m.main.as_deref()])
        .flatten()
        .collect();

    for rel in declared.into_iter().chain(ENTRY_FALLBACKS.iter().copied()) {
        let candidate = root.join(rel);
        if is_file(&candidate).await {
            return Some(candidate);
        }
    }
    None
}

/// Whether `path` exists and is a regular file (following symlinks).
pub async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|m| m.is_file())
}
