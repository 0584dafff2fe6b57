//! One-off inspection of a plugin package outside a load cycle.
//!
//! Used by `validate`, `link` and the registry's install path. Unlike the
//! loader, failures here keep their specific error.

use std::path::Path;

use crate::candidate::{CandidateDefaults, PluginCandidate, Provenance, RuntimeType, build_candidate};
use crate::error::{PluginError, PluginResult};
use crate::export::validate_definition;
use crate::importer::{ModuleImporter, ModuleSpecifier};
use crate::manifest::{PluginManifest, validate_manifest};

/// A package that imported and validated cleanly.
#[derive(Debug, Clone)]
pub struct InspectedPlugin {
    /// The package as the scanner would see it.
    pub candidate: PluginCandidate,
    /// Its validated manifest.
    pub manifest: PluginManifest,
}

/// Build a candidate for `root`, import its entry and validate it.
///
/// # Errors
///
/// - [`PluginError::InvalidPackage`] when no candidate can be built
/// - [`PluginError::Import`] when the entry cannot be imported
/// - [`PluginError::InvalidExport`] when the export has the wrong shape
/// - [`PluginError::Manifest`] when manifest validation fails
pub async fn inspect_package(
    importer: &dyn ModuleImporter,
    root: &Path,
    cwd: &Path,
    provenance: Provenance,
    runtime_type: RuntimeType,
) -> PluginResult<InspectedPlugin> {
    let folder = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let defaults = match runtime_type {
        RuntimeType::Local => CandidateDefaults::local_folder(&folder),
        RuntimeType::Npm | RuntimeType::Global => CandidateDefaults::default(),
    };
    let candidate = build_candidate(root, provenance, runtime_type, defaults)
        .await
        .ok_or_else(|| PluginError::InvalidPackage {
            path: root.to_path_buf(),
            message: "no package name or entry file".to_owned(),
        })?;

    let specifier = ModuleSpecifier::from_path(candidate.entry_file(), cwd)?;
    let module = importer.import(&specifier).await?;
    let export = module.default.ok_or(PluginError::InvalidExport)?;
    let definition = validate_definition(export)?;
    let manifest = validate_manifest(&definition.export, candidate.name())?;

    Ok(InspectedPlugin {
        candidate,
        manifest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::{Export, install_fn};
    use crate::importer::{BuiltinImporter, ImportError};
    use tempfile::TempDir;

    fn package(root: &Path) {
        std::fs::create_dir_all(root).unwrap();
        std::fs::write(
            root.join("package.json"),
            r#"{"name":"strand-plugin-ok","version":"0.3.0"}"#,
        )
        .unwrap();
        std::fs::write(root.join("index.js"), "").unwrap();
    }

    #[tokio::test]
    async fn valid_package() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("ok");
        package(&root);
        let importer = BuiltinImporter::new().with_path(root.join("index.js"), || {
            Ok(Export::object()
                .with("name", "strand-plugin-ok")
                .with("version", "0.3.0")
                .with("install", install_fn(|_, _| Ok(()))))
        });

        let inspected = inspect_package(
            &importer,
            &root,
            tmp.path(),
            Provenance::Linked,
            RuntimeType::Local,
        )
        .await
        .unwrap();
        assert_eq!(inspected.candidate.name(), "strand-plugin-ok");
        assert_eq!(inspected.manifest.version, "0.3.0");
    }

    #[tokio::test]
    async fn errors_keep_their_kind() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("ok");
        package(&root);

        let none = BuiltinImporter::new();
        let err = inspect_package(&none, &root, tmp.path(), Provenance::Linked, RuntimeType::Local)
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::Import(ImportError::NotFound(_))));

        let empty = tmp.path().join("empty");
        std::fs::create_dir_all(&empty).unwrap();
        let err = inspect_package(&none, &empty, tmp.path(), Provenance::Linked, RuntimeType::Local)
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::InvalidPackage { .. }));

        let bad = BuiltinImporter::new().with_path(root.join("index.js"), || Ok(Export::from("x")));
        let err = inspect_package(&bad, &root, tmp.path(), Provenance::Linked, RuntimeType::Local)
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::InvalidExport));
    }
}
