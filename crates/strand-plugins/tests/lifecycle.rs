//! End-to-end load cycles against real directories.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use strand_plugins::{
    BuiltinImporter, CandidateScanner, CommandBuilder, CommandTree, Export, HostEnvironment,
    PluginLoader, PluginNaming, RuntimeType, ScanRoots, dedupe_candidates, install_fn,
};
use tempfile::TempDir;

struct Layout {
    tmp: TempDir,
}

impl Layout {
    fn new() -> Self {
        let layout = Self {
            tmp: TempDir::new().unwrap(),
        };
        std::fs::create_dir_all(layout.cwd()).unwrap();
        layout
    }

    fn cwd(&self) -> PathBuf {
        self.tmp.path().join("project")
    }

    fn custom(&self) -> PathBuf {
        self.tmp.path().join("home/plugins")
    }

    fn roots(&self) -> ScanRoots {
        ScanRoots {
            cwd: self.cwd(),
            custom_dir: self.custom(),
            project_list: self.cwd().join("strand.plugins.json"),
            global_list: self.tmp.path().join("home/strand.plugins.json"),
            linked: Vec::new(),
        }
    }

    fn scanner(&self) -> CandidateScanner {
        CandidateScanner::new(self.roots(), PluginNaming::default())
    }
}

fn package(root: &Path, name: &str) -> PathBuf {
    std::fs::create_dir_all(root).unwrap();
    std::fs::write(
        root.join("package.json"),
        format!(r#"{{"name":"{name}","version":"1.0.0"}}"#),
    )
    .unwrap();
    let entry = root.join("index.js");
    std::fs::write(&entry, "").unwrap();
    entry
}

fn mounting(
    name: &'static str,
    decl: &'static str,
) -> impl Fn() -> anyhow::Result<Export> + Send + Sync + 'static {
    move || {
        Ok(Export::object()
            .with("name", name)
            .with("version", "1.0.0")
            .with(
                "install",
                install_fn(move |cli, _| {
                    cli.command(decl)?;
                    Ok(())
                }),
            ))
    }
}

#[tokio::test]
async fn local_folder_beats_node_modules_copy() {
    let layout = Layout::new();
    package(
        &layout.cwd().join("node_modules/strand-plugin-widget"),
        "widget",
    );
    let local_entry = layout.custom().join("widget/index.js");
    std::fs::create_dir_all(layout.custom().join("widget")).unwrap();
    std::fs::write(&local_entry, "").unwrap();

    let found = layout.scanner().scan().await;
    assert_eq!(found.len(), 2);

    let deduped = dedupe_candidates(found);
    assert_eq!(deduped.candidates.len(), 1);
    assert_eq!(deduped.candidates[0].runtime_type(), RuntimeType::Local);
    assert_eq!(deduped.overrides.len(), 1);
    assert_eq!(
        deduped.overrides[0].to_string(),
        "Duplicate plugin 'widget' detected. Preferring custom/local over local/npm."
    );

    let importer = BuiltinImporter::new().with_path(&local_entry, mounting("widget", "widget"));
    let mut loader = PluginLoader::new(
        HostEnvironment::new(layout.cwd()),
        layout.scanner(),
        Arc::new(importer),
        CommandTree::new("strand"),
    );
    let summary = loader.load().await;
    assert_eq!(summary.discovered, 1);
    assert_eq!(summary.loaded, 1);
    assert_eq!(
        loader.statuses()[0].candidate.package_root(),
        layout.custom().join("widget")
    );
}

#[tokio::test]
async fn failing_install_does_not_block_the_next_plugin() {
    let layout = Layout::new();
    let broken = package(&layout.custom().join("a-broken"), "a-broken");
    let panicking = package(&layout.custom().join("b-panicking"), "b-panicking");
    let healthy = package(&layout.custom().join("c-healthy"), "c-healthy");

    let importer = BuiltinImporter::new()
        .with_path(&broken, || {
            Ok(Export::object()
                .with("name", "a-broken")
                .with("version", "1.0.0")
                .with(
                    "install",
                    install_fn(|cli, _| {
                        cli.command("half")?;
                        anyhow::bail!("database unreachable")
                    }),
                ))
        })
        .with_path(&panicking, || {
            Ok(Export::object()
                .with("name", "b-panicking")
                .with("version", "1.0.0")
                .with("install", install_fn(|_, _| panic!("boom"))))
        })
        .with_path(&healthy, mounting("c-healthy", "healthy"));

    let mut loader = PluginLoader::new(
        HostEnvironment::new(layout.cwd()),
        layout.scanner(),
        Arc::new(importer),
        CommandTree::new("strand"),
    );
    let summary = loader.load().await;
    assert_eq!(summary.loaded, 1);
    assert_eq!(summary.failed, 2);

    let reasons: Vec<_> = loader
        .statuses()
        .iter()
        .map(|s| (s.name().to_owned(), s.error.clone()))
        .collect();
    assert_eq!(
        reasons,
        vec![
            ("a-broken".to_owned(), Some("database unreachable".to_owned())),
            ("b-panicking".to_owned(), Some("boom".to_owned())),
            ("c-healthy".to_owned(), None),
        ]
    );
    // Partial mounts of the failed plugin are gone.
    assert!(loader.tree().resolve(&["half"]).is_none());
    assert!(loader.tree().resolve(&["healthy"]).is_some());
}

#[tokio::test]
async fn reload_rebuilds_the_tree() {
    let layout = Layout::new();
    let keep = package(&layout.custom().join("keep"), "keep");
    let gone = package(&layout.custom().join("gone"), "gone");

    let importer = BuiltinImporter::new()
        .with_path(&keep, mounting("keep", "alpha beta <name>"))
        .with_path(&gone, mounting("gone", "ephemeral"));
    let mut loader = PluginLoader::new(
        HostEnvironment::new(layout.cwd()),
        layout.scanner(),
        Arc::new(importer),
        CommandTree::new("strand"),
    );

    loader.load().await;
    let first_beta = loader.tree().resolve(&["alpha", "beta"]).unwrap();
    assert!(loader.tree().resolve(&["ephemeral"]).is_some());

    std::fs::remove_dir_all(layout.custom().join("gone")).unwrap();
    let summary = loader.reload().await;
    assert_eq!(summary.loaded, 1);

    assert!(loader.tree().resolve(&["ephemeral"]).is_none());
    let second_beta = loader.tree().resolve(&["alpha", "beta"]).unwrap();
    assert_ne!(first_beta, second_beta);
    assert!(loader.tree().get(first_beta).is_none());
    assert_eq!(loader.tree().get(second_beta).unwrap().args[0].name, "name");
    assert_eq!(loader.statuses().len(), 1);
}
