//! Validate a plugin package without registering it.

use std::path::Path;

use anyhow::{Result, bail};
use strand_plugins::{
    ContributionKind, PluginError, Provenance, RuntimeType, inspect_package,
};

use crate::host::Host;
use crate::theme::Theme;

pub(crate) async fn run(host: &Host, path: &Path) -> Result<()> {
    let root = std::path::absolute(path)?;
    println!(
        "{}",
        Theme::info(&format!("Validating {}", root.display()))
    );

    match inspect_package(
        host.importer.as_ref(),
        &root,
        &host.cwd,
        Provenance::Custom,
        RuntimeType::Local,
    )
    .await
    {
        Ok(inspected) => {
            let manifest = &inspected.manifest;
            println!(
                "{}",
                Theme::success(&format!("{}@{} is a valid plugin", manifest.name, manifest.version))
            );
            println!(
                "  {}",
                Theme::kv(
                    "Entry",
                    &inspected.candidate.entry_file().display().to_string()
                )
            );
            for kind in ContributionKind::ALL {
                let names = manifest.names_of(kind);
                if !names.is_empty() {
                    println!("  {}", Theme::kv(&format!("{kind}s"), &Theme::list(&names)));
                }
            }
            Ok(())
        },
        Err(PluginError::Manifest(e)) => {
            println!("{}", Theme::error("Manifest validation failed"));
            for issue in e.issues() {
                println!("  - {issue}");
            }
            bail!("{e}");
        },
        Err(e) => {
            println!("{}", Theme::error(&e.to_string()));
            Err(e.into())
        },
    }
}
