//! What plugins contribute, by kind.

use anyhow::{Result, bail};
use strand_plugins::{ContributionKind, ManifestSnapshot, PluginLoader};

use crate::host::Host;
use crate::theme::Theme;

/// Snapshots of loaded plugins, then of registered plugins that did not load.
fn snapshots(host: &Host, loader: &PluginLoader) -> Result<Vec<ManifestSnapshot>> {
    let mut out: Vec<ManifestSnapshot> = loader.manifests().iter().map(|m| m.snapshot()).collect();
    for record in host.registry()?.list() {
        if !out.iter().any(|s| s.name == record.name) {
            out.push(record.manifest.clone());
        }
    }
    Ok(out)
}

pub(crate) fn run(host: &Host, loader: &PluginLoader, name: Option<&str>) -> Result<()> {
    let all = snapshots(host, loader)?;

    if let Some(name) = name {
        let Some(snapshot) = all.iter().find(|s| s.name == name) else {
            bail!("Plugin \"{name}\" is neither loaded nor registered");
        };
        println!("{}", Theme::header(&format!("Capabilities of {name}")));
        println!("{}", Theme::separator());
        for kind in ContributionKind::ALL {
            println!(
                "  {:<10} {}",
                kind.label(),
                Theme::list(snapshot.names_of(kind))
            );
        }
        return Ok(());
    }

    if all.is_empty() {
        println!("{}", Theme::info("No plugins loaded or registered"));
        return Ok(());
    }
    println!("{}", Theme::header("Plugin Capabilities"));
    print!("  {:<32}", "PLUGIN");
    for kind in ContributionKind::ALL {
        print!(" {:>9}", kind.label().to_uppercase());
    }
    println!();
    println!("{}", Theme::separator());
    for snapshot in &all {
        print!("  {:<32}", snapshot.name);
        for kind in ContributionKind::ALL {
            print!(" {:>9}", snapshot.names_of(kind).len());
        }
        println!();
    }
    Ok(())
}
