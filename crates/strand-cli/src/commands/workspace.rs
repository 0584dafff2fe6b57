//! Project-scoped plugins, recorded in the project plugin list.

use anyhow::{Result, bail};
use strand_plugins::scanner::{read_plugin_list, write_plugin_list};
use strand_plugins::{InstallScope, RegistrySource};

use crate::host::Host;
use crate::theme::Theme;

/// Install into the project and add the name to its plugin list.
pub(crate) async fn add(host: &Host, name: &str) -> Result<()> {
    let mut registry = host.registry()?;
    let ctx = host.registry_context();
    let record = registry.install(&ctx, name, InstallScope::Workspace).await?;
    host.invalidate_discovery();

    let list_path = host.workspace().plugin_list_path();
    let mut names = read_plugin_list(&list_path).await;
    if !names.contains(&record.name) {
        names.push(record.name.clone());
        write_plugin_list(&list_path, &names).await?;
    }
    println!(
        "{}",
        Theme::success(&format!(
            "Added {}@{} to {}",
            record.name,
            record.version,
            list_path.display()
        ))
    );
    Ok(())
}

/// Uninstall from the project and drop the name from its plugin list.
pub(crate) async fn remove(host: &Host, name: &str) -> Result<()> {
    let mut registry = host.registry()?;
    match registry.find(name).map(|r| r.source) {
        Some(source) if source != RegistrySource::Workspace => {
            bail!("Plugin \"{name}\" is not a workspace plugin ({source})");
        },
        Some(_) => {
            let ctx = host.registry_context();
            registry.uninstall(&ctx, name).await?;
            host.invalidate_discovery();
        },
        None => {},
    }

    let list_path = host.workspace().plugin_list_path();
    let mut names = read_plugin_list(&list_path).await;
    let before = names.len();
    names.retain(|n| n != name);
    if names.len() == before {
        println!(
            "{}",
            Theme::warning(&format!("{name} was not in {}", list_path.display()))
        );
        return Ok(());
    }
    write_plugin_list(&list_path, &names).await?;
    println!("{}", Theme::success(&format!("Removed {name} from the workspace")));
    Ok(())
}

/// Rewrite the registry file from its current records.
pub(crate) fn sync(host: &Host) -> Result<()> {
    let count = host.registry()?.sync()?;
    println!(
        "{}",
        Theme::success(&format!("Registry synced ({count} plugin(s))"))
    );
    Ok(())
}
