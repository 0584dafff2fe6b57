//! Registry commands: list, search, info, install, uninstall, update,
//! enable, disable, link, unlink.

use std::path::Path;

use anyhow::{Result, bail};
use strand_plugins::{ContributionKind, InstallScope, RegistryRecord, RegistrySource};

use crate::host::Host;
use crate::theme::Theme;

fn print_table(records: &[&RegistryRecord]) {
    println!(
        "  {:<32} {:<12} {:<10} {:<8}",
        "NAME", "VERSION", "SOURCE", "ENABLED"
    );
    println!("{}", Theme::separator());
    for r in records {
        println!(
            "  {:<32} {:<12} {:<10} {}",
            r.name,
            r.version,
            r.source.to_string(),
            Theme::flag(r.enabled)
        );
    }
    println!(
        "\n{}",
        Theme::dimmed(&format!("{} plugin(s)", records.len()))
    );
}

pub(crate) fn list(host: &Host) -> Result<()> {
    let registry = host.registry()?;
    if registry.list().is_empty() {
        println!("{}", Theme::info("No plugins registered"));
        return Ok(());
    }
    println!("{}", Theme::header("Registered Plugins"));
    print_table(&registry.list().iter().collect::<Vec<_>>());
    Ok(())
}

pub(crate) fn search(host: &Host, query: &str) -> Result<()> {
    let registry = host.registry()?;
    let hits = registry.search(query);
    if hits.is_empty() {
        println!("{}", Theme::info(&format!("No plugins match \"{query}\"")));
        return Ok(());
    }
    println!("{}", Theme::header(&format!("Plugins matching \"{query}\"")));
    print_table(&hits);
    Ok(())
}

pub(crate) fn print_record(record: &RegistryRecord) {
    println!("{}", Theme::header(&record.name));
    println!("{}", Theme::separator());
    println!("  {}", Theme::kv("Version", &record.version));
    println!("  {}", Theme::kv("Source", &record.source.to_string()));
    println!(
        "  {}",
        Theme::kv("Location", &record.location.display().to_string())
    );
    println!("  {}", Theme::kv("Enabled", &Theme::flag(record.enabled)));
    println!("  {}", Theme::kv("Linked", &Theme::flag(record.linked)));
    println!(
        "  {}",
        Theme::kv("Last checked", &Theme::timestamp(&record.last_checked))
    );
    let manifest = &record.manifest;
    if !manifest.description.is_empty() {
        println!("  {}", Theme::kv("Description", &manifest.description));
    }
    if let Some(category) = &manifest.category {
        println!("  {}", Theme::kv("Category", category));
    }
    for kind in ContributionKind::ALL {
        let names = manifest.names_of(kind);
        if !names.is_empty() {
            println!("  {}", Theme::kv(&format!("{kind}s"), &Theme::list(names)));
        }
    }
    if !manifest.hooks.is_empty() {
        let hooks: Vec<String> = manifest.hooks.iter().map(ToString::to_string).collect();
        println!("  {}", Theme::kv("hooks", &Theme::list(&hooks)));
    }
}

pub(crate) fn info(host: &Host, name: &str) -> Result<()> {
    let registry = host.registry()?;
    let Some(record) = registry.find(name) else {
        bail!("Plugin \"{name}\" is not registered");
    };
    print_record(record);
    Ok(())
}

pub(crate) async fn install(host: &Host, name: &str, workspace: bool) -> Result<()> {
    let scope = if workspace {
        InstallScope::Workspace
    } else {
        InstallScope::Global
    };
    let mut registry = host.registry()?;
    let ctx = host.registry_context();
    println!("{}", Theme::info(&format!("Installing {name}...")));
    let record = registry.install(&ctx, name, scope).await?;
    host.invalidate_discovery();
    println!(
        "{}",
        Theme::success(&format!(
            "Installed {}@{} ({})",
            record.name, record.version, record.source
        ))
    );
    Ok(())
}

pub(crate) async fn uninstall(host: &Host, name: &str, workspace: bool) -> Result<()> {
    let mut registry = host.registry()?;
    if workspace
        && let Some(record) = registry.find(name)
        && record.source != RegistrySource::Workspace
    {
        bail!(
            "Plugin \"{name}\" is installed as {}, not in the workspace",
            record.source
        );
    }
    let ctx = host.registry_context();
    let record = registry.uninstall(&ctx, name).await?;
    host.invalidate_discovery();
    println!(
        "{}",
        Theme::success(&format!("Uninstalled {}@{}", record.name, record.version))
    );
    Ok(())
}

pub(crate) async fn update(host: &Host, name: &str) -> Result<()> {
    let mut registry = host.registry()?;
    let ctx = host.registry_context();
    let record = registry.update(&ctx, name).await?;
    host.invalidate_discovery();
    println!(
        "{}",
        Theme::success(&format!("Updated {} to {}", record.name, record.version))
    );
    Ok(())
}

pub(crate) fn enable(host: &Host, name: &str) -> Result<()> {
    host.registry()?.enable(name)?;
    println!("{}", Theme::success(&format!("Enabled {name}")));
    Ok(())
}

pub(crate) fn disable(host: &Host, name: &str) -> Result<()> {
    host.registry()?.disable(name)?;
    println!("{}", Theme::success(&format!("Disabled {name}")));
    Ok(())
}

pub(crate) async fn link(host: &Host, path: &Path) -> Result<()> {
    let mut registry = host.registry()?;
    let ctx = host.registry_context();
    let record = registry.link(&ctx, path).await?;
    host.invalidate_discovery();
    println!(
        "{}",
        Theme::success(&format!(
            "Linked {} -> {}",
            record.name,
            record.location.display()
        ))
    );
    Ok(())
}

pub(crate) fn unlink(host: &Host, name: &str) -> Result<()> {
    let record = host.registry()?.unlink(name)?;
    host.invalidate_discovery();
    println!("{}", Theme::success(&format!("Unlinked {}", record.name)));
    Ok(())
}
