//! Lifecycle hook commands.

use anyhow::{Result, bail};
use strand_plugins::{HookName, PluginLoader};

use crate::host::Host;
use crate::theme::Theme;

/// Hooks each registered plugin declares.
pub(crate) fn list(host: &Host) -> Result<()> {
    let registry = host.registry()?;
    let with_hooks: Vec<_> = registry
        .list()
        .iter()
        .filter(|r| !r.manifest.hooks.is_empty())
        .collect();
    if with_hooks.is_empty() {
        println!("{}", Theme::info("No registered plugin declares hooks"));
        return Ok(());
    }

    println!("{}", Theme::header("Plugin Hooks"));
    println!("  {:<32} HOOKS", "PLUGIN");
    println!("{}", Theme::separator());
    for record in with_hooks {
        let hooks: Vec<String> = record.manifest.hooks.iter().map(ToString::to_string).collect();
        println!("  {:<32} {}", record.name, Theme::list(&hooks));
    }
    Ok(())
}

/// Which hooks `name` implements. The live manifest wins over the registry
/// snapshot.
pub(crate) fn inspect(host: &Host, loader: &PluginLoader, name: &str) -> Result<()> {
    let declared: Vec<HookName> = if let Some(manifest) = loader.manifest(name) {
        manifest.hooks.names().collect()
    } else if let Some(record) = host.registry()?.find(name) {
        record.manifest.hooks.clone()
    } else {
        bail!("Plugin \"{name}\" is neither loaded nor registered");
    };

    println!("{}", Theme::header(&format!("Hooks of {name}")));
    println!("{}", Theme::separator());
    for hook in HookName::ALL {
        println!("  {:<14} {}", hook.as_str(), Theme::flag(declared.contains(&hook)));
    }
    Ok(())
}

/// Fire one hook of a loaded plugin.
pub(crate) async fn run(loader: &PluginLoader, plugin: &str, hook: &str) -> Result<()> {
    let Ok(hook) = hook.parse::<HookName>() else {
        let valid: Vec<&str> = HookName::ALL.iter().map(|h| h.as_str()).collect();
        bail!("Unknown hook \"{hook}\" (expected one of: {})", valid.join(", "));
    };
    loader.run_hook(plugin, hook).await?;
    println!("{}", Theme::success(&format!("{hook} completed for {plugin}")));
    Ok(())
}
