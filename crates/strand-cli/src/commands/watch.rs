//! Reload plugins whenever the custom plugin directory changes.

use std::sync::Arc;

use anyhow::{Context, Result};
use strand_plugins::PluginLoader;
use strand_plugins::watcher::PluginWatcher;
use tokio::sync::Mutex;

use crate::config_bridge;
use crate::host::Host;
use crate::theme::Theme;

pub(crate) async fn run(host: &Host, loader: PluginLoader) -> Result<()> {
    let loader = Arc::new(Mutex::new(loader));
    let mut watcher = PluginWatcher::new(Arc::clone(&loader), host.plugins_dir.clone())
        .context("failed to start plugin watcher")?
        .with_debounce(config_bridge::watch_debounce(&host.config));

    println!(
        "{}",
        Theme::info(&format!(
            "Watching {} (Ctrl-C to stop)",
            watcher.root().display()
        ))
    );
    watcher.run().await;
    println!("{}", Theme::dimmed("Watcher stopped"));
    Ok(())
}
