//! Live load statuses and reloading.

use strand_plugins::{LoadSummary, PluginLoader, PluginStatus};

use crate::theme::Theme;

fn print_statuses(statuses: &[PluginStatus]) {
    if statuses.is_empty() {
        println!("{}", Theme::info("No plugins discovered"));
        return;
    }
    println!(
        "  {:<32} {:<8} {:<8} {:>8}  LOADED AT",
        "NAME", "TYPE", "STATE", "TIME"
    );
    println!("{}", Theme::separator());
    for status in statuses {
        let state = if status.loaded {
            Theme::success("ok")
        } else if status.disabled {
            Theme::dimmed("off")
        } else {
            Theme::error("failed")
        };
        let time = status
            .duration
            .map_or_else(|| "-".to_owned(), |d| format!("{}ms", d.as_millis()));
        let at = status
            .installed_at
            .as_ref()
            .map_or_else(|| Theme::dimmed("-"), Theme::timestamp);
        println!(
            "  {:<32} {:<8} {:<8} {:>8}  {}",
            status.name(),
            status.candidate.runtime_type().to_string(),
            state,
            time,
            at
        );
        if let Some(error) = &status.error
            && !status.loaded
        {
            println!("    {}", Theme::dimmed(error));
        }
    }
}

fn print_summary(summary: LoadSummary) {
    println!(
        "\n{}",
        Theme::dimmed(&format!(
            "{} discovered, {} loaded, {} failed",
            summary.discovered, summary.loaded, summary.failed
        ))
    );
}

/// Statuses from the startup load.
pub(crate) fn run(loader: &PluginLoader) {
    println!("{}", Theme::header("Plugin Status"));
    print_statuses(loader.statuses());
}

/// Load again and print the fresh statuses.
pub(crate) async fn reload(loader: &mut PluginLoader) {
    let summary = loader.reload().await;
    println!("{}", Theme::header("Plugins Reloaded"));
    print_statuses(loader.statuses());
    print_summary(summary);
}
