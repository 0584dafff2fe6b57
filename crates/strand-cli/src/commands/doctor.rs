//! Doctor command for health checks.

use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use strand_plugins::PluginLoader;

use crate::host::Host;

fn check_dir(label: &str, path: &Path) -> bool {
    print!("  {label}... ");
    if path.is_dir() {
        println!("{} {}", "OK".green(), path.display().to_string().dimmed());
        true
    } else {
        println!("{} {} (missing)", "WARN".yellow(), path.display());
        false
    }
}

/// Check directories, the registry and the last load cycle.
pub(crate) fn run(host: &Host, loader: &PluginLoader) -> Result<()> {
    println!("{}", "Strand Doctor - Plugin Health Check".cyan().bold());
    println!();

    println!("{}", "Directories:".cyan());
    check_dir("Home", host.home.root());
    check_dir("Plugin cache", &host.home.plugin_cache_dir());
    check_dir("Plugins directory", &host.plugins_dir);
    check_dir("Workspace node_modules", &host.workspace().node_modules());

    println!("\n{}", "Tooling:".cyan());
    print!("  Package manager... ");
    let program = host.npm.program();
    if program.is_absolute() && program.exists() {
        println!("{} {}", "OK".green(), program.display().to_string().dimmed());
    } else {
        println!("{} {} not found on PATH", "WARN".yellow(), program.display());
    }

    println!("\n{}", "Registry:".cyan());
    print!("  Registered plugins... ");
    match host.registry() {
        Ok(registry) => {
            let disabled = registry.disabled().count();
            println!(
                "{} ({} registered, {} disabled)",
                "OK".green(),
                registry.list().len(),
                disabled
            );
        },
        Err(e) => println!("{} {e:#}", "FAIL".red()),
    }

    println!("\n{}", "Plugins:".cyan());
    let statuses = loader.statuses();
    if statuses.is_empty() {
        println!("  {}", "No plugins discovered".dimmed());
    }
    let mut failed = 0_usize;
    for status in statuses {
        let state = if status.loaded {
            "OK".green()
        } else if status.disabled {
            "SKIP".dimmed()
        } else {
            failed = failed.saturating_add(1);
            "FAIL".red()
        };
        print!("  {state} {}", status.name());
        if let Some(error) = &status.error {
            print!(" - {}", error.dimmed());
        }
        println!();
    }
    for conflict in loader.conflicts() {
        println!("  {} {conflict}", "WARN".yellow());
    }

    println!();
    let overall = if failed == 0 {
        "All plugins healthy".green()
    } else {
        format!("{failed} plugin(s) failed to load").yellow()
    };
    println!("{}", overall.bold());
    Ok(())
}
