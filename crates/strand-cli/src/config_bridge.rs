//! Bridge from `strand_config::Config` to domain types.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

use strand_config::Config;
use strand_plugins::{LoaderOptions, PluginNaming, WasmConfig};
use strand_telemetry::{FileRotation, LogConfig, LogFormat, LogTarget};

/// Convert the `[logging]` section to a [`LogConfig`]. A `file` target
/// with no directory writes under `default_dir`.
pub(crate) fn to_log_config(cfg: &Config, default_dir: &Path) -> LogConfig {
    let l = &cfg.logging;
    let format = l.format.parse::<LogFormat>().unwrap_or_default();

    let mut log_config = LogConfig::new(&l.level).with_format(format);
    log_config = match l.target.as_str() {
        "file" => {
            let directory = if l.directory.is_empty() {
                default_dir.to_path_buf()
            } else {
                PathBuf::from(&l.directory)
            };
            let rotation = l.rotation.parse::<FileRotation>().unwrap_or_default();
            log_config.with_file_logging(directory, rotation)
        },
        "stdout" => log_config.with_target(LogTarget::Stdout),
        _ => log_config.with_target(LogTarget::Stderr),
    };
    if !l.timestamps {
        log_config = log_config.without_timestamps();
    }
    if l.file_info {
        log_config = log_config.with_file_info();
    }
    let tty = match log_config.target {
        LogTarget::Stdout => std::io::stdout().is_terminal(),
        LogTarget::Stderr => std::io::stderr().is_terminal(),
        LogTarget::File { .. } => false,
    };
    if !tty {
        log_config = log_config.without_ansi();
    }
    for directive in &l.directives {
        log_config = log_config.with_directive(directive);
    }
    log_config
}

/// Naming rules from `[plugins]`.
pub(crate) fn to_naming(cfg: &Config) -> PluginNaming {
    PluginNaming::new(
        &cfg.plugins.prefix,
        &cfg.plugins.scope,
        cfg.plugins.reserved.iter().cloned(),
    )
}

/// Guest limits from `[plugins.wasm]`.
pub(crate) fn to_wasm_config(cfg: &Config) -> WasmConfig {
    WasmConfig::default()
        .with_memory_limit(cfg.plugins.wasm.memory_limit_mb)
        .with_timeout(Duration::from_secs(cfg.plugins.wasm.timeout_secs))
}

/// Loader switches from `[plugins]`. `verbose` forces lifecycle lines.
pub(crate) fn to_loader_options(cfg: &Config, verbose: bool) -> LoaderOptions {
    LoaderOptions {
        sandbox: cfg.plugins.sandbox,
        verbose: cfg.plugins.verbose || verbose,
        log_lifecycle: cfg.plugins.verbose || verbose,
    }
}

/// Lifetime of cached discovery, or `None` when caching is off.
pub(crate) fn discovery_cache_ttl(cfg: &Config) -> Option<Duration> {
    let ms = cfg.plugins.discovery_cache_ttl_ms;
    (ms > 0).then(|| Duration::from_millis(ms))
}

/// Debounce window for `watch`.
pub(crate) fn watch_debounce(cfg: &Config) -> Duration {
    Duration::from_millis(cfg.plugins.watch_debounce_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_format_falls_back_to_compact() {
        let mut cfg = Config::default();
        cfg.logging.format = "fancy".into();
        cfg.logging.directives = vec!["strand_plugins=debug".into()];
        let lc = to_log_config(&cfg, Path::new("/tmp/logs"));
        assert_eq!(lc.format, LogFormat::Compact);
        assert_eq!(lc.target, LogTarget::Stderr);
        assert_eq!(lc.directives, vec!["strand_plugins=debug"]);
    }

    #[test]
    fn file_target_defaults_to_home_logs() {
        let mut cfg = Config::default();
        cfg.logging.target = "file".into();
        cfg.logging.rotation = "hourly".into();
        cfg.logging.timestamps = false;
        let lc = to_log_config(&cfg, Path::new("/home/u/.strand/logs"));
        assert_eq!(
            lc.target,
            LogTarget::File {
                directory: PathBuf::from("/home/u/.strand/logs"),
                rotation: FileRotation::Hourly,
            }
        );
        assert!(!lc.ansi);
        assert!(!lc.timestamps);

        cfg.logging.directory = "/var/log/strand".into();
        let lc = to_log_config(&cfg, Path::new("/unused"));
        assert!(matches!(
            lc.target,
            LogTarget::File { ref directory, .. } if directory == Path::new("/var/log/strand")
        ));
    }

    #[test]
    fn naming_follows_config() {
        let mut cfg = Config::default();
        cfg.plugins.prefix = "acme-plugin-".into();
        cfg.plugins.scope = "@acme".into();
        let naming = to_naming(&cfg);
        assert_eq!(naming.prefix(), "acme-plugin-");
        assert_eq!(naming.scope(), "@acme");
        assert!(naming.is_standalone("acme-plugin-git"));
    }

    #[test]
    fn verbose_flag_enables_lifecycle_logging() {
        let cfg = Config::default();
        assert!(!to_loader_options(&cfg, false).log_lifecycle);
        assert!(to_loader_options(&cfg, true).log_lifecycle);
        assert_eq!(watch_debounce(&cfg), Duration::from_millis(500));
    }

    #[test]
    fn zero_ttl_turns_the_discovery_cache_off() {
        let mut cfg = Config::default();
        assert_eq!(discovery_cache_ttl(&cfg), Some(Duration::from_secs(30)));
        cfg.plugins.discovery_cache_ttl_ms = 0;
        assert_eq!(discovery_cache_ttl(&cfg), None);
    }
}
