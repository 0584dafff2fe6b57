//! Post-merge configuration validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Longest accepted debounce window (one minute).
const MAX_DEBOUNCE_MS: u64 = 60_000;

/// Validate a fully merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_plugins(config)?;
    validate_logging(config)?;
    Ok(())
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message: message.into(),
    }
}

fn validate_plugins(config: &Config) -> ConfigResult<()> {
    let p = &config.plugins;

    if p.prefix.is_empty() || p.prefix.contains('/') {
        return Err(invalid(
            "plugins.prefix",
            format!("'{}' is not a usable package name prefix", p.prefix),
        ));
    }

    if !p.scope.starts_with('@') || p.scope.len() < 2 || p.scope.contains('/') {
        return Err(invalid(
            "plugins.scope",
            format!("'{}' must look like '@org'", p.scope),
        ));
    }

    if p.watch_debounce_ms == 0 || p.watch_debounce_ms > MAX_DEBOUNCE_MS {
        return Err(invalid(
            "plugins.watch_debounce_ms",
            format!(
                "{} is out of range; must be between 1 and {MAX_DEBOUNCE_MS}",
                p.watch_debounce_ms
            ),
        ));
    }

    if p.package_manager.trim().is_empty() {
        return Err(invalid("plugins.package_manager", "must not be empty"));
    }

    if p.wasm.memory_limit_mb == 0 {
        return Err(invalid("plugins.wasm.memory_limit_mb", "must be at least 1"));
    }
    if p.wasm.timeout_secs == 0 {
        return Err(invalid("plugins.wasm.timeout_secs", "must be at least 1"));
    }

    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let l = &config.logging;

    if !matches!(
        l.level.as_str(),
        "trace" | "debug" | "info" | "warn" | "error" | "off"
    ) {
        return Err(invalid(
            "logging.level",
            format!(
                "unsupported level '{}'; expected one of: trace, debug, info, warn, error, off",
                l.level
            ),
        ));
    }

    if !matches!(l.format.as_str(), "pretty" | "compact" | "json" | "full") {
        return Err(invalid(
            "logging.format",
            format!(
                "unsupported format '{}'; expected one of: pretty, compact, json, full",
                l.format
            ),
        ));
    }

    if !matches!(l.target.as_str(), "stderr" | "stdout" | "file") {
        return Err(invalid(
            "logging.target",
            format!(
                "unsupported target '{}'; expected one of: stderr, stdout, file",
                l.target
            ),
        ));
    }

    if !matches!(l.rotation.as_str(), "daily" | "hourly" | "never") {
        return Err(invalid(
            "logging.rotation",
            format!(
                "unsupported rotation '{}'; expected one of: daily, hourly, never",
                l.rotation
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn rejects_scope_without_at() {
        let mut config = Config::default();
        config.plugins.scope = "strand".to_owned();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("plugins.scope"));
    }

    #[test]
    fn rejects_zero_debounce() {
        let mut config = Config::default();
        config.plugins.watch_debounce_ms = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_unknown_log_target_and_rotation() {
        let mut config = Config::default();
        config.logging.target = "syslog".to_owned();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("logging.target"));

        let mut config = Config::default();
        config.logging.target = "file".to_owned();
        config.logging.rotation = "weekly".to_owned();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("logging.rotation"));
    }

    #[test]
    fn rejects_unknown_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_owned();
        assert!(validate(&config).is_err());
    }
}
