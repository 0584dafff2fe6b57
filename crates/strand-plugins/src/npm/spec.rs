//! npm package specifier parsing and validation.
//!
//! Parses specifiers like `@scope/name@version`, `name@version`, `@scope/name`
//! and `name`, and checks names against npm naming rules before they are
//! handed to the package manager or joined onto a filesystem path.

use std::path::{Path, PathBuf};

use crate::error::{PluginError, PluginResult};

/// Maximum npm package name length (scope + name combined).
const MAX_PACKAGE_NAME_LENGTH: usize = 214;

/// A parsed npm package specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpmSpec {
    /// Optional scope (without the `@` prefix).
    pub scope: Option<String>,
    /// Package name (without scope).
    pub name: String,
    /// Optional version or dist-tag (e.g. `"1.0.0"`, `"latest"`).
    pub version: Option<String>,
}

impl NpmSpec {
    /// Parse an npm package specifier string.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidPackageName`] if the specifier is empty,
    /// malformed, or any name component breaks npm naming rules.
    pub fn parse(spec: &str) -> PluginResult<Self> {
        let spec = spec.trim();
        let malformed = || PluginError::InvalidPackageName {
            name: spec.to_owned(),
            reason: "malformed package specifier".to_owned(),
        };
        if spec.is_empty() {
            return Err(PluginError::InvalidPackageName {
                name: String::new(),
                reason: "empty package specifier".to_owned(),
            });
        }

        let (scope, rest) = match spec.strip_prefix('@') {
            Some(scoped) => {
                let (scope, rest) = scoped.split_once('/').ok_or_else(malformed)?;
                (Some(scope), rest)
            },
            None => (None, spec),
        };

        let (name, version) = match rest.split_once('@') {
            Some((name, version)) if !version.is_empty() => (name, Some(version)),
            Some(_) => return Err(malformed()),
            None => (rest, None),
        };

        let parsed = Self {
            scope: scope.map(str::to_owned),
            name: name.to_owned(),
            version: version.map(str::to_owned),
        };
        parsed.validate()?;
        Ok(parsed)
    }

    fn validate(&self) -> PluginResult<()> {
        let full_name = self.full_name();
        if full_name.len() > MAX_PACKAGE_NAME_LENGTH {
            return Err(PluginError::InvalidPackageName {
                name: full_name,
                reason: format!("exceeds maximum length of {MAX_PACKAGE_NAME_LENGTH} characters"),
            });
        }

        if let Some(scope) = &self.scope {
            validate_name_component(scope, "scope")?;
        }
        validate_name_component(&self.name, "name")
    }

    /// Full package name including scope (e.g. `@scope/name` or `name`).
    #[must_use]
    pub fn full_name(&self) -> String {
        match &self.scope {
            Some(scope) => format!("@{scope}/{}", self.name),
            None => self.name.clone(),
        }
    }

    /// Same package pinned to `version` (a semver range or dist-tag).
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Where the package manager places this package under `prefix`.
    #[must_use]
    pub fn install_path(&self, prefix: &Path) -> PathBuf {
        let node_modules = prefix.join("node_modules");
        match &self.scope {
            Some(scope) => node_modules.join(format!("@{scope}")).join(&self.name),
            None => node_modules.join(&self.name),
        }
    }
}

/// Validate a single name component against npm rules.
///
/// Must match `[a-z0-9][a-z0-9._-]*`.
fn validate_name_component(name: &str, kind: &str) -> PluginResult<()> {
    let invalid = |reason: String| PluginError::InvalidPackageName {
        name: name.to_owned(),
        reason,
    };

    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(invalid(format!("{kind} cannot be empty")));
    };

    if !first.is_ascii_lowercase() && !first.is_ascii_digit() {
        return Err(invalid(format!(
            "{kind} must start with a lowercase letter or digit"
        )));
    }

    if let Some(c) = chars.find(|c| {
        !c.is_ascii_lowercase() && !c.is_ascii_digit() && !matches!(c, '.' | '_' | '-')
    }) {
        return Err(invalid(format!(
            "{kind} contains invalid character '{c}' (allowed: a-z, 0-9, '.', '_', '-')"
        )));
    }

    Ok(())
}

impl std::fmt::Display for NpmSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_name())?;
        if let Some(version) = &self.version {
            write!(f, "@{version}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_scoped_with_version() {
        let spec = NpmSpec::parse("@strand/plugin-git@1.2.0").unwrap();
        assert_eq!(spec.scope.as_deref(), Some("strand"));
        assert_eq!(spec.name, "plugin-git");
        assert_eq!(spec.version.as_deref(), Some("1.2.0"));
        assert_eq!(spec.to_string(), "@strand/plugin-git@1.2.0");
    }

    #[test]
    fn parse_unscoped_without_version() {
        let spec = NpmSpec::parse("strand-plugin-lint").unwrap();
        assert_eq!(spec.scope, None);
        assert_eq!(spec.name, "strand-plugin-lint");
        assert_eq!(spec.version, None);
    }

    #[test]
    fn with_version_pins_latest() {
        let spec = NpmSpec::parse("strand-plugin-lint").unwrap().with_version("latest");
        assert_eq!(spec.to_string(), "strand-plugin-lint@latest");
    }

    #[test]
    fn install_path_nests_scope() {
        let spec = NpmSpec::parse("@strand/devtools").unwrap();
        assert_eq!(
            spec.install_path(Path::new("/p")),
            PathBuf::from("/p/node_modules/@strand/devtools")
        );
    }

    #[test]
    fn rejects_bad_names() {
        assert!(NpmSpec::parse("").is_err());
        assert!(NpmSpec::parse("@scope").is_err());
        assert!(NpmSpec::parse("name@").is_err());
        assert!(NpmSpec::parse("Upper").is_err());
        assert!(NpmSpec::parse("../escape").is_err());
        assert!(NpmSpec::parse(&"a".repeat(215)).is_err());
    }
}
