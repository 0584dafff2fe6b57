//! Package naming conventions that mark a folder as a plugin.
//!
//! Two shapes qualify inside a `node_modules` root:
//! - a standalone package whose folder starts with the tool prefix
//!   (`strand-plugin-git`)
//! - a package under the tool's organization scope whose unscoped name
//!   starts with `plugin-` or is one of the reserved names
//!   (`@strand/plugin-git`, `@strand/devtools`)

/// Prefix every scoped plugin name carries (`@scope/plugin-*`).
const SCOPED_PLUGIN_PREFIX: &str = "plugin-";

/// Naming rules used by the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginNaming {
    prefix: String,
    scope: String,
    reserved: Vec<String>,
}

impl Default for PluginNaming {
    fn default() -> Self {
        Self {
            prefix: format!("{}-plugin-", strand_core::TOOL_NAME),
            scope: format!("@{}", strand_core::TOOL_NAME),
            reserved: vec!["devtools".to_owned()],
        }
    }
}

impl PluginNaming {
    /// Create naming rules from a standalone prefix, an `@org` scope, and
    /// the reserved scoped names.
    #[must_use]
    pub fn new(
        prefix: impl Into<String>,
        scope: impl Into<String>,
        reserved: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            scope: scope.into(),
            reserved: reserved.into_iter().map(Into::into).collect(),
        }
    }

    /// Standalone package prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Organization scope, including the leading `@`.
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Whether a top-level `node_modules` folder is a standalone plugin.
    #[must_use]
    pub fn is_standalone(&self, folder: &str) -> bool {
        folder.starts_with(&self.prefix)
    }

    /// Whether a `@scope` folder is the tool's own organization scope.
    #[must_use]
    pub fn is_own_scope(&self, scope_folder: &str) -> bool {
        scope_folder == self.scope
    }

    /// Whether the unscoped part of an own-scope package is a plugin.
    #[must_use]
    pub fn is_scoped_plugin(&self, suffix: &str) -> bool {
        suffix.starts_with(SCOPED_PLUGIN_PREFIX) || self.reserved.iter().any(|r| r == suffix)
    }

    /// Whether a full package name (`name` or `@scope/name`) is a plugin.
    #[must_use]
    pub fn is_plugin_package(&self, package: &str) -> bool {
        match package.split_once('/') {
            Some((scope, suffix)) => self.is_own_scope(scope) && self.is_scoped_plugin(suffix),
            None => self.is_standalone(package),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standalone_prefix_is_detected() {
        let naming = PluginNaming::default();
        assert!(naming.is_standalone("strand-plugin-foo"));
        assert!(!naming.is_standalone("strand-foo"));
        assert!(!naming.is_standalone("lodash"));
    }

    #[test]
    fn scoped_rules() {
        let naming = PluginNaming::default();
        assert!(naming.is_plugin_package("@strand/plugin-foo"));
        assert!(naming.is_plugin_package("@strand/devtools"));
        assert!(!naming.is_plugin_package("@strand/unrelated"));
        assert!(!naming.is_plugin_package("@other/plugin-foo"));
    }

    #[test]
    fn custom_rules() {
        let naming = PluginNaming::new("acme-ext-", "@acme", ["core"]);
        assert!(naming.is_plugin_package("acme-ext-lint"));
        assert!(naming.is_plugin_package("@acme/core"));
        assert!(!naming.is_plugin_package("@acme/devtools"));
    }
}
