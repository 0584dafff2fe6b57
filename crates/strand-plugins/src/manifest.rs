//! Manifest validation.
//!
//! A plugin's default export is validated in two passes. The first checks
//! the fields every plugin needs and the types of the top-level members; the
//! second checks the shape of every nested item. Only a fully valid export
//! becomes a [`PluginManifest`], with every optional member normalized to
//! its empty default.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::export::{ActionFn, Export, HookFn};

/// Lifecycle hook names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HookName {
    /// Before `install`.
    OnLoad,
    /// After commands are mounted.
    OnRegister,
    /// Before any of the plugin's manifest commands runs.
    OnRun,
    /// Right after `onRun`, for the specific command.
    OnCommandRun,
}

impl HookName {
    /// Every hook, in firing order.
    pub const ALL: [Self; 4] = [Self::OnLoad, Self::OnRegister, Self::OnRun, Self::OnCommandRun];

    /// The exported key.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OnLoad => "onLoad",
            Self::OnRegister => "onRegister",
            Self::OnRun => "onRun",
            Self::OnCommandRun => "onCommandRun",
        }
    }
}

impl fmt::Display for HookName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookName {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|h| h.as_str() == s).ok_or(())
    }
}

/// Permissions a plugin can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    /// Read files.
    #[serde(rename = "fs:read")]
    FsRead,
    /// Write files.
    #[serde(rename = "fs:write")]
    FsWrite,
    /// Network access.
    #[serde(rename = "network")]
    Network,
    /// Spawn processes.
    #[serde(rename = "process:exec")]
    ProcessExec,
    /// Leave the sandbox.
    #[serde(rename = "sandbox:escape")]
    SandboxEscape,
}

impl Permission {
    /// Every permission.
    pub const ALL: [Self; 5] = [
        Self::FsRead,
        Self::FsWrite,
        Self::Network,
        Self::ProcessExec,
        Self::SandboxEscape,
    ];

    /// The manifest spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FsRead => "fs:read",
            Self::FsWrite => "fs:write",
            Self::Network => "network",
            Self::ProcessExec => "process:exec",
            Self::SandboxEscape => "sandbox:escape",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|p| p.as_str() == s).ok_or(())
    }
}

/// One option of a declared command.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionDecl {
    /// Flag syntax, e.g. `-f, --force` or `--out <dir>`.
    pub flags: String,
    /// Help text.
    pub description: Option<String>,
    /// Default value.
    pub default_value: Option<Value>,
}

/// A command the plugin declares in its manifest.
#[derive(Clone)]
pub struct CommandSpec {
    /// Declaration, e.g. `greet <name>`.
    pub name: String,
    /// Help text.
    pub description: Option<String>,
    /// Alternative name for the leaf.
    pub alias: Option<String>,
    /// Options.
    pub options: Vec<OptionDecl>,
    /// Handler.
    pub action: Option<Arc<dyn ActionFn>>,
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("alias", &self.alias)
            .field("options", &self.options)
            .field("has_action", &self.action.is_some())
            .finish()
    }
}

/// A tool, app, template, engine, agent or SDK contribution.
#[derive(Clone)]
pub struct ContributionSpec {
    /// Contribution name.
    pub name: String,
    /// Help text.
    pub description: Option<String>,
    /// Entry point, if the contribution is invocable.
    pub callable: Option<Arc<dyn ActionFn>>,
}

impl fmt::Debug for ContributionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContributionSpec")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("callable", &self.callable.is_some())
            .finish()
    }
}

/// Kinds of named contributions, used for conflict detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContributionKind {
    /// `commands`
    Command,
    /// `tools`
    Tool,
    /// `apps`
    App,
    /// `templates`
    Template,
    /// `engines`
    Engine,
    /// `agents`
    Agent,
    /// `sdks`
    Sdk,
}

impl ContributionKind {
    /// Every kind.
    pub const ALL: [Self; 7] = [
        Self::Command,
        Self::Tool,
        Self::App,
        Self::Template,
        Self::Engine,
        Self::Agent,
        Self::Sdk,
    ];

    /// Singular label for messages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Tool => "tool",
            Self::App => "app",
            Self::Template => "template",
            Self::Engine => "engine",
            Self::Agent => "agent",
            Self::Sdk => "sdk",
        }
    }

    const fn field(self) -> &'static str {
        match self {
            Self::Command => "commands",
            Self::Tool => "tools",
            Self::App => "apps",
            Self::Template => "templates",
            Self::Engine => "engines",
            Self::Agent => "agents",
            Self::Sdk => "sdks",
        }
    }
}

impl fmt::Display for ContributionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Hook callables keyed by name.
#[derive(Clone, Default)]
pub struct Hooks(BTreeMap<HookName, Arc<dyn HookFn>>);

impl Hooks {
    /// The hook registered under `name`.
    #[must_use]
    pub fn get(&self, name: HookName) -> Option<&Arc<dyn HookFn>> {
        self.0.get(&name)
    }

    /// Register a hook, replacing any previous one.
    pub fn insert(&mut self, name: HookName, hook: Arc<dyn HookFn>) {
        self.0.insert(name, hook);
    }

    /// Registered hook names, in firing order.
    pub fn names(&self) -> impl Iterator<Item = HookName> + '_ {
        self.0.keys().copied()
    }

    /// Whether no hooks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of registered hooks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}

/// A validated plugin manifest.
#[derive(Debug, Clone, Default)]
pub struct PluginManifest {
    /// Plugin name, never empty.
    pub name: String,
    /// Plugin version, never empty.
    pub version: String,
    /// Description, `""` when absent.
    pub description: String,
    /// Catalog category.
    pub category: Option<String>,
    /// Declared commands.
    pub commands: Vec<CommandSpec>,
    /// Tools.
    pub tools: Vec<ContributionSpec>,
    /// Apps.
    pub apps: Vec<ContributionSpec>,
    /// Templates.
    pub templates: Vec<ContributionSpec>,
    /// Engines.
    pub engines: Vec<ContributionSpec>,
    /// Agents.
    pub agents: Vec<ContributionSpec>,
    /// SDKs.
    pub sdks: Vec<ContributionSpec>,
    /// Lifecycle hooks.
    pub hooks: Hooks,
    /// Requested permissions.
    pub permissions: Vec<Permission>,
}

impl PluginManifest {
    /// Contributions of one non-command kind.
    #[must_use]
    pub fn contributions(&self, kind: ContributionKind) -> &[ContributionSpec] {
        match kind {
            ContributionKind::Command => &[],
            ContributionKind::Tool => &self.tools,
            ContributionKind::App => &self.apps,
            ContributionKind::Template => &self.templates,
            ContributionKind::Engine => &self.engines,
            ContributionKind::Agent => &self.agents,
            ContributionKind::Sdk => &self.sdks,
        }
    }

    /// Names contributed under `kind`, commands included.
    #[must_use]
    pub fn names_of(&self, kind: ContributionKind) -> Vec<&str> {
        match kind {
            ContributionKind::Command => self.commands.iter().map(|c| c.name.as_str()).collect(),
            other => self
                .contributions(other)
                .iter()
                .map(|c| c.name.as_str())
                .collect(),
        }
    }

    /// Plain-data copy for persistence.
    #[must_use]
    pub fn snapshot(&self) -> ManifestSnapshot {
        let names = |kind| self.names_of(kind).into_iter().map(str::to_owned).collect();
        ManifestSnapshot {
            name: self.name.clone(),
            version: self.version.clone(),
            description: self.description.clone(),
            category: self.category.clone(),
            commands: names(ContributionKind::Command),
            tools: names(ContributionKind::Tool),
            apps: names(ContributionKind::App),
            templates: names(ContributionKind::Template),
            engines: names(ContributionKind::Engine),
            agents: names(ContributionKind::Agent),
            sdks: names(ContributionKind::Sdk),
            hooks: self.hooks.names().collect(),
            permissions: self.permissions.clone(),
        }
    }
}

/// Serializable view of a manifest: names only, no callables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestSnapshot {
    /// Plugin name.
    pub name: String,
    /// Plugin version.
    pub version: String,
    /// Description.
    pub description: String,
    /// Category.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Command declarations.
    pub commands: Vec<String>,
    /// Tool names.
    pub tools: Vec<String>,
    /// App names.
    pub apps: Vec<String>,
    /// Template names.
    pub templates: Vec<String>,
    /// Engine names.
    pub engines: Vec<String>,
    /// Agent names.
    pub agents: Vec<String>,
    /// SDK names.
    pub sdks: Vec<String>,
    /// Registered hook names.
    pub hooks: Vec<HookName>,
    /// Requested permissions.
    pub permissions: Vec<Permission>,
}

impl ManifestSnapshot {
    /// Names contributed under `kind`.
    #[must_use]
    pub fn names_of(&self, kind: ContributionKind) -> &[String] {
        match kind {
            ContributionKind::Command => &self.commands,
            ContributionKind::Tool => &self.tools,
            ContributionKind::App => &self.apps,
            ContributionKind::Template => &self.templates,
            ContributionKind::Engine => &self.engines,
            ContributionKind::Agent => &self.agents,
            ContributionKind::Sdk => &self.sdks,
        }
    }
}

/// A single validation finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestIssue {
    /// A required field is absent.
    MissingField {
        /// Field path.
        field: String,
    },
    /// A field has the wrong type.
    WrongType {
        /// Field path.
        field: String,
        /// What was expected.
        expected: &'static str,
    },
    /// A hook value is not a hook callable.
    WrongHookType {
        /// Hook key.
        hook: String,
    },
    /// A nested item does not match the schema.
    SchemaMismatch {
        /// Item path, e.g. `commands[0].options[1]`.
        path: String,
        /// What is wrong.
        message: String,
    },
}

impl fmt::Display for ManifestIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField { field } => write!(f, "{field} is required"),
            Self::WrongType { field, expected } => write!(f, "{field} must be {expected}"),
            Self::WrongHookType { hook } => write!(f, "hook {hook} must be a function"),
            Self::SchemaMismatch { path, message } => write!(f, "{path}: {message}"),
        }
    }
}

fn join_issues(issues: &[ManifestIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Manifest validation failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ManifestError {
    /// Required fields or top-level types are wrong.
    #[error("Invalid manifest ({origin}): {}", join_issues(.issues))]
    Invalid {
        /// Where the manifest came from.
        origin: String,
        /// Findings.
        issues: Vec<ManifestIssue>,
    },
    /// Nested items do not match the schema.
    #[error("Schema validation failed ({origin}): {}", join_issues(.issues))]
    Schema {
        /// Where the manifest came from.
        origin: String,
        /// Findings.
        issues: Vec<ManifestIssue>,
    },
}

impl ManifestError {
    /// The findings behind this error.
    #[must_use]
    pub fn issues(&self) -> &[ManifestIssue] {
        match self {
            Self::Invalid { issues, .. } | Self::Schema { issues, .. } => issues,
        }
    }
}

const LIST_FIELDS: [ContributionKind; 7] = ContributionKind::ALL;
const OPTION_KEYS: [&str; 3] = ["flags", "description", "defaultValue"];

/// Validate a plugin export and normalize it into a [`PluginManifest`].
///
/// `origin` names the plugin or path in error messages.
///
/// # Errors
///
/// [`ManifestError::Invalid`] when the first pass finds problems,
/// [`ManifestError::Schema`] when the second does.
pub fn validate_manifest(export: &Export, origin: &str) -> Result<PluginManifest, ManifestError> {
    let issues = check_fields(export);
    if !issues.is_empty() {
        return Err(ManifestError::Invalid {
            origin: origin.to_owned(),
            issues,
        });
    }

    let mut schema = SchemaPass::default();
    let manifest = schema.build(export);
    if !schema.issues.is_empty() {
        return Err(ManifestError::Schema {
            origin: origin.to_owned(),
            issues: schema.issues,
        });
    }
    Ok(manifest)
}

fn check_fields(export: &Export) -> Vec<ManifestIssue> {
    let mut issues = Vec::new();
    if export.as_object().is_none() {
        issues.push(ManifestIssue::WrongType {
            field: "manifest".to_owned(),
            expected: "an object",
        });
        return issues;
    }

    for field in ["name", "version"] {
        match export.get(field) {
            None | Some(Export::Value(Value::Null)) => issues.push(ManifestIssue::MissingField {
                field: field.to_owned(),
            }),
            Some(v) if v.as_str().is_some_and(|s| !s.is_empty()) => {},
            Some(_) => issues.push(ManifestIssue::WrongType {
                field: field.to_owned(),
                expected: "a non-empty string",
            }),
        }
    }

    if export.get("category").is_some_and(|c| c.as_str().is_none()) {
        issues.push(ManifestIssue::WrongType {
            field: "category".to_owned(),
            expected: "a string",
        });
    }

    for kind in LIST_FIELDS {
        if export.get(kind.field()).is_some_and(|v| v.as_list().is_none()) {
            issues.push(ManifestIssue::WrongType {
                field: kind.field().to_owned(),
                expected: "a list",
            });
        }
    }

    match export.get("hooks") {
        None => {},
        Some(Export::Object(hooks)) => {
            for (key, value) in hooks {
                if !matches!(value, Export::Hook(_)) {
                    issues.push(ManifestIssue::WrongHookType { hook: key.clone() });
                }
            }
        },
        Some(_) => issues.push(ManifestIssue::WrongType {
            field: "hooks".to_owned(),
            expected: "an object",
        }),
    }

    issues
}

#[derive(Default)]
struct SchemaPass {
    issues: Vec<ManifestIssue>,
}

impl SchemaPass {
    fn mismatch(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ManifestIssue::SchemaMismatch {
            path: path.into(),
            message: message.into(),
        });
    }

    fn optional_string(&mut self, item: &Export, key: &str, path: &str) -> Option<String> {
        let value = item.get(key)?;
        if let Some(s) = value.as_str() {
            return Some(s.to_owned());
        }
        self.mismatch(format!("{path}.{key}"), format!("expected a string, got {}", value.kind()));
        None
    }

    // Pass 1 already guaranteed name, version and the top-level types.
    fn build(&mut self, export: &Export) -> PluginManifest {
        let text = |key| export.get(key).and_then(Export::as_str).map(str::to_owned);

        let description = self.optional_string(export, "description", "manifest");
        let mut manifest = PluginManifest {
            name: text("name").unwrap_or_default(),
            version: text("version").unwrap_or_default(),
            description: description.unwrap_or_default(),
            category: text("category"),
            ..PluginManifest::default()
        };

        let items = |kind: ContributionKind| {
            export
                .get(kind.field())
                .and_then(Export::as_list)
                .unwrap_or_default()
        };

        manifest.commands = items(ContributionKind::Command)
            .iter()
            .enumerate()
            .filter_map(|(i, item)| self.command(item, &format!("commands[{i}]")))
            .collect();

        for kind in LIST_FIELDS.into_iter().skip(1) {
            let specs: Vec<ContributionSpec> = items(kind)
                .iter()
                .enumerate()
                .filter_map(|(i, item)| self.contribution(item, &format!("{}[{i}]", kind.field())))
                .collect();
            match kind {
                ContributionKind::Tool => manifest.tools = specs,
                ContributionKind::App => manifest.apps = specs,
                ContributionKind::Template => manifest.templates = specs,
                ContributionKind::Engine => manifest.engines = specs,
                ContributionKind::Agent => manifest.agents = specs,
                ContributionKind::Sdk => manifest.sdks = specs,
                ContributionKind::Command => {},
            }
        }

        if let Some(hooks) = export.get("hooks").and_then(Export::as_object) {
            for (key, value) in hooks {
                match (key.parse::<HookName>(), value) {
                    (Ok(name), Export::Hook(f)) => manifest.hooks.insert(name, Arc::clone(f)),
                    (Err(()), _) => self.mismatch(format!("hooks.{key}"), "unknown hook"),
                    (Ok(_), _) => {},
                }
            }
        }

        if let Some(perms) = export.get("permissions") {
            manifest.permissions = self.permissions(perms);
        }

        manifest
    }

    fn command(&mut self, item: &Export, path: &str) -> Option<CommandSpec> {
        if item.as_object().is_none() {
            self.mismatch(path, format!("expected an object, got {}", item.kind()));
            return None;
        }
        let Some(name) = item.get("name").and_then(Export::as_str) else {
            self.mismatch(format!("{path}.name"), "a string name is required");
            return None;
        };

        let description = self.optional_string(item, "description", path);
        let alias = self.optional_string(item, "alias", path);

        let options = match item.get("options") {
            None => Vec::new(),
            Some(Export::List(opts)) => opts
                .iter()
                .enumerate()
                .filter_map(|(i, opt)| self.option(opt, &format!("{path}.options[{i}]")))
                .collect(),
            Some(other) => {
                self.mismatch(
                    format!("{path}.options"),
                    format!("expected a list, got {}", other.kind()),
                );
                Vec::new()
            },
        };

        let action = match item.get("action") {
            None => None,
            Some(Export::Action(f)) => Some(Arc::clone(f)),
            Some(other) => {
                self.mismatch(
                    format!("{path}.action"),
                    format!("expected a function, got {}", other.kind()),
                );
                None
            },
        };

        Some(CommandSpec {
            name: name.to_owned(),
            description,
            alias,
            options,
            action,
        })
    }

    fn option(&mut self, item: &Export, path: &str) -> Option<OptionDecl> {
        let Some(map) = item.as_object() else {
            self.mismatch(path, format!("expected an object, got {}", item.kind()));
            return None;
        };
        for key in map.keys() {
            if !OPTION_KEYS.contains(&key.as_str()) {
                self.mismatch(format!("{path}.{key}"), "unexpected key");
            }
        }
        let Some(flags) = item.get("flags").and_then(Export::as_str) else {
            self.mismatch(format!("{path}.flags"), "a string flags value is required");
            return None;
        };
        let description = self.optional_string(item, "description", path);
        Some(OptionDecl {
            flags: flags.to_owned(),
            description,
            default_value: item.get("defaultValue").map(Export::to_json),
        })
    }

    fn contribution(&mut self, item: &Export, path: &str) -> Option<ContributionSpec> {
        if item.as_object().is_none() {
            self.mismatch(path, format!("expected an object, got {}", item.kind()));
            return None;
        }
        let Some(name) = item.get("name").and_then(Export::as_str) else {
            self.mismatch(format!("{path}.name"), "a string name is required");
            return None;
        };
        let description = self.optional_string(item, "description", path);
        let callable = match item.get("callable") {
            None => None,
            Some(Export::Action(f)) => Some(Arc::clone(f)),
            Some(other) => {
                self.mismatch(
                    format!("{path}.callable"),
                    format!("expected a function, got {}", other.kind()),
                );
                None
            },
        };
        Some(ContributionSpec {
            name: name.to_owned(),
            description,
            callable,
        })
    }

    fn permissions(&mut self, value: &Export) -> Vec<Permission> {
        let Some(items) = value.as_list() else {
            self.mismatch("permissions", format!("expected a list, got {}", value.kind()));
            return Vec::new();
        };
        let mut out = Vec::new();
        for (i, item) in items.iter().enumerate() {
            match item.as_str().map(str::parse::<Permission>) {
                Some(Ok(p)) => {
                    if !out.contains(&p) {
                        out.push(p);
                    }
                },
                Some(Err(())) => self.mismatch(
                    format!("permissions[{i}]"),
                    format!("unknown permission '{}'", item.as_str().unwrap_or_default()),
                ),
                None => self.mismatch(
                    format!("permissions[{i}]"),
                    format!("expected a string, got {}", item.kind()),
                ),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::{action_fn, hook_fn};
    use serde_json::json;

    fn base() -> Export {
        Export::object().with("name", "demo").with("version", "1.2.3")
    }

    #[test]
    fn omitted_optionals_normalize_to_empty() {
        let m = validate_manifest(&base(), "demo").unwrap();
        assert_eq!(m.name, "demo");
        assert_eq!(m.version, "1.2.3");
        assert_eq!(m.description, "");
        assert!(m.category.is_none());
        assert!(m.commands.is_empty());
        for kind in ContributionKind::ALL {
            assert!(m.names_of(kind).is_empty());
        }
        assert!(m.hooks.is_empty());
        assert!(m.permissions.is_empty());
    }

    #[test]
    fn missing_and_mistyped_required_fields() {
        let e = Export::object().with("version", Export::from(json!(3)));
        let err = validate_manifest(&e, "src").unwrap_err();
        assert!(matches!(err, ManifestError::Invalid { .. }));
        assert_eq!(
            err.issues(),
            &[
                ManifestIssue::MissingField {
                    field: "name".into()
                },
                ManifestIssue::WrongType {
                    field: "version".into(),
                    expected: "a non-empty string"
                },
            ]
        );
        assert_eq!(
            err.to_string(),
            "Invalid manifest (src): name is required; version must be a non-empty string"
        );
    }

    #[test]
    fn empty_name_is_rejected() {
        let e = Export::object().with("name", "").with("version", "1.0.0");
        let err = validate_manifest(&e, "x").unwrap_err();
        assert!(matches!(
            err.issues()[0],
            ManifestIssue::WrongType { ref field, .. } if field == "name"
        ));
    }

    #[test]
    fn list_fields_must_be_lists() {
        let e = base().with("tools", "nope").with("category", Export::from(json!(1)));
        let err = validate_manifest(&e, "x").unwrap_err();
        let fields: Vec<_> = err
            .issues()
            .iter()
            .filter_map(|i| match i {
                ManifestIssue::WrongType { field, .. } => Some(field.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(fields, vec!["category", "tools"]);
    }

    #[test]
    fn hook_values_must_be_callables() {
        let hooks = Export::object().with("onLoad", "not a function");
        let err = validate_manifest(&base().with("hooks", hooks), "x").unwrap_err();
        assert_eq!(
            err.issues(),
            &[ManifestIssue::WrongHookType {
                hook: "onLoad".into()
            }]
        );
    }

    #[test]
    fn unknown_hook_key_is_a_schema_issue() {
        let hooks = Export::object()
            .with("onLoad", hook_fn(|_| async { Ok(()) }))
            .with("onExplode", hook_fn(|_| async { Ok(()) }));
        let err = validate_manifest(&base().with("hooks", hooks), "x").unwrap_err();
        assert!(matches!(err, ManifestError::Schema { .. }));
        assert!(err.to_string().starts_with("Schema validation failed (x): hooks.onExplode"));
    }

    #[test]
    fn command_and_option_schema() {
        let good = Export::object()
            .with("name", "greet <who>")
            .with("alias", "g")
            .with(
                "options",
                Export::from(json!([{"flags": "-l, --loud", "defaultValue": false}])),
            )
            .with("action", action_fn(|_, _| async { Ok(()) }));
        let m = validate_manifest(&base().with("commands", vec![good]), "x").unwrap();
        assert_eq!(m.commands.len(), 1);
        assert_eq!(m.commands[0].alias.as_deref(), Some("g"));
        assert_eq!(m.commands[0].options[0].default_value, Some(json!(false)));
        assert!(m.commands[0].action.is_some());

        let bad = Export::from(json!([
            {"description": "no name"},
            {"name": "x", "options": [{"flags": "-a", "extra": 1}]},
            {"name": "y", "action": "not callable"},
            7
        ]));
        let err = validate_manifest(&base().with("commands", bad), "x").unwrap_err();
        let paths: Vec<_> = err
            .issues()
            .iter()
            .map(|i| match i {
                ManifestIssue::SchemaMismatch { path, .. } => path.clone(),
                other => panic!("unexpected issue {other:?}"),
            })
            .collect();
        assert_eq!(
            paths,
            vec![
                "commands[0].name",
                "commands[1].options[0].extra",
                "commands[2].action",
                "commands[3]",
            ]
        );
    }

    #[test]
    fn contributions_and_permissions() {
        let e = base()
            .with("tools", Export::from(json!([{"name": "fmt", "description": "format"}])))
            .with("permissions", Export::from(json!(["fs:read", "network", "fs:read"])));
        let m = validate_manifest(&e, "x").unwrap();
        assert_eq!(m.names_of(ContributionKind::Tool), vec!["fmt"]);
        assert_eq!(m.permissions, vec![Permission::FsRead, Permission::Network]);

        let bad = base().with("permissions", Export::from(json!(["root"])));
        let err = validate_manifest(&bad, "x").unwrap_err();
        assert!(err.to_string().contains("unknown permission 'root'"));
    }

    #[test]
    fn snapshot_keeps_names_only() {
        let e = base()
            .with("commands", Export::from(json!([{"name": "a b"}])))
            .with("hooks", Export::object().with("onRun", hook_fn(|_| async { Ok(()) })));
        let snap = validate_manifest(&e, "x").unwrap().snapshot();
        assert_eq!(snap.commands, vec!["a b"]);
        assert_eq!(snap.hooks, vec![HookName::OnRun]);
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["hooks"], json!(["onRun"]));
    }
}
