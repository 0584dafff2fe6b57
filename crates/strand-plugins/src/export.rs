//! Untyped plugin exports.
//!
//! An imported module yields an [`Export`]: a JSON-like tree whose leaves may
//! also be host callables (install functions, hooks, command actions). The
//! manifest validator turns that tree into a typed
//! [`PluginManifest`](crate::PluginManifest).

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::command::{ActionInput, PluginCli};
use crate::context::{PluginContext, PluginRuntimeContext};
use crate::error::{PluginError, PluginResult};

/// A plugin's `install(cli, ctx)` entry point.
#[async_trait]
pub trait InstallFn: Send + Sync {
    /// Mount commands through `cli`.
    async fn install(&self, cli: &mut PluginCli<'_>, ctx: &PluginContext) -> anyhow::Result<()>;
}

/// A lifecycle hook.
#[async_trait]
pub trait HookFn: Send + Sync {
    /// Run the hook.
    async fn call(&self, ctx: &PluginRuntimeContext) -> anyhow::Result<()>;
}

/// A manifest-declared command action or contribution callable.
#[async_trait]
pub trait ActionFn: Send + Sync {
    /// Run the action for one invocation.
    async fn call(&self, input: &ActionInput, ctx: &PluginRuntimeContext) -> anyhow::Result<()>;
}

struct SyncInstall<F>(F);

#[async_trait]
impl<F> InstallFn for SyncInstall<F>
where
    F: Fn(&mut PluginCli<'_>, &PluginContext) -> anyhow::Result<()> + Send + Sync,
{
    async fn install(&self, cli: &mut PluginCli<'_>, ctx: &PluginContext) -> anyhow::Result<()> {
        (self.0)(cli, ctx)
    }
}

struct ClosureHook<F>(F);

#[async_trait]
impl<F, Fut> HookFn for ClosureHook<F>
where
    F: Fn(PluginRuntimeContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn call(&self, ctx: &PluginRuntimeContext) -> anyhow::Result<()> {
        (self.0)(ctx.clone()).await
    }
}

struct ClosureAction<F>(F);

#[async_trait]
impl<F, Fut> ActionFn for ClosureAction<F>
where
    F: Fn(ActionInput, PluginRuntimeContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn call(&self, input: &ActionInput, ctx: &PluginRuntimeContext) -> anyhow::Result<()> {
        (self.0)(input.clone(), ctx.clone()).await
    }
}

/// Wrap a synchronous closure as an [`InstallFn`]. Mounting never awaits, so
/// most plugins need nothing more.
pub fn install_fn<F>(f: F) -> Arc<dyn InstallFn>
where
    F: Fn(&mut PluginCli<'_>, &PluginContext) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(SyncInstall(f))
}

/// Wrap an async closure as a [`HookFn`]. The closure gets its own copy of
/// the context.
pub fn hook_fn<F, Fut>(f: F) -> Arc<dyn HookFn>
where
    F: Fn(PluginRuntimeContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(ClosureHook(f))
}

/// Wrap an async closure as an [`ActionFn`].
pub fn action_fn<F, Fut>(f: F) -> Arc<dyn ActionFn>
where
    F: Fn(ActionInput, PluginRuntimeContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(ClosureAction(f))
}

/// A value exported by a plugin module.
#[derive(Clone)]
pub enum Export {
    /// A plain JSON scalar: null, bool, number or string.
    Value(Value),
    /// A keyed object.
    Object(BTreeMap<String, Export>),
    /// A list.
    List(Vec<Export>),
    /// An install entry point.
    Install(Arc<dyn InstallFn>),
    /// A lifecycle hook.
    Hook(Arc<dyn HookFn>),
    /// A command action or other callable.
    Action(Arc<dyn ActionFn>),
}

impl Export {
    /// An empty object.
    #[must_use]
    pub fn object() -> Self {
        Self::Object(BTreeMap::new())
    }

    /// Insert `key` into an object export. No-op on other variants.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Export>) -> Self {
        if let Self::Object(map) = &mut self {
            map.insert(key.into(), value.into());
        }
        self
    }

    /// Member `key` of an object export.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Export> {
        match self {
            Self::Object(map) => map.get(key),
            _ => None,
        }
    }

    /// The string value, if this is a string scalar.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Value(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    /// The members, if this is an object.
    #[must_use]
    pub fn as_object(&self) -> Option<&BTreeMap<String, Export>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    /// The items, if this is a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Export]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Short name of the variant, for diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Value(Value::Null) => "null",
            Self::Value(Value::Bool(_)) => "boolean",
            Self::Value(Value::Number(_)) => "number",
            Self::Value(Value::String(_)) => "string",
            Self::Value(_) | Self::Object(_) => "object",
            Self::List(_) => "list",
            Self::Install(_) => "install function",
            Self::Hook(_) => "hook function",
            Self::Action(_) => "action function",
        }
    }

    /// Lower to plain JSON, replacing callables with `null`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Value(v) => v.clone(),
            Self::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Install(_) | Self::Hook(_) | Self::Action(_) => Value::Null,
        }
    }
}

impl fmt::Debug for Export {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "{v}"),
            Self::Object(map) => f.debug_map().entries(map.iter()).finish(),
            Self::List(items) => f.debug_list().entries(items.iter()).finish(),
            Self::Install(_) => f.write_str("<install>"),
            Self::Hook(_) => f.write_str("<hook>"),
            Self::Action(_) => f.write_str("<action>"),
        }
    }
}

impl From<Value> for Export {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect()),
            Value::Array(items) => Self::List(items.into_iter().map(Into::into).collect()),
            scalar => Self::Value(scalar),
        }
    }
}

impl From<&str> for Export {
    fn from(s: &str) -> Self {
        Self::Value(Value::String(s.to_owned()))
    }
}

impl From<String> for Export {
    fn from(s: String) -> Self {
        Self::Value(Value::String(s))
    }
}

impl From<Vec<Export>> for Export {
    fn from(items: Vec<Export>) -> Self {
        Self::List(items)
    }
}

impl From<Arc<dyn InstallFn>> for Export {
    fn from(f: Arc<dyn InstallFn>) -> Self {
        Self::Install(f)
    }
}

impl From<Arc<dyn HookFn>> for Export {
    fn from(f: Arc<dyn HookFn>) -> Self {
        Self::Hook(f)
    }
}

impl From<Arc<dyn ActionFn>> for Export {
    fn from(f: Arc<dyn ActionFn>) -> Self {
        Self::Action(f)
    }
}

/// An export that passed the shape check: a named, versioned object with an
/// install entry point.
#[derive(Clone)]
pub struct PluginDefinition {
    /// Declared plugin name.
    pub name: String,
    /// Declared version.
    pub version: String,
    /// The install entry point.
    pub install: Arc<dyn InstallFn>,
    /// The whole export, for manifest validation.
    pub export: Export,
}

impl fmt::Debug for PluginDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDefinition")
            .field("name", &self.name)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Check that `export` is an object with string `name` and `version` and an
/// install callable.
///
/// # Errors
///
/// Returns [`PluginError::InvalidExport`] for any other shape.
pub fn validate_definition(export: Export) -> PluginResult<PluginDefinition> {
    let name = export.get("name").and_then(Export::as_str);
    let version = export.get("version").and_then(Export::as_str);
    let install = match export.get("install") {
        Some(Export::Install(f)) => Some(Arc::clone(f)),
        _ => None,
    };

    match (name, version, install) {
        (Some(name), Some(version), Some(install)) => Ok(PluginDefinition {
            name: name.to_owned(),
            version: version.to_owned(),
            install,
            export,
        }),
        _ => Err(PluginError::InvalidExport),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop_install() -> Arc<dyn InstallFn> {
        install_fn(|_, _| Ok(()))
    }

    #[test]
    fn json_converts_recursively() {
        let e = Export::from(json!({"name": "p", "tools": [{"name": "t"}]}));
        assert_eq!(e.get("name").and_then(Export::as_str), Some("p"));
        let tools = e.get("tools").and_then(Export::as_list).unwrap();
        assert_eq!(tools[0].get("name").and_then(Export::as_str), Some("t"));
    }

    #[test]
    fn definition_requires_all_three_members() {
        let full = Export::object()
            .with("name", "p")
            .with("version", "1.0.0")
            .with("install", noop_install());
        let def = validate_definition(full).unwrap();
        assert_eq!(def.name, "p");
        assert_eq!(def.version, "1.0.0");

        let no_install = Export::object().with("name", "p").with("version", "1.0.0");
        assert!(matches!(
            validate_definition(no_install),
            Err(PluginError::InvalidExport)
        ));

        let numeric_version = Export::object()
            .with("name", "p")
            .with("version", Export::from(json!(1)))
            .with("install", noop_install());
        assert!(validate_definition(numeric_version).is_err());

        assert!(validate_definition(Export::from("just a string")).is_err());
    }

    #[test]
    fn install_must_be_install_variant() {
        let hook: Arc<dyn HookFn> = hook_fn(|_| async { Ok(()) });
        let wrong = Export::object()
            .with("name", "p")
            .with("version", "1.0.0")
            .with("install", hook);
        assert!(validate_definition(wrong).is_err());
    }

    #[test]
    fn to_json_nulls_callables() {
        let e = Export::object().with("a", "x").with("install", noop_install());
        assert_eq!(e.to_json(), json!({"a": "x", "install": null}));
    }
}
