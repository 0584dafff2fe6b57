//! WASM plugin modules backed by Extism.
//!
//! A guest exports `describe`, returning its manifest as JSON. Hook values,
//! command `action` values and contribution `callable` values in that JSON
//! name other guest exports; they are bound to host callables here. A guest
//! may also export `install`, which receives the install context and returns
//! a plan of extra commands to mount.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context as _, anyhow};
use async_trait::async_trait;
use extism::{Manifest, PluginBuilder, Wasm};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::{ImportError, ModuleImporter, ModuleSpecifier, PluginModule};
use crate::command::{ActionInput, CommandAction, CommandBuilder, PluginCli};
use crate::context::{PluginContext, PluginRuntimeContext};
use crate::export::{ActionFn, Export, HookFn, InstallFn};

/// Limits applied to every guest.
#[derive(Debug, Clone)]
pub struct WasmConfig {
    /// Maximum linear memory in MiB.
    pub memory_limit_mb: u64,
    /// Maximum execution time per call.
    pub timeout: Duration,
}

impl Default for WasmConfig {
    fn default() -> Self {
        Self {
            memory_limit_mb: 64,
            timeout: Duration::from_secs(30),
        }
    }
}

impl WasmConfig {
    /// Set the memory limit.
    #[must_use]
    pub fn with_memory_limit(mut self, mb: u64) -> Self {
        self.memory_limit_mb = mb;
        self
    }

    /// Set the per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    // WASM pages are 64 KiB each.
    fn max_pages(&self) -> u32 {
        u32::try_from(self.memory_limit_mb.saturating_mul(16)).unwrap_or(u32::MAX)
    }
}

/// Imports `.wasm` entry files.
#[derive(Debug, Clone, Default)]
pub struct WasmImporter {
    config: WasmConfig,
}

impl WasmImporter {
    /// Importer with the given limits.
    #[must_use]
    pub fn new(config: WasmConfig) -> Self {
        Self { config }
    }

    /// Configured limits.
    #[must_use]
    pub fn config(&self) -> &WasmConfig {
        &self.config
    }
}

#[async_trait]
impl ModuleImporter for WasmImporter {
    fn supports(&self, specifier: &ModuleSpecifier) -> bool {
        specifier.extension().as_deref() == Some("wasm")
    }

    async fn import(&self, specifier: &ModuleSpecifier) -> Result<PluginModule, ImportError> {
        let module = specifier.to_string();
        let path = specifier
            .to_file_path()
            .ok_or_else(|| ImportError::Unsupported(module.clone()))?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ImportError::NotFound(module));
            },
            Err(source) => return Err(ImportError::Read { path, source }),
        };

        let wasm_err = |message: String| ImportError::Wasm {
            module: module.clone(),
            message,
        };

        let manifest = Manifest::new([Wasm::data(bytes)])
            .with_timeout(self.config.timeout)
            .with_memory_max(self.config.max_pages());
        let plugin = PluginBuilder::new(manifest)
            .with_wasi(true)
            .build()
            .map_err(|e| wasm_err(format!("failed to build Extism plugin: {e}")))?;

        let guest = WasmGuest {
            module: Arc::from(module.as_str()),
            plugin: Arc::new(Mutex::new(plugin)),
        };
        let described = guest
            .call("describe", "")
            .map_err(|e| wasm_err(format!("{e:#}")))?;
        let value: Value = serde_json::from_str(&described)
            .map_err(|e| wasm_err(format!("failed to parse describe output: {e}")))?;

        debug!(module = %module, "described wasm plugin");
        Ok(PluginModule {
            specifier: specifier.clone(),
            default: Some(bind_guest(value, &guest)),
        })
    }
}

#[derive(Clone)]
struct WasmGuest {
    module: Arc<str>,
    plugin: Arc<Mutex<extism::Plugin>>,
}

impl WasmGuest {
    fn has(&self, function: &str) -> bool {
        self.plugin
            .lock()
            .is_ok_and(|p| p.function_exists(function))
    }

    fn call(&self, function: &str, input: &str) -> anyhow::Result<String> {
        let mut plugin = self
            .plugin
            .lock()
            .map_err(|e| anyhow!("plugin lock poisoned: {e}"))?;
        plugin
            .call::<&str, String>(function, input)
            .map_err(|e| anyhow!("{}: {function} call failed: {e}", self.module))
    }
}

/// Turn the `describe` JSON into an export, binding guest function names.
/// Names the guest does not export stay strings for the validator to flag.
fn bind_guest(value: Value, guest: &WasmGuest) -> Export {
    let Value::Object(mut map) = value else {
        return Export::from(value);
    };

    let hooks = map.remove("hooks");
    let commands = map.remove("commands");
    let mut export = Export::from(Value::Object(map));

    if let Some(hooks) = hooks {
        let bound = match hooks {
            Value::Object(hooks) => Export::Object(
                hooks
                    .into_iter()
                    .map(|(key, v)| {
                        let hook = match guest_fn(&v, guest) {
                            Some(function) => Export::Hook(Arc::new(WasmHook {
                                guest: guest.clone(),
                                function,
                            })),
                            None => Export::from(v),
                        };
                        (key, hook)
                    })
                    .collect(),
            ),
            other => Export::from(other),
        };
        export = export.with("hooks", bound);
    }

    if let Some(commands) = commands {
        export = export.with("commands", bind_list(commands, "action", guest));
    }

    for field in ["tools", "apps", "templates", "engines", "agents", "sdks"] {
        let rebound = match &export {
            Export::Object(members) => members.get(field).map(|e| e.to_json()),
            _ => None,
        };
        if let Some(list) = rebound {
            export = export.with(field, bind_list(list, "callable", guest));
        }
    }

    let install = WasmInstall {
        guest: guest.clone(),
        exported: guest.has("install"),
    };
    export.with("install", Export::Install(Arc::new(install)))
}

fn bind_list(list: Value, key: &str, guest: &WasmGuest) -> Export {
    let Value::Array(items) = list else {
        return Export::from(list);
    };
    Export::List(
        items
            .into_iter()
            .map(|item| {
                let Value::Object(mut obj) = item else {
                    return Export::from(item);
                };
                let callable = obj.remove(key);
                let mut bound = Export::from(Value::Object(obj));
                if let Some(v) = callable {
                    let member = match guest_fn(&v, guest) {
                        Some(function) => Export::Action(Arc::new(WasmAction {
                            guest: guest.clone(),
                            function,
                        })),
                        None => Export::from(v),
                    };
                    bound = bound.with(key, member);
                }
                bound
            })
            .collect(),
    )
}

fn guest_fn(value: &Value, guest: &WasmGuest) -> Option<String> {
    value
        .as_str()
        .filter(|name| guest.has(name))
        .map(str::to_owned)
}

struct WasmHook {
    guest: WasmGuest,
    function: String,
}

#[async_trait]
impl HookFn for WasmHook {
    async fn call(&self, ctx: &PluginRuntimeContext) -> anyhow::Result<()> {
        self.guest
            .call(&self.function, &ctx.to_json().to_string())
            .map(drop)
    }
}

struct WasmAction {
    guest: WasmGuest,
    function: String,
}

#[async_trait]
impl ActionFn for WasmAction {
    async fn call(&self, input: &ActionInput, ctx: &PluginRuntimeContext) -> anyhow::Result<()> {
        let payload = json!({ "input": input, "context": ctx.to_json() });
        self.guest
            .call(&self.function, &payload.to_string())
            .map(drop)
    }
}

struct WasmCommand {
    guest: WasmGuest,
    function: String,
}

#[async_trait]
impl CommandAction for WasmCommand {
    async fn run(&self, input: ActionInput) -> anyhow::Result<()> {
        let payload = json!({ "input": input });
        self.guest
            .call(&self.function, &payload.to_string())
            .map(drop)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InstallPlan {
    commands: Vec<PlannedCommand>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PlannedCommand {
    command: String,
    description: Option<String>,
    alias: Option<String>,
    options: Vec<PlannedOption>,
    action: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PlannedOption {
    flags: String,
    description: Option<String>,
    default_value: Option<String>,
}

struct WasmInstall {
    guest: WasmGuest,
    exported: bool,
}

#[async_trait]
impl InstallFn for WasmInstall {
    async fn install(&self, cli: &mut PluginCli<'_>, ctx: &PluginContext) -> anyhow::Result<()> {
        if !self.exported {
            return Ok(());
        }
        let output = self.guest.call("install", &ctx.to_json().to_string())?;
        let plan: InstallPlan = if output.trim().is_empty() {
            InstallPlan::default()
        } else {
            serde_json::from_str(&output).context("failed to parse install plan")?
        };

        for planned in plan.commands {
            let mut cmd = cli.command(&planned.command)?;
            if let Some(description) = &planned.description {
                cmd.description(description);
            }
            if let Some(alias) = &planned.alias {
                cmd.alias(alias)?;
            }
            for opt in &planned.options {
                cmd.option(
                    &opt.flags,
                    opt.description.as_deref(),
                    opt.default_value.as_deref(),
                )?;
            }
            if let Some(function) = planned.action {
                if !self.guest.has(&function) {
                    anyhow::bail!("install plan names missing export '{function}'");
                }
                cmd.action(Arc::new(WasmCommand {
                    guest: self.guest.clone(),
                    function,
                }));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    #[test]
    fn page_math() {
        assert_eq!(WasmConfig::default().max_pages(), 1024);
        assert_eq!(WasmConfig::default().with_memory_limit(u64::MAX).max_pages(), u32::MAX);
    }

    #[test]
    fn supports_only_wasm_files() {
        let importer = WasmImporter::default();
        let cwd = Path::new("/");
        assert!(importer.supports(&ModuleSpecifier::parse("/p/index.WASM", cwd).unwrap()));
        assert!(!importer.supports(&ModuleSpecifier::parse("/p/index.js", cwd).unwrap()));
        assert!(!importer.supports(&ModuleSpecifier::Bare("x.wasm".into())));
    }

    #[tokio::test]
    async fn missing_and_garbage_modules_fail() {
        let dir = TempDir::new().unwrap();
        let importer = WasmImporter::default();

        let missing = ModuleSpecifier::from_path(&dir.path().join("gone.wasm"), dir.path()).unwrap();
        assert!(matches!(
            importer.import(&missing).await,
            Err(ImportError::NotFound(_))
        ));

        let junk = dir.path().join("junk.wasm");
        std::fs::write(&junk, b"definitely not wasm").unwrap();
        let spec = ModuleSpecifier::from_path(&junk, dir.path()).unwrap();
        assert!(matches!(
            importer.import(&spec).await,
            Err(ImportError::Wasm { .. })
        ));
    }
}
