//! Mounting of manifest-declared commands.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::command::{
    ActionInput, CommandAction, CommandBuilder, CommandTreeError, PluginCli, split_declaration,
};
use crate::context::PluginRuntimeContext;
use crate::export::ActionFn;
use crate::hooks::execute_hook;
use crate::manifest::{HookName, PluginManifest};
use crate::sandbox::PluginSandbox;

/// Mount every entry of `manifest.commands` through `cli`.
///
/// Each command gets an action that builds a fresh runtime context carrying
/// `meta.commandName`, then runs `onRun`, `onCommandRun` and the declared
/// handler in that order. Returns the number of commands mounted.
///
/// # Errors
///
/// Stops at the first declaration the tree rejects.
pub fn auto_register_commands(
    cli: &mut PluginCli<'_>,
    manifest: &Arc<PluginManifest>,
    ctx: &PluginRuntimeContext,
    sandbox: Option<Arc<PluginSandbox>>,
) -> Result<usize, CommandTreeError> {
    for spec in &manifest.commands {
        let mut cmd = cli.command(&spec.name)?;
        if let Some(description) = &spec.description {
            cmd.description(description);
        }
        if let Some(alias) = &spec.alias {
            cmd.alias(alias)?;
        }
        for opt in &spec.options {
            let default = opt.default_value.as_ref().map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            });
            cmd.option(&opt.flags, opt.description.as_deref(), default.as_deref())?;
        }

        let (path, _) = split_declaration(&spec.name);
        cmd.action(Arc::new(RoutedCommand {
            command_name: path.join(" "),
            base: ctx.clone(),
            handler: spec.action.clone(),
            sandbox: sandbox.clone(),
        }));
    }
    Ok(manifest.commands.len())
}

struct RoutedCommand {
    command_name: String,
    base: PluginRuntimeContext,
    handler: Option<Arc<dyn ActionFn>>,
    sandbox: Option<Arc<PluginSandbox>>,
}

#[async_trait]
impl CommandAction for RoutedCommand {
    async fn run(&self, input: ActionInput) -> anyhow::Result<()> {
        let ctx = self
            .base
            .clone()
            .with_meta("commandName", self.command_name.clone());
        let hooks = &ctx.manifest.hooks;
        let sandbox = self.sandbox.as_deref();

        execute_hook(hooks, HookName::OnRun, &ctx, sandbox).await?;
        execute_hook(hooks, HookName::OnCommandRun, &ctx, sandbox).await?;

        let Some(handler) = &self.handler else {
            warn!(
                "Command \"{}\" from {} has no handler.",
                self.command_name,
                ctx.plugin_name()
            );
            return Ok(());
        };
        match sandbox {
            Some(sandbox) => {
                sandbox
                    .run(&ctx, |isolated| async move { handler.call(&input, &isolated).await })
                    .await
            },
            None => handler.call(&input, &ctx).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandTree, MountTable};
    use crate::export::{Export, action_fn, hook_fn};
    use crate::manifest::validate_manifest;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn recording_hook(log: &Log, label: &'static str) -> Export {
        let log = Arc::clone(log);
        Export::Hook(hook_fn(move |ctx| {
            let log = Arc::clone(&log);
            async move {
                let name = ctx.meta.get("commandName").cloned().unwrap_or_default();
                log.lock().unwrap().push(format!("{label}:{}", name.as_str().unwrap_or("")));
                Ok(())
            }
        }))
    }

    fn manifest(log: &Log) -> Arc<PluginManifest> {
        let action_log = Arc::clone(log);
        let action = action_fn(move |input, _ctx| {
            let log = Arc::clone(&action_log);
            async move {
                log.lock().unwrap().push(format!("action:{}", input.args.join(",")));
                Ok(())
            }
        });
        let export = Export::object()
            .with("name", "demo")
            .with("version", "1.0.0")
            .with(
                "hooks",
                Export::object()
                    .with("onRun", recording_hook(log, "onRun"))
                    .with("onCommandRun", recording_hook(log, "onCommandRun")),
            )
            .with(
                "commands",
                Export::List(vec![
                    Export::object()
                        .with("name", "greet <who>")
                        .with("alias", "hi")
                        .with(
                            "options",
                            Export::from(serde_json::json!([
                                {"flags": "-n, --times <n>", "defaultValue": 2}
                            ])),
                        )
                        .with("action", action),
                    Export::object().with("name", "idle"),
                ]),
            );
        Arc::new(validate_manifest(&export, "demo").unwrap())
    }

    #[tokio::test]
    async fn hooks_run_before_handler() {
        let log: Log = Arc::default();
        let manifest = manifest(&log);
        let ctx = PluginRuntimeContext::new("/w", Arc::clone(&manifest));

        let mut tree = CommandTree::new("strand");
        let mut mounts = MountTable::new();
        let root = tree.root();
        let mut cli = PluginCli::new(&mut tree, &mut mounts, "demo", root);
        assert_eq!(auto_register_commands(&mut cli, &manifest, &ctx, None).unwrap(), 2);

        let greet = tree.resolve(&["hi"]).unwrap();
        let node = tree.get(greet).unwrap();
        assert_eq!(node.name, "greet");
        assert_eq!(node.options[0].default.as_deref(), Some("2"));
        assert_eq!(mounts.owned("demo").len(), 2);

        let action = node.action.clone().unwrap();
        action
            .run(ActionInput {
                command: vec!["greet".into()],
                args: vec!["bob".into()],
                ..ActionInput::default()
            })
            .await
            .unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["onRun:greet", "onCommandRun:greet", "action:bob"]
        );
    }

    #[tokio::test]
    async fn command_without_handler_still_fires_hooks() {
        let log: Log = Arc::default();
        let manifest = manifest(&log);
        let ctx = PluginRuntimeContext::new("/w", Arc::clone(&manifest));
        let sandbox = Arc::new(PluginSandbox::new(Arc::clone(&manifest), "/w", false));

        let mut tree = CommandTree::new("strand");
        let mut mounts = MountTable::new();
        let root = tree.root();
        let mut cli = PluginCli::new(&mut tree, &mut mounts, "demo", root);
        auto_register_commands(&mut cli, &manifest, &ctx, Some(sandbox)).unwrap();

        let idle = tree.resolve(&["idle"]).unwrap();
        let action = tree.get(idle).unwrap().action.clone().unwrap();
        action.run(ActionInput::default()).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["onRun:idle", "onCommandRun:idle"]);
    }
}
