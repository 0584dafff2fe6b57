//! Lifecycle hook execution.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::context::PluginRuntimeContext;
use crate::error::{PluginError, PluginResult};
use crate::export::HookFn;
use crate::manifest::{HookName, Hooks};
use crate::sandbox::PluginSandbox;

/// Run hook `name` if the plugin registered it.
///
/// With a sandbox the hook receives the sandbox's isolated copy of `ctx`.
///
/// # Errors
///
/// [`PluginError::HookFailed`] when the hook returns an error. The failure
/// is logged before it is returned.
pub async fn execute_hook(
    hooks: &Hooks,
    name: HookName,
    ctx: &PluginRuntimeContext,
    sandbox: Option<&PluginSandbox>,
) -> PluginResult<()> {
    let Some(hook) = hooks.get(name) else {
        return Ok(());
    };
    debug!(plugin = %ctx.plugin_name(), hook = %name, "running hook");

    let result = match sandbox {
        Some(sandbox) => {
            let hook: Arc<dyn HookFn> = Arc::clone(hook);
            sandbox
                .run(ctx, |isolated| async move { hook.call(&isolated).await })
                .await
        },
        None => hook.call(ctx).await,
    };

    result.map_err(|e| {
        warn!(plugin = %ctx.plugin_name(), error = %format!("{e:#}"), "Hook {name} failed");
        PluginError::HookFailed {
            plugin: ctx.plugin_name().to_owned(),
            hook: name.to_string(),
            message: format!("{e:#}"),
        }
    })
}
