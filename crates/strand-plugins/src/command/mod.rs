//! The dynamic command tree and the builders plugins mount commands with.
//!
//! Plugins never touch [`CommandTree`] directly. They receive a
//! [`PluginCli`], a decorator over the raw [`CommandCursor`] that forwards
//! every call except child creation, which it routes through
//! [`register_plugin_command`] so the [`MountTable`] learns which nodes the
//! plugin owns.

mod mount;
mod syntax;
mod tree;

pub use mount::{MountTable, register_plugin_command};
pub use syntax::{Fragment, check_args, parse_fragment, parse_option_flags, split_declaration};
pub use tree::{ArgSpec, CommandNode, CommandTree, NodeId, NodeOrigin, OptionSpec, OptionValue};

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

/// Command-tree errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandTreeError {
    /// A sibling already answers to the name.
    #[error("command '{name}' already exists under '{parent}'")]
    Duplicate {
        /// Path of the parent command.
        parent: String,
        /// Conflicting name or alias.
        name: String,
    },
    /// The handle refers to a detached node.
    #[error("command node {0} is no longer attached")]
    Stale(NodeId),
    /// A declaration or flag string could not be parsed.
    #[error("invalid command syntax '{input}': {message}")]
    Syntax {
        /// Offending text.
        input: String,
        /// What is wrong with it.
        message: String,
    },
}

/// Parsed invocation handed to a command action.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActionInput {
    /// Command path from the root, e.g. `["alpha", "beta"]`.
    pub command: Vec<String>,
    /// Positional values in order.
    pub args: Vec<String>,
    /// Option values keyed by long name (or short flag).
    pub options: Map<String, Value>,
}

/// Handler attached to a command node.
#[async_trait]
pub trait CommandAction: Send + Sync {
    /// Run the command.
    async fn run(&self, input: ActionInput) -> anyhow::Result<()>;
}

struct FnCommand<F>(F);

#[async_trait]
impl<F, Fut> CommandAction for FnCommand<F>
where
    F: Fn(ActionInput) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn run(&self, input: ActionInput) -> anyhow::Result<()> {
        (self.0)(input).await
    }
}

/// Wrap an async closure as a [`CommandAction`].
pub fn command_action<F, Fut>(f: F) -> Arc<dyn CommandAction>
where
    F: Fn(ActionInput) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnCommand(f))
}

/// Builder interface over a node of the command tree.
pub trait CommandBuilder {
    /// Builder returned for a newly declared child.
    type Sub<'s>: CommandBuilder
    where
        Self: 's;

    /// Node this builder edits.
    fn id(&self) -> NodeId;

    /// Declare a child command, e.g. `deploy <env> [region]`.
    ///
    /// # Errors
    ///
    /// Fails on malformed syntax or a name clash the builder cannot resolve.
    fn command(&mut self, decl: &str) -> Result<Self::Sub<'_>, CommandTreeError>;

    /// Add an alias.
    ///
    /// # Errors
    ///
    /// Fails when a sibling already answers to `alias`.
    fn alias(&mut self, alias: &str) -> Result<&mut Self, CommandTreeError>;

    /// Set the help text.
    fn description(&mut self, text: &str) -> &mut Self;

    /// Add an option from a flag string such as `-o, --out <dir>`.
    ///
    /// # Errors
    ///
    /// Fails on malformed flags.
    fn option(
        &mut self,
        flags: &str,
        description: Option<&str>,
        default: Option<&str>,
    ) -> Result<&mut Self, CommandTreeError>;

    /// Add a positional argument from `<name>`, `[name]` or `<name...>`.
    ///
    /// # Errors
    ///
    /// Fails on malformed syntax.
    fn argument(&mut self, spec: &str) -> Result<&mut Self, CommandTreeError>;

    /// Set the handler.
    fn action(&mut self, action: Arc<dyn CommandAction>) -> &mut Self;
}

fn apply_fragment(tree: &mut CommandTree, id: NodeId, fragment: Fragment) {
    let Some(node) = tree.get_mut(id) else {
        return;
    };
    for arg in fragment.args {
        if node.args.iter().any(|a| a.name == arg.name) {
            debug!(command = %node.name, arg = %arg.name, "argument already declared");
            continue;
        }
        node.args.push(arg);
    }
    for option in fragment.options {
        push_option(node, option);
    }
}

/// Add `option` unless the node already has one under the same key or flag.
/// The first declaration wins.
fn push_option(node: &mut CommandNode, option: OptionSpec) {
    if node.options.iter().any(|o| o.shares_flag(&option)) {
        debug!(command = %node.name, option = %option.key(), "option already declared");
        return;
    }
    node.options.push(option);
}

/// Raw builder positioned at one node.
///
/// `command` creates exactly one child and fails if a sibling already has
/// that name. Nothing it creates is tracked.
#[derive(Debug)]
pub struct CommandCursor<'t> {
    tree: &'t mut CommandTree,
    id: NodeId,
    origin: NodeOrigin,
}

impl<'t> CommandCursor<'t> {
    /// Cursor at `id`; children it creates carry `origin`.
    pub fn new(tree: &'t mut CommandTree, id: NodeId, origin: NodeOrigin) -> Self {
        Self { tree, id, origin }
    }

    /// The underlying tree.
    #[must_use]
    pub fn tree(&self) -> &CommandTree {
        self.tree
    }

    fn node_mut(&mut self) -> Result<&mut CommandNode, CommandTreeError> {
        let id = self.id;
        self.tree.get_mut(id).ok_or(CommandTreeError::Stale(id))
    }
}

impl CommandBuilder for CommandCursor<'_> {
    type Sub<'s>
        = CommandCursor<'s>
    where
        Self: 's;

    fn id(&self) -> NodeId {
        self.id
    }

    fn command(&mut self, decl: &str) -> Result<CommandCursor<'_>, CommandTreeError> {
        let (path, fragment) = split_declaration(decl);
        let [name] = path.as_slice() else {
            return Err(CommandTreeError::Syntax {
                input: decl.to_owned(),
                message: "expected exactly one command name".to_owned(),
            });
        };
        let fragment = fragment.as_deref().map(parse_fragment).transpose()?;
        let child = self.tree.add_child(self.id, *name, self.origin.clone())?;
        if let Some(fragment) = fragment {
            apply_fragment(self.tree, child, fragment);
        }
        Ok(CommandCursor::new(self.tree, child, self.origin.clone()))
    }

    fn alias(&mut self, alias: &str) -> Result<&mut Self, CommandTreeError> {
        self.tree.add_alias(self.id, alias)?;
        Ok(self)
    }

    fn description(&mut self, text: &str) -> &mut Self {
        if let Ok(node) = self.node_mut() {
            node.description = Some(text.to_owned());
        }
        self
    }

    fn option(
        &mut self,
        flags: &str,
        description: Option<&str>,
        default: Option<&str>,
    ) -> Result<&mut Self, CommandTreeError> {
        let mut spec = parse_option_flags(flags)?;
        spec.description = description.map(str::to_owned);
        spec.default = default.map(str::to_owned);
        push_option(self.node_mut()?, spec);
        Ok(self)
    }

    fn argument(&mut self, spec: &str) -> Result<&mut Self, CommandTreeError> {
        let fragment = parse_fragment(spec)?;
        let syntax_error = |message: &str| CommandTreeError::Syntax {
            input: spec.to_owned(),
            message: message.to_owned(),
        };
        let ([arg], true) = (fragment.args.as_slice(), fragment.options.is_empty()) else {
            return Err(syntax_error("expected a single argument"));
        };
        let node = self.node_mut()?;
        let mut args = node.args.clone();
        args.push(arg.clone());
        check_args(&args).map_err(syntax_error)?;
        node.args = args;
        Ok(self)
    }

    fn action(&mut self, action: Arc<dyn CommandAction>) -> &mut Self {
        if let Ok(node) = self.node_mut() {
            node.action = Some(action);
        }
        self
    }
}

/// Decorator over [`CommandCursor`] bound to one plugin.
///
/// Child creation goes through [`register_plugin_command`]; every other call
/// is forwarded unchanged.
#[derive(Debug)]
pub struct PluginCommand<'t> {
    inner: CommandCursor<'t>,
    mounts: &'t mut MountTable,
    plugin: &'t str,
}

/// The handle a plugin's `install` receives: a [`PluginCommand`] at the root.
pub type PluginCli<'t> = PluginCommand<'t>;

impl<'t> PluginCommand<'t> {
    /// Decorator at `at`, recording ownership for `plugin`.
    pub fn new(
        tree: &'t mut CommandTree,
        mounts: &'t mut MountTable,
        plugin: &'t str,
        at: NodeId,
    ) -> Self {
        let origin = NodeOrigin::Plugin(plugin.to_owned());
        Self {
            inner: CommandCursor::new(tree, at, origin),
            mounts,
            plugin,
        }
    }

    /// Plugin this handle mounts for.
    #[must_use]
    pub fn plugin(&self) -> &str {
        self.plugin
    }

    /// The underlying tree.
    #[must_use]
    pub fn tree(&self) -> &CommandTree {
        self.inner.tree()
    }
}

impl CommandBuilder for PluginCommand<'_> {
    type Sub<'s>
        = PluginCommand<'s>
    where
        Self: 's;

    fn id(&self) -> NodeId {
        self.inner.id
    }

    fn command(&mut self, decl: &str) -> Result<PluginCommand<'_>, CommandTreeError> {
        let id = register_plugin_command(
            self.inner.tree,
            self.mounts,
            self.plugin,
            self.inner.id,
            decl,
        )?;
        Ok(PluginCommand::new(
            self.inner.tree,
            self.mounts,
            self.plugin,
            id,
        ))
    }

    fn alias(&mut self, alias: &str) -> Result<&mut Self, CommandTreeError> {
        self.inner.alias(alias)?;
        Ok(self)
    }

    fn description(&mut self, text: &str) -> &mut Self {
        self.inner.description(text);
        self
    }

    fn option(
        &mut self,
        flags: &str,
        description: Option<&str>,
        default: Option<&str>,
    ) -> Result<&mut Self, CommandTreeError> {
        self.inner.option(flags, description, default)?;
        Ok(self)
    }

    fn argument(&mut self, spec: &str) -> Result<&mut Self, CommandTreeError> {
        self.inner.argument(spec)?;
        Ok(self)
    }

    fn action(&mut self, action: Arc<dyn CommandAction>) -> &mut Self {
        self.inner.action(action);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn raw_cursor_is_strict() {
        let mut tree = CommandTree::new("strand");
        let root = tree.root();
        let mut cursor = CommandCursor::new(&mut tree, root, NodeOrigin::Host);
        let id = {
            let mut child = cursor.command("status [name]").unwrap();
            child
                .description("show status")
                .option("-v, --verbose", Some("more output"), None)
                .unwrap();
            child.id()
        };
        assert!(matches!(
            cursor.command("status"),
            Err(CommandTreeError::Duplicate { .. })
        ));
        assert!(cursor.command("a b").is_err());

        let node = tree.get(id).unwrap();
        assert_eq!(node.description.as_deref(), Some("show status"));
        assert_eq!(node.args[0].name, "name");
        assert_eq!(node.options[0].key(), "verbose");
        assert_eq!(node.origin, NodeOrigin::Host);
    }

    #[test]
    fn repeated_options_keep_the_first_declaration() {
        let mut tree = CommandTree::new("strand");
        let root = tree.root();
        let mut cursor = CommandCursor::new(&mut tree, root, NodeOrigin::Host);
        let id = {
            let mut child = cursor.command("shared --loud").unwrap();
            child
                .option("--loud", Some("again"), None)
                .unwrap()
                .option("-l, --louder", None, None)
                .unwrap()
                .option("-l", None, None)
                .unwrap();
            child.id()
        };
        let keys: Vec<_> = tree.get(id).unwrap().options.iter().map(OptionSpec::key).collect();
        assert_eq!(keys, vec!["loud", "louder"]);
        assert!(tree.get(id).unwrap().options[0].description.is_none());
    }

    #[test]
    fn arguments_are_checked_against_the_node() {
        let mut tree = CommandTree::new("strand");
        let root = tree.root();
        let mut cursor = CommandCursor::new(&mut tree, root, NodeOrigin::Host);
        let mut child = cursor.command("copy <src>").unwrap();
        assert!(child.argument("<src>").is_err());
        child.argument("[dst]").unwrap();
        assert!(child.argument("<force>").is_err());
        child.argument("[rest...]").unwrap();
        assert!(child.argument("[more]").is_err());
        let id = child.id();
        let names: Vec<_> = tree.get(id).unwrap().args.iter().map(|a| a.name.clone()).collect();
        assert_eq!(names, vec!["src", "dst", "rest"]);
    }

    #[test]
    fn plugin_cli_tracks_created_nodes_only() {
        let mut tree = CommandTree::new("strand");
        let mut mounts = MountTable::new();
        let root = tree.root();
        let host = tree.add_child(root, "tools", NodeOrigin::Host).unwrap();

        let mut cli = PluginCli::new(&mut tree, &mut mounts, "demo", root);
        let leaf = {
            let mut tools = cli.command("tools").unwrap();
            let mut fmt = tools.command("fmt <file>").unwrap();
            fmt.alias("f").unwrap().description("format");
            fmt.id()
        };
        assert_eq!(cli.plugin(), "demo");

        assert_eq!(mounts.owned("demo"), &[leaf]);
        let node = tree.get(leaf).unwrap();
        assert_eq!(node.origin, NodeOrigin::Plugin("demo".into()));
        assert_eq!(node.aliases, vec!["f"]);
        assert_eq!(tree.get(leaf).unwrap().parent(), Some(host));
    }

    #[tokio::test]
    async fn command_action_runs_closure() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let action = command_action(move |input: ActionInput| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().unwrap().extend(input.args);
                Ok(())
            }
        });
        action
            .run(ActionInput {
                args: vec!["x".into()],
                ..ActionInput::default()
            })
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["x".to_owned()]);
    }
}
