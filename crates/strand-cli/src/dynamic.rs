//! Plugin commands on top of the clap parser.
//!
//! After the loader has mounted plugins, every plugin-created node is
//! turned into a `clap::Command` and attached under its parent. Matches
//! that land on a plugin node are converted back into an [`ActionInput`]
//! and handed to the node's action.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use serde_json::{Map, Value};
use strand_plugins::{
    ActionInput, ArgSpec, CommandAction, CommandNode, CommandTree, NodeId, NodeOrigin, OptionSpec,
};

const RESERVED_LONG: [&str; 3] = ["help", "version", "verbose"];
const RESERVED_SHORT: [char; 3] = ['h', 'V', 'v'];

/// A parsed invocation of a plugin command.
pub(crate) struct Invocation {
    /// The node that was matched.
    pub(crate) node: NodeId,
    /// Input for its action.
    pub(crate) input: ActionInput,
    /// Its action, if it has one.
    pub(crate) action: Option<Arc<dyn CommandAction>>,
}

/// Attach every plugin node in `tree` to `cli`.
pub(crate) fn graft(cli: Command, tree: &CommandTree) -> Command {
    graft_children(cli, tree, tree.root())
}

fn graft_children(mut cmd: Command, tree: &CommandTree, parent: NodeId) -> Command {
    for &child in tree.children(parent) {
        let Some(node) = tree.get(child) else {
            continue;
        };
        match &node.origin {
            NodeOrigin::Host => {
                if has_plugin_descendant(tree, child) {
                    cmd = cmd.mut_subcommand(node.name.clone(), |sub| {
                        graft_children(sub, tree, child)
                    });
                }
            },
            NodeOrigin::Plugin(plugin) => {
                if node.name == "help" {
                    tracing::warn!(plugin = %plugin, "ignoring plugin command named help");
                    continue;
                }
                if let Err(reason) = check_node(node) {
                    tracing::warn!(
                        plugin = %plugin,
                        command = %node.name,
                        %reason,
                        "dropping plugin command and its subcommands"
                    );
                    continue;
                }
                cmd = cmd.subcommand(to_clap(tree, child, node));
            },
        }
    }
    cmd
}

fn has_plugin_descendant(tree: &CommandTree, id: NodeId) -> bool {
    tree.descendants(id)
        .into_iter()
        .any(|d| tree.get(d).is_some_and(|n| matches!(n.origin, NodeOrigin::Plugin(_))))
}

fn to_clap(tree: &CommandTree, id: NodeId, node: &CommandNode) -> Command {
    let mut cmd = Command::new(node.name.clone());
    if let Some(about) = &node.description {
        cmd = cmd.about(about.clone());
    }
    for alias in &node.aliases {
        cmd = cmd.visible_alias(alias.clone());
    }
    for arg in &node.args {
        cmd = cmd.arg(positional(arg));
    }
    for option in &node.options {
        if let Some(arg) = flag(option) {
            cmd = cmd.arg(arg);
        }
    }
    graft_children(cmd, tree, id)
}

/// Reject definitions clap would refuse to build: clashing positionals,
/// two options under one id, or a flag used twice.
fn check_node(node: &CommandNode) -> Result<(), String> {
    strand_plugins::check_args(&node.args).map_err(str::to_owned)?;

    let mut ids = HashSet::new();
    let mut longs = HashSet::new();
    let mut shorts = HashSet::new();
    for option in &node.options {
        let Some((long, short)) = usable_flags(option) else {
            continue;
        };
        if !ids.insert(option_id(option)) {
            return Err(format!("option {} declared twice", option.key()));
        }
        if let Some(long) = long
            && (long.starts_with('-') || !longs.insert(long))
        {
            return Err(format!("flag --{long} is invalid or used twice"));
        }
        if let Some(short) = short
            && (short == '-' || !shorts.insert(short))
        {
            return Err(format!("flag -{short} is invalid or used twice"));
        }
    }
    Ok(())
}

/// The flags of `spec` the host does not reserve, or `None` when nothing is
/// left.
fn usable_flags(spec: &OptionSpec) -> Option<(Option<&str>, Option<char>)> {
    let long = spec
        .long
        .as_deref()
        .filter(|l| !RESERVED_LONG.contains(l));
    let short = spec.short.filter(|s| !RESERVED_SHORT.contains(s));
    (long.is_some() || short.is_some()).then_some((long, short))
}

fn positional(spec: &ArgSpec) -> Arg {
    let arg = Arg::new(spec.name.clone())
        .value_name(spec.name.clone())
        .required(spec.required);
    if spec.variadic {
        arg.num_args(if spec.required { 1.. } else { 0.. })
            .action(ArgAction::Append)
    } else {
        arg
    }
}

fn option_id(spec: &OptionSpec) -> String {
    format!("--{}", spec.key())
}

/// A clap argument for `spec`, or `None` when every flag it declares is
/// reserved by the host.
fn flag(spec: &OptionSpec) -> Option<Arg> {
    let Some((long, short)) = usable_flags(spec) else {
        tracing::debug!(option = %spec.key(), "option uses reserved flags only");
        return None;
    };

    let mut arg = Arg::new(option_id(spec));
    if let Some(long) = long {
        arg = arg.long(long.to_owned());
    }
    if let Some(short) = short {
        arg = arg.short(short);
    }
    if let Some(help) = &spec.description {
        arg = arg.help(help.clone());
    }
    arg = match &spec.value {
        Some(value) if value.required => arg
            .num_args(1)
            .value_name(value.name.clone())
            .action(ArgAction::Set),
        Some(value) => arg
            .num_args(0..=1)
            .value_name(value.name.clone())
            .default_missing_value("true")
            .action(ArgAction::Set),
        None => arg.action(ArgAction::SetTrue),
    };
    if spec.value.is_some()
        && let Some(default) = &spec.default
    {
        arg = arg.default_value(default.clone());
    }
    Some(arg)
}

/// Follow the matched subcommand chain through `tree`. Returns `None` when
/// it ends on a built-in command.
pub(crate) fn plugin_invocation(tree: &CommandTree, matches: &ArgMatches) -> Option<Invocation> {
    let mut at = tree.root();
    let mut current = matches;
    let mut path = Vec::new();
    while let Some((name, sub)) = current.subcommand() {
        at = tree.find_child(at, name)?;
        path.push(name.to_owned());
        current = sub;
    }

    let node = tree.get(at)?;
    if !matches!(node.origin, NodeOrigin::Plugin(_)) {
        return None;
    }

    let mut args = Vec::new();
    for spec in &node.args {
        if spec.variadic {
            if let Some(values) = current.get_many::<String>(&spec.name) {
                args.extend(values.cloned());
            }
        } else if let Some(value) = current.get_one::<String>(&spec.name) {
            args.push(value.clone());
        }
    }

    let mut options = Map::new();
    for spec in &node.options {
        let id = option_id(spec);
        if current.try_contains_id(&id).is_err() {
            continue;
        }
        match &spec.value {
            None => {
                if current.get_flag(&id) {
                    options.insert(spec.key(), Value::Bool(true));
                }
            },
            Some(value) => {
                if let Some(raw) = current.get_one::<String>(&id) {
                    let v = if !value.required && raw == "true" {
                        Value::Bool(true)
                    } else {
                        Value::String(raw.clone())
                    };
                    options.insert(spec.key(), v);
                }
            },
        }
    }

    Some(Invocation {
        node: at,
        input: ActionInput {
            command: path,
            args,
            options,
        },
        action: node.action.clone(),
    })
}

/// Run a matched plugin command. A node without an action prints its help.
pub(crate) async fn dispatch(invocation: Invocation, app: &mut Command) -> Result<()> {
    let Some(action) = invocation.action else {
        let mut cmd = app;
        for name in &invocation.input.command {
            cmd = cmd
                .find_subcommand_mut(name)
                .with_context(|| format!("unknown command {name}"))?;
        }
        cmd.print_help()?;
        return Ok(());
    };

    let label = invocation.input.command.join(" ");
    tracing::debug!(command = %label, node = %invocation.node, "dispatching plugin command");
    action
        .run(invocation.input)
        .await
        .with_context(|| format!("command \"{label}\" failed"))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use strand_plugins::{OptionValue, command_action};

    fn plugin(name: &str) -> NodeOrigin {
        NodeOrigin::Plugin(name.to_owned())
    }

    fn sample_tree(seen: Arc<Mutex<Vec<ActionInput>>>) -> CommandTree {
        let cli = Command::new("strand").subcommand(Command::new("list"));
        let mut tree = crate::host::host_tree(&cli);
        let root = tree.root();

        let deploy = tree.add_child(root, "deploy", plugin("deploy")).unwrap();
        let node = tree.get_mut(deploy).unwrap();
        node.description = Some("Deploy a site".into());
        node.args = vec![
            ArgSpec {
                name: "target".into(),
                required: true,
                variadic: false,
            },
            ArgSpec {
                name: "extra".into(),
                required: false,
                variadic: true,
            },
        ];
        node.options = vec![
            OptionSpec {
                short: Some('f'),
                long: Some("force".into()),
                ..OptionSpec::default()
            },
            OptionSpec {
                long: Some("region".into()),
                value: Some(OptionValue {
                    name: "region".into(),
                    required: true,
                }),
                default: Some("eu".into()),
                ..OptionSpec::default()
            },
            OptionSpec {
                short: Some('h'),
                long: Some("help".into()),
                ..OptionSpec::default()
            },
        ];
        node.action = Some(command_action(move |input| {
            let seen = seen.clone();
            async move {
                seen.lock().unwrap().push(input);
                Ok(())
            }
        }));

        let list = tree.resolve(&["list"]).unwrap();
        tree.add_child(list, "remote", plugin("remote")).unwrap();
        tree.add_child(root, "group", plugin("group")).unwrap();
        tree
    }

    #[test]
    fn plugin_nodes_are_grafted() {
        let tree = sample_tree(Arc::default());
        let app = graft(Command::new("strand").subcommand(Command::new("list")), &tree);
        let names: Vec<_> = app.get_subcommands().map(|c| c.get_name().to_owned()).collect();
        assert_eq!(names, vec!["list", "deploy", "group"]);
        let list = app.find_subcommand("list").unwrap();
        assert!(list.find_subcommand("remote").is_some());
        app.debug_assert();
    }

    #[test]
    fn matches_become_action_input() {
        let tree = sample_tree(Arc::default());
        let app = graft(Command::new("strand").subcommand(Command::new("list")), &tree);
        let matches = app
            .try_get_matches_from(["strand", "deploy", "prod", "a", "b", "-f"])
            .unwrap();
        let inv = plugin_invocation(&tree, &matches).unwrap();
        assert_eq!(inv.input.command, vec!["deploy"]);
        assert_eq!(inv.input.args, vec!["prod", "a", "b"]);
        assert_eq!(inv.input.options.get("force"), Some(&Value::Bool(true)));
        assert_eq!(inv.input.options.get("region"), Some(&Value::from("eu")));
        assert!(!inv.input.options.contains_key("help"));
        assert!(inv.action.is_some());
    }

    #[test]
    fn builtin_matches_are_not_plugin_invocations() {
        let tree = sample_tree(Arc::default());
        let app = graft(Command::new("strand").subcommand(Command::new("list")), &tree);
        let builtin = app.clone().try_get_matches_from(["strand", "list"]).unwrap();
        assert!(plugin_invocation(&tree, &builtin).is_none());

        let nested = app.try_get_matches_from(["strand", "list", "remote"]).unwrap();
        let inv = plugin_invocation(&tree, &nested).unwrap();
        assert_eq!(inv.input.command, vec!["list", "remote"]);
        assert!(inv.action.is_none());
    }

    #[test]
    fn conflicting_plugin_definitions_are_dropped() {
        let mut tree = crate::host::host_tree(&Command::new("strand"));
        let root = tree.root();
        let arg = |name: &str| ArgSpec {
            name: name.into(),
            required: true,
            variadic: false,
        };
        let loud = OptionSpec {
            long: Some("loud".into()),
            ..OptionSpec::default()
        };

        let dup = tree.add_child(root, "dup", plugin("a")).unwrap();
        tree.get_mut(dup).unwrap().args = vec![arg("x"), arg("x")];
        tree.add_child(dup, "inner", plugin("a")).unwrap();
        let shared = tree.add_child(root, "shared", plugin("b")).unwrap();
        tree.get_mut(shared).unwrap().options = vec![loud.clone(), loud];
        let order = tree.add_child(root, "order", plugin("c")).unwrap();
        tree.get_mut(order).unwrap().args = vec![
            ArgSpec {
                required: false,
                ..arg("maybe")
            },
            arg("must"),
        ];
        let fine = tree.add_child(root, "fine", plugin("d")).unwrap();
        tree.get_mut(fine).unwrap().args = vec![arg("x")];

        let app = graft(Command::new("strand"), &tree);
        let names: Vec<_> = app.get_subcommands().map(|c| c.get_name().to_owned()).collect();
        assert_eq!(names, vec!["fine"]);
        app.clone().debug_assert();

        assert!(app.clone().try_get_matches_from(["strand", "dup", "1", "2"]).is_err());
        assert!(app.clone().try_get_matches_from(["strand", "shared", "--loud"]).is_err());
        let matches = app.try_get_matches_from(["strand", "fine", "1"]).unwrap();
        let inv = plugin_invocation(&tree, &matches).unwrap();
        assert_eq!(inv.input.args, vec!["1"]);
    }

    #[test]
    fn reserved_flags_do_not_count_as_clashes() {
        let mut tree = crate::host::host_tree(&Command::new("strand"));
        let root = tree.root();
        let node = tree.add_child(root, "quiet", plugin("q")).unwrap();
        tree.get_mut(node).unwrap().options = vec![
            OptionSpec {
                short: Some('v'),
                long: Some("verbose".into()),
                ..OptionSpec::default()
            },
            OptionSpec {
                short: Some('v'),
                long: Some("version".into()),
                ..OptionSpec::default()
            },
        ];
        let app = graft(Command::new("strand"), &tree);
        assert!(app.find_subcommand("quiet").is_some());
        app.debug_assert();
    }

    #[tokio::test]
    async fn dispatch_runs_action() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let tree = sample_tree(seen.clone());
        let mut app = graft(Command::new("strand").subcommand(Command::new("list")), &tree);
        let matches = app
            .clone()
            .try_get_matches_from(["strand", "deploy", "staging", "--region", "us"])
            .unwrap();
        let inv = plugin_invocation(&tree, &matches).unwrap();
        dispatch(inv, &mut app).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].args, vec!["staging"]);
        assert_eq!(seen[0].options.get("region"), Some(&Value::from("us")));
    }
}
