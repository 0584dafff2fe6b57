//! Per-plugin ownership of command nodes.

use std::collections::HashMap;

use tracing::debug;

use super::syntax::{parse_fragment, split_declaration};
use super::tree::{CommandTree, NodeId, NodeOrigin};
use super::{CommandTreeError, apply_fragment};

/// Which nodes each plugin created, so they can be detached without touching
/// host commands or other plugins' commands.
#[derive(Debug, Clone, Default)]
pub struct MountTable {
    owned: HashMap<String, Vec<NodeId>>,
}

impl MountTable {
    /// Empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `plugin` created `id`.
    pub fn track(&mut self, plugin: &str, id: NodeId) {
        self.owned.entry(plugin.to_owned()).or_default().push(id);
    }

    /// Nodes created for `plugin`, in creation order.
    #[must_use]
    pub fn owned(&self, plugin: &str) -> &[NodeId] {
        self.owned.get(plugin).map_or(&[][..], Vec::as_slice)
    }

    /// Plugins with at least one tracked node.
    pub fn plugins(&self) -> impl Iterator<Item = &str> {
        self.owned.keys().map(String::as_str)
    }

    /// Whether nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.owned.is_empty()
    }

    /// Detach everything `plugin` created and forget it. Returns the number of
    /// tree nodes dropped.
    pub fn detach_plugin(&mut self, tree: &mut CommandTree, plugin: &str) -> usize {
        let Some(ids) = self.owned.remove(plugin) else {
            return 0;
        };
        let dropped = ids
            .into_iter()
            .rev()
            .fold(0usize, |n, id| n.saturating_add(tree.detach(id)));
        debug!(plugin = %plugin, dropped, "detached plugin commands");
        dropped
    }

    /// Detach every tracked node and clear the table.
    pub fn detach_all(&mut self, tree: &mut CommandTree) -> usize {
        let plugins: Vec<String> = self.owned.keys().cloned().collect();
        plugins
            .iter()
            .fold(0usize, |n, p| n.saturating_add(self.detach_plugin(tree, p)))
    }
}

/// Mount `decl` under `parent` on behalf of `plugin`.
///
/// Every path segment before the leaf is reused when a child already
/// answers to it, by name or alias, and created otherwise. The leaf is
/// handled the same way, and only a newly created leaf receives the
/// declaration's arguments and options. Only nodes created here are tracked.
///
/// # Errors
///
/// [`CommandTreeError::Syntax`] for an empty declaration or a malformed
/// fragment, [`CommandTreeError::Stale`] when `parent` is gone.
pub fn register_plugin_command(
    tree: &mut CommandTree,
    mounts: &mut MountTable,
    plugin: &str,
    parent: NodeId,
    decl: &str,
) -> Result<NodeId, CommandTreeError> {
    let (path, fragment) = split_declaration(decl);
    let Some((&leaf, intermediates)) = path.split_last() else {
        return Err(CommandTreeError::Syntax {
            input: decl.to_owned(),
            message: "missing command name".to_owned(),
        });
    };
    let fragment = fragment.as_deref().map(parse_fragment).transpose()?;
    let origin = NodeOrigin::Plugin(plugin.to_owned());

    let mut at = parent;
    for &segment in intermediates {
        at = match tree.find_child(at, segment) {
            Some(existing) => existing,
            None => {
                let id = tree.add_child(at, segment, origin.clone())?;
                mounts.track(plugin, id);
                id
            },
        };
    }

    if let Some(existing) = tree.find_child(at, leaf) {
        return Ok(existing);
    }
    match tree.add_child(at, leaf, origin) {
        Ok(id) => {
            mounts.track(plugin, id);
            if let Some(fragment) = fragment {
                apply_fragment(tree, id, fragment);
            }
            Ok(id)
        },
        Err(CommandTreeError::Duplicate { parent, name }) => tree
            .find_child(at, leaf)
            .ok_or(CommandTreeError::Duplicate { parent, name }),
        Err(e) => Err(e),
    }
}
