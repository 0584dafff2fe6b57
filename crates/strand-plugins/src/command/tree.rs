//! Arena-backed command tree.

use std::fmt;
use std::sync::Arc;

use super::{CommandAction, CommandTreeError};

/// Handle to a node: an arena slot plus the generation it was issued for.
///
/// Detaching a node frees its slot and bumps the generation, so a handle to
/// a detached node keeps resolving to nothing even after the slot is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: usize,
    generation: u32,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)?;
        if self.generation > 0 {
            write!(f, "v{}", self.generation)?;
        }
        Ok(())
    }
}

/// Who created a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeOrigin {
    /// Built into the host.
    Host,
    /// Created on behalf of the named plugin.
    Plugin(String),
}

/// A positional argument: `<req>`, `[opt]` or `<many...>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgSpec {
    /// Argument name.
    pub name: String,
    /// Whether the argument must be supplied.
    pub required: bool,
    /// Whether it collects all remaining values.
    pub variadic: bool,
}

/// The value an option takes: `<v>` (required) or `[v]` (optional).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionValue {
    /// Placeholder name.
    pub name: String,
    /// Whether a value must follow the flag.
    pub required: bool,
}

/// An option such as `-s, --long <value>`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OptionSpec {
    /// Short flag without the dash.
    pub short: Option<char>,
    /// Long flag without the dashes.
    pub long: Option<String>,
    /// Value, if the option takes one.
    pub value: Option<OptionValue>,
    /// Help text.
    pub description: Option<String>,
    /// Default value.
    pub default: Option<String>,
}

impl OptionSpec {
    /// Key under which the parsed value is reported: the long name, else the
    /// short flag.
    #[must_use]
    pub fn key(&self) -> String {
        match (&self.long, self.short) {
            (Some(long), _) => long.clone(),
            (None, Some(short)) => short.to_string(),
            (None, None) => String::new(),
        }
    }

    /// Whether `other` reports under the same key or reuses one of this
    /// option's flags.
    #[must_use]
    pub fn shares_flag(&self, other: &Self) -> bool {
        self.key() == other.key()
            || (self.long.is_some() && self.long == other.long)
            || (self.short.is_some() && self.short == other.short)
    }
}

/// One command in the tree.
#[derive(Clone)]
pub struct CommandNode {
    /// Command name.
    pub name: String,
    /// Alternative names.
    pub aliases: Vec<String>,
    /// Help text.
    pub description: Option<String>,
    /// Positional arguments.
    pub args: Vec<ArgSpec>,
    /// Options.
    pub options: Vec<OptionSpec>,
    /// Handler.
    pub action: Option<Arc<dyn CommandAction>>,
    /// Who created the node.
    pub origin: NodeOrigin,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl CommandNode {
    fn new(name: String, parent: Option<NodeId>, origin: NodeOrigin) -> Self {
        Self {
            name,
            aliases: Vec::new(),
            description: None,
            args: Vec::new(),
            options: Vec::new(),
            action: None,
            origin,
            parent,
            children: Vec::new(),
        }
    }

    /// Whether `name` is this node's name or one of its aliases.
    #[must_use]
    pub fn answers_to(&self, name: &str) -> bool {
        self.name == name || self.aliases.iter().any(|a| a == name)
    }

    /// Parent handle; `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Child handles in creation order.
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

impl fmt::Debug for CommandNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandNode")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("args", &self.args)
            .field("options", &self.options)
            .field("has_action", &self.action.is_some())
            .field("origin", &self.origin)
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    node: Option<CommandNode>,
}

/// The live command tree.
///
/// Slots freed by [`detach`](Self::detach) are reused, so the arena stays
/// as large as the biggest tree it has held across reloads.
#[derive(Debug, Clone)]
pub struct CommandTree {
    slots: Vec<Slot>,
    free: Vec<usize>,
    root: NodeId,
}

impl CommandTree {
    /// A tree holding only a host-owned root named `root_name`.
    #[must_use]
    pub fn new(root_name: impl Into<String>) -> Self {
        Self {
            slots: vec![Slot {
                generation: 0,
                node: Some(CommandNode::new(root_name.into(), None, NodeOrigin::Host)),
            }],
            free: Vec::new(),
            root: NodeId {
                index: 0,
                generation: 0,
            },
        }
    }

    fn slot(&self, id: NodeId) -> Option<&Slot> {
        self.slots
            .get(id.index)
            .filter(|slot| slot.generation == id.generation)
    }

    fn insert(&mut self, node: CommandNode) -> NodeId {
        if let Some(index) = self.free.pop()
            && let Some(slot) = self.slots.get_mut(index)
        {
            slot.node = Some(node);
            return NodeId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len();
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId {
            index,
            generation: 0,
        }
    }

    fn take(&mut self, id: NodeId) -> Option<CommandNode> {
        let slot = self
            .slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)?;
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Some(node)
    }

    /// Slots allocated so far, live or free.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Root handle.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The node behind `id`, if it is still attached.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&CommandNode> {
        self.slot(id).and_then(|slot| slot.node.as_ref())
    }

    /// Mutable access to a live node.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut CommandNode> {
        self.slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    /// Whether `id` still resolves.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Children of `id`; empty for a stale handle.
    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map_or(&[][..], CommandNode::children)
    }

    /// Number of live nodes, root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.node.is_some()).count()
    }

    /// Whether only the root is left.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    /// Child of `parent` answering to `name` by name or alias.
    #[must_use]
    pub fn find_child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|&c| self.get(c).is_some_and(|n| n.answers_to(name)))
    }

    /// Create a child of `parent`.
    ///
    /// # Errors
    ///
    /// [`CommandTreeError::Duplicate`] when a sibling already answers to
    /// `name`, [`CommandTreeError::Stale`] when `parent` is gone.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        origin: NodeOrigin,
    ) -> Result<NodeId, CommandTreeError> {
        let name = name.into();
        if !self.contains(parent) {
            return Err(CommandTreeError::Stale(parent));
        }
        if self.find_child(parent, &name).is_some() {
            return Err(CommandTreeError::Duplicate {
                parent: self.path_of(parent).join(" "),
                name,
            });
        }

        let id = self.insert(CommandNode::new(name, Some(parent), origin));
        if let Some(p) = self.get_mut(parent) {
            p.children.push(id);
        }
        Ok(id)
    }

    /// Add an alias to `id`.
    ///
    /// # Errors
    ///
    /// [`CommandTreeError::Duplicate`] when a sibling already answers to the
    /// alias, [`CommandTreeError::Stale`] when `id` is gone.
    pub fn add_alias(&mut self, id: NodeId, alias: &str) -> Result<(), CommandTreeError> {
        let parent = self.get(id).ok_or(CommandTreeError::Stale(id))?.parent;
        if let Some(parent) = parent
            && let Some(other) = self.find_child(parent, alias)
        {
            if other == id {
                return Ok(());
            }
            return Err(CommandTreeError::Duplicate {
                parent: self.path_of(parent).join(" "),
                name: alias.to_owned(),
            });
        }
        if let Some(node) = self.get_mut(id) {
            node.aliases.push(alias.to_owned());
        }
        Ok(())
    }

    /// Unlink `id` from its parent and drop its whole subtree.
    ///
    /// Returns the number of nodes dropped; `0` for a stale handle or the
    /// root, which cannot be detached.
    pub fn detach(&mut self, id: NodeId) -> usize {
        if id == self.root {
            return 0;
        }
        let Some(parent) = self.get(id).map(CommandNode::parent) else {
            return 0;
        };
        if let Some(p) = parent.and_then(|p| self.get_mut(p)) {
            p.children.retain(|&c| c != id);
        }

        let mut dropped = 0usize;
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.take(next) {
                stack.extend(node.children);
                dropped = dropped.saturating_add(1);
            }
        }
        dropped
    }

    /// Names from the root (exclusive) down to `id`.
    #[must_use]
    pub fn path_of(&self, id: NodeId) -> Vec<String> {
        let mut path = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let Some(node) = self.get(current) else { break };
            if node.parent.is_some() {
                path.push(node.name.clone());
            }
            cursor = node.parent;
        }
        path.reverse();
        path
    }

    /// Follow `path` from the root by name or alias.
    #[must_use]
    pub fn resolve<S: AsRef<str>>(&self, path: &[S]) -> Option<NodeId> {
        path.iter()
            .try_fold(self.root, |at, seg| self.find_child(at, seg.as_ref()))
    }

    /// All live nodes below `id` in depth-first order.
    #[must_use]
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_find_and_path() {
        let mut tree = CommandTree::new("strand");
        let root = tree.root();
        let a = tree.add_child(root, "alpha", NodeOrigin::Host).unwrap();
        let b = tree
            .add_child(a, "beta", NodeOrigin::Plugin("p".into()))
            .unwrap();
        tree.add_alias(b, "b").unwrap();

        assert_eq!(tree.find_child(a, "b"), Some(b));
        assert_eq!(tree.path_of(b), vec!["alpha", "beta"]);
        assert_eq!(tree.resolve(&["alpha", "b"]), Some(b));
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn sibling_names_and_aliases_are_unique() {
        let mut tree = CommandTree::new("strand");
        let root = tree.root();
        let a = tree.add_child(root, "alpha", NodeOrigin::Host).unwrap();
        tree.add_alias(a, "a").unwrap();
        assert!(matches!(
            tree.add_child(root, "a", NodeOrigin::Host),
            Err(CommandTreeError::Duplicate { .. })
        ));
        let z = tree.add_child(root, "zeta", NodeOrigin::Host).unwrap();
        assert!(tree.add_alias(z, "alpha").is_err());
        tree.add_alias(a, "a").unwrap();
    }

    #[test]
    fn detach_drops_subtree_and_stales_handles() {
        let mut tree = CommandTree::new("strand");
        let root = tree.root();
        let a = tree.add_child(root, "alpha", NodeOrigin::Host).unwrap();
        let b = tree.add_child(a, "beta", NodeOrigin::Host).unwrap();
        let c = tree.add_child(b, "gamma", NodeOrigin::Host).unwrap();

        assert_eq!(tree.detach(a), 3);
        assert!(tree.get(c).is_none());
        assert!(tree.children(root).is_empty());
        assert_eq!(tree.detach(a), 0);
        assert_eq!(tree.detach(root), 0);

        let again = tree.add_child(root, "alpha", NodeOrigin::Host).unwrap();
        assert_ne!(again, a);
        assert!(matches!(
            tree.add_child(b, "x", NodeOrigin::Host),
            Err(CommandTreeError::Stale(_))
        ));
    }

    #[test]
    fn reload_cycles_reuse_freed_slots() {
        let mut tree = CommandTree::new("strand");
        let root = tree.root();
        let first = tree.add_child(root, "deploy", NodeOrigin::Plugin("p".into())).unwrap();
        tree.add_child(first, "site", NodeOrigin::Plugin("p".into())).unwrap();
        let capacity = tree.capacity();

        for _ in 0..50 {
            let id = tree.resolve(&["deploy"]).unwrap();
            assert_eq!(tree.detach(id), 2);
            let id = tree.add_child(root, "deploy", NodeOrigin::Plugin("p".into())).unwrap();
            tree.add_child(id, "site", NodeOrigin::Plugin("p".into())).unwrap();
        }
        assert_eq!(tree.capacity(), capacity);

        let current = tree.resolve(&["deploy"]).unwrap();
        assert_ne!(current, first);
        assert!(tree.get(first).is_none());
        assert_eq!(tree.detach(first), 0);
        assert!(tree.contains(current));
    }

    #[test]
    fn descendants_are_depth_first() {
        let mut tree = CommandTree::new("strand");
        let root = tree.root();
        let a = tree.add_child(root, "a", NodeOrigin::Host).unwrap();
        let a1 = tree.add_child(a, "a1", NodeOrigin::Host).unwrap();
        let b = tree.add_child(root, "b", NodeOrigin::Host).unwrap();
        assert_eq!(tree.descendants(root), vec![a, a1, b]);
    }
}
