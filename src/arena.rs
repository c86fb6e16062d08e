use generational_arena::{Arena, Index};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tracing::{debug, instrument};

use crate::bus::ListenerRegistry;
use crate::errors::{SchemaError, SchemaResult};

/// Property name under which lineage changes are announced.
pub const LINEAGE_PROPERTY: &str = "lineage";

/// Property name that renames a node.
pub const NAME_PROPERTY: &str = "name";

/// Stable identity of a node inside a [`SchemaArena`].
///
/// Generational: an id of a discarded node never resolves to a later node
/// that happens to reuse the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(Index);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (slot, generation) = self.0.into_raw_parts();
        write!(f, "#{}v{}", slot, generation)
    }
}

/// Kind tag of a schema-metadata node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Root,
    Database,
    Catalog,
    Schema,
    Table,
    Folder,
    Column,
}

impl NodeKind {
    /// Columns are leaves; every other kind may own children.
    pub fn allows_children(self) -> bool {
        !matches!(self, NodeKind::Column)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeKind::Root => "root",
            NodeKind::Database => "database",
            NodeKind::Catalog => "catalog",
            NodeKind::Schema => "schema",
            NodeKind::Table => "table",
            NodeKind::Folder => "folder",
            NodeKind::Column => "column",
        };
        f.write_str(s)
    }
}

/// Scalar property value; `Node` is only used for lineage announcements.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Text(String),
    Int(i64),
    Bool(bool),
    Node(NodeId),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Text(s) => write!(f, "{}", s),
            PropertyValue::Int(i) => write!(f, "{}", i),
            PropertyValue::Bool(b) => write!(f, "{}", b),
            PropertyValue::Node(id) => write!(f, "{}", id),
        }
    }
}

/// Tree element of the schema model.
///
/// Structure (`parent`, `children`), name, properties and lineage are only
/// changed through the mutation entry points in [`crate::mutation`].
#[derive(Debug)]
pub struct SchemaNode {
    pub(crate) kind: NodeKind,
    pub(crate) name: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) properties: BTreeMap<String, PropertyValue>,
    pub(crate) lineage: Option<NodeId>,
}

impl SchemaNode {
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    pub fn properties(&self) -> &BTreeMap<String, PropertyValue> {
        &self.properties
    }

    /// Source column this column was derived from, if any.
    pub fn lineage(&self) -> Option<NodeId> {
        self.lineage
    }
}

/// Arena holding every node of a session (source and target trees alike)
/// together with the listener registrations on those nodes.
///
/// Roots are simply nodes without a parent. Removed subtrees are detached
/// and stay alive until [`SchemaArena::discard`] destroys them.
pub struct SchemaArena {
    pub(crate) nodes: Arena<SchemaNode>,
    pub(crate) registry: RefCell<ListenerRegistry>,
}

impl fmt::Debug for SchemaArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaArena")
            .field("nodes", &self.nodes.len())
            .field("registry", &self.registry)
            .finish()
    }
}

impl Default for SchemaArena {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaArena {
    pub fn new() -> Self {
        Self {
            nodes: Arena::new(),
            registry: RefCell::new(ListenerRegistry::default()),
        }
    }

    /// Creates a detached node. Attach it with `insert_children`.
    #[instrument(level = "trace", skip(self, name))]
    pub fn create_node(&mut self, kind: NodeKind, name: impl Into<String>) -> NodeId {
        let node = SchemaNode {
            kind,
            name: name.into(),
            parent: None,
            children: Vec::new(),
            properties: BTreeMap::new(),
            lineage: None,
        };
        NodeId(self.nodes.insert(node))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains(id.0)
    }

    pub fn get(&self, id: NodeId) -> Option<&SchemaNode> {
        self.nodes.get(id.0)
    }

    pub fn node(&self, id: NodeId) -> SchemaResult<&SchemaNode> {
        self.get(id).ok_or(SchemaError::NodeNotFound(id))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> SchemaResult<&mut SchemaNode> {
        self.nodes.get_mut(id.0).ok_or(SchemaError::NodeNotFound(id))
    }

    pub fn children(&self, id: NodeId) -> SchemaResult<&[NodeId]> {
        Ok(self.node(id)?.children())
    }

    pub fn parent(&self, id: NodeId) -> SchemaResult<Option<NodeId>> {
        Ok(self.node(id)?.parent())
    }

    /// Lineage reference of a column.
    pub fn lineage(&self, column: NodeId) -> SchemaResult<Option<NodeId>> {
        let node = self.node(column)?;
        if node.kind != NodeKind::Column {
            return Err(SchemaError::NotAColumn(column));
        }
        Ok(node.lineage)
    }

    /// True if `node` is `root` or one of its transitive children.
    #[instrument(level = "trace", skip(self))]
    pub fn is_reachable(&self, root: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(idx) = current {
            if idx == root {
                return true;
            }
            current = self.get(idx).and_then(|n| n.parent);
        }
        false
    }

    /// Walks parent links up to the top-most ancestor.
    pub fn root_of(&self, id: NodeId) -> SchemaResult<NodeId> {
        let mut current = id;
        while let Some(parent) = self.node(current)?.parent {
            current = parent;
        }
        Ok(current)
    }

    /// Pre-order traversal of `root` and all its descendants.
    pub fn iter_subtree(&self, root: NodeId) -> SubtreeIterator<'_> {
        SubtreeIterator::new(self, root)
    }

    /// Post-order traversal: children before their parent.
    pub fn iter_postorder(&self, root: NodeId) -> PostOrderIterator<'_> {
        PostOrderIterator::new(self, root)
    }

    pub fn subtree_ids(&self, root: NodeId) -> HashSet<NodeId> {
        self.iter_subtree(root).map(|(id, _)| id).collect()
    }

    #[instrument(level = "debug", skip(self))]
    pub fn depth(&self, root: NodeId) -> usize {
        self.calculate_depth(root)
    }

    fn calculate_depth(&self, node_idx: NodeId) -> usize {
        if let Some(node) = self.get(node_idx) {
            1 + node
                .children
                .iter()
                .map(|&child| self.calculate_depth(child))
                .max()
                .unwrap_or(0)
        } else {
            0
        }
    }

    /// Resolves a `/`-separated path of child names below `root`.
    #[instrument(level = "trace", skip(self))]
    pub fn find_path(&self, root: NodeId, path: &str) -> SchemaResult<NodeId> {
        let mut current = root;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = self
                .children(current)?
                .iter()
                .copied()
                .find(|&c| self.get(c).is_some_and(|n| n.name == segment))
                .ok_or_else(|| SchemaError::PathNotFound(path.to_string()))?;
        }
        Ok(current)
    }

    /// Inverse of [`find_path`](Self::find_path); `None` if `node` is not below `root`.
    pub fn path_of(&self, root: NodeId, node: NodeId) -> Option<String> {
        let mut names = Vec::new();
        let mut current = node;
        while current != root {
            let n = self.get(current)?;
            names.push(n.name.as_str());
            current = n.parent?;
        }
        Some(names.iter().rev().join("/"))
    }

    /// Columns in the target tree whose lineage points into the subtree
    /// rooted at `source_subtree`, in target pre-order.
    #[instrument(level = "debug", skip(self))]
    pub fn columns_sourced_from(
        &self,
        target_root: NodeId,
        source_subtree: NodeId,
    ) -> SchemaResult<Vec<NodeId>> {
        self.node(target_root)?;
        self.node(source_subtree)?;
        let refs: Vec<NodeId> = self
            .iter_subtree(target_root)
            .filter(|(_, n)| n.kind == NodeKind::Column)
            .filter(|(_, n)| {
                n.lineage
                    .is_some_and(|src| self.is_reachable(source_subtree, src))
            })
            .map(|(id, _)| id)
            .collect();
        debug!("{} column(s) sourced from {}", refs.len(), source_subtree);
        Ok(refs)
    }

    /// Destroys a detached subtree and drops any registrations left on it.
    ///
    /// Returns the number of destroyed nodes.
    #[instrument(level = "debug", skip(self))]
    pub fn discard(&mut self, node: NodeId) -> SchemaResult<usize> {
        if self.node(node)?.parent.is_some() {
            return Err(SchemaError::StillAttached(node));
        }
        let doomed: Vec<NodeId> = self.iter_postorder(node).map(|(id, _)| id).collect();
        let mut registry = self.registry.borrow_mut();
        for id in &doomed {
            self.nodes.remove(id.0);
            registry.purge(*id);
        }
        debug!("discarded {} node(s)", doomed.len());
        Ok(doomed.len())
    }
}

pub struct SubtreeIterator<'a> {
    arena: &'a SchemaArena,
    stack: Vec<NodeId>,
}

impl<'a> SubtreeIterator<'a> {
    fn new(arena: &'a SchemaArena, root: NodeId) -> Self {
        let mut stack = Vec::new();
        if arena.contains(root) {
            stack.push(root);
        }
        Self { arena, stack }
    }
}

impl<'a> Iterator for SubtreeIterator<'a> {
    type Item = (NodeId, &'a SchemaNode);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(current_idx) = self.stack.pop() {
            if let Some(node) = self.arena.get(current_idx) {
                // Reverse push keeps left-to-right order
                for &child in node.children.iter().rev() {
                    self.stack.push(child);
                }
                return Some((current_idx, node));
            }
        }
        None
    }
}

pub struct PostOrderIterator<'a> {
    arena: &'a SchemaArena,
    stack: Vec<(NodeId, bool)>,
}

impl<'a> PostOrderIterator<'a> {
    fn new(arena: &'a SchemaArena, root: NodeId) -> Self {
        let mut stack = Vec::new();
        if arena.contains(root) {
            stack.push((root, false));
        }
        Self { arena, stack }
    }
}

impl<'a> Iterator for PostOrderIterator<'a> {
    type Item = (NodeId, &'a SchemaNode);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((current_idx, visited)) = self.stack.pop() {
            if let Some(node) = self.arena.get(current_idx) {
                if !visited {
                    self.stack.push((current_idx, true));
                    for &child in node.children.iter().rev() {
                        self.stack.push((child, false));
                    }
                } else {
                    return Some((current_idx, node));
                }
            }
        }
        None
    }
}
