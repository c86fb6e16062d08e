use termtree::Tree;
use tracing::instrument;

use crate::arena::{NodeId, NodeKind, SchemaArena};

/// Renders model subtrees for display.
pub trait TreeRender {
    /// `kind name` labels; columns with lineage get ` <- path` relative to
    /// `lineage_root` (or the raw id if the source is not below it).
    fn to_tree_string(&self, root: NodeId, lineage_root: Option<NodeId>) -> Tree<String>;
}

impl TreeRender for SchemaArena {
    #[instrument(level = "debug", skip(self))]
    fn to_tree_string(&self, root: NodeId, lineage_root: Option<NodeId>) -> Tree<String> {
        fn label(arena: &SchemaArena, node_idx: NodeId, lineage_root: Option<NodeId>) -> String {
            let Some(node) = arena.get(node_idx) else {
                return format!("<missing {}>", node_idx);
            };
            let mut text = if node.kind() == NodeKind::Root {
                node.name().to_string()
            } else {
                format!("{} {}", node.kind(), node.name())
            };
            if let Some(src) = node.lineage() {
                let shown = lineage_root
                    .and_then(|r| arena.path_of(r, src))
                    .unwrap_or_else(|| src.to_string());
                text.push_str(&format!(" <- {}", shown));
            }
            text
        }

        fn build_tree(
            arena: &SchemaArena,
            node_idx: NodeId,
            lineage_root: Option<NodeId>,
            parent_tree: &mut Tree<String>,
        ) {
            if let Some(node) = arena.get(node_idx) {
                for &child_idx in node.children() {
                    let mut child_tree = Tree::new(label(arena, child_idx, lineage_root));
                    build_tree(arena, child_idx, lineage_root, &mut child_tree);
                    parent_tree.push(child_tree);
                }
            }
        }

        let mut tree = Tree::new(label(self, root, lineage_root));
        build_tree(self, root, lineage_root, &mut tree);
        tree
    }
}
