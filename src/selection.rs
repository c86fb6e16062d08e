//! Selection flags kept index-aligned with one node's children.
//!
//! Driven purely by post-events on the watched node: inserted children start
//! unselected, removed children drop their flag, and a structure replacement
//! resets the list.

use tracing::trace;

use crate::arena::{NodeId, SchemaArena};
use crate::bus::SchemaListener;
use crate::errors::{ListenerError, ListenerResult, SchemaResult};
use crate::events::TreeEvent;

#[derive(Debug, Clone)]
pub struct ChildSelection {
    node: NodeId,
    selected: Vec<bool>,
}

impl ChildSelection {
    /// Starts with every current child unselected.
    pub fn new(model: &SchemaArena, node: NodeId) -> SchemaResult<Self> {
        let len = model.children(node)?.len();
        Ok(Self {
            node,
            selected: vec![false; len],
        })
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// Returns false if `index` is out of range.
    pub fn select(&mut self, index: usize) -> bool {
        self.set(index, true)
    }

    pub fn deselect(&mut self, index: usize) -> bool {
        self.set(index, false)
    }

    pub fn clear(&mut self) {
        self.selected.iter_mut().for_each(|s| *s = false);
    }

    pub fn is_selected(&self, index: usize) -> bool {
        self.selected.get(index).copied().unwrap_or(false)
    }

    pub fn selected_indices(&self) -> Vec<usize> {
        self.selected
            .iter()
            .enumerate()
            .filter(|(_, s)| **s)
            .map(|(i, _)| i)
            .collect()
    }

    /// Children currently selected, in child order.
    pub fn selected_children(&self, model: &SchemaArena) -> SchemaResult<Vec<NodeId>> {
        let children = model.children(self.node)?;
        Ok(self
            .selected_indices()
            .into_iter()
            .filter_map(|i| children.get(i).copied())
            .collect())
    }

    fn set(&mut self, index: usize, value: bool) -> bool {
        match self.selected.get_mut(index) {
            Some(flag) => {
                *flag = value;
                true
            }
            None => false,
        }
    }
}

impl SchemaListener for ChildSelection {
    fn label(&self) -> &str {
        "child-selection"
    }

    fn after(&mut self, _model: &SchemaArena, event: &TreeEvent) -> ListenerResult<()> {
        match event {
            TreeEvent::Inserted {
                parent,
                index,
                children,
            } if *parent == self.node => {
                if *index > self.selected.len() {
                    return Err(ListenerError::Failed(format!(
                        "insert at {} past {} tracked children",
                        index,
                        self.selected.len()
                    )));
                }
                for offset in 0..children.len() {
                    self.selected.insert(index + offset, false);
                }
            }
            TreeEvent::Removed {
                parent, indices, ..
            } if *parent == self.node => {
                let mut sorted = indices.clone();
                sorted.sort_unstable();
                // Highest first so earlier indices stay valid
                for &i in sorted.iter().rev() {
                    if i < self.selected.len() {
                        self.selected.remove(i);
                    }
                }
            }
            TreeEvent::StructureReplaced {
                parent, children, ..
            } if *parent == self.node => {
                self.selected = vec![false; children.len()];
            }
            _ => {}
        }
        trace!("{} selection flag(s) for {}", self.selected.len(), self.node);
        Ok(())
    }
}
