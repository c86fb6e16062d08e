//! Keeps one observer registered on every node of a managed subtree.
//!
//! The manager is itself a post-listener on every node it manages. Inserted
//! subtrees are listened to, removed or replaced-away subtrees are unlistened,
//! so coverage tracks the tree shape without call sites having to remember to
//! resynchronise.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::{Rc, Weak};
use tracing::{debug, instrument, trace};

use crate::arena::{NodeId, SchemaArena};
use crate::bus::{Phase, SchemaListener, SharedListener};
use crate::errors::{ListenerError, ListenerResult, SchemaResult};
use crate::events::TreeEvent;

pub struct HierarchySubscription {
    root: NodeId,
    observer: SharedListener,
    phases: Vec<Phase>,
    attached: HashSet<NodeId>,
    this: Weak<RefCell<HierarchySubscription>>,
}

impl HierarchySubscription {
    /// Registers `observer` for `phases` on `root` and all its descendants.
    #[instrument(level = "debug", skip(model, observer))]
    pub fn install(
        model: &SchemaArena,
        root: NodeId,
        observer: SharedListener,
        phases: &[Phase],
    ) -> SchemaResult<Rc<RefCell<Self>>> {
        model.node(root)?;
        let manager = Rc::new_cyclic(|this| {
            RefCell::new(Self {
                root,
                observer,
                phases: phases.to_vec(),
                attached: HashSet::new(),
                this: this.clone(),
            })
        });
        manager.borrow_mut().listen_to_hierarchy(model, root)?;
        Ok(manager)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn observer(&self) -> &SharedListener {
        &self.observer
    }

    /// Nodes the observer is currently registered on.
    pub fn attached(&self) -> &HashSet<NodeId> {
        &self.attached
    }

    /// Removes the observer and the manager from every node they were put on.
    #[instrument(level = "debug", skip(self, model))]
    pub fn uninstall(&mut self, model: &SchemaArena) {
        let nodes: Vec<NodeId> = self.attached.drain().collect();
        for node in nodes {
            self.detach(model, node);
        }
        debug!("uninstalled hierarchy listener from {}", self.root);
    }

    /// Moves coverage from the current root to `new_root`.
    #[instrument(level = "debug", skip(self, model))]
    pub fn retarget(&mut self, model: &SchemaArena, new_root: NodeId) -> SchemaResult<()> {
        model.node(new_root)?;
        self.uninstall(model);
        self.root = new_root;
        self.listen_to_hierarchy(model, new_root)
    }

    fn manager_handle(&self) -> Option<SharedListener> {
        self.this.upgrade().map(|rc| rc as SharedListener)
    }

    #[instrument(level = "trace", skip(self, model))]
    fn listen_to_hierarchy(&mut self, model: &SchemaArena, node: NodeId) -> SchemaResult<()> {
        let nodes: Vec<NodeId> = model.iter_subtree(node).map(|(id, _)| id).collect();
        let manager = self.manager_handle();
        for id in nodes {
            for &phase in &self.phases {
                model.subscribe(id, phase, self.observer.clone())?;
            }
            if let Some(manager) = &manager {
                model.subscribe(id, Phase::Post, manager.clone())?;
            }
            self.attached.insert(id);
        }
        trace!("listening to {} node(s)", self.attached.len());
        Ok(())
    }

    #[instrument(level = "trace", skip(self, model))]
    fn unlisten_to_hierarchy(&mut self, model: &SchemaArena, node: NodeId) {
        let nodes: Vec<NodeId> = model.iter_subtree(node).map(|(id, _)| id).collect();
        for id in nodes {
            if self.attached.remove(&id) {
                self.detach(model, id);
            }
        }
    }

    fn detach(&self, model: &SchemaArena, node: NodeId) {
        for &phase in &self.phases {
            model.unsubscribe_listener(node, phase, &self.observer);
        }
        if let Some(manager) = self.manager_handle() {
            model.unsubscribe_listener(node, Phase::Post, &manager);
        }
    }
}

impl SchemaListener for HierarchySubscription {
    fn label(&self) -> &str {
        "hierarchy-subscription"
    }

    fn after(&mut self, model: &SchemaArena, event: &TreeEvent) -> ListenerResult<()> {
        match event {
            TreeEvent::Inserted { children, .. } => {
                for &child in children {
                    self.listen_to_hierarchy(model, child)
                        .map_err(ListenerError::from)?;
                }
            }
            TreeEvent::Removed { children, .. } => {
                for &child in children {
                    self.unlisten_to_hierarchy(model, child);
                }
            }
            TreeEvent::StructureReplaced {
                outgoing, incoming, ..
            } => {
                for &child in outgoing {
                    self.unlisten_to_hierarchy(model, child);
                }
                for &child in incoming {
                    self.listen_to_hierarchy(model, child)
                        .map_err(ListenerError::from)?;
                }
            }
            TreeEvent::PropertyChanged { .. } => {}
        }
        Ok(())
    }
}
