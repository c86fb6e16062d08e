//! Mutation entry points.
//!
//! Every entry point validates its arguments, announces the change with a
//! pre-event, applies listener follow-ups, applies the change and finally
//! announces it with a post-event. A vetoed change leaves the model untouched.

use std::collections::{HashSet, VecDeque};
use tracing::{debug, info, instrument};

use crate::arena::{NodeId, NodeKind, PropertyValue, SchemaArena, LINEAGE_PROPERTY, NAME_PROPERTY};
use crate::errors::{SchemaError, SchemaResult};
use crate::events::{FollowUp, MutationOutcome, PendingChange, PreEvent, TreeEvent, Veto};

/// Answer of the pre-listeners to a pending change.
enum Announcement {
    /// Carries the post-events of the follow-ups applied on the way.
    Approved(Vec<TreeEvent>),
    Vetoed(Veto),
}

fn lineage_event(column: NodeId, old: Option<NodeId>, new: Option<NodeId>) -> PreEvent {
    PreEvent {
        source: column,
        change: PendingChange::Property {
            name: LINEAGE_PROPERTY.to_string(),
            old: old.map(PropertyValue::Node),
            new: new.map(PropertyValue::Node),
        },
    }
}

impl SchemaArena {
    /// Attaches detached `children` to `parent`, starting at `index`.
    #[instrument(level = "debug", skip(self))]
    pub fn insert_children(
        &mut self,
        parent: NodeId,
        index: usize,
        children: &[NodeId],
    ) -> SchemaResult<MutationOutcome> {
        let node = self.node(parent)?;
        if !node.kind.allows_children() {
            return Err(SchemaError::ChildrenNotAllowed {
                node: parent,
                kind: node.kind,
            });
        }
        let len = node.children.len();
        if index > len {
            return Err(SchemaError::IndexOutOfBounds { parent, index, len });
        }
        self.check_unique(children)?;
        for &child in children {
            self.check_attachable(parent, child)?;
        }
        if children.is_empty() {
            return Ok(MutationOutcome::Applied);
        }

        let event = PreEvent {
            source: parent,
            change: PendingChange::Insert {
                index,
                children: children.to_vec(),
            },
        };
        let deferred = match self.announce(&event)? {
            Announcement::Approved(deferred) => deferred,
            Announcement::Vetoed(veto) => return Ok(MutationOutcome::Vetoed(veto)),
        };

        for (offset, &child) in children.iter().enumerate() {
            self.node_mut(child)?.parent = Some(parent);
            self.node_mut(parent)?.children.insert(index + offset, child);
        }
        debug!("inserted {} child(ren) into {}", children.len(), parent);

        let applied = TreeEvent::Inserted {
            parent,
            index,
            children: children.to_vec(),
        };
        self.notify(deferred, applied)?;
        Ok(MutationOutcome::Applied)
    }

    /// Detaches a batch of children from `parent` in one logical operation.
    ///
    /// Removed subtrees stay in the arena, detached, until discarded.
    #[instrument(level = "debug", skip(self))]
    pub fn remove_children(
        &mut self,
        parent: NodeId,
        children: &[NodeId],
    ) -> SchemaResult<MutationOutcome> {
        let current = self.children(parent)?;
        let mut indices = Vec::with_capacity(children.len());
        for &child in children {
            let idx = current
                .iter()
                .position(|&c| c == child)
                .ok_or(SchemaError::NotAChild { parent, child })?;
            indices.push(idx);
        }
        self.check_unique(children)?;
        if children.is_empty() {
            return Ok(MutationOutcome::Applied);
        }

        let event = PreEvent {
            source: parent,
            change: PendingChange::Remove {
                children: children.to_vec(),
            },
        };
        let deferred = match self.announce(&event)? {
            Announcement::Approved(deferred) => deferred,
            Announcement::Vetoed(veto) => return Ok(MutationOutcome::Vetoed(veto)),
        };

        let doomed: HashSet<NodeId> = children.iter().copied().collect();
        self.node_mut(parent)?.children.retain(|c| !doomed.contains(c));
        for &child in children {
            self.node_mut(child)?.parent = None;
        }
        debug!("removed {} child(ren) from {}", children.len(), parent);

        let applied = TreeEvent::Removed {
            parent,
            indices,
            children: children.to_vec(),
        };
        self.notify(deferred, applied)?;
        Ok(MutationOutcome::Applied)
    }

    /// Replaces the whole child collection of `parent`.
    ///
    /// `children` may mix current children (kept) with detached nodes
    /// (attached); current children not listed are detached.
    #[instrument(level = "debug", skip(self))]
    pub fn replace_children(
        &mut self,
        parent: NodeId,
        children: &[NodeId],
    ) -> SchemaResult<MutationOutcome> {
        let node = self.node(parent)?;
        if !node.kind.allows_children() && !children.is_empty() {
            return Err(SchemaError::ChildrenNotAllowed {
                node: parent,
                kind: node.kind,
            });
        }
        let previous = node.children.clone();
        self.check_unique(children)?;
        let incoming: Vec<NodeId> = children
            .iter()
            .copied()
            .filter(|c| !previous.contains(c))
            .collect();
        for &child in &incoming {
            self.check_attachable(parent, child)?;
        }
        let outgoing: Vec<NodeId> = previous
            .iter()
            .copied()
            .filter(|c| !children.contains(c))
            .collect();

        let event = PreEvent {
            source: parent,
            change: PendingChange::Replace {
                outgoing: outgoing.clone(),
                incoming: incoming.clone(),
                children: children.to_vec(),
            },
        };
        let deferred = match self.announce(&event)? {
            Announcement::Approved(deferred) => deferred,
            Announcement::Vetoed(veto) => return Ok(MutationOutcome::Vetoed(veto)),
        };

        for &child in &outgoing {
            self.node_mut(child)?.parent = None;
        }
        for &child in &incoming {
            self.node_mut(child)?.parent = Some(parent);
        }
        self.node_mut(parent)?.children = children.to_vec();
        debug!(
            "replaced children of {}: -{} +{}",
            parent,
            outgoing.len(),
            incoming.len()
        );

        let applied = TreeEvent::StructureReplaced {
            parent,
            outgoing,
            incoming,
            children: children.to_vec(),
        };
        self.notify(deferred, applied)?;
        Ok(MutationOutcome::Applied)
    }

    /// Sets a scalar property. `name` renames the node and takes text only;
    /// `lineage` is reserved for [`set_lineage`](Self::set_lineage).
    ///
    /// Setting the current value again is a silent no-op.
    #[instrument(level = "debug", skip(self))]
    pub fn set_property(
        &mut self,
        node: NodeId,
        name: &str,
        value: PropertyValue,
    ) -> SchemaResult<MutationOutcome> {
        if name == LINEAGE_PROPERTY {
            return Err(SchemaError::InvalidProperty {
                name: name.to_string(),
                reason: "use set_lineage".to_string(),
            });
        }
        if matches!(value, PropertyValue::Node(_)) {
            return Err(SchemaError::InvalidProperty {
                name: name.to_string(),
                reason: "node references are only allowed as lineage".to_string(),
            });
        }
        let current = self.node(node)?;
        let old = if name == NAME_PROPERTY {
            let PropertyValue::Text(_) = &value else {
                return Err(SchemaError::InvalidProperty {
                    name: name.to_string(),
                    reason: "name must be text".to_string(),
                });
            };
            Some(PropertyValue::Text(current.name.clone()))
        } else {
            current.properties.get(name).cloned()
        };
        if old.as_ref() == Some(&value) {
            return Ok(MutationOutcome::Applied);
        }

        let event = PreEvent {
            source: node,
            change: PendingChange::Property {
                name: name.to_string(),
                old: old.clone(),
                new: Some(value.clone()),
            },
        };
        let deferred = match self.announce(&event)? {
            Announcement::Approved(deferred) => deferred,
            Announcement::Vetoed(veto) => return Ok(MutationOutcome::Vetoed(veto)),
        };

        let target = self.node_mut(node)?;
        match (name, &value) {
            (NAME_PROPERTY, PropertyValue::Text(text)) => target.name = text.clone(),
            _ => {
                target.properties.insert(name.to_string(), value.clone());
            }
        }

        let applied = TreeEvent::PropertyChanged {
            node,
            name: name.to_string(),
            old,
            new: Some(value),
        };
        self.notify(deferred, applied)?;
        Ok(MutationOutcome::Applied)
    }

    /// Links a target column to the source column it was derived from, or
    /// clears the link with `None`.
    #[instrument(level = "debug", skip(self))]
    pub fn set_lineage(
        &mut self,
        column: NodeId,
        source: Option<NodeId>,
    ) -> SchemaResult<MutationOutcome> {
        let old = self.lineage(column)?;
        if let Some(src) = source {
            if self.node(src)?.kind != NodeKind::Column {
                return Err(SchemaError::NotAColumn(src));
            }
        }
        if old == source {
            return Ok(MutationOutcome::Applied);
        }

        let event = lineage_event(column, old, source);
        let deferred = match self.announce(&event)? {
            Announcement::Approved(deferred) => deferred,
            Announcement::Vetoed(veto) => return Ok(MutationOutcome::Vetoed(veto)),
        };

        self.node_mut(column)?.lineage = source;

        let applied = TreeEvent::PropertyChanged {
            node: column,
            name: LINEAGE_PROPERTY.to_string(),
            old: old.map(PropertyValue::Node),
            new: source.map(PropertyValue::Node),
        };
        self.notify(deferred, applied)?;
        Ok(MutationOutcome::Applied)
    }

    /// Runs the pre-dispatch of `event` and of every follow-up it asks for.
    ///
    /// Follow-ups are only applied once all of them passed their own
    /// pre-dispatch, so a veto or fault anywhere leaves the model untouched.
    /// Their post-events are returned for [`notify`](Self::notify).
    fn announce(&mut self, event: &PreEvent) -> SchemaResult<Announcement> {
        let dispatch = self.dispatch_pre(event)?;
        if !dispatch.veto.is_empty() {
            info!("change on {} vetoed: {}", event.source, dispatch.veto);
            return Ok(Announcement::Vetoed(dispatch.veto));
        }

        let mut pending: VecDeque<FollowUp> = dispatch.follow_ups.into();
        let mut seen = HashSet::new();
        let mut clears = Vec::new();
        while let Some(follow_up) = pending.pop_front() {
            match follow_up {
                FollowUp::ClearLineage(column) => {
                    if !seen.insert(column) {
                        continue;
                    }
                    let Some(old) = self.lineage(column)? else {
                        continue;
                    };
                    let clear = self.dispatch_pre(&lineage_event(column, Some(old), None))?;
                    if !clear.veto.is_empty() {
                        info!("clearing lineage of {} vetoed: {}", column, clear.veto);
                        return Ok(Announcement::Vetoed(Veto::single(
                            "lineage",
                            format!("clearing lineage of {} was vetoed ({})", column, clear.veto),
                        )));
                    }
                    pending.extend(clear.follow_ups);
                    clears.push((column, old));
                }
            }
        }

        let mut deferred = Vec::with_capacity(clears.len());
        for (column, old) in clears {
            self.node_mut(column)?.lineage = None;
            deferred.push(TreeEvent::PropertyChanged {
                node: column,
                name: LINEAGE_PROPERTY.to_string(),
                old: Some(PropertyValue::Node(old)),
                new: None,
            });
        }
        if !deferred.is_empty() {
            debug!("cleared lineage of {} column(s)", deferred.len());
        }
        Ok(Announcement::Approved(deferred))
    }

    /// Sends the post-events of applied follow-ups, then `applied`.
    /// Every event is delivered; the first fault is returned.
    fn notify(&self, deferred: Vec<TreeEvent>, applied: TreeEvent) -> SchemaResult<()> {
        let mut first_fault = None;
        for event in deferred.iter().chain(std::iter::once(&applied)) {
            if let Err(fault) = self.dispatch_post(event) {
                first_fault.get_or_insert(fault);
            }
        }
        first_fault.map_or(Ok(()), Err)
    }

    fn check_unique(&self, children: &[NodeId]) -> SchemaResult<()> {
        let mut seen = HashSet::with_capacity(children.len());
        for &child in children {
            if !seen.insert(child) {
                return Err(SchemaError::DuplicateChild(child));
            }
        }
        Ok(())
    }

    /// A child must exist, be detached and not be an ancestor of `parent`.
    fn check_attachable(&self, parent: NodeId, child: NodeId) -> SchemaResult<()> {
        if let Some(owner) = self.node(child)?.parent {
            return Err(SchemaError::AlreadyAttached { node: child, parent: owner });
        }
        if self.is_reachable(child, parent) {
            return Err(SchemaError::CycleDetected(child));
        }
        Ok(())
    }
}
