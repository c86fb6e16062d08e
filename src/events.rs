//! Event records, listener verdicts and mutation outcomes.
//!
//! A mutation announces itself with a [`PreEvent`] before it takes effect and a
//! [`TreeEvent`] afterwards. Events live for exactly one dispatch call.

use itertools::Itertools;
use std::fmt;

use crate::arena::{NodeId, PropertyValue};

/// Change that is about to be applied to the event's source node.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingChange {
    Insert {
        index: usize,
        children: Vec<NodeId>,
    },
    /// All children leaving in one logical operation, in one batch.
    Remove { children: Vec<NodeId> },
    /// Wholesale replacement of the child collection.
    Replace {
        outgoing: Vec<NodeId>,
        incoming: Vec<NodeId>,
        children: Vec<NodeId>,
    },
    Property {
        name: String,
        old: Option<PropertyValue>,
        new: Option<PropertyValue>,
    },
}

/// Vetoable announcement of a mutation on `source`.
#[derive(Debug, Clone, PartialEq)]
pub struct PreEvent {
    pub source: NodeId,
    pub change: PendingChange,
}

impl PreEvent {
    /// Children that would leave the tree if the change is applied.
    pub fn outgoing(&self) -> &[NodeId] {
        match &self.change {
            PendingChange::Remove { children } => children.as_slice(),
            PendingChange::Replace { outgoing, .. } => outgoing.as_slice(),
            PendingChange::Insert { .. } | PendingChange::Property { .. } => &[],
        }
    }

    /// Children that would join the tree if the change is applied.
    pub fn incoming(&self) -> &[NodeId] {
        match &self.change {
            PendingChange::Insert { children, .. } => children.as_slice(),
            PendingChange::Replace { incoming, .. } => incoming.as_slice(),
            PendingChange::Remove { .. } | PendingChange::Property { .. } => &[],
        }
    }
}

/// Notification about a mutation that has been applied.
#[derive(Debug, Clone, PartialEq)]
pub enum TreeEvent {
    Inserted {
        parent: NodeId,
        index: usize,
        children: Vec<NodeId>,
    },
    /// `indices` are the positions the children held before removal.
    Removed {
        parent: NodeId,
        indices: Vec<usize>,
        children: Vec<NodeId>,
    },
    PropertyChanged {
        node: NodeId,
        name: String,
        old: Option<PropertyValue>,
        new: Option<PropertyValue>,
    },
    /// Bulk, order-insensitive change of the child collection.
    StructureReplaced {
        parent: NodeId,
        outgoing: Vec<NodeId>,
        incoming: Vec<NodeId>,
        children: Vec<NodeId>,
    },
}

impl TreeEvent {
    pub fn source(&self) -> NodeId {
        match self {
            TreeEvent::Inserted { parent, .. }
            | TreeEvent::Removed { parent, .. }
            | TreeEvent::StructureReplaced { parent, .. } => *parent,
            TreeEvent::PropertyChanged { node, .. } => *node,
        }
    }
}

/// Work a listener asks the mutator to do once dispatch has completed and
/// nobody vetoed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    ClearLineage(NodeId),
}

/// A listener's answer to a [`PreEvent`].
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Proceed,
    ProceedAfter(Vec<FollowUp>),
    Veto(String),
}

impl Verdict {
    pub fn veto(reason: impl Into<String>) -> Self {
        Verdict::Veto(reason.into())
    }
}

/// One listener's objection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VetoReason {
    pub listener: String,
    pub reason: String,
}

/// Every objection raised during one dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Veto {
    pub reasons: Vec<VetoReason>,
}

impl Veto {
    pub fn single(listener: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            reasons: vec![VetoReason {
                listener: listener.into(),
                reason: reason.into(),
            }],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.reasons.is_empty()
    }
}

impl fmt::Display for Veto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            self.reasons
                .iter()
                .map(|r| format!("{}: {}", r.listener, r.reason))
                .join("; ")
        )
    }
}

/// Result of a mutation attempt that did not fail.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    Applied,
    /// Nothing changed.
    Vetoed(Veto),
}

impl MutationOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, MutationOutcome::Applied)
    }

    pub fn is_vetoed(&self) -> bool {
        matches!(self, MutationOutcome::Vetoed(_))
    }
}
