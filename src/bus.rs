//! Event bus: per-node listener registrations and synchronous dispatch.
//!
//! Listeners are registered per node and phase, keyed by identity of the
//! shared handle, and are called in registration order. Dispatch works on a
//! snapshot of the registrations, so a listener may (un)subscribe while an
//! event is being delivered; the change applies from the next event on.

use std::any::Any;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use tracing::{info, instrument, trace, warn};

use crate::arena::{NodeId, SchemaArena};
use crate::errors::{ListenerError, ListenerResult, SchemaError, SchemaResult};
use crate::events::{FollowUp, PreEvent, TreeEvent, Verdict, Veto, VetoReason};

/// Observer of schema mutations.
///
/// `before` is consulted while a mutation is pending and may veto it;
/// `after` is told about applied mutations. Both receive the model read-only:
/// follow-up mutations are requested through [`Verdict::ProceedAfter`].
pub trait SchemaListener {
    /// Name used in veto reasons and fault reports.
    fn label(&self) -> &str {
        "listener"
    }

    fn before(&mut self, _model: &SchemaArena, _event: &PreEvent) -> ListenerResult<Verdict> {
        Ok(Verdict::Proceed)
    }

    fn after(&mut self, _model: &SchemaArena, _event: &TreeEvent) -> ListenerResult<()> {
        Ok(())
    }
}

pub type SharedListener = Rc<RefCell<dyn SchemaListener>>;

/// Wraps a listener for registration while keeping its concrete type
/// accessible to the caller.
pub fn shared<L: SchemaListener + 'static>(listener: L) -> Rc<RefCell<L>> {
    Rc::new(RefCell::new(listener))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Pre,
    Post,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Opaque handle returned by [`SchemaArena::subscribe`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    node: NodeId,
    phase: Phase,
    id: SubscriptionId,
}

impl Subscription {
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }
}

fn listener_key(listener: &SharedListener) -> usize {
    Rc::as_ptr(listener) as *const () as usize
}

struct Entry {
    id: SubscriptionId,
    key: usize,
    listener: SharedListener,
}

/// Registrations of all listeners on all nodes of one arena.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: u64,
    entries: HashMap<(NodeId, Phase), Vec<Entry>>,
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registrations: usize = self.entries.values().map(Vec::len).sum();
        f.debug_struct("ListenerRegistry")
            .field("registrations", &registrations)
            .finish()
    }
}

impl ListenerRegistry {
    fn add(&mut self, node: NodeId, phase: Phase, listener: SharedListener) -> Subscription {
        let key = listener_key(&listener);
        let list = self.entries.entry((node, phase)).or_default();
        if let Some(existing) = list.iter().find(|e| e.key == key) {
            return Subscription {
                node,
                phase,
                id: existing.id,
            };
        }
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        list.push(Entry { id, key, listener });
        Subscription { node, phase, id }
    }

    fn remove_where(&mut self, node: NodeId, phase: Phase, pred: impl Fn(&Entry) -> bool) -> bool {
        let Some(list) = self.entries.get_mut(&(node, phase)) else {
            return false;
        };
        let before = list.len();
        list.retain(|e| !pred(e));
        let removed = list.len() != before;
        if list.is_empty() {
            self.entries.remove(&(node, phase));
        }
        removed
    }

    fn contains(&self, node: NodeId, phase: Phase, key: usize) -> bool {
        self.entries
            .get(&(node, phase))
            .is_some_and(|list| list.iter().any(|e| e.key == key))
    }

    fn snapshot(&self, node: NodeId, phase: Phase) -> Vec<SharedListener> {
        self.entries
            .get(&(node, phase))
            .map(|list| list.iter().map(|e| Rc::clone(&e.listener)).collect())
            .unwrap_or_default()
    }

    fn count(&self, node: NodeId, phase: Phase) -> usize {
        self.entries.get(&(node, phase)).map_or(0, Vec::len)
    }

    fn nodes_for(&self, key: usize, phase: Phase) -> HashSet<NodeId> {
        self.entries
            .iter()
            .filter(|((_, p), list)| *p == phase && list.iter().any(|e| e.key == key))
            .map(|((node, _), _)| *node)
            .collect()
    }

    /// Drops every registration on a destroyed node.
    pub(crate) fn purge(&mut self, node: NodeId) {
        self.entries.remove(&(node, Phase::Pre));
        self.entries.remove(&(node, Phase::Post));
    }
}

/// Aggregated answer of all pre-listeners of one event.
#[derive(Debug, Default)]
pub(crate) struct PreDispatch {
    pub veto: Veto,
    pub follow_ups: Vec<FollowUp>,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Calls one listener, turning errors, panics and re-entrant borrows into
/// [`SchemaError::ListenerFault`].
fn invoke<T>(
    listener: &SharedListener,
    call: impl FnOnce(&mut (dyn SchemaListener + 'static)) -> ListenerResult<T>,
) -> SchemaResult<(String, T)> {
    let mut guard = listener
        .try_borrow_mut()
        .map_err(|_| SchemaError::ListenerFault {
            listener: "<busy>".to_string(),
            source: ListenerError::Failed("listener is already borrowed".to_string()),
        })?;
    let label = guard.label().to_string();
    match panic::catch_unwind(AssertUnwindSafe(|| call(&mut *guard))) {
        Ok(Ok(value)) => Ok((label, value)),
        Ok(Err(source)) => {
            warn!("listener '{}' failed: {}", label, source);
            Err(SchemaError::ListenerFault {
                listener: label,
                source,
            })
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!("listener '{}' panicked: {}", label, message);
            Err(SchemaError::ListenerFault {
                listener: label,
                source: ListenerError::Failed(format!("panicked: {}", message)),
            })
        }
    }
}

impl SchemaArena {
    /// Registers `listener` on `node`. Registering the same handle twice
    /// returns the existing subscription.
    pub fn subscribe(
        &self,
        node: NodeId,
        phase: Phase,
        listener: SharedListener,
    ) -> SchemaResult<Subscription> {
        self.node(node)?;
        Ok(self.registry.borrow_mut().add(node, phase, listener))
    }

    /// Returns false if the subscription was already gone.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        self.registry
            .borrow_mut()
            .remove_where(subscription.node, subscription.phase, |e| {
                e.id == subscription.id
            })
    }

    /// Identity-based detach; redundant calls are harmless.
    pub fn unsubscribe_listener(
        &self,
        node: NodeId,
        phase: Phase,
        listener: &SharedListener,
    ) -> bool {
        let key = listener_key(listener);
        self.registry
            .borrow_mut()
            .remove_where(node, phase, |e| e.key == key)
    }

    pub fn is_subscribed(&self, node: NodeId, phase: Phase, listener: &SharedListener) -> bool {
        self.registry
            .borrow()
            .contains(node, phase, listener_key(listener))
    }

    /// Every node `listener` is currently registered on for `phase`.
    pub fn subscribed_nodes(&self, listener: &SharedListener, phase: Phase) -> HashSet<NodeId> {
        self.registry
            .borrow()
            .nodes_for(listener_key(listener), phase)
    }

    pub fn listener_count(&self, node: NodeId, phase: Phase) -> usize {
        self.registry.borrow().count(node, phase)
    }

    /// Delivers a pre-event to every pre-listener of its source node.
    ///
    /// A veto does not stop delivery; a fault does.
    #[instrument(level = "trace", skip(self))]
    pub(crate) fn dispatch_pre(&self, event: &PreEvent) -> SchemaResult<PreDispatch> {
        let listeners = self.registry.borrow().snapshot(event.source, Phase::Pre);
        trace!("pre-event to {} listener(s)", listeners.len());
        let mut result = PreDispatch::default();
        for listener in &listeners {
            let (label, verdict) = invoke(listener, |l| l.before(self, event))?;
            match verdict {
                Verdict::Proceed => {}
                Verdict::ProceedAfter(follow_ups) => result.follow_ups.extend(follow_ups),
                Verdict::Veto(reason) => {
                    info!("'{}' vetoed change on {}: {}", label, event.source, reason);
                    result.veto.reasons.push(VetoReason {
                        listener: label,
                        reason,
                    });
                }
            }
        }
        Ok(result)
    }

    /// Delivers a post-event to every post-listener of its source node.
    ///
    /// The change has already been applied, so a fault does not stop
    /// delivery; the first fault is returned once every listener was called.
    #[instrument(level = "trace", skip(self))]
    pub(crate) fn dispatch_post(&self, event: &TreeEvent) -> SchemaResult<()> {
        let listeners = self.registry.borrow().snapshot(event.source(), Phase::Post);
        trace!("post-event to {} listener(s)", listeners.len());
        let mut first_fault = None;
        for listener in &listeners {
            if let Err(fault) = invoke(listener, |l| l.after(self, event)) {
                first_fault.get_or_insert(fault);
            }
        }
        first_fault.map_or(Ok(()), Err)
    }
}
