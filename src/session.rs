//! A modelling session: one source model, one target model, and the listeners
//! that guard lineage between them while the session is active.

use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, info, instrument};

use crate::arena::{NodeId, NodeKind, SchemaArena};
use crate::bus::{Phase, SharedListener, Subscription};
use crate::config::WatcherSettings;
use crate::errors::SchemaResult;
use crate::hierarchy::HierarchySubscription;
use crate::prompt::DecisionPrompter;
use crate::watcher::LineageWatcher;

/// How the watcher is attached to the source model.
enum Coverage {
    /// Root only: only removals of top-level source objects are guarded.
    Root(Subscription),
    /// Every source node, kept in sync by a hierarchy subscription.
    Hierarchy(Rc<RefCell<HierarchySubscription>>),
}

struct Guard {
    watcher: Rc<RefCell<LineageWatcher>>,
    coverage: Coverage,
}

pub struct SchemaSession {
    model: SchemaArena,
    source_root: NodeId,
    target_root: NodeId,
    guard: Option<Guard>,
}

impl SchemaSession {
    pub fn new(source_name: &str, target_name: &str) -> Self {
        let mut model = SchemaArena::new();
        let source_root = model.create_node(NodeKind::Root, source_name);
        let target_root = model.create_node(NodeKind::Root, target_name);
        Self {
            model,
            source_root,
            target_root,
            guard: None,
        }
    }

    pub fn model(&self) -> &SchemaArena {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut SchemaArena {
        &mut self.model
    }

    pub fn source_root(&self) -> NodeId {
        self.source_root
    }

    pub fn target_root(&self) -> NodeId {
        self.target_root
    }

    pub fn is_active(&self) -> bool {
        self.guard.is_some()
    }

    /// Installs the lineage watcher on the source model. Restarting an
    /// active session replaces the previous watcher.
    #[instrument(level = "debug", skip(self, prompter))]
    pub fn start(
        &mut self,
        prompter: Box<dyn DecisionPrompter>,
        settings: &WatcherSettings,
    ) -> SchemaResult<()> {
        self.end();
        let watcher = Rc::new(RefCell::new(LineageWatcher::new(self.target_root, prompter)));
        let observer: SharedListener = watcher.clone();
        let coverage = if settings.watch_hierarchy {
            Coverage::Hierarchy(HierarchySubscription::install(
                &self.model,
                self.source_root,
                observer,
                &[Phase::Pre],
            )?)
        } else {
            Coverage::Root(self.model.subscribe(self.source_root, Phase::Pre, observer)?)
        };
        self.guard = Some(Guard { watcher, coverage });
        info!(
            "session started (watch_hierarchy={})",
            settings.watch_hierarchy
        );
        Ok(())
    }

    /// Removes every listener the session installed. Idempotent.
    #[instrument(level = "debug", skip(self))]
    pub fn end(&mut self) {
        let Some(guard) = self.guard.take() else {
            return;
        };
        match guard.coverage {
            Coverage::Root(subscription) => {
                self.model.unsubscribe(&subscription);
            }
            Coverage::Hierarchy(manager) => manager.borrow_mut().uninstall(&self.model),
        }
        debug!(
            "session ended, watcher for {} released",
            guard.watcher.borrow().target_root()
        );
    }

    /// The installed watcher, for inspection.
    pub fn watcher(&self) -> Option<SharedListener> {
        self.guard
            .as_ref()
            .map(|g| g.watcher.clone() as SharedListener)
    }
}

impl Drop for SchemaSession {
    fn drop(&mut self) {
        self.end();
    }
}
