//! Guards ETL lineage when parts of the source model are removed.
//!
//! The watcher listens for pre-events on the source model. When children are
//! about to leave the tree it looks for target columns whose lineage points
//! anywhere into the outgoing subtrees. Each outgoing child with such columns
//! costs one question to the [`DecisionPrompter`]:
//!
//! - proceed-and-clear: the columns' lineage is cleared, then the removal runs
//! - keep-and-abort / cancel-and-abort: the whole batch is vetoed
//!
//! Every affected child is asked about, even after an abort. Clearing is
//! requested as a follow-up, so it only happens when nobody vetoed the
//! removal.

use tracing::{debug, info, instrument};

use crate::arena::{NodeId, SchemaArena};
use crate::bus::SchemaListener;
use crate::errors::ListenerResult;
use crate::events::{FollowUp, PreEvent, Verdict};
use crate::prompt::{Decision, DecisionPrompter};

pub struct LineageWatcher<P = Box<dyn DecisionPrompter>> {
    target_root: NodeId,
    prompter: P,
}

impl<P: DecisionPrompter> LineageWatcher<P> {
    pub fn new(target_root: NodeId, prompter: P) -> Self {
        Self {
            target_root,
            prompter,
        }
    }

    pub fn target_root(&self) -> NodeId {
        self.target_root
    }

    pub fn prompter(&self) -> &P {
        &self.prompter
    }

    #[instrument(level = "debug", skip(self, model))]
    fn review(&mut self, model: &SchemaArena, outgoing: &[NodeId]) -> ListenerResult<Verdict> {
        let mut clears = Vec::new();
        let mut refusals = Vec::new();
        for &child in outgoing {
            let refs = model.columns_sourced_from(self.target_root, child)?;
            if refs.is_empty() {
                continue;
            }
            let label = model.node(child)?.name().to_string();
            let decision = self.prompter.decide(refs.len(), &label);
            info!(
                "removing '{}' affects {} lineage reference(s): {}",
                label,
                refs.len(),
                decision
            );
            match decision {
                Decision::ProceedAndClear => {
                    clears.extend(refs.into_iter().map(FollowUp::ClearLineage));
                }
                Decision::KeepAndAbort => refusals.push(format!(
                    "keeping {} lineage reference(s) into '{}'",
                    refs.len(),
                    label
                )),
                Decision::CancelAndAbort => {
                    refusals.push(format!("removal of '{}' cancelled", label));
                }
            }
        }
        if !refusals.is_empty() {
            return Ok(Verdict::veto(refusals.join("; ")));
        }
        if clears.is_empty() {
            Ok(Verdict::Proceed)
        } else {
            debug!("{} lineage reference(s) to clear", clears.len());
            Ok(Verdict::ProceedAfter(clears))
        }
    }
}

impl<P: DecisionPrompter> SchemaListener for LineageWatcher<P> {
    fn label(&self) -> &str {
        "lineage-watcher"
    }

    fn before(&mut self, model: &SchemaArena, event: &PreEvent) -> ListenerResult<Verdict> {
        let outgoing = event.outgoing();
        if outgoing.is_empty() {
            return Ok(Verdict::Proceed);
        }
        self.review(model, outgoing)
    }
}
