//! Change notification and lineage integrity for schema-model trees.
//!
//! A [`SchemaArena`] holds the node trees of a session. Every structural or
//! property mutation goes through an entry point that asks pre-listeners
//! first (any of them may veto), applies the change and tells post-listeners.
//! On top of that bus, [`HierarchySubscription`] keeps an observer attached to
//! a whole subtree and [`LineageWatcher`] stops source-model removals from
//! leaving target columns with dangling lineage.

pub mod arena;
pub mod builder;
pub mod bus;
pub mod cli;
pub mod config;
pub mod errors;
pub mod events;
pub mod exitcode;
pub mod hierarchy;
pub mod mutation;
pub mod prompt;
pub mod selection;
pub mod session;
pub mod tree_traits;
pub mod util;
pub mod watcher;

pub use arena::{NodeId, NodeKind, PropertyValue, SchemaArena, SchemaNode};
pub use bus::{shared, Phase, SchemaListener, SharedListener, Subscription};
pub use errors::{AppError, AppResult, ListenerError, ListenerResult, SchemaError, SchemaResult};
pub use events::{FollowUp, MutationOutcome, PendingChange, PreEvent, TreeEvent, Verdict, Veto};
pub use hierarchy::HierarchySubscription;
pub use prompt::{Decision, DecisionPrompter, FixedDecision, ScriptedPrompter};
pub use session::SchemaSession;
pub use watcher::LineageWatcher;
