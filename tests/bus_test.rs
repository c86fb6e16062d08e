//! Event bus protocol: ordering, vetoes and listener faults

use std::cell::RefCell;
use std::rc::Rc;

use rstest::rstest;
use schemawatch::util::testing;
use schemawatch::{
    shared, ListenerError, ListenerResult, MutationOutcome, NodeId, NodeKind, PendingChange,
    Phase, PreEvent, PropertyValue, SchemaArena, SchemaError, SchemaListener, SharedListener,
    TreeEvent, Verdict,
};

type Log = Rc<RefCell<Vec<String>>>;

#[derive(Clone, Copy)]
enum Behaviour {
    Proceed,
    Veto,
    Fail,
    Panic,
}

struct Scripted {
    name: String,
    behaviour: Behaviour,
    log: Log,
}

impl Scripted {
    fn handle(name: &str, behaviour: Behaviour, log: &Log) -> SharedListener {
        shared(Scripted {
            name: name.to_string(),
            behaviour,
            log: log.clone(),
        })
    }
}

impl SchemaListener for Scripted {
    fn label(&self) -> &str {
        &self.name
    }

    fn before(&mut self, _model: &SchemaArena, _event: &PreEvent) -> ListenerResult<Verdict> {
        self.log.borrow_mut().push(format!("pre:{}", self.name));
        match self.behaviour {
            Behaviour::Proceed => Ok(Verdict::Proceed),
            Behaviour::Veto => Ok(Verdict::veto(format!("{} says no", self.name))),
            Behaviour::Fail => Err(ListenerError::Failed("broken".to_string())),
            Behaviour::Panic => panic!("listener blew up"),
        }
    }

    fn after(&mut self, _model: &SchemaArena, event: &TreeEvent) -> ListenerResult<()> {
        self.log
            .borrow_mut()
            .push(format!("post:{}:{:?}", self.name, event.source()));
        match self.behaviour {
            Behaviour::Fail => Err(ListenerError::Failed("broken".to_string())),
            _ => Ok(()),
        }
    }
}

fn table_with_column() -> (SchemaArena, NodeId, NodeId) {
    testing::init_test_setup();
    let mut arena = SchemaArena::new();
    let table = arena.create_node(NodeKind::Table, "orders");
    let column = arena.create_node(NodeKind::Column, "id");
    assert!(arena.insert_children(table, 0, &[column]).unwrap().is_applied());
    (arena, table, column)
}

fn entries(log: &Log) -> Vec<String> {
    log.borrow().clone()
}

// ============================================================
// Ordering and veto
// ============================================================

#[test]
fn given_listeners_when_dispatching_then_called_in_registration_order() {
    let (mut arena, table, column) = table_with_column();
    let log = Log::default();
    for name in ["a", "b", "c"] {
        arena
            .subscribe(table, Phase::Pre, Scripted::handle(name, Behaviour::Proceed, &log))
            .unwrap();
    }

    let outcome = arena.remove_children(table, &[column]).unwrap();

    assert!(outcome.is_applied());
    assert_eq!(entries(&log), vec!["pre:a", "pre:b", "pre:c"]);
}

#[test]
fn given_early_veto_when_dispatching_then_every_listener_still_sees_event() {
    let (mut arena, table, column) = table_with_column();
    let log = Log::default();
    arena
        .subscribe(table, Phase::Pre, Scripted::handle("first", Behaviour::Veto, &log))
        .unwrap();
    arena
        .subscribe(table, Phase::Pre, Scripted::handle("second", Behaviour::Proceed, &log))
        .unwrap();
    arena
        .subscribe(table, Phase::Pre, Scripted::handle("third", Behaviour::Veto, &log))
        .unwrap();

    let outcome = arena.remove_children(table, &[column]).unwrap();

    assert_eq!(entries(&log), vec!["pre:first", "pre:second", "pre:third"]);
    let MutationOutcome::Vetoed(veto) = outcome else {
        panic!("expected veto");
    };
    let listeners: Vec<&str> = veto.reasons.iter().map(|r| r.listener.as_str()).collect();
    assert_eq!(listeners, vec!["first", "third"]);
    assert_eq!(veto.to_string(), "first: first says no; third: third says no");
    assert_eq!(arena.parent(column).unwrap(), Some(table));
}

#[test]
fn given_vetoed_change_when_dispatching_then_no_post_event() {
    let (mut arena, table, column) = table_with_column();
    let log = Log::default();
    arena
        .subscribe(table, Phase::Pre, Scripted::handle("guard", Behaviour::Veto, &log))
        .unwrap();
    arena
        .subscribe(table, Phase::Post, Scripted::handle("watch", Behaviour::Proceed, &log))
        .unwrap();

    let outcome = arena.remove_children(table, &[column]).unwrap();

    assert!(outcome.is_vetoed());
    assert_eq!(entries(&log), vec!["pre:guard"]);
}

// ============================================================
// Faults
// ============================================================

#[rstest]
#[case(Behaviour::Fail)]
#[case(Behaviour::Panic)]
fn given_faulty_pre_listener_when_removing_then_fault_and_tree_unchanged(
    #[case] behaviour: Behaviour,
) {
    let (mut arena, table, column) = table_with_column();
    let log = Log::default();
    arena
        .subscribe(table, Phase::Pre, Scripted::handle("faulty", behaviour, &log))
        .unwrap();
    arena
        .subscribe(table, Phase::Pre, Scripted::handle("later", Behaviour::Proceed, &log))
        .unwrap();

    let result = arena.remove_children(table, &[column]);

    match result {
        Err(SchemaError::ListenerFault { listener, .. }) => assert_eq!(listener, "faulty"),
        other => panic!("expected listener fault, got {:?}", other),
    }
    assert_eq!(arena.children(table).unwrap(), &[column]);
    // dispatch stops at the fault
    assert_eq!(entries(&log), vec!["pre:faulty"]);
}

#[test]
fn given_faulty_post_listener_when_mutating_then_later_listeners_still_told() {
    let (mut arena, table, column) = table_with_column();
    let log = Log::default();
    arena
        .subscribe(table, Phase::Post, Scripted::handle("faulty", Behaviour::Fail, &log))
        .unwrap();
    arena
        .subscribe(table, Phase::Post, Scripted::handle("also", Behaviour::Fail, &log))
        .unwrap();
    arena
        .subscribe(table, Phase::Post, Scripted::handle("later", Behaviour::Proceed, &log))
        .unwrap();

    let result = arena.remove_children(table, &[column]);

    // first fault wins, the change stays applied
    match result {
        Err(SchemaError::ListenerFault { listener, .. }) => assert_eq!(listener, "faulty"),
        other => panic!("expected listener fault, got {:?}", other),
    }
    assert!(arena.children(table).unwrap().is_empty());
    let expected: Vec<String> = ["faulty", "also", "later"]
        .iter()
        .map(|name| format!("post:{}:{:?}", name, table))
        .collect();
    assert_eq!(entries(&log), expected);
}

// ============================================================
// Registration handles and events
// ============================================================

#[test]
fn given_subscription_when_unsubscribing_then_no_longer_called() {
    let (mut arena, table, column) = table_with_column();
    let log = Log::default();
    let sub = arena
        .subscribe(table, Phase::Pre, Scripted::handle("gone", Behaviour::Veto, &log))
        .unwrap();

    assert!(arena.unsubscribe(&sub));
    assert!(!arena.unsubscribe(&sub));
    let outcome = arena.remove_children(table, &[column]).unwrap();

    assert!(outcome.is_applied());
    assert!(entries(&log).is_empty());
}

#[test]
fn given_missing_node_when_subscribing_then_not_found() {
    let (mut arena, _, column) = table_with_column();
    let log = Log::default();
    let stray = arena.create_node(NodeKind::Table, "stray");
    assert_eq!(arena.discard(stray).unwrap(), 1);

    let listener = Scripted::handle("x", Behaviour::Proceed, &log);

    let result = arena.subscribe(stray, Phase::Pre, listener);

    assert!(matches!(result, Err(SchemaError::NodeNotFound(_))));
    assert!(arena.contains(column));
}

struct PropertyRecorder {
    seen: Vec<PendingChange>,
    applied: Vec<TreeEvent>,
}

impl SchemaListener for PropertyRecorder {
    fn before(&mut self, _model: &SchemaArena, event: &PreEvent) -> ListenerResult<Verdict> {
        self.seen.push(event.change.clone());
        Ok(Verdict::Proceed)
    }

    fn after(&mut self, _model: &SchemaArena, event: &TreeEvent) -> ListenerResult<()> {
        self.applied.push(event.clone());
        Ok(())
    }
}

#[test]
fn given_property_change_when_setting_then_events_carry_old_and_new() {
    let (mut arena, _, column) = table_with_column();
    let recorder = shared(PropertyRecorder {
        seen: Vec::new(),
        applied: Vec::new(),
    });
    let handle: SharedListener = recorder.clone();
    arena.subscribe(column, Phase::Pre, handle.clone()).unwrap();
    arena.subscribe(column, Phase::Post, handle).unwrap();

    let first = arena
        .set_property(column, "type", PropertyValue::Text("int".into()))
        .unwrap();
    let second = arena
        .set_property(column, "type", PropertyValue::Text("bigint".into()))
        .unwrap();
    let unchanged = arena
        .set_property(column, "type", PropertyValue::Text("bigint".into()))
        .unwrap();

    assert!(first.is_applied() && second.is_applied() && unchanged.is_applied());
    let recorder = recorder.borrow();
    assert_eq!(recorder.seen.len(), 2);
    assert_eq!(
        recorder.applied[1],
        TreeEvent::PropertyChanged {
            node: column,
            name: "type".into(),
            old: Some(PropertyValue::Text("int".into())),
            new: Some(PropertyValue::Text("bigint".into())),
        }
    );
}

#[test]
fn given_rename_when_setting_name_then_node_renamed() {
    let (mut arena, table, _) = table_with_column();

    let outcome = arena
        .set_property(table, "name", PropertyValue::Text("sales".into()))
        .unwrap();

    assert!(outcome.is_applied());
    assert_eq!(arena.node(table).unwrap().name(), "sales");
}

#[rstest]
#[case("lineage", PropertyValue::Text("x".into()))]
#[case("name", PropertyValue::Int(3))]
fn given_reserved_property_when_setting_then_invalid(
    #[case] name: &str,
    #[case] value: PropertyValue,
) {
    let (mut arena, _, column) = table_with_column();

    let result = arena.set_property(column, name, value);

    assert!(matches!(result, Err(SchemaError::InvalidProperty { .. })));
}
