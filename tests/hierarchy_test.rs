//! Coverage of a hierarchy subscription across structural mutations

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use rstest::{fixture, rstest};
use schemawatch::util::testing;
use schemawatch::{
    shared, HierarchySubscription, ListenerError, NodeId, NodeKind, Phase, PreEvent,
    SchemaArena, SchemaError, SchemaListener, SharedListener, TreeEvent, Verdict,
};

#[derive(Default)]
struct Recorder {
    pre: Vec<NodeId>,
    post: Vec<NodeId>,
}

impl SchemaListener for Recorder {
    fn label(&self) -> &str {
        "recorder"
    }

    fn before(
        &mut self,
        _model: &SchemaArena,
        event: &PreEvent,
    ) -> schemawatch::ListenerResult<Verdict> {
        self.pre.push(event.source);
        Ok(Verdict::Proceed)
    }

    fn after(
        &mut self,
        _model: &SchemaArena,
        event: &TreeEvent,
    ) -> schemawatch::ListenerResult<()> {
        self.post.push(event.source());
        Ok(())
    }
}

struct Managed {
    arena: SchemaArena,
    root: NodeId,
    db: NodeId,
    table: NodeId,
    recorder: Rc<RefCell<Recorder>>,
    observer: SharedListener,
    manager: Rc<RefCell<HierarchySubscription>>,
}

impl Managed {
    fn covered(&self, phase: Phase) -> HashSet<NodeId> {
        self.arena.subscribed_nodes(&self.observer, phase)
    }

    fn reachable(&self) -> HashSet<NodeId> {
        self.arena.subtree_ids(self.root)
    }

    fn assert_in_sync(&self) {
        assert_eq!(self.covered(Phase::Pre), self.reachable());
        assert_eq!(self.covered(Phase::Post), self.reachable());
        assert_eq!(self.manager.borrow().attached(), &self.reachable());
    }

    fn detached_subtree(&mut self, name: &str) -> (NodeId, NodeId) {
        let table = self.arena.create_node(NodeKind::Table, name);
        let column = self.arena.create_node(NodeKind::Column, format!("{}_id", name));
        assert!(self
            .arena
            .insert_children(table, 0, &[column])
            .unwrap()
            .is_applied());
        (table, column)
    }
}

#[fixture]
fn managed() -> Managed {
    testing::init_test_setup();
    let mut arena = SchemaArena::new();
    let root = arena.create_node(NodeKind::Root, "source");
    let db = arena.create_node(NodeKind::Database, "db");
    let table = arena.create_node(NodeKind::Table, "orders");
    let column = arena.create_node(NodeKind::Column, "id");
    assert!(arena.insert_children(root, 0, &[db]).unwrap().is_applied());
    assert!(arena.insert_children(db, 0, &[table]).unwrap().is_applied());
    assert!(arena.insert_children(table, 0, &[column]).unwrap().is_applied());

    let recorder = shared(Recorder::default());
    let observer: SharedListener = recorder.clone();
    let manager =
        HierarchySubscription::install(&arena, root, observer.clone(), &[Phase::Pre, Phase::Post])
            .unwrap();
    Managed {
        arena,
        root,
        db,
        table,
        recorder,
        observer,
        manager,
    }
}

#[rstest]
fn given_installed_manager_when_nothing_changes_then_covers_reachable_set(managed: Managed) {
    managed.assert_in_sync();
    assert_eq!(managed.reachable().len(), 4);
}

#[rstest]
fn given_inserted_subtree_when_inserting_then_coverage_extends(mut managed: Managed) {
    let (table, column) = managed.detached_subtree("customers");
    let db = managed.db;

    assert!(managed.arena.insert_children(db, 1, &[table]).unwrap().is_applied());

    managed.assert_in_sync();
    assert!(managed.covered(Phase::Pre).contains(&column));
}

#[rstest]
fn given_removed_subtree_when_removing_then_coverage_retracts(mut managed: Managed) {
    let (db, table) = (managed.db, managed.table);

    assert!(managed.arena.remove_children(db, &[table]).unwrap().is_applied());

    managed.assert_in_sync();
    assert!(!managed.covered(Phase::Pre).contains(&table));
    assert_eq!(managed.arena.listener_count(table, Phase::Post), 0);
}

#[rstest]
fn given_reparented_subtree_when_moving_then_stays_covered(mut managed: Managed) {
    let (root, db, table) = (managed.root, managed.db, managed.table);
    let other = managed.arena.create_node(NodeKind::Database, "archive");
    assert!(managed.arena.insert_children(root, 1, &[other]).unwrap().is_applied());

    assert!(managed.arena.remove_children(db, &[table]).unwrap().is_applied());
    assert!(managed.arena.insert_children(other, 0, &[table]).unwrap().is_applied());

    managed.assert_in_sync();
    assert_eq!(managed.arena.listener_count(table, Phase::Pre), 1);
}

#[rstest]
fn given_replaced_children_when_replacing_then_coverage_follows_membership(mut managed: Managed) {
    let (db, table) = (managed.db, managed.table);
    let (fresh, fresh_column) = managed.detached_subtree("fresh");

    assert!(managed
        .arena
        .replace_children(db, &[fresh])
        .unwrap()
        .is_applied());

    managed.assert_in_sync();
    assert!(managed.covered(Phase::Pre).contains(&fresh_column));
    assert!(!managed.covered(Phase::Pre).contains(&table));
}

#[rstest]
fn given_mixed_sequence_when_mutating_then_invariant_holds_after_each_step(mut managed: Managed) {
    let (root, db) = (managed.root, managed.db);
    let (a, _) = managed.detached_subtree("a");
    let (b, _) = managed.detached_subtree("b");

    assert!(managed.arena.insert_children(db, 0, &[a, b]).unwrap().is_applied());
    managed.assert_in_sync();
    assert!(managed.arena.remove_children(db, &[a]).unwrap().is_applied());
    managed.assert_in_sync();
    assert!(managed.arena.remove_children(root, &[db]).unwrap().is_applied());
    managed.assert_in_sync();
    assert!(managed.arena.insert_children(root, 0, &[db]).unwrap().is_applied());
    managed.assert_in_sync();
    assert!(managed.arena.discard(a).unwrap() > 0);
    managed.assert_in_sync();
}

#[rstest]
fn given_covered_node_when_mutating_then_observer_notified_once(mut managed: Managed) {
    let table = managed.table;
    // second install on an already covered subtree must not duplicate delivery
    let again = HierarchySubscription::install(
        &managed.arena,
        table,
        managed.observer.clone(),
        &[Phase::Pre],
    )
    .unwrap();
    let column = managed.arena.create_node(NodeKind::Column, "amount");

    assert!(managed
        .arena
        .insert_children(table, 1, &[column])
        .unwrap()
        .is_applied());

    let recorder = managed.recorder.borrow();
    assert_eq!(recorder.pre, vec![table]);
    assert_eq!(recorder.post, vec![table]);
    drop(recorder);
    again.borrow_mut().uninstall(&managed.arena);
}

#[rstest]
fn given_manager_when_retargeting_then_moves_coverage(mut managed: Managed) {
    let other_root = managed.arena.create_node(NodeKind::Root, "target");
    let fact = managed.arena.create_node(NodeKind::Table, "fact");
    assert!(managed
        .arena
        .insert_children(other_root, 0, &[fact])
        .unwrap()
        .is_applied());

    managed
        .manager
        .borrow_mut()
        .retarget(&managed.arena, other_root)
        .unwrap();

    assert_eq!(
        managed.covered(Phase::Pre),
        HashSet::from([other_root, fact])
    );
    assert_eq!(managed.manager.borrow().root(), other_root);
}

#[rstest]
fn given_manager_when_uninstalling_then_observer_gone_everywhere(managed: Managed) {
    managed.manager.borrow_mut().uninstall(&managed.arena);

    assert!(managed.covered(Phase::Pre).is_empty());
    assert!(managed.covered(Phase::Post).is_empty());
    for id in managed.reachable() {
        assert_eq!(managed.arena.listener_count(id, Phase::Post), 0);
    }
}

struct Broken;

impl SchemaListener for Broken {
    fn label(&self) -> &str {
        "broken"
    }

    fn after(
        &mut self,
        _model: &SchemaArena,
        _event: &TreeEvent,
    ) -> schemawatch::ListenerResult<()> {
        Err(ListenerError::Failed("cannot keep up".to_string()))
    }
}

#[test]
fn given_failing_post_listener_before_manager_when_inserting_then_coverage_still_follows() {
    testing::init_test_setup();
    let mut arena = SchemaArena::new();
    let root = arena.create_node(NodeKind::Root, "source");
    let broken: SharedListener = shared(Broken);
    arena.subscribe(root, Phase::Post, broken).unwrap();
    let observer: SharedListener = shared(Recorder::default());
    let manager =
        HierarchySubscription::install(&arena, root, observer.clone(), &[Phase::Pre]).unwrap();
    let db = arena.create_node(NodeKind::Database, "db");
    let table = arena.create_node(NodeKind::Table, "orders");
    assert!(arena.insert_children(db, 0, &[table]).unwrap().is_applied());

    let result = arena.insert_children(root, 0, &[db]);

    match result {
        Err(SchemaError::ListenerFault { listener, .. }) => assert_eq!(listener, "broken"),
        other => panic!("expected listener fault, got {:?}", other),
    }
    assert_eq!(arena.parent(db).unwrap(), Some(root));
    assert_eq!(
        arena.subscribed_nodes(&observer, Phase::Pre),
        arena.subtree_ids(root)
    );
    assert_eq!(manager.borrow().attached(), &HashSet::from([root, db, table]));
}
