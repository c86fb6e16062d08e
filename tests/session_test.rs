//! Session lifecycle with the watcher installed on a loaded model

use std::cell::Cell;
use std::path::Path;
use std::rc::Rc;

use rstest::{fixture, rstest};
use schemawatch::builder::SessionBuilder;
use schemawatch::config::WatcherSettings;
use schemawatch::util::testing;
use schemawatch::{Decision, DecisionPrompter, NodeKind, Phase, SchemaSession};

/// Answers with a fixed decision and counts the questions.
struct Counting {
    decision: Decision,
    asked: Rc<Cell<usize>>,
}

impl DecisionPrompter for Counting {
    fn decide(&mut self, _match_count: usize, _label: &str) -> Decision {
        self.asked.set(self.asked.get() + 1);
        self.decision
    }
}

#[fixture]
fn session() -> SchemaSession {
    testing::init_test_setup();
    SessionBuilder::from_path(Path::new("tests/resources/models/sales.toml")).unwrap()
}

fn start(
    session: &mut SchemaSession,
    decision: Decision,
    watch_hierarchy: bool,
) -> Rc<Cell<usize>> {
    let asked = Rc::new(Cell::new(0));
    let settings = WatcherSettings {
        watch_hierarchy,
        ..WatcherSettings::default()
    };
    session
        .start(
            Box::new(Counting {
                decision,
                asked: asked.clone(),
            }),
            &settings,
        )
        .unwrap();
    asked
}

#[rstest]
fn given_started_session_when_proceeding_then_database_removed_and_lineage_cleared(
    mut session: SchemaSession,
) {
    let asked = start(&mut session, Decision::ProceedAndClear, true);
    let source = session.source_root();
    let sales = session.model().find_path(source, "sales").unwrap();
    let order_id = session
        .model()
        .find_path(session.target_root(), "facts/fact_orders/order_id")
        .unwrap();

    let outcome = session.model_mut().remove_children(source, &[sales]).unwrap();

    assert!(outcome.is_applied());
    assert_eq!(asked.get(), 1);
    assert!(session.model().find_path(source, "sales").is_err());
    assert_eq!(session.model().lineage(order_id).unwrap(), None);
}

#[rstest]
fn given_started_session_when_keeping_then_database_stays(mut session: SchemaSession) {
    let asked = start(&mut session, Decision::KeepAndAbort, true);
    let source = session.source_root();
    let sales = session.model().find_path(source, "sales").unwrap();
    let id = session.model().find_path(sales, "orders/id").unwrap();
    let order_id = session
        .model()
        .find_path(session.target_root(), "facts/fact_orders/order_id")
        .unwrap();

    let outcome = session.model_mut().remove_children(source, &[sales]).unwrap();

    assert!(outcome.is_vetoed());
    assert_eq!(asked.get(), 1);
    assert_eq!(session.model().parent(sales).unwrap(), Some(source));
    assert_eq!(session.model().lineage(order_id).unwrap(), Some(id));
}

#[rstest]
fn given_unreferenced_database_when_removing_then_no_question(mut session: SchemaSession) {
    let asked = start(&mut session, Decision::CancelAndAbort, true);
    let source = session.source_root();
    let hr = session.model().find_path(source, "hr").unwrap();

    let outcome = session.model_mut().remove_children(source, &[hr]).unwrap();

    assert!(outcome.is_applied());
    assert_eq!(asked.get(), 0);
}

#[rstest]
#[case(true, true)]
#[case(false, false)]
fn given_nested_removal_when_watching_then_guarded_only_with_hierarchy(
    mut session: SchemaSession,
    #[case] watch_hierarchy: bool,
    #[case] guarded: bool,
) {
    let asked = start(&mut session, Decision::CancelAndAbort, watch_hierarchy);
    let orders = session
        .model()
        .find_path(session.source_root(), "sales/orders")
        .unwrap();
    let id = session.model().find_path(orders, "id").unwrap();

    let outcome = session.model_mut().remove_children(orders, &[id]).unwrap();

    assert_eq!(outcome.is_vetoed(), guarded);
    assert_eq!(asked.get(), usize::from(guarded));
}

#[rstest]
fn given_ended_session_when_removing_then_nothing_guards(mut session: SchemaSession) {
    let asked = start(&mut session, Decision::CancelAndAbort, true);
    session.end();
    let source = session.source_root();
    let sales = session.model().find_path(source, "sales").unwrap();

    let outcome = session.model_mut().remove_children(source, &[sales]).unwrap();

    assert!(outcome.is_applied());
    assert_eq!(asked.get(), 0);
    assert!(!session.is_active());
}

#[rstest]
fn given_table_added_during_session_when_removing_then_guarded(mut session: SchemaSession) {
    let asked = start(&mut session, Decision::KeepAndAbort, true);
    let source = session.source_root();
    let target = session.target_root();
    let hr = session.model().find_path(source, "hr").unwrap();
    let model = session.model_mut();
    let payroll = model.create_node(NodeKind::Table, "payroll");
    let salary = model.create_node(NodeKind::Column, "salary");
    assert!(model.insert_children(payroll, 0, &[salary]).unwrap().is_applied());
    assert!(model.insert_children(hr, 1, &[payroll]).unwrap().is_applied());
    let loaded_at = model.find_path(target, "facts/fact_orders/loaded_at").unwrap();
    assert!(model.set_lineage(loaded_at, Some(salary)).unwrap().is_applied());

    let outcome = session.model_mut().remove_children(hr, &[payroll]).unwrap();

    assert!(outcome.is_vetoed());
    assert_eq!(asked.get(), 1);
    let watcher = session.watcher().unwrap();
    assert!(session.model().is_subscribed(salary, Phase::Pre, &watcher));
}

#[rstest]
fn given_restarted_session_when_removing_then_asked_once(mut session: SchemaSession) {
    let first = start(&mut session, Decision::KeepAndAbort, true);
    let second = start(&mut session, Decision::KeepAndAbort, true);
    let source = session.source_root();
    let sales = session.model().find_path(source, "sales").unwrap();

    let outcome = session.model_mut().remove_children(source, &[sales]).unwrap();

    assert!(outcome.is_vetoed());
    assert_eq!(first.get(), 0);
    assert_eq!(second.get(), 1);
}
