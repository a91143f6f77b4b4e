// crates/flowcore/tests/builder_test.rs

use flowcore::{
    flow, input, labels, task_fn, wait, BuildError, Deadline, Flow, FlowKind, NodeTask, RetryPolicy, Spec, Style,
    Timeout, Value,
};
use std::time::Duration;

fn noop() -> Spec {
    Spec::func(|_| async { Ok(Value::Null) })
}

fn child_flow(flow: &Flow, index: usize) -> &Flow {
    flow.children()[index]
        .task
        .as_flow()
        .unwrap_or_else(|| panic!("child {} is not a flow", index))
}

#[test]
fn test_sequence_children_match_entries() {
    let built = flow(vec![noop(), noop(), vec![noop(), noop()].into()]).unwrap();

    assert_eq!(built.style(), Style::Series);
    assert_eq!(built.children().len(), 3);
    assert_eq!(child_flow(&built, 0).children().len(), 1);
    assert!(matches!(child_flow(&built, 0).children()[0].task, NodeTask::Task(_)));

    let nested = child_flow(&built, 2);
    assert_eq!(nested.children().len(), 2);
    assert_eq!(child_flow(nested, 1).children().len(), 1);
}

#[test]
fn test_single_element_sequence_is_unwrapped() {
    let built = flow(vec![noop()]).unwrap();

    assert_eq!(built.children().len(), 1);
    assert!(matches!(built.children()[0].task, NodeTask::Task(_)));
}

#[test]
fn test_single_flow_is_degenerate() {
    let existing = flow(noop()).unwrap();

    assert_eq!(flow(existing.clone()).unwrap_err(), BuildError::DegenerateComposition);
    assert_eq!(
        flow(vec![Spec::from(existing)]).unwrap_err(),
        BuildError::DegenerateComposition
    );
}

#[test]
fn test_keyed_style_follows_dependencies() {
    let parallel = flow(Spec::keyed().entry("foo", noop()).entry("bar", noop())).unwrap();
    assert_eq!(parallel.style(), Style::Parallel);

    let auto = flow(
        Spec::keyed()
            .entry("foo", noop())
            .entry_after("bar", ["foo", "foo"], noop()),
    )
    .unwrap();
    assert_eq!(auto.style(), Style::Auto);
    assert_eq!(auto.children()[1].label.as_deref(), Some("bar"));
    assert_eq!(auto.children()[1].depends, vec!["foo".to_string()]);
}

#[test]
fn test_keyed_validation() {
    let reserved = flow(Spec::keyed().entry("_meta", noop())).unwrap_err();
    assert_eq!(reserved, BuildError::ReservedLabel("_meta".to_string()));

    let duplicate = flow(Spec::keyed().entry("a", noop()).entry("a", noop())).unwrap_err();
    assert_eq!(duplicate, BuildError::DuplicateLabel("a".to_string()));

    let unknown = flow(Spec::keyed().entry_after("a", ["ghost"], noop())).unwrap_err();
    assert_eq!(
        unknown,
        BuildError::UnknownDependency {
            label: "a".to_string(),
            dependency: "ghost".to_string(),
        }
    );

    let cycle = flow(
        Spec::keyed()
            .entry_after("a", ["b"], noop())
            .entry_after("b", ["a"], noop()),
    )
    .unwrap_err();
    assert_eq!(cycle, BuildError::CyclicDependency);

    let itself = flow(Spec::keyed().entry_after("a", ["a"], noop())).unwrap_err();
    assert_eq!(itself, BuildError::CyclicDependency);

    assert!(flow(Spec::keyed().entry_after("a", [labels::INPUT], noop())).is_ok());
}

#[test]
fn test_style_conflict_is_rejected() {
    let auto = flow(
        Spec::keyed()
            .entry("foo", noop())
            .entry_after("bar", ["foo"], noop()),
    )
    .unwrap();

    assert!(matches!(auto.series(), Err(BuildError::StyleConflict { .. })));
    assert!(matches!(auto.parallel(), Err(BuildError::StyleConflict { .. })));
    assert_eq!(auto.auto().style(), Style::Auto);
}

#[test]
fn test_builder_methods_do_not_mutate() {
    let original = flow(vec![noop(), noop()]).unwrap();
    let before = original.settings().clone();

    let changed = original
        .parallel()
        .unwrap()
        .optional()
        .skip()
        .wait(Duration::from_millis(5))
        .retry(RetryPolicy::new(3, Duration::from_millis(1)))
        .timeout(Duration::from_millis(10))
        .unwrap()
        .finalize(task_fn(|_| async { Ok(Value::Null) }));

    assert_eq!(original.settings(), &before);
    assert_eq!(original.style(), Style::Series);
    assert!(original.reducer().is_none());

    assert_eq!(changed.style(), Style::Parallel);
    assert!(changed.settings().optional);
    assert!(changed.settings().skip);
    assert_eq!(changed.settings().wait, Duration::from_millis(5));
    assert!(changed.reducer().is_some());
    assert!(changed.shares_children(&original));

    assert!(!changed.required().settings().optional);
    assert!(changed.settings().optional);
}

#[test]
fn test_zero_timeout_is_rejected() {
    let err = flow(noop()).unwrap().timeout(Duration::ZERO).unwrap_err();
    assert!(matches!(err, BuildError::InvalidSetting { .. }));
}

#[tokio::test]
async fn test_inherit_deadline_never_extends() {
    let own = flow(noop()).unwrap().timeout(Duration::from_secs(5)).unwrap();
    let parent = Deadline::after(Duration::from_millis(50));

    let inherited = own.inherit_deadline(Some(parent));
    assert_eq!(inherited.settings().timeout, Some(Timeout::Deadline(parent)));
    assert_eq!(own.settings().timeout, Some(Timeout::Duration(Duration::from_secs(5))));

    let untouched = own.inherit_deadline(None);
    assert_eq!(untouched.settings().timeout, own.settings().timeout);
}

#[test]
fn test_tasks_replaces_children_and_keeps_settings() {
    let original = flow(vec![noop(), noop()]).unwrap().optional();

    let replaced = original.tasks(vec![noop(), noop(), noop()]).unwrap();
    assert_eq!(replaced.children().len(), 3);
    assert!(replaced.settings().optional);
    assert_eq!(original.children().len(), 2);

    let keyed = Spec::keyed().entry("a", noop()).entry_after("b", ["a"], noop());
    assert!(matches!(original.tasks(keyed.clone()), Err(BuildError::StyleConflict { .. })));
    assert_eq!(original.auto().tasks(keyed).unwrap().children().len(), 2);
}

#[test]
fn test_builtin_kinds() {
    assert_eq!(input().kind(), FlowKind::Input);
    assert_eq!(input().children()[0].depends, vec![labels::INPUT.to_string()]);

    let delay = wait(Duration::from_millis(32));
    assert_eq!(delay.kind(), FlowKind::Wait);
    assert_eq!(delay.settings().wait, Duration::from_millis(32));
}

#[test]
fn test_tree_rendering() {
    let built = flow(
        Spec::keyed()
            .entry("foo", noop())
            .entry_after("bar", ["foo"], noop()),
    )
    .unwrap();

    let expected = "root [auto]:\n    foo [series]:\n        [Function: ]\n    bar [series] (foo):\n        [Function: ]\n";
    assert_eq!(built.tree(), expected);
}
