use dagwork::dag::{Scheduler, TaskSchedState};
use dagwork::types::TaskClassId;
use dagwork_test_utils::builders::ProviderBuilder;

// Root depends on A (which it actually dispatches and drains) and on
// Branch->Leaf (a subtree a caller simply never gets around to asking the
// scheduler for). Once the caller decides the phase is done, anything
// still `Pending` — Branch and Leaf, neither ever started — is converted
// to `Skipped` in one pass, and nothing claims to have run them.
#[test]
fn mark_unreached_as_skipped_converts_untouched_pending_nodes() {
    let root: TaskClassId = "root".into();
    let a: TaskClassId = "a".into();
    let branch: TaskClassId = "branch".into();
    let leaf: TaskClassId = "leaf".into();

    let provider = ProviderBuilder::new()
        .with_deps("root", &["a", "branch"])
        .with_deps("a", &[])
        .with_deps("branch", &["leaf"])
        .with_deps("leaf", &[])
        .build();

    let mut scheduler = Scheduler::new();
    scheduler
        .build_dependency_graph(&root, provider.as_ref())
        .expect("acyclic");

    // The caller only ever drives the `a` branch to completion; it never
    // asks the scheduler about `branch` or `leaf` again, the way an
    // executor would if nothing ever called `request_export` on them.
    assert_eq!(scheduler.state_of("a"), Some(TaskSchedState::Pending));
    scheduler.mark_enqueued(&a);
    scheduler.mark_completed(&a);

    assert_eq!(scheduler.state_of("branch"), Some(TaskSchedState::Pending));
    assert_eq!(scheduler.state_of("leaf"), Some(TaskSchedState::Pending));
    assert_eq!(scheduler.state_of("root"), Some(TaskSchedState::Pending));

    let unreached = scheduler.mark_unreached_as_skipped();
    let mut unreached_classes: Vec<String> = unreached.iter().map(|c| c.to_string()).collect();
    unreached_classes.sort();
    assert_eq!(unreached_classes, vec!["branch", "leaf", "root"]);

    assert_eq!(scheduler.state_of("a"), Some(TaskSchedState::Completed));
    assert_eq!(scheduler.state_of("branch"), Some(TaskSchedState::Skipped));
    assert_eq!(scheduler.state_of("leaf"), Some(TaskSchedState::Skipped));
    assert_eq!(scheduler.state_of("root"), Some(TaskSchedState::Skipped));

    // Idempotent: nothing left to convert on a second call.
    assert!(scheduler.mark_unreached_as_skipped().is_empty());
}
