use dagwork::dag::{Scheduler, TaskSchedState};
use dagwork::types::TaskClassId;
use dagwork_test_utils::builders::ProviderBuilder;

// Property 6: after a runtime-discovered dependency is merged, the
// scheduler's node set is closed under the provider's declared-dependency
// function — not just the one edge that was merged, but its whole
// transitive closure, and the new nodes start out `Pending`.
#[test]
fn merge_runtime_dependency_closes_the_graph_transitively() {
    let root: TaskClassId = "root".into();
    let discovered: TaskClassId = "discovered".into();
    let tail: TaskClassId = "tail".into();

    // `discovered` and its own dependency `tail` are known to the provider
    // but never reachable from `root`'s statically declared edges, so the
    // initial build never touches them.
    let provider = ProviderBuilder::new()
        .with_deps("root", &[])
        .with_deps("discovered", &["tail"])
        .with_deps("tail", &[])
        .build();

    let mut scheduler = Scheduler::new();
    scheduler
        .build_dependency_graph(&root, provider.as_ref())
        .expect("acyclic");

    assert_eq!(scheduler.state_of("discovered"), None);
    assert_eq!(scheduler.state_of("tail"), None);

    let added = scheduler
        .merge_runtime_dependency(&root, &discovered, provider.as_ref())
        .expect("acyclic");

    let mut added_classes: Vec<String> = added.iter().map(|c| c.to_string()).collect();
    added_classes.sort();
    assert_eq!(
        added_classes,
        vec!["discovered", "tail"],
        "merging root->discovered must also pull in discovered's own declared deps"
    );

    assert_eq!(scheduler.state_of("discovered"), Some(TaskSchedState::Pending));
    assert_eq!(scheduler.state_of("tail"), Some(TaskSchedState::Pending));
    assert!(scheduler.graph().dependencies_of("root").contains(&discovered));
    assert!(scheduler.graph().dependencies_of("discovered").contains(&tail));

    // Merging the same edge again must not re-add or reset anything.
    let added_again = scheduler
        .merge_runtime_dependency(&root, &discovered, provider.as_ref())
        .expect("acyclic");
    assert!(added_again.is_empty(), "re-merging an already-known edge adds nothing new");
}

// A cycle introduced purely through runtime-discovered edges must still be
// rejected, the same as a cycle in the statically declared graph.
#[test]
fn merge_runtime_dependency_rejects_a_cycle() {
    let a: TaskClassId = "a".into();
    let b: TaskClassId = "b".into();

    let provider = ProviderBuilder::new()
        .with_deps("a", &[])
        .with_deps("b", &[])
        .build();

    let mut scheduler = Scheduler::new();
    scheduler.build_dependency_graph(&a, provider.as_ref()).expect("acyclic");
    scheduler.build_dependency_graph(&b, provider.as_ref()).expect("acyclic");

    scheduler
        .merge_runtime_dependency(&a, &b, provider.as_ref())
        .expect("a->b introduces no cycle yet");

    let result = scheduler.merge_runtime_dependency(&b, &a, provider.as_ref());
    assert!(result.is_err(), "b->a closes a cycle with the existing a->b edge");
}
