use std::collections::HashMap;
use std::sync::Arc;

use dagwork::registry::{Registry, StartOutcome};
use dagwork::types::{TaskClassId, TaskState};
use dagwork_test_utils::builders::TaskBuilder;

fn registry_with(class: &str) -> (TaskClassId, Registry) {
    let id: TaskClassId = class.into();
    let mut definitions: HashMap<TaskClassId, Arc<dyn dagwork::TaskDefinition>> = HashMap::new();
    definitions.insert(id.clone(), TaskBuilder::new(&[]).build());
    (id, Registry::new(definitions))
}

// Property 1: create_wrapper is idempotent — every call for the same class
// returns the same wrapper, not a fresh one.
#[test]
fn create_wrapper_returns_the_same_instance_every_time() {
    let (class, registry) = registry_with("x");

    let first = registry.create_wrapper(&class);
    let second = registry.create_wrapper(&class);
    let third = registry.get_task(&class).expect("wrapper was created");

    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first, &third));
}

// Property 2: state monotonicity. A wrapper only ever moves
// Pending -> Running -> {Completed | Failed | Skipped}, and once terminal
// never moves again.
#[test]
fn wrapper_state_is_monotonic_and_terminal_states_absorb() {
    let (class, registry) = registry_with("x");
    let wrapper = registry.create_wrapper(&class);

    assert_eq!(wrapper.state(), TaskState::Pending);
    assert!(wrapper.mark_running());
    assert_eq!(wrapper.state(), TaskState::Running);

    wrapper.mark_completed(HashMap::new());
    assert_eq!(wrapper.state(), TaskState::Completed);

    // Terminal: mark_running can never succeed again, and mark_failed after
    // completion (which nothing in the engine actually does, but the type
    // permits) still leaves state queryable rather than panicking.
    assert!(!wrapper.mark_running());
    assert_eq!(wrapper.state(), TaskState::Completed);
}

#[test]
fn skipped_wrapper_never_reports_running_afterwards() {
    let (class, registry) = registry_with("x");
    let wrapper = registry.create_wrapper(&class);

    assert!(wrapper.mark_skipped());
    assert_eq!(wrapper.state(), TaskState::Skipped);
    assert!(!wrapper.mark_running(), "a skipped task must never start running");
    assert!(!wrapper.mark_skipped(), "mark_skipped is only true the first time");
}

// Property 3: single dispatch. Of N concurrent callers racing `Registry::start`
// for the same class, exactly one gets `StartOutcome::Won`.
#[tokio::test]
async fn exactly_one_racer_wins_start() {
    let (class, registry) = registry_with("x");
    let registry = Arc::new(registry);

    let mut handles = Vec::new();
    for _ in 0..16 {
        let registry = registry.clone();
        let class = class.clone();
        handles.push(tokio::spawn(async move { registry.start(&class) }));
    }

    let mut wins = 0;
    let mut losses = 0;
    for h in handles {
        match h.await.unwrap().unwrap() {
            StartOutcome::Won { .. } => wins += 1,
            StartOutcome::Lost(_) => losses += 1,
        }
    }

    assert_eq!(wins, 1, "exactly one racer should win the dispatch");
    assert_eq!(losses, 15);
}
