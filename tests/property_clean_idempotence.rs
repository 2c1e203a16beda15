use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use dagwork::dag::TaskSchedState;
use dagwork::observer::ObserverList;
use dagwork::types::{EngineConfig, TaskClassId};
use dagwork::Executor;
use dagwork_test_utils::builders::{ProviderBuilder, TaskBuilder};

// Property 8: running the clean phase a second time is a no-op. Clean
// states are terminal-absorbing exactly like run states, so nothing gets
// cleaned twice.
#[tokio::test]
async fn running_clean_twice_cleans_each_task_exactly_once() {
    dagwork_test_utils::init_tracing();

    let a: TaskClassId = "a".into();
    let b: TaskClassId = "b".into();

    let clean_runs: Arc<Mutex<Vec<TaskClassId>>> = Arc::new(Mutex::new(Vec::new()));

    let definitions: HashMap<_, _> = [
        (
            b.clone(),
            TaskBuilder::new(&[])
                .on_clean({
                    let clean_runs = clean_runs.clone();
                    move |ctx| {
                        let clean_runs = clean_runs.clone();
                        let class = ctx.class().clone();
                        Box::pin(async move {
                            clean_runs.lock().unwrap().push(class);
                            Ok(())
                        })
                    }
                })
                .build(),
        ),
        (
            a.clone(),
            TaskBuilder::new(&[])
                .on_run({
                    let b = b.clone();
                    move |ctx| {
                        let b = b.clone();
                        Box::pin(async move {
                            ctx.request_export(&b, "__unused").await.ok();
                            Ok(())
                        })
                    }
                })
                .on_clean({
                    let clean_runs = clean_runs.clone();
                    move |ctx| {
                        let clean_runs = clean_runs.clone();
                        let class = ctx.class().clone();
                        Box::pin(async move {
                            clean_runs.lock().unwrap().push(class);
                            Ok(())
                        })
                    }
                })
                .build(),
        ),
    ]
    .into_iter()
    .collect();

    let provider = ProviderBuilder::new()
        .with_deps("a", &["b"])
        .with_deps("b", &[])
        .build();

    let executor = Executor::new(definitions, provider, ObserverList::default(), EngineConfig::default());
    executor.execute(a.clone()).await.expect("run should succeed");

    executor.execute_clean(a.clone()).await;
    executor.execute_clean(a.clone()).await;

    let mut runs = clean_runs.lock().unwrap().clone();
    runs.sort();
    let mut expected: Vec<TaskClassId> = vec![a.clone(), b.clone()];
    expected.sort();
    assert_eq!(runs, expected, "each task's clean body must run exactly once total");

    assert_eq!(executor.state_of("a"), Some(TaskSchedState::Completed));
    assert_eq!(executor.state_of("b"), Some(TaskSchedState::Completed));
}
