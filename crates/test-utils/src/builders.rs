#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use dagwork::errors::TaskError;
use dagwork::provider::DependencyProvider;
use dagwork::task_api::{BoxFuture, TaskContext, TaskDefinition, TaskInstance};
use dagwork::types::TaskClassId;

type RunFn = Arc<dyn for<'a> Fn(&'a TaskContext) -> BoxFuture<'a, Result<(), TaskError>> + Send + Sync>;

fn noop_run() -> RunFn {
    Arc::new(|_ctx| Box::pin(async { Ok(()) }))
}

/// Builder for a fake [`TaskDefinition`] whose `run`/`clean` bodies are
/// supplied as closures, to avoid hand-writing a `TaskDefinition` impl per
/// test task.
pub struct TaskBuilder {
    exports: Vec<String>,
    run: RunFn,
    clean: Option<RunFn>,
}

impl TaskBuilder {
    pub fn new(exports: &[&str]) -> Self {
        Self {
            exports: exports.iter().map(|s| s.to_string()).collect(),
            run: noop_run(),
            clean: None,
        }
    }

    pub fn on_run<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(&'a TaskContext) -> BoxFuture<'a, Result<(), TaskError>> + Send + Sync + 'static,
    {
        self.run = Arc::new(f);
        self
    }

    pub fn on_clean<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(&'a TaskContext) -> BoxFuture<'a, Result<(), TaskError>> + Send + Sync + 'static,
    {
        self.clean = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> Arc<dyn TaskDefinition> {
        Arc::new(FnTaskDefinition {
            exports: self.exports,
            run: self.run,
            clean: self.clean,
        })
    }
}

struct FnTaskDefinition {
    exports: Vec<String>,
    run: RunFn,
    clean: Option<RunFn>,
}

impl TaskDefinition for FnTaskDefinition {
    fn exports(&self) -> &[String] {
        &self.exports
    }

    fn create_instance(&self) -> Box<dyn TaskInstance> {
        Box::new(FnTaskInstance {
            run: self.run.clone(),
            clean: self.clean.clone(),
        })
    }
}

struct FnTaskInstance {
    run: RunFn,
    clean: Option<RunFn>,
}

impl TaskInstance for FnTaskInstance {
    fn run<'a>(&'a mut self, ctx: &'a TaskContext) -> BoxFuture<'a, Result<(), TaskError>> {
        (self.run)(ctx)
    }

    fn clean<'a>(&'a mut self, ctx: &'a TaskContext) -> BoxFuture<'a, Result<(), TaskError>> {
        match &self.clean {
            Some(f) => f(ctx),
            None => Box::pin(async { Ok(()) }),
        }
    }
}

/// Builder for a fake [`DependencyProvider`] backed by a plain map, fluent
/// the same way the teacher's config builders are.
#[derive(Default)]
pub struct ProviderBuilder {
    deps: HashMap<TaskClassId, Vec<TaskClassId>>,
}

impl ProviderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deps(mut self, class: &str, deps: &[&str]) -> Self {
        self.deps.insert(
            TaskClassId::from(class),
            deps.iter().map(|d| TaskClassId::from(*d)).collect(),
        );
        self
    }

    pub fn build(self) -> Arc<dyn DependencyProvider> {
        Arc::new(MapProvider(self.deps))
    }
}

struct MapProvider(HashMap<TaskClassId, Vec<TaskClassId>>);

impl DependencyProvider for MapProvider {
    fn known_classes(&self) -> Vec<TaskClassId> {
        self.0.keys().cloned().collect()
    }

    fn declared_dependencies(&self, class: &TaskClassId) -> Vec<TaskClassId> {
        self.0.get(class).cloned().unwrap_or_default()
    }
}
