//! Callable registry: module paths mapped to runnable factories.
//!
//! Task references that name neither a declared task nor an adaptor are
//! looked up here. An export is either a single factory or a `tasks` list
//! of factories that the sequence builder multiplies into one leaf each.
//! Inline closures get a generated `<base>_internal_fn_<n>` path so the
//! options chain can fall back to the base name.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::context::RunContext;
use crate::error::Result;
use crate::options::Options;
use crate::task::INTERNAL_FN_MARKER;

/// A runnable task body. Receives the merged options for its sequence
/// leaf and the run context; resolves when the work is done.
pub type TaskFn =
    Arc<dyn Fn(Options, RunContext) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Wrap an async closure as a [`TaskFn`].
pub fn task_fn<F, Fut>(f: F) -> TaskFn
where
    F: Fn(Options, RunContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |options, ctx| Box::pin(f(options, ctx)))
}

/// A factory plus the name it was exported under, if any.
#[derive(Clone)]
pub struct NamedFactory {
    pub name: Option<String>,
    pub func: TaskFn,
}

impl NamedFactory {
    pub fn named(name: impl Into<String>, func: TaskFn) -> Self {
        Self {
            name: Some(name.into()),
            func,
        }
    }

    pub fn anonymous(func: TaskFn) -> Self {
        Self { name: None, func }
    }

    /// Display name for reports. Anonymous factories fall back to
    /// `Anonymous Function <index>`; callers pass 0 for a single export
    /// and 1-based positions for `tasks` lists.
    pub fn display_name(&self, index: usize) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("Anonymous Function {}", index),
        }
    }
}

impl fmt::Debug for NamedFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedFactory")
            .field("name", &self.name)
            .field("func", &"<task fn>")
            .finish()
    }
}

/// What a module path resolves to.
#[derive(Debug, Clone)]
pub enum ModuleExport {
    /// One factory, one sequence leaf.
    Single(NamedFactory),
    /// A `tasks` list: every factory becomes its own leaf.
    Tasks(Vec<NamedFactory>),
}

impl ModuleExport {
    pub fn factories(&self) -> &[NamedFactory] {
        match self {
            ModuleExport::Single(factory) => std::slice::from_ref(factory),
            ModuleExport::Tasks(factories) => factories,
        }
    }

    pub fn is_multi(&self) -> bool {
        matches!(self, ModuleExport::Tasks(_))
    }
}

/// Resolves module paths to exports. The resolver never loads code at
/// flatten time; everything runnable is registered up front.
pub trait CallableResolver: Send + Sync {
    fn resolve(&self, path: &str) -> Option<ModuleExport>;

    fn contains(&self, path: &str) -> bool {
        self.resolve(path).is_some()
    }
}

/// The static in-process resolver.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    exports: HashMap<String, ModuleExport>,
    inline_counter: u64,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a single factory under `path`.
    pub fn register(&mut self, path: impl Into<String>, factory: NamedFactory) -> &mut Self {
        self.exports
            .insert(path.into(), ModuleExport::Single(factory));
        self
    }

    /// Register a `tasks` list under `path`.
    pub fn register_many(
        &mut self,
        path: impl Into<String>,
        factories: Vec<NamedFactory>,
    ) -> &mut Self {
        self.exports
            .insert(path.into(), ModuleExport::Tasks(factories));
        self
    }

    /// Register an inline closure against `base` and return the generated
    /// path. The path carries the internal marker, so the task shows up
    /// as an inline function and reads options declared for `base`.
    pub fn register_inline(&mut self, base: &str, func: TaskFn) -> String {
        let path = format!("{}{}{}", base, INTERNAL_FN_MARKER, self.inline_counter);
        self.inline_counter += 1;
        self.exports
            .insert(path.clone(), ModuleExport::Single(NamedFactory::anonymous(func)));
        path
    }
}

impl CallableResolver for TaskRegistry {
    fn resolve(&self, path: &str) -> Option<ModuleExport> {
        self.exports.get(path).cloned()
    }
}
