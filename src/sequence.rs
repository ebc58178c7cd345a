//! Sequence building: a resolved task tree flattened into executable form.
//!
//! Groups become [`GroupItem`]s carrying their children; leaves become
//! [`TaskItem`]s bound to a concrete callable and fully merged options.
//! Sub-task selection multiplies a leaf into one item per selected key,
//! and a `tasks` list export multiplies again, one item per callable.
//!
//! Every item gets a `seq_uid` at creation: process-unique, monotonic,
//! handed out in pre-order within one flatten pass. It is the only key
//! that ties a runtime report back to its sequence node.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;

use crate::context::RunContext;
use crate::error::Error;
use crate::input::Input;
use crate::options::{child_object, merge_layers, Options};
use crate::registry::{task_fn, ModuleExport, NamedFactory, TaskFn};
use crate::report::TaskStats;
use crate::task::{is_internal, strip_internal_suffix, RunMode, Task, TaskType};

static NEXT_SEQ_UID: AtomicU64 = AtomicU64::new(0);

fn next_seq_uid() -> u64 {
    NEXT_SEQ_UID.fetch_add(1, Ordering::Relaxed)
}

/// One node of the executable sequence tree.
#[derive(Debug, Clone)]
pub enum SequenceItem {
    Group(GroupItem),
    Task(TaskItem),
}

/// A series or parallel grouping of child items. Groups never carry a
/// callable.
#[derive(Debug, Clone)]
pub struct GroupItem {
    pub seq_uid: u64,
    pub mode: RunMode,
    pub task_name: String,
    pub skipped: bool,
    pub items: Vec<SequenceItem>,
}

/// A leaf bound to a callable and its merged options.
#[derive(Clone)]
pub struct TaskItem {
    pub seq_uid: u64,
    /// Display name of the callable, or `Anonymous Function N`.
    pub fn_name: String,
    pub factory: TaskFn,
    /// Snapshot of the originating task, for lookups and reporting only.
    pub task: Task,
    pub options: Options,
    /// Set when this item came from a sub-task key expansion.
    pub sub_task_name: Option<String>,
    pub skipped: bool,
    /// Populated by report decoration after a run, never during one.
    pub stats: Option<TaskStats>,
}

impl fmt::Debug for TaskItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskItem")
            .field("seq_uid", &self.seq_uid)
            .field("fn_name", &self.fn_name)
            .field("task", &self.task.task_name)
            .field("options", &self.options)
            .field("sub_task_name", &self.sub_task_name)
            .field("skipped", &self.skipped)
            .field("stats", &self.stats)
            .finish()
    }
}

impl SequenceItem {
    /// Build a group node. The uid is taken at call time, so hand-built
    /// trees are unique but only `flatten` guarantees pre-order numbering.
    pub fn group(
        mode: RunMode,
        task_name: impl Into<String>,
        skipped: bool,
        items: Vec<SequenceItem>,
    ) -> Self {
        SequenceItem::Group(GroupItem {
            seq_uid: next_seq_uid(),
            mode,
            task_name: task_name.into(),
            skipped,
            items,
        })
    }

    /// Build a leaf node around a factory.
    pub fn task(fn_name: impl Into<String>, factory: TaskFn, task: Task, options: Options) -> Self {
        SequenceItem::Task(TaskItem {
            seq_uid: next_seq_uid(),
            fn_name: fn_name.into(),
            factory,
            skipped: task.skipped,
            task,
            options,
            sub_task_name: None,
            stats: None,
        })
    }

    pub fn seq_uid(&self) -> u64 {
        match self {
            SequenceItem::Group(group) => group.seq_uid,
            SequenceItem::Task(task) => task.seq_uid,
        }
    }

    pub fn is_task(&self) -> bool {
        matches!(self, SequenceItem::Task(_))
    }
}

/// Leaf items of a sequence forest, in traversal order.
pub fn collect_leaves(items: &[SequenceItem]) -> Vec<&TaskItem> {
    let mut out = Vec::new();
    for item in items {
        match item {
            SequenceItem::Task(task) => out.push(task),
            SequenceItem::Group(group) => out.extend(collect_leaves(&group.items)),
        }
    }
    out
}

pub fn count_leaves(items: &[SequenceItem]) -> usize {
    collect_leaves(items).len()
}

/// Resolve the base options object a leaf reads, before per-invocation
/// merging. Order: explicit inline options, then the global options map
/// under the task's declared name (unwrapping a `{options, tasks}` shaped
/// entry), then the internal-suffix-stripped name, then empty.
pub fn resolve_base_options(task: &Task, input: &Input) -> Options {
    if let Some(options) = &task.options {
        return options.clone();
    }

    if let Some(found) = input.options.get(&task.base_task_name) {
        if let Value::Object(map) = found {
            if map.contains_key("options") && map.contains_key("tasks") {
                if let Some(Value::Object(inner)) = map.get("options") {
                    return inner.clone();
                }
            }
            return map.clone();
        }
        return Options::new();
    }

    if is_internal(&task.base_task_name) {
        let stripped = strip_internal_suffix(&task.base_task_name);
        if let Some(Value::Object(map)) = input.options.get(stripped) {
            return map.clone();
        }
    }

    Options::new()
}

/// Flatten resolved tasks into the executable sequence forest.
pub fn flatten(tasks: &[Task], ctx: &RunContext) -> Vec<SequenceItem> {
    let mut out = Vec::new();
    for task in tasks {
        flatten_task(task, ctx, false, &mut out);
    }
    out
}

fn flatten_task(task: &Task, ctx: &RunContext, parent_skipped: bool, out: &mut Vec<SequenceItem>) {
    let skipped = task.skipped || parent_skipped;

    // A task with children is pure structure; only leaves run.
    if task.is_parent() {
        let seq_uid = next_seq_uid();
        let mut items = Vec::new();
        for child in &task.tasks {
            flatten_task(child, ctx, skipped, &mut items);
        }
        out.push(SequenceItem::Group(GroupItem {
            seq_uid,
            mode: task.run_mode,
            task_name: task.task_name.clone(),
            skipped,
            items,
        }));
        return;
    }

    if task.task_type == TaskType::Adaptor {
        let factory = adaptor_factory(task, ctx);
        push_export_items(out, task, &factory, &Options::new(), None, skipped);
        return;
    }

    let base_options = resolve_base_options(task, &ctx.input);
    let export = load_export(task, ctx);

    if task.sub_tasks.is_empty() {
        push_export_items(out, task, &export, &base_options, None, skipped);
        return;
    }

    // One item per selected key. The wildcard takes every key of the
    // base options object in declaration order.
    let keys: Vec<String> = if task.wants_all_sub_tasks() {
        base_options.keys().cloned().collect()
    } else {
        task.sub_tasks.clone()
    };
    for key in keys {
        let child_options = child_object(&base_options, &key);
        push_export_items(out, task, &export, &child_options, Some(key), skipped);
    }
}

/// The callable for an adaptor leaf, named after the adaptor. A sigil
/// with no registered adaptor binds a factory that fails on invocation,
/// so sibling items still build.
fn adaptor_factory(task: &Task, ctx: &RunContext) -> ModuleExport {
    let name = task.adaptor.clone().unwrap_or_default();
    match ctx.adaptors.get(&name) {
        Some(adaptor) => {
            ModuleExport::Single(NamedFactory::named(name.clone(), adaptor.create(task, ctx)))
        }
        None => {
            let display = name.clone();
            ModuleExport::Single(NamedFactory::named(
                display,
                task_fn(move |_options, _ctx| {
                    let name = name.clone();
                    async move { Err(Error::UnknownAdaptor(name)) }
                }),
            ))
        }
    }
}

/// The export behind a module or inline leaf. An unresolvable path binds
/// a factory that reports the missing module when the run reaches it.
fn load_export(task: &Task, ctx: &RunContext) -> ModuleExport {
    let path = task
        .module
        .clone()
        .unwrap_or_else(|| task.base_task_name.clone());
    match ctx.registry.resolve(&path) {
        Some(export) => export,
        None => ModuleExport::Single(NamedFactory::anonymous(task_fn(move |_options, _ctx| {
            let path = path.clone();
            async move { Err(Error::ModuleNotFound(path)) }
        }))),
    }
}

fn push_export_items(
    out: &mut Vec<SequenceItem>,
    task: &Task,
    export: &ModuleExport,
    base_options: &Options,
    sub_task_name: Option<String>,
    skipped: bool,
) {
    let merged = merge_leaf_options(base_options, task);
    match export {
        ModuleExport::Single(factory) => {
            out.push(make_item(task, factory, 0, merged, sub_task_name, skipped));
        }
        ModuleExport::Tasks(factories) => {
            for (index, factory) in factories.iter().enumerate() {
                out.push(make_item(
                    task,
                    factory,
                    index + 1,
                    merged.clone(),
                    sub_task_name.clone(),
                    skipped,
                ));
            }
        }
    }
}

/// Merge order, later wins: base options, inline task options, query
/// pairs, flags.
fn merge_leaf_options(base: &Options, task: &Task) -> Options {
    let mut layers: Vec<&Options> = vec![base];
    if let Some(options) = &task.options {
        layers.push(options);
    }
    layers.push(&task.query);
    layers.push(&task.flags);
    merge_layers(&layers)
}

fn make_item(
    task: &Task,
    factory: &NamedFactory,
    index: usize,
    options: Options,
    sub_task_name: Option<String>,
    skipped: bool,
) -> SequenceItem {
    SequenceItem::Task(TaskItem {
        seq_uid: next_seq_uid(),
        fn_name: factory.display_name(index),
        factory: factory.func.clone(),
        task: task.clone(),
        options,
        sub_task_name,
        skipped,
        stats: None,
    })
}
