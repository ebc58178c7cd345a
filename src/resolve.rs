//! Task resolution: requested names become a validated task tree.
//!
//! Each name is classified by syntax: an `@` sigil routes to an adaptor, a
//! declared name expands recursively into a group, anything else is looked
//! up in the callable registry. Unresolvable or malformed references
//! produce invalid nodes that stay in the tree, so diagnostics can render
//! everything the user asked for. Nothing here executes or touches disk.

use crate::context::RunContext;
use crate::input::{TaskDef, TaskDetail};
use crate::options::lookup_path;
use crate::parse::{self, AdaptorInput, ParsedName};
use crate::qlog_debug;
use crate::sequence::resolve_base_options;
use crate::task::{is_internal, strip_internal_suffix, Task, TaskError, TaskType, Tasks};

/// Resolve requested names in order. Duplicates are kept; the same task
/// requested twice runs twice.
pub fn resolve_tasks<S: AsRef<str>>(names: &[S], ctx: &RunContext) -> Tasks {
    let mut stack = Vec::new();
    let mut all: Vec<Task> = names
        .iter()
        .map(|name| resolve_one(name.as_ref(), ctx, &mut stack))
        .collect();
    // Validation runs after the tree is complete so inline options from
    // enclosing object literals are visible to the lookup.
    for task in &mut all {
        validate_sub_tasks(task, ctx);
    }
    let tasks = Tasks::from_all(all);
    qlog_debug!(
        "Resolved {} task(s): {} valid, {} invalid",
        tasks.all.len(),
        tasks.valid.len(),
        tasks.invalid.len()
    );
    tasks
}

fn resolve_one(raw: &str, ctx: &RunContext, stack: &mut Vec<String>) -> Task {
    let parsed = match parse::parse(raw) {
        Ok(parsed) => parsed,
        Err(reason) => {
            return Task::new(raw, TaskType::ExternalModule)
                .with_error(TaskError::InvalidTaskFormat { reason })
        }
    };

    if let Some(adaptor) = &parsed.adaptor {
        return resolve_adaptor(&parsed, adaptor, ctx);
    }

    if ctx.input.is_declared(&parsed.base) {
        return resolve_declared(&parsed, ctx, stack);
    }

    if ctx.registry.contains(&parsed.base) {
        return resolve_callable(&parsed, ctx);
    }

    let mut task = Task::new(raw, TaskType::ExternalModule);
    task.base_task_name = parsed.base.clone();
    task.with_error(TaskError::ModuleNotFound {
        path: parsed.base.clone(),
    })
}

fn resolve_adaptor(parsed: &ParsedName, input: &AdaptorInput, ctx: &RunContext) -> Task {
    let mut task = Task::new(parsed.raw.clone(), TaskType::Adaptor);
    task.adaptor = Some(input.name.clone());
    task.command = Some(input.command.clone());

    let Some(adaptor) = ctx.adaptors.get(&input.name) else {
        return task.with_error(TaskError::InvalidTaskFormat {
            reason: format!("unknown adaptor '@{}'", input.name),
        });
    };
    // A missing backing program is a runtime condition, not a user
    // mistake: keep the task, mark it skipped so it still reports.
    if !adaptor.available() || ctx.config.skips(&task.base_task_name) {
        task.skipped = true;
    }
    task
}

fn resolve_declared(parsed: &ParsedName, ctx: &RunContext, stack: &mut Vec<String>) -> Task {
    let base = parsed.base.clone();
    let mut task = Task::new(parsed.raw.clone(), TaskType::Group);
    task.task_name = display_name(parsed);
    task.base_task_name = base.clone();
    task.sub_tasks = parsed.sub_tasks.clone();
    task.query = parsed.query.clone();
    task.flags = parsed.flags.clone();

    if stack.iter().any(|name| name == &base) {
        let mut chain = stack.clone();
        chain.push(base);
        return task.with_error(TaskError::InvalidTaskFormat {
            reason: format!("circular task reference: {}", chain.join(" -> ")),
        });
    }

    let Some(value) = ctx.input.tasks.get(&base) else {
        return task.with_error(TaskError::ModuleNotFound { path: base });
    };
    let def = match TaskDef::from_value(value) {
        Ok(def) => def,
        Err(reason) => return task.with_error(TaskError::InvalidTaskFormat { reason }),
    };

    stack.push(base.clone());
    match &def {
        TaskDef::Ref(child) => task.tasks.push(resolve_one(child, ctx, stack)),
        TaskDef::Seq(defs) => {
            for def in defs {
                let child = child_from_def(def, ctx, stack);
                task.tasks.push(child);
            }
        }
        TaskDef::Detail(detail) => apply_detail(&mut task, detail, ctx, stack),
    }
    stack.pop();

    // The modifier on the reference wins over the declared run mode.
    if let Some(mode) = parsed.run_mode {
        task.run_mode = mode;
    }
    if ctx.config.skips(&base) {
        task.skipped = true;
    }
    task
}

fn child_from_def(def: &TaskDef, ctx: &RunContext, stack: &mut Vec<String>) -> Task {
    match def {
        TaskDef::Ref(child) => resolve_one(child, ctx, stack),
        TaskDef::Detail(detail) if detail.tasks.is_empty() => {
            // `{input, env, options}` inside an array refines one child
            // without introducing a group around it.
            let Some(input) = &detail.input else {
                return Task::new("anonymous", TaskType::Group).with_error(
                    TaskError::InvalidTaskFormat {
                        reason: "object task needs a 'tasks' or 'input' key".to_string(),
                    },
                );
            };
            let mut child = resolve_one(input, ctx, stack);
            overlay_detail(&mut child, detail);
            child
        }
        TaskDef::Detail(detail) => {
            let mut group = Task::new("anonymous", TaskType::Group);
            apply_detail(&mut group, detail, ctx, stack);
            group
        }
        TaskDef::Seq(_) => Task::new("anonymous", TaskType::Group).with_error(
            TaskError::InvalidTaskFormat {
                reason: "nested arrays are not valid task declarations".to_string(),
            },
        ),
    }
}

/// Merge an object literal's metadata onto a declared group node and
/// resolve its children.
fn apply_detail(task: &mut Task, detail: &TaskDetail, ctx: &RunContext, stack: &mut Vec<String>) {
    if let Some(mode) = detail.run_mode {
        task.run_mode = mode;
    }
    if task.description.is_none() {
        task.description = detail.description.clone();
    }

    if detail.tasks.is_empty() {
        if let Some(input) = &detail.input {
            task.tasks.push(resolve_one(input, ctx, stack));
        }
    } else {
        for def in &detail.tasks {
            let child = child_from_def(def, ctx, stack);
            task.tasks.push(child);
        }
    }

    for (key, value) in &detail.env {
        task.env
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
    for child in &mut task.tasks {
        inherit_env(child, &detail.env);
        if child.options.is_none() {
            child.options = detail.options.clone();
        }
    }
}

/// Apply `{input, env, options}` refinements to an already-resolved child.
fn overlay_detail(child: &mut Task, detail: &TaskDetail) {
    inherit_env(child, &detail.env);
    if child.options.is_none() {
        child.options = detail.options.clone();
    }
    if child.description.is_none() {
        child.description = detail.description.clone();
    }
}

/// Env pairs flow down to every descendant; existing keys win.
fn inherit_env(
    task: &mut Task,
    env: &std::collections::BTreeMap<String, String>,
) {
    for (key, value) in env {
        task.env
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
    for child in &mut task.tasks {
        inherit_env(child, env);
    }
}

fn resolve_callable(parsed: &ParsedName, ctx: &RunContext) -> Task {
    let base = parsed.base.clone();
    let task_type = if is_internal(&base) {
        TaskType::InlineFunction
    } else {
        TaskType::ExternalModule
    };
    let mut task = Task::new(parsed.raw.clone(), task_type);
    task.task_name = display_name(parsed);
    task.base_task_name = base.clone();
    task.module = Some(base.clone());
    task.sub_tasks = parsed.sub_tasks.clone();
    task.query = parsed.query.clone();
    task.flags = parsed.flags.clone();
    if let Some(mode) = parsed.run_mode {
        task.run_mode = mode;
    }
    if ctx.config.skips(&base) || ctx.config.skips(strip_internal_suffix(&base)) {
        task.skipped = true;
    }
    task
}

/// Named sub-tasks must exist in the options their leaf will read.
/// Wildcards take whatever keys are there, including none.
fn validate_sub_tasks(task: &mut Task, ctx: &RunContext) {
    let needs_check = !task.is_parent()
        && task.task_type != TaskType::Adaptor
        && !task.sub_tasks.is_empty()
        && !task.wants_all_sub_tasks();
    if needs_check {
        let base_options = resolve_base_options(task, &ctx.input);
        let missing: Vec<String> = task
            .sub_tasks
            .iter()
            .filter(|key| lookup_path(&base_options, key).is_none())
            .cloned()
            .collect();
        for name in missing {
            task.errors.push(TaskError::SubtaskNotFound { name });
        }
    }
    for child in &mut task.tasks {
        validate_sub_tasks(child, ctx);
    }
}

fn display_name(parsed: &ParsedName) -> String {
    if parsed.sub_tasks.is_empty() {
        parsed.base.clone()
    } else {
        format!("{}:{}", parsed.base, parsed.sub_tasks.join(":"))
    }
}
