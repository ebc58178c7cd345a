//! Task listing: resolves declared tasks into display rows without
//! executing anything.

use serde::Serialize;

use crate::context::RunContext;
use crate::resolve::resolve_tasks;
use crate::task::{is_internal, RunMode, Task, TaskType};

/// One listing row per requested task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskListEntry {
    pub name: String,
    pub description: Option<String>,
    pub run_mode: RunMode,
    /// Display names of direct children, empty for leaves.
    pub children: Vec<String>,
    pub valid: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskList {
    pub entries: Vec<TaskListEntry>,
}

impl TaskList {
    pub fn invalid_count(&self) -> usize {
        self.entries.iter().filter(|entry| !entry.valid).count()
    }

    pub fn is_all_valid(&self) -> bool {
        self.invalid_count() == 0
    }
}

/// Resolve `names`, or every declared task when `names` is empty, into
/// listing rows. Synthetic internal names are hidden from the
/// all-declared view but still resolvable when asked for explicitly.
pub fn list_tasks<S: AsRef<str>>(names: &[S], ctx: &RunContext) -> TaskList {
    let chosen: Vec<String> = if names.is_empty() {
        ctx.input
            .task_names()
            .filter(|name| !is_internal(name))
            .map(String::from)
            .collect()
    } else {
        names.iter().map(|name| name.as_ref().to_string()).collect()
    };

    let resolved = resolve_tasks(&chosen, ctx);
    TaskList {
        entries: resolved.all.iter().map(entry_for).collect(),
    }
}

fn entry_for(task: &Task) -> TaskListEntry {
    TaskListEntry {
        name: task.task_name.clone(),
        description: task.description.clone(),
        run_mode: task.run_mode,
        children: task.tasks.iter().map(child_summary).collect(),
        valid: task.is_valid(),
        errors: task
            .errors_deep()
            .iter()
            .map(|(name, error)| format!("{}: {}", name, error))
            .collect(),
    }
}

fn child_summary(child: &Task) -> String {
    match child.task_type {
        // Ad-hoc commands read better verbatim than by their base name.
        TaskType::Adaptor => child.raw_input.clone(),
        _ => child.task_name.clone(),
    }
}
