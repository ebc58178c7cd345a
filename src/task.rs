//! Task descriptor model.
//!
//! A [`Task`] is one resolved unit of requested work: a declared group, an
//! adaptor command (`@sh …`), an inline callable, or an external module
//! reference. The resolver builds a tree of these per invocation; the
//! sequence builder consumes the tree. Invalid nodes are kept in the tree
//! with their diagnostics attached so reports can render everything that
//! was requested, not just what resolved.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::options::Options;

/// Marker embedded in synthetic names generated for inline callables.
pub const INTERNAL_FN_MARKER: &str = "_internal_fn_";

/// Matches a synthetic inline-callable name and captures the declared base.
static INTERNAL_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)_internal_fn_\d+$").unwrap());

/// True for synthetic names generated from inline callables. These are
/// runnable but hidden from user-facing listings.
pub fn is_internal(name: &str) -> bool {
    name.contains(INTERNAL_FN_MARKER)
}

/// Strip the internal-callable suffix, yielding the name the user declared.
/// Names without the suffix pass through unchanged.
pub fn strip_internal_suffix(name: &str) -> &str {
    match INTERNAL_NAME_RE.captures(name) {
        Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or(name),
        None => name,
    }
}

/// How a task was classified during resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Declared name with child tasks.
    Group,
    /// Routed to an adaptor (`@sh`, `@npm`).
    Adaptor,
    /// Synthetic name bound to an inline callable.
    InlineFunction,
    /// Module path resolved through the callable resolver.
    ExternalModule,
}

/// Sequencing discipline for a node's children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    #[default]
    Series,
    Parallel,
}

/// A diagnostic attached to an invalid task node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskError {
    /// A named sub-task key has no matching entry in the task's options.
    SubtaskNotFound { name: String },
    /// The name matched no declared task and no registered module.
    ModuleNotFound { path: String },
    /// The name could not be understood (bad syntax, unknown adaptor,
    /// circular reference, malformed declaration).
    InvalidTaskFormat { reason: String },
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::SubtaskNotFound { name } => {
                write!(f, "sub-task '{}' not found in options", name)
            }
            TaskError::ModuleNotFound { path } => write!(f, "module '{}' not found", path),
            TaskError::InvalidTaskFormat { reason } => write!(f, "invalid task: {}", reason),
        }
    }
}

/// One resolved unit of requested work, possibly a group.
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    /// Name as requested, sub-task and modifier syntax included.
    pub task_name: String,
    /// Name with adaptor/sub-task/modifier syntax stripped.
    pub base_task_name: String,
    /// The original input string, untouched.
    pub raw_input: String,
    pub task_type: TaskType,
    /// Discipline applied to `tasks`; meaningless for leaves.
    pub run_mode: RunMode,
    /// Ordered children; empty for leaves.
    pub tasks: Vec<Task>,
    /// Sub-keys selected within the options object. `["*"]` selects all.
    pub sub_tasks: Vec<String>,
    /// Inline options declared on the task itself.
    pub options: Option<Options>,
    /// Options parsed from `?key=value` syntax.
    pub query: Options,
    /// Options parsed from `--flag` syntax.
    pub flags: Options,
    /// Adaptor identifier for adaptor tasks (`sh`, `npm`).
    pub adaptor: Option<String>,
    /// Command text following the adaptor sigil.
    pub command: Option<String>,
    /// Callable-resolver key for module and inline leaves.
    pub module: Option<String>,
    /// Environment applied to adaptor subprocesses spawned for this task.
    pub env: BTreeMap<String, String>,
    /// Optional human description shown by the listing command.
    pub description: Option<String>,
    /// Marked when runtime conditions mean the task must not execute but
    /// should still appear in reports.
    pub skipped: bool,
    /// Diagnostics; non-empty makes this node (and its tree) invalid.
    pub errors: Vec<TaskError>,
}

impl Task {
    /// A task with the given name used for identity, base, and raw input.
    pub fn new(name: impl Into<String>, task_type: TaskType) -> Self {
        let name = name.into();
        Self {
            base_task_name: name.clone(),
            raw_input: name.clone(),
            task_name: name,
            task_type,
            run_mode: RunMode::Series,
            tasks: Vec::new(),
            sub_tasks: Vec::new(),
            options: None,
            query: Options::new(),
            flags: Options::new(),
            adaptor: None,
            command: None,
            module: None,
            env: BTreeMap::new(),
            description: None,
            skipped: false,
            errors: Vec::new(),
        }
    }

    /// Attach a diagnostic, marking the node invalid.
    pub fn with_error(mut self, error: TaskError) -> Self {
        self.errors.push(error);
        self
    }

    /// True when this node and every descendant carries no diagnostics.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty() && self.tasks.iter().all(Task::is_valid)
    }

    /// True when the node has children to sequence.
    pub fn is_parent(&self) -> bool {
        !self.tasks.is_empty()
    }

    /// True when the first sub-task token is the wildcard.
    pub fn wants_all_sub_tasks(&self) -> bool {
        self.sub_tasks.first().map(String::as_str) == Some("*")
    }

    /// All diagnostics in the subtree, paired with the owning task name,
    /// in pre-order.
    pub fn errors_deep(&self) -> Vec<(String, TaskError)> {
        let mut out = Vec::new();
        self.collect_errors(&mut out);
        out
    }

    fn collect_errors(&self, out: &mut Vec<(String, TaskError)>) {
        for error in &self.errors {
            out.push((self.task_name.clone(), error.clone()));
        }
        for child in &self.tasks {
            child.collect_errors(out);
        }
    }
}

/// Resolver output: every requested task plus the valid/invalid partition.
///
/// A top-level task lands in `invalid` when any node of its subtree carries
/// a diagnostic; `all` preserves request order and duplicates.
#[derive(Debug, Clone, Serialize)]
pub struct Tasks {
    pub all: Vec<Task>,
    pub valid: Vec<Task>,
    pub invalid: Vec<Task>,
}

impl Tasks {
    /// Partition resolved top-level tasks by deep validity.
    pub fn from_all(all: Vec<Task>) -> Self {
        let valid = all.iter().filter(|t| t.is_valid()).cloned().collect();
        let invalid = all.iter().filter(|t| !t.is_valid()).cloned().collect();
        Self { all, valid, invalid }
    }

    /// All diagnostics across the invalid tasks, in request order.
    pub fn errors(&self) -> Vec<(String, TaskError)> {
        self.invalid.iter().flat_map(Task::errors_deep).collect()
    }
}
