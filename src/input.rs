//! Input declarations: the `[tasks]` and `[options]` maps a run starts from.
//!
//! Task values are loosely shaped on disk (a reference string, an array of
//! children, or an object literal); [`TaskDef::from_value`] normalizes them
//! and reports the reason when a shape is not usable, which the resolver
//! turns into an `InvalidTaskFormat` diagnostic rather than an abort.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::config::RunnerConfig;
use crate::error::{Error, Result};
use crate::options::Options;
use crate::task::RunMode;

/// Declared tasks and global options for one run.
#[derive(Debug, Clone, Default)]
pub struct Input {
    /// Task name to raw declaration value, in declaration order.
    pub tasks: Map<String, Value>,
    /// Global options keyed by task name.
    pub options: Options,
}

impl Input {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a task under `name`. Accepts any JSON shape; validation
    /// happens at resolve time.
    pub fn add_task(&mut self, name: impl Into<String>, value: Value) -> &mut Self {
        self.tasks.insert(name.into(), value);
        self
    }

    /// Declare global options under `name`.
    pub fn add_options(&mut self, name: impl Into<String>, value: Value) -> &mut Self {
        self.options.insert(name.into(), value);
        self
    }

    /// Declared task names in declaration order.
    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(String::as_str)
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }
}

/// On-disk shape of an input file: `[tasks]`, `[options]`, `[config]`.
#[derive(Debug, Deserialize)]
struct InputFile {
    #[serde(default)]
    tasks: Map<String, Value>,
    #[serde(default)]
    options: Options,
    #[serde(default)]
    config: RunnerConfig,
}

/// Load an input file (TOML) into an [`Input`] plus its run configuration.
pub fn load(path: &Path) -> Result<(Input, RunnerConfig)> {
    if !path.exists() {
        return Err(Error::InputNotFound(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path)?;
    let file: InputFile = toml::from_str(&text)?;
    Ok((
        Input {
            tasks: file.tasks,
            options: file.options,
        },
        file.config,
    ))
}

/// A normalized task declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskDef {
    /// A single reference: another task name, a module path, or an
    /// adaptor command.
    Ref(String),
    /// An ordered list of child declarations.
    Seq(Vec<TaskDef>),
    /// An object literal with tasks/input/options/env metadata.
    Detail(TaskDetail),
}

/// The object-literal task shape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskDetail {
    /// Child declarations from the `tasks` key.
    pub tasks: Vec<TaskDef>,
    /// Single child reference from the `input` key.
    pub input: Option<String>,
    /// Inline options inherited by children that declare none.
    pub options: Option<Options>,
    /// Environment applied to adaptor subprocesses under this task.
    pub env: BTreeMap<String, String>,
    pub description: Option<String>,
    pub run_mode: Option<RunMode>,
}

impl TaskDef {
    /// Normalize a raw declaration value. The error string is the reason a
    /// shape was rejected, suitable for an `InvalidTaskFormat` diagnostic.
    pub fn from_value(value: &Value) -> std::result::Result<Self, String> {
        match value {
            Value::String(s) if !s.trim().is_empty() => Ok(TaskDef::Ref(s.clone())),
            Value::String(_) => Err("empty task reference".to_string()),
            Value::Array(items) => {
                let mut defs = Vec::with_capacity(items.len());
                for item in items {
                    match TaskDef::from_value(item)? {
                        TaskDef::Seq(_) => {
                            return Err("nested arrays are not valid task declarations".to_string())
                        }
                        def => defs.push(def),
                    }
                }
                Ok(TaskDef::Seq(defs))
            }
            Value::Object(map) => TaskDetail::from_map(map).map(TaskDef::Detail),
            other => Err(format!(
                "expected a string, array, or object, got {}",
                type_name(other)
            )),
        }
    }
}

impl TaskDetail {
    fn from_map(map: &Map<String, Value>) -> std::result::Result<Self, String> {
        let mut detail = TaskDetail::default();

        if let Some(tasks) = map.get("tasks") {
            match tasks {
                Value::String(s) if !s.trim().is_empty() => {
                    detail.tasks.push(TaskDef::Ref(s.clone()));
                }
                Value::Array(items) => {
                    for item in items {
                        match TaskDef::from_value(item)? {
                            TaskDef::Seq(_) => {
                                return Err(
                                    "nested arrays are not valid task declarations".to_string()
                                )
                            }
                            def => detail.tasks.push(def),
                        }
                    }
                }
                other => {
                    return Err(format!(
                        "'tasks' must be a string or array, got {}",
                        type_name(other)
                    ))
                }
            }
        }

        if let Some(input) = map.get("input") {
            match input {
                Value::String(s) if !s.trim().is_empty() => detail.input = Some(s.clone()),
                other => {
                    return Err(format!(
                        "'input' must be a non-empty string, got {}",
                        type_name(other)
                    ))
                }
            }
        }

        if let Some(options) = map.get("options") {
            match options {
                Value::Object(opts) => detail.options = Some(opts.clone()),
                other => {
                    return Err(format!(
                        "'options' must be an object, got {}",
                        type_name(other)
                    ))
                }
            }
        }

        if let Some(env) = map.get("env") {
            let Value::Object(pairs) = env else {
                return Err(format!("'env' must be an object, got {}", type_name(env)));
            };
            for (key, value) in pairs {
                let text = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    other => {
                        return Err(format!(
                            "env var '{}' must be a scalar, got {}",
                            key,
                            type_name(other)
                        ))
                    }
                };
                detail.env.insert(key.clone(), text);
            }
        }

        if let Some(description) = map.get("description") {
            match description {
                Value::String(s) => detail.description = Some(s.clone()),
                other => {
                    return Err(format!(
                        "'description' must be a string, got {}",
                        type_name(other)
                    ))
                }
            }
        }

        if let Some(run_mode) = map.get("runMode").or_else(|| map.get("run-mode")) {
            detail.run_mode = Some(
                serde_json::from_value(run_mode.clone())
                    .map_err(|_| "'runMode' must be \"series\" or \"parallel\"".to_string())?,
            );
        }

        if detail.tasks.is_empty() && detail.input.is_none() {
            return Err("object task needs a 'tasks' or 'input' key".to_string());
        }

        Ok(detail)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
