//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Recording callables that log each invocation
//! - A pipeline harness bundling input, registry and context
//! - Temporary projects with a written TOML input file

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tempfile::TempDir;

use quiver::config::RunnerConfig;
use quiver::context::RunContext;
use quiver::error::Error;
use quiver::input::Input;
use quiver::registry::{task_fn, NamedFactory, TaskRegistry};
use quiver::report::TaskReport;
use quiver::resolve::resolve_tasks;
use quiver::runner::Runner;
use quiver::sequence::{flatten, SequenceItem};
use quiver::task::Task;

/// Shared invocation log. Each callable pushes one entry when it runs.
pub type RunLog = Arc<Mutex<Vec<String>>>;

/// A factory that records `label`, suffixed with the `n` option when
/// present, then succeeds.
pub fn recording_factory(log: &RunLog, label: &str) -> NamedFactory {
    NamedFactory::named(label, record_fn(log, label, false))
}

/// Same as [`recording_factory`] but the callable fails after recording.
pub fn failing_factory(log: &RunLog, label: &str) -> NamedFactory {
    NamedFactory::named(label, record_fn(log, label, true))
}

fn record_fn(log: &RunLog, label: &str, fail: bool) -> quiver::registry::TaskFn {
    let log = log.clone();
    let label = label.to_string();
    task_fn(move |options, _ctx| {
        let log = log.clone();
        let label = label.clone();
        async move {
            let entry = match options.get("n").and_then(Value::as_i64) {
                Some(n) => format!("{}:{}", label, n),
                None => label.clone(),
            };
            log.lock().unwrap().push(entry);
            if fail {
                Err(Error::TaskFailed(label))
            } else {
                Ok(())
            }
        }
    })
}

/// The declared input behind most pipeline tests:
///
/// ```text
/// build-all = [js, css]
/// js        = [moduleA:*]
/// css       = "moduleB:first:second"
/// ```
///
/// with two-keyed options for both modules, so `js` expands by wildcard
/// and `css` by named selection.
pub fn scenario_input() -> Input {
    let mut input = Input::new();
    input.add_task("build-all", json!(["js", "css"]));
    input.add_task("js", json!(["moduleA:*"]));
    input.add_task("css", json!("moduleB:first:second"));
    input.add_options("moduleA", json!({"first": {"n": 1}, "second": {"n": 2}}));
    input.add_options("moduleB", json!({"first": {"n": 1}, "second": {"n": 2}}));
    input
}

/// Test harness bundling a context and the shared invocation log.
pub struct PipelineHarness {
    pub ctx: RunContext,
    pub log: RunLog,
}

impl PipelineHarness {
    /// Harness over [`scenario_input`] with recording modules.
    pub fn new() -> Self {
        Self::with_config(RunnerConfig::default())
    }

    pub fn with_config(config: RunnerConfig) -> Self {
        let log: RunLog = Default::default();
        let mut registry = TaskRegistry::new();
        registry.register("moduleA", recording_factory(&log, "moduleA"));
        registry.register("moduleB", recording_factory(&log, "moduleB"));
        let ctx = RunContext::new(scenario_input(), config).with_registry(registry);
        Self { ctx, log }
    }

    /// Harness over a custom input and registry. Pass the same log the
    /// registry's factories record into, so `entries()` sees them.
    pub fn custom(input: Input, registry: TaskRegistry, config: RunnerConfig, log: RunLog) -> Self {
        Self {
            ctx: RunContext::new(input, config).with_registry(registry),
            log,
        }
    }

    /// Resolve `names` and panic if anything came back invalid.
    pub fn resolve_valid(&self, names: &[&str]) -> Vec<Task> {
        let resolved = resolve_tasks(names, &self.ctx);
        assert!(
            resolved.invalid.is_empty(),
            "Expected all tasks valid, got errors: {:?}",
            resolved.errors()
        );
        resolved.valid
    }

    pub fn flatten(&self, names: &[&str]) -> Vec<SequenceItem> {
        flatten(&self.resolve_valid(names), &self.ctx)
    }

    /// Flatten and run in series, returning the tree and all reports.
    pub async fn run_series(&self, names: &[&str]) -> (Vec<SequenceItem>, Vec<TaskReport>) {
        let items = self.flatten(names);
        let runner = Runner::new(items.clone(), self.ctx.clone()).unwrap();
        let reports = runner.series().collect().await;
        (items, reports)
    }

    /// Flatten and run with a parallel top level.
    pub async fn run_parallel(&self, names: &[&str]) -> (Vec<SequenceItem>, Vec<TaskReport>) {
        let items = self.flatten(names);
        let runner = Runner::new(items.clone(), self.ctx.clone()).unwrap();
        let reports = runner.parallel().collect().await;
        (items, reports)
    }

    /// Snapshot of the invocation log.
    pub fn entries(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

impl Default for PipelineHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// A temporary directory with a written `quiver.toml`.
pub struct TestProject {
    pub temp_dir: TempDir,
    pub input_path: PathBuf,
}

impl TestProject {
    pub fn new(toml: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let input_path = temp_dir.path().join("quiver.toml");
        std::fs::write(&input_path, toml).expect("Failed to write input file");
        Self {
            temp_dir,
            input_path,
        }
    }

    /// Absolute path to a file inside the project directory.
    pub fn file(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    pub fn load(&self) -> (Input, RunnerConfig) {
        quiver::input::load(&self.input_path).expect("Failed to load input file")
    }
}
