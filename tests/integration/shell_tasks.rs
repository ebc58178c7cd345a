//! Adaptor subprocess integration tests.
//!
//! Real `sh` invocations with trivial commands, environment injection,
//! and the TOML input file loading path.

use serde_json::json;

use quiver::config::RunnerConfig;
use quiver::input::Input;
use quiver::registry::TaskRegistry;
use quiver::report::{count_sequence_errors, decorate_sequence_with_reports, TaskReportType};
use quiver::task::RunMode;

use crate::fixtures::{PipelineHarness, TestProject};

fn shell_harness(input: Input) -> PipelineHarness {
    PipelineHarness::custom(
        input,
        TaskRegistry::new(),
        RunnerConfig::default(),
        Default::default(),
    )
}

/// Test: Shell command execution
/// Given an ad-hoc @sh task touching a file
/// When it runs
/// Then the file exists and the leaf completes cleanly
#[tokio::test]
async fn test_sh_task_runs_command() {
    let project = TestProject::new("");
    let out = project.file("hello.txt");
    let harness = shell_harness(Input::new());

    let command = format!("@sh touch {}", out.display());
    let (items, reports) = harness.run_series(&[command.as_str()]).await;

    assert!(out.exists());
    let decorated = decorate_sequence_with_reports(&items, &reports);
    assert_eq!(count_sequence_errors(&decorated), 0);
}

/// Test: Non-zero exit
/// Given a command that exits 3
/// When it runs
/// Then the leaf reports an error carrying the exit code
#[tokio::test]
async fn test_sh_non_zero_exit_reports_error() {
    let harness = shell_harness(Input::new());

    let (_, reports) = harness.run_series(&["@sh exit 3"]).await;

    let error = reports
        .iter()
        .find(|r| r.kind == TaskReportType::Error)
        .expect("expected an error report");
    assert!(error.stats.errors[0].contains("3"));
}

/// Test: Options flattened into the environment
/// Given a global option reachable by env prefix
/// When a shell task prints the derived variable
/// Then the subprocess saw the option value
#[tokio::test]
async fn test_global_options_reach_subprocess_env() {
    let project = TestProject::new("");
    let out = project.file("env.txt");
    let mut input = Input::new();
    input.add_options("greeting", json!("hello"));
    let harness = shell_harness(input);

    let command = format!("@sh printenv QUIVER_OPTIONS_GREETING > {}", out.display());
    let (items, reports) = harness.run_series(&[command.as_str()]).await;

    let decorated = decorate_sequence_with_reports(&items, &reports);
    assert_eq!(count_sequence_errors(&decorated), 0);
    let content = std::fs::read_to_string(&out).unwrap();
    assert_eq!(content.trim(), "hello");
}

/// Test: Per-task env wins
/// Given a declared task with its own env map
/// When its shell child prints the variable
/// Then the task-level value is what the subprocess saw
#[tokio::test]
async fn test_task_env_applies_to_subprocess() {
    let project = TestProject::new("");
    let out = project.file("stage.txt");
    let mut input = Input::new();
    input.add_task(
        "announce",
        json!({
            "tasks": [format!("@sh printenv STAGE > {}", out.display())],
            "env": {"STAGE": "prod"},
        }),
    );
    let harness = shell_harness(input);

    let (items, reports) = harness.run_series(&["announce"]).await;

    let decorated = decorate_sequence_with_reports(&items, &reports);
    assert_eq!(count_sequence_errors(&decorated), 0);
    let content = std::fs::read_to_string(&out).unwrap();
    assert_eq!(content.trim(), "prod");
}

/// Test: TOML input file
/// Given a written quiver.toml with tasks, options and config tables
/// When it is loaded
/// Then declarations, options and run-wide config all come through
#[test]
fn test_input_file_loads_all_tables() {
    let project = TestProject::new(
        r#"
[tasks]
hello = "@sh echo hi"
build-all = ["hello"]

[tasks.deploy]
tasks = ["hello"]
description = "Say hi, then ship"

[options.moduleA.first]
n = 1

[config]
run-mode = "parallel"
skip = ["css"]
exit-on-error = false
"#,
    );

    let (input, config) = project.load();

    let names: Vec<_> = input.task_names().collect();
    assert_eq!(names, vec!["hello", "build-all", "deploy"]);
    assert!(input.options.contains_key("moduleA"));
    assert_eq!(config.run_mode, RunMode::Parallel);
    assert_eq!(config.skip, vec!["css"]);
    assert!(!config.exit_on_error);
}

/// Test: File-driven run
/// Given a loaded input file declaring shell tasks
/// When the declared group runs
/// Then the run completes with every leaf accounted for
#[tokio::test]
async fn test_run_from_input_file() {
    let project = TestProject::new(
        r#"
[tasks]
noop = "@sh true"
all = ["noop", "@sh true"]
"#,
    );
    let (input, config) = project.load();
    let harness = PipelineHarness::custom(input, TaskRegistry::new(), config, Default::default());

    let (items, reports) = harness.run_series(&["all"]).await;

    let decorated = decorate_sequence_with_reports(&items, &reports);
    assert_eq!(count_sequence_errors(&decorated), 0);
    assert_eq!(
        reports
            .iter()
            .filter(|r| r.kind == TaskReportType::End)
            .count(),
        2
    );
}
