//! Sequence building integration tests.
//!
//! Resolved task trees flattened into series/parallel item trees:
//! group shapes, sub-task expansion, option merging and uid ordering.

use serde_json::{json, Value};

use quiver::config::RunnerConfig;
use quiver::input::Input;
use quiver::registry::{NamedFactory, TaskRegistry};
use quiver::sequence::{collect_leaves, GroupItem, SequenceItem};
use quiver::task::RunMode;

use crate::fixtures::{recording_factory, PipelineHarness, RunLog};

fn as_group(item: &SequenceItem) -> &GroupItem {
    match item {
        SequenceItem::Group(group) => group,
        SequenceItem::Task(task) => panic!("Expected a group, got leaf {}", task.fn_name),
    }
}

fn leaf_n(leaf: &quiver::sequence::TaskItem) -> i64 {
    leaf.options
        .get("n")
        .and_then(Value::as_i64)
        .expect("leaf should carry an 'n' option")
}

/// Test: Scenario A
/// Given build-all -> [js, css] with wildcard and named selections
/// When flattened for a series run
/// Then the root is one series group over 4 leaves in declaration order
#[test]
fn test_scenario_a_series_shape() {
    let harness = PipelineHarness::new();

    let items = harness.flatten(&["build-all"]);

    assert_eq!(items.len(), 1);
    let root = as_group(&items[0]);
    assert_eq!(root.mode, RunMode::Series);
    assert_eq!(root.task_name, "build-all");

    let leaves = collect_leaves(&items);
    assert_eq!(leaves.len(), 4);
    let order: Vec<_> = leaves
        .iter()
        .map(|leaf| {
            format!(
                "{}/{}",
                leaf.task.base_task_name,
                leaf.sub_task_name.as_deref().unwrap_or("-")
            )
        })
        .collect();
    assert_eq!(
        order,
        vec![
            "moduleA/first",
            "moduleA/second",
            "moduleB/first",
            "moduleB/second"
        ]
    );
    let ns: Vec<_> = leaves.iter().map(|leaf| leaf_n(leaf)).collect();
    assert_eq!(ns, vec![1, 2, 1, 2]);
}

/// Test: Scenario B
/// Given the same input invoked as build-all@p
/// When flattened
/// Then the root group is parallel while both nested groups stay series
#[test]
fn test_scenario_b_parallel_root_keeps_series_children() {
    let harness = PipelineHarness::new();

    let items = harness.flatten(&["build-all@p"]);

    let root = as_group(&items[0]);
    assert_eq!(root.mode, RunMode::Parallel);
    assert_eq!(root.items.len(), 2);
    for child in &root.items {
        let group = as_group(child);
        assert_eq!(group.mode, RunMode::Series);
        assert_eq!(collect_leaves(&group.items).len(), 2);
    }
}

/// Test: Wildcard expansion size
/// Given a wildcard selection over a two-key options object
/// When flattened
/// Then exactly one leaf per key appears, in declaration order
#[test]
fn test_wildcard_expands_per_options_key() {
    let harness = PipelineHarness::new();

    let items = harness.flatten(&["moduleA:*"]);

    let leaves = collect_leaves(&items);
    assert_eq!(leaves.len(), 2);
    let subs: Vec<_> = leaves
        .iter()
        .map(|leaf| leaf.sub_task_name.as_deref().unwrap())
        .collect();
    assert_eq!(subs, vec!["first", "second"]);
}

/// Test: Named expansion size
/// Given two named sub-task selections
/// When flattened
/// Then one leaf per name appears
#[test]
fn test_named_selection_expands_per_name() {
    let harness = PipelineHarness::new();
    let items = harness.flatten(&["moduleB:first:second"]);
    assert_eq!(collect_leaves(&items).len(), 2);
}

/// Test: Round-trip options
/// Given a bare module reference with no sub-tasks, query or flags
/// When flattened
/// Then one leaf appears whose options equal the module's global options
#[test]
fn test_round_trip_bare_module_options() {
    let harness = PipelineHarness::new();

    let items = harness.flatten(&["moduleA"]);

    let leaves = collect_leaves(&items);
    assert_eq!(leaves.len(), 1);
    let expected = json!({"first": {"n": 1}, "second": {"n": 2}});
    assert_eq!(Value::Object(leaves[0].options.clone()), expected);
}

/// Test: Option merge precedence
/// Given base options, a query value and a flag on one reference
/// When flattened
/// Then query overrides base and flags override query
#[test]
fn test_query_and_flag_merge_precedence() {
    let harness = PipelineHarness::new();

    let items = harness.flatten(&["moduleA:first?n=9&q=1 --q=2 --extra=yes"]);

    let leaves = collect_leaves(&items);
    assert_eq!(leaves.len(), 1);
    let options = &leaves[0].options;
    assert_eq!(options.get("n").and_then(Value::as_i64), Some(9));
    assert_eq!(options.get("q").and_then(Value::as_i64), Some(2));
    assert_eq!(
        options.get("extra").and_then(Value::as_str),
        Some("yes")
    );
}

/// Test: Multi-export modules
/// Given a module exporting a tasks list of three factories
/// When flattened
/// Then each factory becomes its own leaf, named by export position
#[test]
fn test_tasks_list_export_multiplies_leaves() {
    let log: RunLog = Default::default();
    let mut registry = TaskRegistry::new();
    registry.register_many(
        "multi",
        vec![
            recording_factory(&log, "one"),
            NamedFactory::anonymous(quiver::registry::task_fn(|_options, _ctx| async {
                Ok(())
            })),
            recording_factory(&log, "three"),
        ],
    );
    let harness =
        PipelineHarness::custom(Input::new(), registry, RunnerConfig::default(), log);

    let items = harness.flatten(&["multi"]);

    let leaves = collect_leaves(&items);
    let names: Vec<_> = leaves.iter().map(|leaf| leaf.fn_name.as_str()).collect();
    assert_eq!(names, vec!["one", "Anonymous Function 2", "three"]);
}

/// Test: Skip propagation into the sequence
/// Given config.skip covering css
/// When build-all is flattened
/// Then css leaves carry the skip mark and js leaves do not
#[test]
fn test_skip_mark_propagates_to_leaves() {
    let config = RunnerConfig {
        skip: vec!["css".to_string()],
        ..Default::default()
    };
    let harness = PipelineHarness::with_config(config);

    let items = harness.flatten(&["build-all"]);

    let leaves = collect_leaves(&items);
    let skipped: Vec<_> = leaves.iter().map(|leaf| leaf.skipped).collect();
    assert_eq!(skipped, vec![false, false, true, true]);
}

/// Test: Adaptor leaves
/// Given an ad-hoc shell command
/// When flattened
/// Then one leaf appears, named for the adaptor, with empty base options
#[test]
fn test_adaptor_flattens_to_single_leaf() {
    let harness = PipelineHarness::new();

    let items = harness.flatten(&["@sh echo hi"]);

    let leaves = collect_leaves(&items);
    assert_eq!(leaves.len(), 1);
    assert_eq!(leaves[0].fn_name, "sh");
    assert!(leaves[0].options.is_empty());
}
