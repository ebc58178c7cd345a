use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};

use quiver::context::RunContext;
use quiver::list::{list_tasks, TaskList};
use quiver::report::{
    collect_skipped_tasks, count_sequence_errors, decorate_sequence_with_reports, TaskReport,
    TaskReportType,
};
use quiver::resolve::resolve_tasks;
use quiver::runner::Runner;
use quiver::sequence::{collect_leaves, flatten, TaskItem};
use quiver::task::{RunMode, Tasks};
use quiver::{qlog, qlog_debug, Result};

/// Quiver - declarative task runner with series/parallel sequencing
#[derive(Parser, Debug)]
#[command(name = "quiver")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    QUIVER_DEBUG=1    Enable debug logging (alternative to --debug)")]
pub struct Cli {
    /// Input file with [tasks], [options] and optional [config] tables
    #[arg(short = 'i', long, default_value = "quiver.toml")]
    pub input: PathBuf,

    /// Enable debug logging (writes to ~/.quiver/quiver.log)
    #[arg(short = 'd', long)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Task commands for quiver
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Resolve the given task names and run them
    Run {
        /// Task names: declared names, `name:sub` selections, `@sh ...` commands
        #[arg(required = true)]
        tasks: Vec<String>,

        /// Run top-level tasks in parallel instead of series
        #[arg(short = 'p', long)]
        parallel: bool,

        /// Keep going after a failure; the rest of the failed chain is
        /// reported as skipped
        #[arg(long)]
        no_fail: bool,

        /// Base task names to skip (repeatable)
        #[arg(long, value_name = "TASK")]
        skip: Vec<String>,
    },

    /// List declared tasks with descriptions and children
    #[command(alias = "ls")]
    Tasks {
        /// Limit the listing to these names
        names: Vec<String>,

        /// Print the listing as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    quiver::log::init_with_debug(cli.debug);

    match cli.command {
        Some(Command::Run {
            tasks,
            parallel,
            no_fail,
            skip,
        }) => run_tasks(&cli.input, tasks, parallel, no_fail, skip, cli.debug),
        Some(Command::Tasks { names, json }) => run_list(&cli.input, names, json),
        // No subcommand: show what the input file declares.
        None => run_list(&cli.input, Vec::new(), false),
    }
}

/// Resolve, flatten and execute the requested tasks, streaming progress
/// lines as reports arrive and summarizing once the stream completes.
fn run_tasks(
    input_path: &Path,
    names: Vec<String>,
    parallel: bool,
    no_fail: bool,
    skip: Vec<String>,
    debug: bool,
) -> Result<()> {
    qlog!(
        "Run command: tasks={:?}, parallel={}, no_fail={}, skip={:?}",
        names,
        parallel,
        no_fail,
        skip
    );

    let (input, mut config) = quiver::input::load(input_path)?;
    if parallel {
        config.run_mode = RunMode::Parallel;
    }
    if no_fail {
        config.exit_on_error = false;
    }
    config.skip.extend(skip);
    if debug {
        config.debug = true;
    }
    let ctx = RunContext::new(input, config);

    let resolved = resolve_tasks(&names, &ctx);
    if !resolved.invalid.is_empty() {
        print_resolution_errors(&resolved);
        std::process::exit(1);
    }

    let items = flatten(&resolved.valid, &ctx);
    let labels = leaf_labels(&items);
    let started = Instant::now();

    let rt = tokio::runtime::Runtime::new()?;
    let reports = rt.block_on(async {
        let runner = Runner::new(items.clone(), ctx.clone())?;
        let mut stream = match ctx.config.run_mode {
            RunMode::Parallel => runner.parallel(),
            RunMode::Series => runner.series(),
        };
        let mut reports = Vec::new();
        while let Some(report) = stream.next().await {
            render_report(&report, &labels);
            reports.push(report);
        }
        Ok::<_, quiver::Error>(reports)
    })?;

    let decorated = decorate_sequence_with_reports(&items, &reports);
    let errors = count_sequence_errors(&decorated);
    let skipped = collect_skipped_tasks(&decorated).len();
    let total = collect_leaves(&decorated).len();
    let elapsed = started.elapsed();

    println!();
    if errors == 0 {
        println!(
            "\x1b[32mCompleted {} task(s) in {:.2}s\x1b[0m ({} skipped)",
            total,
            elapsed.as_secs_f64(),
            skipped
        );
    } else {
        println!(
            "\x1b[31m{} of {} task(s) failed in {:.2}s\x1b[0m ({} skipped)",
            errors,
            total,
            elapsed.as_secs_f64(),
            skipped
        );
    }
    qlog!(
        "Run summary: {} leaves, {} errors, {} skipped, {:?}",
        total,
        errors,
        skipped,
        elapsed
    );

    if errors > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// List tasks from the input file without executing anything.
fn run_list(input_path: &Path, names: Vec<String>, json: bool) -> Result<()> {
    qlog!("Tasks command: names={:?}, json={}", names, json);

    let (input, config) = quiver::input::load(input_path)?;
    let ctx = RunContext::new(input, config);
    let list = list_tasks(&names, &ctx);

    if json {
        println!("{}", serde_json::to_string_pretty(&list)?);
    } else {
        render_list(input_path, &list);
    }

    if !list.is_all_valid() {
        std::process::exit(1);
    }
    Ok(())
}

fn render_list(input_path: &Path, list: &TaskList) {
    if list.entries.is_empty() {
        println!("No tasks declared in {}", input_path.display());
        return;
    }

    let width = list
        .entries
        .iter()
        .map(|entry| entry.name.len())
        .max()
        .unwrap_or(0);

    println!();
    println!("Tasks in {}:", input_path.display());
    println!();
    for entry in &list.entries {
        let marker = if entry.valid {
            "\x1b[32m✓\x1b[0m"
        } else {
            "\x1b[31m✗\x1b[0m"
        };
        let detail = match &entry.description {
            Some(description) => description.clone(),
            None if !entry.children.is_empty() => format!("[ {} ]", entry.children.join(", ")),
            None => String::new(),
        };
        println!("  {} {:<width$}  {}", marker, entry.name, detail);
        for error in &entry.errors {
            println!("      \x1b[31m{}\x1b[0m", error);
        }
    }
    println!();
}

fn print_resolution_errors(resolved: &Tasks) {
    println!();
    println!(
        "\x1b[31m{} task(s) could not be resolved:\x1b[0m",
        resolved.invalid.len()
    );
    println!();
    for (name, error) in resolved.errors() {
        println!("  ✗ {}: {}", name, error);
    }
    println!();
    println!("Run `quiver tasks` to see what the input file declares.");
}

/// Display labels for progress lines, keyed by sequence uid.
fn leaf_labels(items: &[quiver::sequence::SequenceItem]) -> HashMap<u64, String> {
    collect_leaves(items)
        .into_iter()
        .map(|leaf| (leaf.seq_uid, leaf_label(leaf)))
        .collect()
}

fn leaf_label(leaf: &TaskItem) -> String {
    match &leaf.sub_task_name {
        Some(sub) => format!("{}:{}", leaf.task.base_task_name, sub),
        None => leaf.task.task_name.clone(),
    }
}

fn render_report(report: &TaskReport, labels: &HashMap<u64, String>) {
    let name = labels
        .get(&report.seq_uid)
        .map(String::as_str)
        .unwrap_or("?");
    match report.kind {
        TaskReportType::Start => {
            qlog_debug!("Starting: {}", name);
        }
        TaskReportType::End => {
            if report.stats.skipped.is_some() {
                println!("\x1b[33m-\x1b[0m {} (skipped)", name);
            } else {
                let ms = report.stats.duration_ms.unwrap_or(0);
                println!("\x1b[32m✓\x1b[0m {} ({}ms)", name, ms);
            }
        }
        TaskReportType::Error => {
            let detail = report
                .stats
                .errors
                .first()
                .map(String::as_str)
                .unwrap_or("failed");
            println!("\x1b[31m✗\x1b[0m {} ({})", name, detail);
        }
    }
}
