//! Execution engine: interprets a sequence tree with series/parallel
//! semantics and streams lifecycle reports.
//!
//! `series()` and `parallel()` walk the same tree with a different
//! top-level discipline; every group still honors its own mode. All
//! reports from all in-flight leaves funnel into one channel, so the
//! caller reads a single time-ordered stream that always completes,
//! failures included.
//!
//! Containment policy: a failure inside a parallel group never disturbs
//! its siblings and never escapes the group. A failure in a series chain
//! aborts the remainder of that chain; under fail-soft it is contained
//! instead, and the chain's remaining leaves report as skipped after the
//! failure without running.

use std::collections::HashSet;

use futures::future::{join_all, BoxFuture};
use tokio::sync::mpsc;

use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::qlog_debug;
use crate::report::{SkipReason, TaskReport, TaskStats};
use crate::sequence::{collect_leaves, count_leaves, SequenceItem, TaskItem};
use crate::task::RunMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Failure,
}

/// The merged report stream for one run. Ends once every leaf under the
/// invoked tree reached a terminal state or the run aborted.
pub struct ReportStream {
    rx: mpsc::UnboundedReceiver<TaskReport>,
}

impl ReportStream {
    pub async fn next(&mut self) -> Option<TaskReport> {
        self.rx.recv().await
    }

    pub async fn collect(mut self) -> Vec<TaskReport> {
        let mut out = Vec::new();
        while let Some(report) = self.rx.recv().await {
            out.push(report);
        }
        out
    }
}

/// Interprets one sequence tree. Construction validates the tree; the
/// entry points may be called any number of times, each starting a fresh
/// run over the same items.
#[derive(Debug)]
pub struct Runner {
    items: Vec<SequenceItem>,
    ctx: RunContext,
}

impl Runner {
    /// Fails when the tree shares a `seq_uid` between two nodes, which
    /// would make reports ambiguous. This is the only error that aborts
    /// before any execution.
    pub fn new(items: Vec<SequenceItem>, ctx: RunContext) -> Result<Self> {
        let mut seen = HashSet::new();
        if let Some(seq_uid) = first_duplicate_uid(&items, &mut seen) {
            return Err(Error::Validation(format!(
                "sequence uid {} appears more than once",
                seq_uid
            )));
        }
        Ok(Self { items, ctx })
    }

    pub fn sequence(&self) -> &[SequenceItem] {
        &self.items
    }

    /// Run top-level items as a chain.
    pub fn series(&self) -> ReportStream {
        self.run(RunMode::Series)
    }

    /// Run top-level items concurrently.
    pub fn parallel(&self) -> ReportStream {
        self.run(RunMode::Parallel)
    }

    fn run(&self, mode: RunMode) -> ReportStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let items = self.items.clone();
        let ctx = self.ctx.clone();
        qlog_debug!(
            "Run starting: {} top-level item(s), {} leaf task(s), mode {:?}",
            items.len(),
            count_leaves(&items),
            mode
        );
        tokio::spawn(async move {
            let outcome = run_items(&items, &ctx, &tx, mode).await;
            qlog_debug!("Run finished: {:?}", outcome);
            // tx drops here, completing the stream.
        });
        ReportStream { rx }
    }
}

fn first_duplicate_uid(items: &[SequenceItem], seen: &mut HashSet<u64>) -> Option<u64> {
    for item in items {
        if !seen.insert(item.seq_uid()) {
            return Some(item.seq_uid());
        }
        if let SequenceItem::Group(group) = item {
            if let Some(seq_uid) = first_duplicate_uid(&group.items, seen) {
                return Some(seq_uid);
            }
        }
    }
    None
}

fn run_items<'a>(
    items: &'a [SequenceItem],
    ctx: &'a RunContext,
    tx: &'a mpsc::UnboundedSender<TaskReport>,
    mode: RunMode,
) -> BoxFuture<'a, Outcome> {
    Box::pin(async move {
        match mode {
            RunMode::Series => {
                for (index, item) in items.iter().enumerate() {
                    if run_item(item, ctx, tx).await == Outcome::Failure {
                        if ctx.config.fail_soft() {
                            // Contained here: the rest of this chain is
                            // reported skipped, outer chains continue.
                            emit_skipped_after_failure(&items[index + 1..], tx);
                            return Outcome::Success;
                        }
                        return Outcome::Failure;
                    }
                }
                Outcome::Success
            }
            RunMode::Parallel => {
                // Siblings start together and every failure is swallowed
                // at this boundary, so no branch can cancel another and
                // nothing propagates to the enclosing chain.
                join_all(items.iter().map(|item| run_item(item, ctx, tx))).await;
                Outcome::Success
            }
        }
    })
}

fn run_item<'a>(
    item: &'a SequenceItem,
    ctx: &'a RunContext,
    tx: &'a mpsc::UnboundedSender<TaskReport>,
) -> BoxFuture<'a, Outcome> {
    Box::pin(async move {
        match item {
            SequenceItem::Group(group) => run_items(&group.items, ctx, tx, group.mode).await,
            SequenceItem::Task(task) => run_leaf(task, ctx, tx).await,
        }
    })
}

/// Execute one leaf: stamp start, invoke the callable on its own task so
/// a panic cannot take down the run, stamp the terminal state.
async fn run_leaf(
    leaf: &TaskItem,
    ctx: &RunContext,
    tx: &mpsc::UnboundedSender<TaskReport>,
) -> Outcome {
    if leaf.skipped {
        emit_skip(leaf, SkipReason::Declared, tx);
        return Outcome::Success;
    }

    let stats = TaskStats::begin();
    let _ = tx.send(TaskReport::start(leaf.seq_uid, stats.clone()));

    let factory = leaf.factory.clone();
    let options = leaf.options.clone();
    let run_ctx = ctx.clone();
    let handle = tokio::spawn(async move { factory(options, run_ctx).await });

    match handle.await {
        Ok(Ok(())) => {
            let _ = tx.send(TaskReport::end(leaf.seq_uid, stats.completed_now()));
            Outcome::Success
        }
        Ok(Err(error)) => {
            let _ = tx.send(TaskReport::error(
                leaf.seq_uid,
                stats.failed_now(error.to_string()),
            ));
            Outcome::Failure
        }
        Err(join_error) => {
            let _ = tx.send(TaskReport::error(
                leaf.seq_uid,
                stats.failed_now(Error::TaskJoin(join_error.to_string()).to_string()),
            ));
            Outcome::Failure
        }
    }
}

fn emit_skip(leaf: &TaskItem, reason: SkipReason, tx: &mpsc::UnboundedSender<TaskReport>) {
    let stats = TaskStats::skipped_now(reason);
    let _ = tx.send(TaskReport::start(leaf.seq_uid, stats.clone()));
    let _ = tx.send(TaskReport::end(leaf.seq_uid, stats));
}

/// Skip reports for everything that would have run after a contained
/// failure, so the decorated tree accounts for every leaf.
fn emit_skipped_after_failure(rest: &[SequenceItem], tx: &mpsc::UnboundedSender<TaskReport>) {
    for leaf in collect_leaves(rest) {
        emit_skip(leaf, SkipReason::AfterFailure, tx);
    }
}
