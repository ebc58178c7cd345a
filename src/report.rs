//! Lifecycle reports and post-run reconciliation.
//!
//! The runner emits a [`TaskReport`] whenever a leaf starts, ends, or
//! fails. Reports carry their own stats snapshot and correlate back to
//! the sequence solely by `seq_uid`. After a run (or an interrupted one)
//! [`decorate_sequence_with_reports`] folds the reports onto a clone of
//! the sequence tree; the tree itself is never touched while running.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::sequence::{SequenceItem, TaskItem};

/// Why a leaf did not execute its callable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Skipped by declaration: the config skip list or an unavailable
    /// adaptor.
    Declared,
    /// A previous item in the same series chain failed under fail-soft.
    AfterFailure,
}

/// Timing and outcome for one leaf invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskStats {
    pub started: DateTime<Utc>,
    pub ended: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    /// Set once, on normal completion only.
    pub completed: bool,
    pub skipped: Option<SkipReason>,
    pub errors: Vec<String>,
}

impl TaskStats {
    /// Stats for a leaf entering the running state.
    pub fn begin() -> Self {
        Self {
            started: Utc::now(),
            ended: None,
            duration_ms: None,
            completed: false,
            skipped: None,
            errors: Vec::new(),
        }
    }

    /// Stats for a leaf that never ran.
    pub fn skipped_now(reason: SkipReason) -> Self {
        let now = Utc::now();
        Self {
            started: now,
            ended: Some(now),
            duration_ms: Some(0),
            completed: false,
            skipped: Some(reason),
            errors: Vec::new(),
        }
    }

    /// Terminal stats for a normal completion.
    pub fn completed_now(mut self) -> Self {
        let now = Utc::now();
        self.duration_ms = Some((now - self.started).num_milliseconds());
        self.ended = Some(now);
        self.completed = true;
        self
    }

    /// Terminal stats for a failure.
    pub fn failed_now(mut self, error: String) -> Self {
        let now = Utc::now();
        self.duration_ms = Some((now - self.started).num_milliseconds());
        self.ended = Some(now);
        self.completed = false;
        self.errors.push(error);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskReportType {
    Start,
    End,
    Error,
}

/// One lifecycle event from the runner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskReport {
    pub seq_uid: u64,
    pub kind: TaskReportType,
    pub stats: TaskStats,
}

impl TaskReport {
    pub fn start(seq_uid: u64, stats: TaskStats) -> Self {
        Self {
            seq_uid,
            kind: TaskReportType::Start,
            stats,
        }
    }

    pub fn end(seq_uid: u64, stats: TaskStats) -> Self {
        Self {
            seq_uid,
            kind: TaskReportType::End,
            stats,
        }
    }

    pub fn error(seq_uid: u64, stats: TaskStats) -> Self {
        Self {
            seq_uid,
            kind: TaskReportType::Error,
            stats,
        }
    }
}

/// Fold reports onto a clone of the sequence tree, leaving the original
/// untouched. For each leaf the first matching start report pairs with
/// the first end report, falling back to the first error report, falling
/// back to the start alone (interrupted run). Leaves with no reports keep
/// `stats: None`. Re-decorating with the same reports yields the same
/// tree.
pub fn decorate_sequence_with_reports(
    items: &[SequenceItem],
    reports: &[TaskReport],
) -> Vec<SequenceItem> {
    items
        .iter()
        .map(|item| match item {
            SequenceItem::Group(group) => {
                let mut copy = group.clone();
                copy.items = decorate_sequence_with_reports(&group.items, reports);
                SequenceItem::Group(copy)
            }
            SequenceItem::Task(task) => {
                let mut copy = task.clone();
                copy.stats = merged_stats(task.seq_uid, reports);
                SequenceItem::Task(copy)
            }
        })
        .collect()
}

fn merged_stats(seq_uid: u64, reports: &[TaskReport]) -> Option<TaskStats> {
    let mut start = None;
    let mut end = None;
    let mut error = None;
    for report in reports.iter().filter(|r| r.seq_uid == seq_uid) {
        let slot = match report.kind {
            TaskReportType::Start => &mut start,
            TaskReportType::End => &mut end,
            TaskReportType::Error => &mut error,
        };
        if slot.is_none() {
            *slot = Some(&report.stats);
        }
    }

    match (start, end, error) {
        (Some(start), Some(terminal), _) | (Some(start), None, Some(terminal)) => {
            Some(TaskStats {
                started: start.started,
                ..terminal.clone()
            })
        }
        (Some(start), None, None) => Some(start.clone()),
        _ => None,
    }
}

/// Total error count across a decorated tree.
pub fn count_sequence_errors(items: &[SequenceItem]) -> usize {
    items
        .iter()
        .map(|item| match item {
            SequenceItem::Group(group) => count_sequence_errors(&group.items),
            SequenceItem::Task(task) => task
                .stats
                .as_ref()
                .map(|stats| stats.errors.len())
                .unwrap_or(0),
        })
        .sum()
}

/// Leaves of a decorated tree whose stats say they were skipped.
pub fn collect_skipped_tasks(items: &[SequenceItem]) -> Vec<&TaskItem> {
    let mut out = Vec::new();
    for item in items {
        match item {
            SequenceItem::Group(group) => out.extend(collect_skipped_tasks(&group.items)),
            SequenceItem::Task(task) => {
                if task
                    .stats
                    .as_ref()
                    .is_some_and(|stats| stats.skipped.is_some())
                {
                    out.push(task);
                }
            }
        }
    }
    out
}
