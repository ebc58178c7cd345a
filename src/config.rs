//! Run-wide configuration.
//!
//! These knobs apply to a whole run rather than a single task: top-level
//! discipline, the fail-hard/fail-soft switch, the env-var prefix used when
//! options are handed to subprocesses, and names to skip. A `[config]`
//! table in the input file deserializes straight into this struct; CLI
//! flags override individual fields afterwards.

use serde::{Deserialize, Serialize};

use crate::task::RunMode;

/// Default prefix for option-derived environment variables.
pub const DEFAULT_ENV_PREFIX: &str = "QUIVER";

/// Configuration for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RunnerConfig {
    /// Top-level discipline when the run starts (`series` unless forced).
    pub run_mode: RunMode,
    /// When true (default) a failure aborts the rest of its series chain.
    /// When false, failures are contained and later chain items are
    /// reported as skipped.
    pub exit_on_error: bool,
    /// Prefix for flattened option env vars passed to adaptor subprocesses.
    pub env_prefix: String,
    /// Base task names that must not execute this run; they still report.
    pub skip: Vec<String>,
    /// Optional wall-clock limit for adaptor subprocesses, in seconds.
    pub timeout_secs: Option<u64>,
    /// Verbose logging.
    pub debug: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            run_mode: RunMode::Series,
            exit_on_error: true,
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            skip: Vec::new(),
            timeout_secs: None,
            debug: false,
        }
    }
}

impl RunnerConfig {
    /// True when failures in series chains should be contained instead of
    /// aborting the chain.
    pub fn fail_soft(&self) -> bool {
        !self.exit_on_error
    }

    /// True when the given base name is on the skip list.
    pub fn skips(&self, base_name: &str) -> bool {
        self.skip.iter().any(|s| s == base_name)
    }
}
