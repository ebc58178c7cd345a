//! Adaptors: `@sh` and `@npm` task references run as subprocesses.
//!
//! An adaptor turns the command text after its sigil into a [`TaskFn`].
//! The subprocess inherits stdout/stderr so tool output lands on the
//! terminal, and sees the global options flattened into
//! `<PREFIX>_OPTIONS_<PATH>` environment variables plus any per-task
//! `env` pairs, which win on collision.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::options::flatten_env;
use crate::qlog_debug;
use crate::registry::{task_fn, TaskFn};
use crate::task::Task;

/// One `@name` command backend.
pub trait Adaptor: Send + Sync {
    /// Name matched against the sigil, without the `@`.
    fn name(&self) -> &str;

    /// Whether the backing program exists on this machine. Unavailable
    /// adaptors mark their tasks skipped instead of failing the run.
    fn available(&self) -> bool;

    /// Build the runnable for one adaptor task.
    fn create(&self, task: &Task, ctx: &RunContext) -> TaskFn;
}

/// `@sh`: runs the command through `sh -c`.
#[derive(Debug, Default)]
pub struct ShAdaptor;

impl Adaptor for ShAdaptor {
    fn name(&self) -> &str {
        "sh"
    }

    fn available(&self) -> bool {
        which::which("sh").is_ok()
    }

    fn create(&self, task: &Task, _ctx: &RunContext) -> TaskFn {
        let command = task.command.clone().unwrap_or_default();
        let task_env = task.env.clone();
        task_fn(move |_options, ctx| {
            let command = command.clone();
            let task_env = task_env.clone();
            async move { run_shell(&command, None, &task_env, &ctx).await }
        })
    }
}

/// `@npm`: like `@sh`, but with `node_modules/.bin` ahead of PATH so
/// locally installed tools resolve without a global install.
#[derive(Debug, Default)]
pub struct NpmAdaptor;

impl Adaptor for NpmAdaptor {
    fn name(&self) -> &str {
        "npm"
    }

    fn available(&self) -> bool {
        which::which("sh").is_ok()
    }

    fn create(&self, task: &Task, _ctx: &RunContext) -> TaskFn {
        let command = task.command.clone().unwrap_or_default();
        let task_env = task.env.clone();
        task_fn(move |_options, ctx| {
            let command = command.clone();
            let task_env = task_env.clone();
            async move {
                let local_bin = PathBuf::from("node_modules/.bin");
                run_shell(&command, Some(local_bin), &task_env, &ctx).await
            }
        })
    }
}

async fn run_shell(
    command: &str,
    prepend_path: Option<PathBuf>,
    task_env: &BTreeMap<String, String>,
    ctx: &RunContext,
) -> Result<()> {
    let shell = which::which("sh").map_err(|_| Error::BinaryNotFound("sh".to_string()))?;

    let mut cmd = Command::new(shell);
    cmd.arg("-c").arg(command).stdin(Stdio::null());
    if let Some(prefix) = prepend_path {
        cmd.env("PATH", prepend_to_path(prefix));
    }
    for (key, value) in flatten_env(&ctx.config.env_prefix, &ctx.input.options) {
        cmd.env(key, value);
    }
    cmd.envs(task_env);

    qlog_debug!("Running shell command: {}", command);
    let status = match ctx.config.timeout_secs {
        Some(secs) => {
            let limit = Duration::from_secs(secs);
            tokio::time::timeout(limit, cmd.status())
                .await
                .map_err(|_| Error::Timeout(limit))??
        }
        None => cmd.status().await?,
    };

    if status.success() {
        Ok(())
    } else {
        match status.code() {
            Some(code) => Err(Error::CommandFailed { code }),
            None => Err(Error::CommandKilled),
        }
    }
}

fn prepend_to_path(prefix: PathBuf) -> OsString {
    let current = std::env::var_os("PATH").unwrap_or_default();
    let mut parts = vec![prefix];
    parts.extend(std::env::split_paths(&current));
    std::env::join_paths(parts).unwrap_or(current)
}

/// Adaptors looked up by sigil name.
pub struct AdaptorRegistry {
    adaptors: Vec<Box<dyn Adaptor>>,
}

impl AdaptorRegistry {
    /// No adaptors at all. Useful when a host embeds the runner and
    /// wants full control over what commands can run.
    pub fn empty() -> Self {
        Self {
            adaptors: Vec::new(),
        }
    }

    /// The built-in set: `sh` and `npm`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(ShAdaptor));
        registry.register(Box::new(NpmAdaptor));
        registry
    }

    pub fn register(&mut self, adaptor: Box<dyn Adaptor>) -> &mut Self {
        self.adaptors.push(adaptor);
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn Adaptor> {
        self.adaptors
            .iter()
            .find(|a| a.name() == name)
            .map(|a| a.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.adaptors.iter().map(|a| a.name()).collect()
    }
}

impl Default for AdaptorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for AdaptorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdaptorRegistry")
            .field("adaptors", &self.names())
            .finish()
    }
}
