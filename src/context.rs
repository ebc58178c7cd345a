//! Run context: the immutable state shared by resolve, flatten, and run.

use std::fmt;
use std::sync::Arc;

use crate::adaptor::AdaptorRegistry;
use crate::config::RunnerConfig;
use crate::input::Input;
use crate::registry::{CallableResolver, TaskRegistry};

/// Everything a run needs to see, behind cheap clones. Nothing here
/// mutates once a run starts; progress travels through reports instead.
#[derive(Clone)]
pub struct RunContext {
    pub input: Arc<Input>,
    pub config: Arc<RunnerConfig>,
    pub registry: Arc<dyn CallableResolver>,
    pub adaptors: Arc<AdaptorRegistry>,
}

impl RunContext {
    pub fn new(input: Input, config: RunnerConfig) -> Self {
        Self {
            input: Arc::new(input),
            config: Arc::new(config),
            registry: Arc::new(TaskRegistry::new()),
            adaptors: Arc::new(AdaptorRegistry::with_defaults()),
        }
    }

    pub fn with_registry(mut self, registry: impl CallableResolver + 'static) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn with_adaptors(mut self, adaptors: AdaptorRegistry) -> Self {
        self.adaptors = Arc::new(adaptors);
        self
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new(Input::default(), RunnerConfig::default())
    }
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("input", &self.input)
            .field("config", &self.config)
            .field("registry", &"<resolver>")
            .field("adaptors", &self.adaptors)
            .finish()
    }
}
