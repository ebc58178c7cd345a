pub mod adaptor;
pub mod config;
pub mod context;
pub mod error;
pub mod input;
pub mod list;
pub mod log;
pub mod options;
pub mod parse;
pub mod registry;
pub mod task;

// Resolve -> sequence -> execute pipeline
pub mod report;
pub mod resolve;
pub mod runner;
pub mod sequence;

pub use context::RunContext;
pub use error::{Error, Result};
pub use task::{RunMode, Task, TaskType, Tasks};
