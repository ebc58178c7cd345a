use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Input file not found: {0}")]
    InputNotFound(std::path::PathBuf),

    #[error("Invalid task declaration for '{name}': {reason}")]
    InvalidTaskDeclaration { name: String, reason: String },

    #[error("Unknown adaptor: @{0}")]
    UnknownAdaptor(String),

    #[error("Binary not found on PATH: {0}")]
    BinaryNotFound(String),

    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Task failed: {0}")]
    TaskFailed(String),

    #[error("Command exited with code {code}")]
    CommandFailed { code: i32 },

    #[error("Command terminated by signal")]
    CommandKilled,

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Task join error: {0}")]
    TaskJoin(String),
}

pub type Result<T> = std::result::Result<T, Error>;
