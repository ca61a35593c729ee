use thiserror::Error;

#[derive(Error, Debug)]
pub enum HbError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Habit not found: {0}")]
    HabitNotFound(String),

    #[error("Ambiguous habit ID prefix: {0}")]
    AmbiguousId(String),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Not initialized. Run `hb init` first.")]
    NotInitialized,

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, HbError>;
