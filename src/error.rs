use thiserror::Error;

use crate::core::ItemId;

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

    #[error("Duplicate work item: {0}")]
    DuplicateItem(ItemId),

    #[error("Work item {item} depends on unknown item {dependency}")]
    UnknownDependency { item: ItemId, dependency: ItemId },

    #[error("Cyclic dependency detected at work item {0}")]
    CyclicDependency(ItemId),

    #[error("Work item {0} declares dependencies; the parallel pool only runs independent items")]
    UnsupportedDependency(ItemId),

    #[error("Aggregation failed: {count} file conflict(s), first on {path}")]
    AggregationConflict { path: String, count: usize },

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl Error {
    /// Whether this error describes a bad workflow definition rather than a
    /// runtime fault. Configuration errors are never retried.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::DuplicateItem(_)
                | Error::UnknownDependency { .. }
                | Error::CyclicDependency(_)
                | Error::UnsupportedDependency(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
