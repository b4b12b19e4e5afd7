use thiserror::Error;

use pullflow_reactive::ReactiveError;

pub type Result<T> = std::result::Result<T, DslError>;

#[derive(Debug, Error)]
pub enum DslError {
    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid pipeline: {0}")]
    Invalid(String),

    #[error("unknown node `{0}`")]
    UnknownNode(String),

    #[error("wiring: {0}")]
    Reactive(#[from] ReactiveError),

    #[error(transparent)]
    Core(#[from] pullflow_core::error::Error),
}
