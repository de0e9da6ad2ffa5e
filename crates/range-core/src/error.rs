use thiserror::Error;

#[derive(Debug, Error)]
pub enum RangeError {
    #[error("not a range root: range.yaml not found (pass --root or cd into the range)")]
    NotARoot,

    #[error("challenge not found: {0}")]
    ChallengeNotFound(String),

    #[error("duplicate challenge id: {0}")]
    DuplicateChallenge(String),

    #[error("invalid provider '{0}': must be one of aws, azure, gcp")]
    InvalidProvider(String),

    #[error("invalid difficulty '{0}': must be one of basic, intermediate, advanced")]
    InvalidDifficulty(String),

    #[error("dependency cycle: {}", .cycle.join(" -> "))]
    Cycle { cycle: Vec<String> },

    #[error("challenge '{unit}' references unknown challenge '{reference}'")]
    UnknownReference { unit: String, reference: String },

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("environment not ready: {0}")]
    EnvironmentNotReady(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RangeError>;
