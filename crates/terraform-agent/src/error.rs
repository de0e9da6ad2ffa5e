use thiserror::Error;

#[derive(Debug, Error)]
pub enum TerraformError {
    #[error("terraform binary not found on PATH")]
    BinaryNotFound,

    #[error("failed to spawn terraform: {0}")]
    Spawn(String),

    #[error("terraform {op} failed: {detail}")]
    CommandFailed { op: String, detail: String },

    #[error("failed to parse terraform output JSON: {source}\n  output: {context}")]
    Parse {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TerraformError>;
