//! Interface to the external provisioning tool.
//!
//! The orchestrator only ever talks to this trait, so scheduling logic is
//! exercised in tests with an in-memory fake instead of real subprocesses.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Failure detail from an adapter call. Carries no taxonomy of its own: the
/// orchestrator decides what a failure means for the challenge's lifecycle.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ProvisionError(pub String);

impl ProvisionError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self(detail.into())
    }
}

pub type ProvisionResult<T> = std::result::Result<T, ProvisionError>;

/// One provisioning backend. Implementations must be safe to call
/// concurrently for different working directories; the orchestrator never
/// issues two calls against the same directory at once.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Bring the challenge's resources up. On success returns the output
    /// map the challenge now exposes.
    async fn apply(
        &self,
        unit: &str,
        workdir: &Path,
        inputs: &BTreeMap<String, Value>,
    ) -> ProvisionResult<BTreeMap<String, Value>>;

    /// Tear the challenge's resources down.
    async fn destroy(
        &self,
        unit: &str,
        workdir: &Path,
        inputs: &BTreeMap<String, Value>,
    ) -> ProvisionResult<()>;

    /// Read the current outputs without applying. Used by the skip/reuse
    /// fast path when the input signature is unchanged.
    async fn read_outputs(
        &self,
        unit: &str,
        workdir: &Path,
    ) -> ProvisionResult<BTreeMap<String, Value>>;
}
