//! Terraform adapter for rangectl.
//!
//! Wraps the `terraform` binary behind the [`range_core::provisioner::Provisioner`]
//! trait: `apply` runs init → apply → output, `destroy` runs init → destroy,
//! and `read_outputs` reads the recorded outputs without touching resources.
//! Inputs travel as `TF_VAR_*` environment variables; subprocess output is
//! streamed into tracing as it arrives.

mod error;
mod outputs;
mod process;
mod provisioner;

pub use error::{Result, TerraformError};
pub use provisioner::TerraformProvisioner;
