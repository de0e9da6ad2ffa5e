//! Cloud credential assembly for the provisioning environment.
//!
//! An optional `credentials.yaml` next to `range.yaml` supplies per-provider
//! values; the process environment fills anything the file omits. The result
//! is the set of environment variables handed to every Terraform subprocess.

use crate::error::Result;
use crate::paths;
use crate::unit::Provider;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AwsCredentials {
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AzureCredentials {
    #[serde(default)]
    pub subscription_id: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GcpCredentials {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub credentials_file: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub aws: AwsCredentials,
    #[serde(default)]
    pub azure: AzureCredentials,
    #[serde(default)]
    pub gcp: GcpCredentials,
}

impl Credentials {
    /// Load `credentials.yaml`, treating a missing file as all-defaults
    /// (everything comes from the environment).
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::credentials_path(root);
        if !path.exists() {
            tracing::debug!("no credentials.yaml, using environment only");
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        let creds: Credentials = serde_yaml::from_str(&data)?;
        Ok(creds)
    }

    /// Environment variables for the provisioner, covering every provider.
    /// File values win over inherited environment so a range can pin its
    /// own account regardless of the caller's shell.
    pub fn environment(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        let mut put = |key: &str, value: &Option<String>| {
            if let Some(v) = value.clone().or_else(|| std::env::var(key).ok()) {
                env.insert(key.to_string(), v);
            }
        };

        put("AWS_PROFILE", &self.aws.profile);
        put("AWS_DEFAULT_REGION", &self.aws.region);
        put("ARM_SUBSCRIPTION_ID", &self.azure.subscription_id);
        put("ARM_TENANT_ID", &self.azure.tenant_id);
        put("ARM_CLIENT_ID", &self.azure.client_id);
        put("ARM_CLIENT_SECRET", &self.azure.client_secret);
        put("GOOGLE_PROJECT", &self.gcp.project_id);
        put("GOOGLE_REGION", &self.gcp.region);
        put("GOOGLE_APPLICATION_CREDENTIALS", &self.gcp.credentials_file);
        env
    }

    /// Credential keys required for `provider` that neither the file nor
    /// the environment supplies.
    pub fn missing_for(&self, provider: Provider) -> Vec<&'static str> {
        let env = self.environment();
        let has = |key: &str| env.contains_key(key);
        let mut missing = Vec::new();
        match provider {
            Provider::Aws => {
                // A profile or explicit keys both work.
                if !has("AWS_PROFILE") && std::env::var("AWS_ACCESS_KEY_ID").is_err() {
                    missing.push("AWS_PROFILE or AWS_ACCESS_KEY_ID/AWS_SECRET_ACCESS_KEY");
                }
            }
            Provider::Azure => {
                if !has("ARM_SUBSCRIPTION_ID") {
                    missing.push("ARM_SUBSCRIPTION_ID");
                }
                if !has("ARM_TENANT_ID") {
                    missing.push("ARM_TENANT_ID");
                }
            }
            Provider::Gcp => {
                if !has("GOOGLE_PROJECT") {
                    missing.push("GOOGLE_PROJECT");
                }
            }
        }
        missing
    }
}

/// Locate the terraform binary, if any.
pub fn terraform_binary() -> Option<std::path::PathBuf> {
    which::which("terraform").ok()
}
