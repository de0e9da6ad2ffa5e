use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use range_core::provisioner::{ProvisionError, ProvisionResult, Provisioner};

use crate::error::{Result, TerraformError};
use crate::outputs::parse_outputs;
use crate::process::run_terraform;

// ─── TerraformProvisioner ─────────────────────────────────────────────────

/// The real provisioning backend: drives the `terraform` binary in each
/// challenge's working directory.
///
/// Safe to share across workers — every call carries its own working
/// directory and spawns its own subprocess.
pub struct TerraformProvisioner {
    binary: PathBuf,
    /// Credentials and other environment passed to every invocation.
    base_env: BTreeMap<String, String>,
    /// Per-challenge `-backend-config` files, keyed by challenge id.
    backend_configs: HashMap<String, PathBuf>,
}

impl TerraformProvisioner {
    /// Locate `terraform` on PATH.
    pub fn new(base_env: BTreeMap<String, String>) -> Result<Self> {
        let binary = which::which("terraform").map_err(|_| TerraformError::BinaryNotFound)?;
        Ok(Self::with_binary(binary, base_env))
    }

    /// Use an explicit binary. Lets tests substitute a stub executable.
    pub fn with_binary(binary: impl Into<PathBuf>, base_env: BTreeMap<String, String>) -> Self {
        Self {
            binary: binary.into(),
            base_env,
            backend_configs: HashMap::new(),
        }
    }

    pub fn backend_config(mut self, unit: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.backend_configs.insert(unit.into(), path.into());
        self
    }

    /// `TF_VAR_*` environment for one invocation: strings raw, everything
    /// else compact JSON, layered over the base environment.
    fn env_with_vars(&self, inputs: &BTreeMap<String, Value>) -> BTreeMap<String, String> {
        let mut env = self.base_env.clone();
        for (name, value) in inputs {
            let encoded = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            env.insert(format!("TF_VAR_{name}"), encoded);
        }
        env
    }

    async fn init(
        &self,
        unit: &str,
        workdir: &Path,
        env: &BTreeMap<String, String>,
    ) -> Result<()> {
        let mut args = vec!["-input=false".to_string()];
        if let Some(backend) = self.backend_configs.get(unit) {
            args.push(format!("-backend-config={}", backend.display()));
        }
        let out = run_terraform(&self.binary, "init", &args, workdir, env).await?;
        if !out.success {
            return Err(TerraformError::CommandFailed {
                op: "init".into(),
                detail: out.error_detail(),
            });
        }
        Ok(())
    }

    async fn run_checked(
        &self,
        op: &str,
        args: &[String],
        workdir: &Path,
        env: &BTreeMap<String, String>,
    ) -> Result<String> {
        let out = run_terraform(&self.binary, op, args, workdir, env).await?;
        if !out.success {
            return Err(TerraformError::CommandFailed {
                op: op.into(),
                detail: out.error_detail(),
            });
        }
        Ok(out.stdout)
    }
}

fn provision_err(e: TerraformError) -> ProvisionError {
    ProvisionError::new(e.to_string())
}

#[async_trait]
impl Provisioner for TerraformProvisioner {
    async fn apply(
        &self,
        unit: &str,
        workdir: &Path,
        inputs: &BTreeMap<String, Value>,
    ) -> ProvisionResult<BTreeMap<String, Value>> {
        let env = self.env_with_vars(inputs);
        self.init(unit, workdir, &env).await.map_err(provision_err)?;

        let args = vec!["-auto-approve".to_string(), "-input=false".to_string()];
        self.run_checked("apply", &args, workdir, &env)
            .await
            .map_err(provision_err)?;

        let stdout = self
            .run_checked("output", &["-json".to_string()], workdir, &env)
            .await
            .map_err(provision_err)?;
        parse_outputs(&stdout).map_err(provision_err)
    }

    async fn destroy(
        &self,
        unit: &str,
        workdir: &Path,
        inputs: &BTreeMap<String, Value>,
    ) -> ProvisionResult<()> {
        let env = self.env_with_vars(inputs);
        self.init(unit, workdir, &env).await.map_err(provision_err)?;

        let args = vec!["-auto-approve".to_string(), "-input=false".to_string()];
        self.run_checked("destroy", &args, workdir, &env)
            .await
            .map_err(provision_err)?;
        Ok(())
    }

    async fn read_outputs(
        &self,
        _unit: &str,
        workdir: &Path,
    ) -> ProvisionResult<BTreeMap<String, Value>> {
        let stdout = self
            .run_checked("output", &["-json".to_string()], workdir, &self.base_env)
            .await
            .map_err(provision_err)?;
        parse_outputs(&stdout).map_err(provision_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tf_vars_encode_strings_raw_and_rest_as_json() {
        let p = TerraformProvisioner::with_binary("/bin/true", BTreeMap::new());
        let inputs = BTreeMap::from([
            ("region".to_string(), json!("us-east-1")),
            ("port".to_string(), json!(8443)),
            ("tags".to_string(), json!({"team": "red"})),
        ]);
        let env = p.env_with_vars(&inputs);
        assert_eq!(env["TF_VAR_region"], "us-east-1");
        assert_eq!(env["TF_VAR_port"], "8443");
        assert_eq!(env["TF_VAR_tags"], r#"{"team":"red"}"#);
    }

    #[test]
    fn base_env_survives_var_layering() {
        let base = BTreeMap::from([("AWS_PROFILE".to_string(), "range".to_string())]);
        let p = TerraformProvisioner::with_binary("/bin/true", base);
        let env = p.env_with_vars(&BTreeMap::new());
        assert_eq!(env["AWS_PROFILE"], "range");
    }

    #[cfg(unix)]
    mod subprocess {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        /// A stub terraform that answers `output -json` with its own
        /// TF_VAR_flag value, so the full apply path (init → apply →
        /// output) is exercised without the real binary.
        fn stub(dir: &Path) -> PathBuf {
            let path = dir.join("terraform");
            std::fs::write(
                &path,
                "#!/bin/sh\n\
                 case \"$1\" in\n\
                   output) printf '{\"flag\":{\"value\":\"%s\",\"type\":\"string\"}}' \"$TF_VAR_flag\" ;;\n\
                   *) echo \"$1 ok\" ;;\n\
                 esac\n",
            )
            .unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn failing_stub(dir: &Path) -> PathBuf {
            let path = dir.join("terraform");
            std::fs::write(
                &path,
                "#!/bin/sh\n\
                 if [ \"$1\" = apply ]; then echo 'Error: quota exceeded' >&2; exit 1; fi\n\
                 echo ok\n",
            )
            .unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[tokio::test]
        async fn apply_runs_init_then_apply_then_reads_outputs() {
            let dir = tempfile::TempDir::new().unwrap();
            let p = TerraformProvisioner::with_binary(stub(dir.path()), BTreeMap::new());
            let inputs = BTreeMap::from([("flag".to_string(), json!("CTF{vpc}"))]);
            let outputs = p.apply("unit-1", dir.path(), &inputs).await.unwrap();
            assert_eq!(outputs["flag"], json!("CTF{vpc}"));
        }

        #[tokio::test]
        async fn failed_apply_carries_terraform_diagnostics() {
            let dir = tempfile::TempDir::new().unwrap();
            let p = TerraformProvisioner::with_binary(failing_stub(dir.path()), BTreeMap::new());
            let err = p
                .apply("unit-1", dir.path(), &BTreeMap::new())
                .await
                .unwrap_err();
            assert!(err.to_string().contains("quota exceeded"));
        }

        #[tokio::test]
        async fn destroy_succeeds_against_stub() {
            let dir = tempfile::TempDir::new().unwrap();
            let p = TerraformProvisioner::with_binary(stub(dir.path()), BTreeMap::new());
            p.destroy("unit-1", dir.path(), &BTreeMap::new())
                .await
                .unwrap();
        }
    }
}
