//! Input resolution: rewriting a challenge's raw inputs against the
//! outputs its dependencies recorded.
//!
//! By the time a challenge is scheduled every dependency is Deployed, so a
//! missing entry here is a configuration or scheduler defect and fails the
//! challenge rather than being retried.

use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::store::OutputStore;
use crate::unit::Challenge;
use crate::value::{OutputRef, RawValue, Segment};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("input '{input}': challenge '{unit}' has recorded no outputs")]
    DependencyNotDeployed { input: String, unit: String },

    #[error("input '{input}': no output '{output}' recorded for challenge '{unit}'")]
    MissingOutput {
        input: String,
        unit: String,
        output: String,
    },

    #[error("input '{input}': environment variable {var} is not set")]
    MissingEnv { input: String, var: String },
}

/// Resolve every input of `challenge` against the store.
///
/// Purely a function of the store's current contents: re-resolving after an
/// upstream redeploy observes the new values.
pub fn resolve(
    challenge: &Challenge,
    store: &OutputStore,
) -> Result<BTreeMap<String, Value>, ResolveError> {
    let mut resolved = BTreeMap::new();
    for (name, raw) in &challenge.inputs {
        resolved.insert(name.clone(), resolve_value(name, raw, store)?);
    }
    Ok(resolved)
}

fn resolve_value(
    input: &str,
    raw: &RawValue,
    store: &OutputStore,
) -> Result<Value, ResolveError> {
    let segments = match raw {
        RawValue::Literal(v) => return Ok(v.clone()),
        RawValue::Template(segments) => segments,
    };

    // A bare `${unit.output}` keeps the output's native type; anything mixed
    // with text is substituted textually.
    if let [Segment::Ref(r)] = segments.as_slice() {
        return lookup(input, r, store);
    }
    if let [Segment::Env(var)] = segments.as_slice() {
        return Ok(Value::String(env_var(input, var)?));
    }

    let mut out = String::new();
    for segment in segments {
        match segment {
            Segment::Text(t) => out.push_str(t),
            Segment::Ref(r) => out.push_str(&stringify(&lookup(input, r, store)?)),
            Segment::Env(var) => out.push_str(&env_var(input, var)?),
        }
    }
    Ok(Value::String(out))
}

fn lookup(input: &str, r: &OutputRef, store: &OutputStore) -> Result<Value, ResolveError> {
    if !store.contains(&r.unit) {
        return Err(ResolveError::DependencyNotDeployed {
            input: input.to_string(),
            unit: r.unit.clone(),
        });
    }
    store
        .value(&r.unit, &r.output)
        .ok_or_else(|| ResolveError::MissingOutput {
            input: input.to_string(),
            unit: r.unit.clone(),
            output: r.output.clone(),
        })
}

fn env_var(input: &str, var: &str) -> Result<String, ResolveError> {
    std::env::var(var).map_err(|_| ResolveError::MissingEnv {
        input: input.to_string(),
        var: var.to_string(),
    })
}

/// Textual form of a value inside a template: strings are spliced without
/// quotes, everything else renders as compact JSON.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn challenge(inputs_yaml: &str) -> Challenge {
        serde_yaml::from_str(&format!(
            "id: app\nprovider: aws\ndirectory: challenges/app\ninputs:\n{inputs_yaml}"
        ))
        .unwrap()
    }

    fn store_with(unit: &str, outputs: &[(&str, Value)]) -> OutputStore {
        let store = OutputStore::new();
        store.record(
            unit,
            outputs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        );
        store
    }

    #[test]
    fn template_substitutes_text() {
        let c = challenge("  url: \"prefix-${a.out1}-suffix\"\n");
        let store = store_with("a", &[("out1", json!("v1"))]);
        let resolved = resolve(&c, &store).unwrap();
        assert_eq!(resolved["url"], json!("prefix-v1-suffix"));
    }

    #[test]
    fn bare_ref_preserves_native_type() {
        let c = challenge("  port: \"${a.port}\"\n  endpoints: \"${a.eps}\"\n");
        let store = store_with("a", &[("port", json!(5432)), ("eps", json!({"x": 1}))]);
        let resolved = resolve(&c, &store).unwrap();
        assert_eq!(resolved["port"], json!(5432));
        assert_eq!(resolved["endpoints"], json!({"x": 1}));
    }

    #[test]
    fn embedded_number_stringifies() {
        let c = challenge("  addr: \"${a.host}:${a.port}\"\n");
        let store = store_with("a", &[("host", json!("db.internal")), ("port", json!(5432))]);
        let resolved = resolve(&c, &store).unwrap();
        assert_eq!(resolved["addr"], json!("db.internal:5432"));
    }

    #[test]
    fn literals_pass_through_untouched() {
        let c = challenge("  region: us-east-1\n  replicas: 3\n");
        let resolved = resolve(&c, &OutputStore::new()).unwrap();
        assert_eq!(resolved["region"], json!("us-east-1"));
        assert_eq!(resolved["replicas"], json!(3));
    }

    #[test]
    fn undeployed_dependency_is_fatal() {
        let c = challenge("  vpc: \"${net.vpc_id}\"\n");
        let err = resolve(&c, &OutputStore::new()).unwrap_err();
        assert!(matches!(
            err,
            ResolveError::DependencyNotDeployed { ref unit, .. } if unit == "net"
        ));
    }

    #[test]
    fn missing_output_key_is_fatal() {
        let c = challenge("  vpc: \"${net.vpc_id}\"\n");
        let store = store_with("net", &[("other", json!("x"))]);
        let err = resolve(&c, &store).unwrap_err();
        assert!(matches!(
            err,
            ResolveError::MissingOutput { ref output, .. } if output == "vpc_id"
        ));
    }

    #[test]
    fn re_resolving_observes_redeployed_outputs() {
        let c = challenge("  vpc: \"${net.vpc_id}\"\n");
        let store = store_with("net", &[("vpc_id", json!("vpc-old"))]);
        assert_eq!(resolve(&c, &store).unwrap()["vpc"], json!("vpc-old"));

        store.record(
            "net",
            [("vpc_id".to_string(), json!("vpc-new"))].into_iter().collect(),
        );
        assert_eq!(resolve(&c, &store).unwrap()["vpc"], json!("vpc-new"));
    }

    #[test]
    fn env_reference_resolves_from_environment() {
        let c = challenge("  region: \"${RANGECTL_TEST_REGION}\"\n");
        std::env::set_var("RANGECTL_TEST_REGION", "eu-west-1");
        let resolved = resolve(&c, &OutputStore::new()).unwrap();
        assert_eq!(resolved["region"], json!("eu-west-1"));
        std::env::remove_var("RANGECTL_TEST_REGION");
    }

    #[test]
    fn missing_env_reference_is_fatal() {
        let c = challenge("  region: \"${RANGECTL_TEST_UNSET_VAR}\"\n");
        let err = resolve(&c, &OutputStore::new()).unwrap_err();
        assert!(matches!(err, ResolveError::MissingEnv { ref var, .. } if var == "RANGECTL_TEST_UNSET_VAR"));
    }
}
