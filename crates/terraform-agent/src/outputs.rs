use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{Result, TerraformError};

// ─── Output parsing ───────────────────────────────────────────────────────

/// Parse `terraform output -json`.
///
/// Terraform wraps each output in `{ "value": ..., "type": ..., "sensitive": ... }`;
/// the wrapper is stripped so consumers see the plain value. Entries without
/// a `value` key pass through unchanged.
pub(crate) fn parse_outputs(stdout: &str) -> Result<BTreeMap<String, Value>> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(BTreeMap::new());
    }

    let parsed: Value = serde_json::from_str(trimmed).map_err(|e| TerraformError::Parse {
        context: trimmed.chars().take(200).collect(),
        source: e,
    })?;

    let Value::Object(entries) = parsed else {
        return Err(TerraformError::CommandFailed {
            op: "output".into(),
            detail: format!("expected a JSON object, got: {trimmed}"),
        });
    };

    Ok(entries
        .into_iter()
        .map(|(name, entry)| {
            let value = match entry {
                Value::Object(mut m) if m.contains_key("value") => {
                    m.remove("value").unwrap_or(Value::Null)
                }
                other => other,
            };
            (name, value)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unwraps_the_value_envelope() {
        let out = parse_outputs(
            r#"{"flag_bucket":{"value":"s3://flags","type":"string","sensitive":false},
                "port":{"value":8443,"type":"number"}}"#,
        )
        .unwrap();
        assert_eq!(out["flag_bucket"], json!("s3://flags"));
        assert_eq!(out["port"], json!(8443));
    }

    #[test]
    fn structured_values_survive_intact() {
        let out = parse_outputs(
            r#"{"endpoints":{"value":{"api":"https://x","db":"https://y"},"type":["object"]}}"#,
        )
        .unwrap();
        assert_eq!(out["endpoints"], json!({"api": "https://x", "db": "https://y"}));
    }

    #[test]
    fn entries_without_envelope_pass_through() {
        let out = parse_outputs(r#"{"raw": "plain"}"#).unwrap();
        assert_eq!(out["raw"], json!("plain"));
    }

    #[test]
    fn empty_output_is_an_empty_map() {
        assert!(parse_outputs("").unwrap().is_empty());
        assert!(parse_outputs("{}\n").unwrap().is_empty());
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        let err = parse_outputs("not json").unwrap_err();
        assert!(matches!(err, TerraformError::Parse { .. }));
    }

    #[test]
    fn non_object_json_is_rejected() {
        let err = parse_outputs("[1, 2]").unwrap_err();
        assert!(matches!(err, TerraformError::CommandFailed { .. }));
    }
}
