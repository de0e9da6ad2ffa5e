use regex::Regex;
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// OutputRef
// ---------------------------------------------------------------------------

/// A reference to another challenge's output, written `${challenge-id.output-name}`
/// in a raw input value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRef {
    pub unit: String,
    pub output: String,
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.unit, self.output)
    }
}

// ---------------------------------------------------------------------------
// Segment / RawValue
// ---------------------------------------------------------------------------

/// One piece of a templated input value.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Literal text between placeholders.
    Text(String),
    /// `${challenge-id.output-name}` — resolved from the output store.
    Ref(OutputRef),
    /// `${VAR_NAME}` (no dot) — resolved from the process environment.
    Env(String),
}

impl Segment {
    fn to_source(&self) -> String {
        match self {
            Segment::Text(s) => s.clone(),
            Segment::Ref(r) => format!("${{{r}}}"),
            Segment::Env(v) => format!("${{{v}}}"),
        }
    }
}

/// A raw input value as declared in configuration.
///
/// Placeholders are detected once, at registration, so resolution never
/// re-scans text. A value without placeholders stays a `Literal` and keeps
/// its native YAML type (string, number, bool, map).
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Literal(serde_json::Value),
    Template(Vec<Segment>),
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // `${unit.output}` or `${ENV_VAR}`; anything else is literal text.
        Regex::new(
            r"\$\{(?:([A-Za-z0-9][A-Za-z0-9_-]*)\.([A-Za-z_][A-Za-z0-9_-]*)|([A-Za-z_][A-Za-z0-9_]*))\}",
        )
        .expect("placeholder regex is valid")
    })
}

impl RawValue {
    /// Build a `RawValue` from a config-level JSON value, scanning strings
    /// for placeholders.
    pub fn parse(value: serde_json::Value) -> RawValue {
        let serde_json::Value::String(s) = &value else {
            return RawValue::Literal(value);
        };

        let re = placeholder_re();
        if !re.is_match(s) {
            return RawValue::Literal(value);
        }

        let mut segments = Vec::new();
        let mut last = 0;
        for caps in re.captures_iter(s) {
            let m = caps.get(0).expect("capture 0 always present");
            if m.start() > last {
                segments.push(Segment::Text(s[last..m.start()].to_string()));
            }
            if let (Some(unit), Some(output)) = (caps.get(1), caps.get(2)) {
                segments.push(Segment::Ref(OutputRef {
                    unit: unit.as_str().to_string(),
                    output: output.as_str().to_string(),
                }));
            } else if let Some(var) = caps.get(3) {
                segments.push(Segment::Env(var.as_str().to_string()));
            }
            last = m.end();
        }
        if last < s.len() {
            segments.push(Segment::Text(s[last..].to_string()));
        }

        RawValue::Template(segments)
    }

    /// Output references embedded in this value, in order of appearance.
    pub fn refs(&self) -> Vec<&OutputRef> {
        match self {
            RawValue::Literal(_) => Vec::new(),
            RawValue::Template(segments) => segments
                .iter()
                .filter_map(|s| match s {
                    Segment::Ref(r) => Some(r),
                    _ => None,
                })
                .collect(),
        }
    }

    /// The configuration-file form of this value.
    pub fn to_source(&self) -> serde_json::Value {
        match self {
            RawValue::Literal(v) => v.clone(),
            RawValue::Template(segments) => serde_json::Value::String(
                segments.iter().map(Segment::to_source).collect::<String>(),
            ),
        }
    }
}

impl<'de> Deserialize<'de> for RawValue {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(RawValue::parse(value))
    }
}

impl Serialize for RawValue {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_source().serialize(serializer)
    }
}
