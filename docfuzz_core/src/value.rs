use serde_json::Value as Json;
use std::collections::HashMap;

/// A single entry of a parse result, as produced by the engine or recorded in a testcase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    Int(i64),
    /// Repeated arguments or options. Element order is significant.
    List(Vec<String>),
}

/// Result mapping from option/argument names to values. Key order carries no meaning.
pub type Opts = HashMap<String, Value>;

impl Value {
    /// Compares two values shape by shape. Values of different shapes never agree,
    /// so `Int(3)` and `Str("3")` are distinct.
    pub fn agrees_with(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y)
            }
            _ => false,
        }
    }

    /// Converts untyped JSON into a `Value`.
    ///
    /// Accepts strings, numbers with no fractional part that fit in `i64`, and arrays
    /// of strings. Everything else is refused with a short reason, never coerced.
    pub fn from_json(json: &Json) -> Result<Value, String> {
        match json {
            Json::String(s) => Ok(Value::Str(s.clone())),
            Json::Number(n) => integral(n)
                .map(Value::Int)
                .ok_or_else(|| format!("number {n} is not an integer")),
            Json::Array(items) => items
                .iter()
                .map(|item| match item {
                    Json::String(s) => Ok(s.clone()),
                    other => Err(format!("list element is {}", json_kind(other))),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            other => Err(format!("{} is not allowed", json_kind(other))),
        }
    }
}

/// Converts every entry of a JSON object, failing on the first unsupported value.
pub fn opts_from_json(fields: serde_json::Map<String, Json>) -> Result<Opts, String> {
    let mut opts = Opts::with_capacity(fields.len());
    for (key, raw) in fields {
        let value = Value::from_json(&raw).map_err(|reason| format!("{key:?}: {reason}"))?;
        opts.insert(key, value);
    }
    Ok(opts)
}

// i64::MIN as f64 is exact; i64::MAX as f64 rounds up to 2^63.
const I64_LOWER: f64 = -9_223_372_036_854_775_808.0;
const I64_UPPER_EXCLUSIVE: f64 = 9_223_372_036_854_775_808.0;

fn integral(n: &serde_json::Number) -> Option<i64> {
    if let Some(i) = n.as_i64() {
        return Some(i);
    }
    if n.is_u64() {
        return None;
    }
    let f = n.as_f64()?;
    if f.fract() != 0.0 || !(I64_LOWER..I64_UPPER_EXCLUSIVE).contains(&f) {
        return None;
    }
    Some(f as i64)
}

pub(crate) fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

/// Returns `true` when both mappings hold the same keys and every value agrees.
pub fn opts_agree(expected: &Opts, actual: &Opts) -> bool {
    expected.len() == actual.len()
        && expected.iter().all(|(key, want)| {
            actual
                .get(key)
                .is_some_and(|got| want.agrees_with(got))
        })
}
