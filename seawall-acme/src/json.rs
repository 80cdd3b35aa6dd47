//! Canonical JSON, the deterministic form the JWK thumbprint is computed over.
//!
//! This is intentionally not a general purpose JSON encoder; the output must stay byte-exact.

use std::io::Write;

use serde_json::Value;

use crate::Error;

/// Write the canonical form of `value` into `output`: object keys sorted
/// lexicographically, no insignificant whitespace. The JWK thumbprint depends on this
/// being byte-exact.
pub fn write_canonical<W: Write>(value: &Value, output: &mut W) -> Result<(), Error> {
    match value {
        Value::Null | Value::String(_) | Value::Number(_) | Value::Bool(_) => {
            serde_json::to_writer(output, &value)?;
        }
        Value::Array(list) => {
            output.write_all(b"[")?;
            let mut iter = list.iter();
            if let Some(item) = iter.next() {
                write_canonical(item, output)?;
                for item in iter {
                    output.write_all(b",")?;
                    write_canonical(item, output)?;
                }
            }
            output.write_all(b"]")?;
        }
        Value::Object(map) => {
            output.write_all(b"{")?;
            let mut keys: Vec<&str> = map.keys().map(String::as_str).collect();
            keys.sort_unstable();
            let mut iter = keys.into_iter();
            if let Some(key) = iter.next() {
                serde_json::to_writer(&mut *output, &key)?;
                output.write_all(b":")?;
                write_canonical(&map[key], output)?;
                for key in iter {
                    output.write_all(b",")?;
                    serde_json::to_writer(&mut *output, &key)?;
                    output.write_all(b":")?;
                    write_canonical(&map[key], output)?;
                }
            }
            output.write_all(b"}")?;
        }
    }
    Ok(())
}

/// Canonical JSON as a `String`.
pub fn canonical_json(value: &Value) -> Result<String, Error> {
    let mut out = Vec::new();
    write_canonical(value, &mut out)?;
    String::from_utf8(out).map_err(|_| Error::custom("canonical json produced invalid utf-8"))
}
