//! PyON payload decoding.
//!
//! The client answers with Python literal syntax. Apart from `None`, `True` and
//! `False` this is valid JSON, so decoding is a narrow token rewrite followed by
//! `serde_json`. Only tokens in value position (directly after `": "`) outside
//! of double-quoted strings are rewritten.

use serde::de::DeserializeOwned;

const LITERALS: [(&str, &str); 3] = [("None", "null"), ("True", "true"), ("False", "false")];

/// Rewrites value-position Python literals to their JSON spelling.
pub fn to_json(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = rest.chars().next() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
        } else if let Some(value) = rest.strip_prefix(": ") {
            if let Some((json, len)) = literal_at(value) {
                out.push_str(": ");
                out.push_str(json);
                rest = &value[len..];
                continue;
            }
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    out
}

/// Rewrites `raw` and parses it into `T`.
pub fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, serde_json::Error> {
    serde_json::from_str(&to_json(raw))
}

/// Matches a whole literal token at the start of `s`.
fn literal_at(s: &str) -> Option<(&'static str, usize)> {
    LITERALS.iter().find_map(|(py, json)| {
        let tail = s.strip_prefix(py)?;
        let whole = tail
            .chars()
            .next()
            .map_or(true, |c| !(c.is_alphanumeric() || c == '_'));
        whole.then_some((*json, py.len()))
    })
}
