use atelier_shared::BOOTSTRAP_GLOBAL;

use serde::Serialize;
use tracing::error;

/// JSON that can sit inside a `<script>` element without closing it or
/// tripping JavaScript line terminators.
pub fn script_safe_json<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(value)?;
    let mut escaped = String::with_capacity(json.len());
    for ch in json.chars() {
        match ch {
            '<' => escaped.push_str("\\u003C"),
            '>' => escaped.push_str("\\u003E"),
            '/' => escaped.push_str("\\u002F"),
            '\u{2028}' => escaped.push_str("\\u2028"),
            '\u{2029}' => escaped.push_str("\\u2029"),
            ch => escaped.push(ch),
        }
    }
    Ok(escaped)
}

/// Serialises the data graph to JSON, then serialises that JSON as a string
/// literal the client parses on boot. Neither step may take the page down:
/// failures fall back to an empty object.
pub fn hydration_literal<T: Serialize + ?Sized>(data: &T) -> String {
    let json = script_safe_json(data).unwrap_or_else(|err| {
        error!(error = %err, "could not serialize rehydration data");
        "{}".to_string()
    });
    script_safe_json(&json).unwrap_or_else(|err| {
        error!(error = %err, "could not serialize rehydration literal");
        r#""{}""#.to_string()
    })
}

pub fn bootstrap_script<T: Serialize + ?Sized>(data: &T) -> String {
    format!(
        "<script>var {} = {};</script>",
        BOOTSTRAP_GLOBAL,
        hydration_literal(data)
    )
}
