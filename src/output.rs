//! Output formatting (§4.6): marshal `Data` to the session's configured
//! `OutputFormat`, pretty-printing JSON with 2-space indent and colorizing
//! it key-by-key when attached to a TTY and `raw_output` is false. A value
//! marshaling to `{}` or an empty string is elided entirely rather than
//! printed as noise.

use serde_json::Value;

use crate::ansi;
use crate::session::OutputFormat;

/// Render `data` per the session's format/color/raw settings. Returns `None`
/// when there is nothing worth printing (an empty object/array or an empty
/// scalar), per §4.6.
pub fn format_data(data: &Value, format: OutputFormat, colorize: bool, raw: bool) -> Option<String> {
    if is_elidable(data) {
        return None;
    }
    match format {
        OutputFormat::Json => {
            let pretty = serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string());
            if colorize && !raw {
                Some(colorize_json(&pretty))
            } else {
                Some(pretty)
            }
        }
        OutputFormat::Yaml => {
            // YAML output is never colorized (§4.6 only calls out JSON
            // key-by-key coloring); it uses the same data tree.
            serde_yaml::to_string(data).ok()
        }
    }
}

fn is_elidable(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Object(m) => m.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Walk pretty-printed JSON text and wrap each object key in the key color.
/// Operates on the text rather than re-serializing from the `Value` so the
/// original 2-space pretty layout survives untouched; only `"key":` tokens
/// at the start of a line (after whitespace) are recolored, values are left
/// in the terminal's default color.
fn colorize_json(pretty: &str) -> String {
    let mut out = String::with_capacity(pretty.len() + 64);
    for line in pretty.split_inclusive('\n') {
        let (indent, rest) = split_indent(line);
        out.push_str(indent);
        if let Some((key, remainder)) = match_key(rest) {
            out.push_str(&ansi::wrap(ansi::PROP_KEY, key));
            out.push_str(remainder);
        } else {
            out.push_str(rest);
        }
    }
    out
}

fn split_indent(line: &str) -> (&str, &str) {
    let idx = line.find(|c: char| c != ' ').unwrap_or(line.len());
    line.split_at(idx)
}

/// If `rest` begins with a JSON string key followed by a colon (the shape
/// every pretty-printed object line takes), return `(quoted_key, rest_after_key)`.
fn match_key(rest: &str) -> Option<(&str, &str)> {
    if !rest.starts_with('"') {
        return None;
    }
    let mut i = 1;
    let bytes = rest.as_bytes();
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            i += 2;
            continue;
        }
        if bytes[i] == b'"' {
            i += 1;
            break;
        }
        i += 1;
    }
    let after_quote = &rest[i..];
    if after_quote.trim_start().starts_with(':') {
        Some((&rest[..i], after_quote))
    } else {
        None
    }
}
