//! Canonical serialization.

use crate::value::{Number, Value};

/// Renders a value to its canonical JSON text.
#[must_use]
pub fn to_canonical_string(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

/// Renders a value to its canonical JSON bytes.
#[must_use]
pub fn to_canonical_vec(value: &Value) -> Vec<u8> {
    to_canonical_string(value).into_bytes()
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => write_number(out, *n),
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(entries) => {
            out.push('{');
            for (i, (key, val)) in entries.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                write_value(out, val);
            }
            out.push('}');
        }
    }
}

fn write_number(out: &mut String, n: Number) {
    // Display on both variants is already the shortest round-trip form.
    out.push_str(&n.to_string());
}

/// Writes a JSON string literal with minimal escaping: only `"`, `\` and
/// control characters are escaped, using the short escapes where they exist.
fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{0008}' => out.push_str("\\b"),
            '\u{000C}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;

    #[test]
    fn scalars() {
        assert_eq!(to_canonical_string(&Value::Null), "null");
        assert_eq!(to_canonical_string(&Value::Bool(true)), "true");
        assert_eq!(to_canonical_string(&Value::from(42i64)), "42");
        assert_eq!(to_canonical_string(&Value::from("hi")), "\"hi\"");
    }

    #[test]
    fn float_shortest_form() {
        let v = Value::Number(Number::from_f64(0.5).unwrap());
        assert_eq!(to_canonical_string(&v), "0.5");
        // Integral floats collapse to integer text.
        let v = Value::Number(Number::from_f64(3.0).unwrap());
        assert_eq!(to_canonical_string(&v), "3");
    }

    #[test]
    fn object_keys_sorted_in_output() {
        let v = parse(br#"{"b":1,"a":2}"#).unwrap();
        assert_eq!(to_canonical_string(&v), r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn control_characters_escape_as_u00xx() {
        // Controls without a short escape use the four-digit form.
        let v = Value::from("\u{0001}");
        assert_eq!(to_canonical_string(&v), "\"\\u0001\"");
        let v = Value::from("\u{001f}");
        assert_eq!(to_canonical_string(&v), "\"\\u001f\"");
        // Characters with a shorthand never fall through to it.
        let v = Value::from("\u{0008}\u{000c}");
        assert_eq!(to_canonical_string(&v), "\"\\b\\f\"");
    }

    #[test]
    fn string_escapes() {
        let v = Value::from("a\"b\\c\nd\u{0001}");
        assert_eq!(to_canonical_string(&v), r#""a\"b\\c\nd\u0001""#);
    }

    #[test]
    fn nested() {
        let v = parse(br#"{"z":[1,{"y":null}],"a":false}"#).unwrap();
        assert_eq!(to_canonical_string(&v), r#"{"a":false,"z":[1,{"y":null}]}"#);
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let v = parse(br#"{"n": 2.0, "s": "x", "a": [1.5, true]}"#).unwrap();
        let once = to_canonical_string(&v);
        let twice = to_canonical_string(&parse(once.as_bytes()).unwrap());
        assert_eq!(once, twice);
    }
}
