//! Cache key derivation

use serde_json::Value;

pub const KEY_PREFIX: &str = "cache:";

/// Derive the cache key for a read of `path` with optional parameters.
///
/// Parameters are rendered in canonical form (object keys sorted at every
/// depth), so two requests that differ only in key order share a key.
/// `None`, `null` and `{}` all mean "no parameters".
pub fn derive_key(path: &str, params: Option<&Value>) -> String {
    let mut key = format!("{}{}", KEY_PREFIX, path);
    match params {
        None | Some(Value::Null) => {}
        Some(Value::Object(map)) if map.is_empty() => {}
        Some(value) => {
            key.push('?');
            canonicalize(value, &mut key);
        }
    }
    key
}

fn canonicalize(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (k, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(k.clone()).to_string());
                out.push(':');
                canonicalize(v, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                canonicalize(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Escape glob metacharacters so `text` matches only itself in a pattern
pub fn glob_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '?' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_matter() {
        let a = derive_key("/nodes", Some(&json!({"a": 1, "b": 2})));
        let b = derive_key("/nodes", Some(&json!({"b": 2, "a": 1})));
        assert_eq!(a, b);
        assert_eq!(a, r#"cache:/nodes?{"a":1,"b":2}"#);
    }

    #[test]
    fn nested_objects_are_canonical() {
        let a = derive_key("/graph", Some(&json!({"f": {"y": [1, {"q": 1, "p": 2}], "x": true}})));
        let b = derive_key("/graph", Some(&json!({"f": {"x": true, "y": [1, {"p": 2, "q": 1}]}})));
        assert_eq!(a, b);
    }

    #[test]
    fn array_order_matters() {
        let a = derive_key("/graph", Some(&json!({"ids": [1, 2]})));
        let b = derive_key("/graph", Some(&json!({"ids": [2, 1]})));
        assert_ne!(a, b);
    }

    #[test]
    fn empty_params_are_omitted() {
        assert_eq!(derive_key("/stats", None), "cache:/stats");
        assert_eq!(derive_key("/stats", Some(&Value::Null)), "cache:/stats");
        assert_eq!(derive_key("/stats", Some(&json!({}))), "cache:/stats");
    }

    #[test]
    fn escaping_glob_characters() {
        assert_eq!(glob_escape("a*b?c\\d"), r"a\*b\?c\\d");
    }
}
