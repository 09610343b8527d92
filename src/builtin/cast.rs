// src/builtin/cast.rs

//! Permissive conversions used by the built-in handlers.

use serde_json::Value;

/// Coerce a slot value to a score.
///
/// Numbers and numeric strings are accepted; anything else is NaN.
pub fn to_f64(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

/// Coerce a property to an integer.
///
/// Integral floats and numeric strings are accepted.
pub fn to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| f as i64)
            })
        }
        _ => None,
    }
}

/// Name of the slot type that best describes a JSON value.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scores_accept_numbers_and_numeric_strings() {
        assert_eq!(to_f64(&json!(100)), 100.0);
        assert_eq!(to_f64(&json!(42.5)), 42.5);
        assert_eq!(to_f64(&json!(" 7 ")), 7.0);
        assert!(to_f64(&json!("abc")).is_nan());
        assert!(to_f64(&json!(true)).is_nan());
        assert!(to_f64(&Value::Null).is_nan());
    }

    #[test]
    fn ints_accept_integral_values_only() {
        assert_eq!(to_i64(&json!(3)), Some(3));
        assert_eq!(to_i64(&json!(3.0)), Some(3));
        assert_eq!(to_i64(&json!("12")), Some(12));
        assert_eq!(to_i64(&json!("12.0")), Some(12));
        assert_eq!(to_i64(&json!(3.5)), None);
        assert_eq!(to_i64(&json!([1])), None);
    }
}
