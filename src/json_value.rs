//! Lenient accessors for provider JSON, which mixes numbers and numeric strings freely.

use serde_json::Value;

pub fn as_u64_any(v: &Value) -> Option<u64> {
    if let Some(n) = v.as_u64() {
        return Some(n);
    }
    if let Some(f) = v.as_f64()
        && f >= 0.0
        && f.fract() == 0.0
    {
        return Some(f as u64);
    }
    v.as_str()?.trim().parse::<u64>().ok()
}

pub fn as_u32_any(v: &Value) -> Option<u32> {
    let n = as_u64_any(v)?;
    u32::try_from(n).ok()
}

pub fn as_i64_any(v: &Value) -> Option<i64> {
    if let Some(n) = v.as_i64() {
        return Some(n);
    }
    v.as_str()?.trim().parse::<i64>().ok()
}

pub fn as_i32_any(v: &Value) -> Option<i32> {
    let n = as_i64_any(v)?;
    i32::try_from(n).ok()
}

pub fn as_f64_any(v: &Value) -> Option<f64> {
    if let Some(n) = v.as_f64() {
        return Some(n);
    }
    v.as_str()?.trim().parse::<f64>().ok()
}

pub fn str_at<'a>(v: &'a Value, key: &str) -> Option<&'a str> {
    v.get(key).and_then(|x| x.as_str())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn numbers_and_numeric_strings_are_accepted() {
        assert_eq!(as_u64_any(&json!(500)), Some(500));
        assert_eq!(as_u64_any(&json!(" 500 ")), Some(500));
        assert_eq!(as_u64_any(&json!(500.0)), Some(500));
        assert_eq!(as_u64_any(&json!(-1)), None);
        assert_eq!(as_i32_any(&json!("-1")), Some(-1));
        assert_eq!(as_f64_any(&json!("4.5")), Some(4.5));
        assert_eq!(as_f64_any(&json!(null)), None);
    }
}
