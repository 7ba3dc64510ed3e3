//! Query string decoding for route matching and query variables.
//!
//! Values are coerced the same way the browser client does it so a location
//! parsed on the server compares equal to one parsed after hydration.

use serde_json::{Map, Number, Value};

pub type QueryParams = Map<String, Value>;

pub fn parse(query: &str) -> QueryParams {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query).unwrap_or_default();
    let mut params = QueryParams::new();
    for (key, raw) in pairs {
        let value = coerce(&raw);
        match params.get_mut(&key) {
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                params.insert(key, value);
            }
        }
    }
    params
}

fn coerce(raw: &str) -> Value {
    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" => return Value::Null,
        _ => {}
    }
    if is_numeric(raw) {
        let number = match raw.parse::<i64>() {
            Ok(int) => Some(Number::from(int)),
            Err(_) => raw.parse::<f64>().ok().and_then(Number::from_f64),
        };
        // only values that print back unchanged are numbers: "007", "1.50"
        // and out of range integers stay strings
        if let Some(number) = number.filter(|number| number.to_string() == raw) {
            return Value::Number(number);
        }
    }
    Value::String(raw.to_string())
}

// digits, or an optional integer part followed by a fractional part
fn is_numeric(raw: &str) -> bool {
    let (int, frac) = match raw.split_once('.') {
        Some((int, frac)) => (int, Some(frac)),
        None => (raw, None),
    };
    let digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    match frac {
        None => !int.is_empty() && digits(int),
        Some(frac) => !frac.is_empty() && digits(frac) && digits(int),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coerces_scalars() {
        let params = parse("bid=50000&sort=-price&for_sale=true&estimate=1.5&empty=null");
        assert_eq!(params["bid"], json!(50000));
        assert_eq!(params["sort"], json!("-price"));
        assert_eq!(params["for_sale"], json!(true));
        assert_eq!(params["estimate"], json!(1.5));
        assert_eq!(params["empty"], Value::Null);
    }

    #[test]
    fn leading_zero_and_signs_stay_strings() {
        let params = parse("a=-1&b=1e5&c=.5&lot=007&price=1.50&ref=12345678901234567890");
        assert_eq!(params["a"], json!("-1"));
        assert_eq!(params["b"], json!("1e5"));
        assert_eq!(params["c"], json!(".5"));
        assert_eq!(params["lot"], json!("007"));
        assert_eq!(params["price"], json!("1.50"));
        assert_eq!(params["ref"], json!("12345678901234567890"));
    }

    #[test]
    fn repeated_keys_become_lists() {
        let params = parse("medium=painting&medium=sculpture&medium=print");
        assert_eq!(params["medium"], json!(["painting", "sculpture", "print"]));
    }

    #[test]
    fn decodes_reserved_characters() {
        let params = parse("q=blue+rider%26co");
        assert_eq!(params["q"], json!("blue rider&co"));
    }

    #[test]
    fn malformed_query_is_empty() {
        assert!(parse("").is_empty());
    }
}
