//! Decimal extraction from vendor JSON.
//!
//! Vendors send money and ratios as JSON strings (`"12.50"`), as JSON
//! numbers, or not at all. Everything is parsed straight into `Decimal`
//! from its textual form so no float rounding creeps in.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::Value;

/// Parse a string or number into a `Decimal`. `None` for anything else.
pub(crate) fn decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => Decimal::from_str(s.trim())
            .or_else(|_| Decimal::from_scientific(s.trim()))
            .ok(),
        Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .ok()
        }
        _ => None,
    }
}

/// A field of an object as a `Decimal`.
pub(crate) fn decimal_field(obj: &Value, key: &str) -> Option<Decimal> {
    obj.get(key).and_then(decimal)
}

/// Convert an amount in micros (millionths of the account currency).
pub(crate) fn from_micros(micros: Decimal) -> Decimal {
    (micros / Decimal::from(1_000_000)).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn parses_strings_and_numbers() {
        assert_eq!(decimal(&json!("12.50")), Some(dec("12.50")));
        assert_eq!(decimal(&json!(3)), Some(dec("3")));
        assert_eq!(decimal(&json!(0.25)), Some(dec("0.25")));
        assert_eq!(decimal(&json!("1e-3")), Some(dec("0.001")));
    }

    #[test]
    fn rejects_non_numeric() {
        assert_eq!(decimal(&json!("n/a")), None);
        assert_eq!(decimal(&json!(null)), None);
        assert_eq!(decimal(&json!({"v": 1})), None);
        assert_eq!(decimal_field(&json!({}), "spend"), None);
    }

    #[test]
    fn micros_convert_to_units() {
        assert_eq!(from_micros(dec("12500000")), dec("12.5"));
        assert_eq!(from_micros(dec("400000")), dec("0.4"));
    }
}
