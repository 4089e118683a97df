//! Integer, number and boolean casting.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::schema::Field;

use super::Value;

// Leading and trailing non-numeric wrapping, e.g. "$ 1,000" or "95%".
static INTEGER_WRAPPING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\d-]*(-?\d+)[^\d]*$").unwrap());
static NUMBER_WRAPPING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\d.-]*(-?[\d.]+(?:[eE][-+]?\d+)?)[^\d]*$").unwrap());

pub(super) fn decode_integer(raw: &str, field: &Field) -> Option<Value> {
    let mut text = raw.trim().to_string();
    if let Some(group) = field.group_char.as_deref().filter(|g| !g.is_empty()) {
        text = text.replace(group, "");
    }
    if !field.bare_number {
        text = INTEGER_WRAPPING.captures(&text)?.get(1)?.as_str().to_string();
    }
    if text.starts_with('+') {
        return None;
    }
    text.parse::<i64>().ok().map(Value::Integer)
}

pub(super) fn encode_integer(value: &Value, _field: &Field) -> Option<String> {
    value.as_i64().map(|i| i.to_string())
}

pub(super) fn decode_number(raw: &str, field: &Field) -> Option<Value> {
    let mut text = raw.trim().to_string();
    match text.as_str() {
        "NaN" | "nan" => return Some(Value::Number(f64::NAN)),
        "INF" | "inf" | "Infinity" => return Some(Value::Number(f64::INFINITY)),
        "-INF" | "-inf" | "-Infinity" => return Some(Value::Number(f64::NEG_INFINITY)),
        _ => {}
    }
    if let Some(group) = field.group_char.as_deref().filter(|g| !g.is_empty()) {
        text = text.replace(group, "");
    }
    let decimal = field.decimal_char();
    if decimal != "." {
        text = text.replace(decimal, ".");
    }
    if !field.bare_number {
        text = NUMBER_WRAPPING.captures(&text)?.get(1)?.as_str().to_string();
    }
    // Rust accepts "inf"/"nan" spellings and a leading '+'; only the forms above are numbers.
    if text.is_empty()
        || text.starts_with('+')
        || !text.chars().any(|c| c.is_ascii_digit())
        || text.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E')
    {
        return None;
    }
    text.parse::<f64>().ok().map(Value::Number)
}

pub(super) fn encode_number(value: &Value, field: &Field) -> Option<String> {
    let text = match value {
        Value::Integer(i) => i.to_string(),
        Value::Number(n) if n.is_nan() => return Some("NaN".to_string()),
        Value::Number(n) if n.is_infinite() => {
            return Some(if *n > 0.0 { "INF" } else { "-INF" }.to_string());
        }
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let decimal = field.decimal_char();
    if decimal != "." {
        Some(text.replace('.', decimal))
    } else {
        Some(text)
    }
}

pub(super) fn decode_boolean(raw: &str, field: &Field) -> Option<Value> {
    if field.true_values().iter().any(|t| t == raw) {
        Some(Value::Boolean(true))
    } else if field.false_values().iter().any(|f| f == raw) {
        Some(Value::Boolean(false))
    } else {
        None
    }
}

pub(super) fn encode_boolean(value: &Value, field: &Field) -> Option<String> {
    match value {
        Value::Boolean(true) => field.true_values().first().cloned(),
        Value::Boolean(false) => field.false_values().first().cloned(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldType;

    fn field(field_type: FieldType) -> Field {
        Field::new("value", field_type)
    }

    #[test]
    fn test_integer_decoding() {
        let f = field(FieldType::Integer);
        assert_eq!(decode_integer("42", &f), Some(Value::Integer(42)));
        assert_eq!(decode_integer("-7", &f), Some(Value::Integer(-7)));
        assert_eq!(decode_integer("1.5", &f), None);
        assert_eq!(decode_integer("abc", &f), None);
        assert_eq!(decode_integer("$42", &f), None);
    }

    #[test]
    fn test_integer_bare_number_and_group_char() {
        let f = field(FieldType::Integer)
            .with_bare_number(false)
            .with_group_char(",");
        assert_eq!(decode_integer("$1,000", &f), Some(Value::Integer(1000)));
        assert_eq!(decode_integer("95%", &f), Some(Value::Integer(95)));
    }

    #[test]
    fn test_number_decoding() {
        let f = field(FieldType::Number);
        assert_eq!(decode_number("3.14", &f), Some(Value::Number(3.14)));
        assert_eq!(decode_number("1e3", &f), Some(Value::Number(1000.0)));
        assert!(matches!(decode_number("NaN", &f), Some(Value::Number(n)) if n.is_nan()));
        assert_eq!(decode_number("infinity and beyond", &f), None);
        assert_eq!(decode_number("", &f), None);
    }

    #[test]
    fn test_number_decimal_char() {
        let f = field(FieldType::Number)
            .with_group_char(".")
            .with_decimal_char(",");
        assert_eq!(decode_number("1.234,5", &f), Some(Value::Number(1234.5)));
        assert_eq!(encode_number(&Value::Number(2.5), &f), Some("2,5".to_string()));
    }

    #[test]
    fn test_boolean_tokens() {
        let f = field(FieldType::Boolean);
        assert_eq!(decode_boolean("TRUE", &f), Some(Value::Boolean(true)));
        assert_eq!(decode_boolean("0", &f), Some(Value::Boolean(false)));
        assert_eq!(decode_boolean("yes", &f), None);

        let custom = field(FieldType::Boolean).with_true_values(vec!["yes".into()]);
        assert_eq!(decode_boolean("yes", &custom), Some(Value::Boolean(true)));
        assert_eq!(encode_boolean(&Value::Boolean(true), &custom), Some("yes".into()));
    }
}
