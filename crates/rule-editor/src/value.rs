//! 输入值转换
//!
//! 条件值和事件值都来自文本输入：完整的数字文本转成 JSON 数字，
//! 其余情况保留原字符串。以 `.` 结尾的文本（如 `"18."`）视为尚未输入完成，
//! 保持字符串，避免把用户正在输入的小数点吞掉。

use serde_json::{Number, Value};

/// 整数在 f64 中可精确表示的上界（2^53）
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// 将输入文本转换为规则值
pub fn parse_rule_value(text: &str) -> Value {
    if text.is_empty() || text.ends_with('.') {
        return Value::String(text.to_string());
    }

    match parse_number(text.trim()) {
        Some(number) => Value::Number(number),
        None => Value::String(text.to_string()),
    }
}

/// 规则值的编辑文本：字符串原样，null 为空，其余为 JSON 文本
pub fn display_rule_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn parse_number(text: &str) -> Option<Number> {
    // 只接受十进制数字文本，排除 "inf"、"NaN" 之类 f64 能解析的单词
    if !text
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
    {
        return None;
    }

    let parsed: f64 = text.parse().ok()?;
    if !parsed.is_finite() {
        return None;
    }

    // 整数值按整数输出，"18" 序列化为 18 而不是 18.0
    if parsed.fract() == 0.0 && parsed.abs() < MAX_SAFE_INTEGER {
        return Some(Number::from(parsed as i64));
    }

    Number::from_f64(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_integer_text() {
        assert_eq!(parse_rule_value("18"), json!(18));
        assert_eq!(parse_rule_value("-3"), json!(-3));
        assert_eq!(parse_rule_value("0"), json!(0));
    }

    #[test]
    fn test_decimal_text() {
        assert_eq!(parse_rule_value("18.5"), json!(18.5));
        assert_eq!(parse_rule_value(".5"), json!(0.5));
        assert_eq!(parse_rule_value("1e3"), json!(1000));
    }

    #[test]
    fn test_trailing_dot_stays_string() {
        assert_eq!(parse_rule_value("18."), json!("18."));
    }

    #[test]
    fn test_non_numeric_stays_string() {
        assert_eq!(parse_rule_value("abc"), json!("abc"));
        assert_eq!(parse_rule_value("12abc"), json!("12abc"));
        assert_eq!(parse_rule_value("NaN"), json!("NaN"));
        assert_eq!(parse_rule_value("inf"), json!("inf"));
        assert_eq!(parse_rule_value("Infinity"), json!("Infinity"));
        assert_eq!(parse_rule_value("   "), json!("   "));
        assert_eq!(parse_rule_value(""), json!(""));
    }

    #[test]
    fn test_surrounding_whitespace_is_numeric() {
        assert_eq!(parse_rule_value(" 42 "), json!(42));
    }

    #[test]
    fn test_display() {
        assert_eq!(display_rule_value(&json!(22)), "22");
        assert_eq!(display_rule_value(&json!("warm")), "warm");
        assert_eq!(display_rule_value(&Value::Null), "");
    }
}
