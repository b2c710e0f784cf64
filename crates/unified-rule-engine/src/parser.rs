//! 条件书写方式解析
//!
//! 文本表达式（`credit_score >= 700`、`input['credit_score'] >= 700`）与后缀键值对
//! （`{"amount_gt": 1000}`）都只在定义期解析为 (属性, 操作符, 字面量) 三元组，
//! 语法是封闭的：属性名、操作符符号、字面量，不执行任何代码。

use crate::error::ConditionError;
use crate::value::Value;
use regex::Regex;
use std::sync::LazyLock;

/// 解析后的条件三元组，操作符仍为原始符号，由 `build_condition` 统一校验
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCondition {
    pub attribute: String,
    pub operator: String,
    pub literal: Value,
}

static EXPRESSION: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| {
    Regex::new(
        r#"^\s*(?:input\[\s*['"]([^'"]+)['"]\s*\]|([A-Za-z_][A-Za-z0-9_.]*))\s*(==|!=|>=|<=|>|<)\s*(.+?)\s*$"#,
    )
});

/// 后缀到操作符的映射，较长的后缀在前
const SUFFIXES: [(&str, &str); 9] = [
    ("_gte", ">="),
    ("_lte", "<="),
    ("_neq", "!="),
    ("_gt", ">"),
    ("_lt", "<"),
    ("_ge", ">="),
    ("_le", "<="),
    ("_ne", "!="),
    ("_eq", "=="),
];

/// 解析文本表达式
pub fn parse_expression(expression: &str) -> Result<ParsedCondition, ConditionError> {
    let unparsable = || ConditionError::UnparsableExpression(expression.to_string());

    let regex = EXPRESSION.as_ref().map_err(|_| unparsable())?;
    let captures = regex.captures(expression).ok_or_else(unparsable)?;

    let attribute = captures
        .get(1)
        .or_else(|| captures.get(2))
        .map(|m| m.as_str().trim().to_string())
        .ok_or_else(unparsable)?;
    let operator = captures
        .get(3)
        .map(|m| m.as_str().to_string())
        .ok_or_else(unparsable)?;
    let literal = captures
        .get(4)
        .map(|m| parse_literal(m.as_str()))
        .ok_or_else(unparsable)??;

    Ok(ParsedCondition {
        attribute,
        operator,
        literal,
    })
}

/// 解析表达式右侧的字面量
///
/// 引号包裹的是文本，`true`/`false` 是布尔值，能解析为数值的是数值，其余裸词按文本处理。
fn parse_literal(raw: &str) -> Result<Value, ConditionError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ConditionError::UnparsableExpression(raw.to_string()));
    }

    for quote in ['\'', '"'] {
        if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
            let inner = &raw[1..raw.len() - 1];
            if inner.contains(quote) {
                return Err(ConditionError::UnparsableExpression(raw.to_string()));
            }
            return Ok(Value::Text(inner.to_string()));
        }
    }

    if raw.starts_with(['\'', '"']) || raw.ends_with(['\'', '"']) {
        return Err(ConditionError::UnparsableExpression(raw.to_string()));
    }

    match raw {
        "true" | "True" => return Ok(Value::Boolean(true)),
        "false" | "False" => return Ok(Value::Boolean(false)),
        _ => {}
    }

    // nan、inf 等非有限数按裸词处理
    match raw.parse::<f64>() {
        Ok(n) if n.is_finite() => return Ok(Value::Number(n)),
        _ => {}
    }

    // 裸词中不允许空白，避免把 "a and b" 之类的复合表达式当作文本
    if raw.chars().any(char::is_whitespace) {
        return Err(ConditionError::UnparsableExpression(raw.to_string()));
    }

    Ok(Value::Text(raw.to_string()))
}

/// 解析后缀键值对中的单个条目
///
/// `amount_gt: 1000` 解析为 `amount > 1000`，无后缀时为相等比较。
/// 值保持原始 JSON，由调用方转换为字面量。
pub fn parse_suffixed_key(key: &str) -> (String, &'static str) {
    for (suffix, operator) in SUFFIXES {
        if let Some(attribute) = key.strip_suffix(suffix) {
            if !attribute.is_empty() {
                return (attribute.to_string(), operator);
            }
        }
    }
    (key.to_string(), "==")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numeric_expression() {
        let parsed = parse_expression("credit_score >= 700").unwrap();
        assert_eq!(parsed.attribute, "credit_score");
        assert_eq!(parsed.operator, ">=");
        assert_eq!(parsed.literal, Value::Number(700.0));
    }

    #[test]
    fn test_parse_input_subscript_expression() {
        let parsed = parse_expression("input['annual_income'] < 50000").unwrap();
        assert_eq!(parsed.attribute, "annual_income");
        assert_eq!(parsed.operator, "<");
        assert_eq!(parsed.literal, Value::Number(50000.0));

        let parsed = parse_expression(r#"input["country"] == "US""#).unwrap();
        assert_eq!(parsed.attribute, "country");
        assert_eq!(parsed.literal, Value::from("US"));
    }

    #[test]
    fn test_parse_literal_kinds() {
        assert_eq!(
            parse_expression("industry == 'tech'").unwrap().literal,
            Value::from("tech")
        );
        assert_eq!(
            parse_expression("industry == tech").unwrap().literal,
            Value::from("tech")
        );
        assert_eq!(
            parse_expression("is_vip == true").unwrap().literal,
            Value::Boolean(true)
        );
        // 引号中的数字保持文本
        assert_eq!(
            parse_expression("zip == '02134'").unwrap().literal,
            Value::from("02134")
        );
        assert_eq!(
            parse_expression("user.level != gold").unwrap().attribute,
            "user.level"
        );
    }

    #[test]
    fn test_non_finite_words_are_text() {
        for word in ["nan", "NaN", "inf", "infinity", "-inf"] {
            assert_eq!(
                parse_expression(&format!("status == {}", word)).unwrap().literal,
                Value::from(word)
            );
        }
    }

    #[test]
    fn test_reject_unparsable_expressions() {
        for expression in [
            "",
            "credit_score",
            "credit_score >= ",
            "credit_score >= 700 and income > 1",
            "__import__('os').system('ls') == 1",
            "score =~ 7",
            "name == 'unterminated",
        ] {
            assert!(
                matches!(
                    parse_expression(expression),
                    Err(ConditionError::UnparsableExpression(_))
                ),
                "expected failure for {:?}",
                expression
            );
        }
    }

    #[test]
    fn test_suffixed_keys() {
        assert_eq!(parse_suffixed_key("amount_gt"), ("amount".to_string(), ">"));
        assert_eq!(parse_suffixed_key("amount_gte"), ("amount".to_string(), ">="));
        assert_eq!(parse_suffixed_key("age_le"), ("age".to_string(), "<="));
        assert_eq!(parse_suffixed_key("status_neq"), ("status".to_string(), "!="));
        assert_eq!(parse_suffixed_key("event_type"), ("event_type".to_string(), "=="));
        assert_eq!(parse_suffixed_key("_gt"), ("_gt".to_string(), "=="));
    }
}
