//! 条件评估器
//!
//! 实现记录字段与规则字面量之间的比较与类型转换。
//! 结果是三值的：满足、不满足、无法判定（字段缺失、类型不兼容、字面量无法解析），
//! 无法判定的条件一律按不满足处理，永远不会产生错误。

use crate::operators::Operator;
use crate::value::Value;
use std::cmp::Ordering;
use std::fmt;

/// 无法判定的原因
#[derive(Debug, Clone, PartialEq)]
pub enum Indeterminate {
    /// 记录中没有该属性（或值为 Absent）
    MissingAttribute,
    /// 记录值与字面量类型无法比较
    IncompatibleTypes {
        record: &'static str,
        literal: &'static str,
    },
    /// 文本字面量无法转换为记录值的类型
    UnparsableLiteral(String),
    /// 该类型不支持大小比较（布尔值只支持 == 和 !=）
    UnorderedType(&'static str),
}

impl fmt::Display for Indeterminate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingAttribute => write!(f, "属性缺失"),
            Self::IncompatibleTypes { record, literal } => {
                write!(f, "类型不兼容: 记录为 {}, 字面量为 {}", record, literal)
            }
            Self::UnparsableLiteral(literal) => write!(f, "字面量无法解析: {:?}", literal),
            Self::UnorderedType(type_name) => write!(f, "{} 不支持大小比较", type_name),
        }
    }
}

/// 条件评估结果
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionOutcome {
    Satisfied,
    Unsatisfied,
    Indeterminate(Indeterminate),
}

impl ConditionOutcome {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied)
    }

    fn from_bool(satisfied: bool) -> Self {
        if satisfied {
            Self::Satisfied
        } else {
            Self::Unsatisfied
        }
    }
}

impl fmt::Display for ConditionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Satisfied => write!(f, "MATCHED"),
            Self::Unsatisfied => write!(f, "NOT_MATCHED"),
            Self::Indeterminate(reason) => write!(f, "INDETERMINATE ({})", reason),
        }
    }
}

/// 条件评估器
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// 评估条件
    ///
    /// # Arguments
    /// * `field_value` - 从记录中获取的字段值
    /// * `operator` - 操作符
    /// * `literal` - 规则中定义的字面量
    pub fn evaluate(
        field_value: Option<&Value>,
        operator: Operator,
        literal: &Value,
    ) -> ConditionOutcome {
        // 字段不存在时，无论什么操作符都不满足（包括 !=）
        let field_value = match field_value {
            Some(v) if !v.is_absent() => v,
            _ => return ConditionOutcome::Indeterminate(Indeterminate::MissingAttribute),
        };

        match (field_value, literal) {
            (Value::Number(a), Value::Number(b)) => Self::compare_numbers(*a, *b, operator),
            (Value::Number(a), Value::Text(text)) => match Self::parse_number(text) {
                Some(b) => Self::compare_numbers(*a, b, operator),
                None => ConditionOutcome::Indeterminate(Indeterminate::UnparsableLiteral(
                    text.clone(),
                )),
            },
            (Value::Text(a), Value::Text(b)) => {
                ConditionOutcome::from_bool(operator.holds(a.as_str().cmp(b.as_str())))
            }
            (Value::Boolean(a), Value::Boolean(b)) => Self::compare_booleans(*a, *b, operator),
            (Value::Boolean(a), Value::Text(text)) => match Self::parse_bool(text) {
                Some(b) => Self::compare_booleans(*a, b, operator),
                None => ConditionOutcome::Indeterminate(Indeterminate::UnparsableLiteral(
                    text.clone(),
                )),
            },
            (record, literal) => ConditionOutcome::Indeterminate(Indeterminate::IncompatibleTypes {
                record: record.type_name(),
                literal: literal.type_name(),
            }),
        }
    }

    /// 数值比较，NaN 无法排序时视为类型不兼容
    fn compare_numbers(a: f64, b: f64, operator: Operator) -> ConditionOutcome {
        match a.partial_cmp(&b) {
            Some(ordering) => ConditionOutcome::from_bool(operator.holds(ordering)),
            None => ConditionOutcome::Indeterminate(Indeterminate::IncompatibleTypes {
                record: "number",
                literal: "number",
            }),
        }
    }

    /// 布尔值只支持相等比较
    fn compare_booleans(a: bool, b: bool, operator: Operator) -> ConditionOutcome {
        match operator {
            Operator::Eq => ConditionOutcome::from_bool(a == b),
            Operator::Ne => ConditionOutcome::from_bool(a != b),
            _ => ConditionOutcome::Indeterminate(Indeterminate::UnorderedType("boolean")),
        }
    }

    /// 单次数值解析，只接受有限数
    fn parse_number(text: &str) -> Option<f64> {
        text.trim().parse::<f64>().ok().filter(|n| n.is_finite())
    }

    fn parse_bool(text: &str) -> Option<bool> {
        match text.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        }
    }
}
