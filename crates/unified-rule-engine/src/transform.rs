//! 派生字段
//!
//! 用固定的几种变换（复制、常量、命名字段间的四则运算）在评估前为记录补充字段，
//! 不接受任何表达式代码。

use crate::error::DefinitionError;
use crate::value::{Record, Value};
use serde::{Deserialize, Serialize};

/// 四则运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithmeticOp {
    #[serde(alias = "+")]
    Add,
    #[serde(alias = "-")]
    Subtract,
    #[serde(alias = "*")]
    Multiply,
    #[serde(alias = "/")]
    Divide,
}

impl ArithmeticOp {
    fn apply(self, left: f64, right: f64) -> Option<f64> {
        let result = match self {
            Self::Add => left + right,
            Self::Subtract => left - right,
            Self::Multiply => left * right,
            Self::Divide if right == 0.0 => return None,
            Self::Divide => left / right,
        };
        result.is_finite().then_some(result)
    }
}

/// 运算数：字段名或数值常量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Constant(f64),
    Field(String),
}

impl Operand {
    fn resolve(&self, record: &Record) -> Option<f64> {
        match self {
            Self::Constant(n) => Some(*n),
            Self::Field(name) => record.get(name).and_then(Value::as_f64),
        }
    }
}

/// 派生字段变换
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Derivation {
    Copy {
        from: String,
        to: String,
    },
    Constant {
        to: String,
        value: Value,
    },
    Arithmetic {
        to: String,
        left: Operand,
        op: ArithmeticOp,
        right: Operand,
    },
}

impl Derivation {
    pub fn target(&self) -> &str {
        match self {
            Self::Copy { to, .. } | Self::Constant { to, .. } | Self::Arithmetic { to, .. } => to,
        }
    }

    /// 定义期校验
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.target().trim().is_empty() {
            return Err(DefinitionError::InvalidDerivation(
                "目标字段不能为空".to_string(),
            ));
        }

        match self {
            Self::Copy { from, .. } if from.trim().is_empty() => Err(
                DefinitionError::InvalidDerivation("复制的源字段不能为空".to_string()),
            ),
            Self::Constant { value, .. } if value.is_absent() => Err(
                DefinitionError::InvalidDerivation(format!("常量字段 '{}' 缺少值", self.target())),
            ),
            Self::Arithmetic { left, right, .. } => {
                for operand in [left, right] {
                    match operand {
                        Operand::Field(name) if name.trim().is_empty() => {
                            return Err(DefinitionError::InvalidDerivation(
                                "运算数字段名不能为空".to_string(),
                            ));
                        }
                        Operand::Constant(n) if !n.is_finite() => {
                            return Err(DefinitionError::InvalidDerivation(format!(
                                "运算常量必须是有限数: {}",
                                n
                            )));
                        }
                        _ => {}
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// 将变换应用到记录上
    ///
    /// 源字段缺失、非数值或除零时，目标字段被移除，记录中原有的同名值不再参与匹配。
    pub fn apply(&self, record: &mut Record) {
        let derived = match self {
            Self::Copy { from, .. } => record.get(from).cloned(),
            Self::Constant { value, .. } => Some(value.clone()),
            Self::Arithmetic {
                left, op, right, ..
            } => match (left.resolve(record), right.resolve(record)) {
                (Some(l), Some(r)) => op.apply(l, r).map(Value::Number),
                _ => None,
            },
        };

        match derived {
            Some(value) => record.insert(self.target(), value),
            None => {
                record.remove(self.target());
            }
        }
    }
}

/// 按顺序应用一组变换，后面的变换可以使用前面派生出的字段
pub fn apply_all(derivations: &[Derivation], record: &mut Record) {
    for derivation in derivations {
        derivation.apply(record);
    }
}
