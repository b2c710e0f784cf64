//! 规则引擎错误类型
//!
//! 定义期（规则集定义时）的错误与基础设施错误。
//! 评估期的缺失字段、类型不兼容、字面量解析失败都不是错误，而是条件不满足。

use crate::models::EvaluationMode;
use thiserror::Error;

/// 条件构造错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConditionError {
    #[error("条件的属性名不能为空")]
    EmptyAttribute,

    #[error("不支持的操作符: {0}")]
    UnsupportedOperator(String),

    #[error("条件必须提供比较值")]
    AbsentLiteral,

    #[error("比较值必须是字面量, 实际为 {0}")]
    NonLiteralValue(String),

    #[error("数值字面量必须是有限数: {0}")]
    NonFiniteLiteral(f64),

    #[error("无法解析条件表达式: '{0}'")]
    UnparsableExpression(String),
}

/// 规则集定义错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DefinitionError {
    #[error("规则集已存在: {0}")]
    DuplicateId(String),

    #[error("{what} 不能为空")]
    EmptyIdentifier { what: String },

    #[error("规则 ID 重复: ruleset={ruleset_id} rule={rule_id}")]
    DuplicateRuleId { ruleset_id: String, rule_id: String },

    #[error("规则 '{rule_id}' 至少需要一个条件")]
    EmptyConditionList { rule_id: String },

    #[error("规则 '{rule_id}' 的第 {index} 个条件无效: {reason}")]
    InvalidCondition {
        rule_id: String,
        index: usize,
        reason: ConditionError,
    },

    #[error("规则 '{rule_id}' 的结果类型不适用于 {mode} 模式: {detail}")]
    IncompatibleOutcome {
        rule_id: String,
        mode: EvaluationMode,
        detail: String,
    },

    #[error("派生字段定义无效: {0}")]
    InvalidDerivation(String),

    #[error("规则集定义格式错误: {0}")]
    InvalidDefinition(String),
}

/// 决策日志错误
#[derive(Debug, Error)]
pub enum LogError {
    #[error("决策日志不可用: {0}")]
    Unavailable(String),

    #[error("决策序列化失败: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<std::io::Error> for LogError {
    fn from(err: std::io::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// 规则集快照存储错误
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("规则集快照读写失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("规则集快照格式错误: {0}")]
    Format(#[from] serde_json::Error),

    #[error("规则集快照中存在无法加载的规则集: {0}")]
    RejectedRuleSets(String),
}

/// 服务层错误
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error("规则集未找到: {0}")]
    RuleSetNotFound(String),

    #[error(transparent)]
    Log(#[from] LogError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl EngineError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Definition(DefinitionError::DuplicateId(_)) => "DUPLICATE_ID",
            Self::Definition(DefinitionError::EmptyConditionList { .. }) => "EMPTY_CONDITION_LIST",
            Self::Definition(DefinitionError::InvalidCondition { .. }) => "INVALID_CONDITION",
            Self::Definition(_) => "INVALID_DEFINITION",
            Self::RuleSetNotFound(_) => "RULESET_NOT_FOUND",
            Self::Log(LogError::Unavailable(_)) => "LOG_UNAVAILABLE",
            Self::Log(LogError::Serialization(_)) => "LOG_SERIALIZATION_ERROR",
            Self::Repository(_) => "REPOSITORY_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
