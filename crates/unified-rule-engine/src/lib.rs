//! 统一规则引擎
//!
//! 提供可复用的规则评估能力，支持：
//! - JSON 规则集定义（结构化条件、文本表达式、后缀键值对）
//! - 定义期编译校验
//! - 首个命中 / 累加两种评估模式，条件短路求值
//! - 只追加的决策日志与规则集快照

pub mod audit;
pub mod compiler;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod models;
pub mod operators;
pub mod parser;
pub mod report;
pub mod repository;
pub mod service;
pub mod store;
pub mod transform;
pub mod value;

pub use audit::{DecisionLog, InMemoryDecisionLog, JsonlDecisionLog};
pub use compiler::{RuleSetCompiler, build_condition};
pub use error::{ConditionError, DefinitionError, EngineError, LogError, RepositoryError, Result};
pub use evaluator::{ConditionEvaluator, ConditionOutcome, Indeterminate};
pub use executor::{Evaluation, RuleExecutor, RuleMatcher, evaluate};
pub use models::{
    Condition, ConditionDefinition, ConditionsDefinition, Decision, DecisionOutcome,
    EvaluationMode, Outcome, Rule, RuleDefinition, RuleSet, RuleSetDefinition,
};
pub use operators::Operator;
pub use report::{DecisionSummary, GradeBands, ScoreStats};
pub use repository::RuleSetRepository;
pub use service::{EvaluationReceipt, LogStatus, RuleEngineService, RuleSetSummary};
pub use store::{RegistryStats, RuleSetRegistry};
pub use transform::{ArithmeticOp, Derivation, Operand};
pub use value::{Record, Value};
