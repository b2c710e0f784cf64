//! 规则引擎领域模型

use crate::operators::Operator;
use crate::transform::Derivation;
use crate::value::{Record, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// 条件：属性 / 操作符 / 字面量
///
/// 只能通过 [`crate::compiler::build_condition`] 构造，字面量永远不是 `Absent`。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Condition {
    attribute: String,
    operator: Operator,
    #[serde(rename = "value")]
    literal: Value,
}

impl Condition {
    pub(crate) fn new_unchecked(attribute: String, operator: Operator, literal: Value) -> Self {
        Self {
            attribute,
            operator,
            literal,
        }
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn literal(&self) -> &Value {
        &self.literal
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.attribute, self.operator, self.literal)
    }
}

/// 规则结果
///
/// 路由场景使用 `Action`，评分场景使用 `ScoreContribution`，校验场景使用 `Violation`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Outcome {
    Action(String),
    ScoreContribution(i64),
    Violation(String),
}

impl Outcome {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Action(_) => "action",
            Self::ScoreContribution(_) => "score_contribution",
            Self::Violation(_) => "violation",
        }
    }

    /// 单条规则命中时对应的决策结果
    pub fn to_decision_outcome(&self) -> DecisionOutcome {
        match self {
            Self::Action(action) => DecisionOutcome::Action(action.clone()),
            Self::ScoreContribution(score) => DecisionOutcome::Score(*score),
            Self::Violation(message) => DecisionOutcome::Violations(vec![message.clone()]),
        }
    }
}

/// 规则定义：条件合取 + 结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rule {
    id: String,
    name: String,
    conditions: Vec<Condition>,
    outcome: Outcome,
}

impl Rule {
    pub(crate) fn new_unchecked(
        id: String,
        name: String,
        conditions: Vec<Condition>,
        outcome: Outcome,
    ) -> Self {
        Self {
            id,
            name,
            conditions,
            outcome,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }
}

/// 评估模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMode {
    /// 首个命中规则决定结果（决策路由）
    #[default]
    FirstMatch,
    /// 累加所有命中规则的结果（评分、校验）
    Accumulate,
}

impl fmt::Display for EvaluationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FirstMatch => write!(f, "first_match"),
            Self::Accumulate => write!(f, "accumulate"),
        }
    }
}

/// 规则集：有序规则 + 评估模式 + 兜底结果
///
/// 定义后不可变，反序列化时会重新校验整个定义。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RuleSetDefinition")]
pub struct RuleSet {
    id: String,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    rules: Vec<Rule>,
    evaluation_mode: EvaluationMode,
    fallback_outcome: Option<Outcome>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    derived_fields: Vec<Derivation>,
    defined_at: DateTime<Utc>,
    #[serde(skip)]
    required_attributes: BTreeSet<String>,
}

impl RuleSet {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new_unchecked(
        id: String,
        name: String,
        description: Option<String>,
        rules: Vec<Rule>,
        evaluation_mode: EvaluationMode,
        fallback_outcome: Option<Outcome>,
        derived_fields: Vec<Derivation>,
        defined_at: DateTime<Utc>,
        required_attributes: BTreeSet<String>,
    ) -> Self {
        Self {
            id,
            name,
            description,
            rules,
            evaluation_mode,
            fallback_outcome,
            derived_fields,
            defined_at,
            required_attributes,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn evaluation_mode(&self) -> EvaluationMode {
        self.evaluation_mode
    }

    pub fn fallback_outcome(&self) -> Option<&Outcome> {
        self.fallback_outcome.as_ref()
    }

    pub fn derived_fields(&self) -> &[Derivation] {
        &self.derived_fields
    }

    pub fn defined_at(&self) -> DateTime<Utc> {
        self.defined_at
    }

    /// 规则集中条件引用的所有属性
    pub fn required_attributes(&self) -> &BTreeSet<String> {
        &self.required_attributes
    }

    /// 转换回定义形式（用于持久化或复制）
    pub fn to_definition(&self) -> RuleSetDefinition {
        RuleSetDefinition {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            rules: self
                .rules
                .iter()
                .map(|rule| RuleDefinition {
                    id: rule.id.clone(),
                    name: rule.name.clone(),
                    conditions: ConditionsDefinition::List(
                        rule.conditions
                            .iter()
                            .map(|c| ConditionDefinition::Structured {
                                attribute: c.attribute.clone(),
                                operator: c.operator.symbol().to_string(),
                                value: serde_json::to_value(&c.literal)
                                    .unwrap_or(serde_json::Value::Null),
                            })
                            .collect(),
                    ),
                    outcome: rule.outcome.clone(),
                })
                .collect(),
            evaluation_mode: self.evaluation_mode,
            fallback_outcome: self.fallback_outcome.clone(),
            derived_fields: self.derived_fields.clone(),
            defined_at: Some(self.defined_at),
        }
    }
}

/// 规则集定义（未校验的输入形式）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSetDefinition {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub rules: Vec<RuleDefinition>,
    #[serde(default)]
    pub evaluation_mode: EvaluationMode,
    #[serde(default)]
    pub fallback_outcome: Option<Outcome>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub derived_fields: Vec<Derivation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defined_at: Option<DateTime<Utc>>,
}

impl RuleSetDefinition {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        evaluation_mode: EvaluationMode,
        rules: Vec<RuleDefinition>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            rules,
            evaluation_mode,
            fallback_outcome: None,
            derived_fields: Vec::new(),
            defined_at: None,
        }
    }

    pub fn with_fallback(mut self, outcome: Outcome) -> Self {
        self.fallback_outcome = Some(outcome);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_derivation(mut self, derivation: Derivation) -> Self {
        self.derived_fields.push(derivation);
        self
    }
}

/// 规则定义（未校验的输入形式）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub conditions: ConditionsDefinition,
    pub outcome: Outcome,
}

impl RuleDefinition {
    pub fn new(
        id: impl Into<String>,
        conditions: Vec<ConditionDefinition>,
        outcome: Outcome,
    ) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            conditions: ConditionsDefinition::List(conditions),
            outcome,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// 规则条件列表的几种书写方式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionsDefinition {
    /// 条件列表（结构化或文本表达式）
    List(Vec<ConditionDefinition>),
    /// 后缀约定的键值对，如 {"event_type": "purchase", "amount_gt": 1000}
    Suffixed(serde_json::Map<String, serde_json::Value>),
}

/// 单个条件的书写方式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionDefinition {
    Structured {
        #[serde(alias = "field")]
        attribute: String,
        operator: String,
        #[serde(default, alias = "literal")]
        value: serde_json::Value,
    },
    /// 文本表达式，如 "credit_score >= 700"
    Expression(String),
}

impl ConditionDefinition {
    pub fn new(
        attribute: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        Self::Structured {
            attribute: attribute.into(),
            operator: operator.into(),
            value: value.into(),
        }
    }

    pub fn expr(expression: impl Into<String>) -> Self {
        Self::Expression(expression.into())
    }
}

/// 决策结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum DecisionOutcome {
    Action(String),
    Score(i64),
    Violations(Vec<String>),
    NoDecision,
}

impl DecisionOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Action(_) => "action",
            Self::Score(_) => "score",
            Self::Violations(_) => "violations",
            Self::NoDecision => "no_decision",
        }
    }

    pub fn is_decided(&self) -> bool {
        !matches!(self, Self::NoDecision)
    }

    pub fn action(&self) -> Option<&str> {
        match self {
            Self::Action(action) => Some(action),
            _ => None,
        }
    }

    pub fn score(&self) -> Option<i64> {
        match self {
            Self::Score(score) => Some(*score),
            _ => None,
        }
    }

    pub fn violations(&self) -> &[String] {
        match self {
            Self::Violations(messages) => messages,
            _ => &[],
        }
    }
}

/// 一次评估的不可变结果，追加到决策日志后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: String,
    pub ruleset_id: String,
    pub record_snapshot: Record,
    pub matched_rule_ids: Vec<String>,
    pub outcome: DecisionOutcome,
    pub evaluated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_string(&Outcome::Action("Approve".to_string())).unwrap();
        assert_eq!(json, r#"{"type":"action","value":"Approve"}"#);

        let parsed: Outcome =
            serde_json::from_str(r#"{"type":"score_contribution","value":30}"#).unwrap();
        assert_eq!(parsed, Outcome::ScoreContribution(30));
    }

    #[test]
    fn test_outcome_to_decision_outcome() {
        assert_eq!(
            Outcome::Violation("missing email".to_string()).to_decision_outcome(),
            DecisionOutcome::Violations(vec!["missing email".to_string()])
        );
        assert_eq!(
            Outcome::ScoreContribution(-5).to_decision_outcome(),
            DecisionOutcome::Score(-5)
        );
    }

    #[test]
    fn test_no_decision_serialization() {
        let json = serde_json::to_string(&DecisionOutcome::NoDecision).unwrap();
        assert_eq!(json, r#"{"type":"no_decision"}"#);
        let parsed: DecisionOutcome = serde_json::from_str(&json).unwrap();
        assert!(!parsed.is_decided());
    }

    #[test]
    fn test_definition_deserialization() {
        let json = r#"
        {
            "id": "lead_scoring",
            "name": "B2B Lead Scoring",
            "evaluation_mode": "accumulate",
            "rules": [
                {
                    "id": "large_company",
                    "conditions": [
                        {"attribute": "company_size", "operator": ">=", "value": 50}
                    ],
                    "outcome": {"type": "score_contribution", "value": 30}
                },
                {
                    "id": "tech",
                    "conditions": ["industry == 'tech'"],
                    "outcome": {"type": "score_contribution", "value": 25}
                },
                {
                    "id": "big_purchase",
                    "conditions": {"event_type": "purchase", "amount_gt": 1000},
                    "outcome": {"type": "score_contribution", "value": 40}
                }
            ]
        }
        "#;

        let def: RuleSetDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(def.evaluation_mode, EvaluationMode::Accumulate);
        assert!(def.fallback_outcome.is_none());
        assert!(matches!(def.rules[0].conditions, ConditionsDefinition::List(_)));
        assert!(matches!(
            &def.rules[1].conditions,
            ConditionsDefinition::List(list) if matches!(list[0], ConditionDefinition::Expression(_))
        ));
        assert!(matches!(def.rules[2].conditions, ConditionsDefinition::Suffixed(_)));
    }

    #[test]
    fn test_evaluation_mode_default() {
        assert_eq!(EvaluationMode::default(), EvaluationMode::FirstMatch);
        assert_eq!(EvaluationMode::Accumulate.to_string(), "accumulate");
    }
}
