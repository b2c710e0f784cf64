//! 规则集编译器
//!
//! 将未校验的规则集定义编译为不可变的 [`RuleSet`]：校验标识、条件与结果类型，
//! 把三种条件书写方式统一降为 [`Condition`]，并预提取规则集引用的属性。

use crate::error::{ConditionError, DefinitionError};
use crate::models::{
    Condition, ConditionDefinition, ConditionsDefinition, EvaluationMode, Outcome, Rule,
    RuleDefinition, RuleSet, RuleSetDefinition,
};
use crate::operators::Operator;
use crate::parser::{parse_expression, parse_suffixed_key};
use crate::value::Value;
use chrono::Utc;
use std::collections::{BTreeSet, HashSet};

/// 构造条件
///
/// 唯一的条件构造入口，纯函数。
pub fn build_condition(
    attribute: &str,
    operator_symbol: &str,
    literal: Value,
) -> Result<Condition, ConditionError> {
    let operator = Operator::parse(operator_symbol)?;

    let attribute = attribute.trim();
    if attribute.is_empty() {
        return Err(ConditionError::EmptyAttribute);
    }

    match &literal {
        Value::Absent => return Err(ConditionError::AbsentLiteral),
        Value::Number(n) if !n.is_finite() => return Err(ConditionError::NonFiniteLiteral(*n)),
        _ => {}
    }

    Ok(Condition::new_unchecked(
        attribute.to_string(),
        operator,
        literal,
    ))
}

/// 将 JSON 值转换为条件字面量
fn literal_from_json(json: &serde_json::Value) -> Result<Value, ConditionError> {
    match Value::from_json(json) {
        Some(Value::Absent) => Err(ConditionError::AbsentLiteral),
        Some(value) => Ok(value),
        None => Err(ConditionError::NonLiteralValue(json.to_string())),
    }
}

/// 规则集编译器
pub struct RuleSetCompiler;

impl RuleSetCompiler {
    /// 编译规则集定义
    pub fn compile(definition: RuleSetDefinition) -> Result<RuleSet, DefinitionError> {
        Self::require_non_empty(&definition.id, "规则集 ID")?;
        Self::require_non_empty(&definition.name, "规则集名称")?;

        let mut seen_ids = HashSet::new();
        let mut rules = Vec::with_capacity(definition.rules.len());
        for rule_def in definition.rules {
            Self::require_non_empty(&rule_def.id, "规则 ID")?;
            if !seen_ids.insert(rule_def.id.clone()) {
                return Err(DefinitionError::DuplicateRuleId {
                    ruleset_id: definition.id.clone(),
                    rule_id: rule_def.id,
                });
            }
            rules.push(Self::compile_rule(rule_def)?);
        }

        if definition.evaluation_mode == EvaluationMode::Accumulate {
            Self::validate_accumulate_outcomes(&rules, definition.fallback_outcome.as_ref())?;
        }

        for derivation in &definition.derived_fields {
            derivation.validate()?;
        }

        let required_attributes = Self::extract_attributes(&rules);

        Ok(RuleSet::new_unchecked(
            definition.id,
            definition.name,
            definition.description,
            rules,
            definition.evaluation_mode,
            definition.fallback_outcome,
            definition.derived_fields,
            definition.defined_at.unwrap_or_else(Utc::now),
            required_attributes,
        ))
    }

    /// 从 JSON 字符串编译规则集
    pub fn compile_from_json(json: &str) -> Result<RuleSet, DefinitionError> {
        let definition: RuleSetDefinition = serde_json::from_str(json)
            .map_err(|e| DefinitionError::InvalidDefinition(e.to_string()))?;
        Self::compile(definition)
    }

    fn require_non_empty(value: &str, what: &str) -> Result<(), DefinitionError> {
        if value.trim().is_empty() {
            return Err(DefinitionError::EmptyIdentifier {
                what: what.to_string(),
            });
        }
        Ok(())
    }

    /// 编译单条规则，名称缺省时使用规则 ID
    fn compile_rule(definition: RuleDefinition) -> Result<Rule, DefinitionError> {
        let rule_id = definition.id;
        let invalid = |index: usize| {
            let rule_id = rule_id.clone();
            move |reason: ConditionError| DefinitionError::InvalidCondition {
                rule_id,
                index,
                reason,
            }
        };

        let conditions = match definition.conditions {
            ConditionsDefinition::List(list) => list
                .into_iter()
                .enumerate()
                .map(|(index, cond)| Self::lower_condition(cond).map_err(invalid(index)))
                .collect::<Result<Vec<_>, _>>()?,
            ConditionsDefinition::Suffixed(map) => map
                .iter()
                .enumerate()
                .map(|(index, (key, value))| {
                    let (attribute, operator) = parse_suffixed_key(key);
                    literal_from_json(value)
                        .and_then(|literal| build_condition(&attribute, operator, literal))
                        .map_err(invalid(index))
                })
                .collect::<Result<Vec<_>, _>>()?,
        };

        if conditions.is_empty() {
            return Err(DefinitionError::EmptyConditionList { rule_id });
        }

        let name = if definition.name.trim().is_empty() {
            rule_id.clone()
        } else {
            definition.name
        };

        Ok(Rule::new_unchecked(
            rule_id,
            name,
            conditions,
            definition.outcome,
        ))
    }

    fn lower_condition(definition: ConditionDefinition) -> Result<Condition, ConditionError> {
        match definition {
            ConditionDefinition::Structured {
                attribute,
                operator,
                value,
            } => build_condition(&attribute, &operator, literal_from_json(&value)?),
            ConditionDefinition::Expression(expression) => {
                let parsed = parse_expression(&expression)?;
                build_condition(&parsed.attribute, &parsed.operator, parsed.literal)
            }
        }
    }

    /// 累加模式下所有结果（含兜底）必须是同一种可累加类型
    fn validate_accumulate_outcomes(
        rules: &[Rule],
        fallback: Option<&Outcome>,
    ) -> Result<(), DefinitionError> {
        let outcomes = rules
            .iter()
            .map(|rule| (rule.id(), rule.outcome()))
            .chain(fallback.map(|outcome| ("fallback", outcome)));

        let mut expected: Option<&'static str> = None;
        for (rule_id, outcome) in outcomes {
            let incompatible = |detail: String| DefinitionError::IncompatibleOutcome {
                rule_id: rule_id.to_string(),
                mode: EvaluationMode::Accumulate,
                detail,
            };

            if let Outcome::Action(_) = outcome {
                return Err(incompatible("action 结果无法累加".to_string()));
            }

            match expected {
                None => expected = Some(outcome.kind()),
                Some(kind) if kind != outcome.kind() => {
                    return Err(incompatible(format!(
                        "结果类型 {} 与 {} 不能混用",
                        outcome.kind(),
                        kind
                    )));
                }
                Some(_) => {}
            }
        }

        Ok(())
    }

    /// 提取规则集中使用的所有属性
    fn extract_attributes(rules: &[Rule]) -> BTreeSet<String> {
        rules
            .iter()
            .flat_map(|rule| rule.conditions())
            .map(|cond| cond.attribute().to_string())
            .collect()
    }
}

impl TryFrom<RuleSetDefinition> for RuleSet {
    type Error = DefinitionError;

    fn try_from(definition: RuleSetDefinition) -> Result<Self, Self::Error> {
        RuleSetCompiler::compile(definition)
    }
}
