//! 规则执行器
//!
//! 按定义顺序扫描规则集：首个命中模式在第一条命中规则处停止，
//! 累加模式扫描全部规则并汇总结果。条件按合取短路求值，可选记录评估追踪。

use crate::evaluator::{ConditionEvaluator, ConditionOutcome};
use crate::models::{
    Condition, Decision, DecisionOutcome, EvaluationMode, Outcome, Rule, RuleSet,
};
use crate::transform;
use crate::value::Record;
use chrono::{DateTime, Utc};
use std::borrow::Cow;
use std::time::Instant;
use uuid::Uuid;

/// 规则匹配器
pub struct RuleMatcher;

impl RuleMatcher {
    /// 规则的所有条件都满足时命中，遇到第一个不满足的条件立即返回
    pub fn matches(rule: &Rule, record: &Record) -> bool {
        rule.conditions()
            .iter()
            .all(|cond| Self::check(cond, record).is_satisfied())
    }

    /// 评估单个条件
    pub fn check(cond: &Condition, record: &Record) -> ConditionOutcome {
        ConditionEvaluator::evaluate(record.get(cond.attribute()), cond.operator(), cond.literal())
    }
}

/// 单次评估结果：决策 + 可选的评估追踪
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub decision: Decision,
    pub evaluation_trace: Vec<String>,
    pub evaluation_time_ms: i64,
}

/// 规则执行器
#[derive(Debug, Clone, Copy)]
pub struct RuleExecutor {
    /// 是否记录详细评估追踪
    trace_enabled: bool,
}

impl RuleExecutor {
    pub fn new() -> Self {
        Self {
            trace_enabled: false,
        }
    }

    /// 启用评估追踪
    pub fn with_trace(mut self) -> Self {
        self.trace_enabled = true;
        self
    }

    pub fn trace_enabled(&self) -> bool {
        self.trace_enabled
    }

    /// 执行规则集评估
    pub fn execute(&self, ruleset: &RuleSet, record: &Record) -> Evaluation {
        self.execute_at(ruleset, record, Utc::now())
    }

    /// 以指定的评估时间执行
    pub fn execute_at(
        &self,
        ruleset: &RuleSet,
        record: &Record,
        evaluated_at: DateTime<Utc>,
    ) -> Evaluation {
        let start = Instant::now();
        let mut trace = Vec::new();

        // 派生字段只写入工作副本，快照保持调用方提供的原始记录
        let working: Cow<'_, Record> = if ruleset.derived_fields().is_empty() {
            Cow::Borrowed(record)
        } else {
            let mut derived = record.clone();
            transform::apply_all(ruleset.derived_fields(), &mut derived);
            Cow::Owned(derived)
        };

        let mut matched: Vec<&Rule> = Vec::new();
        for rule in ruleset.rules() {
            if !self.evaluate_rule(rule, &working, &mut trace) {
                continue;
            }

            matched.push(rule);
            if ruleset.evaluation_mode() == EvaluationMode::FirstMatch {
                if self.trace_enabled {
                    trace.push(format!("first_match: 规则 {} 命中, 停止扫描", rule.id()));
                }
                break;
            }
        }

        let outcome = match ruleset.evaluation_mode() {
            EvaluationMode::FirstMatch => matched.first().map(|rule| rule.outcome().to_decision_outcome()),
            EvaluationMode::Accumulate => Self::accumulate(&matched),
        };

        let outcome = outcome.unwrap_or_else(|| {
            if self.trace_enabled {
                trace.push(format!(
                    "无规则命中, 兜底结果: {}",
                    ruleset
                        .fallback_outcome()
                        .map(Outcome::kind)
                        .unwrap_or("no_decision")
                ));
            }
            ruleset
                .fallback_outcome()
                .map(Outcome::to_decision_outcome)
                .unwrap_or(DecisionOutcome::NoDecision)
        });

        let decision = Decision {
            id: Uuid::now_v7().to_string(),
            ruleset_id: ruleset.id().to_string(),
            record_snapshot: record.clone(),
            matched_rule_ids: matched.iter().map(|rule| rule.id().to_string()).collect(),
            outcome,
            evaluated_at,
        };

        Evaluation {
            decision,
            evaluation_trace: trace,
            evaluation_time_ms: start.elapsed().as_millis() as i64,
        }
    }

    /// 批量评估，按输入顺序返回决策
    pub fn evaluate_batch(&self, ruleset: &RuleSet, records: &[Record]) -> Vec<Decision> {
        records
            .iter()
            .map(|record| self.execute(ruleset, record).decision)
            .collect()
    }

    /// 评估单条规则（条件合取，短路求值）
    fn evaluate_rule(&self, rule: &Rule, record: &Record, trace: &mut Vec<String>) -> bool {
        for (i, cond) in rule.conditions().iter().enumerate() {
            let outcome = RuleMatcher::check(cond, record);

            if self.trace_enabled {
                trace.push(format!("{}.conditions[{}]: {} => {}", rule.id(), i, cond, outcome));
            }

            if !outcome.is_satisfied() {
                if self.trace_enabled && i + 1 < rule.conditions().len() {
                    trace.push(format!("{}: AND 短路 - 条件 {} 不满足", rule.id(), i));
                }
                return false;
            }
        }
        true
    }

    /// 汇总累加模式下命中规则的结果，无命中时返回 None
    fn accumulate(matched: &[&Rule]) -> Option<DecisionOutcome> {
        let first = matched.first()?;
        let outcome = match first.outcome() {
            Outcome::ScoreContribution(_) => DecisionOutcome::Score(
                matched
                    .iter()
                    .filter_map(|rule| match rule.outcome() {
                        Outcome::ScoreContribution(n) => Some(*n),
                        _ => None,
                    })
                    .fold(0i64, i64::saturating_add),
            ),
            Outcome::Violation(_) => DecisionOutcome::Violations(
                matched
                    .iter()
                    .filter_map(|rule| match rule.outcome() {
                        Outcome::Violation(message) => Some(message.clone()),
                        _ => None,
                    })
                    .collect(),
            ),
            // 累加规则集在定义期已拒绝 action 结果
            Outcome::Action(action) => DecisionOutcome::Action(action.clone()),
        };
        Some(outcome)
    }
}

impl Default for RuleExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// 评估规则集，返回决策
pub fn evaluate(ruleset: &RuleSet, record: &Record) -> Decision {
    RuleExecutor::new().execute(ruleset, record).decision
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::RuleSetCompiler;
    use crate::models::{ConditionDefinition, RuleDefinition, RuleSetDefinition};
    use crate::transform::{ArithmeticOp, Derivation, Operand};
    use crate::value::Value;

    fn loan_approval() -> RuleSet {
        RuleSetCompiler::compile(
            RuleSetDefinition::new(
                "loan_approval",
                "Loan Approval",
                EvaluationMode::FirstMatch,
                vec![
                    RuleDefinition::new(
                        "approve",
                        vec![
                            ConditionDefinition::expr("credit_score >= 700"),
                            ConditionDefinition::expr("annual_income > 50000"),
                        ],
                        Outcome::Action("Approve".to_string()),
                    ),
                    RuleDefinition::new(
                        "review",
                        vec![ConditionDefinition::expr("credit_score >= 600")],
                        Outcome::Action("Review".to_string()),
                    ),
                ],
            )
            .with_fallback(Outcome::Action("Reject".to_string())),
        )
        .unwrap()
    }

    fn scoring(contributions: &[(&str, &str, i64)]) -> RuleSet {
        RuleSetCompiler::compile(RuleSetDefinition::new(
            "scoring",
            "Scoring",
            EvaluationMode::Accumulate,
            contributions
                .iter()
                .map(|(id, expr, points)| {
                    RuleDefinition::new(
                        *id,
                        vec![ConditionDefinition::expr(*expr)],
                        Outcome::ScoreContribution(*points),
                    )
                })
                .collect(),
        ))
        .unwrap()
    }

    #[test]
    fn test_first_match_stops_at_first_rule() {
        let ruleset = loan_approval();
        let record = Record::new()
            .with("credit_score", 750)
            .with("annual_income", 60000);

        let decision = evaluate(&ruleset, &record);
        assert_eq!(decision.outcome, DecisionOutcome::Action("Approve".to_string()));
        assert_eq!(decision.matched_rule_ids, vec!["approve"]);
        assert_eq!(decision.ruleset_id, "loan_approval");
        assert_eq!(decision.record_snapshot, record);
    }

    #[test]
    fn test_first_match_falls_through() {
        let ruleset = loan_approval();
        let record = Record::new()
            .with("credit_score", 650)
            .with("annual_income", 60000);

        let decision = evaluate(&ruleset, &record);
        assert_eq!(decision.outcome, DecisionOutcome::Action("Review".to_string()));
        assert_eq!(decision.matched_rule_ids, vec!["review"]);
    }

    #[test]
    fn test_fallback_when_exhausted() {
        let ruleset = loan_approval();
        let decision = evaluate(&ruleset, &Record::new().with("credit_score", 500));
        assert_eq!(decision.outcome, DecisionOutcome::Action("Reject".to_string()));
        assert!(decision.matched_rule_ids.is_empty());
    }

    #[test]
    fn test_no_decision_without_fallback() {
        let ruleset = scoring(&[("R1", "a > 1", 10)]);
        let decision = evaluate(&ruleset, &Record::new().with("a", 0));
        assert_eq!(decision.outcome, DecisionOutcome::NoDecision);
    }

    #[test]
    fn test_accumulate_sums_matches_in_order() {
        let ruleset = scoring(&[
            ("R1", "company_size >= 50", 30),
            ("R2", "industry == 'retail'", 25),
            ("R3", "budget > 10000", 40),
        ]);
        let record = Record::new()
            .with("company_size", 120)
            .with("industry", "tech")
            .with("budget", 25000);

        let decision = evaluate(&ruleset, &record);
        assert_eq!(decision.outcome, DecisionOutcome::Score(70));
        assert_eq!(decision.matched_rule_ids, vec!["R1", "R3"]);
    }

    #[test]
    fn test_accumulate_saturates() {
        let ruleset = scoring(&[("R1", "a > 0", i64::MAX), ("R2", "a > 0", 1)]);
        let decision = evaluate(&ruleset, &Record::new().with("a", 1));
        assert_eq!(decision.outcome, DecisionOutcome::Score(i64::MAX));
    }

    #[test]
    fn test_accumulate_collects_violations() {
        let ruleset = RuleSetCompiler::compile(RuleSetDefinition::new(
            "quality",
            "Data Quality",
            EvaluationMode::Accumulate,
            vec![
                RuleDefinition::new(
                    "age_range",
                    vec![ConditionDefinition::expr("age < 0")],
                    Outcome::Violation("age must be non-negative".to_string()),
                ),
                RuleDefinition::new(
                    "country",
                    vec![ConditionDefinition::expr("country == ''")],
                    Outcome::Violation("country is required".to_string()),
                ),
            ],
        ))
        .unwrap();

        let decision = evaluate(&ruleset, &Record::new().with("age", -3).with("country", "US"));
        assert_eq!(
            decision.outcome,
            DecisionOutcome::Violations(vec!["age must be non-negative".to_string()])
        );
    }

    #[test]
    fn test_trace_records_short_circuit() {
        let ruleset = loan_approval();
        let executor = RuleExecutor::new().with_trace();
        let evaluation = executor.execute(&ruleset, &Record::new().with("credit_score", 500));

        assert!(evaluation.evaluation_trace.iter().any(|t| t.contains("短路")));
        assert!(
            evaluation
                .evaluation_trace
                .iter()
                .any(|t| t.contains("approve.conditions[0]") && t.contains("NOT_MATCHED"))
        );
        assert!(evaluation.evaluation_trace.iter().any(|t| t.contains("兜底")));
    }

    #[test]
    fn test_trace_disabled_by_default() {
        let evaluation = RuleExecutor::new().execute(&loan_approval(), &Record::new());
        assert!(evaluation.evaluation_trace.is_empty());
        assert!(evaluation.evaluation_time_ms >= 0);
    }

    fn order_routing() -> RuleSet {
        RuleSetCompiler::compile(
            RuleSetDefinition::new(
                "order_routing",
                "Order Routing",
                EvaluationMode::FirstMatch,
                vec![RuleDefinition::new(
                    "bulk",
                    vec![ConditionDefinition::expr("total >= 1000")],
                    Outcome::Action("Bulk".to_string()),
                )],
            )
            .with_derivation(Derivation::Arithmetic {
                to: "total".to_string(),
                left: Operand::Field("price".to_string()),
                op: ArithmeticOp::Multiply,
                right: Operand::Field("quantity".to_string()),
            }),
        )
        .unwrap()
    }

    #[test]
    fn test_derivations_apply_to_working_copy_only() {
        let record = Record::new().with("price", 250).with("quantity", 4);
        let decision = evaluate(&order_routing(), &record);

        assert_eq!(decision.outcome, DecisionOutcome::Action("Bulk".to_string()));
        assert_eq!(decision.record_snapshot.get("total"), None);
    }

    #[test]
    fn test_failed_derivation_hides_supplied_target() {
        // 缺少 price 时 total 不可派生，调用方传入的 total 不参与匹配
        let record = Record::new().with("quantity", 4).with("total", 5000);
        let decision = evaluate(&order_routing(), &record);

        assert_eq!(decision.outcome, DecisionOutcome::NoDecision);
        assert!(decision.matched_rule_ids.is_empty());
        assert_eq!(decision.record_snapshot.get("total"), Some(&Value::Number(5000.0)));
    }

    #[test]
    fn test_accumulate_fallback_only_without_matches() {
        let ruleset = RuleSetCompiler::compile(
            RuleSetDefinition::new(
                "lead_scoring",
                "Lead Scoring",
                EvaluationMode::Accumulate,
                vec![
                    RuleDefinition::new(
                        "R1",
                        vec![ConditionDefinition::expr("company_size >= 50")],
                        Outcome::ScoreContribution(30),
                    ),
                    RuleDefinition::new(
                        "R2",
                        vec![ConditionDefinition::expr("budget > 10000")],
                        Outcome::ScoreContribution(40),
                    ),
                ],
            )
            .with_fallback(Outcome::ScoreContribution(5)),
        )
        .unwrap();

        let unmatched = evaluate(&ruleset, &Record::new().with("company_size", 10));
        assert!(unmatched.matched_rule_ids.is_empty());
        assert_eq!(unmatched.outcome, DecisionOutcome::Score(5));

        let matched = evaluate(&ruleset, &Record::new().with("budget", 20000));
        assert_eq!(matched.matched_rule_ids, vec!["R2"]);
        assert_eq!(matched.outcome, DecisionOutcome::Score(40));
    }

    #[test]
    fn test_determinism_and_batch() {
        let ruleset = loan_approval();
        let records = vec![
            Record::new().with("credit_score", 750).with("annual_income", 60000),
            Record::new().with("credit_score", 650),
            Record::new(),
        ];

        let first = RuleExecutor::new().evaluate_batch(&ruleset, &records);
        let second = RuleExecutor::new().evaluate_batch(&ruleset, &records);
        assert_eq!(first.len(), 3);
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.outcome, b.outcome);
            assert_eq!(a.matched_rule_ids, b.matched_rule_ids);
            assert_ne!(a.id, b.id);
        }
    }

    #[test]
    fn test_rule_matcher() {
        let ruleset = loan_approval();
        let approve = &ruleset.rules()[0];
        assert!(RuleMatcher::matches(
            approve,
            &Record::new().with("credit_score", 700).with("annual_income", 50001)
        ));
        assert!(!RuleMatcher::matches(approve, &Record::new().with("credit_score", 700)));
    }
}
