//! 规则引擎服务
//!
//! 组合注册表、执行器、决策日志与可选的快照仓储，对外提供定义、查询与评估接口。
//! 决策日志写入失败不会影响决策本身，只在回执中标记。

use crate::audit::{DecisionLog, InMemoryDecisionLog, JsonlDecisionLog};
use crate::error::{EngineError, RepositoryError, Result};
use crate::executor::RuleExecutor;
use crate::models::{Decision, EvaluationMode, RuleSet, RuleSetDefinition};
use crate::report::DecisionSummary;
use crate::repository::RuleSetRepository;
use crate::store::RuleSetRegistry;
use crate::value::Record;
use chrono::{DateTime, Utc};
use rules_shared::config::EngineConfig;
use rules_shared::observability::metrics;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// 决策日志写入状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LogStatus {
    Recorded,
    Failed { reason: String },
}

impl LogStatus {
    pub fn is_recorded(&self) -> bool {
        matches!(self, Self::Recorded)
    }
}

/// 评估回执：决策 + 日志写入状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReceipt {
    pub decision: Decision,
    pub log_status: LogStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evaluation_trace: Vec<String>,
}

/// 规则集摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSetSummary {
    pub id: String,
    pub name: String,
    pub evaluation_mode: EvaluationMode,
    pub rules_count: usize,
    pub has_fallback: bool,
    pub required_attributes: Vec<String>,
    pub defined_at: DateTime<Utc>,
}

impl From<&RuleSet> for RuleSetSummary {
    fn from(ruleset: &RuleSet) -> Self {
        Self {
            id: ruleset.id().to_string(),
            name: ruleset.name().to_string(),
            evaluation_mode: ruleset.evaluation_mode(),
            rules_count: ruleset.rules().len(),
            has_fallback: ruleset.fallback_outcome().is_some(),
            required_attributes: ruleset.required_attributes().iter().cloned().collect(),
            defined_at: ruleset.defined_at(),
        }
    }
}

/// 规则引擎服务
pub struct RuleEngineService {
    registry: RuleSetRegistry,
    executor: RuleExecutor,
    decision_log: Arc<dyn DecisionLog>,
    repository: Option<RuleSetRepository>,
    /// 定义与快照保存串行执行，保证快照与注册表一致
    define_lock: parking_lot::Mutex<()>,
}

impl RuleEngineService {
    pub fn new(decision_log: Arc<dyn DecisionLog>) -> Self {
        Self {
            registry: RuleSetRegistry::new(),
            executor: RuleExecutor::new(),
            decision_log,
            repository: None,
            define_lock: parking_lot::Mutex::new(()),
        }
    }

    /// 使用内存决策日志
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryDecisionLog::new()))
    }

    /// 按配置构建服务：打开决策日志，并从快照恢复规则集
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let decision_log: Arc<dyn DecisionLog> = match &config.decision_log_path {
            Some(path) => Arc::new(JsonlDecisionLog::open(path)?),
            None => Arc::new(InMemoryDecisionLog::new()),
        };

        let mut service = Self::new(decision_log);
        if config.trace_enabled {
            service = service.with_trace();
        }
        if let Some(path) = &config.rulesets_path {
            service = service.with_repository(RuleSetRepository::new(path))?;
        }
        Ok(service)
    }

    /// 启用评估追踪
    pub fn with_trace(mut self) -> Self {
        self.executor = self.executor.with_trace();
        self
    }

    /// 配置快照仓储，并把快照中的规则集加载到注册表
    pub fn with_repository(mut self, repository: RuleSetRepository) -> Result<Self> {
        let definitions = repository.load()?;
        let stored_ids: Vec<String> = definitions.iter().map(|d| d.id.clone()).collect();
        let loaded = self.registry.load_batch(definitions);

        // 有规则集加载失败时拒绝启动，否则下次保存快照会把它们覆盖掉
        if loaded.len() != stored_ids.len() {
            let rejected: Vec<String> = stored_ids
                .into_iter()
                .filter(|id| !loaded.contains(id))
                .collect();
            return Err(RepositoryError::RejectedRuleSets(rejected.join(", ")).into());
        }
        info!(
            "已从快照恢复 {} 个规则集: {}",
            loaded.len(),
            repository.path().display()
        );
        self.repository = Some(repository);
        Ok(self)
    }

    pub fn registry(&self) -> &RuleSetRegistry {
        &self.registry
    }

    /// 定义规则集
    #[instrument(skip(self, definition), fields(ruleset_id = %definition.id))]
    pub fn define_ruleset(&self, definition: RuleSetDefinition) -> Result<Arc<RuleSet>> {
        let _guard = self.define_lock.lock();

        let ruleset = match self.registry.prepare(definition) {
            Ok(ruleset) => Arc::new(ruleset),
            Err(e) => {
                metrics::record_ruleset_definition("rejected");
                return Err(e.into());
            }
        };

        // 先保存包含新规则集的快照，成功后才对评估可见
        if let Some(repository) = &self.repository {
            let mut snapshot = self.registry.list();
            snapshot.push(Arc::clone(&ruleset));
            if let Err(e) = repository.save(&snapshot) {
                warn!("规则集快照保存失败, 定义未生效: {} - {}", ruleset.id(), e);
                metrics::record_ruleset_definition("failed");
                return Err(e.into());
            }
        }

        let ruleset = match self.registry.insert(ruleset) {
            Ok(ruleset) => ruleset,
            Err(e) => {
                metrics::record_ruleset_definition("rejected");
                return Err(e.into());
            }
        };

        metrics::record_ruleset_definition("defined");
        Ok(ruleset)
    }

    /// 获取规则集
    pub fn get_ruleset(&self, ruleset_id: &str) -> Result<Arc<RuleSet>> {
        self.registry
            .get(ruleset_id)
            .ok_or_else(|| EngineError::RuleSetNotFound(ruleset_id.to_string()))
    }

    /// 列出所有规则集摘要
    pub fn list_rulesets(&self) -> Vec<RuleSetSummary> {
        self.registry
            .list()
            .iter()
            .map(|r| RuleSetSummary::from(r.as_ref()))
            .collect()
    }

    /// 评估记录并写入决策日志
    #[instrument(skip(self, record))]
    pub fn evaluate(&self, ruleset_id: &str, record: &Record) -> Result<EvaluationReceipt> {
        let ruleset = self.get_ruleset(ruleset_id)?;
        Ok(self.evaluate_with(&ruleset, record))
    }

    /// 批量评估，按输入顺序返回回执
    #[instrument(skip(self, records), fields(count = records.len()))]
    pub fn evaluate_batch(
        &self,
        ruleset_id: &str,
        records: &[Record],
    ) -> Result<Vec<EvaluationReceipt>> {
        let ruleset = self.get_ruleset(ruleset_id)?;
        Ok(records
            .iter()
            .map(|record| self.evaluate_with(&ruleset, record))
            .collect())
    }

    /// 查询决策日志
    pub fn list_decisions(&self, ruleset_id: Option<&str>) -> Result<Vec<Decision>> {
        Ok(self.decision_log.query(ruleset_id)?)
    }

    /// 汇总决策日志
    pub fn summarize(&self, ruleset_id: Option<&str>) -> Result<DecisionSummary> {
        let decisions = self.list_decisions(ruleset_id)?;
        Ok(DecisionSummary::from_decisions(&decisions))
    }

    fn evaluate_with(&self, ruleset: &RuleSet, record: &Record) -> EvaluationReceipt {
        let start = Instant::now();
        let evaluation = self.executor.execute(ruleset, record);
        let decision = evaluation.decision;

        metrics::record_rule_evaluation(
            ruleset.id(),
            decision.outcome.kind(),
            start.elapsed().as_secs_f64(),
        );

        for line in &evaluation.evaluation_trace {
            debug!(ruleset_id = %ruleset.id(), "{}", line);
        }

        let log_status = match self.decision_log.append(decision.clone()) {
            Ok(()) => LogStatus::Recorded,
            Err(e) => {
                warn!("决策日志写入失败: {} - {}", decision.id, e);
                metrics::record_decision_log_failure(ruleset.id());
                LogStatus::Failed {
                    reason: e.to_string(),
                }
            }
        };

        debug!(
            decision_id = %decision.id,
            outcome = decision.outcome.kind(),
            matched = decision.matched_rule_ids.len(),
            "规则集评估完成"
        );

        EvaluationReceipt {
            decision,
            log_status,
            evaluation_trace: evaluation.evaluation_trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MockDecisionLog;
    use crate::error::{DefinitionError, LogError};
    use crate::models::{ConditionDefinition, DecisionOutcome, Outcome, RuleDefinition};

    fn loan_approval() -> RuleSetDefinition {
        RuleSetDefinition::new(
            "loan_approval",
            "Loan Approval",
            EvaluationMode::FirstMatch,
            vec![RuleDefinition::new(
                "R1",
                vec![ConditionDefinition::expr("credit_score >= 700")],
                Outcome::Action("Approve".to_string()),
            )],
        )
    }

    #[test]
    fn test_define_and_get() {
        let service = RuleEngineService::in_memory();
        service.define_ruleset(loan_approval()).unwrap();

        let ruleset = service.get_ruleset("loan_approval").unwrap();
        assert_eq!(ruleset.name(), "Loan Approval");

        let summaries = service.list_rulesets();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].rules_count, 1);
        assert_eq!(summaries[0].required_attributes, vec!["credit_score"]);
        assert!(!summaries[0].has_fallback);
    }

    #[test]
    fn test_duplicate_definition() {
        let service = RuleEngineService::in_memory();
        service.define_ruleset(loan_approval()).unwrap();

        let err = service.define_ruleset(loan_approval()).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Definition(DefinitionError::DuplicateId(_))
        ));
        assert_eq!(err.code(), "DUPLICATE_ID");
    }

    #[test]
    fn test_evaluate_unknown_ruleset() {
        let service = RuleEngineService::in_memory();
        let err = service.evaluate("missing", &Record::new()).unwrap_err();
        assert_eq!(err.code(), "RULESET_NOT_FOUND");
    }

    #[test]
    fn test_evaluate_records_decision() {
        let service = RuleEngineService::in_memory();
        service.define_ruleset(loan_approval()).unwrap();

        let receipt = service
            .evaluate("loan_approval", &Record::new().with("credit_score", 750))
            .unwrap();
        assert!(receipt.log_status.is_recorded());
        assert_eq!(receipt.decision.matched_rule_ids, vec!["R1"]);

        let logged = service.list_decisions(Some("loan_approval")).unwrap();
        assert_eq!(logged, vec![receipt.decision]);
    }

    #[test]
    fn test_log_failure_does_not_suppress_decision() {
        let mut log = MockDecisionLog::new();
        log.expect_append()
            .times(1)
            .returning(|_| Err(LogError::Unavailable("disk full".to_string())));

        let service = RuleEngineService::new(Arc::new(log));
        service.define_ruleset(loan_approval()).unwrap();

        let receipt = service
            .evaluate("loan_approval", &Record::new().with("credit_score", 720))
            .unwrap();

        assert_eq!(
            receipt.decision.outcome,
            DecisionOutcome::Action("Approve".to_string())
        );
        assert!(matches!(
            receipt.log_status,
            LogStatus::Failed { ref reason } if reason.contains("disk full")
        ));
    }

    #[test]
    fn test_query_failure_is_surfaced() {
        let mut log = MockDecisionLog::new();
        log.expect_query()
            .returning(|_| Err(LogError::Unavailable("offline".to_string())));

        let service = RuleEngineService::new(Arc::new(log));
        let err = service.list_decisions(None).unwrap_err();
        assert_eq!(err.code(), "LOG_UNAVAILABLE");
    }

    #[test]
    fn test_trace_included_in_receipt() {
        let service = RuleEngineService::in_memory().with_trace();
        service.define_ruleset(loan_approval()).unwrap();

        let receipt = service.evaluate("loan_approval", &Record::new()).unwrap();
        assert!(!receipt.evaluation_trace.is_empty());
        assert_eq!(receipt.decision.outcome, DecisionOutcome::NoDecision);
    }

    #[test]
    fn test_summarize() {
        let service = RuleEngineService::in_memory();
        service.define_ruleset(loan_approval()).unwrap();
        service
            .evaluate_batch(
                "loan_approval",
                &[
                    Record::new().with("credit_score", 750),
                    Record::new().with("credit_score", 650),
                ],
            )
            .unwrap();

        let summary = service.summarize(None).unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.actions.get("Approve"), Some(&1));
        assert_eq!(summary.no_decision, 1);
    }
}
