//! 决策报表
//!
//! 基于决策日志的汇总统计，以及调用方自定义的评分分级。
//! 分级是调用方策略，引擎本身只产出分数。

use crate::models::{Decision, DecisionOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 分数统计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreStats {
    pub count: usize,
    pub min: i64,
    pub max: i64,
    pub sum: i64,
    pub mean: f64,
}

impl ScoreStats {
    fn from_scores(scores: &[i64]) -> Option<Self> {
        let min = *scores.iter().min()?;
        let max = *scores.iter().max()?;
        let sum = scores.iter().fold(0i64, |acc, s| acc.saturating_add(*s));
        let mean = scores.iter().map(|s| *s as f64).sum::<f64>() / scores.len() as f64;
        Some(Self {
            count: scores.len(),
            min,
            max,
            sum,
            mean,
        })
    }
}

/// 决策汇总
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionSummary {
    pub total: usize,
    pub decided: usize,
    pub no_decision: usize,
    /// 各动作出现次数
    pub actions: BTreeMap<String, usize>,
    /// 各规则命中次数
    pub rule_hits: BTreeMap<String, usize>,
    /// 违规消息总数
    pub violations: usize,
    pub scores: Option<ScoreStats>,
    pub first_evaluated_at: Option<DateTime<Utc>>,
    pub last_evaluated_at: Option<DateTime<Utc>>,
}

impl DecisionSummary {
    pub fn from_decisions(decisions: &[Decision]) -> Self {
        let mut summary = Self {
            total: decisions.len(),
            ..Self::default()
        };
        let mut scores = Vec::new();

        for decision in decisions {
            for rule_id in &decision.matched_rule_ids {
                *summary.rule_hits.entry(rule_id.clone()).or_default() += 1;
            }

            match &decision.outcome {
                DecisionOutcome::Action(action) => {
                    *summary.actions.entry(action.clone()).or_default() += 1;
                }
                DecisionOutcome::Score(score) => scores.push(*score),
                DecisionOutcome::Violations(messages) => summary.violations += messages.len(),
                DecisionOutcome::NoDecision => summary.no_decision += 1,
            }

            summary.first_evaluated_at = Some(
                summary
                    .first_evaluated_at
                    .map_or(decision.evaluated_at, |t| t.min(decision.evaluated_at)),
            );
            summary.last_evaluated_at = Some(
                summary
                    .last_evaluated_at
                    .map_or(decision.evaluated_at, |t| t.max(decision.evaluated_at)),
            );
        }

        summary.decided = summary.total - summary.no_decision;
        summary.scores = ScoreStats::from_scores(&scores);
        summary
    }
}

/// 分数分级
///
/// `score >= threshold` 时取该等级，阈值从高到低匹配，都不满足时取默认等级。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeBands {
    bands: Vec<(i64, String)>,
    default_grade: String,
}

impl GradeBands {
    pub fn new(bands: Vec<(i64, String)>, default_grade: impl Into<String>) -> Self {
        let mut bands = bands;
        bands.sort_by(|a, b| b.0.cmp(&a.0));
        Self {
            bands,
            default_grade: default_grade.into(),
        }
    }

    /// 线索评分预设：>= 80 为 A，>= 50 为 B，其余为 C
    pub fn lead_scoring() -> Self {
        Self::new(vec![(80, "A".to_string()), (50, "B".to_string())], "C")
    }

    pub fn grade(&self, score: i64) -> &str {
        self.bands
            .iter()
            .find(|(threshold, _)| score >= *threshold)
            .map(|(_, grade)| grade.as_str())
            .unwrap_or(&self.default_grade)
    }

    /// 决策的等级分布，非分数决策不计入
    pub fn distribution(&self, decisions: &[Decision]) -> BTreeMap<String, usize> {
        let mut distribution = BTreeMap::new();
        for score in decisions.iter().filter_map(|d| d.outcome.score()) {
            *distribution.entry(self.grade(score).to_string()).or_default() += 1;
        }
        distribution
    }
}
