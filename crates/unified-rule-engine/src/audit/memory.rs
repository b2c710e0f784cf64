use super::{DecisionLog, matches_filter};
use crate::error::LogError;
use crate::models::Decision;
use parking_lot::RwLock;

/// 内存决策日志
#[derive(Debug, Default)]
pub struct InMemoryDecisionLog {
    decisions: RwLock<Vec<Decision>>,
}

impl InMemoryDecisionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.decisions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.read().is_empty()
    }
}

impl DecisionLog for InMemoryDecisionLog {
    fn append(&self, decision: Decision) -> Result<(), LogError> {
        self.decisions.write().push(decision);
        Ok(())
    }

    fn query(&self, ruleset_id: Option<&str>) -> Result<Vec<Decision>, LogError> {
        Ok(self
            .decisions
            .read()
            .iter()
            .filter(|d| matches_filter(d, ruleset_id))
            .cloned()
            .collect())
    }
}
