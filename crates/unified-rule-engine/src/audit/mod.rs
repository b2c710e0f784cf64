//! 决策日志
//!
//! 只追加的决策记录，不提供修改和删除。查询按写入顺序返回，可按规则集过滤。

mod file;
mod memory;

pub use file::JsonlDecisionLog;
pub use memory::InMemoryDecisionLog;

use crate::error::LogError;
use crate::models::Decision;

/// 决策日志接口
///
/// 并发追加会被串行化为与调用顺序一致的全序。
#[cfg_attr(test, mockall::automock)]
pub trait DecisionLog: Send + Sync {
    /// 追加决策
    fn append(&self, decision: Decision) -> Result<(), LogError>;

    /// 按写入顺序查询决策，`ruleset_id` 为 None 时返回全部
    fn query<'a>(&self, ruleset_id: Option<&'a str>) -> Result<Vec<Decision>, LogError>;
}

fn matches_filter(decision: &Decision, ruleset_id: Option<&str>) -> bool {
    ruleset_id.is_none_or(|id| decision.ruleset_id == id)
}
