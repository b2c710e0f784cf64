//! 规则集注册表
//!
//! 使用 DashMap 提供线程安全的规则集存储。规则集定义后不可变，
//! 同一 ID 只能定义一次，并发定义时只有一个调用者成功。

use crate::compiler::RuleSetCompiler;
use crate::error::DefinitionError;
use crate::models::{RuleSet, RuleSetDefinition};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// 规则集注册表
///
/// 显式构造并通过克隆共享句柄，内部为 `Arc<DashMap>`。
#[derive(Clone, Default)]
pub struct RuleSetRegistry {
    rulesets: Arc<DashMap<String, Arc<RuleSet>>>,
}

impl RuleSetRegistry {
    /// 创建新的注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取当前注册的规则集数量
    pub fn len(&self) -> usize {
        self.rulesets.len()
    }

    /// 检查注册表是否为空
    pub fn is_empty(&self) -> bool {
        self.rulesets.is_empty()
    }

    /// 编译并注册规则集
    #[instrument(skip(self, definition), fields(ruleset_id = %definition.id))]
    pub fn define(&self, definition: RuleSetDefinition) -> Result<Arc<RuleSet>, DefinitionError> {
        let ruleset = self.prepare(definition)?;
        self.insert(Arc::new(ruleset))
    }

    /// 编译尚未注册的规则集，不写入注册表
    pub fn prepare(&self, definition: RuleSetDefinition) -> Result<RuleSet, DefinitionError> {
        if self.rulesets.contains_key(&definition.id) {
            warn!("规则集已存在: {}", definition.id);
            return Err(DefinitionError::DuplicateId(definition.id));
        }

        RuleSetCompiler::compile(definition)
    }

    /// 注册已编译的规则集，ID 冲突时拒绝
    ///
    /// 检查与插入在同一个分片锁内完成。
    #[instrument(skip(self, ruleset), fields(ruleset_id = %ruleset.id()))]
    pub fn insert(&self, ruleset: Arc<RuleSet>) -> Result<Arc<RuleSet>, DefinitionError> {
        match self.rulesets.entry(ruleset.id().to_string()) {
            Entry::Occupied(entry) => {
                warn!("规则集已存在: {}", entry.key());
                Err(DefinitionError::DuplicateId(entry.key().clone()))
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::clone(&ruleset));
                info!(
                    rules = ruleset.rules().len(),
                    mode = %ruleset.evaluation_mode(),
                    "规则集已定义: {}",
                    ruleset.id()
                );
                Ok(ruleset)
            }
        }
    }

    /// 获取规则集
    pub fn get(&self, ruleset_id: &str) -> Option<Arc<RuleSet>> {
        self.rulesets.get(ruleset_id).map(|r| Arc::clone(r.value()))
    }

    /// 检查规则集是否存在
    pub fn contains(&self, ruleset_id: &str) -> bool {
        self.rulesets.contains_key(ruleset_id)
    }

    /// 获取所有规则集，按定义时间和 ID 排序
    pub fn list(&self) -> Vec<Arc<RuleSet>> {
        let mut rulesets: Vec<_> = self
            .rulesets
            .iter()
            .map(|r| Arc::clone(r.value()))
            .collect();
        rulesets.sort_by(|a, b| {
            a.defined_at()
                .cmp(&b.defined_at())
                .then_with(|| a.id().cmp(b.id()))
        });
        rulesets
    }

    /// 批量加载规则集，单个失败只记录日志，返回成功加载的 ID
    #[instrument(skip(self, definitions))]
    pub fn load_batch(&self, definitions: Vec<RuleSetDefinition>) -> Vec<String> {
        let mut loaded_ids = Vec::with_capacity(definitions.len());
        let mut errors = Vec::new();

        for definition in definitions {
            let ruleset_id = definition.id.clone();
            match self.define(definition) {
                Ok(_) => loaded_ids.push(ruleset_id),
                Err(e) => errors.push((ruleset_id, e)),
            }
        }

        if !errors.is_empty() {
            warn!("批量加载部分失败: {:?}", errors);
        }

        info!("批量加载完成: {} 成功, {} 失败", loaded_ids.len(), errors.len());
        loaded_ids
    }

    /// 获取注册表统计信息
    pub fn stats(&self) -> RegistryStats {
        let rulesets_count = self.rulesets.len();
        let mut rules_count = 0;
        let mut total_attributes = 0;
        for entry in self.rulesets.iter() {
            rules_count += entry.rules().len();
            total_attributes += entry.required_attributes().len();
        }

        RegistryStats {
            rulesets_count,
            rules_count,
            avg_attributes_per_ruleset: if rulesets_count > 0 {
                total_attributes as f64 / rulesets_count as f64
            } else {
                0.0
            },
        }
    }
}

/// 注册表统计信息
#[derive(Debug, Clone)]
pub struct RegistryStats {
    /// 规则集总数
    pub rulesets_count: usize,
    /// 所有规则集中的规则总数
    pub rules_count: usize,
    /// 平均每个规则集引用的属性数
    pub avg_attributes_per_ruleset: f64,
}
