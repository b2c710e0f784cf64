//! 规则集快照仓储
//!
//! 将已定义的规则集保存为按 ID 索引的 JSON 文档。写入先落到临时文件再重命名，
//! 读取时返回未校验的定义，由注册表重新编译校验。

use crate::error::RepositoryError;
use crate::models::{RuleSet, RuleSetDefinition};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    rulesets: BTreeMap<String, RuleSetDefinition>,
}

/// 规则集快照仓储
#[derive(Debug, Clone)]
pub struct RuleSetRepository {
    path: PathBuf,
}

impl RuleSetRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取快照中的规则集定义，文件不存在时返回空列表
    ///
    /// 结果按定义时间排序，保证恢复后的列表顺序与保存前一致。
    pub fn load(&self) -> Result<Vec<RuleSetDefinition>, RepositoryError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("规则集快照不存在: {}", self.path.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let snapshot: Snapshot = serde_json::from_str(&content)?;
        let mut definitions: Vec<_> = snapshot.rulesets.into_values().collect();
        definitions.sort_by(|a, b| a.defined_at.cmp(&b.defined_at).then_with(|| a.id.cmp(&b.id)));

        info!(
            "已读取规则集快照: {} ({} 个规则集)",
            self.path.display(),
            definitions.len()
        );
        Ok(definitions)
    }

    /// 保存规则集快照（临时文件 + 重命名）
    pub fn save(&self, rulesets: &[Arc<RuleSet>]) -> Result<(), RepositoryError> {
        let snapshot = Snapshot {
            rulesets: rulesets
                .iter()
                .map(|r| (r.id().to_string(), r.to_definition()))
                .collect(),
        };
        let json = serde_json::to_string_pretty(&snapshot)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let tmp_path = self.path.with_extension("tmp");
        {
            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;

        debug!(
            "规则集快照已保存: {} ({} 个规则集)",
            self.path.display(),
            rulesets.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConditionDefinition, EvaluationMode, Outcome, RuleDefinition};
    use crate::store::RuleSetRegistry;
    use tempfile::tempdir;

    fn definition(id: &str) -> RuleSetDefinition {
        RuleSetDefinition::new(
            id,
            "Loan Approval",
            EvaluationMode::FirstMatch,
            vec![RuleDefinition::new(
                "approve",
                vec![ConditionDefinition::new("credit_score", ">=", 700)],
                Outcome::Action("Approve".to_string()),
            )],
        )
        .with_fallback(Outcome::Action("Reject".to_string()))
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let repo = RuleSetRepository::new(dir.path().join("rulesets.json"));
        assert!(repo.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let repo = RuleSetRepository::new(dir.path().join("state").join("rulesets.json"));

        let registry = RuleSetRegistry::new();
        registry.define(definition("loan_a")).unwrap();
        registry.define(definition("loan_b")).unwrap();
        repo.save(&registry.list()).unwrap();
        assert!(!dir.path().join("state").join("rulesets.tmp").exists());

        let restored = RuleSetRegistry::new();
        let loaded = restored.load_batch(repo.load().unwrap());
        assert_eq!(loaded.len(), 2);
        assert_eq!(
            restored.get("loan_a").unwrap().as_ref(),
            registry.get("loan_a").unwrap().as_ref()
        );
    }

    #[test]
    fn test_corrupted_snapshot_is_format_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rulesets.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = RuleSetRepository::new(&path).load().unwrap_err();
        assert!(matches!(err, RepositoryError::Format(_)));
    }
}
