//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::observability::ObservabilityConfig;

/// 规则引擎配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// 规则集快照文件（JSON），为空时规则集只保存在内存中
    pub rulesets_path: Option<PathBuf>,
    /// 决策审计日志文件（JSON Lines），为空时使用内存日志
    pub decision_log_path: Option<PathBuf>,
    /// 是否记录详细评估追踪
    pub trace_enabled: bool,
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    pub engine: EngineConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. config/{service_name}.toml（服务特定配置）
    /// 4. 环境变量（RULES_ 前缀，双下划线分隔层级，如 RULES_ENGINE__DECISION_LOG_PATH -> engine.decision_log_path）
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());
        Self::load_from(service_name, Path::new(&config_dir))
    }

    /// 从指定目录加载配置
    pub fn load_from(service_name: &str, config_dir: &Path) -> Result<Self, ConfigError> {
        let env = std::env::var("RULES_ENV").unwrap_or_else(|_| "development".to_string());

        let builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env.clone())?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(format!("{}.toml", env))).required(false))
            .add_source(
                File::from(config_dir.join(format!("{}.toml", service_name))).required(false),
            )
            .add_source(
                Environment::with_prefix("RULES")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let mut config: Self = builder.build()?.try_deserialize()?;

        // 可观测性配置需要知道服务名
        if config.observability.service_name.is_empty() {
            config.observability.service_name = config.service_name.clone();
        }

        Ok(config)
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.engine.rulesets_path.is_none());
        assert!(config.engine.decision_log_path.is_none());
        assert!(!config.engine.trace_enabled);
        assert_eq!(config.observability.metrics_port, 9090);
    }

    #[test]
    fn test_load_without_files_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from("unified-rule-engine", dir.path()).unwrap();

        assert_eq!(config.service_name, "unified-rule-engine");
        assert_eq!(config.observability.service_name, "unified-rule-engine");
        assert_eq!(config.observability.log_level, "info");
        assert!(config.engine.decision_log_path.is_none());
    }

    #[test]
    fn test_service_file_overrides_default_file() {
        let dir = tempfile::tempdir().unwrap();

        let mut default = std::fs::File::create(dir.path().join("default.toml")).unwrap();
        writeln!(default, "[engine]\ntrace_enabled = false\nrulesets_path = \"a.json\"").unwrap();

        let mut service = std::fs::File::create(dir.path().join("rule-engine.toml")).unwrap();
        writeln!(
            service,
            "[engine]\ntrace_enabled = true\n\n[observability]\njson_logs = true\nmetrics_enabled = false"
        )
        .unwrap();

        let config = AppConfig::load_from("rule-engine", dir.path()).unwrap();

        assert!(config.engine.trace_enabled);
        assert_eq!(config.engine.rulesets_path, Some(PathBuf::from("a.json")));
        assert!(config.observability.json_logs);
        assert!(!config.observability.metrics_enabled);
    }

    #[test]
    fn test_is_production() {
        let config = AppConfig {
            environment: "production".to_string(),
            ..Default::default()
        };
        assert!(config.is_production());
        assert!(!AppConfig::default().is_production());
    }
}
