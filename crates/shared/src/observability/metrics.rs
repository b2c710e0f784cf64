//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::ObservabilityConfig;

/// 全局 Prometheus handle，用于渲染指标
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics 资源守卫
pub struct MetricsHandle {
    server_handle: tokio::task::JoinHandle<()>,
}

impl Drop for MetricsHandle {
    fn drop(&mut self) {
        self.server_handle.abort();
    }
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    // 保存到全局，供其他地方获取指标快照
    let _ = PROMETHEUS_HANDLE.set(handle.clone());

    register_common_metrics(&config.service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle { server_handle })
}

/// 注册规则引擎的指标描述
///
/// 这些描述会出现在 /metrics 端点的 HELP 注释中
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!("rule_evaluations_total", "Total number of rule set evaluations");
    metrics::describe_histogram!(
        "rule_evaluation_duration_seconds",
        "Rule set evaluation duration in seconds"
    );
    metrics::describe_counter!(
        "ruleset_definitions_total",
        "Total number of rule set definition attempts"
    );
    metrics::describe_counter!(
        "decision_log_failures_total",
        "Total number of decisions that could not be appended to the audit log"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

/// 启动指标 HTTP 服务器
async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

/// 获取全局 Prometheus handle（用于自定义渲染）
pub fn get_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录规则集评估
#[inline]
pub fn record_rule_evaluation(ruleset_id: &str, outcome: &str, duration_secs: f64) {
    metrics::counter!(
        "rule_evaluations_total",
        "ruleset_id" => ruleset_id.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "rule_evaluation_duration_seconds",
        "ruleset_id" => ruleset_id.to_string()
    )
    .record(duration_secs);
}

/// 记录规则集定义
#[inline]
pub fn record_ruleset_definition(status: &str) {
    metrics::counter!("ruleset_definitions_total", "status" => status.to_string()).increment(1);
}

/// 记录审计日志写入失败
#[inline]
pub fn record_decision_log_failure(ruleset_id: &str) {
    metrics::counter!(
        "decision_log_failures_total",
        "ruleset_id" => ruleset_id.to_string()
    )
    .increment(1);
}
