//! 统一规则引擎流式评估服务
//!
//! 从标准输入逐行读取评估请求 `{"ruleset_id": ..., "record": {...}}`，
//! 每个请求向标准输出写一行评估回执。

use anyhow::{Context, Result};
use rule_engine::{EngineError, Record, RuleEngineService};
use rules_shared::config::AppConfig;
use rules_shared::observability;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::{error, info, warn};

/// 评估请求
#[derive(Debug, Deserialize)]
struct EvaluationRequest {
    ruleset_id: String,
    #[serde(default)]
    record: Record,
}

/// 请求失败时输出的错误行
#[derive(Debug, Serialize)]
struct ErrorLine {
    code: &'static str,
    message: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load("unified-rule-engine").unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });

    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!("Starting unified-rule-engine stream runner...");

    let engine_config = config.engine.clone();
    let service = tokio::task::spawn_blocking(move || RuleEngineService::from_config(&engine_config))
        .await
        .context("engine initialization task panicked")??;
    let service = Arc::new(service);
    info!("Rule engine initialized with {} rule sets", service.registry().len());

    tokio::select! {
        result = run(Arc::clone(&service)) => {
            if let Err(e) = &result {
                error!("Stream runner failed: {:#}", e);
            }
            result?;
            info!("Input closed, shutting down");
        }
        _ = shutdown_signal() => {}
    }

    info!("Service shutdown complete");
    Ok(())
}

/// 逐行处理评估请求直到输入结束
async fn run(service: Arc<RuleEngineService>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let output = match serde_json::from_str::<EvaluationRequest>(&line) {
            Ok(request) => {
                let service = Arc::clone(&service);
                let result = tokio::task::spawn_blocking(move || {
                    service.evaluate(&request.ruleset_id, &request.record)
                })
                .await
                .context("evaluation task panicked")?;

                match result {
                    Ok(receipt) => serde_json::to_string(&receipt)?,
                    Err(e) => error_line(&e)?,
                }
            }
            Err(e) => {
                warn!("Invalid evaluation request: {}", e);
                serde_json::to_string(&ErrorLine {
                    code: "INVALID_REQUEST",
                    message: e.to_string(),
                })?
            }
        };

        stdout.write_all(output.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    Ok(())
}

fn error_line(err: &EngineError) -> serde_json::Result<String> {
    warn!(code = err.code(), "Evaluation request rejected: {}", err);
    serde_json::to_string(&ErrorLine {
        code: err.code(),
        message: err.to_string(),
    })
}

/// 优雅关闭信号处理
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        }
    }
}
