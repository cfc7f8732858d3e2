//! 指标导出

use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

use fleet_core::ObservabilityConfig;

/// 安装Prometheus指标导出器，未启用时直接返回
///
/// 必须在tokio运行时内调用，HTTP监听任务由导出器自行启动。
pub fn init_metrics(config: &ObservabilityConfig) -> Result<bool> {
    if !config.metrics_enabled {
        return Ok(false);
    }

    let addr: SocketAddr = config
        .metrics_bind_address
        .parse()
        .with_context(|| format!("无效的指标监听地址: {}", config.metrics_bind_address))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    describe_metrics();
    info!("Prometheus指标导出已启用: http://{}/metrics", addr);
    Ok(true)
}

fn describe_metrics() {
    describe_counter!(
        "fleet_jobs_dispatched_total",
        "按结果统计的已分派作业数"
    );
    describe_histogram!(
        "fleet_job_duration_ms",
        Unit::Milliseconds,
        "节点执行单个作业的耗时"
    );
    describe_counter!("fleet_batches_total", "按最终状态统计的批次数");
    describe_counter!(
        "fleet_health_cache_refresh_total",
        "健康缓存刷新次数"
    );
    describe_gauge!("fleet_health_cache_nodes", "最近一次刷新验证通过的节点数");
    describe_counter!("fleet_node_probe_failures_total", "节点探活失败次数");
}
