use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use metrics::{counter, gauge};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use fleet_core::{
    supersedes, FleetError, FleetResult, HealthCacheConfig, Node, NodeRegistry, NodeRpcClient,
    NodeStatusReport,
};

/// 缓存快照
#[derive(Debug, Default)]
struct HealthCacheEntry {
    nodes: Vec<Node>,
    captured_at: Option<Instant>,
}

impl HealthCacheEntry {
    fn is_fresh(&self, ttl: Duration, now: Instant) -> bool {
        match self.captured_at {
            Some(captured_at) => !self.nodes.is_empty() && now.duration_since(captured_at) < ttl,
            None => false,
        }
    }

    fn clear(&mut self) {
        self.nodes.clear();
        self.captured_at = None;
    }
}

/// 节点健康缓存
///
/// 维护一份经过实时探活验证的节点列表，每个TTL窗口最多刷新一次。
/// 刷新（拉取注册中心 + 探活全部候选节点）在持锁期间完成，
/// 其他读者等待刷新结束，不会看到部分更新的快照。
pub struct NodeHealthCache {
    registry: Arc<dyn NodeRegistry>,
    rpc: Arc<dyn NodeRpcClient>,
    config: HealthCacheConfig,
    entry: Mutex<HealthCacheEntry>,
}

impl NodeHealthCache {
    pub fn new(
        registry: Arc<dyn NodeRegistry>,
        rpc: Arc<dyn NodeRpcClient>,
        config: HealthCacheConfig,
    ) -> Self {
        Self {
            registry,
            rpc,
            config,
            entry: Mutex::new(HealthCacheEntry::default()),
        }
    }

    pub fn config(&self) -> &HealthCacheConfig {
        &self.config
    }

    /// 获取可用节点列表
    ///
    /// 快照未过期且非空时直接返回副本，不做探活。
    /// 注册中心不可达或返回空列表时返回空列表，且不修改已存储的快照，
    /// 下一次调用会立即重试。
    pub async fn get_available_nodes(&self) -> Vec<Node> {
        let mut entry = self.entry.lock().await;

        if entry.is_fresh(self.config.ttl(), Instant::now()) {
            debug!("使用缓存的节点列表: {} 个节点", entry.nodes.len());
            return entry.nodes.clone();
        }

        info!("刷新节点列表");

        let candidates = match self.registry.list_active_nodes().await {
            Ok(nodes) if !nodes.is_empty() => nodes,
            Ok(_) => {
                warn!("注册中心没有返回任何活跃节点");
                counter!("fleet_health_cache_refresh_total", "result" => "empty").increment(1);
                return Vec::new();
            }
            Err(e) => {
                warn!("无法从注册中心获取节点: {}", e);
                counter!("fleet_health_cache_refresh_total", "result" => "registry_error")
                    .increment(1);
                return Vec::new();
            }
        };

        info!("验证 {} 个候选节点的连通性", candidates.len());
        let verified = self.probe_candidates(candidates).await;
        let unique = dedup_by_address(verified);

        entry.nodes = unique.clone();
        entry.captured_at = Some(Instant::now());

        counter!("fleet_health_cache_refresh_total", "result" => "ok").increment(1);
        gauge!("fleet_health_cache_nodes").set(unique.len() as f64);

        if unique.is_empty() {
            warn!("没有通过验证的活跃节点");
        } else {
            info!("{} 个活跃节点已验证", unique.len());
            for node in &unique {
                debug!(
                    node_id = node.node_id,
                    "  - {}: {} (weight: {})",
                    node.name,
                    node.address(),
                    node.weight
                );
            }
        }

        unique
    }

    /// 清空快照，下一次调用无条件刷新
    pub async fn invalidate_cache(&self) {
        let mut entry = self.entry.lock().await;
        entry.clear();
        info!("节点缓存已失效");
    }

    /// 在可用节点中按ID查找
    pub async fn get_node_by_id(&self, node_id: i64) -> Option<Node> {
        self.get_available_nodes()
            .await
            .into_iter()
            .find(|node| node.node_id == node_id)
    }

    /// 探活单个节点，超时、连接失败或节点报告错误状态都视为不可达
    pub async fn probe_node(&self, node: &Node) -> FleetResult<NodeStatusReport> {
        let timeout = self.config.probe_timeout();
        match tokio::time::timeout(timeout, self.rpc.probe_status(node)).await {
            Ok(Ok(report)) if report.is_error() => Err(FleetError::NodeUnreachable {
                node_id: node.node_id,
                message: "节点报告错误状态".to_string(),
            }),
            Ok(Ok(report)) => Ok(report),
            Ok(Err(FleetError::NodeUnreachable { node_id, message })) => {
                Err(FleetError::NodeUnreachable { node_id, message })
            }
            Ok(Err(e)) => Err(FleetError::NodeUnreachable {
                node_id: node.node_id,
                message: e.to_string(),
            }),
            Err(_) => Err(FleetError::NodeUnreachable {
                node_id: node.node_id,
                message: format!("探活超时 ({}ms)", timeout.as_millis()),
            }),
        }
    }

    /// 并发探活候选节点，保持注册中心返回的顺序，不重试
    async fn probe_candidates(&self, candidates: Vec<Node>) -> Vec<Node> {
        let results: Vec<(Node, FleetResult<NodeStatusReport>)> = stream::iter(candidates)
            .map(|node| async move {
                let result = self.probe_node(&node).await;
                (node, result)
            })
            .buffered(self.config.probe_concurrency.max(1))
            .collect()
            .await;

        results
            .into_iter()
            .filter_map(|(node, result)| match result {
                Ok(report) => {
                    info!(
                        node_id = node.node_id,
                        cpu_usage = report.cpu_usage,
                        memory_usage = report.memory_usage,
                        "✓ {} ({}): 活跃",
                        node.name,
                        node.address()
                    );
                    Some(node)
                }
                Err(e) => {
                    warn!(node_id = node.node_id, "✗ {} ({}): 无响应 - {}", node.name, node.address(), e);
                    counter!("fleet_node_probe_failures_total").increment(1);
                    None
                }
            })
            .collect()
    }
}

/// 按地址去重，地址冲突时保留心跳更新的节点
///
/// 被替换的节点从原位置移除，新节点追加到末尾；心跳相同时保留先出现的节点。
pub fn dedup_by_address(nodes: Vec<Node>) -> Vec<Node> {
    let mut unique: Vec<Node> = Vec::with_capacity(nodes.len());

    for node in nodes {
        let address = node.address();
        match unique.iter().position(|n| n.address() == address) {
            None => unique.push(node),
            Some(index) => {
                if supersedes(&node, &unique[index]) {
                    warn!("地址重复 {}: 使用 {} (心跳更新)", address, node.name);
                    unique.remove(index);
                    unique.push(node);
                } else {
                    debug!("地址重复 {}: 忽略 {}", address, node.name);
                }
            }
        }
    }

    unique
}
