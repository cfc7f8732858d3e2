use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use fleet_core::Node;

use crate::health_cache::NodeHealthCache;

/// 单节点选择策略
#[async_trait]
pub trait NodeSelectionStrategy: Send + Sync {
    /// 从已验证节点中选择一个，没有合适节点时返回 `None`
    async fn select_node(&self, nodes: &[Node]) -> Option<Node>;

    fn name(&self) -> &str;
}

/// 加权最少连接策略
///
/// 得分 `current_load / (weight * max_concurrent_jobs)` 最小者胜出，得分相同时取靠前的节点。
/// 权重或最大并发为0的节点不参与选择。
pub struct WeightedLeastConnectionsStrategy;

impl WeightedLeastConnectionsStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WeightedLeastConnectionsStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeSelectionStrategy for WeightedLeastConnectionsStrategy {
    async fn select_node(&self, nodes: &[Node]) -> Option<Node> {
        let mut best: Option<(&Node, f64)> = None;

        for node in nodes {
            let Some(score) = node.wlc_score() else {
                debug!("跳过节点 {}: 权重或最大并发为0", node.name);
                continue;
            };
            match best {
                Some((_, best_score)) if score >= best_score => {}
                _ => best = Some((node, score)),
            }
        }

        match best {
            Some((node, score)) => {
                debug!(
                    "加权最少连接策略选择节点: {} (负载: {}/{}, 权重: {}, 得分: {:.3})",
                    node.name, node.current_load, node.max_concurrent_jobs, node.weight, score
                );
                Some(node.clone())
            }
            None => {
                debug!("没有可选择的节点");
                None
            }
        }
    }

    fn name(&self) -> &str {
        "WeightedLeastConnections"
    }
}

/// 节点选择器：健康缓存 + 选择策略
pub struct NodeSelector {
    cache: Arc<NodeHealthCache>,
    strategy: Arc<dyn NodeSelectionStrategy>,
}

impl NodeSelector {
    pub fn new(cache: Arc<NodeHealthCache>) -> Self {
        Self::with_strategy(cache, Arc::new(WeightedLeastConnectionsStrategy::new()))
    }

    pub fn with_strategy(
        cache: Arc<NodeHealthCache>,
        strategy: Arc<dyn NodeSelectionStrategy>,
    ) -> Self {
        Self { cache, strategy }
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    /// 在当前可用节点中选择一个节点
    pub async fn select_node(&self) -> Option<Node> {
        let nodes = self.cache.get_available_nodes().await;
        self.strategy.select_node(&nodes).await
    }
}
