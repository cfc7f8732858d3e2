use std::sync::Arc;

use tracing::{info, warn};

use fleet_core::{
    Assignment, BatchMetrics, BatchOutcome, DispatcherConfig, DistributionPlan, FleetError,
    FleetResult, HealthCacheConfig, Job, Node, NodeHeartbeat, NodeRegistry, NodeRpcClient,
    ResultStore,
};

use crate::balancer::WeightedScheduler;
use crate::coordinator::DispatchCoordinator;
use crate::health_cache::NodeHealthCache;
use crate::strategies::NodeSelector;
use crate::worker_pool::WorkerPool;

/// 分派服务门面
///
/// 组合健康缓存、加权调度器、节点选择器和分派协调器，
/// 对外提供批次分配与执行入口。
pub struct FleetDispatcher {
    registry: Arc<dyn NodeRegistry>,
    store: Arc<dyn ResultStore>,
    cache: Arc<NodeHealthCache>,
    scheduler: WeightedScheduler,
    selector: NodeSelector,
    coordinator: DispatchCoordinator,
    config: DispatcherConfig,
}

impl FleetDispatcher {
    pub fn new(
        registry: Arc<dyn NodeRegistry>,
        rpc: Arc<dyn NodeRpcClient>,
        store: Arc<dyn ResultStore>,
        cache_config: HealthCacheConfig,
        config: DispatcherConfig,
    ) -> Self {
        let cache = Arc::new(NodeHealthCache::new(
            Arc::clone(&registry),
            Arc::clone(&rpc),
            cache_config,
        ));
        let pool = WorkerPool::new(config.pool_size);

        info!(
            "分派服务初始化: 工作池大小 {}, 单作业最多 {} 个转换",
            pool.size(),
            config.max_transforms_per_job
        );

        Self {
            scheduler: WeightedScheduler::new(Arc::clone(&cache)),
            selector: NodeSelector::new(Arc::clone(&cache)),
            coordinator: DispatchCoordinator::new(pool, rpc, Arc::clone(&store)),
            registry,
            store,
            cache,
            config,
        }
    }

    pub fn health_cache(&self) -> &Arc<NodeHealthCache> {
        &self.cache
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// 按权重把作业分配到可用节点
    pub async fn distribute(&self, mut jobs: Vec<Job>) -> FleetResult<DistributionPlan> {
        self.validate_jobs(&mut jobs)?;
        self.scheduler.distribute(jobs).await
    }

    /// 执行已分配的作业，总是返回批次汇总
    pub async fn run_batch(&self, batch_id: i64, assignments: Vec<Assignment>) -> BatchOutcome {
        self.coordinator.run_batch(batch_id, assignments).await
    }

    /// 分配并执行一个批次
    pub async fn submit_batch(&self, batch_id: i64, jobs: Vec<Job>) -> FleetResult<BatchOutcome> {
        let plan = self.distribute(jobs).await?;
        Ok(self.run_batch(batch_id, plan.into_assignments()).await)
    }

    pub async fn invalidate_health_cache(&self) {
        self.cache.invalidate_cache().await;
    }

    /// 加权最少连接选择单个节点
    pub async fn select_node(&self) -> Option<Node> {
        self.selector.select_node().await
    }

    pub async fn available_nodes(&self) -> Vec<Node> {
        self.cache.get_available_nodes().await
    }

    pub async fn node_by_id(&self, node_id: i64) -> FleetResult<Node> {
        self.cache
            .get_node_by_id(node_id)
            .await
            .ok_or(FleetError::NodeNotFound { id: node_id })
    }

    /// 登记节点心跳并使健康缓存失效，下一次请求按新状态重新探活
    pub async fn record_heartbeat(&self, heartbeat: &NodeHeartbeat) -> FleetResult<()> {
        self.registry.record_heartbeat(heartbeat).await?;
        info!(
            node_id = heartbeat.node_id,
            "收到节点心跳: {}:{}, 负载 {}, 状态 {:?}",
            heartbeat.host,
            heartbeat.port,
            heartbeat.current_load,
            heartbeat.status
        );
        self.cache.invalidate_cache().await;
        Ok(())
    }

    pub async fn batch_metrics(&self, batch_id: i64) -> FleetResult<BatchMetrics> {
        self.store
            .batch_metrics(batch_id)
            .await?
            .ok_or(FleetError::BatchNotFound { id: batch_id })
    }

    /// 等待运行中的作业结束并停止接收新批次
    pub async fn shutdown(&self) {
        info!("分派服务关闭中");
        self.coordinator.pool().drain().await;
    }

    fn validate_jobs(&self, jobs: &mut [Job]) -> FleetResult<()> {
        let mut seen = std::collections::HashSet::with_capacity(jobs.len());
        for job in jobs.iter_mut() {
            if !seen.insert(job.job_id) {
                return Err(FleetError::InvalidJob(format!(
                    "作业ID重复: {}",
                    job.job_id
                )));
            }
            let dropped = job.cap_transforms(self.config.max_transforms_per_job);
            if dropped > 0 {
                warn!(
                    job_id = job.job_id,
                    "作业 {} 的转换超过上限 {}，已丢弃 {} 个",
                    job.name,
                    self.config.max_transforms_per_job,
                    dropped
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::BatchStatus;
    use fleet_testing_utils::{
        jobs_with_weights, test_nodes, MockNodeRegistry, MockNodeRpcClient, MockResultStore,
    };
    use serde_json::json;

    fn create_dispatcher(
        registry: &MockNodeRegistry,
        rpc: &MockNodeRpcClient,
        store: &MockResultStore,
    ) -> FleetDispatcher {
        FleetDispatcher::new(
            Arc::new(registry.clone()),
            Arc::new(rpc.clone()),
            Arc::new(store.clone()),
            HealthCacheConfig::default(),
            DispatcherConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_distribute_without_nodes_fails() {
        let dispatcher = create_dispatcher(
            &MockNodeRegistry::new(),
            &MockNodeRpcClient::new(),
            &MockResultStore::new(),
        );

        let result = dispatcher.distribute(jobs_with_weights(&[1])).await;
        assert!(matches!(result, Err(FleetError::NoNodesAvailable)));
    }

    #[tokio::test]
    async fn test_submit_batch_runs_all_jobs() {
        let registry = MockNodeRegistry::with_nodes(test_nodes(2));
        let rpc = MockNodeRpcClient::new();
        let store = MockResultStore::new();
        let dispatcher = create_dispatcher(&registry, &rpc, &store);

        let outcome = dispatcher
            .submit_batch(21, jobs_with_weights(&[10, 10, 10, 10, 10]))
            .await
            .unwrap();

        assert_eq!(outcome.succeeded, 5);
        assert_eq!(outcome.status, BatchStatus::Completed);

        let on_first = rpc
            .processed_jobs()
            .iter()
            .filter(|(_, node_id)| *node_id == 1)
            .count();
        assert_eq!(on_first, 3);
    }

    #[tokio::test]
    async fn test_transforms_are_capped() {
        let registry = MockNodeRegistry::with_nodes(test_nodes(1));
        let dispatcher =
            create_dispatcher(&registry, &MockNodeRpcClient::new(), &MockResultStore::new());

        let mut job = Job::new(1, 10);
        for i in 0..8 {
            job = job.with_transform(format!("t{i}"), json!({}));
        }

        let plan = dispatcher.distribute(vec![job]).await.unwrap();
        assert_eq!(plan.assignments[0].job.transforms.len(), 5);
        assert_eq!(plan.assignments[0].job.transforms[4].name, "t4");
    }

    #[tokio::test]
    async fn test_duplicate_job_ids_rejected() {
        let registry = MockNodeRegistry::with_nodes(test_nodes(1));
        let dispatcher =
            create_dispatcher(&registry, &MockNodeRpcClient::new(), &MockResultStore::new());

        let result = dispatcher
            .distribute(vec![Job::new(1, 1), Job::new(1, 2)])
            .await;
        assert!(matches!(result, Err(FleetError::InvalidJob(_))));
        assert_eq!(registry.call_count(), 0);
    }

    #[tokio::test]
    async fn test_node_by_id_not_found() {
        let registry = MockNodeRegistry::with_nodes(test_nodes(2));
        let dispatcher =
            create_dispatcher(&registry, &MockNodeRpcClient::new(), &MockResultStore::new());

        assert_eq!(dispatcher.node_by_id(2).await.unwrap().node_id, 2);
        assert!(matches!(
            dispatcher.node_by_id(9).await,
            Err(FleetError::NodeNotFound { id: 9 })
        ));
    }

    #[tokio::test]
    async fn test_heartbeat_registers_node_and_refreshes_cache() {
        let registry = MockNodeRegistry::with_nodes(test_nodes(1));
        let rpc = MockNodeRpcClient::new();
        let dispatcher = create_dispatcher(&registry, &rpc, &MockResultStore::new());

        assert_eq!(dispatcher.available_nodes().await.len(), 1);

        let heartbeat: NodeHeartbeat = serde_json::from_value(json!({
            "node_id": 2,
            "ip_address": "10.0.0.2",
            "port": 50051,
            "current_load": 1
        }))
        .unwrap();
        dispatcher.record_heartbeat(&heartbeat).await.unwrap();

        let ids: Vec<i64> = dispatcher
            .available_nodes()
            .await
            .iter()
            .map(|n| n.node_id)
            .collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(registry.call_count(), 2);
        assert_eq!(registry.heartbeats(), vec![heartbeat]);
    }

    #[tokio::test]
    async fn test_heartbeat_registry_failure_keeps_cache() {
        let registry = MockNodeRegistry::with_nodes(test_nodes(1));
        let dispatcher =
            create_dispatcher(&registry, &MockNodeRpcClient::new(), &MockResultStore::new());
        dispatcher.available_nodes().await;

        registry.set_unavailable(true);
        let heartbeat = NodeHeartbeat {
            node_id: 1,
            node_name: None,
            host: "10.0.0.1".to_string(),
            port: 50051,
            cpu_cores: None,
            ram_gb: None,
            current_load: 0,
            status: fleet_core::NodeStatus::Active,
        };
        assert!(matches!(
            dispatcher.record_heartbeat(&heartbeat).await,
            Err(FleetError::RegistryUnavailable(_))
        ));
        // 缓存未失效，仍然可用
        assert_eq!(dispatcher.available_nodes().await.len(), 1);
        assert_eq!(registry.call_count(), 1);
    }

    #[tokio::test]
    async fn test_batch_metrics_after_run() {
        let registry = MockNodeRegistry::with_nodes(test_nodes(2));
        let rpc = MockNodeRpcClient::new();
        rpc.reject_job(3, "corrupt image");
        let store = MockResultStore::new();
        let dispatcher = create_dispatcher(&registry, &rpc, &store);

        assert!(matches!(
            dispatcher.batch_metrics(30).await,
            Err(FleetError::BatchNotFound { id: 30 })
        ));

        dispatcher
            .submit_batch(30, jobs_with_weights(&[4, 3, 2, 1]))
            .await
            .unwrap();
        let metrics = dispatcher.batch_metrics(30).await.unwrap();
        assert_eq!(metrics.status, BatchStatus::Completed);
        assert_eq!(metrics.total_jobs, 4);
        assert_eq!(metrics.processed_jobs, 3);
        assert_eq!(metrics.failed_jobs, 1);
    }

    #[tokio::test]
    async fn test_shutdown_drains_pool() {
        let registry = MockNodeRegistry::with_nodes(test_nodes(1));
        let rpc = MockNodeRpcClient::new();
        let store = MockResultStore::new();
        let dispatcher = create_dispatcher(&registry, &rpc, &store);

        dispatcher.shutdown().await;
        let outcome = dispatcher
            .submit_batch(2, jobs_with_weights(&[1]))
            .await
            .unwrap();
        assert_eq!(outcome.status, BatchStatus::Failed);
        assert!(rpc.processed_jobs().is_empty());
    }
}
