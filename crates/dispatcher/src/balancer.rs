use std::sync::Arc;

use tracing::{info, instrument, warn};

use fleet_core::{
    format_bytes, Assignment, DistributionPlan, FleetError, FleetResult, Job, Node, NodeShare,
};

use crate::health_cache::NodeHealthCache;

/// 分配过程中的单个节点分箱
#[derive(Debug, Clone)]
pub struct Bin {
    pub node: Node,
    pub weight_factor: u64,
    pub total_weight: u64,
    pub jobs: Vec<Job>,
}

impl Bin {
    pub fn new(node: Node) -> Self {
        Self {
            weight_factor: node.weight_factor(),
            node,
            total_weight: 0,
            jobs: Vec::new(),
        }
    }

    /// `self.total / self.factor < other.total / other.factor`，用交叉相乘精确比较
    fn less_loaded_than(&self, other: &Bin) -> bool {
        u128::from(self.total_weight) * u128::from(other.weight_factor)
            < u128::from(other.total_weight) * u128::from(self.weight_factor)
    }

    fn push(&mut self, job: Job) {
        self.total_weight = self.total_weight.saturating_add(job.weight);
        self.jobs.push(job);
    }
}

/// 按权重贪心划分作业
///
/// 作业按权重降序（稳定排序）依次放入 `total_weight / weight_factor` 最小的分箱，
/// 相同时取节点顺序中靠前的分箱。结果按分箱顺序展开，分箱内保持放入顺序。
pub fn partition_by_weight(mut jobs: Vec<Job>, nodes: &[Node]) -> FleetResult<DistributionPlan> {
    if nodes.is_empty() {
        return Err(FleetError::NoNodesAvailable);
    }

    jobs.sort_by(|a, b| b.weight.cmp(&a.weight));

    let mut bins: Vec<Bin> = nodes.iter().cloned().map(Bin::new).collect();
    for job in jobs {
        let mut target = 0;
        for (index, bin) in bins.iter().enumerate().skip(1) {
            if bin.less_loaded_than(&bins[target]) {
                target = index;
            }
        }
        bins[target].push(job);
    }

    let total_weight: u64 = bins.iter().map(|b| b.total_weight).sum();
    let shares = bins
        .iter()
        .map(|bin| NodeShare {
            node_id: bin.node.node_id,
            node_name: bin.node.name.clone(),
            address: bin.node.address(),
            weight_factor: bin.weight_factor,
            job_count: bin.jobs.len(),
            total_weight: bin.total_weight,
            weight_share_percent: if total_weight == 0 {
                0.0
            } else {
                bin.total_weight as f64 * 100.0 / total_weight as f64
            },
        })
        .collect();

    let assignments = bins
        .into_iter()
        .flat_map(|bin| {
            let node = bin.node;
            bin.jobs
                .into_iter()
                .map(move |job| Assignment::new(job, node.clone()))
        })
        .collect();

    Ok(DistributionPlan {
        assignments,
        shares,
        total_weight,
    })
}

/// 加权调度器
///
/// 从健康缓存获取已验证节点，再按权重划分作业。
pub struct WeightedScheduler {
    cache: Arc<NodeHealthCache>,
}

impl WeightedScheduler {
    pub fn new(cache: Arc<NodeHealthCache>) -> Self {
        Self { cache }
    }

    /// 把作业分配到当前可用节点，没有可用节点时返回 `NoNodesAvailable`
    #[instrument(skip_all, fields(job_count = jobs.len()))]
    pub async fn distribute(&self, jobs: Vec<Job>) -> FleetResult<DistributionPlan> {
        let nodes = self.cache.get_available_nodes().await;
        if nodes.is_empty() {
            warn!("没有可用的处理节点");
            return Err(FleetError::NoNodesAvailable);
        }

        let plan = partition_by_weight(jobs, &nodes)?;
        log_distribution(&plan);
        Ok(plan)
    }
}

fn log_distribution(plan: &DistributionPlan) {
    info!(
        "分配 {} 个作业到 {} 个节点，总大小 {}",
        plan.len(),
        plan.shares.len(),
        format_bytes(plan.total_weight)
    );
    for share in &plan.shares {
        info!(
            node_id = share.node_id,
            "  {} ({}): {} 个作业, {} ({:.1}%)",
            share.node_name,
            share.address,
            share.job_count,
            format_bytes(share.total_weight),
            share.weight_share_percent
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_testing_utils::{jobs_with_weights, test_nodes, weighted_nodes};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn node_of(plan: &DistributionPlan, job_id: i64) -> i64 {
        plan.assignments
            .iter()
            .find(|a| a.job.job_id == job_id)
            .map(|a| a.node.node_id)
            .unwrap()
    }

    #[test]
    fn test_empty_node_list_is_error() {
        let result = partition_by_weight(jobs_with_weights(&[1, 2]), &[]);
        assert!(matches!(result, Err(FleetError::NoNodesAvailable)));

        let result = partition_by_weight(Vec::new(), &[]);
        assert!(matches!(result, Err(FleetError::NoNodesAvailable)));
    }

    #[test]
    fn test_zero_jobs_gives_empty_plan() {
        let plan = partition_by_weight(Vec::new(), &test_nodes(3)).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.shares.len(), 3);
        assert_eq!(plan.total_weight, 0);
        assert!(plan.shares.iter().all(|s| s.weight_share_percent == 0.0));
    }

    #[test]
    fn test_equal_jobs_on_two_nodes_split_three_two() {
        let plan =
            partition_by_weight(jobs_with_weights(&[10, 10, 10, 10, 10]), &weighted_nodes(&[1, 1]))
                .unwrap();

        let first = plan.share_for(1).unwrap();
        let second = plan.share_for(2).unwrap();
        assert_eq!((first.job_count, first.total_weight), (3, 30));
        assert_eq!((second.job_count, second.total_weight), (2, 20));
        assert_eq!(first.weight_share_percent, 60.0);
    }

    #[test]
    fn test_heavier_node_takes_more_weight() {
        let plan = partition_by_weight(
            jobs_with_weights(&[4, 4, 4, 4, 4, 4]),
            &weighted_nodes(&[2, 1]),
        )
        .unwrap();

        assert_eq!(plan.share_for(1).unwrap().total_weight, 16);
        assert_eq!(plan.share_for(2).unwrap().total_weight, 8);
    }

    #[test]
    fn test_descending_order_and_bin_grouping() {
        let plan =
            partition_by_weight(jobs_with_weights(&[1, 5, 3, 8]), &weighted_nodes(&[1, 1])).unwrap();

        // 8 -> n1, 5 -> n2, 3 -> n2, 1 -> n1 (8 对 8 平局取第一个)
        let order: Vec<(i64, i64)> = plan
            .assignments
            .iter()
            .map(|a| (a.job.job_id, a.node.node_id))
            .collect();
        assert_eq!(order, vec![(4, 1), (1, 1), (2, 2), (3, 2)]);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let plan =
            partition_by_weight(jobs_with_weights(&[7, 7, 7]), &weighted_nodes(&[1, 1, 1])).unwrap();
        assert_eq!(node_of(&plan, 1), 1);
        assert_eq!(node_of(&plan, 2), 2);
        assert_eq!(node_of(&plan, 3), 3);
    }

    #[test]
    fn test_single_node_takes_everything() {
        let plan = partition_by_weight(jobs_with_weights(&[3, 9, 1]), &test_nodes(1)).unwrap();
        assert_eq!(plan.len(), 3);
        assert!(plan.assignments.iter().all(|a| a.node.node_id == 1));
    }

    #[test]
    fn test_zero_weight_jobs_are_placed() {
        let plan = partition_by_weight(jobs_with_weights(&[0, 0, 0]), &test_nodes(2)).unwrap();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.total_weight, 0);
    }

    #[test]
    fn test_zero_weight_node_counts_as_one() {
        let plan =
            partition_by_weight(jobs_with_weights(&[5, 5]), &weighted_nodes(&[0, 1])).unwrap();
        assert_eq!(plan.share_for(1).unwrap().weight_factor, 1);
        assert_eq!(plan.share_for(1).unwrap().job_count, 1);
        assert_eq!(plan.share_for(2).unwrap().job_count, 1);
    }

    #[test]
    fn test_deterministic_for_same_input() {
        let jobs = jobs_with_weights(&[12, 3, 3, 40, 7, 7, 1, 22]);
        let nodes = weighted_nodes(&[3, 1, 2]);

        let first = partition_by_weight(jobs.clone(), &nodes).unwrap();
        let second = partition_by_weight(jobs, &nodes).unwrap();
        assert_eq!(first.assignments, second.assignments);
    }

    #[test]
    fn test_greedy_balance_bound() {
        let mut rng = StdRng::seed_from_u64(0x5eed);

        for _ in 0..200 {
            let node_count = rng.random_range(1..=6);
            let weights: Vec<u32> = (0..node_count).map(|_| rng.random_range(0..=5)).collect();
            let job_count = rng.random_range(0..=40);
            let job_weights: Vec<u64> =
                (0..job_count).map(|_| rng.random_range(0..=1000)).collect();
            let max_weight = job_weights.iter().copied().max().unwrap_or(0);

            let plan =
                partition_by_weight(jobs_with_weights(&job_weights), &weighted_nodes(&weights))
                    .unwrap();
            assert_eq!(plan.len(), job_count);

            for a in &plan.shares {
                for b in &plan.shares {
                    // |a.t/a.f - b.t/b.f| <= max  <=>  |a.t*b.f - b.t*a.f| <= max*a.f*b.f
                    let lhs = (u128::from(a.total_weight) * u128::from(b.weight_factor))
                        .abs_diff(u128::from(b.total_weight) * u128::from(a.weight_factor));
                    let rhs = u128::from(max_weight)
                        * u128::from(a.weight_factor)
                        * u128::from(b.weight_factor);
                    assert!(lhs <= rhs, "bound violated: {a:?} vs {b:?}");
                }
            }
        }
    }
}
