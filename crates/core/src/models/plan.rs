use serde::{Deserialize, Serialize};

use super::job::Assignment;

/// 单个节点在一次分配中承担的份额
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeShare {
    pub node_id: i64,
    pub node_name: String,
    pub address: String,
    pub weight_factor: u64,
    pub job_count: usize,
    pub total_weight: u64,
    /// 占本次总权重的百分比，总权重为0时为0
    pub weight_share_percent: f64,
}

/// 一次分配的完整结果：按节点顺序展开的分配列表及每个节点的汇总
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DistributionPlan {
    pub assignments: Vec<Assignment>,
    pub shares: Vec<NodeShare>,
    pub total_weight: u64,
}

impl DistributionPlan {
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn share_for(&self, node_id: i64) -> Option<&NodeShare> {
        self.shares.iter().find(|s| s.node_id == node_id)
    }

    pub fn into_assignments(self) -> Vec<Assignment> {
        self.assignments
    }
}
