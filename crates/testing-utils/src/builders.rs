//! Test data builders
//!
//! Helpers for creating nodes and jobs with sensible defaults.

use chrono::Utc;
use fleet_core::{Job, Node};

/// 创建测试节点，地址为 `10.0.0.{id}:50051`
pub fn test_node(node_id: i64) -> Node {
    Node::new(
        node_id,
        format!("node-{node_id}"),
        format!("10.0.0.{node_id}"),
        50051,
    )
    .with_heartbeat(Utc::now())
}

/// 创建 `count` 个测试节点，ID从1开始
pub fn test_nodes(count: usize) -> Vec<Node> {
    (1..=count as i64).map(test_node).collect()
}

/// 按给定权重创建节点，ID从1开始
pub fn weighted_nodes(weights: &[u32]) -> Vec<Node> {
    weights
        .iter()
        .enumerate()
        .map(|(i, weight)| test_node(i as i64 + 1).with_weight(*weight))
        .collect()
}

/// 按给定权重创建作业，ID从1开始
pub fn jobs_with_weights(weights: &[u64]) -> Vec<Job> {
    weights
        .iter()
        .enumerate()
        .map(|(i, weight)| {
            let job_id = i as i64 + 1;
            Job::new(job_id, *weight).with_name(format!("image_{job_id}.png"))
        })
        .collect()
}
