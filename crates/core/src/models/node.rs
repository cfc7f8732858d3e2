use std::cmp::Ordering;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

fn default_node_weight() -> u32 {
    1
}

fn default_max_concurrent_jobs() -> u32 {
    5
}

const NAIVE_HEARTBEAT_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// 解析注册中心返回的心跳时间
///
/// 接受 RFC 3339、RFC 2822 以及不带时区的 `YYYY-MM-DD HH:MM:SS`（按UTC处理），
/// 其他格式返回 `None`。
pub fn parse_heartbeat(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_rfc2822(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NAIVE_HEARTBEAT_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

// 单个节点的心跳格式异常不能导致整个节点列表解析失败
fn deserialize_heartbeat<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(|v| v.as_str()).and_then(parse_heartbeat))
}

/// 工作节点注册信息
///
/// 由持久化服务维护，调度核心只持有只读的缓存副本。
/// 字段名与注册中心返回的JSON保持一致。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub node_id: i64,
    #[serde(rename = "node_name")]
    pub name: String,
    #[serde(rename = "ip_address")]
    pub host: String,
    pub port: u16,
    /// 容量倍数，默认1
    #[serde(default = "default_node_weight")]
    pub weight: u32,
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: u32,
    #[serde(default)]
    pub current_load: u32,
    #[serde(default, deserialize_with = "deserialize_heartbeat")]
    pub last_heartbeat: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: NodeStatus,
}

/// 节点状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Active,
    Busy,
    Inactive,
    Offline,
}

impl Node {
    pub fn new(node_id: i64, name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            node_id,
            name: name.into(),
            host: host.into(),
            port,
            weight: default_node_weight(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            current_load: 0,
            last_heartbeat: None,
            status: NodeStatus::Active,
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_capacity(mut self, max_concurrent_jobs: u32) -> Self {
        self.max_concurrent_jobs = max_concurrent_jobs;
        self
    }

    pub fn with_load(mut self, current_load: u32) -> Self {
        self.current_load = current_load;
        self
    }

    pub fn with_heartbeat(mut self, last_heartbeat: DateTime<Utc>) -> Self {
        self.last_heartbeat = Some(last_heartbeat);
        self
    }

    /// 由首次心跳注册的节点，名称缺省为 `node-{id}`
    pub fn from_heartbeat(heartbeat: &NodeHeartbeat, received_at: DateTime<Utc>) -> Self {
        let name = heartbeat
            .node_name
            .clone()
            .unwrap_or_else(|| format!("node-{}", heartbeat.node_id));
        let mut node = Self::new(heartbeat.node_id, name, heartbeat.host.clone(), heartbeat.port);
        node.apply_heartbeat(heartbeat, received_at);
        node
    }

    /// 用心跳刷新地址、负载和状态
    pub fn apply_heartbeat(&mut self, heartbeat: &NodeHeartbeat, received_at: DateTime<Utc>) {
        if let Some(name) = &heartbeat.node_name {
            self.name = name.clone();
        }
        self.host = heartbeat.host.clone();
        self.port = heartbeat.port;
        self.current_load = heartbeat.current_load;
        self.status = heartbeat.status;
        self.last_heartbeat = Some(received_at);
    }

    /// 节点地址 `host:port`，去重时以此为键
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// 分箱时使用的权重因子，声明为0时按1计算
    pub fn weight_factor(&self) -> u64 {
        u64::from(self.weight.max(1))
    }

    /// 加权最少连接得分 `current_load / (weight * max_concurrent_jobs)`
    ///
    /// 权重或最大并发为0的节点不可选，返回 `None`。
    pub fn wlc_score(&self) -> Option<f64> {
        if self.weight == 0 || self.max_concurrent_jobs == 0 {
            return None;
        }
        let capacity = f64::from(self.weight) * f64::from(self.max_concurrent_jobs);
        Some(f64::from(self.current_load) / capacity)
    }
}

/// 按心跳时间比较两个节点，没有心跳的节点最旧
pub fn compare_heartbeat(a: &Node, b: &Node) -> Ordering {
    a.last_heartbeat.cmp(&b.last_heartbeat)
}

/// 地址冲突时判断候选节点是否应替换已有节点
///
/// 只有心跳严格更新时才替换，相同心跳保留先出现的节点。
pub fn supersedes(candidate: &Node, existing: &Node) -> bool {
    compare_heartbeat(candidate, existing) == Ordering::Greater
}

/// 节点上报的心跳
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeHeartbeat {
    pub node_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(rename = "ip_address")]
    pub host: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_cores: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ram_gb: Option<f64>,
    #[serde(default)]
    pub current_load: u32,
    #[serde(default)]
    pub status: NodeStatus,
}

/// 节点探活返回的状态信息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeStatusReport {
    pub status: String,
    #[serde(default)]
    pub cpu_usage: f64,
    #[serde(default)]
    pub memory_usage: f64,
}

impl NodeStatusReport {
    pub fn healthy(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            cpu_usage: 0.0,
            memory_usage: 0.0,
        }
    }

    /// 节点端把RPC内部异常报告为 "error" 状态
    pub fn is_error(&self) -> bool {
        self.status.eq_ignore_ascii_case("error")
    }
}
