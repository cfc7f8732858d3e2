use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use fleet_api::create_app;
use fleet_core::{AppConfig, BatchOutcome, Job, Node, NodeRegistry, ResultStore};
use fleet_dispatcher::FleetDispatcher;
use fleet_infrastructure::{HttpNodeClient, InMemoryRegistry, RestRegistryClient};
use tokio::{net::TcpListener, sync::broadcast};
use tracing::{info, warn};

/// 主应用程序
pub struct Application {
    config: AppConfig,
    dispatcher: Arc<FleetDispatcher>,
}

impl Application {
    /// 创建应用实例
    ///
    /// 指定节点文件时使用内存注册中心，否则连接持久化服务。
    pub async fn new(config: AppConfig, nodes_file: Option<&str>) -> Result<Self> {
        let (registry, store): (Arc<dyn NodeRegistry>, Arc<dyn ResultStore>) = match nodes_file {
            Some(path) => {
                info!("使用内存注册中心，节点文件: {}", path);
                let registry = Arc::new(
                    InMemoryRegistry::from_json_file(path)
                        .await
                        .with_context(|| format!("加载节点文件失败: {path}"))?,
                );
                (registry.clone(), registry)
            }
            None => {
                info!("连接持久化服务: {}", config.registry.base_url);
                let client =
                    Arc::new(RestRegistryClient::new(&config.registry).context("创建注册中心客户端失败")?);
                (client.clone(), client)
            }
        };

        let rpc = Arc::new(HttpNodeClient::new(config.health_cache.probe_timeout()));
        let dispatcher = Arc::new(FleetDispatcher::new(
            registry,
            rpc,
            store,
            config.health_cache.clone(),
            config.dispatcher.clone(),
        ));

        Ok(Self { config, dispatcher })
    }

    /// 运行API服务器直到收到关闭信号，随后排空工作池
    pub async fn serve(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        if !self.config.api.enabled {
            return Err(anyhow::anyhow!("API服务被禁用，请检查配置"));
        }

        let app = create_app(Arc::clone(&self.dispatcher));
        let listener = TcpListener::bind(&self.config.api.bind_address)
            .await
            .with_context(|| format!("绑定地址失败: {}", self.config.api.bind_address))?;

        info!("API服务器启动在 http://{}", self.config.api.bind_address);

        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("API服务器收到关闭信号");
            })
            .await
            .context("API服务器运行失败")?;

        self.dispatcher.shutdown().await;
        info!("API服务器已停止");
        Ok(())
    }

    /// 获取当前通过验证的节点
    pub async fn verified_nodes(&self) -> Vec<Node> {
        self.dispatcher.available_nodes().await
    }

    /// 从JSON清单读取作业并执行一个批次
    pub async fn run_manifest(&self, jobs_file: &Path, batch_id: i64) -> Result<BatchOutcome> {
        let content = tokio::fs::read_to_string(jobs_file)
            .await
            .with_context(|| format!("读取作业清单失败: {}", jobs_file.display()))?;
        let jobs: Vec<Job> = serde_json::from_str(&content)
            .with_context(|| format!("解析作业清单失败: {}", jobs_file.display()))?;

        if jobs.is_empty() {
            warn!("作业清单为空: {}", jobs_file.display());
        }

        let outcome = self.dispatcher.submit_batch(batch_id, jobs).await?;
        self.dispatcher.shutdown().await;
        Ok(outcome)
    }
}
