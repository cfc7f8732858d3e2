use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use fleet_core::{FleetError, FleetResult};

/// 进程级有界工作池
///
/// 同一时刻最多 `size` 个任务在运行，提交时先获取许可再启动任务，
/// 许可随任务结束释放。
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// 当前空闲的执行槽位
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    /// 等待一个空闲槽位后启动任务，工作池已关闭时返回 `PoolClosed`
    pub async fn submit<F, T>(&self, task: F) -> FleetResult<JoinHandle<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| FleetError::PoolClosed)?;

        Ok(tokio::spawn(async move {
            let output = task.await;
            drop(permit);
            output
        }))
    }

    /// 等待所有运行中的任务结束并关闭工作池，之后的提交都会失败
    pub async fn drain(&self) {
        if self.is_closed() {
            return;
        }
        info!("等待工作池空闲 ({} 个槽位)", self.size);
        match self.permits.acquire_many(self.size as u32).await {
            Ok(permits) => {
                self.permits.close();
                drop(permits);
            }
            Err(_) => debug!("工作池已关闭"),
        }
        info!("工作池已排空");
    }
}
