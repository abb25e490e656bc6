use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::leader_elector::LeaderElector;

/// 按固定间隔为某个角色刷新本实例心跳，停止时注销
pub struct RegistrationHeartbeatService {
    elector: Arc<dyn LeaderElector>,
    instance_id: String,
    interval: Duration,
}

impl RegistrationHeartbeatService {
    pub fn new(elector: Arc<dyn LeaderElector>, instance_id: impl Into<String>, interval: Duration) -> Self {
        Self {
            elector,
            instance_id: instance_id.into(),
            interval,
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        let worker_type = self.elector.worker_type_name().to_string();
        info!("启动实例心跳: {} (角色 {})", self.instance_id, worker_type);

        loop {
            if let Err(e) = self.elector.register(&self.instance_id).await {
                error!("实例 {} 心跳写入失败: {}", self.instance_id, e);
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        if let Err(e) = self.elector.unregister(&self.instance_id).await {
            warn!("实例 {} 注销失败，将由其他实例按超时清理: {}", self.instance_id, e);
        }
        info!("实例心跳已停止: {} (角色 {})", self.instance_id, worker_type);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InstanceRegistrationStore, RegisterInstanceManager};
    use coordinator_core::{CoordinationConfig, SystemClock};
    use coordinator_infrastructure::InMemoryRegistrationBackend;

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_registers_then_unregisters_on_cancel() {
        let backend = InMemoryRegistrationBackend::new();
        let elector: Arc<dyn LeaderElector> = Arc::new(RegisterInstanceManager::new(
            "conversion",
            InstanceRegistrationStore::new(Arc::new(backend.clone()), 10),
            Arc::new(SystemClock),
            &CoordinationConfig::default(),
        ));
        let service = RegistrationHeartbeatService::new(
            elector.clone(),
            "coordinator-host-100",
            Duration::from_secs(5),
        );

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(service.run(cancel.clone()));

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(elector.is_active("coordinator-host-100").await);
        assert_eq!(backend.count().await, 1);

        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(backend.count().await, 0);
    }
}
