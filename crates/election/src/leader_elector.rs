use std::sync::Arc;

use async_trait::async_trait;
use coordinator_core::{
    Clock, CoordinationConfig, CoordinatorError, CoordinatorResult, InstanceRegistration,
};
use tracing::{debug, info, instrument, warn};

use crate::instance_id::creation_tick;
use crate::registration_store::InstanceRegistrationStore;

/// 主备选举接口
#[async_trait]
pub trait LeaderElector: Send + Sync {
    /// 竞争的角色名
    fn worker_type_name(&self) -> &str;

    /// 刷新心跳并重新计算主实例，返回本实例是否为主
    async fn register(&self, instance_id: &str) -> CoordinatorResult<bool>;

    /// 查询失败时返回 `false`
    async fn is_active(&self, instance_id: &str) -> bool;

    /// 立即删除本实例的注册行
    async fn unregister(&self, instance_id: &str) -> CoordinatorResult<()>;
}

/// 基于注册表的选主实现
///
/// 未失联实例（含本实例）中创建刻度最小者为主；失联实例在每次 `register`
/// 时被清理。单实例模式下不访问存储，始终为主。
pub struct RegisterInstanceManager {
    worker_type_name: String,
    store: InstanceRegistrationStore,
    clock: Arc<dyn Clock>,
    singleton_mode: bool,
    ttl_seconds: i64,
}

impl RegisterInstanceManager {
    pub fn new(
        worker_type_name: impl Into<String>,
        store: InstanceRegistrationStore,
        clock: Arc<dyn Clock>,
        config: &CoordinationConfig,
    ) -> Self {
        Self {
            worker_type_name: worker_type_name.into(),
            store,
            clock,
            singleton_mode: config.singleton_mode,
            ttl_seconds: config.time_until_unregister_in_seconds,
        }
    }

    /// 排序键：刻度无法解析的行排在最后
    fn election_key(registration: &InstanceRegistration) -> (u64, &str) {
        let id = registration.instance_registration_id.as_str();
        let tick = creation_tick(id).unwrap_or_else(|| {
            warn!("实例标识 {} 缺少创建刻度，不参与优先选主", id);
            u64::MAX
        });
        (tick, id)
    }

    async fn sweep_orphans(&self, orphans: &[InstanceRegistration]) {
        for orphan in orphans {
            match self
                .store
                .delete(&self.worker_type_name, &orphan.instance_registration_id)
                .await
            {
                Ok(()) => info!(
                    "清理失联实例 {} (角色 {}, 上次心跳 {})",
                    orphan.instance_registration_id,
                    self.worker_type_name,
                    orphan.last_updated.format("%Y-%m-%d %H:%M:%S UTC")
                ),
                Err(e) => warn!(
                    "清理失联实例 {} 失败: {}",
                    orphan.instance_registration_id, e
                ),
            }
        }
    }
}

#[async_trait]
impl LeaderElector for RegisterInstanceManager {
    fn worker_type_name(&self) -> &str {
        &self.worker_type_name
    }

    /// 主实例由存活实例的创建刻度决定，与现有的 `is_active` 标记无关：
    /// 当前主实例发现有更早创建的存活实例时，会在本次心跳中让出主身份，
    /// 更早的实例在它自己的下一次心跳中接任。
    #[instrument(skip(self), fields(worker_type = %self.worker_type_name))]
    async fn register(&self, instance_id: &str) -> CoordinatorResult<bool> {
        if self.singleton_mode {
            return Ok(true);
        }

        let own_tick = creation_tick(instance_id)
            .ok_or_else(|| CoordinatorError::InvalidInstanceId(instance_id.to_string()))?;
        let now = self.clock.now();
        let instances = self.store.get_all(&self.worker_type_name).await?;

        let mut existing = None;
        let mut alive = Vec::new();
        let mut orphans = Vec::new();
        for instance in instances {
            if instance.instance_registration_id == instance_id {
                existing = Some(instance);
            } else if instance.is_orphan(now, self.ttl_seconds) {
                orphans.push(instance);
            } else {
                alive.push(instance);
            }
        }

        let first_alive = alive.iter().map(Self::election_key).min();
        let is_active = match first_alive {
            Some(other) => (own_tick, instance_id) < other,
            None => true,
        };

        let was_active = existing.as_ref().is_some_and(|r| r.is_active);
        let mut registration = existing.unwrap_or_else(|| {
            InstanceRegistration::new(instance_id, self.worker_type_name.clone(), now)
        });
        registration.is_active = is_active;
        registration.last_updated = now;
        self.store.add_or_update(&registration).await?;

        if is_active != was_active {
            info!(
                "实例 {} 在角色 {} 中{}",
                instance_id,
                self.worker_type_name,
                if is_active { "成为主实例" } else { "转为备用" }
            );
        } else {
            debug!("实例 {} 心跳已刷新 (active={})", instance_id, is_active);
        }

        self.sweep_orphans(&orphans).await;
        Ok(is_active)
    }

    async fn is_active(&self, instance_id: &str) -> bool {
        if self.singleton_mode {
            return true;
        }

        match self.store.find(&self.worker_type_name, instance_id).await {
            Ok(Some(registration)) => registration.is_active,
            Ok(None) => false,
            Err(e) => {
                warn!("查询实例 {} 主备状态失败，按备用处理: {}", instance_id, e);
                false
            }
        }
    }

    async fn unregister(&self, instance_id: &str) -> CoordinatorResult<()> {
        if self.singleton_mode {
            return Ok(());
        }

        self.store.delete(&self.worker_type_name, instance_id).await?;
        info!("实例 {} 已从角色 {} 注销", instance_id, self.worker_type_name);
        Ok(())
    }
}
