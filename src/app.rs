use std::sync::Arc;

use anyhow::{Context, Result};
use coordinator_core::{
    AppConfig, CacheBackendType, Clock, DistributedLockProvider, RegistrationBackend,
    RegistrationBackendType, SystemClock, TaskCacheStore,
};
use coordinator_election::{
    InstanceId, InstanceRegistrationStore, LeaderElector, LeaderGatedScheduler,
    RegisterInstanceManager, RegistrationHeartbeatService,
};
use coordinator_infrastructure::{
    create_sqlite_pool, redis_store, InMemoryLockProvider, InMemoryRegistrationBackend,
    InMemoryTaskCacheStore, RedisLockProvider, RedisTaskCacheStore, SqliteRegistrationBackend,
};
use coordinator_tasks::{
    ConversionPoller, ConversionService, DistributedTaskQueue, EncryptionService, FileConverter,
    StorageEncryptor,
};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// 主应用程序
///
/// 按配置组装注册表、任务缓存和锁，并为每个后台角色启动心跳与门控调度循环。
pub struct Application {
    config: AppConfig,
    instance_id: InstanceId,
    registration_store: InstanceRegistrationStore,
    task_store: Arc<dyn TaskCacheStore>,
    lock_provider: Arc<dyn DistributedLockProvider>,
    clock: Arc<dyn Clock>,
    file_converter: Option<Arc<dyn FileConverter>>,
}

impl Application {
    pub async fn new(config: AppConfig) -> Result<Self> {
        let instance_id = InstanceId::generate(&config.coordination.instance_prefix);
        info!("初始化应用程序，实例: {}", instance_id);

        let registrations = create_registration_backend(&config).await?;
        let (task_store, lock_provider) = create_task_backends(&config).await?;

        if config.coordination.singleton_mode {
            info!("单实例模式：跳过选主，所有后台任务在本实例执行");
        }

        Ok(Self {
            registration_store: InstanceRegistrationStore::new(
                registrations,
                config.coordination.max_conflict_retries,
            ),
            config,
            instance_id,
            task_store,
            lock_provider,
            clock: Arc::new(SystemClock),
            file_converter: None,
        })
    }

    /// 接入外部文件转换服务，启用转换轮询
    pub fn with_file_converter(mut self, converter: Arc<dyn FileConverter>) -> Self {
        self.file_converter = Some(converter);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn instance_id(&self) -> &InstanceId {
        &self.instance_id
    }

    pub fn elector(&self, worker_type_name: &str) -> Arc<dyn LeaderElector> {
        Arc::new(RegisterInstanceManager::new(
            worker_type_name,
            self.registration_store.clone(),
            Arc::clone(&self.clock),
            &self.config.coordination,
        ))
    }

    pub fn queue(&self, queue_name: &str) -> DistributedTaskQueue {
        DistributedTaskQueue::new(
            queue_name,
            Arc::clone(&self.task_store),
            Arc::clone(&self.lock_provider),
        )
    }

    pub fn conversion_service(&self) -> ConversionService {
        ConversionService::new(
            self.queue(&self.config.conversion.queue_name),
            Arc::clone(&self.clock),
        )
    }

    pub fn encryption_service(
        &self,
        encryptor: Arc<dyn StorageEncryptor>,
        cancel: CancellationToken,
    ) -> EncryptionService {
        EncryptionService::new(
            self.queue(&self.config.encryption.queue_name),
            encryptor,
            &self.config.encryption,
            cancel,
        )
    }

    /// 运行直到 `cancel` 被取消，然后等待所有后台循环退出
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        info!("启动应用程序，实例: {}", self.instance_id);

        let handles = self.spawn_background_services(&cancel);
        if handles.is_empty() {
            warn!("没有启用任何后台角色");
        }

        cancel.cancelled().await;
        info!("应用程序收到关闭信号");

        for handle in handles {
            if let Err(e) = handle.await {
                error!("后台循环异常退出: {}", e);
            }
        }

        info!("应用程序已停止");
        Ok(())
    }

    fn spawn_background_services(&self, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        let conversion = &self.config.conversion;
        if !conversion.enabled {
            return handles;
        }

        let elector = self.elector(&conversion.worker_type_name);
        let heartbeat = RegistrationHeartbeatService::new(
            Arc::clone(&elector),
            self.instance_id.as_str(),
            self.config.coordination.heartbeat_interval(),
        );
        handles.push(tokio::spawn(heartbeat.run(cancel.child_token())));

        match &self.file_converter {
            Some(converter) => {
                let poller = ConversionPoller::new(
                    self.queue(&conversion.queue_name),
                    Arc::clone(converter),
                    Arc::clone(&self.clock),
                    conversion,
                );
                let scheduler = LeaderGatedScheduler::new(
                    elector,
                    Arc::new(poller),
                    self.instance_id.as_str(),
                    self.config.coordination.passive_poll_interval(),
                );
                handles.push(tokio::spawn(scheduler.run(cancel.child_token())));
            }
            None => warn!(
                "未接入文件转换服务，实例 {} 只参与角色 {} 的选主",
                self.instance_id, conversion.worker_type_name
            ),
        }

        handles
    }
}

async fn create_registration_backend(config: &AppConfig) -> Result<Arc<dyn RegistrationBackend>> {
    match config.coordination.registration_backend {
        RegistrationBackendType::Memory => {
            info!("实例注册表: 内存");
            Ok(Arc::new(InMemoryRegistrationBackend::new()))
        }
        RegistrationBackendType::Sqlite => {
            let pool = create_sqlite_pool(&config.database)
                .await
                .with_context(|| format!("连接注册表数据库失败: {}", config.database.url))?;
            Ok(Arc::new(SqliteRegistrationBackend::new(pool)))
        }
    }
}

async fn create_task_backends(
    config: &AppConfig,
) -> Result<(Arc<dyn TaskCacheStore>, Arc<dyn DistributedLockProvider>)> {
    let lock_timeout = config.coordination.lock_timeout();

    match config.cache.backend {
        CacheBackendType::Memory => {
            info!("任务缓存: 内存");
            Ok((
                Arc::new(InMemoryTaskCacheStore::new()),
                Arc::new(InMemoryLockProvider::new(lock_timeout)),
            ))
        }
        CacheBackendType::Redis => {
            let conn = redis_store::connect(&config.cache)
                .await
                .with_context(|| format!("连接Redis失败: {}", config.cache.redis_url))?;
            Ok((
                Arc::new(RedisTaskCacheStore::new(conn.clone(), &config.cache.key_prefix)),
                Arc::new(RedisLockProvider::new(
                    conn,
                    &config.cache.key_prefix,
                    lock_timeout,
                    Duration::from_secs(config.cache.lock_expiry_seconds),
                )),
            ))
        }
    }
}
