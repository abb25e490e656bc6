use std::sync::Arc;
use std::time::Duration;

use coordinator_core::{CoordinationConfig, DatabaseConfig, RegistrationBackend, SystemClock};
use coordinator_election::{
    InstanceId, InstanceRegistrationStore, LeaderElector, RegisterInstanceManager,
    RegistrationHeartbeatService,
};
use coordinator_infrastructure::{create_sqlite_pool, SqliteRegistrationBackend};
use coordinator_testing_utils::{ManualClock, TestEnv};
use tokio_util::sync::CancellationToken;

async fn sqlite_backend(dir: &tempfile::TempDir) -> Arc<dyn RegistrationBackend> {
    let config = DatabaseConfig {
        url: format!("sqlite://{}", dir.path().join("coordinator.db").display()),
        ..DatabaseConfig::default()
    };
    let pool = create_sqlite_pool(&config).await.unwrap();
    Arc::new(SqliteRegistrationBackend::new(pool))
}

fn manager(
    backend: Arc<dyn RegistrationBackend>,
    clock: Arc<ManualClock>,
) -> Arc<RegisterInstanceManager> {
    Arc::new(RegisterInstanceManager::new(
        "thumbnails",
        InstanceRegistrationStore::new(backend, 10),
        clock,
        &CoordinationConfig::default(),
    ))
}

#[tokio::test]
async fn test_replicas_converge_on_single_leader() {
    let dir = tempfile::tempdir().unwrap();
    let backend = sqlite_backend(&dir).await;
    let clock = Arc::new(ManualClock::default());

    // Each replica has its own elector over the shared table
    let ids: Vec<InstanceId> = (0..5).map(|_| InstanceId::generate("replica")).collect();
    let electors: Vec<_> = ids.iter().map(|_| manager(backend.clone(), clock.clone())).collect();

    for _ in 0..2 {
        let mut pending = Vec::new();
        for (elector, id) in electors.iter().zip(ids.iter()).rev() {
            let elector = elector.clone();
            let id = id.to_string();
            pending.push(tokio::spawn(async move { elector.register(&id).await }));
        }
        for handle in pending {
            handle.await.unwrap().unwrap();
        }
        clock.advance(5);
    }

    let mut leaders = Vec::new();
    for (elector, id) in electors.iter().zip(ids.iter()) {
        if elector.is_active(id.as_str()).await {
            leaders.push(id.clone());
        }
    }
    assert_eq!(leaders, vec![ids[0].clone()]);
}

#[tokio::test]
async fn test_crashed_leader_is_replaced_after_ttl() {
    let dir = tempfile::tempdir().unwrap();
    let backend = sqlite_backend(&dir).await;
    let clock = Arc::new(ManualClock::default());
    let elector = manager(backend.clone(), clock.clone());

    let first = InstanceId::with_tick("replica", "a", 100);
    let second = InstanceId::with_tick("replica", "b", 200);
    assert!(elector.register(first.as_str()).await.unwrap());
    assert!(!elector.register(second.as_str()).await.unwrap());

    // First replica stops heartbeating without unregistering
    for _ in 0..6 {
        clock.advance(5);
        assert!(!elector.register(second.as_str()).await.unwrap());
    }
    clock.advance(5);
    assert!(elector.register(second.as_str()).await.unwrap());
    assert!(backend.find("thumbnails", first.as_str()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_heartbeat_service_hands_over_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let backend = sqlite_backend(&dir).await;
    let elector: Arc<dyn LeaderElector> = Arc::new(RegisterInstanceManager::new(
        "thumbnails",
        InstanceRegistrationStore::new(backend, 10),
        Arc::new(SystemClock),
        &CoordinationConfig::default(),
    ));

    let first = InstanceId::generate("replica");
    let second = InstanceId::generate("replica");
    let first_cancel = CancellationToken::new();
    let second_cancel = CancellationToken::new();

    let interval = Duration::from_millis(50);
    let first_handle = tokio::spawn(
        RegistrationHeartbeatService::new(elector.clone(), first.as_str(), interval)
            .run(first_cancel.clone()),
    );
    let second_handle = tokio::spawn(
        RegistrationHeartbeatService::new(elector.clone(), second.as_str(), interval)
            .run(second_cancel.clone()),
    );

    let check = elector.clone();
    let first_id = first.to_string();
    assert!(
        TestEnv::wait_for(
            || {
                let check = check.clone();
                let id = first_id.clone();
                async move { check.is_active(&id).await }
            },
            Duration::from_secs(5),
        )
        .await
    );

    first_cancel.cancel();
    first_handle.await.unwrap();

    let second_id = second.to_string();
    assert!(
        TestEnv::wait_for(
            || {
                let check = check.clone();
                let id = second_id.clone();
                async move { check.is_active(&id).await }
            },
            Duration::from_secs(5),
        )
        .await
    );

    second_cancel.cancel();
    second_handle.await.unwrap();
}
