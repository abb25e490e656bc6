//! Fault-injecting store doubles

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use coordinator_core::{
    CoordinatorError, CoordinatorResult, DeleteOutcome, DistributedTaskRecord,
    InstanceRegistration, RegistrationBackend, TaskCacheStore, WriteOutcome,
};
use coordinator_infrastructure::{InMemoryRegistrationBackend, InMemoryTaskCacheStore};

/// Registration backend that reports `Conflict` for the first N conditional
/// writes, then behaves like the in-memory backend it wraps.
#[derive(Debug, Clone, Default)]
pub struct FlakyRegistrationBackend {
    inner: InMemoryRegistrationBackend,
    conflicts_left: Arc<AtomicUsize>,
    conditional_writes: Arc<AtomicUsize>,
    upserts: Arc<AtomicUsize>,
}

impl FlakyRegistrationBackend {
    pub fn new(conflicts: usize) -> Self {
        Self {
            conflicts_left: Arc::new(AtomicUsize::new(conflicts)),
            ..Self::default()
        }
    }

    pub fn inner(&self) -> &InMemoryRegistrationBackend {
        &self.inner
    }

    /// Number of insert/update attempts seen so far
    pub fn conditional_writes(&self) -> usize {
        self.conditional_writes.load(Ordering::SeqCst)
    }

    pub fn upserts(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    fn take_conflict(&self) -> bool {
        self.conditional_writes.fetch_add(1, Ordering::SeqCst);
        self.conflicts_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl RegistrationBackend for FlakyRegistrationBackend {
    async fn insert(&self, registration: &InstanceRegistration) -> CoordinatorResult<WriteOutcome> {
        if self.take_conflict() {
            return Ok(WriteOutcome::Conflict);
        }
        self.inner.insert(registration).await
    }

    async fn update(&self, registration: &InstanceRegistration) -> CoordinatorResult<WriteOutcome> {
        if self.take_conflict() {
            return Ok(WriteOutcome::Conflict);
        }
        self.inner.update(registration).await
    }

    async fn upsert(&self, registration: &InstanceRegistration) -> CoordinatorResult<i64> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert(registration).await
    }

    async fn find(
        &self,
        worker_type_name: &str,
        instance_id: &str,
    ) -> CoordinatorResult<Option<InstanceRegistration>> {
        self.inner.find(worker_type_name, instance_id).await
    }

    async fn list_by_worker_type(
        &self,
        worker_type_name: &str,
    ) -> CoordinatorResult<Vec<InstanceRegistration>> {
        self.inner.list_by_worker_type(worker_type_name).await
    }

    async fn delete(&self, worker_type_name: &str, instance_id: &str) -> CoordinatorResult<DeleteOutcome> {
        self.inner.delete(worker_type_name, instance_id).await
    }
}

/// Registration backend whose reads and writes can be switched to fail
#[derive(Debug, Clone, Default)]
pub struct FailingRegistrationBackend {
    inner: InMemoryRegistrationBackend,
    failing: Arc<AtomicBool>,
}

impl FailingRegistrationBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &InMemoryRegistrationBackend {
        &self.inner
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> CoordinatorResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CoordinatorError::Internal("registration store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RegistrationBackend for FailingRegistrationBackend {
    async fn insert(&self, registration: &InstanceRegistration) -> CoordinatorResult<WriteOutcome> {
        self.check()?;
        self.inner.insert(registration).await
    }

    async fn update(&self, registration: &InstanceRegistration) -> CoordinatorResult<WriteOutcome> {
        self.check()?;
        self.inner.update(registration).await
    }

    async fn upsert(&self, registration: &InstanceRegistration) -> CoordinatorResult<i64> {
        self.check()?;
        self.inner.upsert(registration).await
    }

    async fn find(
        &self,
        worker_type_name: &str,
        instance_id: &str,
    ) -> CoordinatorResult<Option<InstanceRegistration>> {
        self.check()?;
        self.inner.find(worker_type_name, instance_id).await
    }

    async fn list_by_worker_type(
        &self,
        worker_type_name: &str,
    ) -> CoordinatorResult<Vec<InstanceRegistration>> {
        self.check()?;
        self.inner.list_by_worker_type(worker_type_name).await
    }

    async fn delete(&self, worker_type_name: &str, instance_id: &str) -> CoordinatorResult<DeleteOutcome> {
        self.check()?;
        self.inner.delete(worker_type_name, instance_id).await
    }
}

/// Task cache whose writes can be switched to fail; reads always pass through
#[derive(Debug, Clone, Default)]
pub struct FailingTaskCacheStore {
    inner: InMemoryTaskCacheStore,
    failing_writes: Arc<AtomicBool>,
    failed_writes: Arc<AtomicUsize>,
}

impl FailingTaskCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &InMemoryTaskCacheStore {
        &self.inner
    }

    pub fn set_failing_writes(&self, failing: bool) {
        self.failing_writes.store(failing, Ordering::SeqCst);
    }

    pub fn failed_writes(&self) -> usize {
        self.failed_writes.load(Ordering::SeqCst)
    }

    fn check_write(&self) -> CoordinatorResult<()> {
        if self.failing_writes.load(Ordering::SeqCst) {
            self.failed_writes.fetch_add(1, Ordering::SeqCst);
            return Err(CoordinatorError::Cache("cache write rejected".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TaskCacheStore for FailingTaskCacheStore {
    async fn get_all(&self, queue_name: &str) -> CoordinatorResult<Vec<DistributedTaskRecord>> {
        self.inner.get_all(queue_name).await
    }

    async fn get(
        &self,
        queue_name: &str,
        id: &str,
    ) -> CoordinatorResult<Option<DistributedTaskRecord>> {
        self.inner.get(queue_name, id).await
    }

    async fn put(&self, queue_name: &str, record: &DistributedTaskRecord) -> CoordinatorResult<()> {
        self.check_write()?;
        self.inner.put(queue_name, record).await
    }

    async fn update_existing(
        &self,
        queue_name: &str,
        record: &DistributedTaskRecord,
    ) -> CoordinatorResult<bool> {
        self.check_write()?;
        self.inner.update_existing(queue_name, record).await
    }

    async fn remove(&self, queue_name: &str, id: &str) -> CoordinatorResult<bool> {
        self.check_write()?;
        self.inner.remove(queue_name, id).await
    }

    async fn replace_kind(
        &self,
        queue_name: &str,
        kind: &str,
        records: &[DistributedTaskRecord],
    ) -> CoordinatorResult<()> {
        self.check_write()?;
        self.inner.replace_kind(queue_name, kind, records).await
    }
}
