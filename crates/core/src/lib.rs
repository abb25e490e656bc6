pub mod config;
pub mod errors;
pub mod models;
pub mod traits;

pub use config::*;
pub use errors::*;
pub use models::{DistributedTaskRecord, DistributedTaskStatus, InstanceRegistration};
pub use traits::{
    Clock, DeleteOutcome, DistributedLockGuard, DistributedLockProvider, RegistrationBackend,
    SystemClock, TaskCacheStore, WriteOutcome,
};
