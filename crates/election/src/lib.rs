//! 主备选举与门控调度
//!
//! 同一角色的多个实例通过共享注册表选出唯一主实例，
//! `LeaderGatedScheduler` 只在主实例上执行周期任务。

pub mod gated_scheduler;
pub mod heartbeat;
pub mod instance_id;
pub mod leader_elector;
pub mod registration_store;

pub use gated_scheduler::{ActivePassiveTask, ExecutionScope, LeaderGatedScheduler};
pub use heartbeat::RegistrationHeartbeatService;
pub use instance_id::{creation_tick, InstanceId};
pub use leader_elector::{LeaderElector, RegisterInstanceManager};
pub use registration_store::InstanceRegistrationStore;
