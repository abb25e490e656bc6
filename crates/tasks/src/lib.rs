//! 分布式长任务队列与进度跟踪

pub mod jobs;
pub mod progress;
pub mod queue;
pub mod task;

pub use jobs::*;
pub use progress::DistributedTaskProgress;
pub use queue::{DistributedTaskQueue, TaskContext};
pub use task::{DistributedJob, DistributedTask};
