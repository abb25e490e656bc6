pub mod instance;
pub mod task_record;

pub use instance::InstanceRegistration;
pub use task_record::{DistributedTaskRecord, DistributedTaskStatus};
