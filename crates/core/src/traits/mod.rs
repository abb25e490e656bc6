pub mod clock;
pub mod lock;
pub mod registration;
pub mod task_cache;

pub use clock::*;
pub use lock::*;
pub use registration::*;
pub use task_cache::*;
