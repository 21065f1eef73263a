//! Task lifecycle — record model, scheduling capability, and the manager
//! that drives each task to a terminal state.

pub mod manager;
pub mod model;
pub mod scheduler;

pub use manager::{spawn_poll_pump, LifecycleManager};
pub use model::{TaskRecord, TaskState};
pub use scheduler::{PollScheduler, TokioScheduler};
