mod async_group;
mod cancel;
mod group;
mod outcome;
mod task;

pub use async_group::AsyncTaskGroup;
pub use cancel::{CancellationExt, Cancelled, CancellationToken};
pub use group::TaskGroup;
pub use outcome::{Outcome, ResultEntry, Settled, TaskResults};
pub use task::{AsyncOperation, BlockingOperation, Task, TaskFuture, TaskSpec};
