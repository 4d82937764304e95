pub mod pool;
pub mod retry;
pub mod consumer;

pub use pool::WorkerPool;
pub use retry::{RetryDecision, RetryPolicy};
pub use consumer::{ConsumerLoop, Dispatcher};
