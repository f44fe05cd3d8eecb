//! Background task execution for the RCSIP stack
//!
//! Two scheduling primitives are provided:
//!
//! - [`SerialQueue`]: a single-threaded ordered work queue. Jobs run one at
//!   a time in submission order. Separate queues keep long-running work
//!   (deletions) from starving interactive operations.
//! - [`WorkerPool`]: a bounded pool for concurrent exchanges. At most
//!   `max_concurrent` jobs run at once; jobs submitted after shutdown are
//!   dropped, not queued.
//!
//! Both primitives catch panics at the task boundary: a failing job is
//! logged and never takes the hosting process down.

mod pool;
mod queue;

pub use pool::WorkerPool;
pub use queue::SerialQueue;
