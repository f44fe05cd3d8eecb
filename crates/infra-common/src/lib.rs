//! # Infra-Common - Shared Infrastructure for RCSIP
//!
//! Common infrastructure used by the RCSIP capability and session crates:
//!
//! - **Logging**: tracing-based logging setup with configurable output
//! - **Tasks**: serial background work queues and a bounded worker pool
//!   with tracked shutdown
//! - **Errors**: infrastructure error types

pub mod errors;
pub mod logging;
pub mod tasks;

pub use errors::{Error, Result};
pub use tasks::{SerialQueue, WorkerPool};
