// src/process/mod.rs

//! Task admission, the external queue and the reservation protocol.

pub mod manager;
pub mod task;

pub use manager::{Delivery, ManagerOptions, ProcessError, ProcessManager, Reservation, WILDCARD};
pub use task::{Task, TaskError, TaskId, TaskResult, TaskSummary};
