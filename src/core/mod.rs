//! Core modules
//!
//! Contains the heap, the Task/Promise engine, the task queues and the
//! shared plumbing the peripheral drivers are built on.

pub mod config;
pub mod critical;
pub mod cs_cell;
pub mod error;
pub mod heap;
pub mod kernel;
pub mod queue;
pub mod ring;
pub mod shared;
pub mod task;
pub mod types;
