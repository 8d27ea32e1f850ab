//! Synchronization primitives: fences and command queues.

pub mod fence;
pub mod queue;
