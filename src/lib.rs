//! Frame scheduler for explicit GPU APIs.
//!
//! Deimos turns a declarative render pipeline, a directed acyclic graph of
//! graphics tasks, into a correctly ordered and correctly synchronized stream
//! of GPU command lists. It tracks resource states across the whole frame so
//! that only the minimum set of transition barriers is emitted, and it records
//! independent tasks in parallel on a worker pool whenever their declared
//! resource usage allows it.
//!
//! The library is built around a two-phase task contract. Every frame, each
//! task first runs a *setup* phase that declares which resources it will touch
//! and in which states, and only then an *execute* phase that records a single
//! command list. Because all usage declarations are known before any recording
//! starts, cross-task synchronization is computed globally and barriers are
//! batched per schedule group instead of being scattered through the frame.
//!
//! To get started, build a [`Pipeline`] out of [`TaskNode`]s, hand it to a
//! [`Scheduler`] and call [`Scheduler::execute`] once per frame with a
//! [`FrameContext`] describing the frame's targets, queues and pending
//! uploads.
//!
//! ```
//! use deimos::prelude::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut pipeline = Pipeline::new();
//! let clear = pipeline.add_task(TaskNode::new(
//!     TaskBuilder::new("clear")
//!         .setup(|ctx| {
//!             let target = ctx.back_buffer().clone();
//!             ctx.use_resource_write(&target, Subresources::All, ResourceState::RenderTarget)
//!         })
//!         .execute(|ctx| {
//!             let target = ctx.back_buffer().clone();
//!             ctx.list().set_resource_state(&target, Subresources::All, ResourceState::RenderTarget)?;
//!             ctx.list().clear_render_target(&target, [0.0, 0.0, 0.0, 1.0]);
//!             Ok(())
//!         })
//!         .build(),
//! ));
//! let draw = pipeline.add_task(TaskNode::new(
//!     TaskBuilder::new("draw")
//!         .setup(|ctx| {
//!             let target = ctx.back_buffer().clone();
//!             ctx.use_resource_write(&target, Subresources::All, ResourceState::RenderTarget)
//!         })
//!         .execute(|ctx| {
//!             ctx.list().draw(3, 1);
//!             Ok(())
//!         })
//!         .build(),
//! ));
//! pipeline.add_dependency(clear, draw)?;
//!
//! let mut scheduler = Scheduler::new(SchedulerCreateInfo::default())?;
//! scheduler.set_pipeline(pipeline)?;
//! # Ok(())
//! # }
//! ```
//!
//! For further reading, check out the following modules:
//! - [`graph`] for the pipeline DAG, the task contract and schedule building.
//! - [`scheduler`] for the per-frame orchestration facade.
//! - [`resource`] for resource handles, state tracking and object pools.
//! - [`command`] for command lists, allocators and scratch memory.
//! - [`sync`] for fences and command queues.

#[macro_use]
extern crate derivative;
#[macro_use]
extern crate log;

pub mod prelude;
pub use crate::prelude::*;

pub mod command;
pub mod core;
pub mod graph;
pub mod resource;
pub mod scheduler;
pub mod sync;
