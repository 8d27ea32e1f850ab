//! Re-exports the most commonly used types in the library

pub use traits::*;

pub use crate::command::allocator::CommandAllocator;
pub use crate::command::list::{Command, CommandList, Transition};
pub use crate::command::scratch::{ScratchRange, ScratchSpace};
pub use crate::core::error::Error;
pub use crate::graph::compat::{parallel_compatible, CompatibilityMatrix};
pub use crate::graph::pipeline::{NodeId, Pipeline};
pub use crate::graph::schedule::{Schedule, ScheduleBuilder};
pub use crate::graph::task::{
    ClosureTask, RenderContext, SetupContext, TaskBuilder, TaskNode, UsageRecord,
};
pub use crate::resource::descriptor::{DescriptorHeap, DescriptorSlot};
pub use crate::resource::handle::{ResourceHandle, ResourceId, Subresources};
pub use crate::resource::pool::{Pool, Pooled};
pub use crate::resource::state::ResourceState;
pub use crate::resource::state_table::ResourceStateTable;
pub use crate::scheduler::frame::{FrameContext, UploadRequest};
pub use crate::scheduler::{Scheduler, SchedulerCreateInfo};
pub use crate::sync::fence::Fence;
pub use crate::sync::queue::{CommandQueue, QueueKind, QueueSet, Submission};

/// Re-exports all important traits of the library
pub mod traits {
    pub use crate::graph::pipeline::GraphViz;
    pub use crate::graph::task::GraphicsTask;
    pub use crate::resource::pool::Poolable;
}
