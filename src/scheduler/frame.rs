//! Per-frame inputs handed to the scheduler by the engine.

use std::sync::{Arc, Mutex};

use anyhow::Result;

use crate::command::allocator::CommandAllocator;
use crate::command::scratch::ScratchSpace;
use crate::resource::descriptor::DescriptorHeap;
use crate::resource::handle::{ResourceHandle, Subresources};
use crate::resource::pool::Pool;
use crate::resource::state::ResourceState;
use crate::sync::fence::Fence;
use crate::sync::queue::QueueSet;

/// Describes data the engine wants copied into a resource at the start of the
/// frame. The implicit upload task turns these into ordinary usage records so
/// staged resources flow through barrier injection like everything else.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// The resource receiving the data.
    pub target: ResourceHandle,
    /// Which subresources are written.
    pub subresources: Subresources,
    /// Size of the staged data in bytes.
    pub size: u64,
    /// The state the resource should be left in once the copy is done.
    pub post_state: ResourceState,
}

/// Everything the scheduler needs to run one frame: the frame's identity and
/// target, the command queues, the pools that feed per-task allocators and
/// scratch spaces, the transient descriptor heap, pending uploads, and the
/// fence that tracks the frame on the GPU timeline.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct FrameContext {
    /// Index of this frame, increasing monotonically.
    pub frame_index: u64,
    /// The swapchain image this frame renders to.
    pub back_buffer: ResourceHandle,
    /// The command queues submissions go to.
    pub queues: QueueSet,
    /// Pool of command allocators, keyed by queue kind.
    #[derivative(Debug = "ignore")]
    pub allocators: Pool<CommandAllocator>,
    /// Pool of per-task scratch spaces.
    #[derivative(Debug = "ignore")]
    pub scratch: Pool<ScratchSpace>,
    /// Heap for transient descriptor allocations.
    pub descriptors: Arc<Mutex<DescriptorHeap>>,
    /// Data to upload before any task runs. Drained by the scheduler.
    pub uploads: Vec<UploadRequest>,
    /// The fence the frame's submissions signal.
    pub frame_fence: Fence,
}

/// Default chunk size of pooled scratch spaces.
const SCRATCH_CHUNK_SIZE: u64 = 64 * 1024;
/// Default capacity of the transient descriptor heap.
const DESCRIPTOR_HEAP_CAPACITY: u32 = 4096;

impl FrameContext {
    /// Create a frame context with freshly created pools and a default-sized
    /// descriptor heap. Engines that manage pools across frames construct the
    /// struct directly instead and pass the same pools every frame.
    pub fn new(
        frame_index: u64,
        back_buffer: ResourceHandle,
        queues: QueueSet,
        frame_fence: Fence,
    ) -> Result<Self> {
        Ok(Self {
            frame_index,
            back_buffer,
            queues,
            allocators: Pool::new(|kind: &_| Ok(CommandAllocator::new(*kind)))?,
            scratch: Pool::new(|_: &()| Ok(ScratchSpace::new(SCRATCH_CHUNK_SIZE)))?,
            descriptors: Arc::new(Mutex::new(DescriptorHeap::new(DESCRIPTOR_HEAP_CAPACITY))),
            uploads: Vec::new(),
            frame_fence,
        })
    }
}
