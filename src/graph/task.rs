//! The graphics task contract and its per-frame contexts.
//!
//! Every task runs in two phases each frame. *Setup* declares, through a
//! [`SetupContext`], every resource the task will touch and may claim
//! transient descriptor slots and constant ranges; it must not record any GPU
//! commands. *Execute* records exactly one command list through a
//! [`RenderContext`]. The split lets the scheduler learn the complete
//! cross-task synchronization picture before any recording starts, so
//! barriers can be computed globally and batched.

use std::sync::Mutex;

use anyhow::Result;
use static_assertions::assert_impl_all;

use crate::command::list::CommandList;
use crate::command::scratch::{ScratchRange, ScratchSpace};
use crate::core::error::Error;
use crate::resource::descriptor::{DescriptorHeap, DescriptorSlot};
use crate::resource::handle::{ResourceHandle, Subresources};
use crate::resource::pool::Pooled;
use crate::resource::state::ResourceState;
use crate::sync::queue::QueueKind;

/// A task's declared use of a resource. `first_state` is what a preceding
/// barrier must establish before the task's list runs; `last_state` is what
/// the state table must show once the task has executed. `multiple_use` is
/// true when the task uses the resource in more than one state internally or
/// writes it; such a task never records in parallel with another user of the
/// same resource.
#[derive(Debug, Clone)]
pub struct UsageRecord {
    /// The resource being used.
    pub resource: ResourceHandle,
    /// Which subresources the use covers.
    pub subresources: Subresources,
    /// State the task needs on entry.
    pub first_state: ResourceState,
    /// State the task leaves the resource in.
    pub last_state: ResourceState,
    /// Whether the task writes the resource or uses it in several states.
    pub multiple_use: bool,
}

/// A graphics task, the node type of a render pipeline.
pub trait GraphicsTask: Send {
    /// Display name of the task, used in errors and logs.
    fn name(&self) -> &str;

    /// The queue this task's command list should be submitted to.
    fn queue_kind(&self) -> QueueKind {
        QueueKind::Graphics
    }

    /// Declare resource usages and claim transient allocations for this
    /// frame. Must not record GPU commands.
    fn setup(&mut self, ctx: &mut SetupContext) -> Result<()>;

    /// Record this frame's command list.
    fn execute(&mut self, ctx: &mut RenderContext) -> Result<()>;
}

/// Context handed to [`GraphicsTask::setup`]. Collects the task's usage
/// declarations and transient allocations.
pub struct SetupContext<'a> {
    frame_index: u64,
    back_buffer: ResourceHandle,
    descriptors: &'a Mutex<DescriptorHeap>,
    constants: &'a Mutex<Pooled<ScratchSpace>>,
    usages: Vec<UsageRecord>,
    transients: Vec<DescriptorSlot>,
}

impl<'a> SetupContext<'a> {
    pub(crate) fn new(
        frame_index: u64,
        back_buffer: ResourceHandle,
        descriptors: &'a Mutex<DescriptorHeap>,
        constants: &'a Mutex<Pooled<ScratchSpace>>,
    ) -> Self {
        Self {
            frame_index,
            back_buffer,
            descriptors,
            constants,
            usages: Vec::new(),
            transients: Vec::new(),
        }
    }

    /// Index of the frame being prepared.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// The swapchain image this frame renders to.
    pub fn back_buffer(&self) -> &ResourceHandle {
        &self.back_buffer
    }

    /// Declare a read-style use: the resource is needed in `state` for the
    /// whole task and is left in it.
    pub fn use_resource(
        &mut self,
        resource: &ResourceHandle,
        subresources: Subresources,
        state: ResourceState,
    ) -> Result<()> {
        self.declare_usage(UsageRecord {
            resource: resource.clone(),
            subresources,
            first_state: state,
            last_state: state,
            multiple_use: false,
        })
    }

    /// Declare a write-style use: the resource is needed in `state`, is left
    /// in it, and the task must not share it with concurrently recording
    /// tasks.
    pub fn use_resource_write(
        &mut self,
        resource: &ResourceHandle,
        subresources: Subresources,
        state: ResourceState,
    ) -> Result<()> {
        self.declare_usage(UsageRecord {
            resource: resource.clone(),
            subresources,
            first_state: state,
            last_state: state,
            multiple_use: true,
        })
    }

    /// Declare a use that enters in `first` and leaves in `last`, with the
    /// transition recorded inside the task's own list.
    pub fn use_resource_transitioning(
        &mut self,
        resource: &ResourceHandle,
        subresources: Subresources,
        first: ResourceState,
        last: ResourceState,
    ) -> Result<()> {
        self.declare_usage(UsageRecord {
            resource: resource.clone(),
            subresources,
            first_state: first,
            last_state: last,
            multiple_use: true,
        })
    }

    /// Declare a fully specified usage record.
    /// # Errors
    /// * Fails if a specific subresource index is out of range.
    pub fn declare_usage(&mut self, usage: UsageRecord) -> Result<()> {
        if let Subresources::Index(index) = usage.subresources {
            if index >= usage.resource.subresource_count() {
                return Err(Error::SubresourceOutOfRange {
                    resource: usage.resource.name().to_owned(),
                    index,
                    count: usage.resource.subresource_count(),
                }
                .into());
            }
        }
        self.usages.push(usage);
        Ok(())
    }

    /// Claim a transient descriptor slot. The slot is valid for this frame
    /// and returns to the heap when the frame's fence completes.
    pub fn allocate_descriptor(&mut self) -> Result<DescriptorSlot> {
        let slot = self.descriptors.lock().unwrap().allocate()?;
        self.transients.push(slot);
        Ok(slot)
    }

    /// Claim a transient constant-buffer range from the frame's shared
    /// scratch space.
    pub fn allocate_constants(&mut self, size: u64) -> Result<ScratchRange> {
        self.constants.lock().unwrap().allocate(size)
    }

    /// Sort the collected usages by resource identity, as required by the
    /// merge walks downstream, and hand everything to the owning node.
    pub(crate) fn finish(mut self) -> (Vec<UsageRecord>, Vec<DescriptorSlot>) {
        self.usages.sort_by(|a, b| {
            (a.resource.id(), subresource_sort_key(a.subresources))
                .cmp(&(b.resource.id(), subresource_sort_key(b.subresources)))
        });
        (self.usages, self.transients)
    }
}

fn subresource_sort_key(subresources: Subresources) -> u64 {
    match subresources {
        Subresources::All => 0,
        Subresources::Index(i) => 1 + i as u64,
    }
}

/// Context handed to [`GraphicsTask::execute`]. Wraps the command list being
/// recorded and the worker's scratch space.
pub struct RenderContext<'a> {
    frame_index: u64,
    back_buffer: ResourceHandle,
    list: &'a mut CommandList,
    scratch: &'a mut ScratchSpace,
}

impl<'a> RenderContext<'a> {
    pub(crate) fn new(
        frame_index: u64,
        back_buffer: ResourceHandle,
        list: &'a mut CommandList,
        scratch: &'a mut ScratchSpace,
    ) -> Self {
        Self {
            frame_index,
            back_buffer,
            list,
            scratch,
        }
    }

    /// Index of the frame being recorded.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// The swapchain image this frame renders to.
    pub fn back_buffer(&self) -> &ResourceHandle {
        &self.back_buffer
    }

    /// The command list this task records into.
    pub fn list(&mut self) -> &mut CommandList {
        self.list
    }

    /// Scratch space owned by this task for the duration of the frame.
    pub fn scratch(&mut self) -> &mut ScratchSpace {
        self.scratch
    }
}

type InitFn = Box<dyn FnMut() + Send>;
type CleanupFn = std::sync::Arc<dyn Fn() + Send + Sync>;

/// A pipeline node: a graphics task together with the per-frame data the
/// scheduler tracks for it.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct TaskNode {
    pub(crate) name: String,
    pub(crate) queue_kind: QueueKind,
    #[derivative(Debug = "ignore")]
    pub(crate) task: Option<Box<dyn GraphicsTask>>,
    pub(crate) usages: Vec<UsageRecord>,
    pub(crate) transients: Vec<DescriptorSlot>,
    #[derivative(Debug = "ignore")]
    pub(crate) init: Option<InitFn>,
    #[derivative(Debug = "ignore")]
    pub(crate) cleanup: Option<CleanupFn>,
}

assert_impl_all!(TaskNode: Send);

impl TaskNode {
    /// Wrap a task into a pipeline node.
    pub fn new(task: impl GraphicsTask + 'static) -> Self {
        let name = task.name().to_owned();
        let queue_kind = task.queue_kind();
        Self {
            name,
            queue_kind,
            task: Some(Box::new(task)),
            usages: Vec::new(),
            transients: Vec::new(),
            init: None,
            cleanup: None,
        }
    }

    /// Attach work that runs on the orchestrating thread right before the
    /// frame's submissions are enqueued.
    pub fn with_init(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.init = Some(Box::new(f));
        self
    }

    /// Attach work that runs when the frame fence completes, after the GPU
    /// has finished with this task's command list.
    pub fn with_cleanup(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.cleanup = Some(std::sync::Arc::new(f));
        self
    }

    /// Display name of the wrapped task.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The queue this node's list is submitted to.
    pub fn queue_kind(&self) -> QueueKind {
        self.queue_kind
    }

    /// The usage list declared by the most recent setup phase, sorted by
    /// resource identity.
    pub fn usages(&self) -> &[UsageRecord] {
        &self.usages
    }
}

type SetupFn = Box<dyn FnMut(&mut SetupContext) -> Result<()> + Send>;
type ExecuteFn = Box<dyn FnMut(&mut RenderContext) -> Result<()> + Send>;

/// Builds a [`GraphicsTask`] out of closures, for tasks that don't warrant a
/// dedicated type.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct TaskBuilder {
    name: String,
    queue_kind: QueueKind,
    #[derivative(Debug = "ignore")]
    setup: Option<SetupFn>,
    #[derivative(Debug = "ignore")]
    execute: Option<ExecuteFn>,
}

impl TaskBuilder {
    /// Start building a task with the given display name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            queue_kind: QueueKind::Graphics,
            setup: None,
            execute: None,
        }
    }

    /// Submit this task's list to the given queue kind instead of the
    /// graphics queue.
    pub fn queue(mut self, kind: QueueKind) -> Self {
        self.queue_kind = kind;
        self
    }

    /// Set the setup phase of the task.
    pub fn setup(
        mut self,
        f: impl FnMut(&mut SetupContext) -> Result<()> + Send + 'static,
    ) -> Self {
        self.setup = Some(Box::new(f));
        self
    }

    /// Set the execute phase of the task.
    pub fn execute(
        mut self,
        f: impl FnMut(&mut RenderContext) -> Result<()> + Send + 'static,
    ) -> Self {
        self.execute = Some(Box::new(f));
        self
    }

    /// Finish building.
    pub fn build(self) -> ClosureTask {
        ClosureTask {
            name: self.name,
            queue_kind: self.queue_kind,
            setup: self.setup,
            execute: self.execute,
        }
    }
}

/// A [`GraphicsTask`] assembled from closures by [`TaskBuilder`]. Phases
/// without a closure are no-ops.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct ClosureTask {
    name: String,
    queue_kind: QueueKind,
    #[derivative(Debug = "ignore")]
    setup: Option<SetupFn>,
    #[derivative(Debug = "ignore")]
    execute: Option<ExecuteFn>,
}

impl GraphicsTask for ClosureTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn queue_kind(&self) -> QueueKind {
        self.queue_kind
    }

    fn setup(&mut self, ctx: &mut SetupContext) -> Result<()> {
        match &mut self.setup {
            Some(f) => f(ctx),
            None => Ok(()),
        }
    }

    fn execute(&mut self, ctx: &mut RenderContext) -> Result<()> {
        match &mut self.execute {
            Some(f) => f(ctx),
            None => Ok(()),
        }
    }
}
