#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::Result;

use deimos::prelude::*;

/// A scheduler plus everything needed to feed it frames, ready for automated
/// tests. Pools and the descriptor heap persist across frames, like an engine
/// would keep them.
pub struct Context {
    pub scheduler: Scheduler,
    pub queues: QueueSet,
    pub fence: Fence,
    pub back_buffer: ResourceHandle,
    pub descriptors: Arc<Mutex<DescriptorHeap>>,
    allocators: Pool<CommandAllocator>,
    scratch: Pool<ScratchSpace>,
    next_frame: u64,
}

/// Creates a context with default scheduler settings and unbounded queues.
pub fn make_context() -> Result<Context> {
    make_context_with_queues(QueueSet::new())
}

/// Creates a context submitting to the given queues.
pub fn make_context_with_queues(queues: QueueSet) -> Result<Context> {
    make_context_with_settings(queues, |info| info)
}

/// Creates a context with adjusted scheduler settings.
pub fn make_context_with_settings(
    queues: QueueSet,
    callback: impl FnOnce(SchedulerCreateInfo) -> SchedulerCreateInfo,
) -> Result<Context> {
    let _ = pretty_env_logger::try_init();
    let info = callback(SchedulerCreateInfo::default());
    Ok(Context {
        scheduler: Scheduler::new(info)?,
        queues,
        fence: Fence::new(),
        back_buffer: ResourceHandle::new("back-buffer", 1),
        descriptors: Arc::new(Mutex::new(DescriptorHeap::new(256))),
        allocators: Pool::new(|kind: &_| Ok(CommandAllocator::new(*kind)))?,
        scratch: Pool::new(|_: &()| Ok(ScratchSpace::new(16 * 1024)))?,
        next_frame: 0,
    })
}

impl Context {
    /// Build the next frame's context, reusing the shared pools and fence.
    pub fn frame(&mut self) -> FrameContext {
        let frame_index = self.next_frame;
        self.next_frame += 1;
        FrameContext {
            frame_index,
            back_buffer: self.back_buffer.clone(),
            queues: self.queues.clone(),
            allocators: self.allocators.clone(),
            scratch: self.scratch.clone(),
            descriptors: self.descriptors.clone(),
            uploads: Vec::new(),
            frame_fence: self.fence.clone(),
        }
    }

    /// Run one frame through the scheduler.
    pub fn run_frame(&mut self) -> Result<()> {
        let mut frame = self.frame();
        self.scheduler.execute(&mut frame)
    }
}

/// A read-style usage of every subresource.
pub fn read_usage(resource: &ResourceHandle, state: ResourceState) -> UsageRecord {
    UsageRecord {
        resource: resource.clone(),
        subresources: Subresources::All,
        first_state: state,
        last_state: state,
        multiple_use: false,
    }
}

/// A write-style usage of every subresource.
pub fn write_usage(resource: &ResourceHandle, state: ResourceState) -> UsageRecord {
    UsageRecord {
        resource: resource.clone(),
        subresources: Subresources::All,
        first_state: state,
        last_state: state,
        multiple_use: true,
    }
}

/// Sort a usage list by resource identity, the order the oracle expects.
pub fn sorted(mut usages: Vec<UsageRecord>) -> Vec<UsageRecord> {
    usages.sort_by_key(|usage| usage.resource.id());
    usages
}

/// A task that declares the given usages and records a draw behind matching
/// state declarations.
pub fn usage_task(name: &str, usages: Vec<UsageRecord>) -> TaskNode {
    usage_task_on(name, QueueKind::Graphics, usages)
}

/// Same as [`usage_task`], submitting to the given queue.
pub fn usage_task_on(name: &str, queue: QueueKind, usages: Vec<UsageRecord>) -> TaskNode {
    let declared = usages.clone();
    TaskNode::new(
        TaskBuilder::new(name)
            .queue(queue)
            .setup(move |ctx| {
                for usage in &declared {
                    ctx.declare_usage(usage.clone())?;
                }
                Ok(())
            })
            .execute(move |ctx| {
                for usage in &usages {
                    ctx.list()
                        .set_resource_state(&usage.resource, usage.subresources, usage.first_state)?;
                }
                ctx.list().draw(3, 1);
                Ok(())
            })
            .build(),
    )
}

/// A task that records a draw with a distinctive vertex count, so its list
/// can be identified in the submission stream.
pub fn tagged_task(name: &str, tag: u32, usages: Vec<UsageRecord>) -> TaskNode {
    let declared = usages.clone();
    TaskNode::new(
        TaskBuilder::new(name)
            .setup(move |ctx| {
                for usage in &declared {
                    ctx.declare_usage(usage.clone())?;
                }
                Ok(())
            })
            .execute(move |ctx| {
                for usage in &usages {
                    ctx.list()
                        .set_resource_state(&usage.resource, usage.subresources, usage.first_state)?;
                }
                ctx.list().draw(tag, 1);
                Ok(())
            })
            .build(),
    )
}

/// Every transition submitted to the queue, in submission order.
pub fn all_transitions(queues: &QueueSet, kind: QueueKind) -> Vec<Transition> {
    let queue = queues.get(kind);
    let queue = queue.lock().unwrap();
    queue
        .submissions()
        .iter()
        .flat_map(|submission| submission.lists.iter())
        .flat_map(|list| list.commands().iter())
        .filter_map(|command| match command {
            Command::Barriers(batch) => Some(batch.clone()),
            _ => None,
        })
        .flatten()
        .collect()
}

/// The vertex counts of every draw submitted to the queue, in submission
/// order. Pairs with [`tagged_task`].
pub fn draw_tags(queues: &QueueSet, kind: QueueKind) -> Vec<u32> {
    let queue = queues.get(kind);
    let queue = queue.lock().unwrap();
    queue
        .submissions()
        .iter()
        .flat_map(|submission| submission.lists.iter())
        .flat_map(|list| list.commands().iter())
        .filter_map(|command| match command {
            Command::Draw {
                vertex_count, ..
            } => Some(*vertex_count),
            _ => None,
        })
        .collect()
}

/// A readable, identity-free rendering of everything submitted to the queue,
/// usable for byte-for-byte comparison between runs.
pub fn fingerprint(queues: &QueueSet, kind: QueueKind) -> Vec<String> {
    let queue = queues.get(kind);
    let queue = queue.lock().unwrap();
    let mut out = Vec::new();
    for (index, submission) in queue.submissions().iter().enumerate() {
        out.push(format!(
            "submission {index}: {} lists, {} waits",
            submission.lists.len(),
            submission.waits.len()
        ));
        for list in &submission.lists {
            for command in list.commands() {
                out.push(match command {
                    Command::Barriers(batch) => {
                        let parts: Vec<String> = batch
                            .iter()
                            .map(|t| {
                                format!("{}[{}] {:?}->{:?}", t.resource.name(), t.subresource, t.from, t.to)
                            })
                            .collect();
                        format!("barriers: {}", parts.join(", "))
                    }
                    Command::Draw {
                        vertex_count,
                        instance_count,
                    } => format!("draw {vertex_count}x{instance_count}"),
                    Command::Dispatch {
                        groups,
                    } => format!("dispatch {groups:?}"),
                    Command::CopyResource {
                        ..
                    } => "copy".to_string(),
                    Command::ClearRenderTarget {
                        color, ..
                    } => format!("clear {color:?}"),
                });
            }
        }
    }
    out
}

/// Number of submissions on the queue.
pub fn submission_count(queues: &QueueSet, kind: QueueKind) -> usize {
    let queue = queues.get(kind);
    let count = queue.lock().unwrap().submissions().len();
    count
}
