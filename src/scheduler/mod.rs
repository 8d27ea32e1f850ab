//! The per-frame orchestration facade.
//!
//! [`Scheduler`] owns the render pipeline between [`Scheduler::set_pipeline`]
//! and [`Scheduler::release_pipeline`] and turns it into GPU submissions once
//! per [`Scheduler::execute`] call. A frame runs in five phases: the setup
//! pass gathers every task's resource usage in parallel, the schedule builder
//! produces a deterministic linear order partitioned into parallel-compatible
//! groups, the record pass records command lists on the worker pool under the
//! compatibility admission rule, assembly injects one barrier batch per group
//! and advances the state table, and submission enqueues per-queue streams
//! with fence signals and cross-queue waits. Any error aborts the frame,
//! rolls the state table back and paints the failure screen instead.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::{mpsc, Arc, Mutex};

use anyhow::Result;
use rayon::prelude::*;
use static_assertions::assert_impl_all;

use crate::command::allocator::CommandAllocator;
use crate::command::list::CommandList;
use crate::command::scratch::ScratchSpace;
use crate::core::error::Error;
use crate::graph::barrier::{advance_states, barriers_for_group};
use crate::graph::compat::CompatibilityMatrix;
use crate::graph::pipeline::{NodeId, Pipeline};
use crate::graph::schedule::ScheduleBuilder;
use crate::graph::task::{GraphicsTask, RenderContext, SetupContext, TaskNode, UsageRecord};
use crate::resource::descriptor::DescriptorSlot;
use crate::resource::handle::ResourceHandle;
use crate::resource::pool::{Poolable, Pooled};
use crate::resource::state::ResourceState;
use crate::resource::state_table::ResourceStateTable;
use crate::scheduler::failure::render_failure_screen;
use crate::scheduler::frame::FrameContext;
use crate::scheduler::upload::UploadTask;
use crate::sync::fence::Fence;
use crate::sync::queue::{QueueKind, Submission};

mod failure;
pub mod frame;
mod upload;

/// Construction parameters for a [`Scheduler`].
#[derive(Debug, Clone)]
pub struct SchedulerCreateInfo {
    /// Number of worker threads used for the setup and record passes. At
    /// least one.
    pub worker_count: usize,
    /// Upper bound on simultaneously recording tasks. Defaults to
    /// `worker_count`.
    pub max_parallel_record: Option<usize>,
    /// RGBA color the failure screen clears the back buffer to.
    pub failure_color: [f32; 4],
}

impl Default for SchedulerCreateInfo {
    fn default() -> Self {
        Self {
            worker_count: 4,
            max_parallel_record: None,
            failure_color: [1.0, 0.0, 1.0, 1.0],
        }
    }
}

/// The frame scheduler. See the [module documentation](self) for an overview
/// of the phases a frame goes through.
pub struct Scheduler {
    workers: rayon::ThreadPool,
    max_parallel_record: usize,
    failure_color: [f32; 4],
    pipeline: Option<Pipeline>,
    poisoned: bool,
    table: ResourceStateTable,
    in_flight: Option<(Fence, u64)>,
    fence_cursor: u64,
}

assert_impl_all!(Scheduler: Send);

/// Everything a record worker sends back to the orchestrator when a task's
/// execute phase returns.
struct RecordMessage {
    position: usize,
    task: Box<dyn GraphicsTask>,
    allocator: Pooled<CommandAllocator>,
    scratch: Pooled<ScratchSpace>,
    list: CommandList,
    result: Result<()>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum RecordState {
    Pending,
    Running,
    Done,
}

impl Scheduler {
    /// Create a scheduler and spin up its worker pool.
    pub fn new(info: SchedulerCreateInfo) -> Result<Self> {
        let worker_count = info.worker_count.max(1);
        let workers = rayon::ThreadPoolBuilder::new()
            .num_threads(worker_count)
            .thread_name(|index| format!("deimos-worker-{index}"))
            .build()?;
        let max_parallel_record = info.max_parallel_record.unwrap_or(worker_count).max(1);
        info!(
            "created scheduler: {} workers, at most {} parallel recordings",
            worker_count, max_parallel_record
        );
        Ok(Self {
            workers,
            max_parallel_record,
            failure_color: info.failure_color,
            pipeline: None,
            poisoned: false,
            table: ResourceStateTable::new(),
            in_flight: None,
            fence_cursor: 0,
        })
    }

    /// Start tracking a resource at its creation state. Resources that are
    /// never registered adopt the first state a task declares for them, with
    /// a warning, since there is nothing to verify the declaration against.
    pub fn track_resource(&mut self, handle: &ResourceHandle, state: ResourceState) {
        self.table.register(handle, state);
    }

    /// The tracked state of a subresource, if the resource has been seen.
    pub fn resource_state(
        &self,
        handle: &ResourceHandle,
        subresource: u32,
    ) -> Option<ResourceState> {
        self.table.current(handle, subresource)
    }

    /// Install a pipeline, replacing any previous one.
    /// # Errors
    /// * Fails with [`Error::PipelineBusy`] while a frame is in flight.
    /// * Fails if the pipeline's structural validation fails.
    pub fn set_pipeline(&mut self, pipeline: Pipeline) -> Result<()> {
        if self.frame_in_flight() {
            return Err(Error::PipelineBusy.into());
        }
        pipeline.validate()?;
        self.pipeline = Some(pipeline);
        self.poisoned = false;
        Ok(())
    }

    /// Read-only access to the installed pipeline.
    pub fn pipeline(&self) -> Option<&Pipeline> {
        self.pipeline.as_ref()
    }

    /// Move the pipeline out of the scheduler, leaving it empty.
    /// # Errors
    /// * Fails with [`Error::PipelineBusy`] while a frame is in flight.
    /// * Fails with [`Error::NoPipeline`] if no pipeline is set.
    pub fn release_pipeline(&mut self) -> Result<Pipeline> {
        if self.frame_in_flight() {
            return Err(Error::PipelineBusy.into());
        }
        self.pipeline.take().ok_or_else(|| Error::NoPipeline.into())
    }

    /// Drop every cached usage list, transient reference and tracked resource
    /// state. Used before a swapchain resize so old targets can be freed.
    /// # Errors
    /// * Fails with [`Error::PipelineBusy`] while a frame is in flight.
    pub fn release_resources(&mut self) -> Result<()> {
        if self.frame_in_flight() {
            return Err(Error::PipelineBusy.into());
        }
        self.table.clear();
        if let Some(pipeline) = self.pipeline.as_mut() {
            for node in pipeline.tasks_mut() {
                node.usages.clear();
                node.usages.shrink_to_fit();
                node.transients.clear();
            }
        }
        Ok(())
    }

    /// Whether the most recently submitted frame has not yet completed on the
    /// GPU.
    pub fn frame_in_flight(&self) -> bool {
        self.in_flight
            .as_ref()
            .map(|(fence, value)| !fence.is_complete(*value))
            .unwrap_or(false)
    }

    /// Run one frame: setup, schedule, record, assemble, submit.
    ///
    /// On error the frame is aborted: partially recorded lists are discarded
    /// and their allocators reset, the state table rolls back to its
    /// pre-frame snapshot, the failure screen is submitted in place of the
    /// frame, the fence still signals, and the error is returned. A
    /// submission failure additionally invalidates the pipeline; every later
    /// call fails with [`Error::PipelineInvalid`] until a new pipeline is
    /// set.
    pub fn execute(&mut self, ctx: &mut FrameContext) -> Result<()> {
        if self.poisoned {
            return Err(Error::PipelineInvalid.into());
        }
        if self.pipeline.is_none() {
            return Err(Error::NoPipeline.into());
        }

        let snapshot = self.table.snapshot();
        self.table.register(&ctx.back_buffer, ResourceState::Common);
        let base_value = self.fence_cursor;
        trace!("executing frame {}", ctx.frame_index);

        let outcome = Self::run_frame(
            &self.workers,
            self.max_parallel_record,
            self.pipeline.as_mut().unwrap(),
            &mut self.table,
            ctx,
            base_value,
        );
        match outcome {
            Ok(last_value) => {
                self.fence_cursor = last_value;
                self.in_flight = Some((ctx.frame_fence.clone(), last_value));
                Ok(())
            }
            Err(err) => {
                error!("frame {} aborted: {:#}", ctx.frame_index, err);
                self.table.restore(snapshot);
                self.free_frame_transients(ctx);
                if let Some(Error::SubmissionRejected(_)) = err.downcast_ref::<Error>() {
                    warn!("pipeline invalidated by submission failure");
                    self.poisoned = true;
                }
                let failure_value = ctx.frame_fence.completed_value().max(self.fence_cursor) + 1;
                self.fence_cursor = failure_value;
                render_failure_screen(
                    &ctx.queues,
                    &ctx.allocators,
                    &mut self.table,
                    &ctx.back_buffer,
                    self.failure_color,
                    &ctx.frame_fence,
                    failure_value,
                );
                self.in_flight = Some((ctx.frame_fence.clone(), failure_value));
                Err(err)
            }
        }
    }

    /// Return transient descriptor slots claimed by an aborted frame; the GPU
    /// never saw them, so they go back to the heap immediately.
    fn free_frame_transients(&mut self, ctx: &FrameContext) {
        let mut heap = ctx.descriptors.lock().unwrap();
        if let Some(pipeline) = self.pipeline.as_mut() {
            for node in pipeline.tasks_mut() {
                for slot in node.transients.drain(..) {
                    heap.free(slot);
                }
            }
        }
    }

    fn run_frame(
        workers: &rayon::ThreadPool,
        max_parallel: usize,
        pipeline: &mut Pipeline,
        table: &mut ResourceStateTable,
        ctx: &mut FrameContext,
        base_value: u64,
    ) -> Result<u64> {
        let frame_fence = ctx.frame_fence.clone();

        // The implicit upload task runs in front of everything else. Its
        // staging buffer is created here, so its state is known exactly.
        let mut upload_node = if ctx.uploads.is_empty() {
            None
        } else {
            let task = UploadTask::new(std::mem::take(&mut ctx.uploads), ctx.frame_index);
            table.register(task.staging(), ResourceState::CopySource);
            Some(TaskNode::new(task))
        };

        // Setup pass: every task declares its usages in parallel.
        let frame_constants = Mutex::new(ScratchSpace::new_in_pool(&ctx.scratch, &())?);
        {
            let heap = &*ctx.descriptors;
            let constants = &frame_constants;
            let frame_index = ctx.frame_index;
            let back_buffer = ctx.back_buffer.clone();
            let mut nodes: Vec<&mut TaskNode> = pipeline.tasks_mut().collect();
            if let Some(node) = upload_node.as_mut() {
                nodes.push(node);
            }
            workers.install(|| {
                nodes.par_iter_mut().try_for_each(|node| -> Result<()> {
                    let node = &mut **node;
                    let name = node.name.clone();
                    let mut setup_ctx =
                        SetupContext::new(frame_index, back_buffer.clone(), heap, constants);
                    let task = node.task.as_mut().expect("task is present outside the record pass");
                    task.setup(&mut setup_ctx).map_err(|cause| Error::SetupFailed {
                        task: name,
                        cause,
                    })?;
                    let (usages, transients) = setup_ctx.finish();
                    node.usages = usages;
                    node.transients.extend(transients);
                    Ok(())
                })
            })?;
        }

        // Schedule the pipeline tasks.
        let ids = pipeline.node_ids();
        let node_usages: Vec<Vec<UsageRecord>> = ids
            .iter()
            .map(|id| pipeline.task(*id).unwrap().usages().to_vec())
            .collect();
        let compat = CompatibilityMatrix::build(&node_usages);
        let schedule = ScheduleBuilder::build(pipeline, &compat)?;

        // Frame-wide order: the upload task, if present, is pinned in front
        // as its own group.
        let has_upload = upload_node.is_some();
        let offset = has_upload as usize;
        let count = schedule.len() + offset;

        let mut node_of: Vec<Option<NodeId>> = Vec::with_capacity(count);
        let mut groups: Vec<Range<usize>> = Vec::new();
        if has_upload {
            node_of.push(None);
            groups.push(0..1);
        }
        node_of.extend(schedule.order().iter().map(|id| Some(*id)));
        groups.extend(
            schedule
                .groups()
                .iter()
                .map(|range| range.start + offset..range.end + offset),
        );
        let position_of: HashMap<NodeId, usize> = schedule
            .order()
            .iter()
            .enumerate()
            .map(|(index, id)| (*id, index + offset))
            .collect();

        // Per-position metadata, in frame order.
        let mut names: Vec<String> = Vec::with_capacity(count);
        let mut queues: Vec<QueueKind> = Vec::with_capacity(count);
        let mut usages: Vec<Vec<UsageRecord>> = Vec::with_capacity(count);
        let mut boxes: Vec<Option<Box<dyn GraphicsTask>>> = Vec::with_capacity(count);
        if let Some(node) = upload_node.as_mut() {
            names.push(node.name.clone());
            queues.push(node.queue_kind);
            usages.push(node.usages.clone());
            boxes.push(node.task.take());
        }
        for id in schedule.order() {
            let node = pipeline.task_mut(*id).unwrap();
            names.push(node.name.clone());
            queues.push(node.queue_kind);
            usages.push(node.usages.clone());
            boxes.push(node.task.take());
        }
        let mut preds: Vec<Vec<usize>> = Vec::with_capacity(count);
        if has_upload {
            preds.push(Vec::new());
        }
        for id in schedule.order() {
            preds.push(
                pipeline
                    .predecessors(*id)
                    .iter()
                    .map(|pred| position_of[pred])
                    .collect(),
            );
        }
        let frame_compat = CompatibilityMatrix::build(&usages);

        // Record pass: a task is dispatched as soon as its predecessors have
        // finished recording and it is parallel-compatible with every task
        // currently in flight.
        let mut recorded: Vec<
            Option<(CommandList, Pooled<CommandAllocator>, Pooled<ScratchSpace>)>,
        > = (0..count).map(|_| None).collect();
        let mut state = vec![RecordState::Pending; count];
        let mut running: Vec<usize> = Vec::new();
        let mut completed = 0usize;
        let mut first_error: Option<Error> = None;
        let (tx, rx) = mpsc::channel::<RecordMessage>();

        while completed < count {
            if first_error.is_none() {
                while running.len() < max_parallel {
                    let candidate = (0..count).find(|&position| {
                        state[position] == RecordState::Pending
                            && preds[position]
                                .iter()
                                .all(|&pred| state[pred] == RecordState::Done)
                            && running
                                .iter()
                                .all(|&other| frame_compat.compatible(other, position))
                    });
                    let Some(position) = candidate else { break };
                    state[position] = RecordState::Running;
                    running.push(position);

                    let task = boxes[position].take().expect("task dispatched twice");
                    let allocator = CommandAllocator::new_in_pool(&ctx.allocators, &queues[position])
                        .expect("command allocator pool is infallible");
                    let scratch = ScratchSpace::new_in_pool(&ctx.scratch, &())
                        .expect("scratch pool is infallible");
                    let tx = tx.clone();
                    let frame_index = ctx.frame_index;
                    let back_buffer = ctx.back_buffer.clone();
                    workers.spawn(move || {
                        let mut task = task;
                        let mut allocator = allocator;
                        let mut scratch = scratch;
                        let mut list = allocator.create_list();
                        let result = {
                            let mut render_ctx = RenderContext::new(
                                frame_index,
                                back_buffer,
                                &mut list,
                                &mut scratch,
                            );
                            task.execute(&mut render_ctx)
                        };
                        let result = result.and_then(|()| list.finish());
                        let _ = tx.send(RecordMessage {
                            position,
                            task,
                            allocator,
                            scratch,
                            list,
                            result,
                        });
                    });
                }
            }

            if running.is_empty() {
                if first_error.is_none() {
                    // The schedule is topological, so the lowest pending
                    // position always has all predecessors done.
                    first_error = Some(Error::Uncategorized("record pass stalled"));
                }
                break;
            }

            let message = rx.recv().expect("record worker disconnected");
            running.retain(|&other| other != message.position);
            state[message.position] = RecordState::Done;
            completed += 1;
            boxes[message.position] = Some(message.task);
            match message.result {
                Ok(()) => {
                    recorded[message.position] =
                        Some((message.list, message.allocator, message.scratch));
                }
                Err(cause) => {
                    // The partial list is discarded; dropping the pooled
                    // allocator and scratch resets them and returns them to
                    // their pools.
                    if first_error.is_none() {
                        first_error = Some(Error::ExecuteFailed {
                            task: names[message.position].clone(),
                            cause,
                        });
                    }
                }
            }
        }
        drop(tx);

        // Hand every task object back to its node for the next frame.
        if let Some(node) = upload_node.as_mut() {
            node.task = boxes[0].take();
        }
        for (index, id) in schedule.order().iter().enumerate() {
            pipeline.task_mut(*id).unwrap().task = boxes[index + offset].take();
        }
        if let Some(err) = first_error {
            return Err(err.into());
        }

        // Assemble: one barrier batch per group, then the group's lists, with
        // the table advancing in schedule order behind each group.
        let mut planned: Vec<(QueueKind, Range<usize>, Submission)> = Vec::new();
        let mut group_values: Vec<u64> = Vec::new();
        let mut group_of = vec![0usize; count];
        let mut frame_allocators: Vec<Pooled<CommandAllocator>> = Vec::new();
        let mut frame_scratch: Vec<Pooled<ScratchSpace>> = Vec::new();
        let mut value = base_value;

        for (group_index, range) in groups.iter().enumerate() {
            for position in range.clone() {
                group_of[position] = group_index;
            }
            let members: Vec<&[UsageRecord]> =
                range.clone().map(|position| usages[position].as_slice()).collect();
            let queue_kind = queues[range.start];

            let mut lists = Vec::new();
            let transitions = barriers_for_group(table, &members);
            if !transitions.is_empty() {
                let mut allocator = CommandAllocator::new_in_pool(&ctx.allocators, &queue_kind)
                    .expect("command allocator pool is infallible");
                let mut list = allocator.create_list();
                list.record_barriers(transitions);
                list.finish()?;
                lists.push(list);
                frame_allocators.push(allocator);
            }
            for position in range.clone() {
                let (list, allocator, scratch) =
                    recorded[position].take().expect("scheduled task has no recorded list");
                lists.push(list);
                frame_allocators.push(allocator);
                frame_scratch.push(scratch);
            }
            advance_states(table, &members);

            value += 1;
            let mut wait_value: Option<u64> = None;
            for position in range.clone() {
                for &pred in &preds[position] {
                    if queues[pred] != queue_kind {
                        let pred_value = group_values[group_of[pred]];
                        wait_value =
                            Some(wait_value.map_or(pred_value, |wait| wait.max(pred_value)));
                    }
                }
            }
            if has_upload && group_index > 0 && queue_kind != queues[0] {
                let upload_value = group_values[0];
                wait_value = Some(wait_value.map_or(upload_value, |wait| wait.max(upload_value)));
            }
            let waits = wait_value
                .map(|wait| vec![(frame_fence.clone(), wait)])
                .unwrap_or_default();
            planned.push((
                queue_kind,
                range.clone(),
                Submission {
                    waits,
                    lists,
                    signal: Some((frame_fence.clone(), value)),
                },
            ));
            group_values.push(value);
        }

        // A frame with nothing to do still signals the fence so the chain
        // never stalls.
        if planned.is_empty() {
            value += 1;
            frame_fence.signal(value);
            return Ok(value);
        }

        // Submit, running init work right before each group's submission.
        for (queue_kind, range, submission) in planned {
            for position in range {
                if let Some(id) = node_of[position] {
                    if let Some(init) = pipeline.task_mut(id).unwrap().init.as_mut() {
                        init();
                    }
                }
            }
            let queue = ctx.queues.get(queue_kind);
            let mut queue = queue.lock().unwrap();
            queue.submit(submission)?;
        }

        // Everything the GPU still needs goes back to its pool when the
        // frame's last fence value completes.
        let mut transients: Vec<DescriptorSlot> = Vec::new();
        if let Some(node) = upload_node.as_mut() {
            transients.append(&mut node.transients);
        }
        for id in &ids {
            transients.append(&mut pipeline.task_mut(*id).unwrap().transients);
        }
        let cleanups: Vec<Arc<dyn Fn() + Send + Sync>> = schedule
            .order()
            .iter()
            .filter_map(|id| pipeline.task(*id).unwrap().cleanup.clone())
            .collect();
        let heap = ctx.descriptors.clone();
        let constants = frame_constants.into_inner().unwrap();
        frame_fence.on_completed(value, move || {
            for cleanup in &cleanups {
                cleanup();
            }
            let mut heap = heap.lock().unwrap();
            for slot in transients {
                heap.free(slot);
            }
            drop(frame_allocators);
            drop(frame_scratch);
            drop(constants);
        });

        debug!(
            "frame {}: {} tasks in {} groups submitted, fence value {}",
            ctx.frame_index,
            count,
            group_values.len(),
            value
        );
        Ok(value)
    }
}
