//! Exposes the deimos error type

use thiserror::Error;

/// Error type that deimos can return.
#[derive(Error, Debug)]
pub enum Error {
    /// Pipeline contains a cycle and is impossible to schedule.
    #[error("Pipeline contains a cycle.")]
    GraphHasCycle,
    /// An edge references a node that is not part of the pipeline.
    #[error("Dependency edge references a node that is not in the pipeline.")]
    NodeNotFound,
    /// The scheduler has no pipeline to execute.
    #[error("No pipeline is set on the scheduler.")]
    NoPipeline,
    /// A lifecycle operation was requested while a frame was still in flight.
    #[error("Operation not allowed while a frame is in flight.")]
    PipelineBusy,
    /// The current pipeline was invalidated by an earlier submission failure and
    /// must be replaced before new frames can run.
    #[error("Pipeline was invalidated by an earlier failure and must be replaced.")]
    PipelineInvalid,
    /// A task declared or touched a subresource index outside the resource's range.
    #[error("Subresource index {index} out of range for resource `{resource}` with {count} subresources.")]
    SubresourceOutOfRange {
        /// Debug name of the offending resource.
        resource: String,
        /// The requested subresource index.
        index: u32,
        /// The number of subresources the resource actually has.
        count: u32,
    },
    /// A task's setup phase returned an error. The frame was aborted.
    #[error("Task `{task}` failed during setup: {cause}")]
    SetupFailed {
        /// Name of the failing task.
        task: String,
        /// The error returned by the task.
        cause: anyhow::Error,
    },
    /// A task's execute phase returned an error. The frame was aborted.
    #[error("Task `{task}` failed during execute: {cause}")]
    ExecuteFailed {
        /// Name of the failing task.
        task: String,
        /// The error returned by the task.
        cause: anyhow::Error,
    },
    /// The command queue rejected a submission. The current pipeline is
    /// invalidated until it is replaced.
    #[error("Command queue rejected submission: {0}")]
    SubmissionRejected(&'static str),
    /// A usage was declared for a resource the state table has never seen.
    /// This is recovered from locally by adopting the declared state.
    #[error("Resource `{0}` has no known state.")]
    ResourceStateUnknown(String),
    /// A command was recorded on a command list that was already closed.
    #[error("Command list is closed and cannot record further commands.")]
    CommandListClosed,
    /// The descriptor heap has no free slots left.
    #[error("Descriptor heap is full.")]
    DescriptorHeapFull,
    /// Uncategorized error.
    #[error("Uncategorized error: `{0}`")]
    Uncategorized(&'static str),
}
