//! Command queues and the submission stream.
//!
//! A queue executes submissions strictly in the order they were enqueued,
//! which is ordering guarantee number one of the scheduler; cross-queue
//! ordering is expressed with fence waits carried by the submission itself.
//! The queue retires work at submission time, so fences signal immediately;
//! the state table deliberately races ahead of real GPU progress either way,
//! so nothing in the scheduler may depend on retirement timing.

use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex};

use anyhow::Result;

use crate::command::list::CommandList;
use crate::core::error::Error;
use crate::sync::fence::Fence;

/// The kind of work a command queue accepts.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum QueueKind {
    /// Graphics work; also accepts compute and transfer commands.
    Graphics,
    /// Async compute work.
    Compute,
    /// Dedicated transfer work.
    Transfer,
}

impl Display for QueueKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueKind::Graphics => f.write_str("graphics"),
            QueueKind::Compute => f.write_str("compute"),
            QueueKind::Transfer => f.write_str("transfer"),
        }
    }
}

/// A unit of work handed to a queue: fence waits to satisfy first, command
/// lists to execute in order, and an optional fence signal on completion.
#[derive(Debug)]
pub struct Submission {
    /// Fence values that must complete before the lists execute.
    pub waits: Vec<(Fence, u64)>,
    /// The command lists, executed in order.
    pub lists: Vec<CommandList>,
    /// Fence value signaled when the lists have executed.
    pub signal: Option<(Fence, u64)>,
}

/// A GPU command queue. Submissions execute in enqueue order.
#[derive(Debug)]
pub struct CommandQueue {
    kind: QueueKind,
    submissions: Vec<Submission>,
    capacity: Option<usize>,
    hold_signals: bool,
    held: Vec<(Fence, u64)>,
}

impl CommandQueue {
    /// Create a queue with unbounded submission capacity.
    pub fn new(kind: QueueKind) -> Self {
        Self {
            kind,
            submissions: Vec::new(),
            capacity: None,
            hold_signals: false,
            held: Vec::new(),
        }
    }

    /// Create a queue that rejects submissions past `capacity`. Models a
    /// device that has stopped accepting work.
    pub fn with_capacity(kind: QueueKind, capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::new(kind)
        }
    }

    /// The kind of work this queue accepts.
    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    /// When enabled, fence signals are withheld until
    /// [`CommandQueue::flush_signals`] is called. Models a GPU that is still
    /// executing submitted work.
    pub fn set_hold_signals(&mut self, hold: bool) {
        self.hold_signals = hold;
    }

    /// Signal every withheld fence value, in submission order.
    pub fn flush_signals(&mut self) {
        for (fence, value) in self.held.drain(..) {
            fence.signal(value);
        }
    }

    /// Enqueue a submission.
    /// # Errors
    /// * Fails if the queue is at capacity.
    /// * Fails if any list in the submission was not closed.
    pub fn submit(&mut self, submission: Submission) -> Result<()> {
        if let Some(capacity) = self.capacity {
            if self.submissions.len() >= capacity {
                return Err(Error::SubmissionRejected("command queue is at capacity").into());
            }
        }
        if submission.lists.iter().any(|list| !list.is_closed()) {
            return Err(Error::SubmissionRejected("command list was not closed").into());
        }

        for (fence, value) in &submission.waits {
            fence.wait_value(*value);
        }

        let signal = submission.signal.clone();
        self.submissions.push(submission);

        if let Some((fence, value)) = signal {
            if self.hold_signals {
                self.held.push((fence, value));
            } else {
                fence.signal(value);
            }
        }
        Ok(())
    }

    /// The submissions enqueued so far, in execution order.
    pub fn submissions(&self) -> &[Submission] {
        &self.submissions
    }
}

/// One queue of each kind, shareable across the engine.
#[derive(Debug, Clone)]
pub struct QueueSet {
    graphics: Arc<Mutex<CommandQueue>>,
    compute: Arc<Mutex<CommandQueue>>,
    transfer: Arc<Mutex<CommandQueue>>,
}

impl QueueSet {
    /// Create a set with one unbounded queue per kind.
    pub fn new() -> Self {
        Self::from_queues(
            CommandQueue::new(QueueKind::Graphics),
            CommandQueue::new(QueueKind::Compute),
            CommandQueue::new(QueueKind::Transfer),
        )
    }

    /// Create a set from explicitly configured queues.
    pub fn from_queues(
        graphics: CommandQueue,
        compute: CommandQueue,
        transfer: CommandQueue,
    ) -> Self {
        Self {
            graphics: Arc::new(Mutex::new(graphics)),
            compute: Arc::new(Mutex::new(compute)),
            transfer: Arc::new(Mutex::new(transfer)),
        }
    }

    /// Get the queue of the given kind.
    pub fn get(&self, kind: QueueKind) -> Arc<Mutex<CommandQueue>> {
        match kind {
            QueueKind::Graphics => self.graphics.clone(),
            QueueKind::Compute => self.compute.clone(),
            QueueKind::Transfer => self.transfer.clone(),
        }
    }
}

impl Default for QueueSet {
    fn default() -> Self {
        Self::new()
    }
}
