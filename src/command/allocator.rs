//! Command allocators back the memory command lists are recorded into.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::command::list::CommandList;
use crate::resource::pool::Poolable;
use crate::sync::queue::QueueKind;

static NEXT_ALLOCATOR_ID: AtomicU64 = AtomicU64::new(1);

/// Backs the recording memory of command lists. One allocator is owned by one
/// worker for the duration of a single record phase and may not be reset
/// until the GPU has finished executing every list recorded against it, which
/// the scheduler guarantees by returning allocators to their pool through a
/// fence cleanup.
#[derive(Debug)]
pub struct CommandAllocator {
    id: u64,
    kind: QueueKind,
    lists_allocated: u64,
}

impl CommandAllocator {
    /// Create a fresh allocator for lists targeting `kind` queues.
    pub fn new(kind: QueueKind) -> Self {
        Self {
            id: NEXT_ALLOCATOR_ID.fetch_add(1, Ordering::Relaxed),
            kind,
            lists_allocated: 0,
        }
    }

    /// Begin recording a new command list against this allocator.
    pub fn create_list(&mut self) -> CommandList {
        self.lists_allocated += 1;
        CommandList::new(self.id)
    }

    /// Reclaim all recording memory. Only legal once every list recorded
    /// against this allocator has finished executing on the GPU.
    pub fn reset(&mut self) {
        self.lists_allocated = 0;
    }

    /// Stable identity of this allocator.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The queue kind this allocator records for.
    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    /// Number of lists created since the last reset.
    pub fn lists_allocated(&self) -> u64 {
        self.lists_allocated
    }
}

impl Poolable for CommandAllocator {
    type Key = QueueKind;

    fn on_release(&mut self) {
        self.reset();
    }
}
