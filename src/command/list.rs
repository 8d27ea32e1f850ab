//! Command list recording.
//!
//! A [`CommandList`] is the unit of GPU work submission. Tasks record into
//! exactly one list during their execute phase. The list shadows resource
//! states it has touched: the *first* [`CommandList::set_resource_state`] call
//! per (resource, subresource) emits nothing and only declares the state the
//! scheduler must establish before the list runs; every later call on the
//! same subresource records a real transition barrier inside the list.

use std::collections::HashMap;

use anyhow::Result;

use crate::core::error::Error;
use crate::resource::handle::{ResourceHandle, ResourceId, Subresources};
use crate::resource::state::ResourceState;

/// A single resource state transition, recorded as part of a barrier batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// The resource being transitioned.
    pub resource: ResourceHandle,
    /// The affected subresource index.
    pub subresource: u32,
    /// State the subresource is currently in.
    pub from: ResourceState,
    /// State the subresource will be in after the barrier.
    pub to: ResourceState,
}

/// A recorded GPU command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Draw call.
    Draw {
        /// Number of vertices per instance.
        vertex_count: u32,
        /// Number of instances.
        instance_count: u32,
    },
    /// Compute dispatch.
    Dispatch {
        /// Thread group counts per dimension.
        groups: [u32; 3],
    },
    /// Full-resource copy.
    CopyResource {
        /// Identity of the source resource.
        src: ResourceId,
        /// Identity of the destination resource.
        dst: ResourceId,
    },
    /// Clear a render target to a constant color.
    ClearRenderTarget {
        /// Identity of the cleared resource.
        target: ResourceId,
        /// RGBA clear color.
        color: [f32; 4],
    },
    /// A batch of transition barriers, executed as one GPU barrier command.
    Barriers(Vec<Transition>),
}

/// A sequence of GPU commands recorded against one command allocator.
/// Closed with [`CommandList::finish`]; queues reject lists that were never
/// closed.
#[derive(Debug)]
pub struct CommandList {
    allocator: u64,
    commands: Vec<Command>,
    tracked: HashMap<(ResourceId, u32), ResourceState>,
    closed: bool,
}

impl CommandList {
    pub(crate) fn new(allocator: u64) -> Self {
        Self {
            allocator,
            commands: Vec::new(),
            tracked: HashMap::new(),
            closed: false,
        }
    }

    /// Declare that the selected subresources must be in `state` from this
    /// point in the list onward. The first call per subresource emits no
    /// barrier; it tells the scheduler which state to establish before the
    /// list runs. Subsequent calls record transition barriers in the list.
    /// # Errors
    /// * Fails if the list is closed.
    /// * Fails if a specific subresource index is out of range.
    pub fn set_resource_state(
        &mut self,
        resource: &ResourceHandle,
        subresources: Subresources,
        state: ResourceState,
    ) -> Result<()> {
        if self.closed {
            return Err(Error::CommandListClosed.into());
        }
        if let Subresources::Index(index) = subresources {
            if index >= resource.subresource_count() {
                return Err(Error::SubresourceOutOfRange {
                    resource: resource.name().to_owned(),
                    index,
                    count: resource.subresource_count(),
                }
                .into());
            }
        }

        let mut batch = Vec::new();
        for index in resource.subresource_indices(subresources) {
            match self.tracked.get_mut(&(resource.id(), index)) {
                None => {
                    self.tracked.insert((resource.id(), index), state);
                }
                Some(current) if *current != state => {
                    batch.push(Transition {
                        resource: resource.clone(),
                        subresource: index,
                        from: *current,
                        to: state,
                    });
                    *current = state;
                }
                Some(_) => {}
            }
        }
        if !batch.is_empty() {
            self.commands.push(Command::Barriers(batch));
        }
        Ok(())
    }

    /// Record a draw call.
    pub fn draw(&mut self, vertex_count: u32, instance_count: u32) {
        debug_assert!(!self.closed);
        self.commands.push(Command::Draw {
            vertex_count,
            instance_count,
        });
    }

    /// Record a compute dispatch.
    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        debug_assert!(!self.closed);
        self.commands.push(Command::Dispatch {
            groups: [x, y, z],
        });
    }

    /// Record a full-resource copy.
    pub fn copy_resource(&mut self, src: &ResourceHandle, dst: &ResourceHandle) {
        debug_assert!(!self.closed);
        self.commands.push(Command::CopyResource {
            src: src.id(),
            dst: dst.id(),
        });
    }

    /// Record a render target clear.
    pub fn clear_render_target(&mut self, target: &ResourceHandle, color: [f32; 4]) {
        debug_assert!(!self.closed);
        self.commands.push(Command::ClearRenderTarget {
            target: target.id(),
            color,
        });
    }

    /// Record an externally computed barrier batch. Used by the scheduler to
    /// emit the cross-task barriers that precede a schedule group.
    pub(crate) fn record_barriers(&mut self, batch: Vec<Transition>) {
        debug_assert!(!self.closed);
        debug_assert!(!batch.is_empty());
        self.commands.push(Command::Barriers(batch));
    }

    /// Close the list. A closed list records no further commands and is ready
    /// for submission.
    /// # Errors
    /// * Fails if the list is already closed.
    pub fn finish(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::CommandListClosed.into());
        }
        self.closed = true;
        Ok(())
    }

    /// Whether [`CommandList::finish`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// The recorded command stream.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Identity of the allocator this list was recorded against.
    pub fn allocator_id(&self) -> u64 {
        self.allocator
    }

    /// True if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
