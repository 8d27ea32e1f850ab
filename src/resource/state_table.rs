//! CPU-side shadow of per-subresource resource states.
//!
//! The table tracks the state the GPU *will* observe once all
//! currently-enqueued command lists have executed, i.e. it advances with CPU
//! recording rather than with GPU execution. This is deliberate: as long as
//! barriers are emitted in submission order, a table that races ahead of the
//! GPU is exactly the information barrier injection needs. The table must
//! never be "corrected" against actual GPU progress.

use std::collections::HashMap;

use crate::resource::handle::{ResourceHandle, ResourceId, Subresources};
use crate::resource::state::ResourceState;

#[derive(Debug, Clone)]
struct TrackedResource {
    // Holding the handle keeps the identity alive while the resource is tracked.
    handle: ResourceHandle,
    states: Vec<ResourceState>,
}

/// Tracks the current state of every subresource of every resource the
/// pipeline has touched. Exclusive to the orchestrating thread; mutation
/// happens only while a frame's submission stream is assembled.
#[derive(Debug, Default)]
pub struct ResourceStateTable {
    resources: HashMap<ResourceId, TrackedResource>,
}

/// A point-in-time copy of a [`ResourceStateTable`], used to roll the table
/// back when a frame aborts.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    resources: HashMap<ResourceId, TrackedResource>,
}

impl ResourceStateTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `handle` with every subresource in `initial` state.
    /// Does nothing if the resource is already tracked.
    pub fn register(&mut self, handle: &ResourceHandle, initial: ResourceState) {
        self.resources
            .entry(handle.id())
            .or_insert_with(|| TrackedResource {
                handle: handle.clone(),
                states: vec![initial; handle.subresource_count() as usize],
            });
    }

    /// Get the tracked state of a single subresource, or `None` if the
    /// resource has never been seen.
    pub fn current(&self, handle: &ResourceHandle, subresource: u32) -> Option<ResourceState> {
        self.resources
            .get(&handle.id())
            .and_then(|tracked| tracked.states.get(subresource as usize))
            .copied()
    }

    /// Get the tracked state of a subresource, adopting `assumed` as the
    /// current state if the resource has never been seen. Adopting means no
    /// barrier will be emitted for the first use; a warning is surfaced since
    /// the declared state cannot be verified against anything.
    pub fn current_or_adopt(
        &mut self,
        handle: &ResourceHandle,
        subresource: u32,
        assumed: ResourceState,
    ) -> ResourceState {
        if !self.resources.contains_key(&handle.id()) {
            warn!(
                "resource `{}` has no known state, adopting {} without a barrier",
                handle, assumed
            );
            self.register(handle, assumed);
        }
        self.current(handle, subresource).unwrap_or(assumed)
    }

    /// Advance the tracked state of the selected subresources. Registers the
    /// resource if it was unknown.
    pub fn advance(
        &mut self,
        handle: &ResourceHandle,
        subresources: Subresources,
        state: ResourceState,
    ) {
        let tracked = self
            .resources
            .entry(handle.id())
            .or_insert_with(|| TrackedResource {
                handle: handle.clone(),
                states: vec![state; handle.subresource_count() as usize],
            });
        for index in handle.subresource_indices(subresources) {
            if let Some(entry) = tracked.states.get_mut(index as usize) {
                *entry = state;
            }
        }
    }

    /// Take a copy of the whole table so it can be restored if the frame
    /// aborts.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            resources: self.resources.clone(),
        }
    }

    /// Roll the table back to an earlier snapshot, discarding every state
    /// change recorded since.
    pub fn restore(&mut self, snapshot: StateSnapshot) {
        self.resources = snapshot.resources;
    }

    /// Drop all tracked resources and their handles.
    pub fn clear(&mut self) {
        self.resources.clear();
    }

    /// The number of resources currently tracked.
    pub fn tracked_count(&self) -> usize {
        self.resources.len()
    }
}
