//! Renders the failure screen when a frame aborts.

use anyhow::Result;

use crate::command::allocator::CommandAllocator;
use crate::graph::barrier::{advance_states, barriers_for_group};
use crate::graph::task::UsageRecord;
use crate::resource::handle::{ResourceHandle, Subresources};
use crate::resource::pool::{Pool, Poolable};
use crate::resource::state::ResourceState;
use crate::resource::state_table::ResourceStateTable;
use crate::sync::fence::Fence;
use crate::sync::queue::{QueueKind, QueueSet, Submission};

/// Record and submit a single minimal command list that clears the back
/// buffer to the failure color and leaves it ready for presentation. Always
/// leaves the fence signaled at `value`, even if the queue refuses the
/// submission, so the cross-frame fence chain stays intact and later frames
/// can recover.
pub(crate) fn render_failure_screen(
    queues: &QueueSet,
    allocators: &Pool<CommandAllocator>,
    table: &mut ResourceStateTable,
    back_buffer: &ResourceHandle,
    color: [f32; 4],
    fence: &Fence,
    value: u64,
) {
    let result = submit_failure_screen(queues, allocators, table, back_buffer, color, fence, value);
    if let Err(err) = result {
        error!("failed to render failure screen: {:#}", err);
        // The screen is lost, but the fence chain must survive.
        fence.signal(value);
    }
}

fn submit_failure_screen(
    queues: &QueueSet,
    allocators: &Pool<CommandAllocator>,
    table: &mut ResourceStateTable,
    back_buffer: &ResourceHandle,
    color: [f32; 4],
    fence: &Fence,
    value: u64,
) -> Result<()> {
    table.register(back_buffer, ResourceState::Common);

    let usage = [UsageRecord {
        resource: back_buffer.clone(),
        subresources: Subresources::All,
        first_state: ResourceState::RenderTarget,
        last_state: ResourceState::Present,
        multiple_use: true,
    }];
    let group = [&usage[..]];

    let mut allocator = CommandAllocator::new_in_pool(allocators, &QueueKind::Graphics)?;
    let mut list = allocator.create_list();

    let transitions = barriers_for_group(table, &group);
    if !transitions.is_empty() {
        list.record_barriers(transitions);
    }
    list.set_resource_state(back_buffer, Subresources::All, ResourceState::RenderTarget)?;
    list.clear_render_target(back_buffer, color);
    list.set_resource_state(back_buffer, Subresources::All, ResourceState::Present)?;
    list.finish()?;
    advance_states(table, &group);

    let queue = queues.get(QueueKind::Graphics);
    queue.lock().unwrap().submit(Submission {
        waits: Vec::new(),
        lists: vec![list],
        signal: Some((fence.clone(), value)),
    })?;
    // Return the allocator to its pool once the GPU is done with the list.
    fence.on_completed(value, move || drop(allocator));
    Ok(())
}
