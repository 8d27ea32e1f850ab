//! Computes the minimum transition barriers between schedule groups.
//!
//! For every usage of every task in a group, the current table state of each
//! affected subresource is compared against the usage's entry state; only
//! mismatches produce a transition, so a barrier with equal source and
//! destination states is never emitted. The whole group shares one batch,
//! recorded immediately before the group's command lists. After the lists
//! are appended to the submission stream the table advances to each usage's
//! exit state, in schedule order.

use std::collections::HashSet;

use crate::command::list::Transition;
use crate::graph::task::UsageRecord;
use crate::resource::handle::ResourceId;
use crate::resource::state_table::ResourceStateTable;

/// Compute the barrier batch that must precede a schedule group, given the
/// current state table. Resources the table has never seen adopt their entry
/// state without a barrier; a warning is logged since there is nothing to
/// verify the declaration against.
///
/// When several tasks in the group use the same subresource they necessarily
/// agree on its entry state (that is what made them groupable), so the first
/// usage wins and the rest emit nothing.
pub fn barriers_for_group(
    table: &mut ResourceStateTable,
    group: &[&[UsageRecord]],
) -> Vec<Transition> {
    let mut handled: HashSet<(ResourceId, u32)> = HashSet::new();
    let mut transitions = Vec::new();
    for usages in group {
        for usage in *usages {
            for index in usage.resource.subresource_indices(usage.subresources) {
                if !handled.insert((usage.resource.id(), index)) {
                    continue;
                }
                let current = table.current_or_adopt(&usage.resource, index, usage.first_state);
                if current != usage.first_state {
                    transitions.push(Transition {
                        resource: usage.resource.clone(),
                        subresource: index,
                        from: current,
                        to: usage.first_state,
                    });
                }
            }
        }
    }
    if !transitions.is_empty() {
        trace!("barrier batch with {} transitions", transitions.len());
    }
    transitions
}

/// Advance the table to the exit states of a group, in schedule order.
pub fn advance_states(table: &mut ResourceStateTable, group: &[&[UsageRecord]]) {
    for usages in group {
        for usage in *usages {
            table.advance(&usage.resource, usage.subresources, usage.last_state);
        }
    }
}
