//! Turns the pipeline DAG into a deterministic linear schedule.

use std::collections::{BTreeSet, HashMap};
use std::ops::Range;

use anyhow::Result;

use crate::core::error::Error;
use crate::graph::compat::CompatibilityMatrix;
use crate::graph::pipeline::{NodeId, Pipeline};
use crate::sync::queue::QueueKind;

/// A linear order over the pipeline's tasks, consistent with every DAG edge,
/// partitioned into *groups*: maximal runs of pairwise parallel-compatible
/// tasks on the same queue. Group borders are barrier boundaries; inside a
/// group, command lists are submitted back to back with a single barrier
/// batch in front.
#[derive(Debug, Clone)]
pub struct Schedule {
    order: Vec<NodeId>,
    groups: Vec<Range<usize>>,
}

impl Schedule {
    /// The scheduled task order.
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    /// The group boundaries, as ranges into [`Schedule::order`].
    pub fn groups(&self) -> &[Range<usize>] {
        &self.groups
    }

    /// Iterate the groups as slices of node ids.
    pub fn group_members(&self) -> impl Iterator<Item = &[NodeId]> {
        self.groups.iter().map(|range| &self.order[range.clone()])
    }

    /// Number of scheduled tasks.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True for the schedule of an empty pipeline.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Builds a [`Schedule`] from a pipeline and the frame's compatibility
/// matrix.
///
/// The algorithm is Kahn's topological ordering with a deterministic rule
/// over the ready set: among all ready nodes, prefer the lowest-id node that
/// is parallel-compatible with everything in the currently open group and
/// runs on the group's queue; if there is none, close the group and emit the
/// lowest-id ready node. Given the same DAG shape and node ids this produces
/// byte-identical schedules.
#[derive(Debug)]
pub struct ScheduleBuilder;

impl ScheduleBuilder {
    /// Build the schedule. The matrix must be indexed by position in
    /// [`Pipeline::node_ids`].
    pub fn build(pipeline: &Pipeline, compat: &CompatibilityMatrix) -> Result<Schedule> {
        let ids = pipeline.node_ids();
        let position: HashMap<NodeId, usize> =
            ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        let mut indegree: HashMap<NodeId, usize> = ids
            .iter()
            .map(|id| (*id, pipeline.predecessors(*id).len()))
            .collect();
        let mut ready: BTreeSet<NodeId> = ids
            .iter()
            .copied()
            .filter(|id| indegree[id] == 0)
            .collect();

        let mut order = Vec::with_capacity(ids.len());
        let mut groups = Vec::new();
        let mut group_start = 0;
        let mut group_queue: Option<QueueKind> = None;
        let mut group_positions: Vec<usize> = Vec::new();

        while let Some(&first) = ready.iter().next() {
            let picked = ready
                .iter()
                .copied()
                .find(|candidate| {
                    let candidate_pos = position[candidate];
                    let queue = pipeline.task(*candidate).map(|t| t.queue_kind());
                    group_queue == queue
                        && group_positions
                            .iter()
                            .all(|member| compat.compatible(*member, candidate_pos))
                })
                .unwrap_or(first);
            ready.remove(&picked);

            let picked_pos = position[&picked];
            let picked_queue = pipeline
                .task(picked)
                .map(|t| t.queue_kind())
                .unwrap_or(QueueKind::Graphics);

            let extends_group = group_queue == Some(picked_queue)
                && group_positions
                    .iter()
                    .all(|member| compat.compatible(*member, picked_pos));
            if !extends_group {
                if !order.is_empty() {
                    groups.push(group_start..order.len());
                }
                group_start = order.len();
                group_positions.clear();
            }
            group_queue = Some(picked_queue);
            group_positions.push(picked_pos);
            order.push(picked);

            for successor in pipeline.successors(picked) {
                let remaining = indegree.get_mut(&successor).unwrap();
                *remaining -= 1;
                if *remaining == 0 {
                    ready.insert(successor);
                }
            }
        }

        if order.len() != ids.len() {
            return Err(Error::GraphHasCycle.into());
        }
        if !order.is_empty() {
            groups.push(group_start..order.len());
        }

        debug!(
            "built schedule: {} tasks in {} groups",
            order.len(),
            groups.len()
        );
        Ok(Schedule {
            order,
            groups,
        })
    }
}
