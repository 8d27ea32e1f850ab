//! The render pipeline: an owned DAG of task nodes.

use std::fmt::Write;

use anyhow::Result;
use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableDiGraph;
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::core::error::Error;
use crate::graph::task::TaskNode;

/// Identifies a node in a [`Pipeline`]. Ids are assigned in insertion order
/// and never reused, which makes them the deterministic tie-breaker for
/// scheduling.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) NodeIndex);

/// A directed acyclic graph of graphics tasks. An edge `A -> B` means B must
/// start only after A has completed on the GPU. The graph is acyclic by
/// construction: an edge that would close a cycle is rejected when it is
/// added.
#[derive(Debug, Default)]
pub struct Pipeline {
    graph: StableDiGraph<TaskNode, ()>,
}

impl Pipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task node. Returns the id used to connect it to other nodes.
    pub fn add_task(&mut self, node: TaskNode) -> NodeId {
        NodeId(self.graph.add_node(node))
    }

    /// Add an ordering dependency: `to` must start only after `from` has
    /// completed on the GPU.
    /// # Errors
    /// * Fails with [`Error::NodeNotFound`] if either id is not in the pipeline.
    /// * Fails with [`Error::GraphHasCycle`] if the edge would close a cycle.
    pub fn add_dependency(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        if !self.graph.contains_node(from.0) || !self.graph.contains_node(to.0) {
            return Err(Error::NodeNotFound.into());
        }
        if from == to {
            return Err(Error::GraphHasCycle.into());
        }
        let edge = self.graph.update_edge(from.0, to.0, ());
        if petgraph::algo::is_cyclic_directed(&self.graph) {
            self.graph.remove_edge(edge);
            return Err(Error::GraphHasCycle.into());
        }
        Ok(())
    }

    /// Number of tasks in the pipeline.
    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    /// All node ids in ascending order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<_> = self.graph.node_indices().map(NodeId).collect();
        ids.sort();
        ids
    }

    /// Get a node by id.
    pub fn task(&self, id: NodeId) -> Option<&TaskNode> {
        self.graph.node_weight(id.0)
    }

    /// Get a node by id, mutably.
    pub fn task_mut(&mut self, id: NodeId) -> Option<&mut TaskNode> {
        self.graph.node_weight_mut(id.0)
    }

    /// All nodes in ascending id order, mutably.
    pub(crate) fn tasks_mut(&mut self) -> impl Iterator<Item = &mut TaskNode> {
        self.graph.node_weights_mut()
    }

    /// Direct predecessors of a node.
    pub fn predecessors(&self, id: NodeId) -> Vec<NodeId> {
        let mut nodes: Vec<_> = self
            .graph
            .edges_directed(id.0, Direction::Incoming)
            .map(|edge| NodeId(edge.source()))
            .collect();
        nodes.sort();
        nodes
    }

    /// Direct successors of a node.
    pub fn successors(&self, id: NodeId) -> Vec<NodeId> {
        let mut nodes: Vec<_> = self
            .graph
            .edges_directed(id.0, Direction::Outgoing)
            .map(|edge| NodeId(edge.target()))
            .collect();
        nodes.sort();
        nodes
    }

    /// Re-check the structural invariants of the whole graph. Edges are
    /// validated as they are added, so this only fails if the graph was
    /// corrupted.
    pub fn validate(&self) -> Result<()> {
        if petgraph::algo::is_cyclic_directed(&self.graph) {
            return Err(Error::GraphHasCycle.into());
        }
        Ok(())
    }
}

/// Trait that is implemented for the pipeline to help with debugging and
/// visualizing the graph.
pub trait GraphViz {
    /// Get the string representation of this graph in `dot` format.
    fn dot(&self) -> Result<String>;
}

impl GraphViz for Pipeline {
    fn dot(&self) -> Result<String> {
        let mut out = String::from("digraph {\n");
        for id in self.node_ids() {
            let node = self.task(id).ok_or(Error::NodeNotFound)?;
            writeln!(
                out,
                "    n{} [label=\"{}\" fillcolor = \"#5e6df7\"]",
                id.0.index(),
                node.name()
            )?;
        }
        for id in self.node_ids() {
            for successor in self.successors(id) {
                writeln!(out, "    n{} -> n{}", id.0.index(), successor.0.index())?;
            }
        }
        out.push_str("}\n");
        Ok(out)
    }
}
