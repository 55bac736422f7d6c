/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! [Trait definition](Topology) for topologies: user-provided types that decide which nodes exchange
//! data with which.
//!
//! A topology tells the framework and the [`Task`](crate::task::Task) two things:
//! 1. [Link kinds](Topology::link_kinds): which labels partition the neighbor relation of this
//!    topology.
//! 2. [Neighbors](Topology::neighbors): given a link kind and an epoch, which nodes are the configured
//!    node's neighbors over that link in that epoch.
//!
//! Topologies are pure functions of their configuration. The shapes provided here are all epoch
//! invariant, but the trait takes the epoch so that topologies that rewire themselves over time can be
//! plugged in without changing the framework.
//!
//! ## Consistency of hierarchical topologies
//!
//! Hierarchical topologies such as [`TreeTopology`] and [`StarTopology`] keep their `Parents` and
//! `Children` relations mutually consistent: if node A lists B among its children, then B lists A
//! among its parents. [`FullTopology`] trivially satisfies this, since every node is both a parent and
//! a child of every other node.

use crate::types::data_types::{Epoch, LinkKind, NodeCount, NodeID};

/// # Safety
///
/// [`Topology::neighbors`] must be deterministic and must never include the configured node itself.
/// It must be total: every valid link kind and epoch yields a (possibly empty) list of valid node IDs.
pub trait Topology: Send + Sync {
    /// Set the size of the computation and the ID of the node this topology answers for.
    ///
    /// Calling this more than once with the same arguments has no further effect. The framework calls
    /// this once before the first neighbor query.
    fn configure(&mut self, node_count: NodeCount, node_id: NodeID);

    /// Get the link kinds supported by this topology.
    fn link_kinds(&self) -> Vec<LinkKind>;

    /// Get the neighbors of the configured node over `link_kind` in `epoch`, in ascending order.
    fn neighbors(&self, link_kind: LinkKind, epoch: Epoch) -> Vec<NodeID>;
}

/// Topology in which every node is simultaneously a parent and a child of every other node.
///
/// This reflects an all-to-all exchange pattern: in a computation of `N` nodes, every node has exactly
/// `N - 1` parents and `N - 1` children, in every epoch.
#[derive(Default)]
pub struct FullTopology {
    others: Vec<NodeID>,
}

impl FullTopology {
    /// Create an unconfigured full topology. It has no neighbors until [`Topology::configure`] is
    /// called.
    pub fn new() -> FullTopology {
        Self::default()
    }
}

impl Topology for FullTopology {
    fn configure(&mut self, node_count: NodeCount, node_id: NodeID) {
        self.others = node_count
            .node_ids()
            .filter(|other| *other != node_id)
            .collect();
    }

    fn link_kinds(&self) -> Vec<LinkKind> {
        vec![LinkKind::Parents, LinkKind::Children]
    }

    fn neighbors(&self, _: LinkKind, _: Epoch) -> Vec<NodeID> {
        self.others.clone()
    }
}

/// Topology that arranges nodes in a complete tree with a fixed fanout, rooted at node 0.
///
/// Nodes are laid out in breadth-first order: node `i`'s parent is node `(i - 1) / fanout`, and its
/// children are nodes `fanout * i + 1` through `fanout * i + fanout`, bounded by the node count.
pub struct TreeTopology {
    fanout: u64,
    parents: Vec<NodeID>,
    children: Vec<NodeID>,
}

impl TreeTopology {
    /// Create a tree topology with the given `fanout`. A `fanout` of 0 is treated as 1.
    pub fn new(fanout: u64) -> TreeTopology {
        Self {
            fanout: fanout.max(1),
            parents: Vec::new(),
            children: Vec::new(),
        }
    }
}

impl Topology for TreeTopology {
    fn configure(&mut self, node_count: NodeCount, node_id: NodeID) {
        let id = node_id.int();

        self.parents = if id == 0 {
            Vec::new()
        } else {
            vec![NodeID::new((id - 1) / self.fanout)]
        };

        let first_child = self.fanout.saturating_mul(id).saturating_add(1);
        self.children = (first_child..first_child.saturating_add(self.fanout))
            .map(NodeID::new)
            .filter(|child| node_count.contains(*child))
            .collect();
    }

    fn link_kinds(&self) -> Vec<LinkKind> {
        vec![LinkKind::Parents, LinkKind::Children]
    }

    fn neighbors(&self, link_kind: LinkKind, _: Epoch) -> Vec<NodeID> {
        match link_kind {
            LinkKind::Parents => self.parents.clone(),
            LinkKind::Children => self.children.clone(),
        }
    }
}

/// Topology in which node 0 is the hub: the hub's children are all other nodes, and every other node
/// has the hub as its only parent.
#[derive(Default)]
pub struct StarTopology {
    parents: Vec<NodeID>,
    children: Vec<NodeID>,
}

impl StarTopology {
    pub fn new() -> StarTopology {
        Self::default()
    }
}

impl Topology for StarTopology {
    fn configure(&mut self, node_count: NodeCount, node_id: NodeID) {
        let hub = NodeID::new(0);
        if node_id == hub {
            self.parents = Vec::new();
            self.children = node_count.node_ids().filter(|id| *id != hub).collect();
        } else {
            self.parents = vec![hub];
            self.children = Vec::new();
        }
    }

    fn link_kinds(&self) -> Vec<LinkKind> {
        vec![LinkKind::Parents, LinkKind::Children]
    }

    fn neighbors(&self, link_kind: LinkKind, _: Epoch) -> Vec<NodeID> {
        match link_kind {
            LinkKind::Parents => self.parents.clone(),
            LinkKind::Children => self.children.clone(),
        }
    }
}
