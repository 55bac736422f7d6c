/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Handles through which a [`Task`](crate::task::Task) talks to the framework.
//!
//! [`FrameworkHandle`] answers questions that do not depend on the epoch: who this node is, how large
//! the computation is, and who its neighbors are. [`EpochContext`] adds everything that is scoped to a
//! single epoch: data requests, meta, completion announcements, data latches, and advancing the epoch.

use std::sync::{mpsc::Sender, Arc};

use crate::{
    coordinator::{epoch_state::EpochShared, types::CoordinatorEvent},
    latch::CountdownLatch,
    status::NodeStatus,
    topology::Topology,
    types::data_types::{Epoch, LinkKind, NodeCount, NodeID},
};

/// Epoch-independent view of the framework, handed to the task in [`Task::init`].
///
/// [`Task::init`]: crate::task::Task::init
#[derive(Clone)]
pub struct FrameworkHandle {
    node_id: NodeID,
    node_count: NodeCount,
    aggregator: NodeID,
    topology: Arc<dyn Topology>,
    status: NodeStatus,
}

impl FrameworkHandle {
    pub(crate) fn new(
        node_id: NodeID,
        node_count: NodeCount,
        aggregator: NodeID,
        topology: Arc<dyn Topology>,
        status: NodeStatus,
    ) -> FrameworkHandle {
        Self {
            node_id,
            node_count,
            aggregator,
            topology,
            status,
        }
    }

    pub fn node_id(&self) -> NodeID {
        self.node_id
    }

    pub fn node_count(&self) -> NodeCount {
        self.node_count
    }

    /// Get the ID of the node that collects completion announcements and advances the epoch.
    pub fn aggregator(&self) -> NodeID {
        self.aggregator
    }

    pub fn is_aggregator(&self) -> bool {
        self.node_id == self.aggregator
    }

    pub fn link_kinds(&self) -> Vec<LinkKind> {
        self.topology.link_kinds()
    }

    /// Get this node's neighbors over `link_kind` in `epoch`.
    pub fn neighbors(&self, link_kind: LinkKind, epoch: Epoch) -> Vec<NodeID> {
        self.topology.neighbors(link_kind, epoch)
    }

    /// Get the epoch this node is currently in.
    pub fn current_epoch(&self) -> Epoch {
        self.status.epoch()
    }
}

/// Capability handle for acting within one epoch.
///
/// Contexts are cheap to clone and can be moved to other threads. Every action taken through a context
/// is tagged with the context's epoch. Once that epoch has passed, actions are ignored and
/// [`is_current`](Self::is_current) returns `false`.
#[derive(Clone)]
pub struct EpochContext {
    framework: FrameworkHandle,
    shared: Arc<EpochShared>,
    coordinator: Sender<CoordinatorEvent>,
}

impl EpochContext {
    pub(crate) fn new(
        framework: FrameworkHandle,
        shared: Arc<EpochShared>,
        coordinator: Sender<CoordinatorEvent>,
    ) -> EpochContext {
        Self {
            framework,
            shared,
            coordinator,
        }
    }

    pub fn node_id(&self) -> NodeID {
        self.framework.node_id
    }

    /// Get the epoch this context belongs to.
    pub fn epoch(&self) -> Epoch {
        self.shared.epoch()
    }

    pub fn node_count(&self) -> NodeCount {
        self.framework.node_count
    }

    pub fn framework(&self) -> &FrameworkHandle {
        &self.framework
    }

    /// Get this node's neighbors over `link_kind` in this context's epoch.
    pub fn neighbors(&self, link_kind: LinkKind) -> Vec<NodeID> {
        self.framework.neighbors(link_kind, self.epoch())
    }

    /// Check whether this context's epoch is still the node's current epoch.
    pub fn is_current(&self) -> bool {
        !self.shared.passed().has_fired()
    }

    /// Request data from node `to`, which this node reaches over `link_kind`.
    ///
    /// The response is delivered to the task through [`parent_data_ready`] or [`child_data_ready`],
    /// at most once, and only if it arrives within this context's epoch. Transient failures are retried
    /// until then.
    ///
    /// [`parent_data_ready`]: crate::task::Task::parent_data_ready
    /// [`child_data_ready`]: crate::task::Task::child_data_ready
    pub fn data_request(&self, to: NodeID, link_kind: LinkKind, method: &str, input: Vec<u8>) {
        self.send(CoordinatorEvent::NewRequest {
            epoch: self.epoch(),
            target: to,
            link_kind,
            method: method.to_string(),
            input,
        })
    }

    /// Send `meta` to every parent of this node in this context's epoch.
    pub fn flag_meta_to_parents(&self, meta: &str) {
        self.send(CoordinatorEvent::FlagMeta {
            epoch: self.epoch(),
            link_kind: LinkKind::Parents,
            meta: meta.to_string(),
        })
    }

    /// Send `meta` to every child of this node in this context's epoch.
    pub fn flag_meta_to_children(&self, meta: &str) {
        self.send(CoordinatorEvent::FlagMeta {
            epoch: self.epoch(),
            link_kind: LinkKind::Children,
            meta: meta.to_string(),
        })
    }

    /// Tell the aggregator that this node has finished its work for this context's epoch.
    pub fn announce_completion(&self, meta: &str) {
        self.send(CoordinatorEvent::AnnounceCompletion {
            epoch: self.epoch(),
            meta: meta.to_string(),
        })
    }

    /// Get a fresh latch that releases once `expected` data-ready callbacks of this epoch have returned.
    ///
    /// Callbacks that returned before the latch was obtained are counted against it. Obtaining a new
    /// latch replaces the previous one of the same epoch.
    pub fn data_latch(&self, expected: u64) -> Arc<CountdownLatch> {
        self.shared.install_data_latch(expected)
    }

    /// Get the number of distinct nodes that have announced completion of this epoch.
    ///
    /// Announcements are collected by the aggregator only. On every other node, this is always 0.
    pub fn announced_count(&self) -> u64 {
        self.shared.completions().announced_count()
    }

    /// Check whether every node, the aggregator included, has announced completion of this epoch.
    pub fn all_announced(&self) -> bool {
        self.shared.completions().all_announced()
    }

    /// Ask the framework to advance to the next epoch.
    ///
    /// The request is honored once per epoch, only on the aggregator, and only after every node has
    /// announced completion. Otherwise it is ignored.
    pub fn inc_epoch(&self) {
        self.send(CoordinatorEvent::IncEpoch {
            epoch: self.epoch(),
        })
    }

    fn send(&self, event: CoordinatorEvent) {
        if !self.is_current() {
            log::debug!(
                "node {} ignored action from context of passed epoch {}",
                self.node_id(),
                self.epoch()
            );
            return;
        }
        let _ = self.coordinator.send(event);
    }
}
