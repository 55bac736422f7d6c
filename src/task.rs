/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! [Trait definition](Task) for tasks: the user-provided computations that taskgraph_rs drives through
//! a sequence of epochs.
//!
//! ## Callbacks and threads
//!
//! Every callback is invoked on the node's coordinator thread, one at a time. Callbacks should
//! therefore return quickly. A task that needs to block, for example on a
//! [data latch](crate::context::EpochContext::data_latch), should do so on a thread of its own, taking
//! a clone of the [`EpochContext`] with it.
//!
//! ## Epoch scoping
//!
//! Each epoch-scoped callback receives the [`EpochContext`] of the epoch it belongs to. Actions taken
//! through a context whose epoch has passed are ignored by the framework, so a task's background thread
//! that finishes late can never disturb the current epoch.
//!
//! ## Link direction
//!
//! Requests and meta are named from the point of view of the node that sends them. A data request sent
//! to a node's parents is served by each parent in [`Task::serve_as_parent`], and its response is
//! delivered to the requester through [`Task::parent_data_ready`]. Meta flagged to a node's parents is
//! delivered to each parent through [`Task::child_meta_ready`].

use crate::{
    context::{EpochContext, FrameworkHandle},
    types::data_types::{Epoch, NodeID},
};

pub use crate::data_pipeline::server::{DataResponder, PayloadError};

pub trait Task: Send + 'static {
    /// Called once, before the node enters its first epoch.
    fn init(&mut self, node_id: NodeID, framework: &FrameworkHandle);

    /// Called once, when the node stops, whether it was shut down or stopped by a fatal error.
    fn exit(&mut self);

    /// Called every time the node enters a new epoch. This is usually where a task issues the epoch's
    /// data requests.
    fn set_epoch(&mut self, ctx: &EpochContext, epoch: Epoch);

    /// Called when a parent flags meta to this node's link with it.
    fn parent_meta_ready(&mut self, ctx: &EpochContext, parent: NodeID, meta: &str);

    /// Called when a child flags meta to this node, and, on the aggregator, when any node announces
    /// completion of the epoch.
    fn child_meta_ready(&mut self, ctx: &EpochContext, child: NodeID, meta: &str);

    /// Called when a parent answers a data request this node made over its parent link.
    fn parent_data_ready(
        &mut self,
        ctx: &EpochContext,
        parent: NodeID,
        method: &str,
        response: &[u8],
    );

    /// Called when a child answers a data request this node made over its child link.
    fn child_data_ready(
        &mut self,
        ctx: &EpochContext,
        child: NodeID,
        method: &str,
        response: &[u8],
    );

    /// Called when a child requests data from this node. The request is answered through `responder`,
    /// possibly from another thread.
    fn serve_as_parent(
        &mut self,
        child: NodeID,
        method: &str,
        input: &[u8],
        responder: DataResponder,
    );

    /// Called when a parent requests data from this node.
    fn serve_as_child(
        &mut self,
        parent: NodeID,
        method: &str,
        input: &[u8],
        responder: DataResponder,
    );
}
