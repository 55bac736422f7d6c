/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! An epoch-synchronized, bulk-synchronous-parallel coordination engine for iterative distributed
//! computations.
//!
//! A computation is carried out by a fixed set of [nodes](node), each running one user-provided
//! [`Task`](task::Task). Nodes proceed in lockstep through numbered epochs. In every epoch, each node's
//! task fetches opaque payloads from the neighbors its [`Topology`](topology::Topology) names, computes
//! once enough of them have arrived, and announces completion. A designated aggregator node advances
//! every node to the next epoch once all of them have announced.
//!
//! Library users provide the remote-call mechanism between nodes and the directory of node addresses
//! by implementing the traits in [`networking::transport`].
//!
//! [`bwmf`] contains a reference task for block-wise matrix factorization.

pub mod bwmf;

pub mod codec;

pub mod context;

pub mod coordinator;

pub mod data_pipeline;

pub(crate) mod event_bus;

pub mod events;

pub mod latch;

pub mod logging;

pub mod networking;

pub mod node;

pub mod status;

pub mod task;

pub mod topology;

pub mod types;
