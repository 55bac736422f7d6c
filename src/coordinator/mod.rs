/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The per-node coordinator: the single thread that owns a node's [`Task`](crate::task::Task) and its
//! view of the current epoch.
//!
//! ## Epochs
//!
//! All nodes of a computation start in the same initial epoch. Within an epoch, each node's task
//! fetches data from its neighbors, computes, and announces completion to the aggregator. The aggregator
//! collects announcements in a completion set, and once every node (itself included) has announced,
//! its task may ask to advance. Advancing:
//! 1. Fires the ending epoch's epoch-passed signal, abandoning every serve still in flight.
//! 2. Replaces all per-epoch state (completion set, data latch, outstanding requests).
//! 3. Tells every other node to enter the next epoch.
//! 4. Enters the next epoch locally.
//!
//! The aggregator is the only node that decides when an epoch ends. Every other node moves on only
//! when told to by the aggregator.
//!
//! ## Event processing
//!
//! The coordinator processes [events](types::CoordinatorEvent) one at a time, and every task callback
//! is made from its thread. Results that arrive for an epoch other than the current one are dropped
//! when they are dequeued, so nothing computed for a past epoch ever reaches the task.

pub(crate) mod buffer;

pub(crate) mod epoch_state;

pub(crate) mod protocol;

pub mod types;
