/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of the events a node emits as it works through epochs.
//!
//! An event for a given action indicates that the action has been completed. Every event is published
//! by the node's coordinator thread, and is handled on the event bus thread by the handlers registered
//! through [`NodeSpec`](crate::node::NodeSpec), and by the [default loggers](crate::logging) if
//! [`log_events`](crate::node::Configuration::log_events) is set.

use std::{sync::mpsc::Sender, time::SystemTime};

use crate::{
    coordinator::types::FatalError,
    types::data_types::{Epoch, LinkKind, NodeID},
};

pub enum Event {
    // Epoch lifecycle events.
    StartEpoch(StartEpochEvent),
    AnnounceCompletion(AnnounceCompletionEvent),
    ReceiveCompletion(ReceiveCompletionEvent),
    AdvanceEpoch(AdvanceEpochEvent),
    // Requesting side of the data pipeline.
    SendDataRequest(SendDataRequestEvent),
    ReceiveDataResponse(ReceiveDataResponseEvent),
    DiscardDataResponse(DiscardDataResponseEvent),
    AbandonDataRequest(AbandonDataRequestEvent),
    // Serving side of the data pipeline.
    ReceiveDataRequest(ReceiveDataRequestEvent),
    SendDataResponse(SendDataResponseEvent),
    AbandonServe(AbandonServeEvent),
    // Meta.
    ReceiveMeta(ReceiveMetaEvent),
    // Stopping.
    Fatal(FatalEvent),
}

impl Event {
    pub(crate) fn publish(self, event_publisher: &Option<Sender<Event>>) {
        if let Some(event_publisher) = event_publisher {
            let _ = event_publisher.send(self);
        }
    }
}

/// The node entered `epoch` and called [`set_epoch`](crate::task::Task::set_epoch).
pub struct StartEpochEvent {
    pub timestamp: SystemTime,
    pub epoch: Epoch,
}

/// The node announced completion of `epoch` to `aggregator`.
pub struct AnnounceCompletionEvent {
    pub timestamp: SystemTime,
    pub epoch: Epoch,
    pub aggregator: NodeID,
}

/// The aggregator recorded the first completion announcement of `origin` for `epoch`. `announced` is
/// the number of distinct nodes that have announced so far, this one included.
pub struct ReceiveCompletionEvent {
    pub timestamp: SystemTime,
    pub origin: NodeID,
    pub epoch: Epoch,
    pub announced: u64,
}

/// The node left epoch `from` and is about to enter epoch `to`.
pub struct AdvanceEpochEvent {
    pub timestamp: SystemTime,
    pub from: Epoch,
    pub to: Epoch,
}

/// The node made an attempt at a data request. `attempt` is 0 for the first attempt.
pub struct SendDataRequestEvent {
    pub timestamp: SystemTime,
    pub target: NodeID,
    pub epoch: Epoch,
    pub link_kind: LinkKind,
    pub method: String,
    pub attempt: u32,
}

/// A response to a data request was delivered to the task.
pub struct ReceiveDataResponseEvent {
    pub timestamp: SystemTime,
    pub origin: NodeID,
    pub epoch: Epoch,
    pub link_kind: LinkKind,
    pub method: String,
    pub payload: Vec<u8>,
}

/// Why a response was not delivered to the task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiscardReason {
    /// The response arrived after its epoch had passed.
    Stale,

    /// A response for the same request had already been delivered.
    Duplicate,
}

/// A response to a data request arrived, but was not delivered to the task.
pub struct DiscardDataResponseEvent {
    pub timestamp: SystemTime,
    pub origin: NodeID,
    pub epoch: Epoch,
    pub reason: DiscardReason,
}

/// A data request was given up on, either because its epoch passed, or because its target had moved
/// on to another epoch.
pub struct AbandonDataRequestEvent {
    pub timestamp: SystemTime,
    pub target: NodeID,
    pub epoch: Epoch,
    pub method: String,
}

/// An inbound data request was handed to the task.
pub struct ReceiveDataRequestEvent {
    pub timestamp: SystemTime,
    pub requester: NodeID,
    pub epoch: Epoch,
    pub link_kind: LinkKind,
    pub method: String,
}

/// The task's payload was sent back to a requester.
pub struct SendDataResponseEvent {
    pub timestamp: SystemTime,
    pub requester: NodeID,
    pub epoch: Epoch,
    pub method: String,
    pub payload: Vec<u8>,
}

/// A serve was abandoned because its epoch passed before the task answered.
pub struct AbandonServeEvent {
    pub timestamp: SystemTime,
    pub requester: NodeID,
    pub epoch: Epoch,
    pub method: String,
}

/// Meta flagged by a neighbor was delivered to the task. `link_kind` is the link over which the
/// neighbor flagged it.
pub struct ReceiveMetaEvent {
    pub timestamp: SystemTime,
    pub origin: NodeID,
    pub epoch: Epoch,
    pub link_kind: LinkKind,
    pub meta: String,
}

/// The node stopped because of `error`.
pub struct FatalEvent {
    pub timestamp: SystemTime,
    pub epoch: Epoch,
    pub error: FatalError,
}
