/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Events processed by the coordinator thread, and the errors that stop it.

use std::fmt::{self, Display, Formatter};

use crate::{
    data_pipeline::{
        client::{OutboundNotice, PendingRequest, ReceivedResponse},
        server::{FinishedServe, PayloadError},
    },
    networking::{
        receiving::{InboundNotice, InboundRequest},
        transport::DirectoryError,
    },
    types::data_types::{Epoch, LinkKind, NodeID},
};

/// Everything the coordinator thread reacts to.
///
/// Events come from three kinds of sources:
/// 1. The task, through an [`EpochContext`](crate::context::EpochContext).
/// 2. Worker threads of the [data pipeline](crate::data_pipeline).
/// 3. The node's [`NodeServer`](crate::networking::receiving::NodeServer).
pub(crate) enum CoordinatorEvent {
    // Issued by the task.
    NewRequest {
        epoch: Epoch,
        target: NodeID,
        link_kind: LinkKind,
        method: String,
        input: Vec<u8>,
    },
    FlagMeta {
        epoch: Epoch,
        link_kind: LinkKind,
        meta: String,
    },
    AnnounceCompletion {
        epoch: Epoch,
        meta: String,
    },
    IncEpoch {
        epoch: Epoch,
    },

    // Reported by outbound workers.
    Response(ReceivedResponse),
    RetryRequest(PendingRequest),
    RequestAbandoned(PendingRequest),
    RetryNotice(OutboundNotice),

    // Inbound calls and their serves.
    InboundRequest(InboundRequest),
    InboundNotice(InboundNotice),
    ServeFinished(FinishedServe),
    ServeAbandoned(InboundRequest),

    Fatal(FatalError),
}

/// Errors that stop a node.
///
/// Once a node stops with a fatal error, the error can be read from the node's
/// [`NodeStatus`](crate::status::NodeStatus).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FatalError {
    /// The directory could not resolve the address of a peer.
    AddressResolution { node: NodeID, error: DirectoryError },

    /// The task could not produce a payload for a request it was asked to serve.
    PayloadProduction {
        requester: NodeID,
        method: String,
        error: PayloadError,
    },
}

impl Display for FatalError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            FatalError::AddressResolution { node, error } => {
                write!(f, "failed to resolve address of node {}: {}", node, error)
            }
            FatalError::PayloadProduction {
                requester,
                method,
                error,
            } => write!(
                f,
                "failed to produce payload of {:?} for node {}: {}",
                method, requester, error
            ),
        }
    }
}
