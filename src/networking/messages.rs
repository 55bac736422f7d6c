/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Messages exchanged between nodes.
//!
//! Two kinds of calls travel between nodes:
//! 1. [`DataRequest`]s, which expect a payload in return, and
//! 2. [`Notice`]s, which are one-way and only expect an acknowledgement.
//!
//! Every message carries the epoch it was made in. Receivers use this epoch to decide whether to
//! process the message immediately, buffer it for a future epoch, or reject it as stale.
//!
//! Transports that need a single wire type can send both kinds wrapped in a [`Message`], which
//! serializes with [borsh](borsh).

use borsh::{BorshDeserialize, BorshSerialize};

use crate::{
    codec::{self, CodecError},
    types::data_types::{Epoch, LinkKind, NodeID},
};

/// A single wire type for all calls between nodes.
#[derive(Clone, Debug, PartialEq, BorshSerialize, BorshDeserialize)]
pub enum Message {
    DataRequest(DataRequest),
    Notice(Notice),
}

impl Message {
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        codec::encode(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Message, CodecError> {
        codec::decode(bytes)
    }

    pub fn epoch(&self) -> Epoch {
        match self {
            Message::DataRequest(request) => request.epoch,
            Message::Notice(notice) => notice.epoch(),
        }
    }
}

impl From<DataRequest> for Message {
    fn from(value: DataRequest) -> Self {
        Message::DataRequest(value)
    }
}

impl From<Notice> for Message {
    fn from(value: Notice) -> Self {
        Message::Notice(value)
    }
}

/// A request for an opaque payload from another node's [`Task`](crate::task::Task).
///
/// `link_kind` is the link over which the *requester* reaches the target. A request sent over
/// [`LinkKind::Parents`] is served by the target as a parent, and vice versa.
#[derive(Clone, Debug, PartialEq, BorshSerialize, BorshDeserialize)]
pub struct DataRequest {
    pub requester: NodeID,
    pub epoch: Epoch,
    pub link_kind: LinkKind,
    pub method: String,
    pub input: Vec<u8>,
}

/// A one-way message between nodes.
#[derive(Clone, Debug, PartialEq, BorshSerialize, BorshDeserialize)]
pub enum Notice {
    Meta(MetaNotice),
    Completion(CompletionNotice),
    EpochAdvance(EpochAdvanceNotice),
}

impl Notice {
    pub fn origin(&self) -> NodeID {
        match self {
            Notice::Meta(notice) => notice.origin,
            Notice::Completion(notice) => notice.origin,
            Notice::EpochAdvance(notice) => notice.origin,
        }
    }

    pub fn epoch(&self) -> Epoch {
        match self {
            Notice::Meta(notice) => notice.epoch,
            Notice::Completion(notice) => notice.epoch,
            Notice::EpochAdvance(notice) => notice.epoch,
        }
    }
}

/// A short metadata string flagged by `origin` to its neighbors over `link_kind`.
///
/// As with [`DataRequest`], `link_kind` is named from the origin's point of view: meta flagged to
/// parents is received as meta from a child.
#[derive(Clone, Debug, PartialEq, BorshSerialize, BorshDeserialize)]
pub struct MetaNotice {
    pub origin: NodeID,
    pub epoch: Epoch,
    pub link_kind: LinkKind,
    pub meta: String,
}

/// Sent by every node to the aggregator once it has finished its work for `epoch`.
#[derive(Clone, Debug, PartialEq, BorshSerialize, BorshDeserialize)]
pub struct CompletionNotice {
    pub origin: NodeID,
    pub epoch: Epoch,
    pub meta: String,
}

/// Sent by the aggregator to every other node once it has entered `epoch`.
#[derive(Clone, Debug, PartialEq, BorshSerialize, BorshDeserialize)]
pub struct EpochAdvanceNotice {
    pub origin: NodeID,
    pub epoch: Epoch,
}

impl From<MetaNotice> for Notice {
    fn from(value: MetaNotice) -> Self {
        Notice::Meta(value)
    }
}

impl From<CompletionNotice> for Notice {
    fn from(value: CompletionNotice) -> Self {
        Notice::Completion(value)
    }
}

impl From<EpochAdvanceNotice> for Notice {
    fn from(value: EpochAdvanceNotice) -> Self {
        Notice::EpochAdvance(value)
    }
}
