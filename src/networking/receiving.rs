/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The inbound surface of a node.
//!
//! A [`Transport`](super::transport::Transport) implementation receives calls addressed to a node and
//! hands them to that node's [`NodeServer`]. Each call is answered through a [`ReplyHandle`], which the
//! transport waits on before answering the remote caller.

use std::{
    fmt::{self, Display, Formatter},
    sync::mpsc::{self, Receiver, RecvTimeoutError, Sender},
    time::Duration,
};

use borsh::{BorshDeserialize, BorshSerialize};

use crate::coordinator::types::CoordinatorEvent;

use super::messages::{DataRequest, Notice};

/// Cloneable handle that delivers inbound calls to a running node's coordinator.
///
/// Handles stay valid after the node shuts down: calls made through them are then answered with
/// [`ServeError::ServerClosed`].
#[derive(Clone)]
pub struct NodeServer {
    coordinator: Sender<CoordinatorEvent>,
}

impl NodeServer {
    pub(crate) fn new(coordinator: Sender<CoordinatorEvent>) -> NodeServer {
        Self { coordinator }
    }

    /// Ask this node's [`Task`](crate::task::Task) to serve `request`.
    ///
    /// The returned handle resolves to the payload once the task has answered, or to
    /// [`ServeError::EpochMismatch`] if the request's epoch has passed, or passes before the task
    /// answers.
    pub fn get_task_data(&self, request: DataRequest) -> ReplyHandle<Vec<u8>> {
        let (reply, handle) = ReplyHandle::channel();
        let inbound = InboundRequest { request, reply };
        if let Err(mpsc::SendError(CoordinatorEvent::InboundRequest(inbound))) =
            self.coordinator.send(CoordinatorEvent::InboundRequest(inbound))
        {
            inbound.answer(Err(ServeError::ServerClosed));
        }
        handle
    }

    /// Deliver a one-way `notice` to this node.
    ///
    /// The returned handle resolves once the node has processed the notice, or has accepted it for
    /// processing in a future epoch.
    pub fn deliver(&self, notice: Notice) -> ReplyHandle<()> {
        let (reply, handle) = ReplyHandle::channel();
        let inbound = InboundNotice { notice, reply };
        if let Err(mpsc::SendError(CoordinatorEvent::InboundNotice(inbound))) =
            self.coordinator.send(CoordinatorEvent::InboundNotice(inbound))
        {
            inbound.answer(Err(ServeError::ServerClosed));
        }
        handle
    }
}

/// The receiving end of the answer to one inbound call.
pub struct ReplyHandle<T> {
    receiver: Receiver<Result<T, ServeError>>,
}

impl<T> ReplyHandle<T> {
    fn channel() -> (Sender<Result<T, ServeError>>, ReplyHandle<T>) {
        let (sender, receiver) = mpsc::channel();
        (sender, ReplyHandle { receiver })
    }

    /// Block until the call is answered.
    pub fn wait(self) -> Result<T, ServeError> {
        self.receiver
            .recv()
            .unwrap_or(Err(ServeError::ServerClosed))
    }

    /// Block until the call is answered, or `timeout` elapses.
    pub fn wait_timeout(self, timeout: Duration) -> Result<T, ServeError> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(ServeError::TimedOut),
            Err(RecvTimeoutError::Disconnected) => Err(ServeError::ServerClosed),
        }
    }
}

/// The ways in which a node can refuse or fail to answer an inbound call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum ServeError {
    /// The call was made for an epoch that is not (or is no longer) the node's current epoch.
    EpochMismatch,

    /// The call was made for a future epoch, and the node has no room left to hold it until then.
    Overloaded,

    /// The node has shut down.
    ServerClosed,

    /// The caller stopped waiting before the call was answered.
    TimedOut,
}

impl Display for ServeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ServeError::EpochMismatch => f.write_str("epoch mismatch"),
            ServeError::Overloaded => f.write_str("future-epoch buffer full"),
            ServeError::ServerClosed => f.write_str("server closed"),
            ServeError::TimedOut => f.write_str("timed out waiting for reply"),
        }
    }
}

/// An inbound data request waiting to be answered.
pub(crate) struct InboundRequest {
    pub(crate) request: DataRequest,
    reply: Sender<Result<Vec<u8>, ServeError>>,
}

impl InboundRequest {
    /// Send the answer to the caller. The caller may have given up already, in which case the answer is
    /// dropped.
    pub(crate) fn answer(self, result: Result<Vec<u8>, ServeError>) {
        let _ = self.reply.send(result);
    }
}

/// An inbound notice waiting to be acknowledged.
pub(crate) struct InboundNotice {
    pub(crate) notice: Notice,
    reply: Sender<Result<(), ServeError>>,
}

impl InboundNotice {
    pub(crate) fn answer(self, result: Result<(), ServeError>) {
        let _ = self.reply.send(result);
    }
}
