/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Trait definitions for the transport and the service directory, and the errors they report.

use std::{
    fmt::{self, Display, Formatter},
    time::Duration,
};

use crate::types::data_types::NodeID;

use super::{
    messages::{DataRequest, Notice},
    receiving::ServeError,
};

/// Network address of a node, as understood by the [`Transport`] in use.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A remote-call mechanism between nodes.
///
/// Both methods are called from short-lived worker threads, never from the coordinator thread, so they
/// are free to block for up to `timeout`.
pub trait Transport: Clone + Send + 'static {
    /// Invoke the data endpoint of the node at `addr` with `request`, and return the payload it answers
    /// with.
    ///
    /// Implementations should map a [`ServeError`] reported by the remote [`NodeServer`] into a
    /// [`CallError`] using [`CallError::from`], so that epoch mismatches are recognized by the caller.
    ///
    /// [`NodeServer`]: super::receiving::NodeServer
    fn call(
        &mut self,
        addr: &Address,
        request: DataRequest,
        timeout: Duration,
    ) -> Result<Vec<u8>, CallError>;

    /// Deliver a one-way `notice` to the node at `addr`, returning once the remote node has accepted it.
    fn post(&mut self, addr: &Address, notice: Notice, timeout: Duration) -> Result<(), CallError>;
}

/// The authoritative mapping from node IDs to network addresses.
///
/// The directory is read-only from taskgraph_rs' point of view, and is assumed to be always available.
/// A failure to resolve an address is therefore fatal for the resolving node.
pub trait Directory: Clone + Send + 'static {
    fn resolve_address(
        &self,
        computation_name: &str,
        node: NodeID,
    ) -> Result<Address, DirectoryError>;
}

/// The different ways a remote call can fail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallError {
    /// Could not connect to the remote node. The node may be slow to start or briefly restarting.
    Dial(String),

    /// Connected, but the remote invocation failed.
    Invoke(String),

    /// No answer arrived before the call timeout.
    Timeout,

    /// The remote node has already moved past the epoch the call was made for.
    EpochMismatch,
}

impl CallError {
    /// Check whether a call that failed with this error should be made again after a backoff.
    ///
    /// Every failure except an epoch mismatch is considered transient.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, CallError::EpochMismatch)
    }
}

impl From<ServeError> for CallError {
    fn from(value: ServeError) -> Self {
        match value {
            ServeError::EpochMismatch => CallError::EpochMismatch,
            ServeError::TimedOut => CallError::Timeout,
            ServeError::Overloaded => CallError::Invoke(String::from("server overloaded")),
            ServeError::ServerClosed => CallError::Invoke(String::from("server closed")),
        }
    }
}

impl Display for CallError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CallError::Dial(reason) => write!(f, "dial failed: {}", reason),
            CallError::Invoke(reason) => write!(f, "invoke failed: {}", reason),
            CallError::Timeout => f.write_str("call timed out"),
            CallError::EpochMismatch => f.write_str("server epoch mismatch"),
        }
    }
}

/// The different ways resolving an address through the [`Directory`] can fail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DirectoryError {
    /// The directory has no record of the node.
    NotFound { node: NodeID },

    /// The directory could not be queried.
    Unavailable(String),
}

impl Display for DirectoryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DirectoryError::NotFound { node } => write!(f, "no address recorded for node {}", node),
            DirectoryError::Unavailable(reason) => write!(f, "directory unavailable: {}", reason),
        }
    }
}
