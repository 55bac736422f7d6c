/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Pluggable remote calls between nodes.
//!
//! taskgraph_rs does not implement a transport. Library users provide one by implementing
//! [`Transport`](transport::Transport), and provide the service directory that maps node IDs to
//! addresses by implementing [`Directory`](transport::Directory). On the receiving side, the transport
//! hands every inbound call to the target node's [`NodeServer`](receiving::NodeServer).

pub mod transport;

pub mod messages;

pub mod receiving;

pub(crate) mod sending;
