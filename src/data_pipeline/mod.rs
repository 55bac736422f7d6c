/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Subprotocol through which a node's [`Task`](crate::task::Task) fetches opaque payloads from its
//! neighbors' tasks, scoped to the current epoch.
//!
//! ## Requesting side
//!
//! Every outbound request is made from its own worker thread, so that a slow or unreachable peer never
//! blocks the coordinator. A request whose call fails transiently is made again after a backoff of
//! `heartbeat_interval * retry_backoff_factor`, for as long as the request's epoch is still current.
//! A request whose target answers with an epoch mismatch is dropped. The client side is explained
//! [here](client).
//!
//! ## Serving side
//!
//! Inbound requests for the current epoch are handed to the task together with a
//! [`DataResponder`](server::DataResponder). A serve races against the end of its epoch: whichever of
//! "the task answered" and "the epoch passed" happens first decides whether the requester receives the
//! payload or an epoch mismatch. The server side is explained [here](server).

pub(crate) mod client;

pub mod server;
