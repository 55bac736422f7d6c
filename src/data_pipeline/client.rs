/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Worker threads that make outbound calls on behalf of the coordinator.
//!
//! A worker makes exactly one attempt and reports its outcome back to the coordinator as a
//! [`CoordinatorEvent`]. Failed attempts are reported only after the retry backoff has elapsed, so the
//! coordinator can decide, with an up to date view of the current epoch, whether the call is still worth
//! making again.
//!
//! Failing to resolve an address is reported as a fatal error: the directory is the only source of
//! truth about where peers live, and a node that cannot consult it cannot make progress.

use std::{sync::mpsc::Sender, thread, time::Duration};

use crate::{
    coordinator::types::{CoordinatorEvent, FatalError},
    networking::{
        messages::{DataRequest, Notice},
        sending::SenderHandle,
        transport::{CallError, Directory, Transport},
    },
    types::data_types::{Epoch, LinkKind, NodeID, RequestID},
};

/// A data request that has been issued by the task and not yet answered.
#[derive(Clone, Debug)]
pub(crate) struct PendingRequest {
    pub(crate) id: RequestID,
    pub(crate) target: NodeID,
    pub(crate) request: DataRequest,
    pub(crate) attempt: u32,
}

impl PendingRequest {
    pub(crate) fn epoch(&self) -> Epoch {
        self.request.epoch
    }

    pub(crate) fn is_retry(&self) -> bool {
        self.attempt > 0
    }
}

/// A payload returned by a peer for a [`PendingRequest`].
pub(crate) struct ReceivedResponse {
    pub(crate) id: RequestID,
    pub(crate) origin: NodeID,
    pub(crate) epoch: Epoch,
    pub(crate) link_kind: LinkKind,
    pub(crate) method: String,
    pub(crate) payload: Vec<u8>,
}

/// A notice addressed to a single peer.
#[derive(Clone, Debug)]
pub(crate) struct OutboundNotice {
    pub(crate) target: NodeID,
    pub(crate) notice: Notice,
    pub(crate) attempt: u32,
}

/// Spawn a worker thread that makes one attempt at `pending`.
pub(crate) fn start_request<T: Transport, D: Directory>(
    mut pending: PendingRequest,
    mut sender: SenderHandle<T, D>,
    retry_backoff: Duration,
    coordinator: Sender<CoordinatorEvent>,
) {
    thread::spawn(move || {
        let addr = match sender.resolve(pending.target) {
            Ok(addr) => addr,
            Err(error) => {
                let _ = coordinator.send(CoordinatorEvent::Fatal(
                    FatalError::AddressResolution {
                        node: pending.target,
                        error,
                    },
                ));
                return;
            }
        };

        log::info!(
            "{} data from node {}, addr {}, epoch {}, method {:?}, attempt {}",
            if pending.is_retry() { "retry request" } else { "request" },
            pending.target,
            addr,
            pending.epoch(),
            pending.request.method,
            pending.attempt
        );

        match sender.call(&addr, pending.request.clone()) {
            Ok(payload) => {
                let _ = coordinator.send(CoordinatorEvent::Response(ReceivedResponse {
                    id: pending.id,
                    origin: pending.target,
                    epoch: pending.request.epoch,
                    link_kind: pending.request.link_kind,
                    method: pending.request.method,
                    payload,
                }));
            }
            Err(CallError::EpochMismatch) => {
                let _ = coordinator.send(CoordinatorEvent::RequestAbandoned(pending));
            }
            Err(error) => {
                log::warn!(
                    "request data from node {}, addr {}, epoch {}, attempt {} failed: {}",
                    pending.target,
                    addr,
                    pending.epoch(),
                    pending.attempt,
                    error
                );
                thread::sleep(retry_backoff);
                pending.attempt += 1;
                let _ = coordinator.send(CoordinatorEvent::RetryRequest(pending));
            }
        }
    });
}

/// Spawn a worker thread that makes one attempt at delivering `outbound`.
pub(crate) fn start_post<T: Transport, D: Directory>(
    mut outbound: OutboundNotice,
    mut sender: SenderHandle<T, D>,
    retry_backoff: Duration,
    coordinator: Sender<CoordinatorEvent>,
) {
    thread::spawn(move || {
        let addr = match sender.resolve(outbound.target) {
            Ok(addr) => addr,
            Err(error) => {
                let _ = coordinator.send(CoordinatorEvent::Fatal(
                    FatalError::AddressResolution {
                        node: outbound.target,
                        error,
                    },
                ));
                return;
            }
        };

        match sender.post(&addr, outbound.notice.clone()) {
            Ok(()) => (),
            Err(CallError::EpochMismatch) => {
                log::debug!(
                    "node {} rejected notice for epoch {}: epoch mismatch",
                    outbound.target,
                    outbound.notice.epoch()
                );
            }
            Err(error) => {
                log::warn!(
                    "post notice to node {}, addr {}, epoch {}, attempt {} failed: {}",
                    outbound.target,
                    addr,
                    outbound.notice.epoch(),
                    outbound.attempt,
                    error
                );
                thread::sleep(retry_backoff);
                outbound.attempt += 1;
                let _ = coordinator.send(CoordinatorEvent::RetryNotice(outbound));
            }
        }
    });
}
