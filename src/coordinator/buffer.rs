/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Bounded buffer for inbound calls made for epochs the node has not entered yet.
//!
//! Nodes enter an epoch at slightly different times: a fast node may ask a slow one for the next
//! epoch's data, or flag meta for it, before the slow node has heard of the epoch advance. Rather than
//! making the fast node retry, the slow node holds such calls and replays them once it enters their
//! epoch.
//!
//! ## Buffer management
//!
//! The buffer holds at most `capacity` calls. If it is full when a call arrives, and the call's epoch is
//! lower than the highest epoch in the buffer, the most recently buffered call of the highest epoch is
//! evicted to make space for it. Otherwise the new call itself is turned away. Either way, the call
//! that does not fit is answered with [`ServeError::Overloaded`] by the caller of
//! [`insert`](FutureEpochBuffer::insert), which the remote node treats as a transient failure.
//!
//! ## Expiry
//!
//! A remote caller waits at most one call timeout for its answer, and then retries. A call held for
//! longer than that has no one waiting for it, and replaying it would hand the task a request that
//! its retry hands over again. Such calls are removed by
//! [`remove_timed_out`](FutureEpochBuffer::remove_timed_out) before every insertion and replay.

use std::{
    collections::{BTreeMap, VecDeque},
    mem,
    time::{Duration, Instant},
};

use crate::{
    networking::receiving::{InboundNotice, InboundRequest, ServeError},
    types::data_types::{BufferCapacity, Epoch},
};

/// An inbound call held for a future epoch.
pub(crate) enum BufferedCall {
    Request(InboundRequest),
    Notice(InboundNotice),
}

impl BufferedCall {
    pub(crate) fn epoch(&self) -> Epoch {
        match self {
            BufferedCall::Request(inbound) => inbound.request.epoch,
            BufferedCall::Notice(inbound) => inbound.notice.epoch(),
        }
    }

    /// Answer the caller with `error`.
    pub(crate) fn reject(self, error: ServeError) {
        match self {
            BufferedCall::Request(inbound) => inbound.answer(Err(error)),
            BufferedCall::Notice(inbound) => inbound.answer(Err(error)),
        }
    }
}

pub(crate) struct FutureEpochBuffer {
    capacity: BufferCapacity,
    call_timeout: Duration,
    buffer: BTreeMap<Epoch, VecDeque<(Instant, BufferedCall)>>,
    len: usize,
}

impl FutureEpochBuffer {
    pub(crate) fn new(capacity: BufferCapacity, call_timeout: Duration) -> FutureEpochBuffer {
        Self {
            capacity,
            call_timeout,
            buffer: BTreeMap::new(),
            len: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Try inserting `call` into the buffer.
    ///
    /// Returns the call that did not fit, if any: either an evicted call of the highest buffered epoch,
    /// or `call` itself.
    pub(crate) fn insert(&mut self, call: BufferedCall) -> Option<BufferedCall> {
        let mut evicted = None;

        if self.len >= self.capacity.int() {
            match self.buffer.keys().next_back().copied() {
                Some(highest_epoch) if call.epoch() < highest_epoch => {
                    evicted = self.evict_from(highest_epoch);
                }
                _ => return Some(call),
            }
        }

        self.buffer
            .entry(call.epoch())
            .or_insert_with(VecDeque::new)
            .push_back((Instant::now(), call));
        self.len += 1;

        evicted
    }

    /// Remove every call for epochs up to and including `epoch`.
    ///
    /// Returns the calls for epochs lower than `epoch`, which can no longer be served, and the calls for
    /// `epoch` itself, in the order they were buffered.
    pub(crate) fn take_up_to(
        &mut self,
        epoch: Epoch,
    ) -> (Vec<BufferedCall>, VecDeque<BufferedCall>) {
        let later = self.buffer.split_off(&epoch.next());
        let mut taken = mem::replace(&mut self.buffer, later);

        let current: VecDeque<BufferedCall> = taken
            .remove(&epoch)
            .unwrap_or_default()
            .into_iter()
            .map(|(_, call)| call)
            .collect();
        let expired: Vec<BufferedCall> = taken
            .into_values()
            .flatten()
            .map(|(_, call)| call)
            .collect();

        self.len -= current.len() + expired.len();
        (expired, current)
    }

    /// Remove every call that has been held for longer than the call timeout, in any epoch.
    pub(crate) fn remove_timed_out(&mut self) -> Vec<BufferedCall> {
        let (now, call_timeout) = (Instant::now(), self.call_timeout);
        let mut timed_out = Vec::new();
        for queue in self.buffer.values_mut() {
            let (kept, removed): (VecDeque<_>, VecDeque<_>) = mem::take(queue)
                .into_iter()
                .partition(|(arrived, _)| now.duration_since(*arrived) <= call_timeout);
            *queue = kept;
            timed_out.extend(removed.into_iter().map(|(_, call)| call));
        }
        self.buffer.retain(|_, queue| !queue.is_empty());
        self.len -= timed_out.len();
        timed_out
    }

    /// Remove every call from the buffer.
    pub(crate) fn drain(&mut self) -> Vec<BufferedCall> {
        self.len = 0;
        mem::take(&mut self.buffer)
            .into_values()
            .flatten()
            .map(|(_, call)| call)
            .collect()
    }

    fn evict_from(&mut self, epoch: Epoch) -> Option<BufferedCall> {
        let queue = self.buffer.get_mut(&epoch)?;
        let evicted = queue.pop_back().map(|(_, call)| call);
        if queue.is_empty() {
            self.buffer.remove(&epoch);
        }
        if evicted.is_some() {
            self.len -= 1;
        }
        evicted
    }
}
