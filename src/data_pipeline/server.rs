/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Serving inbound data requests.
//!
//! When the coordinator accepts a data request for the current epoch, it calls [`start_serve`], which:
//! 1. Creates a [`DataResponder`] for the task to answer through.
//! 2. Subscribes the serve to the epoch's [`EpochPassedSignal`].
//! 3. Spawns a waiter thread that waits for whichever of the two outcomes happens first.
//!
//! If the task answers first, the payload goes back to the coordinator, which checks once more that the
//! epoch is still current before replying to the requester. If the epoch passes first, the serve is
//! abandoned and the requester receives an epoch mismatch, no matter what the task does afterwards.
//!
//! A task that fails to produce a payload (for example because it cannot encode it) stops the node:
//! the requester could only ever receive a mismatch or a timeout, and no later attempt could succeed.

use std::{
    fmt::{self, Display, Formatter},
    sync::{
        mpsc::{self, Sender},
        Arc, Mutex, MutexGuard,
    },
    thread,
};

use crate::{
    codec::CodecError,
    coordinator::types::{CoordinatorEvent, FatalError},
    networking::receiving::{InboundRequest, ServeError},
};

/// Handle through which a [`Task`](crate::task::Task) answers one inbound data request.
///
/// A responder can be moved to another thread, so that the task can produce its payload without
/// holding up the node. Dropping a responder without answering leaves the request unanswered until its
/// epoch passes.
pub struct DataResponder {
    outcome: Sender<ServeOutcome>,
}

impl DataResponder {
    /// Answer the request with `payload`.
    pub fn respond(self, payload: Vec<u8>) {
        let _ = self.outcome.send(ServeOutcome::Payload(Ok(payload)));
    }

    /// Report that no payload can be produced for the request. This stops the node.
    pub fn fail(self, error: PayloadError) {
        let _ = self.outcome.send(ServeOutcome::Payload(Err(error)));
    }

    /// Answer the request with the result of encoding a payload.
    pub fn respond_with(self, result: Result<Vec<u8>, CodecError>) {
        match result {
            Ok(payload) => self.respond(payload),
            Err(error) => self.fail(PayloadError::Encoding(error)),
        }
    }
}

/// The ways in which a task can fail to produce a payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PayloadError {
    /// The payload could not be encoded.
    Encoding(CodecError),

    /// The task does not serve the requested method.
    UnknownMethod(String),
}

impl From<CodecError> for PayloadError {
    fn from(value: CodecError) -> Self {
        PayloadError::Encoding(value)
    }
}

impl Display for PayloadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            PayloadError::Encoding(error) => Display::fmt(error, f),
            PayloadError::UnknownMethod(method) => write!(f, "unknown method {:?}", method),
        }
    }
}

pub(crate) enum ServeOutcome {
    Payload(Result<Vec<u8>, PayloadError>),
    EpochPassed,
}

/// Fire-once broadcast that tells every serve of an epoch that the epoch has passed.
///
/// Serves that subscribe after the signal has fired are told immediately.
#[derive(Clone)]
pub(crate) struct EpochPassedSignal {
    subscribers: Arc<Mutex<Option<Vec<Sender<ServeOutcome>>>>>,
}

impl EpochPassedSignal {
    pub(crate) fn new() -> EpochPassedSignal {
        Self {
            subscribers: Arc::new(Mutex::new(Some(Vec::new()))),
        }
    }

    pub(crate) fn subscribe(&self, subscriber: Sender<ServeOutcome>) {
        match self.lock().as_mut() {
            Some(subscribers) => subscribers.push(subscriber),
            None => {
                let _ = subscriber.send(ServeOutcome::EpochPassed);
            }
        }
    }

    pub(crate) fn fire(&self) {
        if let Some(subscribers) = self.lock().take() {
            for subscriber in subscribers {
                let _ = subscriber.send(ServeOutcome::EpochPassed);
            }
        }
    }

    pub(crate) fn has_fired(&self) -> bool {
        self.lock().is_none()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Vec<Sender<ServeOutcome>>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A serve whose task answered before its epoch passed.
pub(crate) struct FinishedServe {
    pub(crate) inbound: InboundRequest,
    pub(crate) payload: Vec<u8>,
}

/// Start serving `inbound`, returning the responder to hand to the task.
pub(crate) fn start_serve(
    inbound: InboundRequest,
    epoch_passed: &EpochPassedSignal,
    coordinator: Sender<CoordinatorEvent>,
) -> DataResponder {
    let (to_waiter, outcome) = mpsc::channel();
    epoch_passed.subscribe(to_waiter.clone());

    thread::spawn(move || match outcome.recv() {
        Ok(ServeOutcome::Payload(Ok(payload))) => {
            let _ = coordinator.send(CoordinatorEvent::ServeFinished(FinishedServe {
                inbound,
                payload,
            }));
        }
        Ok(ServeOutcome::Payload(Err(error))) => {
            let fatal = FatalError::PayloadProduction {
                requester: inbound.request.requester,
                method: inbound.request.method.clone(),
                error,
            };
            inbound.answer(Err(ServeError::ServerClosed));
            let _ = coordinator.send(CoordinatorEvent::Fatal(fatal));
        }
        Ok(ServeOutcome::EpochPassed) => {
            let _ = coordinator.send(CoordinatorEvent::ServeAbandoned(inbound));
        }
        Err(_) => inbound.answer(Err(ServeError::ServerClosed)),
    });

    DataResponder { outcome: to_waiter }
}
