/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A read-only view of a running node's progress.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex,
};

use crate::{coordinator::types::FatalError, types::data_types::Epoch};

/// Where a node is within its current epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EpochPhase {
    /// No epoch has started yet, or the node has stopped.
    Idle,

    /// The task is issuing data requests for the epoch.
    Requesting,

    /// The task is waiting on a data latch.
    AwaitingQuorum,

    /// The data latch has released and the task is computing.
    Computing,

    /// The node has announced completion and is waiting for the next epoch.
    Announcing,
}

/// Cloneable view of a node's current epoch, phase, and liveness.
#[derive(Clone)]
pub struct NodeStatus {
    inner: Arc<StatusInner>,
}

struct StatusInner {
    epoch: AtomicU64,
    phase: Mutex<EpochPhase>,
    running: AtomicBool,
    fatal_error: Mutex<Option<FatalError>>,
}

impl NodeStatus {
    pub(crate) fn new(initial_epoch: Epoch) -> NodeStatus {
        Self {
            inner: Arc::new(StatusInner {
                epoch: AtomicU64::new(initial_epoch.int()),
                phase: Mutex::new(EpochPhase::Idle),
                running: AtomicBool::new(true),
                fatal_error: Mutex::new(None),
            }),
        }
    }

    /// Get the epoch the node is currently in.
    pub fn epoch(&self) -> Epoch {
        Epoch::new(self.inner.epoch.load(Ordering::SeqCst))
    }

    pub fn phase(&self) -> EpochPhase {
        *self
            .inner
            .phase
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Check whether the node's coordinator is still running.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Get the error that stopped the node, if it stopped because of one.
    pub fn fatal_error(&self) -> Option<FatalError> {
        self.inner
            .fatal_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub(crate) fn set_epoch(&self, epoch: Epoch) {
        self.inner.epoch.store(epoch.int(), Ordering::SeqCst)
    }

    pub(crate) fn set_phase(&self, phase: EpochPhase) {
        *self
            .inner
            .phase
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = phase
    }

    pub(crate) fn stop(&self, fatal_error: Option<FatalError>) {
        if let Some(error) = fatal_error {
            *self
                .inner
                .fatal_error
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(error);
        }
        self.set_phase(EpochPhase::Idle);
        self.inner.running.store(false, Ordering::SeqCst)
    }
}
