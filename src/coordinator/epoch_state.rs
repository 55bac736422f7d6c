/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! State that belongs to exactly one epoch, shared between the coordinator and the task's contexts.
//!
//! A fresh [`EpochShared`] is created every time a node enters an epoch. Contexts handed out for an
//! earlier epoch keep pointing at that epoch's state, so nothing they do can touch the current epoch.

use std::{
    collections::BTreeSet,
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{
    data_pipeline::server::EpochPassedSignal,
    latch::CountdownLatch,
    types::data_types::{Epoch, NodeCount, NodeID},
};

pub(crate) struct EpochShared {
    epoch: Epoch,
    completions: CompletionSet,
    data: Mutex<DataReadiness>,
    passed: EpochPassedSignal,
}

impl EpochShared {
    pub(crate) fn new(epoch: Epoch, node_count: NodeCount) -> EpochShared {
        Self {
            epoch,
            completions: CompletionSet::new(node_count),
            data: Mutex::new(DataReadiness {
                delivered: 0,
                latch: None,
            }),
            passed: EpochPassedSignal::new(),
        }
    }

    pub(crate) fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub(crate) fn completions(&self) -> &CompletionSet {
        &self.completions
    }

    pub(crate) fn passed(&self) -> &EpochPassedSignal {
        &self.passed
    }

    /// Install a fresh data latch expecting `expected` count downs.
    ///
    /// Data that was delivered to the task before the latch was installed is counted against it, so
    /// the latch releases correctly regardless of when in the epoch it was obtained.
    pub(crate) fn install_data_latch(&self, expected: u64) -> Arc<CountdownLatch> {
        let latch = Arc::new(CountdownLatch::new(expected));
        let mut data = self.lock_data();
        for _ in 0..data.delivered.min(expected) {
            latch.count_down();
        }
        data.latch = Some(Arc::clone(&latch));
        latch
    }

    /// Record that one data-ready callback has returned. Returns whether this released the data latch.
    pub(crate) fn record_data_delivered(&self) -> bool {
        let mut data = self.lock_data();
        data.delivered += 1;
        match &data.latch {
            Some(latch) => latch.count_down(),
            None => false,
        }
    }

    fn lock_data(&self) -> MutexGuard<'_, DataReadiness> {
        self.data
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct DataReadiness {
    delivered: u64,
    latch: Option<Arc<CountdownLatch>>,
}

/// The set of nodes that have announced completion of an epoch to the aggregator.
///
/// Each node is counted at most once, however many times its announcement is delivered.
pub(crate) struct CompletionSet {
    announced: Mutex<BTreeSet<NodeID>>,
    latch: CountdownLatch,
}

impl CompletionSet {
    fn new(node_count: NodeCount) -> CompletionSet {
        Self {
            announced: Mutex::new(BTreeSet::new()),
            latch: CountdownLatch::new(node_count.int()),
        }
    }

    /// Record the announcement of `node`. Returns whether this was the node's first announcement.
    pub(crate) fn record(&self, node: NodeID) -> bool {
        let newly_announced = self
            .announced
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(node);
        if newly_announced {
            self.latch.count_down();
        }
        newly_announced
    }

    pub(crate) fn announced_count(&self) -> u64 {
        self.latch.expected() - self.latch.remaining()
    }

    pub(crate) fn all_announced(&self) -> bool {
        self.latch.is_released()
    }
}
