/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A counting barrier that releases its waiters once a required number of completion signals have
//! arrived.
//!
//! Latches are not reset. The framework constructs a fresh latch at the start of every epoch, so that a
//! waiter from a previous epoch can never be woken by a signal meant for the current one.

use std::{
    sync::{Condvar, Mutex, MutexGuard},
    time::{Duration, Instant},
};

/// A reusable-by-construction countdown latch.
///
/// The latch is created with an expected count. Each call to [`count_down`](Self::count_down) decrements
/// the remaining count by one until it reaches zero; further calls are ignored. [`wait`](Self::wait)
/// blocks the calling thread until the count reaches zero, and returns immediately once it has.
///
/// Any number of threads may count down and wait concurrently. Callers that need a bound on waiting,
/// for example a watchdog that declares a peer unresponsive, use [`wait_timeout`](Self::wait_timeout).
pub struct CountdownLatch {
    expected: u64,
    remaining: Mutex<u64>,
    released: Condvar,
}

impl CountdownLatch {
    /// Create a latch that releases after `expected` count downs. A latch created with an expected count
    /// of zero is released from the start.
    pub fn new(expected: u64) -> CountdownLatch {
        Self {
            expected,
            remaining: Mutex::new(expected),
            released: Condvar::new(),
        }
    }

    /// Decrement the remaining count by one.
    ///
    /// Returns `true` if and only if this call brought the count to zero and released the waiters. Calls
    /// made after the latch was released leave it unchanged and return `false`.
    pub fn count_down(&self) -> bool {
        let mut remaining = self.lock();
        match *remaining {
            0 => false,
            1 => {
                *remaining = 0;
                self.released.notify_all();
                true
            }
            _ => {
                *remaining -= 1;
                false
            }
        }
    }

    /// Block until the remaining count reaches zero.
    pub fn wait(&self) {
        let mut remaining = self.lock();
        while *remaining > 0 {
            remaining = self
                .released
                .wait(remaining)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Block until the remaining count reaches zero, or `timeout` elapses.
    ///
    /// Returns whether the latch was released.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut remaining = self.lock();
        while *remaining > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            remaining = match self.released.wait_timeout(remaining, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }

    /// Get the number of count downs this latch was created to expect.
    pub fn expected(&self) -> u64 {
        self.expected
    }

    /// Get the number of count downs still required to release this latch.
    pub fn remaining(&self) -> u64 {
        *self.lock()
    }

    /// Check whether this latch has been released.
    pub fn is_released(&self) -> bool {
        self.remaining() == 0
    }

    // The count is a plain integer, so a panic while the lock was held cannot leave it half-updated.
    fn lock(&self) -> MutexGuard<'_, u64> {
        self.remaining
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
