// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Event primitive for blocking `receive` and `call` with timeout.
//!
//! # Architecture
//! - Atomic "pending" flag: a notify issued before the waiter sleeps is never lost
//! - Condvar for the sleeping path, signalled only when someone is asleep
//! - Sticky "closed" flag wakes every waiter at shutdown
//!
//! Each subscriber and each outstanding RPC call owns one notifier, so waits are
//! effectively single-consumer.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Absolute deadline `timeout` from now, saturating far in the future.
pub fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .or_else(|| now.checked_add(Duration::from_secs(86_400 * 365)))
        .unwrap_or(now)
}

/// Why a wait returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Notified,
    TimedOut,
    Closed,
}

#[derive(Debug, Default)]
pub struct Notifier {
    pending: AtomicBool,
    closed: AtomicBool,
    /// Number of threads currently parked on `condvar`.
    sleepers: Mutex<u32>,
    condvar: Condvar,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal one pending event. Lock-free unless a waiter is asleep.
    pub fn notify(&self) {
        self.pending.store(true, Ordering::Release);
        if *self.sleepers.lock() > 0 {
            self.condvar.notify_all();
        }
    }

    /// Wake all waiters permanently. Subsequent waits return [`Wake::Closed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let _guard = self.sleepers.lock();
        self.condvar.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Consume a pending notification without blocking.
    pub fn check_and_clear(&self) -> bool {
        self.pending.swap(false, Ordering::Acquire)
    }

    /// Block until notified, closed, or `deadline` passes.
    ///
    /// A pending notification is consumed before `Closed` is reported, so a
    /// final event raced with shutdown is still observed.
    pub fn wait_until(&self, deadline: Instant) -> Wake {
        if self.check_and_clear() {
            return Wake::Notified;
        }
        if self.is_closed() {
            return Wake::Closed;
        }

        let mut sleepers = self.sleepers.lock();
        loop {
            // Re-check under the lock: notify() sets the flag before locking.
            if self.check_and_clear() {
                return Wake::Notified;
            }
            if self.is_closed() {
                return Wake::Closed;
            }

            *sleepers += 1;
            let result = self.condvar.wait_until(&mut sleepers, deadline);
            *sleepers -= 1;

            if result.timed_out() {
                return if self.check_and_clear() {
                    Wake::Notified
                } else if self.is_closed() {
                    Wake::Closed
                } else {
                    Wake::TimedOut
                };
            }
            // Spurious or real wake: loop re-checks both flags.
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_notify_before_wait_is_not_lost() {
        let n = Notifier::new();
        n.notify();
        let deadline = Instant::now() + Duration::from_millis(1);
        assert_eq!(n.wait_until(deadline), Wake::Notified);
        // Consumed
        assert!(!n.check_and_clear());
    }

    #[test]
    fn test_wait_times_out() {
        let n = Notifier::new();
        let start = Instant::now();
        let wake = n.wait_until(start + Duration::from_millis(20));
        assert_eq!(wake, Wake::TimedOut);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_cross_thread_wake() {
        let n = Arc::new(Notifier::new());
        let n2 = Arc::clone(&n);
        let handle = std::thread::spawn(move || {
            n2.wait_until(Instant::now() + Duration::from_secs(5))
        });
        std::thread::sleep(Duration::from_millis(10));
        n.notify();
        assert_eq!(handle.join().expect("join"), Wake::Notified);
    }

    #[test]
    fn test_close_wakes_and_sticks() {
        let n = Arc::new(Notifier::new());
        let n2 = Arc::clone(&n);
        let handle = std::thread::spawn(move || {
            n2.wait_until(Instant::now() + Duration::from_secs(5))
        });
        std::thread::sleep(Duration::from_millis(10));
        n.close();
        assert_eq!(handle.join().expect("join"), Wake::Closed);
        assert_eq!(
            n.wait_until(Instant::now() + Duration::from_secs(5)),
            Wake::Closed
        );
    }
}
