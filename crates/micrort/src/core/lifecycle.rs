// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Core state machine shared (read-mostly) by every topic and service.

use crate::error::{Error, Result};
use arc_swap::ArcSwapOption;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

/// `Uninitialized → Initializing → Running → ShuttingDown → Stopped`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum CoreState {
    Uninitialized = 0,
    Initializing = 1,
    Running = 2,
    ShuttingDown = 3,
    Stopped = 4,
}

impl CoreState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Uninitialized,
            1 => Self::Initializing,
            2 => Self::Running,
            3 => Self::ShuttingDown,
            _ => Self::Stopped,
        }
    }

    /// Topics and services may still be declared.
    pub fn accepts_registration(self) -> bool {
        matches!(self, Self::Uninitialized | Self::Initializing)
    }

    /// Endpoints (publishers, subscribers, clients, servers) may still be bound.
    pub fn accepts_binding(self) -> bool {
        self <= Self::Running
    }
}

#[derive(Debug)]
pub(crate) struct Lifecycle {
    state: AtomicU8,
    /// Raised when node loops must exit (after drain, or immediately on emergency).
    terminate: AtomicBool,
    /// First emergency reason; later ones are only logged.
    reason: ArcSwapOption<Error>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(CoreState::Uninitialized as u8),
            terminate: AtomicBool::new(false),
            reason: ArcSwapOption::empty(),
        }
    }

    pub(crate) fn state(&self) -> CoreState {
        CoreState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move `from → to` atomically. Returns `false` if the state was not `from`.
    pub(crate) fn transition(&self, from: CoreState, to: CoreState) -> bool {
        let ok = self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if ok {
            log::info!("[Lifecycle] {:?} -> {:?}", from, to);
        }
        ok
    }

    /// Enter `ShuttingDown` from any earlier state. Returns the previous state.
    pub(crate) fn begin_shutdown(&self) -> CoreState {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current >= CoreState::ShuttingDown as u8 {
                return CoreState::from_u8(current);
            }
            match self.state.compare_exchange(
                current,
                CoreState::ShuttingDown as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    let prev = CoreState::from_u8(current);
                    log::info!("[Lifecycle] {:?} -> ShuttingDown", prev);
                    return prev;
                }
                Err(actual) => current = actual,
            }
        }
    }

    pub(crate) fn finish(&self) {
        let prev = self.state.swap(CoreState::Stopped as u8, Ordering::AcqRel);
        if prev != CoreState::Stopped as u8 {
            log::info!("[Lifecycle] {:?} -> Stopped", CoreState::from_u8(prev));
        }
    }

    /// Gate for publish and call.
    pub(crate) fn ensure_running(&self) -> Result<()> {
        match self.state() {
            CoreState::Running => Ok(()),
            CoreState::ShuttingDown | CoreState::Stopped => Err(Error::ShuttingDown),
            other => Err(Error::NotRunning(other)),
        }
    }

    pub(crate) fn ensure_registering(&self) -> Result<()> {
        let state = self.state();
        if state.accepts_registration() {
            Ok(())
        } else {
            Err(Error::InvalidState(format!(
                "topics and services must be declared before start (state: {:?})",
                state
            )))
        }
    }

    pub(crate) fn ensure_binding(&self) -> Result<()> {
        if self.state().accepts_binding() {
            Ok(())
        } else {
            Err(Error::ShuttingDown)
        }
    }

    pub(crate) fn raise_terminate(&self) {
        self.terminate.store(true, Ordering::Release);
    }

    pub(crate) fn should_terminate(&self) -> bool {
        self.terminate.load(Ordering::Acquire)
    }

    /// Record `reason` if it is the first one. Returns `true` if recorded.
    pub(crate) fn record_reason(&self, reason: Error) -> bool {
        let fresh = Some(Arc::new(reason));
        let prev = self
            .reason
            .compare_and_swap(&None::<Arc<Error>>, fresh);
        prev.is_none()
    }

    pub(crate) fn reason(&self) -> Option<Error> {
        self.reason.load_full().map(|e| (*e).clone())
    }
}
