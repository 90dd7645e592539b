// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Service: call table, request queue, and the slot pool behind both.
//!
//! # Call lifecycle
//!
//! ```text
//! Free --submit--> Queued --dispatch--> Dispatched --respond--> Responded --pickup--> Free
//!                    |                      |
//!                 timeout               timeout
//!                    v                      v
//!                  Free                 Abandoned --respond (discarded)--> Free
//!
//! Free --send--> Queued --dispatch--> Free                      (one-way)
//! ```
//!
//! Each live call holds a response slot from submit until pickup (or until the
//! late response is discarded) and a request slot from submit until dispatch.
//! One-way calls never take a response slot.
//! The pool therefore has two slots per call-table entry and a free entry
//! always finds its slots.

use super::types::{DispatchedCall, Reply, ReplyStatus, RespondOutcome, ServiceStats};
use crate::config::ServiceConfig;
use crate::core::Lifecycle;
use crate::error::{Error, Result};
use crate::rt::{BoundedRing, MessagePool, Notifier, SlotHandle, Wake};
use crate::time::Clock;
use crate::types::{CallId, MessageId, ServiceId, Timestamp};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Free,
    Queued,
    Dispatched,
    Responded,
    Abandoned,
}

struct CallEntry {
    call: CallId,
    phase: Phase,
    request: SlotHandle,
    response: SlotHandle,
    status: ReplyStatus,
    submitted_at: Timestamp,
    one_way: bool,
    notifier: Arc<Notifier>,
}

/// Client-side handle on a submitted call.
pub(crate) struct PendingCall {
    index: usize,
    pub(crate) call: CallId,
    notifier: Arc<Notifier>,
}

struct ServiceState {
    pool: MessagePool,
    /// Call-table indices in submission order.
    queue: BoundedRing<usize>,
    calls: Box<[CallEntry]>,
    last_call: CallId,
    stats: ServiceStats,
    closed: bool,
}

impl ServiceState {
    fn release_slot(&mut self, slot: SlotHandle) {
        if let Err(e) = self.pool.release(slot) {
            log::error!("[Service] slot {} release failed: {}", slot.0, e);
        }
    }

    /// Fresh id, never equal to one still held by a live entry.
    fn next_call_id(&mut self) -> CallId {
        loop {
            let candidate = self.last_call.next();
            self.last_call = candidate;
            let in_use = self
                .calls
                .iter()
                .any(|c| c.phase != Phase::Free && c.call == candidate);
            if !in_use {
                return candidate;
            }
        }
    }

    fn live_entry(&self, index: usize, call: CallId) -> Option<&CallEntry> {
        self.calls
            .get(index)
            .filter(|c| c.call == call && c.phase != Phase::Free)
    }

    /// Return the entry's remaining slots and mark it free.
    fn retire(&mut self, index: usize) {
        let (phase, request, response, one_way) = {
            let e = &self.calls[index];
            (e.phase, e.request, e.response, e.one_way)
        };
        if phase == Phase::Queued {
            self.release_slot(request);
        }
        if phase != Phase::Free && !one_way {
            self.release_slot(response);
        }
        let entry = &mut self.calls[index];
        entry.phase = Phase::Free;
        entry.call = CallId::INVALID;
    }
}

/// Registry entry for one RPC service.
pub struct Service {
    id: ServiceId,
    config: ServiceConfig,
    clock: Arc<dyn Clock>,
    lifecycle: Arc<Lifecycle>,
    server_bound: AtomicBool,
    request_ready: Notifier,
    state: Mutex<ServiceState>,
}

impl Service {
    pub(crate) fn new(
        id: ServiceId,
        config: ServiceConfig,
        clock: Arc<dyn Clock>,
        lifecycle: Arc<Lifecycle>,
    ) -> Result<Self> {
        config.validate()?;
        let pool = MessagePool::new(config.pool_capacity(), config.max_payload)?;
        let calls = (0..config.queue_depth)
            .map(|_| CallEntry {
                call: CallId::INVALID,
                phase: Phase::Free,
                request: SlotHandle::default(),
                response: SlotHandle::default(),
                status: ReplyStatus::Ok,
                submitted_at: Timestamp::ZERO,
                one_way: false,
                notifier: Arc::new(Notifier::new()),
            })
            .collect();
        Ok(Self {
            id,
            config,
            clock,
            lifecycle,
            server_bound: AtomicBool::new(false),
            request_ready: Notifier::new(),
            state: Mutex::new(ServiceState {
                pool,
                queue: BoundedRing::with_limit(config.queue_depth),
                calls,
                last_call: CallId::INVALID,
                stats: ServiceStats::default(),
                closed: false,
            }),
        })
    }

    pub fn id(&self) -> ServiceId {
        self.id
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn stats(&self) -> ServiceStats {
        self.state.lock().stats
    }

    /// Calls not yet answered and picked up (queued, dispatched, or abandoned).
    pub fn outstanding(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.phase != Phase::Free)
            .count()
    }

    /// Requests waiting for dispatch.
    pub fn queue_len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Free slots in the service pool.
    pub fn free_slots(&self) -> usize {
        self.state.lock().pool.available()
    }

    pub(crate) fn try_bind_server(&self) -> Result<()> {
        self.lifecycle.ensure_binding()?;
        self.server_bound
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| Error::ServerAlreadyBound(self.id))
    }

    pub(crate) fn unbind_server(&self) {
        self.server_bound.store(false, Ordering::Release);
    }

    // ------------------------------------------------------------------
    // Client side
    // ------------------------------------------------------------------

    pub(crate) fn submit(&self, request: &[u8]) -> Result<PendingCall> {
        self.enqueue(request, false)
    }

    /// Queue a request nobody waits on. Only a request slot is taken.
    pub(crate) fn send(&self, request: &[u8]) -> Result<CallId> {
        self.enqueue(request, true).map(|pending| pending.call)
    }

    fn enqueue(&self, request: &[u8], one_way: bool) -> Result<PendingCall> {
        self.lifecycle.ensure_running()?;
        let now = self.clock.now();
        let mut st = self.state.lock();
        if st.closed {
            return Err(Error::ShuttingDown);
        }
        if request.len() > self.config.max_payload {
            st.stats.rejected += 1;
            return Err(Error::PayloadTooLarge {
                size: request.len(),
                max: self.config.max_payload,
            });
        }
        let Some(index) = st.calls.iter().position(|c| c.phase == Phase::Free) else {
            st.stats.rejected += 1;
            return Err(Error::PoolExhausted {
                capacity: self.config.queue_depth,
            });
        };

        let request_slot = st.pool.acquire()?;
        let response_slot = if one_way {
            SlotHandle::default()
        } else {
            match st.pool.acquire() {
                Ok(slot) => slot,
                Err(e) => {
                    st.release_slot(request_slot);
                    return Err(e);
                }
            }
        };

        let call = st.next_call_id();
        st.pool
            .write(request_slot, MessageId(u64::from(call.0)), now, request)?;

        let entry = &mut st.calls[index];
        entry.call = call;
        entry.phase = Phase::Queued;
        entry.request = request_slot;
        entry.response = response_slot;
        entry.status = ReplyStatus::Ok;
        entry.submitted_at = now;
        entry.one_way = one_way;
        // Drop a wake left over from this entry's previous call.
        entry.notifier.check_and_clear();
        let notifier = Arc::clone(&entry.notifier);

        let queued = st.queue.push(index);
        debug_assert!(queued, "request queue is as deep as the call table");
        st.stats.submitted += 1;
        drop(st);

        self.request_ready.notify();
        #[cfg(feature = "trace")]
        log::trace!("[Service::submit] {} {} queued (one_way={})", self.id, call, one_way);
        Ok(PendingCall {
            index,
            call,
            notifier,
        })
    }

    /// Pick up the response if it has arrived.
    fn try_pickup(&self, pending: &PendingCall, response: &mut [u8]) -> Result<Option<Reply>> {
        let now = self.clock.now();
        let mut st = self.state.lock();
        let Some((phase, status, slot, submitted_at)) = st
            .live_entry(pending.index, pending.call)
            .map(|e| (e.phase, e.status, e.response, e.submitted_at))
        else {
            // Entry was reclaimed by a forced shutdown.
            return Err(Error::ShuttingDown);
        };
        match phase {
            Phase::Responded => {}
            _ if st.closed => {
                st.retire(pending.index);
                return Err(Error::ShuttingDown);
            }
            _ => return Ok(None),
        }

        let outcome = if status.is_ok() {
            st.pool.read_into(slot, response).map(|size| Reply {
                call: pending.call,
                size,
                round_trip: submitted_at.elapsed_until(now),
            })
        } else {
            Err(Error::RemoteException {
                service: self.id,
                call: pending.call,
                status,
            })
        };
        st.retire(pending.index);
        st.stats.completed += 1;
        Ok(Some(outcome?))
    }

    /// Block until the response for `pending` arrives or `deadline` passes.
    pub(crate) fn await_reply(
        &self,
        pending: &PendingCall,
        response: &mut [u8],
        deadline: Instant,
        timeout: Duration,
    ) -> Result<Reply> {
        loop {
            if let Some(reply) = self.try_pickup(pending, response)? {
                return Ok(reply);
            }
            match pending.notifier.wait_until(deadline) {
                Wake::Notified => {}
                Wake::Closed => {
                    // A response may have landed right before the close.
                    return match self.try_pickup(pending, response) {
                        Ok(Some(reply)) => Ok(reply),
                        Ok(None) | Err(_) => Err(Error::ShuttingDown),
                    };
                }
                Wake::TimedOut => return self.abandon(pending, response, timeout),
            }
        }
    }

    fn abandon(&self, pending: &PendingCall, response: &mut [u8], timeout: Duration) -> Result<Reply> {
        let mut st = self.state.lock();
        let Some(phase) = st.live_entry(pending.index, pending.call).map(|e| e.phase) else {
            return Err(Error::ShuttingDown);
        };
        match phase {
            Phase::Responded => {
                // Lost the race with respond(): the answer is here after all.
                drop(st);
                return match self.try_pickup(pending, response)? {
                    Some(reply) => Ok(reply),
                    None => Err(Error::ShuttingDown),
                };
            }
            Phase::Queued => {
                st.queue.remove_first(|&i| i == pending.index);
                st.retire(pending.index);
            }
            Phase::Dispatched => {
                // The server still owes a response; it releases the slot then.
                st.calls[pending.index].phase = Phase::Abandoned;
            }
            Phase::Abandoned | Phase::Free => {}
        }
        st.stats.timeouts += 1;
        drop(st);
        log::warn!(
            "[Service::call] {} {} timed out after {:?}",
            self.id,
            pending.call,
            timeout
        );
        Err(Error::RpcTimeout {
            service: self.id,
            call: pending.call,
            timeout,
        })
    }

    // ------------------------------------------------------------------
    // Server side
    // ------------------------------------------------------------------

    /// Take the oldest queued request, copying its payload into `buf`.
    pub(crate) fn dispatch(&self, buf: &mut [u8]) -> Result<Option<DispatchedCall>> {
        let now = self.clock.now();
        let mut st = self.state.lock();
        if st.closed {
            return Err(Error::ShuttingDown);
        }
        let Some(index) = st.queue.peek() else {
            return Ok(None);
        };
        let (call, request, submitted_at, one_way) = {
            let e = &st.calls[index];
            (e.call, e.request, e.submitted_at, e.one_way)
        };
        // BufferTooSmall leaves the request queued.
        let size = st.pool.read_into(request, buf)?;

        st.queue.pop();
        st.stats.dispatched += 1;
        if one_way {
            // Nothing to answer: the call ends here.
            st.retire(index);
            st.stats.completed += 1;
        } else {
            st.release_slot(request);
            st.calls[index].phase = Phase::Dispatched;
        }
        Ok(Some(DispatchedCall {
            call,
            size,
            submitted_at,
            queue_latency: submitted_at.elapsed_until(now),
            one_way,
        }))
    }

    /// Like [`dispatch`](Self::dispatch) but waits for a request until `deadline`.
    pub(crate) fn dispatch_until(&self, buf: &mut [u8], deadline: Instant) -> Result<Option<DispatchedCall>> {
        loop {
            if let Some(call) = self.dispatch(buf)? {
                return Ok(Some(call));
            }
            match self.request_ready.wait_until(deadline) {
                Wake::Notified => {}
                Wake::Closed => return Err(Error::ShuttingDown),
                Wake::TimedOut => return Ok(None),
            }
        }
    }

    /// Complete a dispatched call. Exactly one response per call is accepted.
    pub(crate) fn respond(&self, call: CallId, result: &[u8], status: ReplyStatus) -> Result<RespondOutcome> {
        let now = self.clock.now();
        let mut st = self.state.lock();
        let Some(index) = st.calls.iter().position(|c| {
            c.call == call && matches!(c.phase, Phase::Dispatched | Phase::Abandoned)
        }) else {
            return Err(Error::InvalidCall(call));
        };

        if st.calls[index].phase == Phase::Abandoned {
            st.retire(index);
            st.stats.late_discarded += 1;
            drop(st);
            log::debug!("[Service::respond] {} {} late response discarded", self.id, call);
            return Ok(RespondOutcome::Discarded);
        }

        if result.len() > self.config.max_payload {
            // Call stays dispatched so the server can answer with an error status.
            return Err(Error::PayloadTooLarge {
                size: result.len(),
                max: self.config.max_payload,
            });
        }

        let (slot, submitted_at) = {
            let e = &st.calls[index];
            (e.response, e.submitted_at)
        };
        st.pool
            .write(slot, MessageId(u64::from(call.0)), now, result)?;
        let entry = &mut st.calls[index];
        entry.status = status;
        entry.phase = Phase::Responded;
        let notifier = Arc::clone(&entry.notifier);
        st.stats.record_latency(submitted_at.elapsed_until(now));
        if !status.is_ok() {
            st.stats.remote_errors += 1;
        }
        drop(st);

        notifier.notify();
        Ok(RespondOutcome::Delivered)
    }

    /// Answer every dispatched call with `ServiceUnavailable` and discard
    /// abandoned ones. Used when the server goes away.
    pub(crate) fn abort_dispatched(&self) {
        let owed: Vec<CallId> = {
            let st = self.state.lock();
            st.calls
                .iter()
                .filter(|c| matches!(c.phase, Phase::Dispatched | Phase::Abandoned))
                .map(|c| c.call)
                .collect()
        };
        for call in owed {
            if let Err(e) = self.respond(call, &[], ReplyStatus::ServiceUnavailable) {
                log::debug!("[Service::abort_dispatched] {} {}: {}", self.id, call, e);
            }
        }
    }

    // ------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------

    pub(crate) fn close(&self) {
        let mut st = self.state.lock();
        st.closed = true;
        self.request_ready.close();
        for entry in st.calls.iter() {
            entry.notifier.close();
        }
    }

    /// Drop every live call and return all slots. Returns the number of calls dropped.
    pub(crate) fn force_release(&self) -> usize {
        let mut st = self.state.lock();
        st.closed = true;
        while st.queue.pop().is_some() {}
        let mut dropped = 0;
        for entry in st.calls.iter_mut() {
            if entry.phase != Phase::Free {
                entry.phase = Phase::Free;
                entry.call = CallId::INVALID;
                dropped += 1;
            }
        }
        st.pool.reclaim_all();
        if dropped > 0 {
            log::warn!("[Service::force_release] {} dropped {} live call(s)", self.id, dropped);
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CoreState;
    use crate::time::ManualClock;

    fn running_service(depth: usize) -> Service {
        let lifecycle = Arc::new(Lifecycle::new());
        assert!(lifecycle.transition(CoreState::Uninitialized, CoreState::Running));
        Service::new(
            ServiceId(1),
            ServiceConfig::default().with_queue_depth(depth).with_max_payload(16),
            Arc::new(ManualClock::new()),
            lifecycle,
        )
        .expect("service")
    }

    #[test]
    fn test_call_table_bounds_submissions() {
        let svc = running_service(2);
        let a = svc.submit(b"a").expect("a");
        let b = svc.submit(b"b").expect("b");
        assert_ne!(a.call, b.call);
        assert_eq!(
            svc.submit(b"c").err(),
            Some(Error::PoolExhausted { capacity: 2 })
        );
        assert_eq!(svc.free_slots(), 0);
        assert_eq!(svc.stats().rejected, 1);
    }

    #[test]
    fn test_dispatch_respond_pickup_frees_slots() {
        let svc = running_service(1);
        let pending = svc.submit(b"ping").expect("submit");

        let mut req = [0u8; 16];
        let d = svc.dispatch(&mut req).expect("dispatch").expect("queued");
        assert_eq!(d.call, pending.call);
        assert_eq!(&req[..d.size], b"ping");
        // Request slot released at dispatch, response slot still reserved
        assert_eq!(svc.free_slots(), 1);

        assert_eq!(
            svc.respond(d.call, b"pong", ReplyStatus::Ok),
            Ok(RespondOutcome::Delivered)
        );
        // Second response for the same call is refused
        assert_eq!(
            svc.respond(d.call, b"again", ReplyStatus::Ok),
            Err(Error::InvalidCall(d.call))
        );

        let mut resp = [0u8; 16];
        let reply = svc
            .try_pickup(&pending, &mut resp)
            .expect("pickup")
            .expect("responded");
        assert_eq!(&resp[..reply.size], b"pong");
        assert_eq!(svc.free_slots(), 2);
        assert_eq!(svc.outstanding(), 0);
    }

    #[test]
    fn test_timeout_while_queued_releases_both_slots() {
        let svc = running_service(2);
        let pending = svc.submit(b"x").expect("submit");
        let mut resp = [0u8; 4];
        let err = svc
            .await_reply(
                &pending,
                &mut resp,
                Instant::now() + Duration::from_millis(5),
                Duration::from_millis(5),
            )
            .expect_err("no server");
        assert!(matches!(err, Error::RpcTimeout { .. }));
        assert_eq!(svc.free_slots(), 4);
        assert_eq!(svc.queue_len(), 0);
    }

    #[test]
    fn test_late_response_discarded() {
        let svc = running_service(1);
        let pending = svc.submit(b"x").expect("submit");
        let mut req = [0u8; 16];
        let d = svc.dispatch(&mut req).expect("dispatch").expect("queued");

        let mut resp = [0u8; 16];
        let err = svc
            .await_reply(
                &pending,
                &mut resp,
                Instant::now() + Duration::from_millis(2),
                Duration::from_millis(2),
            )
            .expect_err("server slow");
        assert!(matches!(err, Error::RpcTimeout { .. }));
        // Response slot still owed by the server
        assert_eq!(svc.free_slots(), 1);

        assert_eq!(
            svc.respond(d.call, b"late", ReplyStatus::Ok),
            Ok(RespondOutcome::Discarded)
        );
        assert_eq!(svc.free_slots(), 2);
        assert_eq!(svc.stats().late_discarded, 1);
    }

    #[test]
    fn test_remote_error_surfaces_status() {
        let svc = running_service(1);
        let pending = svc.submit(b"x").expect("submit");
        let mut req = [0u8; 16];
        let d = svc.dispatch(&mut req).expect("dispatch").expect("queued");
        svc.respond(d.call, &[], ReplyStatus::InvalidArgument)
            .expect("respond");

        let mut resp = [0u8; 16];
        let err = svc.try_pickup(&pending, &mut resp).expect_err("remote error");
        assert_eq!(
            err,
            Error::RemoteException {
                service: ServiceId(1),
                call: pending.call,
                status: ReplyStatus::InvalidArgument
            }
        );
        assert_eq!(svc.free_slots(), 2);
    }

    #[test]
    fn test_one_way_call_takes_only_a_request_slot() {
        let svc = running_service(2);
        let call = svc.send(b"fire").expect("send");
        assert_eq!(svc.free_slots(), 3);
        assert_eq!(svc.outstanding(), 1);

        let mut req = [0u8; 16];
        let d = svc.dispatch(&mut req).expect("dispatch").expect("queued");
        assert_eq!(d.call, call);
        assert!(d.one_way);
        assert_eq!(&req[..d.size], b"fire");
        assert_eq!(svc.free_slots(), 4);
        assert_eq!(svc.outstanding(), 0);
        assert_eq!(svc.stats().completed, 1);

        assert_eq!(
            svc.respond(call, b"x", ReplyStatus::Ok),
            Err(Error::InvalidCall(call))
        );
        assert_eq!(svc.free_slots(), 4);
    }

    #[test]
    fn test_one_way_entry_reused_by_regular_call() {
        let svc = running_service(1);
        svc.send(b"a").expect("send");
        let mut req = [0u8; 16];
        svc.dispatch(&mut req).expect("dispatch").expect("queued");

        let pending = svc.submit(b"b").expect("submit");
        let d = svc.dispatch(&mut req).expect("dispatch").expect("queued");
        assert!(!d.one_way);
        svc.respond(d.call, b"ok", ReplyStatus::Ok).expect("respond");
        let mut resp = [0u8; 16];
        let reply = svc
            .try_pickup(&pending, &mut resp)
            .expect("pickup")
            .expect("responded");
        assert_eq!(&resp[..reply.size], b"ok");
        assert_eq!(svc.free_slots(), 2);
    }

    #[test]
    fn test_force_release_reclaims_everything() {
        let svc = running_service(3);
        let _a = svc.submit(b"a").expect("a");
        let _b = svc.submit(b"b").expect("b");
        let mut req = [0u8; 16];
        svc.dispatch(&mut req).expect("dispatch");
        assert_eq!(svc.force_release(), 2);
        assert_eq!(svc.free_slots(), 6);
        assert_eq!(svc.submit(b"c").err(), Some(Error::ShuttingDown));
    }
}
