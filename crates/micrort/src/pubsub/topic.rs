// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Topic: one publisher, ordered subscribers, and the backing slot pool.
//!
//! # Delivery model
//!
//! - Every bound HRT subscriber owns a bounded FIFO lane of deliveries. A
//!   message's HRT count is the number of lanes it was pushed to.
//! - The newest message is retained as `latest` so SRT subscribers can poll it
//!   after HRT consumers are done (newest-message-wins, depth 1).
//! - A slot returns to the pool once its HRT count is zero and it is no longer
//!   `latest`.
//! - A publish that would overflow any HRT lane fails with
//!   [`Error::PublishBlocked`]; HRT subscribers never lose a message.
//!
//! All state sits behind one short-held mutex. Nothing blocks while it is held.

use super::qos::{DetectedAt, HrtQos, JitterWindow, QosViolation, RecoveryHook, ViolationKind};
use super::usefulness::{self, Usefulness};
use super::{HrtSubscriber, Publisher, SrtSubscriber};
use crate::config::TopicConfig;
use crate::core::{CoreInner, Lifecycle};
use crate::error::{Error, Result, Status};
use crate::rt::{BoundedRing, Delivery, MessagePool, Notifier, SlotHandle};
use crate::time::Clock;
use crate::types::{MessageId, SubscriberId, Timestamp, TopicId};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Metadata of a consumed message. The payload was copied into the caller's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageInfo {
    pub id: MessageId,
    pub timestamp: Timestamp,
    pub size: usize,
    /// Consumption time minus publish timestamp.
    pub latency: Duration,
}

/// Result of an SRT poll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SrtOutcome {
    /// Useful message copied into the buffer.
    Accepted { info: MessageInfo, score: f64 },
    /// Newest message scored below threshold; skipped and counted.
    Stale {
        id: MessageId,
        age: Duration,
        score: f64,
    },
    /// Nothing newer than the last message seen.
    NoMessage,
}

impl SrtOutcome {
    pub fn status(&self) -> Status {
        match self {
            Self::Accepted { .. } => Status::Ok,
            Self::Stale { .. } => Status::StaleMessageDiscarded,
            Self::NoMessage => Status::NoMessage,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberKind {
    Hrt,
    Srt,
}

/// Cumulative topic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TopicStats {
    pub published: u64,
    pub publish_failures: u64,
    /// Messages replaced as `latest` before every subscriber saw them.
    pub superseded: u64,
    pub stale_discarded: u64,
    pub deadline_misses: u64,
    pub jitter_violations: u64,
    pub rate_violations: u64,
    pub hrt_delivered: u64,
}

/// Point-in-time view of a topic's pool accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicSnapshot {
    pub id: TopicId,
    pub capacity: usize,
    pub free_slots: usize,
    /// Slots held by an HRT lane or as `latest`.
    pub referenced_slots: usize,
    /// Queued HRT deliveries over all lanes.
    pub in_flight_hrt: usize,
    /// Sum of per-slot HRT counts.
    pub pending_refs: u64,
    pub latest: Option<MessageId>,
    pub hrt_subscribers: usize,
    pub srt_subscribers: usize,
    pub stats: TopicStats,
}

impl TopicSnapshot {
    /// No slot leaked, none freed while referenced.
    pub fn is_consistent(&self) -> bool {
        self.free_slots + self.referenced_slots == self.capacity
            && self.pending_refs == self.in_flight_hrt as u64
    }
}

struct HrtLane {
    subscriber: SubscriberId,
    queue: BoundedRing<Delivery>,
    qos: HrtQos,
    active: bool,
    /// Last message the watchdog already reported for this lane.
    flagged: MessageId,
    jitter: JitterWindow,
    /// Bind time, then the timestamp of the newest message pushed.
    last_arrival: Timestamp,
    /// `last_arrival` the watchdog already reported silence after.
    rate_flagged: Option<Timestamp>,
}

impl HrtLane {
    fn new(subscriber: SubscriberId, depth: usize, qos: HrtQos, now: Timestamp) -> Self {
        Self {
            subscriber,
            queue: BoundedRing::with_limit(depth),
            qos,
            active: true,
            flagged: MessageId::INVALID,
            jitter: JitterWindow::default(),
            last_arrival: now,
            rate_flagged: None,
        }
    }

    /// Deadline and rate checks on a queued lane.
    fn watchdog(&mut self, topic: TopicId, last_id: MessageId, now: Timestamp) -> Vec<QosViolation> {
        let mut found = Vec::new();
        if !self.active {
            return found;
        }
        if let Some(head) = self.queue.peek().filter(|h| h.id != self.flagged) {
            let age = head.timestamp.elapsed_until(now);
            if let Some(deadline) = self.qos.exceeded(age) {
                self.flagged = head.id;
                found.push(QosViolation {
                    topic,
                    subscriber: self.subscriber,
                    kind: ViolationKind::Deadline,
                    message: head.id,
                    latency: age,
                    limit: deadline,
                    detected_at: DetectedAt::Watchdog,
                });
            }
        }
        let silence = self.last_arrival.elapsed_until(now);
        if let Some(rate) = self.qos.rate_exceeded(silence) {
            if self.rate_flagged != Some(self.last_arrival) {
                self.rate_flagged = Some(self.last_arrival);
                found.push(QosViolation {
                    topic,
                    subscriber: self.subscriber,
                    kind: ViolationKind::Rate,
                    message: last_id,
                    latency: silence,
                    limit: rate,
                    detected_at: DetectedAt::Watchdog,
                });
            }
        }
        found
    }
}

struct Reader {
    subscriber: SubscriberId,
    kind: SubscriberKind,
    notifier: Arc<Notifier>,
}

struct TopicState {
    pool: MessagePool,
    latest: Option<SlotHandle>,
    last_id: MessageId,
    lanes: Vec<HrtLane>,
    /// Registration order = notification order.
    readers: Vec<Reader>,
    stats: TopicStats,
    closed: bool,
}

impl TopicState {
    fn active_lanes(&self) -> impl Iterator<Item = &HrtLane> {
        self.lanes.iter().filter(|l| l.active)
    }

    fn reclaim_if_unreferenced(&mut self, slot: SlotHandle) {
        if self.latest == Some(slot) || self.pool.slot(slot).hrt_pending() > 0 {
            return;
        }
        if let Err(e) = self.pool.release(slot) {
            log::error!("[Topic::reclaim] slot {} release failed: {}", slot.0, e);
        }
    }

    fn acquire_slot(&mut self) -> Result<SlotHandle> {
        match self.pool.acquire() {
            Ok(slot) => Ok(slot),
            Err(exhausted) => match self.latest {
                // Recycle the retained latest in place if no HRT lane still needs it.
                Some(prev) if self.pool.slot(prev).hrt_pending() == 0 => {
                    if self.pool.slot(prev).profile().consumers_left > 0 {
                        self.stats.superseded += 1;
                    }
                    self.latest = None;
                    self.pool.release(prev)?;
                    self.pool.acquire()
                }
                _ => Err(exhausted),
            },
        }
    }

    fn publish(&mut self, topic: TopicId, payload: &[u8], timestamp: Timestamp) -> Result<MessageId> {
        if self.closed {
            return Err(Error::ShuttingDown);
        }
        if payload.len() > self.pool.max_payload() {
            return Err(Error::PayloadTooLarge {
                size: payload.len(),
                max: self.pool.max_payload(),
            });
        }
        // Slot shortage is reported before a full lane.
        let recyclable = self
            .latest
            .is_some_and(|s| self.pool.slot(s).hrt_pending() == 0);
        if self.pool.available() == 0 && !recyclable {
            log::debug!("[Topic::publish] {} pool exhausted", topic);
            return Err(Error::PoolExhausted {
                capacity: self.pool.capacity(),
            });
        }
        if let Some(lane) = self.active_lanes().find(|l| l.queue.is_full()) {
            return Err(Error::PublishBlocked {
                topic,
                subscriber: lane.subscriber,
            });
        }

        let slot = self.acquire_slot()?;
        let id = self.last_id.next();
        if let Err(e) = self.pool.write(slot, id, timestamp, payload) {
            let _ = self.pool.release(slot);
            return Err(e);
        }

        let hrt = self.active_lanes().count() as u32;
        let readers = self.readers.len() as u32;
        let msg = self.pool.get_mut(slot);
        msg.set_hrt_pending(hrt);
        msg.profile_mut().consumers_left = readers;
        self.last_id = id;

        if let Some(prev) = self.latest.replace(slot) {
            if self.pool.slot(prev).profile().consumers_left > 0 {
                self.stats.superseded += 1;
            }
            self.reclaim_if_unreferenced(prev);
        }

        let delivery = Delivery {
            slot,
            id,
            timestamp,
        };
        for lane in self.lanes.iter_mut().filter(|l| l.active) {
            let pushed = lane.queue.push(delivery);
            debug_assert!(pushed, "lane capacity checked before acquire");
            lane.last_arrival = timestamp;
        }

        self.stats.published += 1;
        Ok(id)
    }

    /// Drop one HRT reference held by a lane.
    fn release_delivery(&mut self, d: Delivery) {
        let msg = self.pool.get_mut(d.slot);
        if msg.id() != d.id || msg.hrt_pending() == 0 {
            log::error!(
                "[Topic::release_delivery] stale delivery {} on slot {} (slot holds {})",
                d.id,
                d.slot.0,
                msg.id()
            );
            return;
        }
        let left = msg.consume_hrt();
        let profile = msg.profile_mut();
        profile.consumers_left = profile.consumers_left.saturating_sub(1);
        if left == 0 {
            self.reclaim_if_unreferenced(d.slot);
        }
    }

    fn lane(&self, lane: usize) -> Result<&HrtLane> {
        self.lanes
            .get(lane)
            .filter(|l| l.active)
            .ok_or_else(|| Error::InvalidState(format!("HRT lane {} is not bound", lane)))
    }

    /// Copy and consume the oldest delivery of `lane`.
    fn hrt_take(
        &mut self,
        topic: TopicId,
        lane: usize,
        buf: &mut [u8],
        now: Timestamp,
    ) -> Result<Option<(MessageInfo, Option<QosViolation>)>> {
        if self.closed {
            return Err(Error::ShuttingDown);
        }
        let Some(d) = self.lane(lane)?.queue.peek() else {
            return Ok(None);
        };
        // BufferTooSmall leaves the delivery queued.
        let size = self.pool.read_into(d.slot, buf)?;
        let latency = d.timestamp.elapsed_until(now);

        let entry = &mut self.lanes[lane];
        entry.queue.pop();
        let broken = if entry.flagged == d.id {
            // Already reported by the watchdog.
            None
        } else if let Some(deadline) = entry.qos.exceeded(latency) {
            Some((ViolationKind::Deadline, deadline))
        } else {
            match entry.qos.max_jitter {
                Some(jitter) if entry.jitter.admit(latency, jitter) => {
                    Some((ViolationKind::Jitter, jitter))
                }
                _ => None,
            }
        };
        let violation = broken.map(|(kind, limit)| QosViolation {
            topic,
            subscriber: entry.subscriber,
            kind,
            message: d.id,
            latency,
            limit,
            detected_at: DetectedAt::Consumption,
        });

        self.release_delivery(d);
        self.stats.hrt_delivered += 1;
        if let Some(v) = &violation {
            self.count_violation(v.kind);
        }

        Ok(Some((
            MessageInfo {
                id: d.id,
                timestamp: d.timestamp,
                size,
                latency,
            },
            violation,
        )))
    }

    fn count_violation(&mut self, kind: ViolationKind) {
        match kind {
            ViolationKind::Deadline => self.stats.deadline_misses += 1,
            ViolationKind::Jitter => self.stats.jitter_violations += 1,
            ViolationKind::Rate => self.stats.rate_violations += 1,
        }
    }

    fn drain_lane(&mut self, lane: usize) -> usize {
        let mut drained = 0;
        while let Some(d) = self.lanes[lane].queue.pop() {
            self.release_delivery(d);
            drained += 1;
        }
        drained
    }

    fn notify_readers(&self) {
        for reader in &self.readers {
            reader.notifier.notify();
        }
    }
}

/// Registry entry for one topic.
pub struct Topic {
    id: TopicId,
    config: TopicConfig,
    clock: Arc<dyn Clock>,
    lifecycle: Arc<Lifecycle>,
    core: Weak<CoreInner>,
    publisher_bound: AtomicBool,
    next_subscriber: AtomicU32,
    state: Mutex<TopicState>,
}

impl Topic {
    pub(crate) fn new(
        id: TopicId,
        config: TopicConfig,
        clock: Arc<dyn Clock>,
        lifecycle: Arc<Lifecycle>,
        core: Weak<CoreInner>,
    ) -> Result<Self> {
        config.validate()?;
        let pool = MessagePool::new(config.capacity, config.max_payload)?;
        Ok(Self {
            id,
            config,
            clock,
            lifecycle,
            core,
            publisher_bound: AtomicBool::new(false),
            next_subscriber: AtomicU32::new(0),
            state: Mutex::new(TopicState {
                pool,
                latest: None,
                last_id: MessageId::INVALID,
                lanes: Vec::new(),
                readers: Vec::new(),
                stats: TopicStats::default(),
                closed: false,
            }),
        })
    }

    pub fn id(&self) -> TopicId {
        self.id
    }

    pub fn config(&self) -> &TopicConfig {
        &self.config
    }

    pub(crate) fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn stats(&self) -> TopicStats {
        self.state.lock().stats
    }

    pub fn snapshot(&self) -> TopicSnapshot {
        let st = self.state.lock();
        let mut referenced = 0;
        let mut pending_refs = 0u64;
        for (slot, msg) in st.pool.iter_in_use() {
            pending_refs += u64::from(msg.hrt_pending());
            if msg.hrt_pending() > 0 || st.latest == Some(slot) {
                referenced += 1;
            }
        }
        TopicSnapshot {
            id: self.id,
            capacity: st.pool.capacity(),
            free_slots: st.pool.available(),
            referenced_slots: referenced,
            in_flight_hrt: st.active_lanes().map(|l| l.queue.len()).sum(),
            pending_refs,
            latest: st.latest.map(|s| st.pool.slot(s).id()),
            hrt_subscribers: st.active_lanes().count(),
            srt_subscribers: st
                .readers
                .iter()
                .filter(|r| r.kind == SubscriberKind::Srt)
                .count(),
            stats: st.stats,
        }
    }

    // ------------------------------------------------------------------
    // Binding
    // ------------------------------------------------------------------

    pub(crate) fn bind_publisher(self: &Arc<Self>) -> Result<Publisher> {
        self.lifecycle.ensure_binding()?;
        if self
            .publisher_bound
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::PublisherAlreadyBound(self.id));
        }
        log::debug!("[Topic::bind_publisher] {}", self.id);
        Ok(Publisher::new(Arc::clone(self)))
    }

    pub(crate) fn unbind_publisher(&self) {
        self.publisher_bound.store(false, Ordering::Release);
    }

    fn register_reader(&self, st: &mut TopicState, kind: SubscriberKind) -> (SubscriberId, Arc<Notifier>) {
        let subscriber = SubscriberId(self.next_subscriber.fetch_add(1, Ordering::Relaxed));
        let notifier = Arc::new(Notifier::new());
        st.readers.push(Reader {
            subscriber,
            kind,
            notifier: Arc::clone(&notifier),
        });
        (subscriber, notifier)
    }

    pub(crate) fn bind_hrt(self: &Arc<Self>, qos: HrtQos) -> Result<HrtSubscriber> {
        self.lifecycle.ensure_binding()?;
        let mut st = self.state.lock();
        if st.closed {
            return Err(Error::ShuttingDown);
        }
        let (subscriber, notifier) = self.register_reader(&mut st, SubscriberKind::Hrt);
        let entry = HrtLane::new(subscriber, self.config.hrt_depth(), qos, self.clock.now());
        // Unbound lanes were drained on unbind and are reused.
        let lane = match st.lanes.iter().position(|l| !l.active) {
            Some(free) => {
                st.lanes[free] = entry;
                free
            }
            None => {
                st.lanes.push(entry);
                st.lanes.len() - 1
            }
        };
        drop(st);
        log::debug!("[Topic::bind_hrt] {} {} (lane {})", self.id, subscriber, lane);
        Ok(HrtSubscriber::new(Arc::clone(self), subscriber, lane, notifier))
    }

    pub(crate) fn bind_srt(
        self: &Arc<Self>,
        evaluator: Box<dyn Usefulness>,
        threshold: f64,
    ) -> Result<SrtSubscriber> {
        self.lifecycle.ensure_binding()?;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::Config(format!(
                "SRT threshold must be within [0, 1], got {}",
                threshold
            )));
        }
        let mut st = self.state.lock();
        if st.closed {
            return Err(Error::ShuttingDown);
        }
        let (subscriber, notifier) = self.register_reader(&mut st, SubscriberKind::Srt);
        drop(st);
        log::debug!("[Topic::bind_srt] {} {} threshold={}", self.id, subscriber, threshold);
        Ok(SrtSubscriber::new(
            Arc::clone(self),
            subscriber,
            notifier,
            evaluator,
            threshold,
        ))
    }

    /// Release every reference held by an HRT lane and stop delivering to it.
    pub(crate) fn unbind_hrt(&self, lane: usize, subscriber: SubscriberId) {
        let mut st = self.state.lock();
        let Some(entry) = st.lanes.get_mut(lane) else {
            return;
        };
        if !entry.active || entry.subscriber != subscriber {
            return;
        }
        entry.active = false;
        let drained = st.drain_lane(lane);
        st.readers.retain(|r| r.subscriber != subscriber);
        if drained > 0 {
            log::debug!(
                "[Topic::unbind_hrt] {} {} released {} queued message(s)",
                self.id,
                subscriber,
                drained
            );
        }
    }

    pub(crate) fn unbind_reader(&self, subscriber: SubscriberId) {
        self.state.lock().readers.retain(|r| r.subscriber != subscriber);
    }

    // ------------------------------------------------------------------
    // Traffic
    // ------------------------------------------------------------------

    pub(crate) fn publish(&self, payload: &[u8], timestamp: Timestamp) -> Result<MessageId> {
        self.lifecycle.ensure_running()?;
        let mut st = self.state.lock();
        match st.publish(self.id, payload, timestamp) {
            Ok(id) => {
                st.notify_readers();
                #[cfg(feature = "trace")]
                log::trace!("[Topic::publish] {} {} ({} bytes)", self.id, id, payload.len());
                Ok(id)
            }
            Err(e) => {
                st.stats.publish_failures += 1;
                drop(st);
                log::debug!("[Topic::publish] {} rejected: {}", self.id, e);
                Err(e)
            }
        }
    }

    pub(crate) fn hrt_try_receive(&self, lane: usize, buf: &mut [u8]) -> Result<Option<MessageInfo>> {
        let now = self.clock.now();
        let mut st = self.state.lock();
        let Some((info, violation)) = st.hrt_take(self.id, lane, buf, now)? else {
            return Ok(None);
        };
        let Some(violation) = violation else {
            return Ok(Some(info));
        };
        let hook = st.lanes[lane].qos.recovery.clone();
        drop(st);

        self.handle_violation(violation, hook)?;
        Ok(Some(info))
    }

    /// Consume everything queued on `lane` and deliver only the newest.
    ///
    /// Returns the delivered message and how many older ones were skipped.
    pub(crate) fn hrt_receive_latest(
        &self,
        lane: usize,
        buf: &mut [u8],
    ) -> Result<Option<(MessageInfo, usize)>> {
        let mut skipped = 0;
        {
            let mut st = self.state.lock();
            if st.closed {
                return Err(Error::ShuttingDown);
            }
            let Some(newest) = st.lane(lane)?.queue.iter().last() else {
                return Ok(None);
            };
            let needed = st.pool.slot(newest.slot).size();
            if buf.len() < needed {
                return Err(Error::BufferTooSmall {
                    needed,
                    available: buf.len(),
                });
            }
            while st.lanes[lane].queue.len() > 1 {
                if let Some(d) = st.lanes[lane].queue.pop() {
                    st.release_delivery(d);
                    skipped += 1;
                }
            }
        }
        Ok(self.hrt_try_receive(lane, buf)?.map(|info| (info, skipped)))
    }

    pub(crate) fn srt_poll(
        &self,
        last_seen: &mut MessageId,
        evaluator: &dyn Usefulness,
        threshold: f64,
        buf: &mut [u8],
    ) -> Result<SrtOutcome> {
        let now = self.clock.now();
        let mut st = self.state.lock();
        if st.closed {
            return Err(Error::ShuttingDown);
        }
        let Some(slot) = st.latest else {
            return Ok(SrtOutcome::NoMessage);
        };
        let msg = st.pool.slot(slot);
        let (id, timestamp) = (msg.id(), msg.timestamp());
        if id == *last_seen {
            return Ok(SrtOutcome::NoMessage);
        }

        let age = timestamp.elapsed_until(now);
        let score = usefulness::evaluate(evaluator, age);
        let accepted = score >= threshold;
        let size = if accepted {
            // BufferTooSmall leaves the message unseen.
            st.pool.read_into(slot, buf)?
        } else {
            0
        };

        *last_seen = id;
        let profile = st.pool.get_mut(slot).profile_mut();
        profile.consumers_left = profile.consumers_left.saturating_sub(1);

        if accepted {
            Ok(SrtOutcome::Accepted {
                info: MessageInfo {
                    id,
                    timestamp,
                    size,
                    latency: age,
                },
                score,
            })
        } else {
            st.stats.stale_discarded += 1;
            drop(st);
            log::debug!(
                "[Topic::srt_poll] {} {} stale: age {:?} score {:.4} < {:.4}",
                self.id,
                id,
                age,
                score,
                threshold
            );
            Ok(SrtOutcome::Stale { id, age, score })
        }
    }

    // ------------------------------------------------------------------
    // QoS
    // ------------------------------------------------------------------

    fn handle_violation(&self, violation: QosViolation, hook: Option<RecoveryHook>) -> Result<()> {
        if let Some(hook) = hook {
            log::warn!(
                "[Topic::qos] {} {:?} violation on {} for {} ({:?} vs {:?}), recovering",
                self.id,
                violation.kind,
                violation.subscriber,
                violation.message,
                violation.latency,
                violation.limit
            );
            hook(&violation);
            return Ok(());
        }
        let err = violation.into_error();
        log::error!("[Topic::qos] {} escalating: {}", self.id, err);
        if let Some(core) = self.core.upgrade() {
            core.emergency(err.clone());
        }
        Err(err)
    }

    /// Scan every HRT lane for a queued message older than its deadline and
    /// for silence longer than its expected rate.
    ///
    /// Each message, and each silent period, is reported at most once per lane.
    pub(crate) fn check_deadlines(&self) -> Result<usize> {
        let now = self.clock.now();
        let lanes = self.state.lock().lanes.len();
        let mut found = 0;
        for lane in 0..lanes {
            let (violations, hook) = {
                let mut st = self.state.lock();
                if st.closed {
                    return Ok(found);
                }
                let last_id = st.last_id;
                let entry = &mut st.lanes[lane];
                let violations = entry.watchdog(self.id, last_id, now);
                let hook = entry.qos.recovery.clone();
                for v in &violations {
                    st.count_violation(v.kind);
                }
                (violations, hook)
            };
            for violation in violations {
                found += 1;
                self.handle_violation(violation, hook.clone())?;
            }
        }
        Ok(found)
    }

    // ------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------

    /// Queued HRT deliveries across all lanes.
    pub(crate) fn in_flight(&self) -> usize {
        self.state
            .lock()
            .active_lanes()
            .map(|l| l.queue.len())
            .sum()
    }

    /// Refuse further traffic and wake every blocked receiver.
    pub(crate) fn close(&self) {
        let mut st = self.state.lock();
        st.closed = true;
        for reader in &st.readers {
            reader.notifier.close();
        }
    }

    /// Drop every outstanding reference and return all slots to the pool.
    ///
    /// Returns the number of HRT deliveries that were released without being consumed.
    pub(crate) fn force_release(&self) -> usize {
        let mut st = self.state.lock();
        st.closed = true;
        let mut forced = 0;
        for lane in 0..st.lanes.len() {
            forced += st.drain_lane(lane);
        }
        st.latest = None;
        let leftover = st.pool.reclaim_all();
        if forced > 0 {
            log::warn!(
                "[Topic::force_release] {} dropped {} undelivered HRT message(s), {} slot(s) reclaimed",
                self.id,
                forced,
                leftover
            );
        }
        forced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pubsub::usefulness::Reciprocal;
    use crate::time::ManualClock;

    fn running_topic(cfg: TopicConfig) -> (Arc<Topic>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let lifecycle = Arc::new(Lifecycle::new());
        assert!(lifecycle.transition(
            crate::core::CoreState::Uninitialized,
            crate::core::CoreState::Running
        ));
        let topic = Topic::new(
            TopicId(1),
            cfg,
            Arc::clone(&clock) as Arc<dyn Clock>,
            lifecycle,
            Weak::new(),
        )
        .expect("topic");
        (Arc::new(topic), clock)
    }

    #[test]
    fn test_latest_recycled_without_hrt() {
        let (topic, _clock) = running_topic(TopicConfig::default().with_capacity(1));
        for i in 0..5u8 {
            topic.publish(&[i], Timestamp(u64::from(i))).expect("publish");
        }
        let snap = topic.snapshot();
        assert_eq!(snap.stats.published, 5);
        assert_eq!(snap.free_slots, 0);
        assert_eq!(snap.referenced_slots, 1);
        assert!(snap.is_consistent());
    }

    #[test]
    fn test_exhaustion_with_unconsumed_hrt() {
        let (topic, _clock) = running_topic(TopicConfig::default().with_capacity(3));
        let _hrt = topic.bind_hrt(HrtQos::default()).expect("bind");
        for i in 0..3u8 {
            topic.publish(&[i], Timestamp::ZERO).expect("publish");
        }
        assert_eq!(
            topic.publish(&[9], Timestamp::ZERO),
            Err(Error::PoolExhausted { capacity: 3 })
        );
        let snap = topic.snapshot();
        assert_eq!(snap.stats.publish_failures, 1);
        assert_eq!(snap.in_flight_hrt, 3);
        assert!(snap.is_consistent());
    }

    #[test]
    fn test_backpressure_on_shallow_lane() {
        let cfg = TopicConfig::default()
            .with_capacity(4)
            .with_hrt_queue_depth(1);
        let (topic, _clock) = running_topic(cfg);
        let hrt = topic.bind_hrt(HrtQos::default()).expect("bind");
        topic.publish(b"a", Timestamp::ZERO).expect("first");
        let err = topic.publish(b"b", Timestamp::ZERO).expect_err("lane full");
        assert_eq!(
            err,
            Error::PublishBlocked {
                topic: TopicId(1),
                subscriber: hrt.id()
            }
        );
        // Nothing consumed by the failed publish
        assert_eq!(topic.snapshot().free_slots, 3);
    }

    #[test]
    fn test_srt_poll_stale_then_fresh() {
        let (topic, clock) = running_topic(TopicConfig::default());
        let mut seen = MessageId::INVALID;
        let mut buf = [0u8; 8];

        topic.publish(b"old", Timestamp::ZERO).expect("publish");
        clock.advance(Duration::from_millis(99));
        let out = topic
            .srt_poll(&mut seen, &Reciprocal, 0.1, &mut buf)
            .expect("poll");
        assert!(matches!(out, SrtOutcome::Stale { .. }));
        assert_eq!(out.status(), Status::StaleMessageDiscarded);
        assert_eq!(topic.stats().stale_discarded, 1);

        // Same message is not re-evaluated
        let again = topic
            .srt_poll(&mut seen, &Reciprocal, 0.1, &mut buf)
            .expect("poll");
        assert_eq!(again, SrtOutcome::NoMessage);

        topic.publish(b"new", clock.now()).expect("publish");
        match topic
            .srt_poll(&mut seen, &Reciprocal, 0.1, &mut buf)
            .expect("poll")
        {
            SrtOutcome::Accepted { info, score } => {
                assert_eq!(score, 1.0);
                assert_eq!(&buf[..info.size], b"new");
            }
            other => panic!("expected Accepted, got {:?}", other),
        }
    }

    #[test]
    fn test_force_release_returns_everything() {
        let (topic, _clock) = running_topic(TopicConfig::default().with_capacity(4));
        let _a = topic.bind_hrt(HrtQos::default()).expect("a");
        let _b = topic.bind_hrt(HrtQos::default()).expect("b");
        topic.publish(b"1", Timestamp::ZERO).expect("publish");
        topic.publish(b"2", Timestamp::ZERO).expect("publish");

        assert_eq!(topic.in_flight(), 4);
        assert_eq!(topic.force_release(), 4);
        let snap = topic.snapshot();
        assert_eq!(snap.free_slots, 4);
        assert!(snap.is_consistent());
        assert_eq!(topic.publish(b"3", Timestamp::ZERO), Err(Error::ShuttingDown));
    }

    #[test]
    fn test_watchdog_flags_once_with_recovery() {
        let (topic, clock) = running_topic(TopicConfig::default());
        let qos = HrtQos::with_deadline(Duration::from_millis(5)).recover_with(|_| {});
        let _hrt = topic.bind_hrt(qos).expect("bind");
        topic.publish(b"x", clock.now()).expect("publish");

        assert_eq!(topic.check_deadlines(), Ok(0));
        clock.advance(Duration::from_millis(6));
        assert_eq!(topic.check_deadlines(), Ok(1));
        assert_eq!(topic.check_deadlines(), Ok(0));
        assert_eq!(topic.stats().deadline_misses, 1);
    }

    #[test]
    fn test_watchdog_report_not_repeated_on_receive() {
        let (topic, clock) = running_topic(TopicConfig::default());
        let hits = Arc::new(AtomicU32::new(0));
        let h = Arc::clone(&hits);
        let qos = HrtQos::with_deadline(Duration::from_millis(2)).recover_with(move |_| {
            h.fetch_add(1, Ordering::Relaxed);
        });
        let mut hrt = topic.bind_hrt(qos).expect("bind");
        topic.publish(b"late", clock.now()).expect("publish");
        clock.advance(Duration::from_millis(3));

        assert_eq!(topic.check_deadlines(), Ok(1));
        let mut buf = [0u8; 8];
        let info = hrt.try_receive(&mut buf).expect("receive").expect("queued");
        assert_eq!(info.latency, Duration::from_millis(3));
        assert_eq!(hits.load(Ordering::Relaxed), 1);
        assert_eq!(topic.stats().deadline_misses, 1);
    }

    #[test]
    fn test_jitter_outside_band_recovers() {
        let (topic, clock) = running_topic(TopicConfig::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let qos = HrtQos::default()
            .jitter(Duration::from_millis(2))
            .recover_with(move |v| s.lock().push((v.kind, v.latency)));
        let mut hrt = topic.bind_hrt(qos).expect("bind");
        let mut buf = [0u8; 8];

        for delay in [5, 6, 9, 4] {
            topic.publish(b"j", clock.now()).expect("publish");
            clock.advance(Duration::from_millis(delay));
            hrt.try_receive(&mut buf).expect("receive").expect("queued");
        }
        assert_eq!(
            *seen.lock(),
            vec![(ViolationKind::Jitter, Duration::from_millis(9))]
        );
        let stats = topic.stats();
        assert_eq!(stats.jitter_violations, 1);
        assert_eq!(stats.deadline_misses, 0);
        assert_eq!(stats.hrt_delivered, 4);
    }

    #[test]
    fn test_rate_silence_reported_once_per_gap() {
        let (topic, clock) = running_topic(TopicConfig::default());
        let hits = Arc::new(AtomicU32::new(0));
        let h = Arc::clone(&hits);
        let qos = HrtQos::default()
            .rate(Duration::from_millis(10))
            .recover_with(move |v| {
                assert_eq!(v.kind, ViolationKind::Rate);
                h.fetch_add(1, Ordering::Relaxed);
            });
        let _hrt = topic.bind_hrt(qos).expect("bind");

        clock.advance(Duration::from_millis(5));
        assert_eq!(topic.check_deadlines(), Ok(0));
        clock.advance(Duration::from_millis(6));
        assert_eq!(topic.check_deadlines(), Ok(1));
        assert_eq!(topic.check_deadlines(), Ok(0));

        // A new arrival restarts the window.
        topic.publish(b"r", clock.now()).expect("publish");
        clock.advance(Duration::from_millis(10));
        assert_eq!(topic.check_deadlines(), Ok(0));
        clock.advance(Duration::from_millis(1));
        assert_eq!(topic.check_deadlines(), Ok(1));

        assert_eq!(hits.load(Ordering::Relaxed), 2);
        assert_eq!(topic.stats().rate_violations, 2);
    }

    #[test]
    fn test_rate_silence_without_recovery_escalates() {
        let (topic, clock) = running_topic(TopicConfig::default());
        let hrt = topic
            .bind_hrt(HrtQos::default().rate(Duration::from_millis(1)))
            .expect("bind");
        clock.advance(Duration::from_millis(2));
        let err = topic.check_deadlines().expect_err("silence");
        assert_eq!(
            err,
            Error::HrtRateViolation {
                topic: TopicId(1),
                subscriber: hrt.id(),
                silence: Duration::from_millis(2),
                rate: Duration::from_millis(1),
            }
        );
    }

    #[test]
    fn test_rebinding_reuses_lanes() {
        let (topic, clock) = running_topic(TopicConfig::default().with_capacity(4));
        let mut keep = topic.bind_hrt(HrtQos::default()).expect("keep");
        let mut buf = [0u8; 8];
        for _ in 0..16 {
            let hrt = topic.bind_hrt(HrtQos::default()).expect("bind");
            topic.publish(b"c", clock.now()).expect("publish");
            drop(hrt);
            keep.try_receive(&mut buf).expect("receive").expect("queued");
        }
        assert_eq!(topic.state.lock().lanes.len(), 2);

        // A reused lane starts empty and receives new traffic.
        let mut fresh = topic.bind_hrt(HrtQos::default()).expect("fresh");
        assert_eq!(fresh.try_receive(&mut buf), Ok(None));
        topic.publish(b"z", clock.now()).expect("publish");
        let info = fresh.try_receive(&mut buf).expect("receive").expect("queued");
        assert_eq!(&buf[..info.size], b"z");
        assert_eq!(topic.state.lock().lanes.len(), 2);
        assert!(topic.snapshot().is_consistent());
    }
}
