// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HRT and SRT subscribers.
//!
//! Both copy payloads into a caller-provided buffer, so nothing is allocated
//! on the receive path. Blocking forms wait on the subscriber's own notifier.

use super::topic::{MessageInfo, SrtOutcome, Topic};
use super::usefulness::Usefulness;
use crate::error::{Error, Result};
use crate::rt::{deadline_after, Notifier, Wake};
use crate::types::{MessageId, SubscriberId, TopicId};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Latency statistics kept by each subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriberStats {
    pub received: u64,
    pub stale_discarded: u64,
    pub skipped: u64,
    pub latency_min: Option<Duration>,
    pub latency_max: Option<Duration>,
    pub latency_sum: Duration,
}

impl SubscriberStats {
    fn record(&mut self, latency: Duration) {
        self.received += 1;
        self.latency_sum = self.latency_sum.saturating_add(latency);
        self.latency_min = Some(self.latency_min.map_or(latency, |m| m.min(latency)));
        self.latency_max = Some(self.latency_max.map_or(latency, |m| m.max(latency)));
    }

    pub fn latency_mean(&self) -> Option<Duration> {
        let n = u32::try_from(self.received).ok().filter(|n| *n > 0)?;
        Some(self.latency_sum / n)
    }
}

// ============================================================================
// HRT
// ============================================================================

/// Hard real-time subscriber: sees every message published after it was bound,
/// in publish order.
pub struct HrtSubscriber {
    topic: Arc<Topic>,
    id: SubscriberId,
    lane: usize,
    notifier: Arc<Notifier>,
    stats: SubscriberStats,
}

impl HrtSubscriber {
    pub(crate) fn new(
        topic: Arc<Topic>,
        id: SubscriberId,
        lane: usize,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            topic,
            id,
            lane,
            notifier,
            stats: SubscriberStats::default(),
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn topic_id(&self) -> TopicId {
        self.topic.id()
    }

    pub fn stats(&self) -> SubscriberStats {
        self.stats
    }

    /// Take the next queued message, if any.
    ///
    /// On a deadline or jitter violation without a recovery hook the message
    /// is still consumed, the core enters emergency shutdown, and the matching
    /// error (`HrtDeadlineMissed` or `HrtJitterViolation`) is returned.
    pub fn try_receive(&mut self, buf: &mut [u8]) -> Result<Option<MessageInfo>> {
        let received = self.topic.hrt_try_receive(self.lane, buf);
        if let Ok(Some(info)) = &received {
            self.stats.record(info.latency);
        }
        received
    }

    /// Block until the next message arrives or `timeout` elapses.
    pub fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<MessageInfo> {
        let deadline = deadline_after(timeout);
        loop {
            if let Some(info) = self.try_receive(buf)? {
                return Ok(info);
            }
            match self.notifier.wait_until(deadline) {
                Wake::Notified => {}
                Wake::Closed => return Err(Error::ShuttingDown),
                Wake::TimedOut => return Err(Error::ReceiveTimeout),
            }
        }
    }

    /// Consume every queued message and copy only the newest.
    pub fn receive_latest(&mut self, buf: &mut [u8]) -> Result<Option<MessageInfo>> {
        let received = self.topic.hrt_receive_latest(self.lane, buf)?;
        Ok(received.map(|(info, skipped)| {
            self.stats.skipped += skipped as u64;
            self.stats.record(info.latency);
            info
        }))
    }
}

impl Drop for HrtSubscriber {
    fn drop(&mut self) {
        self.topic.unbind_hrt(self.lane, self.id);
    }
}

impl fmt::Debug for HrtSubscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HrtSubscriber")
            .field("topic", &self.topic.id())
            .field("id", &self.id)
            .field("lane", &self.lane)
            .finish()
    }
}

// ============================================================================
// SRT
// ============================================================================

/// Soft real-time subscriber: sees only the newest message and skips it when
/// its usefulness falls below the threshold.
pub struct SrtSubscriber {
    topic: Arc<Topic>,
    id: SubscriberId,
    notifier: Arc<Notifier>,
    evaluator: Box<dyn Usefulness>,
    threshold: f64,
    last_seen: MessageId,
    stats: SubscriberStats,
}

impl SrtSubscriber {
    pub(crate) fn new(
        topic: Arc<Topic>,
        id: SubscriberId,
        notifier: Arc<Notifier>,
        evaluator: Box<dyn Usefulness>,
        threshold: f64,
    ) -> Self {
        Self {
            topic,
            id,
            notifier,
            evaluator,
            threshold,
            last_seen: MessageId::INVALID,
            stats: SubscriberStats::default(),
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn topic_id(&self) -> TopicId {
        self.topic.id()
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn stats(&self) -> SubscriberStats {
        self.stats
    }

    /// Evaluate the newest message without blocking.
    pub fn poll(&mut self, buf: &mut [u8]) -> Result<SrtOutcome> {
        let outcome =
            self.topic
                .srt_poll(&mut self.last_seen, &*self.evaluator, self.threshold, buf)?;
        match outcome {
            SrtOutcome::Accepted { info, .. } => self.stats.record(info.latency),
            SrtOutcome::Stale { .. } => self.stats.stale_discarded += 1,
            SrtOutcome::NoMessage => {}
        }
        Ok(outcome)
    }

    /// Block until a useful message arrives or `timeout` elapses.
    ///
    /// Stale messages seen meanwhile are counted and skipped. Returns the
    /// accepted message and its score.
    pub fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<(MessageInfo, f64)> {
        let deadline = deadline_after(timeout);
        loop {
            match self.poll(buf)? {
                SrtOutcome::Accepted { info, score } => return Ok((info, score)),
                SrtOutcome::Stale { .. } | SrtOutcome::NoMessage => {}
            }
            match self.notifier.wait_until(deadline) {
                Wake::Notified => {}
                Wake::Closed => return Err(Error::ShuttingDown),
                Wake::TimedOut => return Err(Error::ReceiveTimeout),
            }
        }
    }
}

impl Drop for SrtSubscriber {
    fn drop(&mut self) {
        self.topic.unbind_reader(self.id);
    }
}

impl fmt::Debug for SrtSubscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SrtSubscriber")
            .field("topic", &self.topic.id())
            .field("id", &self.id)
            .field("threshold", &self.threshold)
            .field("last_seen", &self.last_seen)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_record() {
        let mut s = SubscriberStats::default();
        assert_eq!(s.latency_mean(), None);
        s.record(Duration::from_micros(10));
        s.record(Duration::from_micros(30));
        assert_eq!(s.received, 2);
        assert_eq!(s.latency_min, Some(Duration::from_micros(10)));
        assert_eq!(s.latency_max, Some(Duration::from_micros(30)));
        assert_eq!(s.latency_mean(), Some(Duration::from_micros(20)));
    }
}
