// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HRT delivery QoS: deadline, jitter and rate monitoring with recovery.
//!
//! - A deadline bounds the time between a message's publish timestamp and its
//!   consumption by one HRT subscriber. It is checked at consumption and by
//!   [`Core::check_deadlines`](crate::Core::check_deadlines) while the message
//!   is still queued.
//! - A jitter bound limits the spread between the lowest and highest latency
//!   a subscriber observes. It is checked at consumption.
//! - An expected rate bounds the silence between two messages reaching a
//!   subscriber. It is checked by the watchdog.
//!
//! Without a recovery hook a violation escalates to an emergency shutdown.

use crate::error::Error;
use crate::types::{MessageId, SubscriberId, TopicId};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Where the violation was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedAt {
    /// On `receive`, latency measured at consumption.
    Consumption,
    /// By the periodic watchdog.
    Watchdog,
}

/// Which QoS bound was broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    Deadline,
    Jitter,
    Rate,
}

/// One HRT QoS violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QosViolation {
    pub topic: TopicId,
    pub subscriber: SubscriberId,
    pub kind: ViolationKind,
    /// Offending message. For rate violations, the last message the
    /// subscriber received ([`MessageId::INVALID`] if none).
    pub message: MessageId,
    /// Delivery latency, or the silence for rate violations.
    pub latency: Duration,
    /// The configured bound (deadline, jitter or rate).
    pub limit: Duration,
    pub detected_at: DetectedAt,
}

impl QosViolation {
    pub fn into_error(self) -> Error {
        match self.kind {
            ViolationKind::Deadline => Error::HrtDeadlineMissed {
                topic: self.topic,
                message: self.message,
                latency: self.latency,
                deadline: self.limit,
            },
            ViolationKind::Jitter => Error::HrtJitterViolation {
                topic: self.topic,
                message: self.message,
                latency: self.latency,
                jitter: self.limit,
            },
            ViolationKind::Rate => Error::HrtRateViolation {
                topic: self.topic,
                subscriber: self.subscriber,
                silence: self.latency,
                rate: self.limit,
            },
        }
    }
}

/// Handles a violation instead of escalating it.
pub type RecoveryHook = Arc<dyn Fn(&QosViolation) + Send + Sync>;

/// QoS attached to an HRT subscriber.
#[derive(Clone, Default)]
pub struct HrtQos {
    pub deadline: Option<Duration>,
    /// Largest allowed spread between observed latencies.
    pub max_jitter: Option<Duration>,
    /// Longest allowed silence between two messages.
    pub expected_rate: Option<Duration>,
    pub recovery: Option<RecoveryHook>,
}

impl HrtQos {
    /// No timing monitoring.
    pub fn best_effort_timing() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Duration) -> Self {
        Self {
            deadline: Some(deadline),
            ..Self::default()
        }
    }

    pub fn jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = Some(max_jitter);
        self
    }

    pub fn rate(mut self, expected_rate: Duration) -> Self {
        self.expected_rate = Some(expected_rate);
        self
    }

    pub fn recover_with<F>(mut self, hook: F) -> Self
    where
        F: Fn(&QosViolation) + Send + Sync + 'static,
    {
        self.recovery = Some(Arc::new(hook));
        self
    }

    /// `Some(deadline)` if `latency` breaks it.
    pub(crate) fn exceeded(&self, latency: Duration) -> Option<Duration> {
        self.deadline.filter(|d| latency > *d)
    }

    /// `Some(rate)` if `silence` breaks it.
    pub(crate) fn rate_exceeded(&self, silence: Duration) -> Option<Duration> {
        self.expected_rate.filter(|r| silence > *r)
    }
}

impl fmt::Debug for HrtQos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HrtQos")
            .field("deadline", &self.deadline)
            .field("max_jitter", &self.max_jitter)
            .field("expected_rate", &self.expected_rate)
            .field("recovery", &self.recovery.is_some())
            .finish()
    }
}

/// Latency band observed by one subscriber.
///
/// The band only widens while its spread stays within the jitter bound; a
/// latency outside the band is a violation.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct JitterWindow {
    bounds: Option<(Duration, Duration)>,
}

impl JitterWindow {
    /// Record `latency`. Returns `true` if it breaks `max_jitter`.
    pub(crate) fn admit(&mut self, latency: Duration, max_jitter: Duration) -> bool {
        let (min, max) = self.bounds.get_or_insert((latency, latency));
        if latency < *min && max.saturating_sub(latency) <= max_jitter {
            *min = latency;
        }
        if latency > *max && latency.saturating_sub(*min) <= max_jitter {
            *max = latency;
        }
        latency < *min || latency > *max
    }
}
