// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Exclusive publishing right on one topic.

use super::topic::Topic;
use crate::error::Result;
use crate::types::{MessageId, Timestamp, TopicId};
use std::fmt;
use std::sync::Arc;

/// The single publisher of a topic.
///
/// Obtained from [`Core::publisher`](crate::Core::publisher). Dropping it frees
/// the topic for another publisher.
pub struct Publisher {
    topic: Arc<Topic>,
}

impl Publisher {
    pub(crate) fn new(topic: Arc<Topic>) -> Self {
        Self { topic }
    }

    pub fn topic_id(&self) -> TopicId {
        self.topic.id()
    }

    /// Publish `payload` stamped with `timestamp`.
    ///
    /// Non-blocking. Fails with `PoolExhausted` when no slot is free,
    /// `PublishBlocked` when an HRT lane is full, `PayloadTooLarge`, or
    /// `NotRunning`/`ShuttingDown` outside steady state.
    pub fn publish(&self, payload: &[u8], timestamp: Timestamp) -> Result<MessageId> {
        self.topic.publish(payload, timestamp)
    }

    /// Publish stamped with the core clock's current time.
    pub fn publish_now(&self, payload: &[u8]) -> Result<MessageId> {
        let now = self.topic.now();
        self.topic.publish(payload, now)
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        self.topic.unbind_publisher();
    }
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("topic", &self.topic.id())
            .finish()
    }
}
