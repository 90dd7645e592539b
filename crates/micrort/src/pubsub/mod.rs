// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Publish/subscribe: topics, publishers, HRT/SRT subscribers, usefulness and QoS.

mod publisher;
pub mod qos;
mod subscriber;
mod topic;
pub mod usefulness;

pub use publisher::Publisher;
pub use qos::{DetectedAt, HrtQos, QosViolation, RecoveryHook, ViolationKind};
pub use subscriber::{HrtSubscriber, SrtSubscriber, SubscriberStats};
pub use topic::{MessageInfo, SrtOutcome, SubscriberKind, Topic, TopicSnapshot, TopicStats};
pub use usefulness::{Always, Cutoff, HalfLife, LinearDecay, Reciprocal, Usefulness};
