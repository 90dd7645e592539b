// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error and status codes.
//!
//! Every fallible operation returns [`Result`]. [`Error::status`] maps each
//! error onto the flat [`Status`] code set for hosts that only carry a byte.

use crate::core::CoreState;
use crate::rpc::ReplyStatus;
use crate::types::{CallId, MessageId, ServiceId, SubscriberId, TopicId};
use std::fmt;
use std::time::Duration;

/// Result type for micrort operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by pool, registry, delivery, RPC and lifecycle operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    // ========================================================================
    // Resource Errors
    // ========================================================================
    /// No free message slot.
    PoolExhausted { capacity: usize },
    /// An HRT subscriber queue is full; publishing would drop a message.
    PublishBlocked {
        topic: TopicId,
        subscriber: SubscriberId,
    },
    /// Payload exceeds the configured slot size.
    PayloadTooLarge { size: usize, max: usize },
    /// Caller buffer cannot hold the message. Nothing was consumed.
    BufferTooSmall { needed: usize, available: usize },
    /// Release of a slot still referenced by HRT consumers.
    SlotInUse { slot: u16, pending: u32 },
    /// Release of a slot that is already free.
    SlotNotAcquired(u16),

    // ========================================================================
    // Registry Errors
    // ========================================================================
    InvalidTopic(TopicId),
    InvalidService(ServiceId),
    TopicDuplicate(TopicId),
    ServiceDuplicate(ServiceId),
    /// Topic already has its publisher.
    PublisherAlreadyBound(TopicId),
    /// Service already has its server.
    ServerAlreadyBound(ServiceId),

    // ========================================================================
    // Delivery / RPC Errors
    // ========================================================================
    /// Blocking receive ran out of time.
    ReceiveTimeout,
    /// No response arrived before the call deadline.
    RpcTimeout {
        service: ServiceId,
        call: CallId,
        timeout: Duration,
    },
    /// Server answered with a non-`Ok` status.
    RemoteException {
        service: ServiceId,
        call: CallId,
        status: ReplyStatus,
    },
    /// Respond for a call that is not awaiting a response.
    InvalidCall(CallId),

    // ========================================================================
    // Real-time / Lifecycle Errors
    // ========================================================================
    /// HRT delivery latency exceeded its deadline.
    HrtDeadlineMissed {
        topic: TopicId,
        message: MessageId,
        latency: Duration,
        deadline: Duration,
    },
    /// HRT latency left the band allowed by the jitter bound.
    HrtJitterViolation {
        topic: TopicId,
        message: MessageId,
        latency: Duration,
        jitter: Duration,
    },
    /// HRT subscriber received nothing within its expected rate.
    HrtRateViolation {
        topic: TopicId,
        subscriber: SubscriberId,
        silence: Duration,
        rate: Duration,
    },
    /// Operation requires the `Running` state.
    NotRunning(CoreState),
    /// Core is shutting down or stopped.
    ShuttingDown,
    InvalidState(String),
    /// Node setup or step failed fatally.
    NodeFailed { node: String, reason: String },
    /// Invalid configuration or unreadable config file.
    Config(String),
}

impl Error {
    /// Fatal errors escalate to an emergency shutdown.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::HrtDeadlineMissed { .. }
                | Self::HrtJitterViolation { .. }
                | Self::HrtRateViolation { .. }
                | Self::NodeFailed { .. }
        )
    }

    /// Recoverable by retrying later (backoff).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::PoolExhausted { .. }
                | Self::PublishBlocked { .. }
                | Self::ReceiveTimeout
                | Self::RpcTimeout { .. }
        )
    }

    pub fn status(&self) -> Status {
        match self {
            Self::PoolExhausted { .. } => Status::PoolExhausted,
            Self::PublishBlocked { .. } => Status::PublishBlocked,
            Self::PayloadTooLarge { .. } | Self::BufferTooSmall { .. } => Status::SizeMismatch,
            Self::SlotInUse { .. } | Self::SlotNotAcquired(_) => Status::SlotMisuse,
            Self::InvalidTopic(_) => Status::InvalidTopic,
            Self::InvalidService(_) => Status::InvalidService,
            Self::TopicDuplicate(_) => Status::TopicDuplicate,
            Self::ServiceDuplicate(_) => Status::ServiceDuplicate,
            Self::PublisherAlreadyBound(_) | Self::ServerAlreadyBound(_) => Status::AlreadyBound,
            Self::ReceiveTimeout => Status::NoMessage,
            Self::RpcTimeout { .. } => Status::RpcTimeout,
            Self::RemoteException { .. } => Status::RemoteException,
            Self::InvalidCall(_) => Status::InvalidCall,
            Self::HrtDeadlineMissed { .. } => Status::DeadlineViolation,
            Self::HrtJitterViolation { .. } => Status::JitterViolation,
            Self::HrtRateViolation { .. } => Status::RateViolation,
            Self::NotRunning(_) | Self::InvalidState(_) => Status::InvalidState,
            Self::ShuttingDown => Status::ShuttingDown,
            Self::NodeFailed { .. } => Status::NodeFailed,
            Self::Config(_) => Status::ConfigError,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PoolExhausted { capacity } => {
                write!(f, "Message pool exhausted (all {} slots held)", capacity)
            }
            Self::PublishBlocked { topic, subscriber } => {
                write!(f, "Publish on {} blocked: {} queue full", topic, subscriber)
            }
            Self::PayloadTooLarge { size, max } => {
                write!(f, "Payload of {} bytes exceeds slot size {}", size, max)
            }
            Self::BufferTooSmall { needed, available } => write!(
                f,
                "Buffer too small: need {} bytes, have {}",
                needed, available
            ),
            Self::SlotInUse { slot, pending } => write!(
                f,
                "Slot {} released with {} HRT consumer(s) pending",
                slot, pending
            ),
            Self::SlotNotAcquired(slot) => write!(f, "Slot {} released twice", slot),
            Self::InvalidTopic(id) => write!(f, "Unknown {}", id),
            Self::InvalidService(id) => write!(f, "Unknown {}", id),
            Self::TopicDuplicate(id) => write!(f, "{} already registered", id),
            Self::ServiceDuplicate(id) => write!(f, "{} already registered", id),
            Self::PublisherAlreadyBound(id) => write!(f, "{} already has a publisher", id),
            Self::ServerAlreadyBound(id) => write!(f, "{} already has a server", id),
            Self::ReceiveTimeout => write!(f, "Receive timed out"),
            Self::RpcTimeout {
                service,
                call,
                timeout,
            } => write!(f, "{} on {} timed out after {:?}", call, service, timeout),
            Self::RemoteException {
                service,
                call,
                status,
            } => write!(f, "{} on {} failed remotely: {:?}", call, service, status),
            Self::InvalidCall(call) => write!(f, "{} is not awaiting a response", call),
            Self::HrtDeadlineMissed {
                topic,
                message,
                latency,
                deadline,
            } => write!(
                f,
                "HRT deadline missed on {} for {}: latency {:?} > deadline {:?}",
                topic, message, latency, deadline
            ),
            Self::HrtJitterViolation {
                topic,
                message,
                latency,
                jitter,
            } => write!(
                f,
                "HRT jitter exceeded on {} for {}: latency {:?} outside {:?} band",
                topic, message, latency, jitter
            ),
            Self::HrtRateViolation {
                topic,
                subscriber,
                silence,
                rate,
            } => write!(
                f,
                "HRT rate missed on {} for {}: silent {:?} > rate {:?}",
                topic, subscriber, silence, rate
            ),
            Self::NotRunning(state) => write!(f, "Core not running (state: {:?})", state),
            Self::ShuttingDown => write!(f, "Core is shutting down"),
            Self::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Self::NodeFailed { node, reason } => write!(f, "Node '{}' failed: {}", node, reason),
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

/// Flat status code set.
///
/// `Ok` and `StaleMessageDiscarded` are outcomes with no [`Error`] counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Status {
    Ok = 0x00,
    PoolExhausted = 0x01,
    PublishBlocked = 0x02,
    NoMessage = 0x03,
    StaleMessageDiscarded = 0x04,
    SizeMismatch = 0x05,
    SlotMisuse = 0x06,
    InvalidTopic = 0x07,
    InvalidService = 0x08,
    TopicDuplicate = 0x09,
    ServiceDuplicate = 0x0A,
    AlreadyBound = 0x0B,
    RpcTimeout = 0x0C,
    RemoteException = 0x0D,
    InvalidCall = 0x0E,
    DeadlineViolation = 0x10,
    ShuttingDown = 0x11,
    InvalidState = 0x12,
    NodeFailed = 0x13,
    ConfigError = 0x14,
    JitterViolation = 0x15,
    RateViolation = 0x16,
}

impl Status {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_ok(self) -> bool {
        matches!(self, Self::Ok | Self::StaleMessageDiscarded)
    }
}

impl<T> From<&Result<T>> for Status {
    fn from(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Status::Ok,
            Err(e) => e.status(),
        }
    }
}
