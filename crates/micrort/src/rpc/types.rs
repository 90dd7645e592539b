// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Request/response correlation types.

use crate::types::{CallId, Timestamp};
use std::time::Duration;

/// Status carried by a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum ReplyStatus {
    /// Request processed successfully
    #[default]
    Ok = 0,
    /// Operation not provided by this service
    UnsupportedMethod = 1,
    /// Request payload rejected
    InvalidArgument = 2,
    /// Server could not obtain resources to answer
    OutOfResources = 3,
    /// Server went away before answering
    ServiceUnavailable = 4,
    /// Handler failed
    InternalError = 5,
    /// Unknown/custom error
    Unknown = -1,
}

impl ReplyStatus {
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => Self::Ok,
            1 => Self::UnsupportedMethod,
            2 => Self::InvalidArgument,
            3 => Self::OutOfResources,
            4 => Self::ServiceUnavailable,
            5 => Self::InternalError,
            _ => Self::Unknown,
        }
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}

/// Successful call result. The response payload was copied into the caller's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply {
    pub call: CallId,
    pub size: usize,
    /// Submission to response pickup, measured on the core clock.
    pub round_trip: Duration,
}

/// A request handed to the server by `dispatch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchedCall {
    pub call: CallId,
    pub size: usize,
    pub submitted_at: Timestamp,
    /// Time the request spent queued.
    pub queue_latency: Duration,
    /// Sent with [`ServiceClient::send`](crate::ServiceClient::send): nobody
    /// waits for a response and the call is already complete.
    pub one_way: bool,
}

/// Whether a response reached its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RespondOutcome {
    Delivered,
    /// Caller had already timed out. Slots were released by the service.
    Discarded,
}

/// Cumulative service counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceStats {
    pub submitted: u64,
    pub dispatched: u64,
    pub completed: u64,
    pub timeouts: u64,
    pub late_discarded: u64,
    pub remote_errors: u64,
    pub rejected: u64,
    pub latency_min: Option<Duration>,
    pub latency_max: Option<Duration>,
    pub latency_sum: Duration,
}

impl ServiceStats {
    pub(crate) fn record_latency(&mut self, latency: Duration) {
        self.latency_sum = self.latency_sum.saturating_add(latency);
        self.latency_min = Some(self.latency_min.map_or(latency, |m| m.min(latency)));
        self.latency_max = Some(self.latency_max.map_or(latency, |m| m.max(latency)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_status_roundtrip() {
        for status in [
            ReplyStatus::Ok,
            ReplyStatus::UnsupportedMethod,
            ReplyStatus::InvalidArgument,
            ReplyStatus::OutOfResources,
            ReplyStatus::ServiceUnavailable,
            ReplyStatus::InternalError,
            ReplyStatus::Unknown,
        ] {
            assert_eq!(ReplyStatus::from_i32(status.as_i32()), status);
        }
        assert_eq!(ReplyStatus::from_i32(42), ReplyStatus::Unknown);
        assert!(ReplyStatus::default().is_ok());
    }
}
