// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RPC client (requester).
//!
//! A client submits a request into the service's call table and blocks on the
//! call's own notifier until the response is picked up or the timeout fires.
//! `ServiceClient` is `Sync`: several threads may call through one client,
//! each call is correlated by its own [`CallId`](crate::CallId).

use super::service::Service;
use super::types::Reply;
use crate::error::Result;
use crate::rt::deadline_after;
use crate::types::{CallId, ServiceId};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Handle for calling one service.
///
/// # Example
///
/// ```rust,no_run
/// use micrort::{Core, ServiceId};
/// use std::time::Duration;
///
/// # fn example() -> micrort::Result<()> {
/// let core = Core::builder().build()?;
/// core.add_service(ServiceId(1))?;
/// core.start()?;
///
/// let client = core.client(ServiceId(1))?;
/// let mut response = [0u8; 64];
/// let reply = client.call_timeout(b"ping", &mut response, Duration::from_millis(20))?;
/// println!("{} bytes back", reply.size);
/// # Ok(())
/// # }
/// ```
pub struct ServiceClient {
    service: Arc<Service>,
    default_timeout: Duration,
}

impl ServiceClient {
    pub(crate) fn new(service: Arc<Service>, default_timeout: Duration) -> Self {
        Self {
            service,
            default_timeout,
        }
    }

    pub fn service_id(&self) -> ServiceId {
        self.service.id()
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Call with the core's configured RPC timeout.
    pub fn call(&self, request: &[u8], response: &mut [u8]) -> Result<Reply> {
        self.call_timeout(request, response, self.default_timeout)
    }

    /// Submit `request` and block until the response is copied into `response`.
    ///
    /// On `RpcTimeout` no slot stays reserved on behalf of this call: a queued
    /// request is withdrawn, and a request the server already took is marked
    /// abandoned so its eventual response is discarded.
    pub fn call_timeout(&self, request: &[u8], response: &mut [u8], timeout: Duration) -> Result<Reply> {
        let deadline = deadline_after(timeout);
        let pending = self.service.submit(request)?;
        #[cfg(feature = "trace")]
        log::trace!("[ServiceClient::call] {} {} submitted", self.service.id(), pending.call);
        self.service.await_reply(&pending, response, deadline, timeout)
    }

    /// Queue `request` without waiting for, or reserving room for, a response.
    ///
    /// The server sees the call with [`DispatchedCall::one_way`] set and does
    /// not answer it.
    ///
    /// [`DispatchedCall::one_way`]: crate::DispatchedCall::one_way
    pub fn send(&self, request: &[u8]) -> Result<CallId> {
        let call = self.service.send(request)?;
        #[cfg(feature = "trace")]
        log::trace!("[ServiceClient::send] {} {} queued", self.service.id(), call);
        Ok(call)
    }
}

impl fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceClient")
            .field("service", &self.service.id())
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}
