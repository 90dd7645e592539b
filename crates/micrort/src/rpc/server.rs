// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RPC server (replier).
//!
//! At most one server is bound per service. Requests can be handled manually
//! (`dispatch` then `respond`) or through a [`RequestHandler`] with
//! [`ServiceServer::serve_one`], which works out of buffers allocated once at
//! bind time.

use super::service::Service;
use super::types::{DispatchedCall, ReplyStatus, RespondOutcome};
use crate::error::Result;
use crate::rt::deadline_after;
use crate::types::{CallId, ServiceId};
use std::fmt;
use std::result::Result as StdResult;
use std::sync::Arc;
use std::time::Duration;

/// Handler trait for processing RPC requests.
pub trait RequestHandler: Send + Sync {
    /// Handle `request` and write the response into `response`.
    ///
    /// Returns the response length, or the status to report to the caller.
    fn handle(&self, call: CallId, request: &[u8], response: &mut [u8]) -> StdResult<usize, ReplyStatus>;
}

/// A function-based request handler.
impl<F> RequestHandler for F
where
    F: Fn(CallId, &[u8], &mut [u8]) -> StdResult<usize, ReplyStatus> + Send + Sync,
{
    fn handle(&self, call: CallId, request: &[u8], response: &mut [u8]) -> StdResult<usize, ReplyStatus> {
        self(call, request, response)
    }
}

/// Server side of one service.
///
/// Dropping the server answers every call it dispatched but did not answer
/// with [`ReplyStatus::ServiceUnavailable`].
pub struct ServiceServer {
    service: Arc<Service>,
    request_buf: Box<[u8]>,
    response_buf: Box<[u8]>,
    served: u64,
}

impl ServiceServer {
    pub(crate) fn bind(service: Arc<Service>) -> Result<Self> {
        service.try_bind_server()?;
        let max = service.config().max_payload;
        log::debug!("[ServiceServer::bind] {} bound", service.id());
        Ok(Self {
            service,
            request_buf: vec![0u8; max].into_boxed_slice(),
            response_buf: vec![0u8; max].into_boxed_slice(),
            served: 0,
        })
    }

    pub fn service_id(&self) -> ServiceId {
        self.service.id()
    }

    /// Calls completed through [`serve_one`](Self::serve_one).
    pub fn served(&self) -> u64 {
        self.served
    }

    /// Take the oldest pending request without blocking.
    pub fn dispatch(&self, buf: &mut [u8]) -> Result<Option<DispatchedCall>> {
        self.service.dispatch(buf)
    }

    /// Wait up to `timeout` for a request. `Ok(None)` means none arrived.
    pub fn dispatch_timeout(&self, buf: &mut [u8], timeout: Duration) -> Result<Option<DispatchedCall>> {
        self.service.dispatch_until(buf, deadline_after(timeout))
    }

    /// Answer a dispatched call.
    ///
    /// Returns [`RespondOutcome::Discarded`] when the caller already timed out.
    pub fn respond(&self, call: CallId, result: &[u8], status: ReplyStatus) -> Result<RespondOutcome> {
        self.service.respond(call, result, status)
    }

    /// Wait up to `timeout` for one request, run `handler` on it, and respond.
    ///
    /// One-way calls run the handler but get no response.
    /// Returns `false` when no request arrived in time.
    pub fn serve_one<H: RequestHandler + ?Sized>(&mut self, handler: &H, timeout: Duration) -> Result<bool> {
        let Some(dispatched) = self
            .service
            .dispatch_until(&mut self.request_buf, deadline_after(timeout))?
        else {
            return Ok(false);
        };

        let request = &self.request_buf[..dispatched.size];
        let (len, status) = match handler.handle(dispatched.call, request, &mut self.response_buf) {
            Ok(len) if len <= self.response_buf.len() => (len, ReplyStatus::Ok),
            Ok(len) => {
                log::warn!(
                    "[ServiceServer::serve_one] {} handler reported {} bytes for a {}-byte buffer",
                    self.service.id(),
                    len,
                    self.response_buf.len()
                );
                (0, ReplyStatus::InternalError)
            }
            Err(status) => (0, status),
        };

        if dispatched.one_way {
            if !status.is_ok() {
                log::debug!(
                    "[ServiceServer::serve_one] {} one-way {} failed: {:?}",
                    self.service.id(),
                    dispatched.call,
                    status
                );
            }
            self.served += 1;
            return Ok(true);
        }

        self.service
            .respond(dispatched.call, &self.response_buf[..len], status)?;
        self.served += 1;
        Ok(true)
    }
}

impl Drop for ServiceServer {
    fn drop(&mut self) {
        self.service.abort_dispatched();
        self.service.unbind_server();
        log::debug!("[ServiceServer::drop] {} unbound", self.service.id());
    }
}

impl fmt::Debug for ServiceServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceServer")
            .field("service", &self.service.id())
            .field("served", &self.served)
            .finish()
    }
}
