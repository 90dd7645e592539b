// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Request/response services.
//!
//! # Architecture
//!
//! ```text
//! ServiceClient ──submit──> [call table + request queue] ──dispatch──> ServiceServer
//!       ^                        (service slot pool)                        │
//!       └─────────────── pickup <── response slot <──────── respond ────────┘
//! ```
//!
//! Calls are correlated by [`CallId`](crate::CallId). A caller that times out
//! leaves nothing behind: late responses are dropped and counted in
//! [`ServiceStats::late_discarded`].

mod client;
mod server;
mod service;
mod types;

pub use client::ServiceClient;
pub use server::{RequestHandler, ServiceServer};
pub use service::Service;
pub use types::{DispatchedCall, Reply, ReplyStatus, RespondOutcome, ServiceStats};
