// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # micrort - real-time publish/subscribe and RPC core
//!
//! Intra-process message passing for real-time nodes: a fixed pool of
//! message slots per topic, hard real-time (HRT) subscribers that see every
//! message in order, soft real-time (SRT) subscribers that take the newest
//! message only when it is still useful, and request/response services with
//! call correlation and timeouts. Payloads are opaque bytes.
//!
//! ## Quick Start
//!
//! ```rust
//! use micrort::{Core, HrtQos, Result, SrtOutcome, TopicId};
//! use std::time::Duration;
//!
//! fn main() -> Result<()> {
//!     let core = Core::builder().build()?;
//!     core.add_topic(TopicId(7))?;
//!     core.start()?;
//!
//!     let publisher = core.publisher(TopicId(7))?;
//!     let mut control = core.hrt_subscriber(TopicId(7), HrtQos::default())?;
//!     let mut display = core.srt_subscriber(TopicId(7))?;
//!
//!     publisher.publish_now(&42u32.to_le_bytes())?;
//!
//!     let mut buf = [0u8; 8];
//!     let info = control.receive(&mut buf, Duration::from_millis(10))?;
//!     assert_eq!(info.size, 4);
//!     assert!(matches!(display.poll(&mut buf)?, SrtOutcome::Accepted { .. }));
//!
//!     drop((control, display));
//!     core.shutdown()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                         Core (context object)                       |
//! |   registry: topics + services | lifecycle | nodes | emergency path  |
//! +----------------------------------+----------------------------------+
//! |             pubsub               |               rpc                |
//! |  Publisher -> Topic -> HRT lanes | Client -> call table -> Server   |
//! |                  \-> latest/SRT  |        <- response slot <-       |
//! +----------------------------------+----------------------------------+
//! |                   rt: MessagePool | BoundedRing | Notifier          |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Core`] | Registry, lifecycle and shutdown arbiter; build with [`Core::builder`] |
//! | [`Publisher`] | Single writer of a topic |
//! | [`HrtSubscriber`] | Sees every message, in order, with optional deadline QoS |
//! | [`SrtSubscriber`] | Sees the newest message if its usefulness passes a threshold |
//! | [`ServiceClient`] / [`ServiceServer`] | Correlated request/response |
//! | [`MessagePool`] | Fixed slot arena behind every topic and service |
//!
//! ## Features
//!
//! - `config-loaders` (default): YAML configuration via serde
//! - `logging`: stderr/file sinks for the `log` facade
//! - `trace`: per-message `log::trace!` on delivery paths (implies `logging`)

pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod pubsub;
pub mod rpc;
pub mod rt;
pub mod time;
pub mod types;

pub use crate::config::{CoreConfig, ServiceConfig, TopicConfig, CONFIG_ENV_VAR};
pub use crate::core::{
    Core, CoreBuilder, CoreState, CoreStatus, Flow, NodeContext, NodeTask, ShutdownKind,
    ShutdownReport,
};
pub use error::{Error, Result, Status};
pub use pubsub::{
    HrtQos, HrtSubscriber, MessageInfo, Publisher, QosViolation, Reciprocal, SrtOutcome,
    SrtSubscriber, SubscriberStats, Topic, TopicSnapshot, TopicStats, Usefulness, ViolationKind,
};
pub use rpc::{
    DispatchedCall, Reply, ReplyStatus, RequestHandler, RespondOutcome, ServiceClient,
    ServiceServer, ServiceStats,
};
pub use rt::{MessagePool, SlotHandle};
pub use time::{Clock, ManualClock, MonotonicClock};
pub use types::{CallId, MessageId, ServiceId, SubscriberId, Timestamp, TopicId};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
