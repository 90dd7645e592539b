// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Log sinks for the `log` facade.
//!
//! The crate itself only emits through `log::debug!`, `log::info!`,
//! `log::warn!` and `log::error!` (plus `log::trace!` on delivery paths with
//! the `trace` feature). Hosts that already install a `log` implementation
//! need nothing from here. With the `logging` feature this module provides a
//! minimal one writing to stderr or a file:
//!
//! ```ignore
//! use micrort::logging::{init_logger, ConsoleOutput, LogLevel};
//! use std::sync::Arc;
//!
//! init_logger(Arc::new(ConsoleOutput::new(LogLevel::Debug)), LogLevel::Info);
//! ```

#[cfg(feature = "logging")]
pub mod logger;
#[cfg(feature = "logging")]
mod output;

#[cfg(feature = "logging")]
pub use output::{ConsoleOutput, FileOutput, LogLevel, Output};

#[cfg(feature = "logging")]
pub use logger::{flush_logger, init_logger};
