// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Real-time building blocks: slot arena, bounded queues, wake notifier.

pub mod notify;
pub mod pool;
pub mod ring;

pub use notify::{deadline_after, Notifier, Wake};
pub use pool::{Message, MessagePool, MessageProfile, SlotHandle};
pub use ring::{BoundedRing, Delivery};
