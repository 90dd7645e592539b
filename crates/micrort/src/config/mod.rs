// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Node configuration.
//!
//! All sizes are fixed once the [`Core`](crate::Core) is built: pools never
//! grow and queues never reallocate afterwards.
//!
//! With the `config-loaders` feature the same structure can be read from YAML,
//! see [`yaml`].

use crate::error::{Error, Result};
use crate::types::{ServiceId, TopicId};
use std::collections::HashMap;
use std::time::Duration;

#[cfg(feature = "config-loaders")]
pub mod yaml;

/// Environment variable naming a YAML config file for [`CoreConfig::from_env`].
pub const CONFIG_ENV_VAR: &str = "MICRORT_CONFIG";

/// Per-topic sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicConfig {
    /// Message slots backing the topic.
    pub capacity: usize,
    /// Largest payload a slot can carry, in bytes.
    pub max_payload: usize,
    /// Per-HRT-subscriber queue depth. `None` means one entry per pool slot.
    pub hrt_queue_depth: Option<usize>,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            capacity: 8,
            max_payload: 256,
            hrt_queue_depth: None,
        }
    }
}

impl TopicConfig {
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }

    pub fn with_hrt_queue_depth(mut self, depth: usize) -> Self {
        self.hrt_queue_depth = Some(depth);
        self
    }

    /// Effective HRT queue depth.
    pub fn hrt_depth(&self) -> usize {
        self.hrt_queue_depth.unwrap_or(self.capacity)
    }

    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 || self.capacity > usize::from(u16::MAX) {
            return Err(Error::Config(format!(
                "topic capacity must be in 1..={}, got {}",
                u16::MAX,
                self.capacity
            )));
        }
        if self.max_payload == 0 {
            return Err(Error::Config("topic max_payload must be > 0".into()));
        }
        if let Some(depth) = self.hrt_queue_depth {
            if depth == 0 || depth > self.capacity {
                return Err(Error::Config(format!(
                    "hrt_queue_depth must be in 1..={} (capacity), got {}",
                    self.capacity, depth
                )));
            }
        }
        Ok(())
    }
}

/// Per-service sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Maximum outstanding calls (queued, dispatched, or abandoned awaiting a late response).
    pub queue_depth: usize,
    /// Largest request or response payload, in bytes.
    pub max_payload: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            queue_depth: 4,
            max_payload: 256,
        }
    }
}

impl ServiceConfig {
    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }

    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }

    /// One request slot plus one response slot per outstanding call.
    pub fn pool_capacity(&self) -> usize {
        self.queue_depth.saturating_mul(2)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_depth == 0 || self.pool_capacity() > usize::from(u16::MAX) {
            return Err(Error::Config(format!(
                "service queue_depth must be in 1..={}, got {}",
                u16::MAX / 2,
                self.queue_depth
            )));
        }
        if self.max_payload == 0 {
            return Err(Error::Config("service max_payload must be > 0".into()));
        }
        Ok(())
    }
}

/// Process-wide configuration for one [`Core`](crate::Core).
#[derive(Debug, Clone, PartialEq)]
pub struct CoreConfig {
    pub default_topic: TopicConfig,
    pub default_service: ServiceConfig,
    /// Per-topic overrides keyed by raw topic id.
    pub topics: HashMap<u16, TopicConfig>,
    /// Per-service overrides keyed by raw service id.
    pub services: HashMap<u16, ServiceConfig>,
    /// Upper bound on draining in-flight HRT deliveries during a controlled shutdown.
    pub shutdown_grace: Duration,
    /// Re-check period of the graceful drain.
    pub drain_poll_interval: Duration,
    /// Default timeout for [`ServiceClient::call`](crate::rpc::ServiceClient::call).
    pub rpc_timeout: Duration,
    /// Default acceptance threshold for SRT subscribers.
    pub srt_threshold: f64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            default_topic: TopicConfig::default(),
            default_service: ServiceConfig::default(),
            topics: HashMap::new(),
            services: HashMap::new(),
            shutdown_grace: Duration::from_millis(100),
            drain_poll_interval: Duration::from_millis(1),
            rpc_timeout: Duration::from_millis(50),
            srt_threshold: 0.1,
        }
    }
}

impl CoreConfig {
    /// Sizing for `id`: its override if present, else the default.
    pub fn topic(&self, id: TopicId) -> TopicConfig {
        self.topics.get(&id.0).copied().unwrap_or(self.default_topic)
    }

    pub fn service(&self, id: ServiceId) -> ServiceConfig {
        self.services
            .get(&id.0)
            .copied()
            .unwrap_or(self.default_service)
    }

    pub fn with_topic(mut self, id: TopicId, cfg: TopicConfig) -> Self {
        self.topics.insert(id.0, cfg);
        self
    }

    pub fn with_service(mut self, id: ServiceId, cfg: ServiceConfig) -> Self {
        self.services.insert(id.0, cfg);
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.default_topic.validate()?;
        self.default_service.validate()?;
        for (id, cfg) in &self.topics {
            cfg.validate()
                .map_err(|e| Error::Config(format!("topic {}: {}", id, e)))?;
        }
        for (id, cfg) in &self.services {
            cfg.validate()
                .map_err(|e| Error::Config(format!("service {}: {}", id, e)))?;
        }
        if self.shutdown_grace.is_zero() {
            return Err(Error::Config("shutdown_grace must be > 0".into()));
        }
        if self.drain_poll_interval.is_zero() {
            return Err(Error::Config("drain_poll_interval must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.srt_threshold) {
            return Err(Error::Config(format!(
                "srt_threshold must be within [0, 1], got {}",
                self.srt_threshold
            )));
        }
        Ok(())
    }
}
