// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! YAML configuration loader.
//!
//! # Example YAML
//!
//! ```yaml
//! # node.yaml
//! shutdown_grace_ms: 200
//! rpc_timeout_ms: 20
//! srt_threshold: 0.25
//! default_topic:
//!   capacity: 16
//!   max_payload: 128
//!   hrt_queue_depth: 8
//! default_service:
//!   queue_depth: 4
//! topics:
//!   7:
//!     capacity: 4
//!     max_payload: 1024
//! ```
//!
//! Every key is optional; missing keys keep [`CoreConfig::default`] values.

use super::{CoreConfig, ServiceConfig, TopicConfig, CONFIG_ENV_VAR};
use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Root YAML document structure.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct YamlCoreDocument {
    pub default_topic: Option<YamlTopic>,
    pub default_service: Option<YamlService>,
    pub topics: HashMap<u16, YamlTopic>,
    pub services: HashMap<u16, YamlService>,
    pub shutdown_grace_ms: Option<u64>,
    pub drain_poll_interval_ms: Option<u64>,
    pub rpc_timeout_ms: Option<u64>,
    pub srt_threshold: Option<f64>,
}

#[derive(Debug, Default, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct YamlTopic {
    pub capacity: Option<usize>,
    pub max_payload: Option<usize>,
    pub hrt_queue_depth: Option<usize>,
}

#[derive(Debug, Default, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct YamlService {
    pub queue_depth: Option<usize>,
    pub max_payload: Option<usize>,
}

impl YamlTopic {
    fn apply(self, base: TopicConfig) -> TopicConfig {
        TopicConfig {
            capacity: self.capacity.unwrap_or(base.capacity),
            max_payload: self.max_payload.unwrap_or(base.max_payload),
            hrt_queue_depth: self.hrt_queue_depth.or(base.hrt_queue_depth),
        }
    }
}

impl YamlService {
    fn apply(self, base: ServiceConfig) -> ServiceConfig {
        ServiceConfig {
            queue_depth: self.queue_depth.unwrap_or(base.queue_depth),
            max_payload: self.max_payload.unwrap_or(base.max_payload),
        }
    }
}

impl YamlCoreDocument {
    /// Overlay the document on defaults. Per-id overrides inherit from the
    /// (possibly overridden) defaults.
    pub fn into_config(self) -> CoreConfig {
        let base = CoreConfig::default();
        let default_topic = self
            .default_topic
            .map_or(base.default_topic, |t| t.apply(base.default_topic));
        let default_service = self
            .default_service
            .map_or(base.default_service, |s| s.apply(base.default_service));

        CoreConfig {
            topics: self
                .topics
                .into_iter()
                .map(|(id, t)| (id, t.apply(default_topic)))
                .collect(),
            services: self
                .services
                .into_iter()
                .map(|(id, s)| (id, s.apply(default_service)))
                .collect(),
            default_topic,
            default_service,
            shutdown_grace: self
                .shutdown_grace_ms
                .map_or(base.shutdown_grace, Duration::from_millis),
            drain_poll_interval: self
                .drain_poll_interval_ms
                .map_or(base.drain_poll_interval, Duration::from_millis),
            rpc_timeout: self
                .rpc_timeout_ms
                .map_or(base.rpc_timeout, Duration::from_millis),
            srt_threshold: self.srt_threshold.unwrap_or(base.srt_threshold),
        }
    }
}

impl CoreConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let doc: YamlCoreDocument = serde_yaml::from_str(text)
            .map_err(|e| Error::Config(format!("YAML parse error: {}", e)))?;
        let cfg = doc.into_config();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        log::debug!("[CoreConfig::from_yaml_file] loading {}", path.display());
        Self::from_yaml_str(&text)
    }

    /// Load the file named by `MICRORT_CONFIG`, or defaults if the variable is unset.
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => Self::from_yaml_file(path),
            None => Ok(Self::default()),
        }
    }
}
