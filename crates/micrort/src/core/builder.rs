// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Builder for [`Core`].

use super::{Core, CoreInner, FatalHook};
use crate::config::CoreConfig;
use crate::error::{Error, Result};
use crate::time::{Clock, MonotonicClock};
use std::sync::Arc;

/// Builder for configuring a [`Core`] context.
///
/// # Example
///
/// ```
/// use micrort::{Core, CoreConfig};
/// use std::time::Duration;
///
/// let core = Core::builder()
///     .config(CoreConfig {
///         shutdown_grace: Duration::from_millis(20),
///         ..CoreConfig::default()
///     })
///     .on_fatal(|reason| eprintln!("fatal: {}", reason))
///     .build()
///     .expect("valid config");
/// assert_eq!(core.state(), micrort::CoreState::Uninitialized);
/// ```
#[derive(Default)]
pub struct CoreBuilder {
    config: Option<CoreConfig>,
    clock: Option<Arc<dyn Clock>>,
    on_fatal: Option<FatalHook>,
}

impl CoreBuilder {
    /// Replace the default configuration.
    #[must_use]
    pub fn config(mut self, config: CoreConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Load the configuration named by `MICRORT_CONFIG`, if set.
    #[cfg(feature = "config-loaders")]
    pub fn config_from_env(mut self) -> Result<Self> {
        self.config = Some(CoreConfig::from_env()?);
        Ok(self)
    }

    /// Time source for message timestamps and ages.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Called once, on the thread that raised it, when the core enters
    /// emergency shutdown.
    #[must_use]
    pub fn on_fatal<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.on_fatal = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> Result<Core> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        log::debug!(
            "[CoreBuilder::build] grace={:?} rpc_timeout={:?} srt_threshold={}",
            config.shutdown_grace,
            config.rpc_timeout,
            config.srt_threshold
        );
        Ok(Core {
            inner: Arc::new(CoreInner::new(config, clock, self.on_fatal)),
        })
    }
}
