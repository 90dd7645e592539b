// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `log::Log` implementation forwarding to an [`Output`].

use super::output::{LogLevel, Output};
use std::io;
use std::sync::{Arc, OnceLock};

static OUTPUT: OnceLock<Arc<dyn Output>> = OnceLock::new();

struct Bridge {
    output: Arc<dyn Output>,
    level: LogLevel,
}

impl log::Log for Bridge {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        LogLevel::from(metadata.level()) >= self.level
    }

    fn log(&self, record: &log::Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!("{} {}", record.target(), record.args());
        // A failing sink must never take down a real-time path.
        let _ = self.output.write(record.level().into(), &line);
    }

    fn flush(&self) {
        let _ = self.output.flush();
    }
}

/// Install `output` as the process `log` backend.
///
/// Only the first call in a process takes effect (as with any `log` backend).
/// Returns `false` if a logger was already installed, by this crate or by
/// the host; `output` is then left untouched.
pub fn init_logger(output: Arc<dyn Output>, level: LogLevel) -> bool {
    let bridge = Bridge {
        output: Arc::clone(&output),
        level,
    };
    if log::set_boxed_logger(Box::new(bridge)).is_err() {
        return false;
    }
    log::set_max_level(level.to_filter());
    // Only the winner of set_boxed_logger gets here.
    let _ = OUTPUT.set(output);
    true
}

/// Flush the installed output. No-op if none was installed here.
pub fn flush_logger() -> io::Result<()> {
    match OUTPUT.get() {
        Some(output) => output.flush(),
        None => Ok(()),
    }
}
