// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Usefulness evaluation for SRT subscribers.
//!
//! A usefulness function maps message age to a score in `[0, 1]`. An SRT
//! subscriber skips messages whose score falls below its threshold.
//!
//! Each evaluator carries its own typed parameters:
//!
//! | Evaluator | Score |
//! |-----------|-------|
//! | [`Reciprocal`] (default) | `1 / (age_ms + 1)` |
//! | [`LinearDecay`] | `1 - age / horizon`, floored at 0 |
//! | [`HalfLife`] | `0.5 ^ (age / half_life)` |
//! | [`Cutoff`] | 1 up to `max_age`, then 0 |
//! | [`Always`] | 1 |
//!
//! Closures `Fn(Duration) -> f64` implement [`Usefulness`] directly.

use std::time::Duration;

/// Age-to-score capability. Implementations must be pure.
pub trait Usefulness: Send + Sync {
    /// Raw score for `age`. Callers clamp it through [`evaluate`].
    fn score(&self, age: Duration) -> f64;
}

impl<F> Usefulness for F
where
    F: Fn(Duration) -> f64 + Send + Sync,
{
    fn score(&self, age: Duration) -> f64 {
        self(age)
    }
}

/// Score clamped to `[0, 1]`; NaN counts as useless.
pub fn evaluate(f: &dyn Usefulness, age: Duration) -> f64 {
    let raw = f.score(age);
    if raw.is_nan() {
        0.0
    } else {
        raw.clamp(0.0, 1.0)
    }
}

#[inline]
fn age_ms(age: Duration) -> f64 {
    age.as_secs_f64() * 1_000.0
}

/// `1 / (age_ms + 1)` with fractional milliseconds.
///
/// Equal to 1 at age 0, strictly decreasing, never reaching 0.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Reciprocal;

impl Usefulness for Reciprocal {
    fn score(&self, age: Duration) -> f64 {
        1.0 / (age_ms(age) + 1.0)
    }
}

/// Linear fall-off to zero at `horizon`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearDecay {
    pub horizon: Duration,
}

impl Usefulness for LinearDecay {
    fn score(&self, age: Duration) -> f64 {
        if self.horizon.is_zero() {
            return if age.is_zero() { 1.0 } else { 0.0 };
        }
        1.0 - age.as_secs_f64() / self.horizon.as_secs_f64()
    }
}

/// Exponential decay halving every `half_life`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HalfLife {
    pub half_life: Duration,
}

impl Usefulness for HalfLife {
    fn score(&self, age: Duration) -> f64 {
        if self.half_life.is_zero() {
            return if age.is_zero() { 1.0 } else { 0.0 };
        }
        0.5f64.powf(age.as_secs_f64() / self.half_life.as_secs_f64())
    }
}

/// Hard validity window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cutoff {
    pub max_age: Duration,
}

impl Usefulness for Cutoff {
    fn score(&self, age: Duration) -> f64 {
        if age <= self.max_age {
            1.0
        } else {
            0.0
        }
    }
}

/// Every message is useful (non-real-time consumer).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Always;

impl Usefulness for Always {
    fn score(&self, _age: Duration) -> f64 {
        1.0
    }
}
