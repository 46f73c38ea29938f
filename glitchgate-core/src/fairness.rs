//! Probability adjustment and the fairness ceiling shared by every trap.
//!
//! Nothing here knows about the DOM. The ledgers key on stable logical
//! identifiers and are evicted explicitly when their owner unmounts.
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;

use crate::phase::{MsRange, Span};

/// A probability in `[0, 1]`.
pub type Probability = f64;

/// Halve a probability while the session's pity pass is active.
///
/// Pity never disables an effect outright: the adjusted value is
/// `clamp(base * 0.5, 0, 1)`.
#[must_use]
pub fn with_pity_adjustment(base: Probability, pity_active: bool) -> Probability {
    if pity_active {
        (base * 0.5).clamp(0.0, 1.0)
    } else {
        base
    }
}

/// Uniform draw in `[min, max)`. Degenerate or inverted windows yield `min`.
pub fn random_in_range<R: Rng + ?Sized>(rng: &mut R, min: f64, max: f64) -> f64 {
    if !(min.is_finite() && max.is_finite()) || max <= min {
        return min;
    }
    rng.gen_range(min..max)
}

/// Uniform draw inside a [`Span`].
pub fn random_in_span<R: Rng + ?Sized>(rng: &mut R, span: Span) -> f64 {
    random_in_range(rng, span.min, span.max)
}

/// Uniform millisecond draw in the inclusive window.
pub fn random_ms<R: Rng + ?Sized>(rng: &mut R, range: MsRange) -> u64 {
    if range.max <= range.min {
        return range.min.min(range.max);
    }
    rng.gen_range(range.min..=range.max)
}

/// Bernoulli trial. Non-finite or non-positive probabilities never fire.
pub fn roll<R: Rng + ?Sized>(rng: &mut R, probability: Probability) -> bool {
    if !probability.is_finite() || probability <= 0.0 {
        return false;
    }
    rng.gen_range(0.0..1.0) < probability.min(1.0)
}

/// Outcome of asking a ledger whether a trap may act on a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    Suppressed { until_ms: u64 },
}

impl Eligibility {
    #[must_use]
    pub const fn is_eligible(self) -> bool {
        matches!(self, Self::Eligible)
    }
}

/// Per-key failure record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FailEntry {
    pub count: u32,
    pub disabled_until: Option<u64>,
}

/// Consecutive-failure counter per logical target.
///
/// Once a key collects `threshold` failures it is suppressed for
/// `cooldown_ms`; the first check after the cooldown resets it to zero.
#[derive(Debug, Clone)]
pub struct FailLedger<K> {
    threshold: u32,
    cooldown_ms: u64,
    entries: HashMap<K, FailEntry>,
}

impl<K: Eq + Hash + Clone> FailLedger<K> {
    #[must_use]
    pub fn new(threshold: u32, cooldown_ms: u64) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown_ms,
            entries: HashMap::new(),
        }
    }

    #[must_use]
    pub const fn threshold(&self) -> u32 {
        self.threshold
    }

    #[must_use]
    pub const fn cooldown_ms(&self) -> u64 {
        self.cooldown_ms
    }

    /// Check whether the trap may act on `key`, expiring elapsed suppressions.
    pub fn check(&mut self, key: &K, now_ms: u64) -> Eligibility {
        let Some(entry) = self.entries.get_mut(key) else {
            return Eligibility::Eligible;
        };
        match entry.disabled_until {
            Some(until) if now_ms < until => Eligibility::Suppressed { until_ms: until },
            Some(_) => {
                entry.count = 0;
                entry.disabled_until = None;
                Eligibility::Eligible
            }
            None => Eligibility::Eligible,
        }
    }

    /// Record a failure. Returns the suppression deadline when this failure trips the threshold.
    pub fn record_failure(&mut self, key: &K, now_ms: u64) -> Option<u64> {
        let threshold = self.threshold;
        let cooldown = self.cooldown_ms;
        let entry = self.entries.entry(key.clone()).or_default();
        if entry.disabled_until.is_some_and(|until| now_ms < until) {
            return None;
        }
        entry.count = entry.count.saturating_add(1);
        if entry.count >= threshold {
            let until = now_ms.saturating_add(cooldown);
            entry.disabled_until = Some(until);
            Some(until)
        } else {
            None
        }
    }

    /// A clean interaction breaks the consecutive streak.
    pub fn record_pass(&mut self, key: &K) {
        if let Some(entry) = self.entries.get_mut(key)
            && entry.disabled_until.is_none()
        {
            entry.count = 0;
        }
    }

    #[must_use]
    pub fn entry(&self, key: &K) -> Option<FailEntry> {
        self.entries.get(key).copied()
    }

    #[must_use]
    pub fn count(&self, key: &K) -> u32 {
        self.entries.get(key).map_or(0, |entry| entry.count)
    }

    /// Drop all state for a key whose owner went away.
    pub fn evict(&mut self, key: &K) {
        self.entries.remove(key);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// `(last_fired_at, cooldown_ms)` gate for a single event or category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CooldownWindow {
    pub last_fired_at: Option<u64>,
    pub cooldown_ms: u64,
}

impl CooldownWindow {
    #[must_use]
    pub const fn new(cooldown_ms: u64) -> Self {
        Self {
            last_fired_at: None,
            cooldown_ms,
        }
    }

    #[must_use]
    pub fn ready(&self, now_ms: u64) -> bool {
        self.last_fired_at
            .is_none_or(|last| now_ms.saturating_sub(last) >= self.cooldown_ms)
    }

    #[must_use]
    pub fn remaining(&self, now_ms: u64) -> u64 {
        self.last_fired_at.map_or(0, |last| {
            self.cooldown_ms
                .saturating_sub(now_ms.saturating_sub(last))
        })
    }

    pub fn fire(&mut self, now_ms: u64) {
        self.last_fired_at = Some(now_ms);
    }
}

/// Global fairness valve: too many consecutive interceptions relax a whole subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaxValve {
    threshold: u32,
    relax_ms: u64,
    streak: u32,
    relaxed_until: Option<u64>,
    trips: u32,
}

impl RelaxValve {
    #[must_use]
    pub fn new(threshold: u32, relax_ms: u64) -> Self {
        Self {
            threshold: threshold.max(1),
            relax_ms,
            streak: 0,
            relaxed_until: None,
            trips: 0,
        }
    }

    /// Whether the subsystem is currently relaxed. Expires the window lazily.
    pub fn is_relaxed(&mut self, now_ms: u64) -> bool {
        match self.relaxed_until {
            Some(until) if now_ms < until => true,
            Some(_) => {
                self.relaxed_until = None;
                self.streak = 0;
                false
            }
            None => false,
        }
    }

    #[must_use]
    pub const fn relaxed_until(&self) -> Option<u64> {
        self.relaxed_until
    }

    /// Count an intercepted activation. Returns the relax deadline if this one trips the valve.
    pub fn record_intercept(&mut self, now_ms: u64) -> Option<u64> {
        self.streak = self.streak.saturating_add(1);
        if self.streak >= self.threshold {
            let until = now_ms.saturating_add(self.relax_ms);
            self.relaxed_until = Some(until);
            self.streak = 0;
            self.trips = self.trips.saturating_add(1);
            Some(until)
        } else {
            None
        }
    }

    pub fn record_pass(&mut self) {
        self.streak = 0;
    }

    #[must_use]
    pub const fn streak(&self) -> u32 {
        self.streak
    }

    /// Number of times the valve has opened since construction.
    #[must_use]
    pub const fn trips(&self) -> u32 {
        self.trips
    }
}
