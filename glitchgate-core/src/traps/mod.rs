//! Surface-specific trap controllers.
//!
//! Every controller follows the same shape: take a [`TrapContext`], look at
//! one input event, and either pass it through or return a reversible,
//! time-boxed effect together with an [`Incident`]. Applying the effect to
//! the page is the caller's job.
use serde::{Deserialize, Serialize};
use std::fmt;
use twox_hash::XxHash64;

use crate::fairness::{Probability, with_pity_adjustment};
use crate::incident::Incident;
use crate::phase::{Phase, PhaseTable};

pub mod chrome;
pub mod clipboard;
pub mod cursor;
pub mod drag;
pub mod focus;
pub mod zone;

pub use chrome::{ChromeButton, ChromeEffect, ChromeTrap};
pub use clipboard::{ClipboardAction, ClipboardEffect, ClipboardTrap};
pub use cursor::{CursorEffect, CursorPersona, CursorTrap, PointerSample, TargetKind};
pub use drag::{DragFriction, DragInput, DragSnapBack, DragTrap};
pub use focus::{FocusEffect, FocusTrap, KeyInput};
pub use zone::{PointerKind, ZoneEffect, ZoneGesture, ZonePointer, ZoneTrap};

const TARGET_KEY_SEED: u64 = 0x6c69_7463_6867_6174;

/// Stable logical identifier for a trapped control or region.
///
/// Built from a data attribute or assigned id rather than a live node, so
/// ledgers keyed on it can be evicted deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetKey(u64);

impl TargetKey {
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        Self(XxHash64::oneshot(TARGET_KEY_SEED, label.trim().as_bytes()))
    }

    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl From<&str> for TargetKey {
    fn from(value: &str) -> Self {
        Self::from_label(value)
    }
}

impl fmt::Display for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Page-level state every controller consults per event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrapContext {
    pub phase: Phase,
    pub pity: bool,
    pub max_hostility: bool,
    pub now_ms: u64,
}

impl TrapContext {
    #[must_use]
    pub const fn new(phase: Phase, now_ms: u64) -> Self {
        Self {
            phase,
            pity: false,
            max_hostility: false,
            now_ms,
        }
    }

    #[must_use]
    pub const fn with_pity(mut self, pity: bool) -> Self {
        self.pity = pity;
        self
    }

    #[must_use]
    pub const fn with_max_hostility(mut self, max_hostility: bool) -> Self {
        self.max_hostility = max_hostility;
        self
    }

    #[must_use]
    pub const fn at(mut self, now_ms: u64) -> Self {
        self.now_ms = now_ms;
        self
    }

    #[must_use]
    pub const fn effective_phase(&self) -> Phase {
        self.phase.effective(self.max_hostility)
    }

    /// Look up the phase probability and apply the pity pass.
    #[must_use]
    pub fn probability(&self, table: &PhaseTable<f64>) -> Probability {
        with_pity_adjustment(table.at(self.effective_phase()), self.pity)
    }
}

/// Result of offering one event to a controller.
#[derive(Debug, Clone, PartialEq)]
pub enum TrapDecision<E> {
    /// Leave the event untouched.
    Pass,
    /// Intercept the event and apply `effect`.
    Activate { effect: E, incident: Incident },
}

impl<E> TrapDecision<E> {
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Activate { .. })
    }

    #[must_use]
    pub fn effect(&self) -> Option<&E> {
        match self {
            Self::Pass => None,
            Self::Activate { effect, .. } => Some(effect),
        }
    }

    #[must_use]
    pub fn into_parts(self) -> Option<(E, Incident)> {
        match self {
            Self::Pass => None,
            Self::Activate { effect, incident } => Some((effect, incident)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_keys_are_stable_and_trimmed() {
        assert_eq!(TargetKey::from_label("submit"), TargetKey::from(" submit "));
        assert_ne!(TargetKey::from_label("submit"), TargetKey::from_label("cancel"));
        assert_eq!(TargetKey::from_label("x").to_string().len(), 16);
    }

    #[test]
    fn context_applies_max_hostility_and_pity() {
        let table = PhaseTable::new(0.1, 0.2, 0.6);
        let ctx = TrapContext::new(Phase::One, 0).with_max_hostility(true);
        assert!((ctx.probability(&table) - 0.6).abs() < f64::EPSILON);
        let ctx = ctx.with_pity(true);
        assert!((ctx.probability(&table) - 0.3).abs() < f64::EPSILON);
    }
}
