//! Targeted cursor traps bound to explicit trap zones.
//!
//! Mouse and pen motion inside a zone can nudge the effective hotspot and
//! show a decoy glyph for a short lag. Touch taps are never dropped: they are
//! held behind a "processing" decoy and re-dispatched after a delay.
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{TargetKey, TrapContext, TrapDecision};
use crate::config::ZoneConfig;
use crate::fairness::{Eligibility, FailLedger, random_in_span, random_ms, roll};
use crate::incident::{Incident, Severity, Surface};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerKind {
    Mouse,
    Pen,
    Touch,
}

impl PointerKind {
    /// Map a DOM `pointerType` string; unknown types behave like a mouse.
    #[must_use]
    pub fn from_dom(pointer_type: &str) -> Self {
        match pointer_type {
            "touch" => Self::Touch,
            "pen" => Self::Pen,
            _ => Self::Mouse,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZoneGesture {
    Move { motion_px: f64 },
    Tap,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZonePointer {
    pub zone: TargetKey,
    pub pointer: PointerKind,
    pub gesture: ZoneGesture,
    /// Set on events the trap re-dispatched itself.
    pub synthetic: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZoneEffect {
    Nudge {
        dx: f64,
        dy: f64,
        decoy_until_ms: u64,
    },
    DeferTap {
        processing_until_ms: u64,
        redispatch_at_ms: u64,
    },
}

impl ZoneEffect {
    #[must_use]
    pub const fn ends_at(&self) -> u64 {
        match self {
            Self::Nudge { decoy_until_ms, .. } => *decoy_until_ms,
            Self::DeferTap {
                redispatch_at_ms, ..
            } => *redispatch_at_ms,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ZoneTrap {
    cfg: ZoneConfig,
    ledger: FailLedger<TargetKey>,
    open_windows: HashMap<TargetKey, u64>,
    pending_taps: HashMap<TargetKey, u64>,
    suppressions: u32,
}

impl ZoneTrap {
    #[must_use]
    pub fn new(cfg: ZoneConfig) -> Self {
        let ledger = FailLedger::new(cfg.fail_disable_threshold, cfg.struggle_cooldown_ms);
        Self {
            cfg,
            ledger,
            open_windows: HashMap::new(),
            pending_taps: HashMap::new(),
            suppressions: 0,
        }
    }

    pub fn decide<R: Rng + ?Sized>(
        &mut self,
        ctx: &TrapContext,
        input: &ZonePointer,
        rng: &mut R,
    ) -> TrapDecision<ZoneEffect> {
        let now = ctx.now_ms;
        if input.synthetic {
            return TrapDecision::Pass;
        }
        self.open_windows.retain(|_, until| now < *until);
        if self.open_windows.contains_key(&input.zone) {
            return TrapDecision::Pass;
        }
        if let Eligibility::Suppressed { .. } = self.ledger.check(&input.zone, now) {
            return TrapDecision::Pass;
        }

        let qualifies = match (input.pointer, input.gesture) {
            (PointerKind::Touch, ZoneGesture::Tap) => true,
            (PointerKind::Mouse | PointerKind::Pen, ZoneGesture::Move { motion_px }) => {
                motion_px.is_finite() && motion_px >= self.cfg.min_motion_px
            }
            _ => false,
        };
        if !qualifies {
            return TrapDecision::Pass;
        }

        if !roll(rng, ctx.probability(&self.cfg.activation_probability)) {
            self.ledger.record_pass(&input.zone);
            return TrapDecision::Pass;
        }

        let phase = ctx.effective_phase();
        let (effect, mut incident) = if matches!(input.gesture, ZoneGesture::Tap) {
            let delay = random_ms(rng, self.cfg.tap_delay_ms.at(phase));
            let at = now.saturating_add(delay);
            self.pending_taps.insert(input.zone, at);
            (
                ZoneEffect::DeferTap {
                    processing_until_ms: at,
                    redispatch_at_ms: at,
                },
                Incident::new(Surface::Zone, now, format!("tap held for {delay}ms"))
                    .tagged("deferred-tap"),
            )
        } else {
            let magnitude = random_in_span(rng, self.cfg.nudge_px.at(phase));
            let angle = rng.gen_range(0.0..std::f64::consts::TAU);
            let lag = random_ms(rng, self.cfg.lag_ms.at(phase));
            (
                ZoneEffect::Nudge {
                    dx: magnitude * angle.cos(),
                    dy: magnitude * angle.sin(),
                    decoy_until_ms: now.saturating_add(lag),
                },
                Incident::new(
                    Surface::Zone,
                    now,
                    format!("hotspot nudged {magnitude:.1}px for {lag}ms"),
                )
                .tagged("nudge"),
            )
        };
        self.open_windows.insert(input.zone, effect.ends_at());

        if let Some(until) = self.ledger.record_failure(&input.zone, now) {
            self.suppressions = self.suppressions.saturating_add(1);
            log::debug!("trap zone {} relaxed until {until}", input.zone);
            incident = incident
                .tagged("zone-relaxed")
                .with_severity(Severity::Warning);
        }

        TrapDecision::Activate { effect, incident }
    }

    /// Whether a zone is inside its fairness cooldown.
    pub fn is_relaxed(&mut self, zone: TargetKey, now_ms: u64) -> bool {
        !self.ledger.check(&zone, now_ms).is_eligible()
    }

    /// Number of times any zone entered its relaxed state.
    #[must_use]
    pub const fn suppressions(&self) -> u32 {
        self.suppressions
    }

    /// Taps held behind a decoy that still owe a re-dispatch.
    #[must_use]
    pub fn pending_taps(&self) -> usize {
        self.pending_taps.len()
    }

    /// Remove and return zones whose held tap is due for re-dispatch.
    pub fn take_due_taps(&mut self, now_ms: u64) -> Vec<TargetKey> {
        let mut due: Vec<TargetKey> = self
            .pending_taps
            .iter()
            .filter(|(_, at)| **at <= now_ms)
            .map(|(zone, _)| *zone)
            .collect();
        due.sort();
        for zone in &due {
            self.pending_taps.remove(zone);
        }
        due
    }

    pub fn evict(&mut self, zone: TargetKey) {
        self.ledger.evict(&zone);
        self.open_windows.remove(&zone);
        self.pending_taps.remove(&zone);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::{Phase, PhaseTable};
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn zone() -> TargetKey {
        TargetKey::from_label("checkout")
    }

    fn moving(motion_px: f64) -> ZonePointer {
        ZonePointer {
            zone: zone(),
            pointer: PointerKind::Mouse,
            gesture: ZoneGesture::Move { motion_px },
            synthetic: false,
        }
    }

    fn always() -> ZoneConfig {
        ZoneConfig {
            activation_probability: PhaseTable::uniform(1.0),
            ..ZoneConfig::default()
        }
    }

    #[test]
    fn small_motion_and_synthetic_events_pass() {
        let mut trap = ZoneTrap::new(always());
        let mut rng = SmallRng::seed_from_u64(1);
        let ctx = TrapContext::new(Phase::Three, 0);
        assert!(!trap.decide(&ctx, &moving(1.0), &mut rng).is_active());
        let synthetic = ZonePointer {
            synthetic: true,
            ..moving(50.0)
        };
        assert!(!trap.decide(&ctx, &synthetic, &mut rng).is_active());
    }

    #[test]
    fn touch_taps_are_deferred_never_dropped() {
        let mut trap = ZoneTrap::new(always());
        let mut rng = SmallRng::seed_from_u64(2);
        let tap = ZonePointer {
            zone: zone(),
            pointer: PointerKind::Touch,
            gesture: ZoneGesture::Tap,
            synthetic: false,
        };
        let ctx = TrapContext::new(Phase::Two, 100);
        let Some((ZoneEffect::DeferTap { redispatch_at_ms, .. }, _)) =
            trap.decide(&ctx, &tap, &mut rng).into_parts()
        else {
            panic!("expected deferred tap");
        };
        let range = ZoneConfig::default().tap_delay_ms.at(Phase::Two);
        assert!((100 + range.min..=100 + range.max).contains(&redispatch_at_ms));
        assert_eq!(trap.pending_taps(), 1);
        assert!(trap.take_due_taps(redispatch_at_ms - 1).is_empty());
        assert_eq!(trap.take_due_taps(redispatch_at_ms), vec![zone()]);
        let replay = ZonePointer {
            synthetic: true,
            ..tap
        };
        assert!(!trap.decide(&ctx.at(redispatch_at_ms), &replay, &mut rng).is_active());
    }

    #[test]
    fn consecutive_activations_relax_the_zone() {
        let mut trap = ZoneTrap::new(always());
        let mut rng = SmallRng::seed_from_u64(3);
        let mut now = 0;
        let mut fired = 0;
        while fired < 3 {
            let ctx = TrapContext::new(Phase::Three, now);
            if trap.decide(&ctx, &moving(20.0), &mut rng).is_active() {
                fired += 1;
            }
            now += 1_000;
        }
        assert_eq!(trap.suppressions(), 1);
        assert!(trap.is_relaxed(zone(), now));
        assert!(!trap.is_relaxed(zone(), now + 8_000));
    }

    #[test]
    fn touch_moves_and_mouse_taps_pass() {
        let mut trap = ZoneTrap::new(always());
        let mut rng = SmallRng::seed_from_u64(4);
        let ctx = TrapContext::new(Phase::Three, 0);
        let touch_move = ZonePointer {
            pointer: PointerKind::Touch,
            ..moving(30.0)
        };
        let mouse_tap = ZonePointer {
            gesture: ZoneGesture::Tap,
            ..moving(0.0)
        };
        assert!(!trap.decide(&ctx, &touch_move, &mut rng).is_active());
        assert!(!trap.decide(&ctx, &mouse_tap, &mut rng).is_active());
        assert_eq!(PointerKind::from_dom("touch"), PointerKind::Touch);
        assert_eq!(PointerKind::from_dom("banana"), PointerKind::Mouse);
    }
}
