//! Cursor identity and position desync.
//!
//! The controller maps the element under the pointer to a cursor persona and
//! occasionally lies about it for a bounded window. Independently it can
//! offset the rendered cursor from the real one.
use rand::Rng;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashMap;

use super::{TargetKey, TrapContext, TrapDecision};
use crate::config::CursorConfig;
use crate::fairness::{FailLedger, RelaxValve, random_in_span, random_ms, roll};
use crate::incident::{Incident, Severity, Surface};

/// Coarse classification of the element under the pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Link,
    Button,
    TextField,
    Text,
    Range,
    Plain,
}

impl TargetKind {
    #[must_use]
    pub const fn honest_persona(self) -> CursorPersona {
        match self {
            Self::Link | Self::Button => CursorPersona::Pointer,
            Self::TextField | Self::Text => CursorPersona::Text,
            Self::Range => CursorPersona::Grab,
            Self::Plain => CursorPersona::Default,
        }
    }
}

/// Cursor glyph shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorPersona {
    Default,
    Pointer,
    Text,
    Wait,
    Progress,
    NotAllowed,
    Grab,
    Help,
    Crosshair,
}

impl CursorPersona {
    pub const ALL: [Self; 9] = [
        Self::Default,
        Self::Pointer,
        Self::Text,
        Self::Wait,
        Self::Progress,
        Self::NotAllowed,
        Self::Grab,
        Self::Help,
        Self::Crosshair,
    ];

    /// CSS `cursor` keyword for this persona.
    #[must_use]
    pub const fn css(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Pointer => "pointer",
            Self::Text => "text",
            Self::Wait => "wait",
            Self::Progress => "progress",
            Self::NotAllowed => "not-allowed",
            Self::Grab => "grab",
            Self::Help => "help",
            Self::Crosshair => "crosshair",
        }
    }
}

/// One pointer observation over a classified target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerSample {
    pub target: TargetKey,
    pub kind: TargetKind,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Misclassification {
    pub persona: CursorPersona,
    pub started_ms: u64,
    pub until_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Desync {
    pub dx: f64,
    pub dy: f64,
    pub until_ms: u64,
}

/// What to render; at least one half is present on activation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CursorEffect {
    pub misclassify: Option<Misclassification>,
    pub desync: Option<Desync>,
}

#[derive(Debug, Clone)]
pub struct CursorTrap {
    cfg: CursorConfig,
    ledger: FailLedger<TargetKey>,
    valve: RelaxValve,
    active: HashMap<TargetKey, Misclassification>,
    desync: Option<Desync>,
}

impl CursorTrap {
    #[must_use]
    pub fn new(cfg: CursorConfig) -> Self {
        let ledger = FailLedger::new(cfg.fail_disable_threshold, cfg.struggle_cooldown_ms);
        let valve = RelaxValve::new(cfg.global_relax_after_fails, cfg.global_relax_ms);
        Self {
            cfg,
            ledger,
            valve,
            active: HashMap::new(),
            desync: None,
        }
    }

    pub fn decide<R: Rng + ?Sized>(
        &mut self,
        ctx: &TrapContext,
        sample: &PointerSample,
        rng: &mut R,
    ) -> TrapDecision<CursorEffect> {
        let now = ctx.now_ms;
        self.expire(now);

        if self.valve.is_relaxed(now) {
            return TrapDecision::Pass;
        }
        if !self.ledger.check(&sample.target, now).is_eligible() {
            return TrapDecision::Pass;
        }
        if self.active.contains_key(&sample.target) {
            return TrapDecision::Pass;
        }

        let phase = ctx.effective_phase();
        let misclassify = if roll(rng, ctx.probability(&self.cfg.activation_probability)) {
            let honest = sample.kind.honest_persona();
            let decoys: SmallVec<[CursorPersona; 9]> = CursorPersona::ALL
                .into_iter()
                .filter(|persona| *persona != honest)
                .collect();
            let persona = decoys[rng.gen_range(0..decoys.len())];
            let drift = self.cfg.drift_ms.at(phase);
            let window = drift.clamp(random_ms(rng, drift));
            Some(Misclassification {
                persona,
                started_ms: now,
                until_ms: now.saturating_add(window),
            })
        } else {
            None
        };

        let desync = if self.desync.is_none()
            && roll(rng, ctx.probability(&self.cfg.desync_probability))
        {
            let offset = self.cfg.desync_offset_px.at(phase);
            let magnitude = random_in_span(rng, offset);
            let angle = rng.gen_range(0.0..std::f64::consts::TAU);
            let window = random_ms(rng, self.cfg.desync_ms.at(phase));
            Some(Desync {
                dx: magnitude * angle.cos(),
                dy: magnitude * angle.sin(),
                until_ms: now.saturating_add(window),
            })
        } else {
            None
        };

        if misclassify.is_none() && desync.is_none() {
            self.ledger.record_pass(&sample.target);
            self.valve.record_pass();
            return TrapDecision::Pass;
        }

        let mut incident = Incident::new(Surface::Cursor, now, "cursor identity drifted");
        if let Some(entry) = misclassify {
            self.active.insert(sample.target, entry);
            incident.message = format!(
                "cursor claims '{}' over a {:?} target",
                entry.persona.css(),
                sample.kind
            );
            incident = incident.tagged("misclassify");
        }
        if let Some(offset) = desync {
            self.desync = Some(offset);
            incident = incident.tagged("desync");
        }
        if let Some(until) = self.ledger.record_failure(&sample.target, now) {
            log::debug!("cursor trap disabled for {} until {until}", sample.target);
            incident = incident.tagged("target-suppressed");
        }
        if let Some(until) = self.valve.record_intercept(now) {
            log::debug!("cursor trap relaxing globally until {until}");
            incident = incident
                .tagged("global-relax")
                .with_severity(Severity::Warning);
        }

        TrapDecision::Activate {
            effect: CursorEffect {
                misclassify,
                desync,
            },
            incident,
        }
    }

    /// Persona to display for a target at `now_ms`.
    #[must_use]
    pub fn persona_at(&self, target: TargetKey, kind: TargetKind, now_ms: u64) -> CursorPersona {
        self.active
            .get(&target)
            .filter(|entry| now_ms < entry.until_ms)
            .map_or_else(|| kind.honest_persona(), |entry| entry.persona)
    }

    /// Offset between the rendered and real cursor, if a desync window is open.
    #[must_use]
    pub fn desync_at(&self, now_ms: u64) -> Option<(f64, f64)> {
        self.desync
            .filter(|desync| now_ms < desync.until_ms)
            .map(|desync| (desync.dx, desync.dy))
    }

    pub fn is_relaxed(&mut self, now_ms: u64) -> bool {
        self.valve.is_relaxed(now_ms)
    }

    #[must_use]
    pub const fn relax_trips(&self) -> u32 {
        self.valve.trips()
    }

    /// Forget a target that left the page.
    pub fn evict(&mut self, target: TargetKey) {
        self.active.remove(&target);
        self.ledger.evict(&target);
    }

    fn expire(&mut self, now_ms: u64) {
        self.active.retain(|_, entry| now_ms < entry.until_ms);
        if self.desync.is_some_and(|desync| now_ms >= desync.until_ms) {
            self.desync = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::{Phase, PhaseTable};
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn always_on() -> CursorConfig {
        CursorConfig {
            activation_probability: PhaseTable::uniform(1.0),
            desync_probability: PhaseTable::uniform(0.0),
            ..CursorConfig::default()
        }
    }

    fn sample(label: &str) -> PointerSample {
        PointerSample {
            target: TargetKey::from_label(label),
            kind: TargetKind::Button,
            x: 10.0,
            y: 10.0,
        }
    }

    #[test]
    fn misclassification_never_outlives_drift_window() {
        let cfg = always_on();
        let max = cfg.drift_ms.at(Phase::Three).max;
        let mut trap = CursorTrap::new(cfg);
        let mut rng = SmallRng::seed_from_u64(5);
        let mut now = 0;
        for i in 0..200 {
            let ctx = TrapContext::new(Phase::Three, now);
            let target = sample(&format!("t{i}"));
            if let TrapDecision::Activate { effect, .. } = trap.decide(&ctx, &target, &mut rng) {
                let entry = effect.misclassify.expect("misclassification");
                assert!(entry.until_ms - entry.started_ms <= max);
                assert_ne!(entry.persona, CursorPersona::Pointer);
                assert_eq!(
                    trap.persona_at(target.target, target.kind, entry.until_ms),
                    CursorPersona::Pointer
                );
            }
            now += 50;
        }
    }

    #[test]
    fn global_valve_relaxes_after_consecutive_intercepts() {
        let mut trap = CursorTrap::new(always_on());
        let mut rng = SmallRng::seed_from_u64(9);
        for i in 0..5 {
            let ctx = TrapContext::new(Phase::Two, i * 10);
            assert!(trap.decide(&ctx, &sample(&format!("k{i}")), &mut rng).is_active());
        }
        let ctx = TrapContext::new(Phase::Two, 100);
        assert!(!trap.decide(&ctx, &sample("fresh"), &mut rng).is_active());
        assert!(trap.is_relaxed(40 + 7_999));
        assert!(!trap.is_relaxed(40 + 8_000));
        assert_eq!(trap.relax_trips(), 1);
    }

    #[test]
    fn per_target_ledger_suppresses_a_single_control() {
        let cfg = CursorConfig {
            global_relax_after_fails: 50,
            ..always_on()
        };
        let mut trap = CursorTrap::new(cfg);
        let mut rng = SmallRng::seed_from_u64(1);
        let target = sample("submit");
        let mut now = 0;
        let mut activations = 0;
        while activations < 3 {
            let ctx = TrapContext::new(Phase::One, now);
            if trap.decide(&ctx, &target, &mut rng).is_active() {
                activations += 1;
            }
            now += 5_000;
        }
        let ctx = TrapContext::new(Phase::One, now);
        assert!(!trap.decide(&ctx, &target, &mut rng).is_active());
    }

    #[test]
    fn zero_probability_passes_untouched() {
        let cfg = CursorConfig {
            activation_probability: PhaseTable::uniform(0.0),
            desync_probability: PhaseTable::uniform(0.0),
            ..CursorConfig::default()
        };
        let mut trap = CursorTrap::new(cfg);
        let mut rng = SmallRng::seed_from_u64(2);
        for now in 0..100 {
            let ctx = TrapContext::new(Phase::Three, now);
            assert_eq!(trap.decide(&ctx, &sample("a"), &mut rng), TrapDecision::Pass);
        }
        assert_eq!(trap.desync_at(0), None);
    }

    #[test]
    fn desync_window_is_bounded() {
        let cfg = CursorConfig {
            activation_probability: PhaseTable::uniform(0.0),
            desync_probability: PhaseTable::uniform(1.0),
            ..CursorConfig::default()
        };
        let max = cfg.desync_ms.at(Phase::One).max;
        let mut trap = CursorTrap::new(cfg);
        let mut rng = SmallRng::seed_from_u64(4);
        let ctx = TrapContext::new(Phase::One, 1_000);
        let decision = trap.decide(&ctx, &sample("a"), &mut rng);
        let desync = decision.effect().and_then(|e| e.desync).expect("desync");
        assert!(desync.until_ms - 1_000 <= max);
        assert!(trap.desync_at(1_000).is_some());
        assert!(trap.desync_at(1_000 + max).is_none());
    }
}
