//! Focus redirection on the confirm key inside focus zones.
use rand::Rng;
use std::collections::HashMap;

use super::{TargetKey, TrapContext, TrapDecision};
use crate::config::FocusConfig;
use crate::fairness::{CooldownWindow, RelaxValve, roll};
use crate::incident::{Incident, Severity, Surface};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInput<'a> {
    pub zone: TargetKey,
    /// DOM `KeyboardEvent.key` value.
    pub key: &'a str,
    /// False when the zone has no decoy control to steal focus to.
    pub decoy_available: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusEffect {
    /// Move focus to the zone's decoy and swallow the keystroke.
    Redirect { swallow: bool },
}

#[derive(Debug, Clone)]
pub struct FocusTrap {
    cfg: FocusConfig,
    cooldowns: HashMap<TargetKey, CooldownWindow>,
    struggle: RelaxValve,
}

impl FocusTrap {
    #[must_use]
    pub fn new(cfg: FocusConfig) -> Self {
        let struggle = RelaxValve::new(cfg.struggle_threshold, cfg.struggle_pause_ms);
        Self {
            cfg,
            cooldowns: HashMap::new(),
            struggle,
        }
    }

    pub fn decide<R: Rng + ?Sized>(
        &mut self,
        ctx: &TrapContext,
        input: &KeyInput<'_>,
        rng: &mut R,
    ) -> TrapDecision<FocusEffect> {
        let now = ctx.now_ms;
        if input.key != self.cfg.confirm_key {
            return TrapDecision::Pass;
        }
        if !input.decoy_available {
            return TrapDecision::Pass;
        }
        if self.struggle.is_relaxed(now) {
            return TrapDecision::Pass;
        }
        let cooldown_ms = self.cfg.zone_cooldown_ms.at(ctx.effective_phase());
        let window = self
            .cooldowns
            .entry(input.zone)
            .or_insert_with(|| CooldownWindow::new(cooldown_ms));
        window.cooldown_ms = cooldown_ms;
        if !window.ready(now) {
            return TrapDecision::Pass;
        }
        if !roll(rng, ctx.probability(&self.cfg.redirect_probability)) {
            self.struggle.record_pass();
            return TrapDecision::Pass;
        }

        window.fire(now);
        let mut incident = Incident::new(
            Surface::Focus,
            now,
            format!("'{}' redirected to a decoy control", input.key),
        )
        .tagged("redirect");
        if let Some(until) = self.struggle.record_intercept(now) {
            log::debug!("focus trap pausing until {until}");
            incident = incident
                .tagged("struggle-pause")
                .with_severity(Severity::Warning);
        }
        TrapDecision::Activate {
            effect: FocusEffect::Redirect { swallow: true },
            incident,
        }
    }

    pub fn is_paused(&mut self, now_ms: u64) -> bool {
        self.struggle.is_relaxed(now_ms)
    }

    pub fn evict(&mut self, zone: TargetKey) {
        self.cooldowns.remove(&zone);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::{Phase, PhaseTable};
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn eager() -> FocusConfig {
        FocusConfig {
            redirect_probability: PhaseTable::uniform(1.0),
            zone_cooldown_ms: PhaseTable::uniform(0),
            ..FocusConfig::default()
        }
    }

    fn enter(label: &str) -> KeyInput<'_> {
        KeyInput {
            zone: TargetKey::from_label(label),
            key: "Enter",
            decoy_available: true,
        }
    }

    #[test]
    fn only_confirm_key_with_decoy_is_eligible() {
        let mut trap = FocusTrap::new(eager());
        let mut rng = SmallRng::seed_from_u64(1);
        let ctx = TrapContext::new(Phase::Three, 0);
        let tab = KeyInput {
            key: "Tab",
            ..enter("form")
        };
        assert!(!trap.decide(&ctx, &tab, &mut rng).is_active());
        let no_decoy = KeyInput {
            decoy_available: false,
            ..enter("form")
        };
        assert!(!trap.decide(&ctx, &no_decoy, &mut rng).is_active());
        assert_eq!(
            trap.decide(&ctx, &enter("form"), &mut rng).effect(),
            Some(&FocusEffect::Redirect { swallow: true })
        );
    }

    #[test]
    fn zone_cooldown_blocks_refire() {
        let cfg = FocusConfig {
            redirect_probability: PhaseTable::uniform(1.0),
            ..FocusConfig::default()
        };
        let cooldown = cfg.zone_cooldown_ms.at(Phase::Two);
        let mut trap = FocusTrap::new(cfg);
        let mut rng = SmallRng::seed_from_u64(2);
        assert!(trap.decide(&TrapContext::new(Phase::Two, 0), &enter("a"), &mut rng).is_active());
        assert!(!trap.decide(&TrapContext::new(Phase::Two, cooldown - 1), &enter("a"), &mut rng).is_active());
        assert!(trap.decide(&TrapContext::new(Phase::Two, cooldown), &enter("a"), &mut rng).is_active());
    }

    #[test]
    fn struggle_threshold_forces_pause() {
        let mut trap = FocusTrap::new(eager());
        let mut rng = SmallRng::seed_from_u64(3);
        for now in 0..3 {
            assert!(trap.decide(&TrapContext::new(Phase::One, now), &enter("z"), &mut rng).is_active());
        }
        assert!(trap.is_paused(3));
        assert!(!trap.decide(&TrapContext::new(Phase::One, 500), &enter("z"), &mut rng).is_active());
        assert!(!trap.is_paused(2 + 8_000));
    }
}
