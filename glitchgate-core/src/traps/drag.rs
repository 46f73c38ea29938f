//! Drag friction for range inputs.
//!
//! An interaction is `begin`, any number of `input` calls, then `release`.
//! While it is open the control only receives a damped share of the pointer's
//! delta. Release may schedule one snap-back toward the starting value.
use rand::Rng;
use std::collections::HashMap;

use super::{TargetKey, TrapContext, TrapDecision};
use crate::config::DragConfig;
use crate::fairness::{random_in_span, random_ms, roll, with_pity_adjustment};
use crate::incident::{Incident, Surface};

/// Raw range-input events as the browser reports them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragInput {
    Begin { control: TargetKey, value: f64 },
    Move { control: TargetKey, raw: f64 },
    Release { control: TargetKey },
}

impl DragInput {
    #[must_use]
    pub const fn control(&self) -> TargetKey {
        match self {
            Self::Begin { control, .. } | Self::Move { control, .. } | Self::Release { control } => {
                *control
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragFriction {
    /// Share of the pointer delta that reaches the control.
    pub multiplier: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragSnapBack {
    pub to_value: f64,
    pub at_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Interaction {
    start: f64,
    last_raw: f64,
    value: f64,
    multiplier: f64,
}

#[derive(Debug, Clone)]
pub struct DragTrap {
    cfg: DragConfig,
    open: HashMap<TargetKey, Interaction>,
    retries: HashMap<TargetKey, u32>,
}

impl DragTrap {
    #[must_use]
    pub fn new(cfg: DragConfig) -> Self {
        Self {
            cfg,
            open: HashMap::new(),
            retries: HashMap::new(),
        }
    }

    /// Open an interaction. Activates when the control will be damped.
    pub fn begin(
        &mut self,
        ctx: &TrapContext,
        control: TargetKey,
        value: f64,
    ) -> TrapDecision<DragFriction> {
        let attempts = self.retries.entry(control).or_insert(0);
        *attempts = attempts.saturating_add(1);
        let relaxed = *attempts > self.cfg.relax_after_retries;

        let multiplier = if relaxed || !value.is_finite() {
            1.0
        } else {
            let friction = 1.0 - self.cfg.damping.at(ctx.effective_phase()).clamp(0.0, 1.0);
            1.0 - with_pity_adjustment(friction, ctx.pity)
        };
        self.open.insert(
            control,
            Interaction {
                start: value,
                last_raw: value,
                value,
                multiplier,
            },
        );

        if multiplier >= 1.0 {
            if relaxed {
                log::debug!("drag friction relaxed for {control} after {attempts} tries");
            }
            return TrapDecision::Pass;
        }
        TrapDecision::Activate {
            effect: DragFriction { multiplier },
            incident: Incident::new(
                Surface::Drag,
                ctx.now_ms,
                format!("slider friction at {:.0}%", multiplier * 100.0),
            )
            .tagged("friction"),
        }
    }

    /// Feed a raw input value and get the value the control should show.
    ///
    /// Returns `None` when no interaction is open for the control.
    pub fn input(&mut self, control: TargetKey, raw: f64) -> Option<f64> {
        let interaction = self.open.get_mut(&control)?;
        if !raw.is_finite() {
            return Some(interaction.value);
        }
        let delta = raw - interaction.last_raw;
        interaction.last_raw = raw;
        interaction.value += delta * interaction.multiplier;
        Some(interaction.value)
    }

    /// Close the interaction, possibly scheduling a single snap-back.
    pub fn release<R: Rng + ?Sized>(
        &mut self,
        ctx: &TrapContext,
        control: TargetKey,
        rng: &mut R,
    ) -> TrapDecision<DragSnapBack> {
        let Some(interaction) = self.open.remove(&control) else {
            return TrapDecision::Pass;
        };
        let travelled = interaction.value - interaction.start;
        if interaction.multiplier >= 1.0 || travelled.abs() < f64::EPSILON {
            return TrapDecision::Pass;
        }
        if !roll(rng, ctx.probability(&self.cfg.snap_back_probability)) {
            return TrapDecision::Pass;
        }
        let fraction = random_in_span(rng, self.cfg.snap_back_fraction).clamp(0.0, 1.0);
        let delay = random_ms(rng, self.cfg.snap_back_delay_ms);
        let to_value = interaction.value - travelled * fraction;
        TrapDecision::Activate {
            effect: DragSnapBack {
                to_value,
                at_ms: ctx.now_ms.saturating_add(delay),
            },
            incident: Incident::new(
                Surface::Drag,
                ctx.now_ms,
                format!("slider snapped back {:.0}%", fraction * 100.0),
            )
            .tagged("snap-back"),
        }
    }

    #[must_use]
    pub fn is_dragging(&self, control: TargetKey) -> bool {
        self.open.contains_key(&control)
    }

    #[must_use]
    pub fn attempts(&self, control: TargetKey) -> u32 {
        self.retries.get(&control).copied().unwrap_or(0)
    }

    pub fn evict(&mut self, control: TargetKey) {
        self.open.remove(&control);
        self.retries.remove(&control);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::{Phase, PhaseTable, Span};
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn slider() -> TargetKey {
        TargetKey::from_label("volume")
    }

    #[test]
    fn input_is_damped_by_phase_multiplier() {
        let mut trap = DragTrap::new(DragConfig::default());
        let ctx = TrapContext::new(Phase::Two, 0);
        let friction = trap.begin(&ctx, slider(), 10.0).effect().copied().unwrap();
        assert!((friction.multiplier - 0.65).abs() < 1e-9);
        let value = trap.input(slider(), 30.0).unwrap();
        assert!((value - 23.0).abs() < 1e-9);
        let value = trap.input(slider(), 40.0).unwrap();
        assert!((value - 29.5).abs() < 1e-9);
        assert_eq!(trap.input(TargetKey::from_label("other"), 5.0), None);
    }

    #[test]
    fn pity_halves_the_friction() {
        let mut trap = DragTrap::new(DragConfig::default());
        let ctx = TrapContext::new(Phase::Three, 0).with_pity(true);
        let Some((friction, _)) = trap.begin(&ctx, slider(), 0.0).into_parts() else {
            panic!("expected friction");
        };
        assert!((friction.multiplier - 0.725).abs() < 1e-9);
    }

    #[test]
    fn friction_relaxes_after_retries() {
        let cfg = DragConfig::default();
        let limit = cfg.relax_after_retries;
        let mut trap = DragTrap::new(cfg);
        let mut rng = SmallRng::seed_from_u64(9);
        let ctx = TrapContext::new(Phase::Three, 0);
        for _ in 0..limit {
            assert!(trap.begin(&ctx, slider(), 0.0).is_active());
            trap.release(&ctx, slider(), &mut rng);
        }
        assert!(!trap.begin(&ctx, slider(), 0.0).is_active());
        assert_eq!(trap.input(slider(), 50.0), Some(50.0));
        assert!(!trap.release(&ctx, slider(), &mut rng).is_active());
    }

    #[test]
    fn snap_back_moves_toward_start_once() {
        let cfg = DragConfig {
            snap_back_probability: PhaseTable::uniform(1.0),
            snap_back_fraction: Span::new(0.5, 0.5),
            ..DragConfig::default()
        };
        let mut trap = DragTrap::new(cfg);
        let mut rng = SmallRng::seed_from_u64(4);
        let ctx = TrapContext::new(Phase::One, 1_000);
        trap.begin(&ctx, slider(), 0.0);
        let reached = trap.input(slider(), 100.0).unwrap();
        let Some((snap, _)) = trap.release(&ctx, slider(), &mut rng).into_parts() else {
            panic!("expected snap-back");
        };
        assert!((snap.to_value - reached / 2.0).abs() < 1e-9);
        assert!(snap.at_ms >= 1_000);
        assert!(!trap.release(&ctx, slider(), &mut rng).is_active());
    }
}
