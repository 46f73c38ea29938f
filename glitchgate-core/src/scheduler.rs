//! Weighted, cooldown-respecting tour event scheduler.
//!
//! [`schedule_tour_event`] is pure: it reads the catalog and a request and
//! returns at most one pick. Recording when an event fired is the caller's
//! job; [`TourScheduler`] is the stateful caller used by the engine.
use rand::Rng;
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};

use crate::fairness::{Probability, with_pity_adjustment};
use crate::phase::{Phase, PhaseTable};
use crate::traps::TrapContext;

/// Page-level moment at which a tour event may be offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TourTrigger {
    /// A form is about to be checked.
    BeforeValidate,
    /// A form passed its checks and is about to submit.
    AfterValidate,
    /// The visitor is leaving for another scene or page.
    BeforeTransition,
    Idle,
}

impl TourTrigger {
    pub const ALL: [Self; 4] = [
        Self::BeforeValidate,
        Self::AfterValidate,
        Self::BeforeTransition,
        Self::Idle,
    ];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::BeforeValidate => "before-validate",
            Self::AfterValidate => "after-validate",
            Self::BeforeTransition => "before-transition",
            Self::Idle => "idle",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TourEffect {
    Toast,
    Shake,
    Glitch,
    Regress,
    Lockout,
    Freeze,
}

impl TourEffect {
    /// Effects that cost the visitor real progress share a longer cooldown.
    #[must_use]
    pub const fn is_catastrophic(self) -> bool {
        matches!(self, Self::Regress | Self::Lockout | Self::Freeze)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TourEvent {
    pub id: String,
    pub phases: SmallVec<[Phase; 3]>,
    pub trigger: TourTrigger,
    pub effect: TourEffect,
    /// Relative selection weight among eligible candidates.
    pub probability: f64,
    pub cooldown_ms: u64,
    #[serde(default)]
    pub message: String,
}

impl TourEvent {
    #[must_use]
    pub fn runs_in(&self, phase: Phase) -> bool {
        self.phases.contains(&phase)
    }
}

fn event(
    id: &str,
    phases: SmallVec<[Phase; 3]>,
    trigger: TourTrigger,
    effect: TourEffect,
    probability: f64,
    cooldown_ms: u64,
    message: &str,
) -> TourEvent {
    TourEvent {
        id: id.to_string(),
        phases,
        trigger,
        effect,
        probability,
        cooldown_ms,
        message: message.to_string(),
    }
}

/// Catalog shipped with the engine when the configuration does not supply one.
#[must_use]
pub fn builtin_catalog() -> Vec<TourEvent> {
    use Phase::{One, Three, Two};
    use TourEffect::{Freeze, Glitch, Lockout, Regress, Shake, Toast};
    use TourTrigger::{AfterValidate, BeforeTransition, BeforeValidate, Idle};
    vec![
        event("validate-audit", smallvec![One, Two, Three], BeforeValidate, Toast, 3.0, 20_000, "Your answers are being audited for enjoyment."),
        event("idle-nudge", smallvec![One, Two, Three], Idle, Toast, 2.0, 15_000, "Still there? Inactivity has been noted."),
        event("validate-tremor", smallvec![One, Two, Three], BeforeValidate, Shake, 2.0, 12_000, "Minor seismic typing detected."),
        event("transition-static", smallvec![Two, Three], BeforeTransition, Glitch, 2.5, 10_000, "Departure received with some interference."),
        event("validated-static", smallvec![Two, Three], AfterValidate, Glitch, 1.5, 18_000, "Signal degraded during validation."),
        event("idle-freeze", smallvec![Two, Three], Idle, Freeze, 0.8, 45_000, "The exhibit paused to think."),
        event("submit-regress", smallvec![Two, Three], AfterValidate, Regress, 1.0, 60_000, "Submission filed under 'later'."),
        event("submit-toast", smallvec![One, Two, Three], AfterValidate, Toast, 2.0, 8_000, "Thank you. Your form is in a queue."),
        event("exit-lockout", smallvec![Three], BeforeTransition, Lockout, 0.6, 120_000, "This exhibit is briefly closed for maintenance."),
        event("transition-regress", smallvec![Three], BeforeTransition, Regress, 0.7, 60_000, "That departure was rolled back for quality."),
    ]
}

/// Inputs for one scheduling decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TourRequest {
    pub phase: Phase,
    pub trigger: TourTrigger,
    pub now_ms: u64,
    /// When the last tour event fired; `None` when none has.
    pub last_event_at: Option<u64>,
    pub catastrophic_cooldown_ms: u64,
    pub base_chance: Probability,
}

impl TourRequest {
    fn elapsed(&self, cooldown_ms: u64) -> bool {
        self.last_event_at
            .is_none_or(|last| self.now_ms.saturating_sub(last) >= cooldown_ms)
    }
}

/// Candidate weight telemetry captured during selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedCandidate {
    pub id: String,
    pub weight: f64,
}

/// Explainability telemetry for one weighted selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDecisionTrace {
    /// Identifier for the selection pool (e.g. `tour.2.click`).
    pub pool_id: String,
    /// Draw that passed the global base-chance gate.
    pub gate_roll: f64,
    /// Unit draw used against the cumulative weights.
    pub roll: f64,
    pub candidates: Vec<WeightedCandidate>,
    pub chosen_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TourPick {
    pub event: TourEvent,
    pub trace: EventDecisionTrace,
}

/// Walk cumulative weights for a unit draw in `[0, 1)`.
///
/// The first candidate whose cumulative weight reaches `unit_draw * total`
/// wins. Rounding at the top of the range, or a draw outside `[0, 1)`, falls
/// back to the last candidate. Returns `None` only for an empty slice.
#[must_use]
pub fn weighted_pick(weights: &[f64], unit_draw: f64) -> Option<usize> {
    let last = weights.len().checked_sub(1)?;
    let total: f64 = weights.iter().map(|w| w.max(0.0)).sum();
    let target = unit_draw * total;
    let mut cumulative = 0.0;
    for (idx, weight) in weights.iter().enumerate() {
        if *weight <= 0.0 {
            continue;
        }
        cumulative += weight;
        if cumulative >= target {
            return Some(idx);
        }
    }
    Some(last)
}

/// Decide whether a tour event fires, and which.
pub fn schedule_tour_event<R: Rng + ?Sized>(
    catalog: &[TourEvent],
    request: &TourRequest,
    rng: &mut R,
) -> Option<TourPick> {
    let gate_roll: f64 = rng.r#gen();
    if gate_roll > request.base_chance || request.base_chance <= 0.0 {
        return None;
    }

    let catastrophic_ready = request.elapsed(request.catastrophic_cooldown_ms);
    let candidates: Vec<&TourEvent> = catalog
        .iter()
        .filter(|event| event.runs_in(request.phase) && event.trigger == request.trigger)
        .filter(|event| event.probability.is_finite() && event.probability > 0.0)
        .filter(|event| request.elapsed(event.cooldown_ms))
        .filter(|event| catastrophic_ready || !event.effect.is_catastrophic())
        .collect();
    if candidates.is_empty() {
        return None;
    }

    let weights: Vec<f64> = candidates.iter().map(|event| event.probability).collect();
    let roll: f64 = rng.r#gen();
    let chosen = candidates[weighted_pick(&weights, roll)?];

    let trace = EventDecisionTrace {
        pool_id: format!("tour.{}.{}", request.phase.level(), request.trigger.label()),
        gate_roll,
        roll,
        candidates: candidates
            .iter()
            .map(|event| WeightedCandidate {
                id: event.id.clone(),
                weight: event.probability,
            })
            .collect(),
        chosen_id: chosen.id.clone(),
    };
    Some(TourPick {
        event: chosen.clone(),
        trace,
    })
}

/// Stateful caller that owns the catalog and records when events fire.
#[derive(Debug, Clone)]
pub struct TourScheduler {
    catalog: Vec<TourEvent>,
    base_chance: PhaseTable<f64>,
    catastrophic_cooldown_ms: u64,
    last_event_at: Option<u64>,
    fired: u64,
}

impl TourScheduler {
    #[must_use]
    pub fn new(cfg: &crate::config::TourConfig) -> Self {
        Self {
            catalog: cfg.catalog.clone(),
            base_chance: cfg.base_chance,
            catastrophic_cooldown_ms: cfg.catastrophic_cooldown_ms,
            last_event_at: None,
            fired: 0,
        }
    }

    #[must_use]
    pub fn request(&self, ctx: &TrapContext, trigger: TourTrigger) -> TourRequest {
        let phase = ctx.effective_phase();
        TourRequest {
            phase,
            trigger,
            now_ms: ctx.now_ms,
            last_event_at: self.last_event_at,
            catastrophic_cooldown_ms: self.catastrophic_cooldown_ms,
            base_chance: with_pity_adjustment(self.base_chance.at(phase), ctx.pity),
        }
    }

    /// Offer a trigger; on a pick, record it as the last event.
    pub fn offer<R: Rng + ?Sized>(
        &mut self,
        ctx: &TrapContext,
        trigger: TourTrigger,
        rng: &mut R,
    ) -> Option<TourPick> {
        let request = self.request(ctx, trigger);
        let pick = schedule_tour_event(&self.catalog, &request, rng)?;
        log::debug!(
            "tour event '{}' fired on {} at {}",
            pick.event.id,
            trigger.label(),
            ctx.now_ms
        );
        self.last_event_at = Some(ctx.now_ms);
        self.fired = self.fired.saturating_add(1);
        Some(pick)
    }

    #[must_use]
    pub const fn last_event_at(&self) -> Option<u64> {
        self.last_event_at
    }

    #[must_use]
    pub const fn fired(&self) -> u64 {
        self.fired
    }

    #[must_use]
    pub fn catalog(&self) -> &[TourEvent] {
        &self.catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn request(trigger: TourTrigger, now_ms: u64, last: Option<u64>) -> TourRequest {
        TourRequest {
            phase: Phase::Three,
            trigger,
            now_ms,
            last_event_at: last,
            catastrophic_cooldown_ms: 90_000,
            base_chance: 1.0,
        }
    }

    #[test]
    fn weighted_pick_walks_cumulative_weights() {
        let weights = [1.0, 2.0, 3.0];
        assert_eq!(weighted_pick(&weights, 0.0), Some(0));
        assert_eq!(weighted_pick(&weights, 0.16), Some(0));
        assert_eq!(weighted_pick(&weights, 0.4), Some(1));
        assert_eq!(weighted_pick(&weights, 0.9), Some(2));
        assert_eq!(weighted_pick(&[], 0.5), None);
    }

    #[test]
    fn weighted_pick_falls_back_to_last_candidate() {
        let weights = [0.1, 0.2, 0.3];
        assert_eq!(weighted_pick(&weights, 1.0 + 1e-12), Some(2));
        assert_eq!(weighted_pick(&weights, f64::NAN), Some(2));
        assert_eq!(weighted_pick(&[0.0, 0.0], 0.5), Some(1));
    }

    #[test]
    fn zero_base_chance_never_fires() {
        let catalog = builtin_catalog();
        let mut rng = SmallRng::seed_from_u64(1);
        let mut req = request(TourTrigger::BeforeTransition, 0, None);
        req.base_chance = 0.0;
        assert!((0..200).all(|_| schedule_tour_event(&catalog, &req, &mut rng).is_none()));
    }

    #[test]
    fn catastrophic_events_wait_for_their_cooldown() {
        let catalog = builtin_catalog();
        let mut rng = SmallRng::seed_from_u64(2);
        let req = request(TourTrigger::BeforeTransition, 60_000, Some(0));
        for _ in 0..500 {
            if let Some(pick) = schedule_tour_event(&catalog, &req, &mut rng) {
                assert!(!pick.event.effect.is_catastrophic());
                assert_eq!(pick.trace.chosen_id, pick.event.id);
            }
        }
    }

    #[test]
    fn nothing_eligible_returns_none() {
        let catalog = builtin_catalog();
        let mut rng = SmallRng::seed_from_u64(3);
        let req = request(TourTrigger::BeforeTransition, 1_000, Some(0));
        assert!(schedule_tour_event(&catalog, &req, &mut rng).is_none());
    }

    #[test]
    fn scheduler_records_last_event() {
        let mut scheduler = TourScheduler::new(&crate::config::TourConfig {
            base_chance: PhaseTable::uniform(1.0),
            ..crate::config::TourConfig::default()
        });
        let mut rng = SmallRng::seed_from_u64(4);
        let ctx = TrapContext::new(Phase::One, 5_000);
        let pick = scheduler.offer(&ctx, TourTrigger::BeforeValidate, &mut rng).unwrap();
        assert_eq!(pick.event.trigger, TourTrigger::BeforeValidate);
        assert_eq!(scheduler.last_event_at(), Some(5_000));
        assert!(scheduler.offer(&ctx.at(6_000), TourTrigger::BeforeValidate, &mut rng).is_none());
        assert_eq!(scheduler.fired(), 1);
    }

    #[test]
    fn triggers_use_kebab_names_and_refuse_unknown_ones() {
        for trigger in TourTrigger::ALL {
            let json = serde_json::to_string(&trigger).unwrap();
            assert_eq!(json, format!("\"{}\"", trigger.label()));
            let back: TourTrigger = serde_json::from_str(&json).unwrap();
            assert_eq!(back, trigger);
        }
        for unknown in ["\"click\"", "\"page_enter\"", "\"form_submit\"", "\"scroll\""] {
            assert!(serde_json::from_str::<TourTrigger>(unknown).is_err());
        }
    }

    #[test]
    fn every_trigger_has_a_catalog_entry() {
        let catalog = builtin_catalog();
        for trigger in TourTrigger::ALL {
            assert!(catalog.iter().any(|event| event.trigger == trigger), "{trigger:?}");
        }
    }

    #[test]
    fn builtin_catalog_has_unique_ids() {
        let catalog = builtin_catalog();
        let mut ids: Vec<&str> = catalog.iter().map(|event| event.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), catalog.len());
        assert!(catalog.iter().any(|event| event.effect.is_catastrophic()));
    }
}
