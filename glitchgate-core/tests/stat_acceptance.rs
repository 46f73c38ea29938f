use glitchgate_core::{
    Phase, PhaseTable, TourRequest, TourTrigger, builtin_catalog, roll, schedule_tour_event,
    weighted_pick, with_pity_adjustment,
};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::convert::TryFrom;

const SAMPLE_SIZE: usize = 100_000;
const TOLERANCE: f64 = 0.02;
const SCHEDULER_TRIALS: usize = 10_000;

fn rate(count: usize, total: usize) -> f64 {
    f64::from(u32::try_from(count).expect("count fits")) / f64::from(u32::try_from(total).expect("total fits"))
}

#[test]
fn weighted_pick_matches_normalized_weights() {
    let weights = [1.0, 2.0, 3.0];
    let mut rng = ChaCha20Rng::seed_from_u64(0x5EED);
    let mut hits = [0usize; 3];
    for _ in 0..SAMPLE_SIZE {
        let idx = weighted_pick(&weights, rng.r#gen::<f64>()).expect("non-empty");
        hits[idx] += 1;
    }
    for (idx, weight) in weights.iter().enumerate() {
        let expected = weight / 6.0;
        let observed = rate(hits[idx], SAMPLE_SIZE);
        assert!(
            (observed - expected).abs() <= TOLERANCE,
            "candidate {idx} drifted: observed {observed:.4}, expected {expected:.4}"
        );
    }
}

#[test]
fn pity_halves_observed_activation_rate() {
    let table = PhaseTable::new(0.2, 0.4, 0.6);
    let mut rng = SmallRng::seed_from_u64(42);
    for phase in Phase::ALL {
        let base = table.at(phase);
        let pity = with_pity_adjustment(base, true);
        let fired = (0..SAMPLE_SIZE).filter(|_| roll(&mut rng, pity)).count();
        let observed = rate(fired, SAMPLE_SIZE);
        assert!(
            (observed - base / 2.0).abs() <= TOLERANCE,
            "phase {} pity rate drifted: {observed:.4}",
            phase.level()
        );
    }
}

#[test]
fn scheduler_never_violates_cooldowns() {
    let catalog = builtin_catalog();
    let mut trial_rng = ChaCha20Rng::seed_from_u64(0xC0FFEE);
    let mut pick_rng = SmallRng::seed_from_u64(7);
    let mut picks = 0usize;

    for _ in 0..SCHEDULER_TRIALS {
        let phase = Phase::ALL[trial_rng.gen_range(0..Phase::ALL.len())];
        let trigger = TourTrigger::ALL[trial_rng.gen_range(0..TourTrigger::ALL.len())];
        let now_ms = trial_rng.gen_range(0..400_000_u64);
        let last_event_at = if trial_rng.gen_bool(0.2) {
            None
        } else {
            Some(now_ms.saturating_sub(trial_rng.gen_range(0..150_000)))
        };
        let request = TourRequest {
            phase,
            trigger,
            now_ms,
            last_event_at,
            catastrophic_cooldown_ms: 90_000,
            base_chance: trial_rng.gen_range(0.0..=1.0),
        };

        let Some(pick) = schedule_tour_event(&catalog, &request, &mut pick_rng) else {
            continue;
        };
        picks += 1;
        let since = last_event_at.map(|last| now_ms - last);
        assert!(pick.event.runs_in(phase));
        assert_eq!(pick.event.trigger, trigger);
        if let Some(since) = since {
            assert!(
                since >= pick.event.cooldown_ms,
                "{} fired {since}ms after the last event",
                pick.event.id
            );
            if pick.event.effect.is_catastrophic() {
                assert!(since >= request.catastrophic_cooldown_ms);
            }
        }
        assert!(pick.trace.candidates.iter().any(|c| c.id == pick.event.id));
        assert!(pick.trace.gate_roll <= request.base_chance);
    }
    assert!(picks > SCHEDULER_TRIALS / 20, "scheduler almost never fired: {picks}");
}
