//! Seeded property checks over the core state machines.
//!
//! Every scenario is a plain `fn(seed) -> Result<()>`; the runner feeds it
//! one seed per iteration and records the first failed expectation.
use anyhow::{Result, ensure};
use glitchgate_core::traps::{
    PointerKind, PointerSample, TargetKind, ZoneEffect, ZoneGesture, ZonePointer,
};
use glitchgate_core::{
    AudioCommand, AudioConfig, AudioNegotiator, AudioPlaybackState, DurationSource, EngineConfig,
    EngineEffect, Eligibility, FailLedger, GateConfig, GateMachine, GateOutput, GateState,
    HostileEvent, Phase, PhaseTable, PlayRejection, ProgressBeat, QueueStep, SharedSession,
    Signal, SignalBus, TargetKey, TourRequest, TourTrigger, TrackQueue, TrapEngine,
    builtin_catalog, roll, schedule_tour_event, track_session, weighted_pick, with_pity_adjustment,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeSet;

pub type ScenarioFn = fn(u64) -> Result<()>;

#[derive(Debug, Clone)]
pub struct TestScenario {
    pub name: String,
    pub description: &'static str,
    pub check: ScenarioFn,
}

const CATALOG: &[(&str, &str, ScenarioFn)] = &[
    (
        "fairness-ceiling",
        "Fail ledger suppresses a target after N consecutive intercepts",
        fairness_ceiling,
    ),
    (
        "pity-halving",
        "Pity halves activation probability without disabling it",
        pity_halving,
    ),
    (
        "weighted-selection",
        "Cumulative weighted pick matches configured weights",
        weighted_selection,
    ),
    (
        "scheduler-cooldowns",
        "Tour events respect phase, trigger and cooldowns",
        scheduler_cooldowns,
    ),
    (
        "gate-milestones",
        "Gate latches, fades and releases exactly once",
        gate_milestones,
    ),
    (
        "gate-disarm",
        "Disarmed gate never releases and re-arms from scratch",
        gate_disarm,
    ),
    (
        "autoplay-negotiation",
        "Blocked autoplay settles muted and promotes on a gesture",
        autoplay_negotiation,
    ),
    (
        "track-queue-exhaustion",
        "Music queue stops after two failed passes and never repeats across passes",
        track_queue_exhaustion,
    ),
    (
        "hostile-session",
        "Long pointer session relaxes zones and releases every held tap",
        hostile_session,
    ),
    (
        "signal-once",
        "Once-only signals deliver once; scene locks track the page",
        signal_once,
    ),
];

/// Scenarios run by `--scenarios smoke`.
pub const SMOKE: &[&str] = &[
    "fairness-ceiling",
    "gate-milestones",
    "autoplay-negotiation",
    "signal-once",
];

#[must_use]
pub fn list_scenarios() -> Vec<(&'static str, &'static str)> {
    let mut out: Vec<(&'static str, &'static str)> = vec![("smoke", "Quick subset of the checks below")];
    out.extend(CATALOG.iter().map(|(name, description, _)| (*name, *description)));
    out
}

#[must_use]
pub fn all_scenario_names() -> Vec<String> {
    CATALOG.iter().map(|(name, _, _)| (*name).to_string()).collect()
}

#[must_use]
pub fn get_scenario(name: &str) -> Option<TestScenario> {
    CATALOG
        .iter()
        .find(|(key, _, _)| *key == name)
        .map(|(key, description, check)| TestScenario {
            name: (*key).to_string(),
            description: *description,
            check: *check,
        })
}

/// Expand `smoke` and `all` into concrete scenario names, keeping first-seen order.
#[must_use]
pub fn expand_scenarios(requested: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |name: String| {
        if !out.contains(&name) {
            out.push(name);
        }
    };
    for name in requested {
        match name.as_str() {
            "all" => all_scenario_names().into_iter().for_each(&mut push),
            "smoke" => SMOKE.iter().map(|s| (*s).to_string()).for_each(&mut push),
            other => push(other.to_string()),
        }
    }
    out
}

fn fairness_ceiling(seed: u64) -> Result<()> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let threshold: u32 = rng.gen_range(2..=5);
    let cooldown: u64 = rng.gen_range(1_000..=10_000);
    let mut ledger = FailLedger::new(threshold, cooldown);
    let key = TargetKey::from_label("submit");

    let mut now = 0_u64;
    let mut trips = 0;
    for _ in 0..400 {
        now += rng.gen_range(10..=800);
        match ledger.check(&key, now) {
            Eligibility::Suppressed { until_ms } => {
                ensure!(now < until_ms, "suppression outlived its deadline ({now} >= {until_ms})");
                ensure!(
                    ledger.record_failure(&key, now).is_none(),
                    "failure counted while suppressed at {now}"
                );
            }
            Eligibility::Eligible => {
                ensure!(
                    ledger.count(&key) < threshold,
                    "eligible target already at {} failures",
                    ledger.count(&key)
                );
                if rng.gen_bool(0.8) {
                    if let Some(until) = ledger.record_failure(&key, now) {
                        trips += 1;
                        ensure!(until == now + cooldown, "cooldown {until} != {now}+{cooldown}");
                        ensure!(
                            ledger.count(&key) == threshold,
                            "tripped at {} failures, threshold {threshold}",
                            ledger.count(&key)
                        );
                    }
                } else {
                    ledger.record_pass(&key);
                    ensure!(ledger.count(&key) == 0, "pass did not reset the streak");
                }
            }
        }
    }
    ensure!(trips > 0, "threshold {threshold} never tripped");
    Ok(())
}

fn pity_halving(seed: u64) -> Result<()> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    for _ in 0..100 {
        let base: f64 = rng.gen_range(0.0..=1.0);
        let halved = with_pity_adjustment(base, true);
        ensure!((halved - base * 0.5).abs() < 1e-12, "pity({base}) = {halved}");
        ensure!(
            with_pity_adjustment(base, false).to_bits() == base.to_bits(),
            "pity off changed {base}"
        );
    }

    let base = rng.gen_range(0.3..0.9);
    let adjusted = with_pity_adjustment(base, true);
    let trials = 20_000;
    let hits = (0..trials).filter(|_| roll(&mut rng, adjusted)).count();
    #[allow(clippy::cast_precision_loss)]
    let rate = hits as f64 / f64::from(trials);
    ensure!(
        (rate - base * 0.5).abs() < 0.03,
        "observed rate {rate:.3} for pity-adjusted {base:.3}"
    );
    ensure!(!roll(&mut rng, 0.0), "zero probability fired");
    ensure!(!roll(&mut rng, f64::NAN), "NaN probability fired");
    Ok(())
}

fn weighted_selection(seed: u64) -> Result<()> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let weights = [3.0, 1.0, 0.0, 6.0];
    let mut counts = [0_u32; 4];
    let draws = 20_000;
    for _ in 0..draws {
        let draw: f64 = rng.r#gen();
        let idx = weighted_pick(&weights, draw)
            .ok_or_else(|| anyhow::anyhow!("no pick from non-empty weights"))?;
        counts[idx] += 1;
    }
    ensure!(counts[2] == 0, "zero-weight candidate chosen {} times", counts[2]);
    for (idx, expected) in [(0, 0.3), (1, 0.1), (3, 0.6)] {
        let share = f64::from(counts[idx]) / f64::from(draws);
        ensure!(
            (share - expected).abs() < 0.02,
            "candidate {idx} share {share:.3}, expected {expected}"
        );
    }
    ensure!(weighted_pick(&[], 0.5).is_none(), "empty slice produced a pick");
    ensure!(
        weighted_pick(&weights, 1.0) == Some(3),
        "top-of-range draw did not fall back to the last candidate"
    );
    Ok(())
}

fn scheduler_cooldowns(seed: u64) -> Result<()> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let catalog = builtin_catalog();
    let catastrophic_cooldown_ms = rng.gen_range(30_000..=90_000);
    let mut now = 0_u64;
    let mut last_event_at: Option<u64> = None;
    let mut fired = 0;

    for _ in 0..2_000 {
        now += rng.gen_range(500..=20_000);
        let request = TourRequest {
            phase: Phase::ALL[rng.gen_range(0..Phase::ALL.len())],
            trigger: TourTrigger::ALL[rng.gen_range(0..TourTrigger::ALL.len())],
            now_ms: now,
            last_event_at,
            catastrophic_cooldown_ms,
            base_chance: if rng.gen_bool(0.5) { 1.0 } else { 0.4 },
        };
        let Some(pick) = schedule_tour_event(&catalog, &request, &mut rng) else {
            continue;
        };
        let event = &pick.event;
        ensure!(event.runs_in(request.phase), "{} fired outside its phases", event.id);
        ensure!(event.trigger == request.trigger, "{} fired on the wrong trigger", event.id);
        if let Some(last) = last_event_at {
            let gap = now - last;
            ensure!(gap >= event.cooldown_ms, "{} fired {gap}ms after the last event", event.id);
            ensure!(
                !event.effect.is_catastrophic() || gap >= catastrophic_cooldown_ms,
                "catastrophic {} fired {gap}ms after the last event",
                event.id
            );
        }
        ensure!(pick.trace.chosen_id == event.id, "trace names {}", pick.trace.chosen_id);
        ensure!(
            pick.trace.candidates.iter().any(|c| c.id == event.id),
            "{} missing from its own candidate list",
            event.id
        );
        last_event_at = Some(now);
        fired += 1;
    }
    ensure!(fired > 0, "no tour event fired in 2000 offers");
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetadataArrival {
    BeforeEntry,
    WithinGrace,
    AfterFallback,
    Never,
}

fn gate_milestones(seed: u64) -> Result<()> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let cfg = GateConfig::default();
    let band = cfg.band;
    let mut gate = GateMachine::new(cfg.clone());

    let arrival = match rng.gen_range(0..4) {
        0 => MetadataArrival::BeforeEntry,
        1 => MetadataArrival::WithinGrace,
        2 => MetadataArrival::AfterFallback,
        _ => MetadataArrival::Never,
    };
    let metadata_ms: u64 = rng.gen_range(4_000..=30_000);
    let entry_at: u64 = rng.gen_range(200..=3_000);

    gate.arm(0);
    let mut outputs: Vec<(u64, GateOutput)> = Vec::new();
    if arrival == MetadataArrival::BeforeEntry {
        let early = gate.metadata_loaded(entry_at / 2, metadata_ms);
        ensure!(early.is_empty(), "metadata before entry started the timeline");
    }
    outputs.extend(gate.confirm_entry(entry_at).into_iter().map(|o| (entry_at, o)));

    let mut pending_metadata = match arrival {
        MetadataArrival::WithinGrace => {
            Some(entry_at + rng.gen_range(0..cfg.metadata_grace_ms))
        }
        MetadataArrival::AfterFallback => {
            Some(entry_at + cfg.metadata_grace_ms + rng.gen_range(100..=3_000))
        }
        MetadataArrival::BeforeEntry | MetadataArrival::Never => None,
    };

    let mut steps = 0;
    while let Some(deadline) = gate.next_deadline() {
        steps += 1;
        ensure!(steps < 100_000, "gate timers never drained");
        if let Some(at) = pending_metadata
            && at <= deadline
        {
            pending_metadata = None;
            outputs.extend(gate.metadata_loaded(at, metadata_ms).into_iter().map(|o| (at, o)));
            continue;
        }
        let batch = gate.advance(deadline, &mut rng);
        let truth = gate.true_progress(deadline);
        for output in &batch {
            if let GateOutput::Progress { percent, beat } = output {
                ensure!((0.0..=100.0).contains(percent), "display {percent} out of range");
                let keeps_band = !matches!(beat, ProgressBeat::FalseComplete | ProgressBeat::Latched);
                if keeps_band && let Some(truth) = truth {
                    let lo = (truth - band).max(0.0);
                    let hi = (truth + band).min(99.0);
                    ensure!(
                        *percent >= lo - 1e-9 && *percent <= hi + 1e-9,
                        "{beat:?} to {percent:.2} at {deadline}, truth {truth:.2}"
                    );
                }
            }
        }
        outputs.extend(batch.into_iter().map(|o| (deadline, o)));
    }

    let position = |pred: &dyn Fn(&GateOutput) -> bool| outputs.iter().position(|(_, o)| pred(o));
    let count = |pred: &dyn Fn(&GateOutput) -> bool| outputs.iter().filter(|(_, o)| pred(o)).count();

    let starts = count(&|o| matches!(o, GateOutput::Started { .. }));
    let releases = count(&|o| matches!(o, GateOutput::Released));
    let fades = count(&|o| matches!(o, GateOutput::FadeStarted));
    ensure!(starts == 1, "timeline started {starts} times");
    ensure!(releases == 1, "released {releases} times");
    ensure!(fades == 1, "fade started {fades} times");

    let latched = position(&|o| {
        matches!(
            o,
            GateOutput::Progress {
                beat: ProgressBeat::Latched,
                ..
            }
        )
    });
    let fade = position(&|o| matches!(o, GateOutput::FadeStarted));
    let release = position(&|o| matches!(o, GateOutput::Released));
    ensure!(
        latched.is_some() && latched <= fade && fade < release,
        "milestones out of order: latch {latched:?} fade {fade:?} release {release:?}"
    );

    let started_with = outputs.iter().find_map(|(at, o)| match o {
        GateOutput::Started {
            duration_ms,
            source,
        } => Some((*at, *duration_ms, *source)),
        _ => None,
    });
    let release_at = release.map_or(0, |idx| outputs[idx].0);
    match (arrival, started_with) {
        (MetadataArrival::BeforeEntry | MetadataArrival::WithinGrace, Some((_, duration, source))) => {
            ensure!(source == DurationSource::Metadata, "metadata in time but {source:?} start");
            ensure!(duration == metadata_ms, "started with {duration}ms, metadata {metadata_ms}ms");
        }
        (MetadataArrival::AfterFallback, Some((_, duration, source))) => {
            ensure!(source == DurationSource::Fallback, "late metadata but {source:?} start");
            ensure!(duration == cfg.fallback_duration_ms, "fallback start used {duration}ms");
            ensure!(
                outputs
                    .iter()
                    .any(|(_, o)| *o == GateOutput::DurationCorrected { duration_ms: metadata_ms }),
                "late metadata never corrected the duration"
            );
        }
        (MetadataArrival::Never, Some((start_at, duration, source))) => {
            ensure!(source == DurationSource::Fallback, "no metadata but {source:?} start");
            ensure!(
                start_at == entry_at + cfg.metadata_grace_ms,
                "fallback started at {start_at}"
            );
            ensure!(duration == cfg.fallback_duration_ms, "fallback start used {duration}ms");
            ensure!(release_at >= cfg.min_visible_ms, "released after only {release_at}ms");
        }
        (_, None) => anyhow::bail!("timeline never started"),
    }

    ensure!(gate.state() == GateState::Released, "ended in {:?}", gate.state());
    ensure!(gate.pending_timers() == 0, "{} timers left after release", gate.pending_timers());
    ensure!(gate.timeline().is_none(), "timeline survived release");
    ensure!((gate.display_percent() - 100.0).abs() < f64::EPSILON, "display not latched at 100");
    ensure!(
        gate.advance(release_at + 60_000, &mut rng).is_empty(),
        "released gate kept producing output"
    );
    ensure!(gate.disarm(release_at + 60_000).is_empty(), "released gate accepted a disarm");
    Ok(())
}

fn gate_disarm(seed: u64) -> Result<()> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut gate = GateMachine::new(GateConfig::default());
    gate.arm(0);
    let entry_at = rng.gen_range(100..=1_000);
    gate.confirm_entry(entry_at);

    let cut: u64 = rng.gen_range(entry_at..=12_000);
    while let Some(deadline) = gate.next_deadline().filter(|at| *at < cut) {
        for output in gate.advance(deadline, &mut rng) {
            ensure!(output != GateOutput::Released, "released before {cut}");
        }
    }
    ensure!(gate.state().is_blocking(), "not blocking before disarm: {:?}", gate.state());

    ensure!(gate.disarm(cut) == vec![GateOutput::Disarmed], "disarm output mismatch");
    ensure!(gate.pending_timers() == 0, "{} timers survived disarm", gate.pending_timers());
    ensure!(gate.timeline().is_none(), "timeline survived disarm");
    ensure!(gate.advance(cut + 120_000, &mut rng).is_empty(), "disarmed gate produced output");
    ensure!(gate.disarm(cut + 1).is_empty(), "second disarm produced output");

    let cycle = gate.arm_cycle();
    gate.arm(cut + 10);
    ensure!(gate.arm_cycle() == cycle + 1, "re-arm did not start a new cycle");
    ensure!(gate.state() == GateState::Booting, "re-armed into {:?}", gate.state());
    ensure!(gate.started_at().is_none(), "re-armed gate resumed the old timeline");
    ensure!(gate.display_percent().abs() < f64::EPSILON, "re-armed gate kept its display");
    Ok(())
}

fn settle_audio(
    audio: &mut AudioNegotiator,
    autoplay_allowed: bool,
    now_ms: u64,
    mut commands: Vec<AudioCommand>,
) {
    while let Some(command) = commands.pop() {
        if let AudioCommand::Play { muted, .. } = command {
            if muted || autoplay_allowed {
                commands.extend(audio.play_resolved(now_ms));
            } else {
                commands.extend(audio.play_rejected(now_ms, &PlayRejection::NotAllowed));
            }
        }
    }
}

fn blocked_start_waits_for_gesture(volume: f64, gesture_at: u64) -> Result<()> {
    let mut audio = AudioNegotiator::new(AudioConfig::default());
    audio.start(volume);
    audio.play_rejected(0, &PlayRejection::NotAllowed);
    audio.play_rejected(0, &PlayRejection::NotAllowed);
    ensure!(
        audio.state() == AudioPlaybackState::Blocked,
        "refused muted play left {:?}",
        audio.state()
    );
    ensure!(audio.next_deadline().is_none(), "blocked audio kept a timer");
    let commands = audio.user_gesture(gesture_at).into_vec();
    settle_audio(&mut audio, true, gesture_at, commands);
    ensure!(
        audio.state() == AudioPlaybackState::AudiblePlaying,
        "gesture after a block left {:?}",
        audio.state()
    );
    Ok(())
}

fn autoplay_negotiation(seed: u64) -> Result<()> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let cfg = AudioConfig::default();
    let retry = cfg.promotion_retry_ms;
    let volume: f64 = rng.gen_range(0.2..=1.0);
    blocked_start_waits_for_gesture(volume, rng.gen_range(1..10_000))?;
    let mut audio = AudioNegotiator::new(cfg);
    let mut allowed = rng.gen_bool(0.2);

    let start = audio.start(volume).into_vec();
    settle_audio(&mut audio, allowed, 0, start);
    if allowed {
        ensure!(
            audio.state() == AudioPlaybackState::AudiblePlaying,
            "permitted autoplay ended in {:?}",
            audio.state()
        );
        ensure!(audio.promotion_attempts() == 0, "promoted without being muted");
        return Ok(());
    }
    ensure!(
        audio.state() == AudioPlaybackState::MutedPlaying,
        "blocked autoplay ended in {:?}",
        audio.state()
    );

    let mut now = 0;
    let retries = rng.gen_range(1..=8);
    for _ in 0..retries {
        now = audio
            .next_deadline()
            .ok_or_else(|| anyhow::anyhow!("no promotion pending while muted"))?;
        let commands = audio.advance(now).into_vec();
        settle_audio(&mut audio, allowed, now, commands);
        ensure!(audio.state() == AudioPlaybackState::MutedPlaying, "retry left {:?}", audio.state());
        ensure!(
            audio.next_deadline() == Some(now + retry),
            "next retry at {:?}, expected {}",
            audio.next_deadline(),
            now + retry
        );
    }

    allowed = true;
    let gesture_at = now + rng.gen_range(1..retry);
    let commands = audio.user_gesture(gesture_at).into_vec();
    settle_audio(&mut audio, allowed, gesture_at, commands);
    ensure!(
        audio.state() == AudioPlaybackState::AudiblePlaying,
        "gesture left {:?}",
        audio.state()
    );
    ensure!(!audio.promotion_scheduled(), "promotion still scheduled after a gesture");

    let mut last_volume = 0.0;
    let mut steps = 0;
    while let Some(at) = audio.next_deadline() {
        steps += 1;
        ensure!(steps < 1_000, "volume ramp never finished");
        for command in audio.advance(at) {
            if let AudioCommand::SetVolume { volume: step } = command {
                ensure!(step + 1e-12 >= last_volume, "ramp went down: {last_volume} -> {step}");
                last_volume = step;
            }
        }
    }
    ensure!(
        (last_volume - volume).abs() < 1e-9,
        "ramp ended at {last_volume}, target {volume}"
    );
    Ok(())
}

fn track_queue_exhaustion(seed: u64) -> Result<()> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let len: usize = rng.gen_range(1..=6);
    let tracks: Vec<String> = (0..len).map(|i| format!("/audio/visit-{i}.mp3")).collect();

    let mut queue = TrackQueue::new(tracks.clone(), &mut rng);
    if len > 1 {
        let mut previous = queue.current().map(str::to_string);
        for _ in 0..len * 10 {
            let next = queue.advance(&mut rng).map(str::to_string);
            ensure!(next.is_some(), "healthy queue ran dry");
            ensure!(next != previous, "track {next:?} repeated back to back");
            previous = next;
        }
    }

    let mut queue = TrackQueue::new(tracks, &mut rng);
    queue.record_failure(&mut rng);
    queue.record_success();
    ensure!(queue.failure_streak() == 0, "success did not clear the failure streak");

    let limit = len * 2;
    for attempt in 1..=limit {
        let step = queue.record_failure(&mut rng);
        if attempt < limit {
            ensure!(matches!(step, QueueStep::Play(_)), "gave up after {attempt} of {limit} failures");
        } else {
            ensure!(step == QueueStep::Exhausted, "still playing after {limit} failures");
        }
    }
    ensure!(queue.is_exhausted(), "queue not marked exhausted");
    ensure!(queue.current().is_none(), "exhausted queue still names a track");
    ensure!(queue.advance(&mut rng).is_none(), "exhausted queue advanced");
    Ok(())
}

fn hostile_session(seed: u64) -> Result<()> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut cfg = EngineConfig::default();
    cfg.zone.activation_probability = PhaseTable::new(0.1, 0.2, 0.5);
    cfg.zone.fail_disable_threshold = 3;
    let mut engine = TrapEngine::new(&cfg, seed);
    engine.set_phase(Phase::Three);
    engine.set_pity(false);

    let zone = TargetKey::from_label("newsletter-signup");
    let button = TargetKey::from_label("signup-button");
    let mut deferred = 0_usize;
    let mut redispatched = 0_usize;
    let mut now = 0_u64;

    for _ in 0..1_500 {
        now += rng.gen_range(40..=200);
        redispatched += engine.take_due_taps(now).len();
        let event = if rng.gen_bool(0.15) {
            HostileEvent::Tap(ZonePointer {
                zone,
                pointer: PointerKind::Touch,
                gesture: ZoneGesture::Tap,
                synthetic: false,
            })
        } else {
            HostileEvent::PointerMove {
                sample: PointerSample {
                    target: button,
                    kind: TargetKind::Button,
                    x: rng.gen_range(0.0..320.0),
                    y: rng.gen_range(0.0..48.0),
                },
                zone: Some(ZonePointer {
                    zone,
                    pointer: PointerKind::Mouse,
                    gesture: ZoneGesture::Move {
                        motion_px: rng.gen_range(8.0..40.0),
                    },
                    synthetic: false,
                }),
            }
        };
        match engine.handle(now, &event) {
            Some(EngineEffect::Zone(ZoneEffect::DeferTap {
                redispatch_at_ms, ..
            })) => {
                ensure!(redispatch_at_ms >= now, "tap re-dispatch scheduled in the past");
                deferred += 1;
            }
            Some(EngineEffect::Zone(ZoneEffect::Nudge { decoy_until_ms, .. })) => {
                ensure!(decoy_until_ms >= now, "decoy window closed before it opened");
            }
            _ => {}
        }
    }
    redispatched += engine.take_due_taps(u64::MAX).len();

    ensure!(deferred == redispatched, "{deferred} taps held, {redispatched} released");
    ensure!(engine.zone().suppressions() >= 1, "zone never relaxed");
    ensure!(
        engine.intercepted() == engine.incidents().total(),
        "{} intercepts but {} incidents",
        engine.intercepted(),
        engine.incidents().total()
    );
    Ok(())
}

fn signal_once(seed: u64) -> Result<()> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut bus = SignalBus::new();
    let session = SharedSession::default();
    track_session(&mut bus, &session);

    let once = [
        Signal::EntryConfirmed,
        Signal::GateReleased,
        Signal::VisitMusicStarted,
        Signal::VisitMusicAudible,
    ];
    for signal in &once {
        let repeats = rng.gen_range(1..=5);
        let delivered = (0..repeats).filter(|_| bus.emit(signal)).count();
        ensure!(delivered == 1, "{signal} delivered {delivered} times");
        ensure!(
            Signal::from_dom(signal.dom_name(), None).as_ref() == Some(signal),
            "{signal} does not parse back from its event name"
        );
    }
    ensure!(bus.emitted() == 4, "bus counted {} emissions", bus.emitted());

    let scenes = ["certificate", "broadcast", "finale"];
    let mut model: BTreeSet<String> = BTreeSet::new();
    for _ in 0..50 {
        let scene = scenes[rng.gen_range(0..scenes.len())].to_string();
        let signal = if rng.gen_bool(0.5) {
            model.insert(scene.clone());
            Signal::AudioSceneLock { scene }
        } else {
            model.remove(&scene);
            Signal::AudioSceneRelease { scene }
        };
        ensure!(bus.emit(&signal), "scene signal {signal} dropped");
    }

    let state = session.borrow();
    ensure!(state.entry_confirmed && state.gate_released, "lifecycle flags not set");
    ensure!(state.music_started && state.music_audible, "music flags not set");
    ensure!(!state.gate_armed, "gate still armed after release");
    ensure!(state.scene_locks == model, "scene locks {:?}, expected {model:?}", state.scene_locks);
    ensure!(
        state.soundscape_muted() == !model.is_empty(),
        "soundscape mute disagrees with locks"
    );
    ensure!(
        Signal::from_dom("audio-scene-lock", Some("  ")).is_none(),
        "blank scene accepted"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_scenario_passes_for_a_handful_of_seeds() {
        for (name, _, check) in CATALOG {
            for seed in [1_u64, 7, 1337, 0xDEAD_BEEF] {
                if let Err(err) = check(seed) {
                    panic!("{name} failed for seed {seed}: {err:#}");
                }
            }
        }
    }

    #[test]
    fn smoke_and_all_expand_without_duplicates() {
        let expanded = expand_scenarios(&["smoke".to_string(), "all".to_string()]);
        assert_eq!(expanded.len(), CATALOG.len());
        assert_eq!(expanded[0], "fairness-ceiling");
        assert!(expanded.iter().all(|name| get_scenario(name).is_some()));
    }

    #[test]
    fn unknown_names_pass_through_expansion() {
        let expanded = expand_scenarios(&["nope".to_string()]);
        assert_eq!(expanded, vec!["nope"]);
        assert!(get_scenario("nope").is_none());
    }

    #[test]
    fn listing_includes_smoke_alias() {
        let listed = list_scenarios();
        assert_eq!(listed[0].0, "smoke");
        assert_eq!(listed.len(), CATALOG.len() + 1);
    }
}
