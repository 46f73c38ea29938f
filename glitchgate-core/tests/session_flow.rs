use glitchgate_core::traps::{PointerKind, PointerSample, TargetKind, ZoneGesture, ZonePointer};
use glitchgate_core::{
    AudioChannel, AudioCommand, AudioConfig, AudioNegotiator, AudioOwner, AudioPlaybackState,
    EngineConfig, GateConfig, GateMachine, GateOutput, GateState, HostileEvent, MusicQueue, Phase,
    PhaseTable, PlayRejection, SharedSession, Signal, SignalBus, Surface, TargetKey, TrapEngine,
    track_session,
};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use std::rc::Rc;

/// Browser stand-in: unmuted `play()` is refused until a gesture happened.
struct AutoplayPolicy {
    activated: bool,
}

impl AutoplayPolicy {
    fn answer(&self, cmd: &AudioCommand) -> Option<Result<(), PlayRejection>> {
        match cmd {
            AudioCommand::Play { muted, .. } => Some(if *muted || self.activated {
                Ok(())
            } else {
                Err(PlayRejection::NotAllowed)
            }),
            _ => None,
        }
    }
}

fn settle(
    audio: &mut AudioNegotiator,
    policy: &AutoplayPolicy,
    now_ms: u64,
    mut cmds: Vec<AudioCommand>,
) {
    while let Some(cmd) = cmds.pop() {
        match policy.answer(&cmd) {
            Some(Ok(())) => cmds.extend(audio.play_resolved(now_ms)),
            Some(Err(rejection)) => cmds.extend(audio.play_rejected(now_ms, &rejection)),
            None => {}
        }
    }
}

#[test]
fn blocked_autoplay_converges_to_muted_then_gesture_makes_it_audible() {
    let cfg = AudioConfig::default();
    let retry = cfg.promotion_retry_ms;
    let mut audio = AudioNegotiator::new(cfg);
    let mut policy = AutoplayPolicy { activated: false };

    let cmds = audio.start(0.6).into_vec();
    settle(&mut audio, &policy, 0, cmds);
    assert_eq!(audio.state(), AudioPlaybackState::MutedPlaying);
    assert!(audio.promotion_scheduled());

    let mut now = 0;
    for _ in 0..5 {
        now = audio.next_deadline().expect("promotion retry pending");
        let cmds = audio.advance(now).into_vec();
        settle(&mut audio, &policy, now, cmds);
        assert_eq!(audio.state(), AudioPlaybackState::MutedPlaying);
        assert_eq!(audio.next_deadline(), Some(now + retry));
    }

    policy.activated = true;
    let cmds = audio.user_gesture(now + 10).into_vec();
    settle(&mut audio, &policy, now + 10, cmds);
    assert_eq!(audio.state(), AudioPlaybackState::AudiblePlaying);
    assert!(!audio.promotion_scheduled());
}

#[test]
fn hostile_session_relaxes_trap_zone_without_panicking() {
    let mut cfg = EngineConfig::default();
    cfg.zone.activation_probability = PhaseTable::new(0.1, 0.2, 0.5);
    cfg.zone.fail_disable_threshold = 3;
    let mut engine = TrapEngine::new(&cfg, 2024);
    engine.set_phase(Phase::Three);
    engine.set_pity(false);

    let zone = TargetKey::from_label("newsletter-signup");
    for step in 0..1_000_u64 {
        let now = step * 100;
        let event = HostileEvent::PointerMove {
            sample: PointerSample {
                target: TargetKey::from_label("signup-button"),
                kind: TargetKind::Button,
                x: 40.0 + (step % 17) as f64,
                y: 12.0,
            },
            zone: Some(ZonePointer {
                zone,
                pointer: PointerKind::Mouse,
                gesture: ZoneGesture::Move { motion_px: 12.0 },
                synthetic: false,
            }),
        };
        engine.handle(now, &event);
    }
    assert!(engine.zone().suppressions() >= 1);
    assert!(engine.incidents().total() > 0);
    assert!(engine.incidents().count_for(Surface::Zone) > 0);
}

#[test]
fn gate_release_hands_audio_to_music_exactly_once() {
    let mut rng = SmallRng::seed_from_u64(77);
    let mut bus = SignalBus::new();
    let session: SharedSession = SharedSession::default();
    track_session(&mut bus, &session);

    let mut gate = GateMachine::new(GateConfig::default());
    let mut channel = AudioChannel::new(AudioConfig::default(), AudioOwner::Gate);
    let mut music = MusicQueue::new(
        vec![String::from("/a.mp3"), String::from("/b.mp3")],
        0.45,
        &mut rng,
    );

    gate.arm(0);
    session.borrow_mut().gate_armed = true;
    channel
        .play(AudioOwner::Gate, "/audio/gate-theme.mp3", 0.6)
        .expect("gate owns the channel");
    channel.play_resolved(20);

    assert!(bus.emit(&Signal::EntryConfirmed));
    assert!(gate.confirm_entry(50).is_empty());
    assert!(matches!(
        gate.metadata_loaded(400, 8_000).as_slice(),
        [GateOutput::Started { duration_ms: 8_000, .. }]
    ));
    assert!(music.start(&mut channel).is_err());

    let mut releases = 0;
    while let Some(deadline) = gate.next_deadline() {
        for output in gate.advance(deadline, &mut rng) {
            if let Some(signal) = output.signal() {
                assert!(bus.emit(&signal));
                releases += 1;
            }
        }
    }
    assert!(gate.advance(60_000, &mut rng).is_empty());
    assert_eq!(releases, 1);
    assert_eq!(gate.state(), GateState::Released);
    assert!(!bus.emit(&Signal::GateReleased));

    let owner = session.borrow().audio_owner;
    assert_eq!(owner, AudioOwner::Music);
    channel
        .hand_over(AudioOwner::Gate, owner)
        .expect("gate still owned the channel");
    let step = music.start(&mut channel).expect("music owns the channel");
    assert!(matches!(step.commands.first(), Some(AudioCommand::Load { .. })));
    let step = music.on_play_resolved(&mut channel, 9_000);
    for signal in &step.signals {
        bus.emit(signal);
    }
    assert!(session.borrow().music_started);
    assert!(session.borrow().music_audible);
    assert!(Rc::strong_count(&session) >= 2);
}
