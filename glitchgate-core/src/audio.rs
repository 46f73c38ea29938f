//! Autoplay negotiation for a single `<audio>` element.
//!
//! [`AudioNegotiator`] never touches media itself. It emits
//! [`AudioCommand`]s, and the driver reports back whether the last `play()`
//! resolved or was rejected. Promotion retries and the volume ramp are timers
//! the driver fires through [`AudioNegotiator::advance`].
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;

use crate::bus::Signal;
use crate::config::AudioConfig;
use crate::timers::TimerQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioPlaybackState {
    Idle,
    /// A source is loaded and nothing has asked it to play yet.
    Primed,
    /// A `play()` is in flight.
    Starting { muted: bool },
    MutedPlaying,
    /// Muted playback is running and an unmuted `play()` is in flight.
    Promoting,
    AudiblePlaying,
    /// Even muted playback was refused; waiting for a user gesture.
    Blocked,
    Paused,
    /// The source played to its end.
    Ended,
    /// Decoding or network failure on the current source.
    Error,
}

impl AudioPlaybackState {
    #[must_use]
    pub const fn is_playing(self) -> bool {
        matches!(self, Self::MutedPlaying | Self::Promoting | Self::AudiblePlaying)
    }
}

/// Why a `play()` promise rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayRejection {
    /// Browser autoplay policy (`NotAllowedError`). A normal branch, not an error.
    NotAllowed,
    /// Decoding or network failure.
    Media(String),
}

impl PlayRejection {
    /// Classify a DOM exception name.
    #[must_use]
    pub fn from_dom_name(name: &str, message: &str) -> Self {
        if name == "NotAllowedError" {
            Self::NotAllowed
        } else {
            Self::Media(format!("{name}: {message}"))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum AudioCommand {
    Load { url: String },
    Play { muted: bool, volume: f64 },
    SetMuted { muted: bool },
    SetVolume { volume: f64 },
    Pause,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AudioTimer {
    Promote,
    RampStep,
}

pub type AudioCommands = SmallVec<[AudioCommand; 2]>;

#[derive(Debug, Clone)]
pub struct AudioNegotiator {
    cfg: AudioConfig,
    state: AudioPlaybackState,
    target_volume: f64,
    ramp_started_at: Option<u64>,
    promotion_attempts: u32,
    timers: TimerQueue<AudioTimer>,
}

impl AudioNegotiator {
    #[must_use]
    pub fn new(cfg: AudioConfig) -> Self {
        Self {
            cfg,
            state: AudioPlaybackState::Idle,
            target_volume: 1.0,
            ramp_started_at: None,
            promotion_attempts: 0,
            timers: TimerQueue::new(),
        }
    }

    #[must_use]
    pub const fn state(&self) -> AudioPlaybackState {
        self.state
    }

    #[must_use]
    pub const fn in_flight(&self) -> bool {
        matches!(
            self.state,
            AudioPlaybackState::Starting { .. } | AudioPlaybackState::Promoting
        )
    }

    #[must_use]
    pub const fn promotion_attempts(&self) -> u32 {
        self.promotion_attempts
    }

    #[must_use]
    pub fn next_deadline(&self) -> Option<u64> {
        self.timers.next_deadline()
    }

    #[must_use]
    pub fn promotion_scheduled(&self) -> bool {
        self.timers.contains_kind(&AudioTimer::Promote)
    }

    /// Begin playback at `volume`. Ignored while playing or while a `play()` is in flight.
    pub fn start(&mut self, volume: f64) -> AudioCommands {
        if self.in_flight() || self.state.is_playing() {
            log::debug!("audio start ignored in state {:?}", self.state);
            return AudioCommands::new();
        }
        self.target_volume = volume.clamp(0.0, 1.0);
        self.ramp_started_at = None;
        self.state = AudioPlaybackState::Starting { muted: false };
        smallvec::smallvec![AudioCommand::Play {
            muted: false,
            volume: self.target_volume,
        }]
    }

    pub fn play_resolved(&mut self, now_ms: u64) -> AudioCommands {
        match self.state {
            AudioPlaybackState::Starting { muted: false } => {
                self.state = AudioPlaybackState::AudiblePlaying;
                AudioCommands::new()
            }
            AudioPlaybackState::Starting { muted: true } => {
                self.state = AudioPlaybackState::MutedPlaying;
                self.schedule_promotion(now_ms.saturating_add(self.cfg.promotion_delay_ms));
                AudioCommands::new()
            }
            AudioPlaybackState::Promoting => {
                self.state = AudioPlaybackState::AudiblePlaying;
                self.ramp_started_at = Some(now_ms);
                self.timers.schedule(
                    now_ms.saturating_add(self.cfg.ramp_step_ms.max(1)),
                    AudioTimer::RampStep,
                );
                log::debug!("audio promoted to audible after {} attempts", self.promotion_attempts);
                AudioCommands::new()
            }
            _ => AudioCommands::new(),
        }
    }

    pub fn play_rejected(&mut self, now_ms: u64, rejection: &PlayRejection) -> AudioCommands {
        match (self.state, rejection) {
            (AudioPlaybackState::Starting { muted: false }, PlayRejection::NotAllowed) => {
                self.state = AudioPlaybackState::Starting { muted: true };
                smallvec::smallvec![AudioCommand::Play {
                    muted: true,
                    volume: 0.0,
                }]
            }
            (AudioPlaybackState::Promoting, PlayRejection::NotAllowed) => {
                self.state = AudioPlaybackState::MutedPlaying;
                self.schedule_promotion(now_ms.saturating_add(self.cfg.promotion_retry_ms));
                smallvec::smallvec![
                    AudioCommand::SetMuted { muted: true },
                    AudioCommand::SetVolume { volume: 0.0 },
                ]
            }
            (AudioPlaybackState::Starting { muted: true }, PlayRejection::NotAllowed) => {
                log::debug!("muted playback refused; waiting for a gesture");
                self.state = AudioPlaybackState::Blocked;
                AudioCommands::new()
            }
            (_, PlayRejection::Media(reason)) => {
                self.media_error(reason);
                AudioCommands::new()
            }
            _ => AudioCommands::new(),
        }
    }

    /// A real user gesture: promote immediately, or restart a blocked start.
    pub fn user_gesture(&mut self, _now_ms: u64) -> AudioCommands {
        match self.state {
            AudioPlaybackState::MutedPlaying => {
                self.timers.cancel_kind(&AudioTimer::Promote);
                self.promote()
            }
            AudioPlaybackState::Blocked => self.start(self.target_volume),
            _ => AudioCommands::new(),
        }
    }

    /// The element fired `ended`.
    pub fn ended(&mut self) {
        self.timers.cancel_all();
        self.ramp_started_at = None;
        self.state = AudioPlaybackState::Ended;
    }

    /// The element fired `error`, or a `play()` failed for a media reason.
    pub fn media_error(&mut self, reason: &str) {
        log::warn!("audio playback failed: {reason}");
        self.timers.cancel_all();
        self.ramp_started_at = None;
        self.state = AudioPlaybackState::Error;
    }

    /// Fire due promotion and ramp timers.
    pub fn advance(&mut self, now_ms: u64) -> AudioCommands {
        let mut out = AudioCommands::new();
        while let Some((at, timer)) = self.timers.pop_due(now_ms) {
            match timer {
                AudioTimer::Promote => {
                    if self.state == AudioPlaybackState::MutedPlaying {
                        out.extend(self.promote());
                    }
                }
                AudioTimer::RampStep => {
                    if let Some(started) = self.ramp_started_at {
                        let ramp = self.cfg.ramp_ms.max(1);
                        let fraction = (at.saturating_sub(started) as f64 / ramp as f64).min(1.0);
                        out.push(AudioCommand::SetVolume {
                            volume: self.target_volume * fraction,
                        });
                        if fraction < 1.0 {
                            self.timers.schedule(
                                at.saturating_add(self.cfg.ramp_step_ms.max(1)),
                                AudioTimer::RampStep,
                            );
                        } else {
                            self.ramp_started_at = None;
                        }
                    }
                }
            }
        }
        out
    }

    pub fn pause(&mut self) -> AudioCommands {
        self.timers.cancel_all();
        self.ramp_started_at = None;
        self.state = AudioPlaybackState::Paused;
        smallvec::smallvec![AudioCommand::Pause]
    }

    /// Forget everything about the current source, e.g. before loading the next track.
    pub fn reset(&mut self) {
        self.timers.cancel_all();
        self.ramp_started_at = None;
        self.promotion_attempts = 0;
        self.state = AudioPlaybackState::Idle;
    }

    /// A fresh source was loaded and awaits `start`.
    pub fn prime(&mut self) {
        self.reset();
        self.state = AudioPlaybackState::Primed;
    }

    fn schedule_promotion(&mut self, at: u64) {
        self.timers.cancel_kind(&AudioTimer::Promote);
        self.timers.schedule(at, AudioTimer::Promote);
    }

    fn promote(&mut self) -> AudioCommands {
        self.state = AudioPlaybackState::Promoting;
        self.promotion_attempts = self.promotion_attempts.saturating_add(1);
        smallvec::smallvec![AudioCommand::Play {
            muted: false,
            volume: 0.0,
        }]
    }
}

/// Who may drive a shared channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioOwner {
    Gate,
    Music,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{caller:?} does not own the audio channel (owner: {owner:?})")]
pub struct NotOwner {
    pub caller: AudioOwner,
    pub owner: AudioOwner,
}

/// One `<audio>` element with exactly one writer at a time.
#[derive(Debug, Clone)]
pub struct AudioChannel {
    owner: AudioOwner,
    negotiator: AudioNegotiator,
    refused: u32,
}

impl AudioChannel {
    #[must_use]
    pub fn new(cfg: AudioConfig, owner: AudioOwner) -> Self {
        Self {
            owner,
            negotiator: AudioNegotiator::new(cfg),
            refused: 0,
        }
    }

    #[must_use]
    pub const fn owner(&self) -> AudioOwner {
        self.owner
    }

    #[must_use]
    pub const fn negotiator(&self) -> &AudioNegotiator {
        &self.negotiator
    }

    #[must_use]
    pub const fn state(&self) -> AudioPlaybackState {
        self.negotiator.state()
    }

    #[must_use]
    pub const fn refused(&self) -> u32 {
        self.refused
    }

    fn check(&mut self, caller: AudioOwner) -> Result<(), NotOwner> {
        if caller == self.owner {
            return Ok(());
        }
        self.refused = self.refused.saturating_add(1);
        log::warn!("refused audio write from {caller:?}; channel owned by {:?}", self.owner);
        Err(NotOwner {
            caller,
            owner: self.owner,
        })
    }

    /// Load `url` and negotiate playback.
    ///
    /// # Errors
    ///
    /// Returns [`NotOwner`] if `caller` does not own the channel.
    pub fn play(&mut self, caller: AudioOwner, url: &str, volume: f64) -> Result<AudioCommands, NotOwner> {
        let mut out = self.load(caller, url)?;
        if !out.is_empty() {
            out.extend(self.negotiator.start(volume));
        }
        Ok(out)
    }

    /// Load `url` without playing it. Ignored while a `play()` is in flight.
    ///
    /// # Errors
    ///
    /// Returns [`NotOwner`] if `caller` does not own the channel.
    pub fn load(&mut self, caller: AudioOwner, url: &str) -> Result<AudioCommands, NotOwner> {
        self.check(caller)?;
        if self.negotiator.in_flight() {
            return Ok(AudioCommands::new());
        }
        self.negotiator.prime();
        Ok(smallvec::smallvec![AudioCommand::Load {
            url: url.to_string(),
        }])
    }

    /// # Errors
    ///
    /// Returns [`NotOwner`] if `caller` does not own the channel.
    pub fn pause(&mut self, caller: AudioOwner) -> Result<AudioCommands, NotOwner> {
        self.check(caller)?;
        Ok(self.negotiator.pause())
    }

    /// Pass the channel to a new owner, stopping whatever `from` was playing.
    ///
    /// # Errors
    ///
    /// Returns [`NotOwner`] if `from` does not own the channel.
    pub fn hand_over(&mut self, from: AudioOwner, to: AudioOwner) -> Result<AudioCommands, NotOwner> {
        self.check(from)?;
        let out = if self.negotiator.state().is_playing() || self.negotiator.in_flight() {
            self.negotiator.pause()
        } else {
            AudioCommands::new()
        };
        self.negotiator.reset();
        self.owner = to;
        log::debug!("audio channel handed from {from:?} to {to:?}");
        Ok(out)
    }

    pub fn play_resolved(&mut self, now_ms: u64) -> AudioCommands {
        self.negotiator.play_resolved(now_ms)
    }

    pub fn play_rejected(&mut self, now_ms: u64, rejection: &PlayRejection) -> AudioCommands {
        self.negotiator.play_rejected(now_ms, rejection)
    }

    pub fn user_gesture(&mut self, now_ms: u64) -> AudioCommands {
        self.negotiator.user_gesture(now_ms)
    }

    pub fn ended(&mut self) {
        self.negotiator.ended();
    }

    pub fn media_error(&mut self, reason: &str) {
        self.negotiator.media_error(reason);
    }

    pub fn advance(&mut self, now_ms: u64) -> AudioCommands {
        self.negotiator.advance(now_ms)
    }

    #[must_use]
    pub fn next_deadline(&self) -> Option<u64> {
        self.negotiator.next_deadline()
    }
}

/// Result of asking the queue what to play after a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueStep {
    Play(String),
    /// `2 × len` consecutive failures; stop trying.
    Exhausted,
}

/// Shuffled playlist with a bounded failure streak.
#[derive(Debug, Clone)]
pub struct TrackQueue {
    tracks: Vec<String>,
    order: Vec<usize>,
    position: usize,
    failure_streak: u32,
    exhausted: bool,
}

impl TrackQueue {
    pub fn new<R: Rng + ?Sized>(tracks: Vec<String>, rng: &mut R) -> Self {
        let mut queue = Self {
            order: (0..tracks.len()).collect(),
            tracks,
            position: 0,
            failure_streak: 0,
            exhausted: false,
        };
        queue.order.shuffle(rng);
        queue
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    #[must_use]
    pub const fn failure_streak(&self) -> u32 {
        self.failure_streak
    }

    #[must_use]
    pub fn current(&self) -> Option<&str> {
        if self.exhausted {
            return None;
        }
        self.order
            .get(self.position)
            .and_then(|idx| self.tracks.get(*idx))
            .map(String::as_str)
    }

    /// Move to the next track, reshuffling at the end of a pass.
    pub fn advance<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<&str> {
        if self.tracks.is_empty() || self.exhausted {
            return None;
        }
        self.position += 1;
        if self.position >= self.order.len() {
            let previous = self.order.last().copied();
            self.order.shuffle(rng);
            if self.order.len() > 1 && self.order.first().copied() == previous {
                self.order.swap(0, 1);
            }
            self.position = 0;
        }
        self.current()
    }

    pub fn record_success(&mut self) {
        self.failure_streak = 0;
    }

    pub fn record_failure<R: Rng + ?Sized>(&mut self, rng: &mut R) -> QueueStep {
        self.failure_streak = self.failure_streak.saturating_add(1);
        let limit = u32::try_from(self.tracks.len().saturating_mul(2)).unwrap_or(u32::MAX);
        if self.failure_streak >= limit {
            self.exhausted = true;
            log::warn!("track queue exhausted after {} consecutive failures", self.failure_streak);
            return QueueStep::Exhausted;
        }
        match self.advance(rng) {
            Some(url) => QueueStep::Play(url.to_string()),
            None => QueueStep::Exhausted,
        }
    }
}

/// Commands and bus signals produced by one music queue step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MusicStep {
    pub commands: AudioCommands,
    pub signals: SmallVec<[Signal; 2]>,
}

/// Background music that takes over the shared channel once the gate releases.
#[derive(Debug, Clone)]
pub struct MusicQueue {
    queue: TrackQueue,
    volume: f64,
    started_emitted: bool,
    audible_emitted: bool,
}

impl MusicQueue {
    pub fn new<R: Rng + ?Sized>(tracks: Vec<String>, volume: f64, rng: &mut R) -> Self {
        Self {
            queue: TrackQueue::new(tracks, rng),
            volume,
            started_emitted: false,
            audible_emitted: false,
        }
    }

    #[must_use]
    pub const fn queue(&self) -> &TrackQueue {
        &self.queue
    }

    /// Start the current track on a channel the music queue owns.
    ///
    /// # Errors
    ///
    /// Returns [`NotOwner`] if the channel still belongs to the gate.
    pub fn start(&mut self, channel: &mut AudioChannel) -> Result<MusicStep, NotOwner> {
        let Some(url) = self.queue.current().map(str::to_string) else {
            return Ok(MusicStep::default());
        };
        Ok(MusicStep {
            commands: channel.play(AudioOwner::Music, &url, self.volume)?,
            signals: SmallVec::new(),
        })
    }

    pub fn on_play_resolved(&mut self, channel: &mut AudioChannel, now_ms: u64) -> MusicStep {
        let commands = channel.play_resolved(now_ms);
        let mut step = MusicStep {
            commands,
            signals: SmallVec::new(),
        };
        if channel.state().is_playing() {
            self.queue.record_success();
            if !self.started_emitted {
                self.started_emitted = true;
                step.signals.push(Signal::VisitMusicStarted);
            }
        }
        if channel.state() == AudioPlaybackState::AudiblePlaying && !self.audible_emitted {
            self.audible_emitted = true;
            step.signals.push(Signal::VisitMusicAudible);
        }
        step
    }

    /// # Errors
    ///
    /// Returns [`NotOwner`] if a media failure needs a restart on a channel the queue lost.
    pub fn on_play_rejected<R: Rng + ?Sized>(
        &mut self,
        channel: &mut AudioChannel,
        now_ms: u64,
        rejection: &PlayRejection,
        rng: &mut R,
    ) -> Result<MusicStep, NotOwner> {
        if let PlayRejection::Media(_) = rejection {
            channel.play_rejected(now_ms, rejection);
            return self.on_error(channel, rng);
        }
        Ok(MusicStep {
            commands: channel.play_rejected(now_ms, rejection),
            signals: SmallVec::new(),
        })
    }

    /// The element fired `error`: skip ahead, or stop once the streak bound is hit.
    ///
    /// # Errors
    ///
    /// Returns [`NotOwner`] if the channel no longer belongs to the music queue.
    pub fn on_error<R: Rng + ?Sized>(
        &mut self,
        channel: &mut AudioChannel,
        rng: &mut R,
    ) -> Result<MusicStep, NotOwner> {
        if channel.state() != AudioPlaybackState::Error {
            channel.media_error("media element error");
        }
        match self.queue.record_failure(rng) {
            QueueStep::Play(url) => Ok(MusicStep {
                commands: channel.play(AudioOwner::Music, &url, self.volume)?,
                signals: SmallVec::new(),
            }),
            QueueStep::Exhausted => Ok(MusicStep {
                commands: channel.pause(AudioOwner::Music)?,
                signals: SmallVec::new(),
            }),
        }
    }

    /// The element fired `ended`: play the next track.
    ///
    /// # Errors
    ///
    /// Returns [`NotOwner`] if the channel no longer belongs to the music queue.
    pub fn on_ended<R: Rng + ?Sized>(
        &mut self,
        channel: &mut AudioChannel,
        rng: &mut R,
    ) -> Result<MusicStep, NotOwner> {
        channel.ended();
        let Some(url) = self.queue.advance(rng).map(str::to_string) else {
            return Ok(MusicStep::default());
        };
        Ok(MusicStep {
            commands: channel.play(AudioOwner::Music, &url, self.volume)?,
            signals: SmallVec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn unmuted_success_is_audible_immediately() {
        let mut audio = AudioNegotiator::new(AudioConfig::default());
        let cmds = audio.start(0.6);
        assert_eq!(
            cmds.as_slice(),
            &[AudioCommand::Play {
                muted: false,
                volume: 0.6
            }]
        );
        assert!(audio.start(0.6).is_empty());
        audio.play_resolved(10);
        assert_eq!(audio.state(), AudioPlaybackState::AudiblePlaying);
        assert!(audio.start(0.6).is_empty());
    }

    #[test]
    fn rejected_promotion_retries_after_interval() {
        let cfg = AudioConfig::default();
        let (delay, retry) = (cfg.promotion_delay_ms, cfg.promotion_retry_ms);
        let mut audio = AudioNegotiator::new(cfg);
        audio.start(0.5);
        audio.play_rejected(0, &PlayRejection::NotAllowed);
        audio.play_resolved(5);
        assert_eq!(audio.state(), AudioPlaybackState::MutedPlaying);
        assert_eq!(audio.next_deadline(), Some(5 + delay));

        let cmds = audio.advance(5 + delay);
        assert_eq!(audio.state(), AudioPlaybackState::Promoting);
        assert!(matches!(cmds.as_slice(), [AudioCommand::Play { muted: false, .. }]));
        let cmds = audio.play_rejected(5 + delay, &PlayRejection::NotAllowed);
        assert_eq!(cmds[0], AudioCommand::SetMuted { muted: true });
        assert_eq!(audio.next_deadline(), Some(5 + delay + retry));
        assert_eq!(audio.promotion_attempts(), 1);
    }

    #[test]
    fn promotion_ramps_volume_linearly() {
        let cfg = AudioConfig::default();
        let (ramp, step) = (cfg.ramp_ms, cfg.ramp_step_ms);
        let mut audio = AudioNegotiator::new(cfg);
        audio.start(0.8);
        audio.play_rejected(0, &PlayRejection::NotAllowed);
        audio.play_resolved(0);
        audio.user_gesture(100);
        audio.play_resolved(100);
        assert_eq!(audio.state(), AudioPlaybackState::AudiblePlaying);

        let mut volumes = Vec::new();
        while let Some(at) = audio.next_deadline() {
            for cmd in audio.advance(at) {
                if let AudioCommand::SetVolume { volume } = cmd {
                    volumes.push(volume);
                }
            }
        }
        assert_eq!(volumes.len() as u64, ramp / step);
        assert!(volumes.windows(2).all(|pair| pair[0] < pair[1]));
        assert!((volumes.last().copied().unwrap() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn media_failure_lands_in_error() {
        let mut audio = AudioNegotiator::new(AudioConfig::default());
        audio.start(0.5);
        audio.play_rejected(0, &PlayRejection::from_dom_name("NotSupportedError", "codec"));
        assert_eq!(audio.state(), AudioPlaybackState::Error);
        assert_eq!(audio.next_deadline(), None);
        assert!(audio.user_gesture(10).is_empty());
    }

    #[test]
    fn refused_muted_play_blocks_until_a_gesture() {
        let mut audio = AudioNegotiator::new(AudioConfig::default());
        audio.start(0.5);
        audio.play_rejected(0, &PlayRejection::NotAllowed);
        audio.play_rejected(5, &PlayRejection::NotAllowed);
        assert_eq!(audio.state(), AudioPlaybackState::Blocked);
        assert_eq!(audio.next_deadline(), None);
        assert!(audio.advance(10_000).is_empty());

        let cmds = audio.user_gesture(10_000);
        assert_eq!(
            cmds.as_slice(),
            &[AudioCommand::Play {
                muted: false,
                volume: 0.5
            }]
        );
        audio.play_resolved(10_010);
        assert_eq!(audio.state(), AudioPlaybackState::AudiblePlaying);
    }

    #[test]
    fn ended_stops_timers_and_is_reported() {
        let mut audio = AudioNegotiator::new(AudioConfig::default());
        audio.start(0.5);
        audio.play_rejected(0, &PlayRejection::NotAllowed);
        audio.play_resolved(0);
        assert!(audio.promotion_scheduled());
        audio.ended();
        assert_eq!(audio.state(), AudioPlaybackState::Ended);
        assert_eq!(audio.next_deadline(), None);
        assert!(!audio.start(0.5).is_empty());
    }

    #[test]
    fn load_primes_the_channel_without_playing() {
        let mut channel = AudioChannel::new(AudioConfig::default(), AudioOwner::Gate);
        let cmds = channel.load(AudioOwner::Gate, "/gate.mp3").unwrap();
        assert_eq!(
            cmds.as_slice(),
            &[AudioCommand::Load {
                url: "/gate.mp3".to_string()
            }]
        );
        assert_eq!(channel.state(), AudioPlaybackState::Primed);
        let cmds = channel.play(AudioOwner::Gate, "/gate.mp3", 0.6).unwrap();
        assert_eq!(cmds.len(), 2);
        assert_eq!(channel.state(), AudioPlaybackState::Starting { muted: false });
        assert!(channel.load(AudioOwner::Gate, "/other.mp3").unwrap().is_empty());
    }

    #[test]
    fn channel_refuses_non_owner_writes() {
        let mut channel = AudioChannel::new(AudioConfig::default(), AudioOwner::Gate);
        let err = channel.play(AudioOwner::Music, "/a.mp3", 0.5).unwrap_err();
        assert_eq!(err.owner, AudioOwner::Gate);
        assert_eq!(channel.refused(), 1);

        channel.play(AudioOwner::Gate, "/gate.mp3", 0.6).unwrap();
        channel.play_resolved(0);
        let cmds = channel.hand_over(AudioOwner::Gate, AudioOwner::Music).unwrap();
        assert_eq!(cmds.as_slice(), &[AudioCommand::Pause]);
        assert_eq!(channel.owner(), AudioOwner::Music);
        assert!(channel.pause(AudioOwner::Gate).is_err());
    }

    #[test]
    fn queue_reshuffle_avoids_immediate_repeat() {
        let tracks: Vec<String> = (0..4).map(|i| format!("/t{i}.mp3")).collect();
        let mut rng = SmallRng::seed_from_u64(12);
        let mut queue = TrackQueue::new(tracks, &mut rng);
        let mut previous = queue.current().map(str::to_string);
        for _ in 0..200 {
            let next = queue.advance(&mut rng).map(str::to_string);
            assert_ne!(next, previous);
            previous = next;
        }
    }

    #[test]
    fn queue_stops_after_twice_its_length_in_failures() {
        let tracks: Vec<String> = (0..3).map(|i| format!("/t{i}.mp3")).collect();
        let mut rng = SmallRng::seed_from_u64(13);
        let mut queue = TrackQueue::new(tracks, &mut rng);
        for _ in 0..5 {
            assert!(matches!(queue.record_failure(&mut rng), QueueStep::Play(_)));
        }
        assert_eq!(queue.record_failure(&mut rng), QueueStep::Exhausted);
        assert!(queue.is_exhausted());
        assert_eq!(queue.current(), None);
    }

    #[test]
    fn success_resets_failure_streak() {
        let tracks: Vec<String> = vec![String::from("/a.mp3"), String::from("/b.mp3")];
        let mut rng = SmallRng::seed_from_u64(14);
        let mut queue = TrackQueue::new(tracks, &mut rng);
        for _ in 0..10 {
            assert!(matches!(queue.record_failure(&mut rng), QueueStep::Play(_)));
            assert!(matches!(queue.record_failure(&mut rng), QueueStep::Play(_)));
            assert!(matches!(queue.record_failure(&mut rng), QueueStep::Play(_)));
            queue.record_success();
        }
        assert!(!queue.is_exhausted());
    }

    #[test]
    fn music_queue_emits_started_then_audible_once() {
        let mut rng = SmallRng::seed_from_u64(15);
        let mut channel = AudioChannel::new(AudioConfig::default(), AudioOwner::Music);
        let mut music = MusicQueue::new(vec![String::from("/m.mp3")], 0.45, &mut rng);
        let step = music.start(&mut channel).unwrap();
        assert!(matches!(step.commands[0], AudioCommand::Load { .. }));
        music.on_play_rejected(&mut channel, 0, &PlayRejection::NotAllowed, &mut rng)
            .unwrap();
        let step = music.on_play_resolved(&mut channel, 0);
        assert_eq!(step.signals.as_slice(), &[Signal::VisitMusicStarted]);
        channel.user_gesture(50);
        let step = music.on_play_resolved(&mut channel, 60);
        assert_eq!(step.signals.as_slice(), &[Signal::VisitMusicAudible]);
        let step = music.on_play_resolved(&mut channel, 70);
        assert!(step.signals.is_empty());
    }
}
