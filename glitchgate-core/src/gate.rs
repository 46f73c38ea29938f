//! Loading gate timeline.
//!
//! The gate moves `Booting → Active → Fading → Released`, with `Disarmed`
//! reachable from any state before release. The timeline length comes from
//! the gate track's metadata when it arrives in time, otherwise from the
//! configured fallback. A simulated progress percentage is ticked on a
//! jittered interval and always kept within `band` of the true fraction.
//!
//! Everything is driven by [`GateMachine::advance`]; the machine never reads
//! a clock.
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::bus::Signal;
use crate::config::GateConfig;
use crate::fairness::{random_in_span, random_ms, roll};
use crate::timers::TimerQueue;

/// Longest gate track duration taken from metadata; longer reports are clamped.
pub const MAX_METADATA_MS: u64 = 10 * 60 * 1_000;

/// Milestones derived from a duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateTimeline {
    pub duration_ms: u64,
    pub fade_lead_ms: u64,
    pub progress_hold_ms: u64,
}

impl GateTimeline {
    #[must_use]
    pub const fn new(duration_ms: u64, fade_lead_ms: u64, progress_hold_ms: u64) -> Self {
        Self {
            duration_ms,
            fade_lead_ms,
            progress_hold_ms,
        }
    }

    #[must_use]
    pub const fn fade_start_at_ms(&self) -> u64 {
        self.duration_ms.saturating_sub(self.fade_lead_ms)
    }

    /// Point at which the displayed percentage latches to 100.
    #[must_use]
    pub const fn progress_complete_at_ms(&self) -> u64 {
        self.fade_start_at_ms().saturating_sub(self.progress_hold_ms)
    }

    /// True progress in percent for an elapsed time, measured against the latch point.
    #[must_use]
    pub fn true_progress(&self, elapsed_ms: u64) -> f64 {
        let complete = self.progress_complete_at_ms();
        if complete == 0 || elapsed_ms >= complete {
            return 100.0;
        }
        (elapsed_ms as f64 / complete as f64 * 100.0).clamp(0.0, 100.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Booting,
    Active,
    Fading,
    Released,
    Disarmed,
}

impl GateState {
    /// Whether the overlay and its page locks are still in place.
    #[must_use]
    pub const fn is_blocking(self) -> bool {
        matches!(self, Self::Booting | Self::Active | Self::Fading)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationSource {
    Fallback,
    Metadata,
}

/// Which policy moved the displayed percentage on a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressBeat {
    Advance,
    Stall,
    FalseComplete,
    Rollback,
    Regression,
    Latched,
}

/// Something the driver has to render or forward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GateOutput {
    Started {
        duration_ms: u64,
        source: DurationSource,
    },
    DurationCorrected {
        duration_ms: u64,
    },
    Progress {
        percent: f64,
        beat: ProgressBeat,
    },
    FadeStarted,
    Released,
    /// Closed before release; the driver pauses audio and removes the overlay.
    Disarmed,
}

impl GateOutput {
    #[must_use]
    pub fn signal(&self) -> Option<Signal> {
        match self {
            Self::Released => Some(Signal::GateReleased),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateTimer {
    MetadataGrace,
    Tick,
    Rollback,
    ProgressComplete,
    FadeStart,
    Release,
}

#[derive(Debug, Clone)]
pub struct GateMachine {
    cfg: GateConfig,
    state: GateState,
    arm_cycle: u32,
    armed_at: u64,
    entry_confirmed: bool,
    started_at: u64,
    timeline: Option<GateTimeline>,
    source: Option<DurationSource>,
    metadata_ms: Option<u64>,
    display: f64,
    latched: bool,
    holding_false_complete: bool,
    false_completes: u32,
    released: bool,
    timers: TimerQueue<GateTimer>,
}

impl GateMachine {
    /// An unarmed gate. Call [`arm`](Self::arm) to start a cycle.
    #[must_use]
    pub fn new(cfg: GateConfig) -> Self {
        Self {
            cfg,
            state: GateState::Disarmed,
            arm_cycle: 0,
            armed_at: 0,
            entry_confirmed: false,
            started_at: 0,
            timeline: None,
            source: None,
            metadata_ms: None,
            display: 0.0,
            latched: false,
            holding_false_complete: false,
            false_completes: 0,
            released: false,
            timers: TimerQueue::new(),
        }
    }

    /// Start a fresh cycle. Any previous timeline is discarded, never resumed.
    pub fn arm(&mut self, now_ms: u64) {
        self.timers.cancel_all();
        self.state = GateState::Booting;
        self.arm_cycle = self.arm_cycle.saturating_add(1);
        self.armed_at = now_ms;
        self.entry_confirmed = false;
        self.started_at = now_ms;
        self.timeline = None;
        self.source = None;
        self.metadata_ms = None;
        self.display = 0.0;
        self.latched = false;
        self.holding_false_complete = false;
        self.false_completes = 0;
        self.released = false;
        log::debug!("gate armed (cycle {}) at {now_ms}", self.arm_cycle);
    }

    /// The visitor confirmed entry; the grace period for metadata begins.
    pub fn confirm_entry(&mut self, now_ms: u64) -> Vec<GateOutput> {
        if self.state != GateState::Booting || self.entry_confirmed {
            return Vec::new();
        }
        self.entry_confirmed = true;
        if let Some(duration) = self.metadata_ms {
            return vec![self.start(now_ms, duration, DurationSource::Metadata)];
        }
        self.timers.schedule(
            now_ms.saturating_add(self.cfg.metadata_grace_ms),
            GateTimer::MetadataGrace,
        );
        Vec::new()
    }

    /// The gate track reported its real duration.
    ///
    /// Before the timeline starts this decides the duration. After a fallback
    /// start it corrects the duration in place without restarting; there is no
    /// guarantee this lands before the fade begins.
    pub fn metadata_loaded(&mut self, now_ms: u64, duration_ms: u64) -> Vec<GateOutput> {
        if duration_ms == 0 || !self.state.is_blocking() || self.metadata_ms.is_some() {
            return Vec::new();
        }
        if duration_ms > MAX_METADATA_MS {
            log::warn!("gate track reported {duration_ms}ms; clamping to {MAX_METADATA_MS}ms");
        }
        let duration_ms = duration_ms.min(MAX_METADATA_MS);
        self.metadata_ms = Some(duration_ms);
        match self.state {
            GateState::Booting if self.entry_confirmed => {
                self.timers.cancel_kind(&GateTimer::MetadataGrace);
                vec![self.start(now_ms, duration_ms, DurationSource::Metadata)]
            }
            GateState::Active | GateState::Fading
                if self.source == Some(DurationSource::Fallback) =>
            {
                vec![self.correct(now_ms, duration_ms)]
            }
            _ => Vec::new(),
        }
    }

    /// Run every timer due at or before `now_ms`, in deadline order.
    pub fn advance<R: Rng + ?Sized>(&mut self, now_ms: u64, rng: &mut R) -> Vec<GateOutput> {
        let mut out = Vec::new();
        while let Some((at, timer)) = self.timers.pop_due(now_ms) {
            match timer {
                GateTimer::MetadataGrace => {
                    if self.state == GateState::Booting {
                        let duration = self.cfg.fallback_duration_ms;
                        out.push(self.start(at, duration, DurationSource::Fallback));
                    }
                }
                GateTimer::Tick => self.tick(at, rng, &mut out),
                GateTimer::Rollback => self.rollback(at, rng, &mut out),
                GateTimer::ProgressComplete => self.latch(&mut out),
                GateTimer::FadeStart => {
                    if self.state == GateState::Active {
                        self.latch(&mut out);
                        self.state = GateState::Fading;
                        out.push(GateOutput::FadeStarted);
                    }
                }
                GateTimer::Release => self.try_release(at, &mut out),
            }
        }
        out
    }

    /// Abort the cycle. No release is emitted and every timer is dropped.
    pub fn disarm(&mut self, now_ms: u64) -> Vec<GateOutput> {
        if !self.state.is_blocking() {
            return Vec::new();
        }
        self.timers.cancel_all();
        self.state = GateState::Disarmed;
        self.timeline = None;
        log::debug!("gate disarmed at {now_ms} before release");
        vec![GateOutput::Disarmed]
    }

    #[must_use]
    pub const fn state(&self) -> GateState {
        self.state
    }

    #[must_use]
    pub const fn timeline(&self) -> Option<GateTimeline> {
        self.timeline
    }

    #[must_use]
    pub const fn source(&self) -> Option<DurationSource> {
        self.source
    }

    #[must_use]
    pub const fn display_percent(&self) -> f64 {
        self.display
    }

    #[must_use]
    pub const fn is_latched(&self) -> bool {
        self.latched
    }

    #[must_use]
    pub const fn false_completes(&self) -> u32 {
        self.false_completes
    }

    #[must_use]
    pub const fn arm_cycle(&self) -> u32 {
        self.arm_cycle
    }

    #[must_use]
    pub const fn started_at(&self) -> Option<u64> {
        if self.timeline.is_some() {
            Some(self.started_at)
        } else {
            None
        }
    }

    #[must_use]
    pub fn next_deadline(&self) -> Option<u64> {
        self.timers.next_deadline()
    }

    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// True progress at `now_ms`, or `None` before the timeline starts.
    #[must_use]
    pub fn true_progress(&self, now_ms: u64) -> Option<f64> {
        self.timeline
            .map(|timeline| timeline.true_progress(now_ms.saturating_sub(self.started_at)))
    }

    fn start(&mut self, at: u64, duration_ms: u64, source: DurationSource) -> GateOutput {
        let timeline = GateTimeline::new(
            duration_ms,
            self.cfg.fade_lead_ms,
            self.cfg.progress_hold_ms,
        );
        self.state = GateState::Active;
        self.started_at = at;
        self.timeline = Some(timeline);
        self.source = Some(source);
        self.timers.schedule(
            at.saturating_add(timeline.progress_complete_at_ms()),
            GateTimer::ProgressComplete,
        );
        self.timers
            .schedule(at.saturating_add(timeline.fade_start_at_ms()), GateTimer::FadeStart);
        self.timers
            .schedule(at.saturating_add(duration_ms), GateTimer::Release);
        self.timers.schedule(at, GateTimer::Tick);
        log::debug!("gate timeline started at {at}: {duration_ms}ms ({source:?})");
        GateOutput::Started {
            duration_ms,
            source,
        }
    }

    fn correct(&mut self, now_ms: u64, duration_ms: u64) -> GateOutput {
        let timeline = GateTimeline::new(
            duration_ms,
            self.cfg.fade_lead_ms,
            self.cfg.progress_hold_ms,
        );
        self.timeline = Some(timeline);
        self.source = Some(DurationSource::Metadata);
        let base = self.started_at;
        if !self.latched {
            self.timers.cancel_kind(&GateTimer::ProgressComplete);
            self.timers.schedule(
                base.saturating_add(timeline.progress_complete_at_ms()).max(now_ms),
                GateTimer::ProgressComplete,
            );
        }
        if self.state == GateState::Active {
            self.timers.cancel_kind(&GateTimer::FadeStart);
            self.timers.schedule(
                base.saturating_add(timeline.fade_start_at_ms()).max(now_ms),
                GateTimer::FadeStart,
            );
        }
        self.timers.cancel_kind(&GateTimer::Release);
        self.timers
            .schedule(base.saturating_add(duration_ms).max(now_ms), GateTimer::Release);
        log::debug!("gate duration corrected to {duration_ms}ms at {now_ms}");
        GateOutput::DurationCorrected { duration_ms }
    }

    fn band(&self, truth: f64) -> (f64, f64) {
        let band = self.cfg.band;
        ((truth - band).max(0.0), (truth + band).min(99.0))
    }

    fn tick<R: Rng + ?Sized>(&mut self, at: u64, rng: &mut R, out: &mut Vec<GateOutput>) {
        let Some(timeline) = self.timeline else {
            return;
        };
        if self.state != GateState::Active || self.latched {
            return;
        }
        let elapsed = at.saturating_sub(self.started_at);
        if elapsed >= timeline.progress_complete_at_ms() {
            self.latch(out);
            return;
        }
        self.timers.schedule(
            at.saturating_add(random_ms(rng, self.cfg.tick_ms).max(1)),
            GateTimer::Tick,
        );
        if self.holding_false_complete {
            return;
        }

        let truth = timeline.true_progress(elapsed);
        let (lo, hi) = self.band(truth);
        let cfg = &self.cfg;
        let beat = if roll(rng, cfg.stall_probability) {
            ProgressBeat::Stall
        } else if self.false_completes < cfg.false_complete_max
            && truth >= 100.0 - cfg.band
            && roll(rng, cfg.false_complete_probability)
        {
            ProgressBeat::FalseComplete
        } else if self.display > cfg.regression_floor && roll(rng, cfg.regression_probability) {
            ProgressBeat::Regression
        } else {
            ProgressBeat::Advance
        };

        self.display = match beat {
            ProgressBeat::Stall => self.display.clamp(lo, hi),
            ProgressBeat::FalseComplete => {
                self.false_completes += 1;
                self.holding_false_complete = true;
                self.timers.schedule(
                    at.saturating_add(cfg.false_complete_hold_ms),
                    GateTimer::Rollback,
                );
                100.0
            }
            ProgressBeat::Regression => {
                (self.display - random_in_span(rng, cfg.regression)).clamp(lo, hi)
            }
            _ => (self.display + random_in_span(rng, cfg.advance)).clamp(lo, hi),
        };
        out.push(GateOutput::Progress {
            percent: self.display,
            beat,
        });
    }

    fn rollback<R: Rng + ?Sized>(&mut self, at: u64, rng: &mut R, out: &mut Vec<GateOutput>) {
        self.holding_false_complete = false;
        let Some(timeline) = self.timeline else {
            return;
        };
        if self.latched || self.state != GateState::Active {
            return;
        }
        let truth = timeline.true_progress(at.saturating_sub(self.started_at));
        let (lo, hi) = self.band(truth);
        self.display = random_in_span(rng, self.cfg.rollback_to).clamp(lo, hi);
        out.push(GateOutput::Progress {
            percent: self.display,
            beat: ProgressBeat::Rollback,
        });
    }

    fn latch(&mut self, out: &mut Vec<GateOutput>) {
        if self.latched || !self.state.is_blocking() {
            return;
        }
        self.latched = true;
        self.holding_false_complete = false;
        self.display = 100.0;
        self.timers.cancel_kind(&GateTimer::Tick);
        self.timers.cancel_kind(&GateTimer::Rollback);
        out.push(GateOutput::Progress {
            percent: 100.0,
            beat: ProgressBeat::Latched,
        });
    }

    fn try_release(&mut self, at: u64, out: &mut Vec<GateOutput>) {
        if self.released || !self.state.is_blocking() {
            return;
        }
        let visible_floor = self.armed_at.saturating_add(self.cfg.min_visible_ms);
        if self.metadata_ms.is_none() && at < visible_floor {
            self.timers.schedule(visible_floor, GateTimer::Release);
            return;
        }
        if self.state == GateState::Active {
            self.latch(out);
            out.push(GateOutput::FadeStarted);
        }
        self.released = true;
        self.state = GateState::Released;
        self.timeline = None;
        self.timers.cancel_all();
        log::debug!("gate released at {at}");
        out.push(GateOutput::Released);
    }
}

/// Geometry and style of the primary card sampled on one animation frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameSample {
    pub width: f64,
    pub height: f64,
    pub opacity: f64,
    pub in_viewport: bool,
}

impl FrameSample {
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.width * self.height > 1.0 && self.opacity > 0.05 && self.in_viewport
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityVerdict {
    /// Not enough frames sampled yet.
    Pending,
    Visible,
    /// Render the fixed-position duplicate card.
    Failsafe,
}

/// Decides whether the failsafe card is needed from consecutive frame samples.
///
/// The primary only counts as visible when two consecutive frames both pass.
/// A missing element (`None`) counts as invisible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VisibilityMonitor {
    previous: Option<bool>,
}

impl VisibilityMonitor {
    #[must_use]
    pub const fn new() -> Self {
        Self { previous: None }
    }

    pub fn record(&mut self, sample: Option<FrameSample>) -> VisibilityVerdict {
        let visible = sample.is_some_and(|sample| sample.is_visible());
        let verdict = match self.previous {
            None => VisibilityVerdict::Pending,
            Some(previous) if previous && visible => VisibilityVerdict::Visible,
            Some(_) => VisibilityVerdict::Failsafe,
        };
        self.previous = Some(visible);
        verdict
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn quiet_config() -> GateConfig {
        GateConfig {
            stall_probability: 0.0,
            false_complete_probability: 0.0,
            regression_probability: 0.0,
            ..GateConfig::default()
        }
    }

    fn run_until<R: Rng>(gate: &mut GateMachine, until: u64, rng: &mut R) -> Vec<(u64, GateOutput)> {
        let mut seen = Vec::new();
        while let Some(deadline) = gate.next_deadline() {
            if deadline > until {
                break;
            }
            for output in gate.advance(deadline, rng) {
                seen.push((deadline, output));
            }
        }
        seen
    }

    #[test]
    fn timeline_milestones() {
        let timeline = GateTimeline::new(5_000, 800, 400);
        assert_eq!(timeline.fade_start_at_ms(), 4_200);
        assert_eq!(timeline.progress_complete_at_ms(), 3_800);
        assert!((timeline.true_progress(1_900) - 50.0).abs() < 1e-9);
        assert!((timeline.true_progress(9_999) - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn nothing_starts_before_entry_is_confirmed() {
        let mut gate = GateMachine::new(quiet_config());
        gate.arm(0);
        assert!(gate.metadata_loaded(100, 9_000).is_empty());
        assert_eq!(gate.state(), GateState::Booting);
        assert_eq!(gate.next_deadline(), None);
        let out = gate.confirm_entry(500);
        assert_eq!(
            out,
            vec![GateOutput::Started {
                duration_ms: 9_000,
                source: DurationSource::Metadata
            }]
        );
    }

    #[test]
    fn fallback_starts_after_grace_and_metadata_corrects_in_place() {
        let cfg = quiet_config();
        let grace = cfg.metadata_grace_ms;
        let mut gate = GateMachine::new(cfg);
        let mut rng = SmallRng::seed_from_u64(1);
        gate.arm(0);
        gate.confirm_entry(0);
        let out = gate.advance(grace, &mut rng);
        assert!(out.contains(&GateOutput::Started {
            duration_ms: 14_000,
            source: DurationSource::Fallback
        }));
        run_until(&mut gate, grace + 2_000, &mut rng);
        let out = gate.metadata_loaded(grace + 2_000, 20_000);
        assert_eq!(out, vec![GateOutput::DurationCorrected { duration_ms: 20_000 }]);
        assert_eq!(gate.started_at(), Some(grace));
        let seen = run_until(&mut gate, u64::MAX, &mut rng);
        let released_at = seen
            .iter()
            .find(|(_, output)| *output == GateOutput::Released)
            .map(|(at, _)| *at);
        assert_eq!(released_at, Some(grace + 20_000));
    }

    #[test]
    fn latch_precedes_fade_and_release_fires_once() {
        let mut gate = GateMachine::new(quiet_config());
        let mut rng = SmallRng::seed_from_u64(2);
        gate.arm(0);
        gate.metadata_loaded(0, 5_000);
        gate.confirm_entry(0);
        let seen = run_until(&mut gate, u64::MAX, &mut rng);
        let latched_at = seen
            .iter()
            .find(|(_, output)| matches!(output, GateOutput::Progress { beat: ProgressBeat::Latched, .. }))
            .map(|(at, _)| *at)
            .unwrap();
        let fade_at = seen
            .iter()
            .find(|(_, output)| *output == GateOutput::FadeStarted)
            .map(|(at, _)| *at)
            .unwrap();
        assert!(latched_at <= 3_800);
        assert!(fade_at >= 4_200);
        let releases = seen
            .iter()
            .filter(|(_, output)| *output == GateOutput::Released)
            .count();
        assert_eq!(releases, 1);
        for now in 5_000..5_050 {
            assert!(gate.advance(now, &mut rng).is_empty());
        }
        assert_eq!(gate.pending_timers(), 0);
    }

    #[test]
    fn fallback_waits_for_min_visible_floor() {
        let cfg = GateConfig {
            fallback_duration_ms: 3_000,
            metadata_grace_ms: 0,
            ..quiet_config()
        };
        let floor = cfg.min_visible_ms;
        let mut gate = GateMachine::new(cfg);
        let mut rng = SmallRng::seed_from_u64(3);
        gate.arm(0);
        gate.confirm_entry(0);
        let seen = run_until(&mut gate, u64::MAX, &mut rng);
        let released_at = seen
            .iter()
            .find(|(_, output)| *output == GateOutput::Released)
            .map(|(at, _)| *at);
        assert_eq!(released_at, Some(floor));
    }

    #[test]
    fn display_stays_inside_band() {
        let cfg = GateConfig {
            stall_probability: 0.2,
            false_complete_probability: 0.5,
            regression_probability: 0.4,
            ..GateConfig::default()
        };
        let band = cfg.band;
        let timeline = GateTimeline::new(12_000, cfg.fade_lead_ms, cfg.progress_hold_ms);
        for seed in 0..20 {
            let mut gate = GateMachine::new(cfg.clone());
            let mut rng = SmallRng::seed_from_u64(seed);
            gate.arm(0);
            gate.metadata_loaded(0, 12_000);
            gate.confirm_entry(0);
            for (at, output) in run_until(&mut gate, u64::MAX, &mut rng) {
                if let GateOutput::Progress { percent, beat } = output {
                    let truth = timeline.true_progress(at);
                    if beat != ProgressBeat::Latched {
                        assert!(percent <= truth + band + 1e-9, "{percent} vs {truth}");
                        assert!(percent >= truth - band - 1e-9, "{percent} vs {truth}");
                    }
                }
            }
            assert!(gate.false_completes() <= 3);
            assert_eq!(gate.state(), GateState::Released);
            assert_eq!(gate.timeline(), None);
        }
    }

    #[test]
    fn disarm_drops_timers_without_release() {
        let mut gate = GateMachine::new(quiet_config());
        let mut rng = SmallRng::seed_from_u64(4);
        gate.arm(0);
        gate.confirm_entry(0);
        gate.metadata_loaded(10, 8_000);
        gate.advance(1_000, &mut rng);
        assert!(gate.timeline().is_some());
        assert_eq!(gate.disarm(1_000), vec![GateOutput::Disarmed]);
        assert_eq!(gate.pending_timers(), 0);
        assert_eq!(gate.timeline(), None);
        assert_eq!(gate.true_progress(1_000), None);
        assert!(gate.advance(20_000, &mut rng).is_empty());
        assert!(gate.disarm(20_000).is_empty());

        gate.arm(30_000);
        assert_eq!(gate.arm_cycle(), 2);
        assert_eq!(gate.timeline(), None);
        assert!((gate.display_percent()).abs() < f64::EPSILON);
    }

    #[test]
    fn absurd_metadata_is_clamped_instead_of_overflowing() {
        let mut gate = GateMachine::new(quiet_config());
        let mut rng = SmallRng::seed_from_u64(5);
        gate.arm(10);
        assert!(gate.metadata_loaded(10, u64::MAX).is_empty());
        let out = gate.confirm_entry(10);
        assert_eq!(
            out,
            vec![GateOutput::Started {
                duration_ms: MAX_METADATA_MS,
                source: DurationSource::Metadata,
            }]
        );
        assert!(gate.advance(10_000, &mut rng).iter().all(|o| *o != GateOutput::Released));
        assert!(gate.state().is_blocking());
        let seen = run_until(&mut gate, u64::MAX, &mut rng);
        let released_at = seen
            .iter()
            .find(|(_, output)| *output == GateOutput::Released)
            .map(|(at, _)| *at);
        assert_eq!(released_at, Some(10 + MAX_METADATA_MS));
    }

    #[test]
    fn late_start_near_the_clock_ceiling_saturates() {
        let mut gate = GateMachine::new(quiet_config());
        gate.arm(u64::MAX - 5);
        gate.metadata_loaded(u64::MAX - 5, 9_000);
        let out = gate.confirm_entry(u64::MAX - 5);
        assert!(matches!(out.as_slice(), [GateOutput::Started { .. }]));
        assert_eq!(gate.next_deadline(), Some(u64::MAX - 5));
    }

    #[test]
    fn failsafe_requires_two_visible_frames() {
        let visible = FrameSample {
            width: 320.0,
            height: 200.0,
            opacity: 1.0,
            in_viewport: true,
        };
        let faded = FrameSample {
            opacity: 0.01,
            ..visible
        };
        let mut monitor = VisibilityMonitor::new();
        assert_eq!(monitor.record(Some(visible)), VisibilityVerdict::Pending);
        assert_eq!(monitor.record(Some(visible)), VisibilityVerdict::Visible);
        assert_eq!(monitor.record(Some(faded)), VisibilityVerdict::Failsafe);
        assert_eq!(monitor.record(Some(visible)), VisibilityVerdict::Failsafe);
        assert_eq!(monitor.record(Some(visible)), VisibilityVerdict::Visible);
        assert_eq!(monitor.record(None), VisibilityVerdict::Failsafe);
    }
}
