//! The loading gate overlay: a Yew component driving [`GateMachine`].
use glitchgate_core::{
    AudioConfig, EntryGateConfig, FrameSample, GateConfig, GateMachine, GateOutput, GateState,
    MusicConfig, Signal, VisibilityMonitor, VisibilityVerdict,
};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use web_sys::Element;
use yew::prelude::*;

use crate::audio::AudioDriver;
use crate::dom;
use crate::listeners::{EventListener, ListenerSet};
use crate::signals;
use crate::timers::{Interval, TimerSlot};

/// Frame sampling period for the failsafe check.
const FRAME_SAMPLE_MS: u64 = 60;
/// Give up waiting for two samples after this many attempts.
const MAX_FRAME_SAMPLES: u32 = 10;

/// What the overlay currently shows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateView {
    pub state: GateState,
    pub percent: f64,
    pub fading: bool,
}

impl Default for GateView {
    fn default() -> Self {
        Self {
            state: GateState::Booting,
            percent: 0.0,
            fading: false,
        }
    }
}

impl GateView {
    /// Fold one machine output into the view.
    #[must_use]
    pub fn apply(mut self, output: &GateOutput) -> Self {
        match output {
            GateOutput::Started { .. } | GateOutput::DurationCorrected { .. } => {
                self.state = GateState::Active;
            }
            GateOutput::Progress { percent, .. } => self.percent = *percent,
            GateOutput::FadeStarted => {
                self.state = GateState::Fading;
                self.fading = true;
            }
            GateOutput::Released => {
                self.state = GateState::Released;
                self.percent = 100.0;
            }
            GateOutput::Disarmed => self.state = GateState::Disarmed,
        }
        self
    }

    #[must_use]
    pub const fn is_visible(&self) -> bool {
        self.state.is_blocking()
    }
}

/// Everything one arm cycle of the gate owns in the browser.
pub struct GateRuntime {
    machine: RefCell<GateMachine>,
    rng: RefCell<SmallRng>,
    timer: RefCell<TimerSlot>,
    audio: Option<Rc<AudioDriver>>,
    music: MusicConfig,
    view: RefCell<GateView>,
    on_view: Callback<GateView>,
    listeners: RefCell<ListenerSet>,
}

impl GateRuntime {
    /// Arm a fresh gate and start the gate track.
    #[must_use]
    pub fn arm(props: &GlitchGateProps, on_view: Callback<GateView>) -> Rc<Self> {
        let audio = match AudioDriver::new(props.audio.clone(), props.seed ^ 0xA0D1_0A0D) {
            Ok(driver) => Some(driver),
            Err(err) => {
                dom::console_error(&format!(
                    "Gate audio unavailable: {}",
                    dom::js_error_message(&err)
                ));
                None
            }
        };
        let runtime = Rc::new(Self {
            machine: RefCell::new(GateMachine::new(props.gate.clone())),
            rng: RefCell::new(SmallRng::seed_from_u64(props.seed)),
            timer: RefCell::new(TimerSlot::default()),
            audio,
            music: props.music.clone(),
            view: RefCell::new(GateView::default()),
            on_view,
            listeners: RefCell::new(ListenerSet::default()),
        });
        runtime.machine.borrow_mut().arm(dom::now_ms());
        signals::session().borrow_mut().gate_armed = true;

        let weak = Rc::downgrade(&runtime);
        if let Some(audio) = &runtime.audio {
            let hook = Weak::clone(&weak);
            audio.on_metadata(move |duration_ms| {
                if let Some(runtime) = hook.upgrade() {
                    runtime.metadata_loaded(duration_ms);
                }
            });
            audio.play_gate(&props.entry.track_url, props.entry.volume);
        }
        if let Some(win) = dom::window() {
            let hook = Weak::clone(&weak);
            runtime
                .listeners
                .borrow_mut()
                .keep(EventListener::bubble(&win, "entry-confirmed", move |_| {
                    if let Some(runtime) = hook.upgrade() {
                        runtime.confirm_entry();
                    }
                    Ok(())
                }));
        }
        runtime
    }

    pub fn confirm_entry(self: &Rc<Self>) {
        let outputs = self.machine.borrow_mut().confirm_entry(dom::now_ms());
        self.handle(&outputs);
        self.pump();
    }

    pub fn metadata_loaded(self: &Rc<Self>, duration_ms: u64) {
        let outputs = self
            .machine
            .borrow_mut()
            .metadata_loaded(dom::now_ms(), duration_ms);
        self.handle(&outputs);
        self.pump();
    }

    /// Close the gate before release; leaves no timers behind.
    pub fn disarm(self: &Rc<Self>) {
        let outputs = self.machine.borrow_mut().disarm(dom::now_ms());
        self.handle(&outputs);
        self.timer.borrow_mut().clear();
        self.listeners.borrow_mut().clear();
    }

    #[must_use]
    pub fn state(&self) -> GateState {
        self.machine.borrow().state()
    }

    fn pump(self: &Rc<Self>) {
        let outputs = {
            let mut rng = self.rng.borrow_mut();
            self.machine.borrow_mut().advance(dom::now_ms(), &mut *rng)
        };
        self.handle(&outputs);
        let next = self.machine.borrow().next_deadline();
        match next {
            Some(at) => {
                let weak = Rc::downgrade(self);
                self.timer.borrow_mut().schedule_at(at, move || {
                    if let Some(runtime) = weak.upgrade() {
                        runtime.pump();
                    }
                });
            }
            None => self.timer.borrow_mut().clear(),
        }
    }

    fn handle(self: &Rc<Self>, outputs: &[GateOutput]) {
        if outputs.is_empty() {
            return;
        }
        let mut view = *self.view.borrow();
        for output in outputs {
            view = view.apply(output);
            match output {
                GateOutput::Started {
                    duration_ms,
                    source,
                } => log::debug!("gate timeline started: {duration_ms}ms from {source:?}"),
                GateOutput::Released => {
                    if let Some(signal) = output.signal() {
                        signals::publish(&signal);
                    }
                    if let Some(audio) = &self.audio {
                        audio.hand_to_music(&self.music);
                    }
                }
                GateOutput::Disarmed => {
                    signals::session().borrow_mut().gate_armed = false;
                    if let Some(audio) = &self.audio {
                        audio.pause_gate();
                    }
                }
                _ => {}
            }
        }
        *self.view.borrow_mut() = view;
        self.on_view.emit(view);
    }
}

/// Measure an element for the visibility failsafe.
#[must_use]
pub fn sample_frame(el: &Element) -> Option<FrameSample> {
    let win = dom::window()?;
    let rect = el.get_bounding_client_rect();
    let opacity = win
        .get_computed_style(el)
        .ok()
        .flatten()
        .and_then(|style| style.get_property_value("opacity").ok())
        .and_then(|value| value.trim().parse::<f64>().ok())
        .unwrap_or(1.0);
    let view_w = win.inner_width().ok().and_then(|w| w.as_f64()).unwrap_or(0.0);
    let view_h = win.inner_height().ok().and_then(|h| h.as_f64()).unwrap_or(0.0);
    Some(FrameSample {
        width: rect.width(),
        height: rect.height(),
        opacity,
        in_viewport: rect.bottom() > 0.0
            && rect.right() > 0.0
            && rect.top() < view_h
            && rect.left() < view_w,
    })
}

#[derive(Properties, PartialEq, Clone)]
pub struct GlitchGateProps {
    pub gate: GateConfig,
    pub entry: EntryGateConfig,
    pub audio: AudioConfig,
    pub music: MusicConfig,
    pub seed: u64,
}

/// Full-screen gate: entry prompt, simulated progress, fade and release.
#[function_component(GlitchGate)]
pub fn glitch_gate(props: &GlitchGateProps) -> Html {
    let view = use_state(GateView::default);
    let entered = use_state(|| false);
    let failsafe = use_state(|| false);
    let runtime = use_mut_ref(|| None::<Rc<GateRuntime>>);
    let card_ref = use_node_ref();

    {
        let runtime = runtime.clone();
        let setter = view.setter();
        let props = props.clone();
        use_effect_with((), move |()| {
            let armed = GateRuntime::arm(&props, Callback::from(move |next| setter.set(next)));
            *runtime.borrow_mut() = Some(armed);
            move || {
                if let Some(armed) = runtime.borrow_mut().take()
                    && armed.state().is_blocking()
                {
                    armed.disarm();
                }
            }
        });
    }

    {
        let card_ref = card_ref.clone();
        let failsafe = failsafe.clone();
        use_effect_with((), move |()| {
            let monitor = Rc::new(RefCell::new(VisibilityMonitor::default()));
            let attempts = Rc::new(RefCell::new(0_u32));
            let interval = Interval::new(FRAME_SAMPLE_MS, move || {
                let mut attempts = attempts.borrow_mut();
                if *attempts >= MAX_FRAME_SAMPLES {
                    return;
                }
                *attempts += 1;
                let sample = card_ref.cast::<Element>().and_then(|el| sample_frame(&el));
                match monitor.borrow_mut().record(sample) {
                    VisibilityVerdict::Pending => {}
                    VisibilityVerdict::Visible => *attempts = MAX_FRAME_SAMPLES,
                    VisibilityVerdict::Failsafe => {
                        *attempts = MAX_FRAME_SAMPLES;
                        log::warn!("gate overlay not visible; showing failsafe card");
                        failsafe.set(true);
                    }
                }
            });
            move || drop(interval)
        });
    }

    let on_enter = {
        let entered = entered.clone();
        Callback::from(move |()| {
            if *entered {
                return;
            }
            entered.set(true);
            signals::publish(&Signal::EntryConfirmed);
        })
    };

    if !view.is_visible() {
        return Html::default();
    }
    if *failsafe {
        return html! {
            <FailsafeCard label={AttrValue::from(props.entry.label.clone())} entered={*entered} {on_enter} />
        };
    }
    html! {
        <GateCard
            label={AttrValue::from(props.entry.label.clone())}
            percent={view.percent}
            fading={view.fading}
            entered={*entered}
            {on_enter}
            node_ref={card_ref}
        />
    }
}

#[derive(Properties, PartialEq, Clone)]
pub struct GateCardProps {
    pub label: AttrValue,
    pub percent: f64,
    #[prop_or_default]
    pub fading: bool,
    #[prop_or_default]
    pub entered: bool,
    pub on_enter: Callback<()>,
    #[prop_or_default]
    pub node_ref: NodeRef,
}

#[function_component(GateCard)]
pub fn gate_card(props: &GateCardProps) -> Html {
    let percent = props.percent.clamp(0.0, 100.0);
    let onclick = {
        let on_enter = props.on_enter.clone();
        Callback::from(move |_: MouseEvent| on_enter.emit(()))
    };
    let class = classes!("glitch-gate", props.fading.then_some("glitch-gate--fading"));
    html! {
        <div class={class} role="dialog" aria-modal="true" aria-labelledby="glitch-gate-title" ref={props.node_ref.clone()}>
            <div class="glitch-gate__card">
                <h2 id="glitch-gate-title" class="glitch-gate__title">{ "Preparing your visit" }</h2>
                if props.entered {
                    <div
                        class="glitch-gate__progress"
                        role="progressbar"
                        aria-valuemin="0"
                        aria-valuemax="100"
                        aria-valuenow={format!("{percent:.0}")}
                    >
                        <div class="glitch-gate__bar" style={format!("width: {percent:.1}%")}></div>
                    </div>
                    <p class="glitch-gate__percent" aria-live="polite">{ format!("{percent:.0}%") }</p>
                } else {
                    <button type="button" class="glitch-gate__enter" {onclick}>{ props.label.clone() }</button>
                }
            </div>
        </div>
    }
}

#[derive(Properties, PartialEq, Clone)]
pub struct FailsafeCardProps {
    pub label: AttrValue,
    #[prop_or_default]
    pub entered: bool,
    pub on_enter: Callback<()>,
}

/// Plain fallback shown when the primary overlay never became visible.
#[function_component(FailsafeCard)]
pub fn failsafe_card(props: &FailsafeCardProps) -> Html {
    let onclick = {
        let on_enter = props.on_enter.clone();
        Callback::from(move |_: MouseEvent| on_enter.emit(()))
    };
    html! {
        <div class="glitch-gate-failsafe" role="dialog" aria-modal="true" aria-label="Loading">
            if props.entered {
                <p class="glitch-gate-failsafe__status">{ "Loading…" }</p>
            } else {
                <button type="button" class="glitch-gate-failsafe__enter" {onclick}>{ props.label.clone() }</button>
            }
        </div>
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glitchgate_core::{DurationSource, ProgressBeat};

    #[test]
    fn view_tracks_machine_outputs() {
        let view = GateView::default()
            .apply(&GateOutput::Started {
                duration_ms: 5_000,
                source: DurationSource::Metadata,
            })
            .apply(&GateOutput::Progress {
                percent: 42.0,
                beat: ProgressBeat::Advance,
            });
        assert_eq!(view.state, GateState::Active);
        assert!((view.percent - 42.0).abs() < f64::EPSILON);
        assert!(view.is_visible());

        let view = view.apply(&GateOutput::FadeStarted);
        assert!(view.fading);
        assert!(view.is_visible());

        let view = view.apply(&GateOutput::Released);
        assert!(!view.is_visible());
        assert!((view.percent - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn disarm_hides_the_overlay() {
        let view = GateView::default().apply(&GateOutput::Disarmed);
        assert_eq!(view.state, GateState::Disarmed);
        assert!(!view.is_visible());
    }
}
