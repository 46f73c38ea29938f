//! `<audio>` driver: executes negotiator commands and feeds play() outcomes back.
use glitchgate_core::{
    AudioChannel, AudioCommand, AudioCommands, AudioConfig, AudioOwner, MAX_METADATA_MS,
    MusicConfig, MusicQueue, MusicStep, NotOwner, PlayRejection,
};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use web_sys::{DomException, HtmlAudioElement};

use crate::dom;
use crate::listeners::{EventListener, ListenerSet};
use crate::signals;
use crate::timers::TimerSlot;

type MetadataHook = Box<dyn Fn(u64)>;

/// One shared `<audio>` element and the channel that owns it.
pub struct AudioDriver {
    element: HtmlAudioElement,
    channel: RefCell<AudioChannel>,
    music: RefCell<Option<MusicQueue>>,
    rng: RefCell<SmallRng>,
    timer: RefCell<TimerSlot>,
    on_metadata: RefCell<Option<MetadataHook>>,
    listeners: RefCell<ListenerSet>,
}

/// Map a rejected `play()` promise to a rejection kind.
#[must_use]
pub fn rejection_from(err: &JsValue) -> PlayRejection {
    err.dyn_ref::<DomException>().map_or_else(
        || PlayRejection::Media(dom::js_error_message(err)),
        |exception| PlayRejection::from_dom_name(&exception.name(), &exception.message()),
    )
}

impl AudioDriver {
    /// Create the element and wire media and gesture listeners.
    ///
    /// # Errors
    /// Returns an error if the `<audio>` element cannot be created.
    pub fn new(cfg: AudioConfig, seed: u64) -> Result<Rc<Self>, JsValue> {
        let element = HtmlAudioElement::new()?;
        element.set_preload("auto");
        let driver = Rc::new(Self {
            element,
            channel: RefCell::new(AudioChannel::new(cfg, AudioOwner::Gate)),
            music: RefCell::new(None),
            rng: RefCell::new(SmallRng::seed_from_u64(seed)),
            timer: RefCell::new(TimerSlot::default()),
            on_metadata: RefCell::new(None),
            listeners: RefCell::new(ListenerSet::default()),
        });
        driver.wire();
        Ok(driver)
    }

    fn wire(self: &Rc<Self>) {
        let mut listeners = ListenerSet::default();
        let weak = Rc::downgrade(self);
        listeners.keep(EventListener::bubble(&self.element, "loadedmetadata", {
            let weak = Weak::clone(&weak);
            move |_| {
                if let Some(driver) = weak.upgrade() {
                    driver.metadata_loaded();
                }
                Ok(())
            }
        }));
        listeners.keep(EventListener::bubble(&self.element, "ended", {
            let weak = Weak::clone(&weak);
            move |_| {
                if let Some(driver) = weak.upgrade() {
                    driver.track_ended();
                }
                Ok(())
            }
        }));
        listeners.keep(EventListener::bubble(&self.element, "error", {
            let weak = Weak::clone(&weak);
            move |_| {
                if let Some(driver) = weak.upgrade() {
                    driver.media_error();
                }
                Ok(())
            }
        }));
        if let Some(doc) = dom::document() {
            for kind in ["pointerdown", "keydown"] {
                let weak = Weak::clone(&weak);
                listeners.keep(EventListener::capture(&doc, kind, move |event| {
                    if event.is_trusted()
                        && let Some(driver) = weak.upgrade()
                    {
                        let commands = driver.channel.borrow_mut().user_gesture(dom::now_ms());
                        driver.execute(commands);
                    }
                    Ok(())
                }));
            }
        }
        *self.listeners.borrow_mut() = listeners;
    }

    /// Called with the element's duration in ms whenever metadata loads.
    pub fn on_metadata(&self, hook: impl Fn(u64) + 'static) {
        *self.on_metadata.borrow_mut() = Some(Box::new(hook));
    }

    #[must_use]
    pub fn owner(&self) -> AudioOwner {
        self.channel.borrow().owner()
    }

    /// Start the gate track.
    pub fn play_gate(self: &Rc<Self>, url: &str, volume: f64) {
        let result = self.channel.borrow_mut().play(AudioOwner::Gate, url, volume);
        self.run(result);
    }

    /// The gate closed before release.
    pub fn pause_gate(self: &Rc<Self>) {
        let result = self.channel.borrow_mut().pause(AudioOwner::Gate);
        self.run(result);
        self.timer.borrow_mut().clear();
    }

    /// Give the element to the music queue and start the visit playlist.
    pub fn hand_to_music(self: &Rc<Self>, music: &MusicConfig) {
        let handed = self
            .channel
            .borrow_mut()
            .hand_over(AudioOwner::Gate, AudioOwner::Music);
        self.run(handed);
        let queue = MusicQueue::new(music.tracks.clone(), music.volume, &mut *self.rng.borrow_mut());
        *self.music.borrow_mut() = Some(queue);
        let step = self.with_music(|queue, channel, _| queue.start(channel));
        self.run_step(step);
    }

    fn with_music(
        &self,
        f: impl FnOnce(&mut MusicQueue, &mut AudioChannel, &mut SmallRng) -> Result<MusicStep, NotOwner>,
    ) -> Option<Result<MusicStep, NotOwner>> {
        let mut music = self.music.borrow_mut();
        let queue = music.as_mut()?;
        let mut channel = self.channel.borrow_mut();
        let mut rng = self.rng.borrow_mut();
        Some(f(queue, &mut channel, &mut rng))
    }

    fn run(self: &Rc<Self>, result: Result<AudioCommands, NotOwner>) {
        match result {
            Ok(commands) => self.execute(commands),
            Err(err) => log::warn!("audio write refused: {err}"),
        }
    }

    fn run_step(self: &Rc<Self>, step: Option<Result<MusicStep, NotOwner>>) {
        match step {
            Some(Ok(step)) => {
                self.execute(step.commands);
                for signal in &step.signals {
                    signals::publish(signal);
                }
            }
            Some(Err(err)) => log::warn!("music write refused: {err}"),
            None => {}
        }
    }

    fn music_active(&self) -> bool {
        self.music.borrow().is_some() && self.owner() == AudioOwner::Music
    }

    /// Apply commands to the element, then re-arm the negotiator's next deadline.
    pub fn execute(self: &Rc<Self>, commands: AudioCommands) {
        for command in commands {
            match command {
                AudioCommand::Load { url } => {
                    self.element.set_src(&url);
                    self.element.load();
                }
                AudioCommand::Play { muted, volume } => {
                    self.element.set_muted(muted);
                    self.element.set_volume(volume.clamp(0.0, 1.0));
                    self.start_play();
                }
                AudioCommand::SetMuted { muted } => self.element.set_muted(muted),
                AudioCommand::SetVolume { volume } => {
                    self.element.set_volume(volume.clamp(0.0, 1.0));
                }
                AudioCommand::Pause => {
                    if let Err(err) = self.element.pause() {
                        dom::console_error(&format!(
                            "Failed to pause audio: {}",
                            dom::js_error_message(&err)
                        ));
                    }
                }
            }
        }
        self.rearm();
    }

    fn start_play(self: &Rc<Self>) {
        match self.element.play() {
            Ok(promise) => {
                let weak = Rc::downgrade(self);
                wasm_bindgen_futures::spawn_local(async move {
                    let outcome = JsFuture::from(promise).await;
                    let Some(driver) = weak.upgrade() else {
                        return;
                    };
                    match outcome {
                        Ok(_) => driver.play_resolved(),
                        Err(err) => driver.play_rejected(&rejection_from(&err)),
                    }
                });
            }
            Err(err) => {
                let weak = Rc::downgrade(self);
                wasm_bindgen_futures::spawn_local(async move {
                    if let Some(driver) = weak.upgrade() {
                        driver.play_rejected(&rejection_from(&err));
                    }
                });
            }
        }
    }

    fn play_resolved(self: &Rc<Self>) {
        let now = dom::now_ms();
        if self.music_active() {
            let step = self.with_music(|queue, channel, _| Ok(queue.on_play_resolved(channel, now)));
            self.run_step(step);
        } else {
            let commands = self.channel.borrow_mut().play_resolved(now);
            self.execute(commands);
        }
    }

    fn play_rejected(self: &Rc<Self>, rejection: &PlayRejection) {
        let now = dom::now_ms();
        if self.music_active() {
            let step = self.with_music(|queue, channel, rng| {
                queue.on_play_rejected(channel, now, rejection, rng)
            });
            self.run_step(step);
        } else {
            let commands = self.channel.borrow_mut().play_rejected(now, rejection);
            self.execute(commands);
        }
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn metadata_loaded(&self) {
        let seconds = self.element.duration();
        if !seconds.is_finite() || seconds <= 0.0 {
            return;
        }
        let duration_ms = (seconds * 1_000.0).round().min(MAX_METADATA_MS as f64) as u64;
        if let Some(hook) = self.on_metadata.borrow().as_ref() {
            hook(duration_ms);
        }
    }

    fn track_ended(self: &Rc<Self>) {
        if self.music_active() {
            let step = self.with_music(|queue, channel, rng| queue.on_ended(channel, rng));
            self.run_step(step);
        } else {
            self.channel.borrow_mut().ended();
            self.timer.borrow_mut().clear();
        }
    }

    fn media_error(self: &Rc<Self>) {
        if self.music_active() {
            let step = self.with_music(|queue, channel, rng| queue.on_error(channel, rng));
            self.run_step(step);
        } else {
            self.channel.borrow_mut().media_error("media element error");
            self.timer.borrow_mut().clear();
        }
    }

    fn rearm(self: &Rc<Self>) {
        let Some(at) = self.channel.borrow().next_deadline() else {
            return;
        };
        let weak = Rc::downgrade(self);
        self.timer.borrow_mut().schedule_at(at, move || {
            if let Some(driver) = weak.upgrade() {
                let commands = driver.channel.borrow_mut().advance(dom::now_ms());
                driver.execute(commands);
            }
        });
    }
}

impl Drop for AudioDriver {
    fn drop(&mut self) {
        let _ = self.element.pause();
        self.listeners.borrow_mut().clear();
    }
}
