//! In-process lifecycle signals and the shared session state.
//!
//! Components that need to know about the gate lifecycle subscribe here
//! instead of polling global flags. Session-wide flags live in one
//! [`SessionState`] passed by reference to the few owners that need it.
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use crate::audio::AudioOwner;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Signal {
    EntryConfirmed,
    GateReleased,
    AudioSceneLock { scene: String },
    AudioSceneRelease { scene: String },
    VisitMusicStarted,
    VisitMusicAudible,
}

impl Signal {
    /// `CustomEvent` type used on the page.
    #[must_use]
    pub const fn dom_name(&self) -> &'static str {
        match self {
            Self::EntryConfirmed => "entry-confirmed",
            Self::GateReleased => "glitch-gate-released",
            Self::AudioSceneLock { .. } => "audio-scene-lock",
            Self::AudioSceneRelease { .. } => "audio-scene-release",
            Self::VisitMusicStarted => "visit-music-started",
            Self::VisitMusicAudible => "visit-music-audible",
        }
    }

    /// Parse an inbound DOM event. Scene events need a non-empty scene.
    #[must_use]
    pub fn from_dom(name: &str, scene: Option<&str>) -> Option<Self> {
        let scene = scene.map(str::trim).filter(|scene| !scene.is_empty());
        match name {
            "entry-confirmed" => Some(Self::EntryConfirmed),
            "glitch-gate-released" => Some(Self::GateReleased),
            "audio-scene-lock" => scene.map(|scene| Self::AudioSceneLock {
                scene: scene.to_string(),
            }),
            "audio-scene-release" => scene.map(|scene| Self::AudioSceneRelease {
                scene: scene.to_string(),
            }),
            "visit-music-started" => Some(Self::VisitMusicStarted),
            "visit-music-audible" => Some(Self::VisitMusicAudible),
            _ => None,
        }
    }

    /// Signals that may be delivered at most once per session.
    #[must_use]
    pub const fn is_once(&self) -> bool {
        matches!(
            self,
            Self::EntryConfirmed
                | Self::GateReleased
                | Self::VisitMusicStarted
                | Self::VisitMusicAudible
        )
    }

    #[must_use]
    pub fn scene(&self) -> Option<&str> {
        match self {
            Self::AudioSceneLock { scene } | Self::AudioSceneRelease { scene } => Some(scene),
            _ => None,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scene() {
            Some(scene) => write!(f, "{}({scene})", self.dom_name()),
            None => f.write_str(self.dom_name()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(&Signal)>;

/// Typed publish/subscribe with once-only delivery for lifecycle signals.
#[derive(Default)]
pub struct SignalBus {
    next_id: u64,
    listeners: Vec<(SubscriptionId, Listener)>,
    delivered_once: BTreeSet<&'static str>,
    emitted: u64,
}

impl fmt::Debug for SignalBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalBus")
            .field("listeners", &self.listeners.len())
            .field("delivered_once", &self.delivered_once)
            .field("emitted", &self.emitted)
            .finish()
    }
}

impl SignalBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&Signal) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        self.listeners.len() != before
    }

    /// Deliver a signal to every listener. Returns `false` when a once-only
    /// signal was already delivered and this emission was dropped.
    pub fn emit(&mut self, signal: &Signal) -> bool {
        if signal.is_once() && !self.delivered_once.insert(signal.dom_name()) {
            log::debug!("dropping repeated {signal}");
            return false;
        }
        self.emitted += 1;
        for (_, listener) in &mut self.listeners {
            listener(signal);
        }
        true
    }

    #[must_use]
    pub fn was_delivered(&self, signal: &Signal) -> bool {
        self.delivered_once.contains(signal.dom_name())
    }

    #[must_use]
    pub const fn emitted(&self) -> u64 {
        self.emitted
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

/// Session-wide lifecycle flags with a single owner for audio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub entry_confirmed: bool,
    pub gate_armed: bool,
    /// Append-only: never cleared once set.
    pub gate_released: bool,
    pub audio_owner: AudioOwner,
    pub scene_locks: BTreeSet<String>,
    pub music_started: bool,
    pub music_audible: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            entry_confirmed: false,
            gate_armed: false,
            gate_released: false,
            audio_owner: AudioOwner::Gate,
            scene_locks: BTreeSet::new(),
            music_started: false,
            music_audible: false,
        }
    }
}

impl SessionState {
    /// Fold a signal into the session flags.
    pub fn apply(&mut self, signal: &Signal) {
        match signal {
            Signal::EntryConfirmed => self.entry_confirmed = true,
            Signal::GateReleased => {
                self.gate_released = true;
                self.gate_armed = false;
                self.audio_owner = AudioOwner::Music;
            }
            Signal::AudioSceneLock { scene } => {
                self.scene_locks.insert(scene.clone());
            }
            Signal::AudioSceneRelease { scene } => {
                self.scene_locks.remove(scene);
            }
            Signal::VisitMusicStarted => self.music_started = true,
            Signal::VisitMusicAudible => self.music_audible = true,
        }
    }

    /// Whether the ambient soundscape should be muted by a page scene.
    #[must_use]
    pub fn soundscape_muted(&self) -> bool {
        !self.scene_locks.is_empty()
    }
}

pub type SharedSession = Rc<RefCell<SessionState>>;

/// Wire a session so every delivered signal updates it.
pub fn track_session(bus: &mut SignalBus, session: &SharedSession) -> SubscriptionId {
    let session = Rc::clone(session);
    bus.subscribe(move |signal| session.borrow_mut().apply(signal))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dom_names_round_trip() {
        let signals = [
            Signal::EntryConfirmed,
            Signal::GateReleased,
            Signal::AudioSceneLock {
                scene: String::from("certificate"),
            },
            Signal::AudioSceneRelease {
                scene: String::from("certificate"),
            },
            Signal::VisitMusicStarted,
            Signal::VisitMusicAudible,
        ];
        for signal in signals {
            assert_eq!(
                Signal::from_dom(signal.dom_name(), signal.scene()),
                Some(signal.clone())
            );
        }
        assert_eq!(Signal::from_dom("audio-scene-lock", Some("  ")), None);
        assert_eq!(Signal::from_dom("unknown", None), None);
    }

    #[test]
    fn released_is_delivered_once() {
        let mut bus = SignalBus::new();
        let hits = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&hits);
        bus.subscribe(move |signal| {
            if *signal == Signal::GateReleased {
                *counter.borrow_mut() += 1;
            }
        });
        assert!(bus.emit(&Signal::GateReleased));
        assert!(!bus.emit(&Signal::GateReleased));
        assert_eq!(*hits.borrow(), 1);
    }

    #[test]
    fn scene_locks_are_repeatable_and_tracked() {
        let mut bus = SignalBus::new();
        let session: SharedSession = Rc::default();
        let id = track_session(&mut bus, &session);
        let lock = Signal::AudioSceneLock {
            scene: String::from("certificate"),
        };
        assert!(bus.emit(&lock));
        assert!(bus.emit(&lock));
        assert!(session.borrow().soundscape_muted());
        bus.emit(&Signal::AudioSceneRelease {
            scene: String::from("certificate"),
        });
        assert!(!session.borrow().soundscape_muted());

        bus.emit(&Signal::GateReleased);
        assert!(session.borrow().gate_released);
        assert_eq!(session.borrow().audio_owner, AudioOwner::Music);
        assert!(bus.unsubscribe(id));
        assert_eq!(bus.listener_count(), 0);
    }
}
