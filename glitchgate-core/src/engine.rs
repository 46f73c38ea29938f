//! Single entry point that routes page events through every trap.
//!
//! Capture order per event type:
//!
//! | event | controllers, in order |
//! |---|---|
//! | `pointermove` | zone, cursor |
//! | touch `click` / `pointerup` | zone |
//! | `keydown` | focus |
//! | `copy` / `paste` | clipboard |
//! | `input` on a range | drag |
//! | chrome button | chrome |
//!
//! The first controller to activate wins; later ones never see the event.
use crate::config::EngineConfig;
use crate::incident::{Incident, IncidentLog, Severity, Surface};
use crate::phase::Phase;
use crate::rng::RngBundle;
use crate::scheduler::{TourPick, TourScheduler, TourTrigger};
use crate::traps::{
    ChromeButton, ChromeEffect, ChromeTrap, ClipboardAction, ClipboardEffect, ClipboardTrap,
    CursorEffect, CursorTrap, DragFriction, DragInput, DragSnapBack, DragTrap, FocusEffect,
    FocusTrap, KeyInput, PointerSample, TargetKey, TrapContext, TrapDecision, ZoneEffect,
    ZonePointer, ZoneTrap,
};

/// A DOM event reduced to what the controllers need.
#[derive(Debug, Clone, PartialEq)]
pub enum HostileEvent<'a> {
    PointerMove {
        sample: PointerSample,
        /// Present when the pointer is inside a trap zone.
        zone: Option<ZonePointer>,
    },
    Tap(ZonePointer),
    Key(KeyInput<'a>),
    Clipboard(ClipboardAction<'a>),
    Drag(DragInput),
    Chrome(ChromeButton),
}

impl HostileEvent<'_> {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::PointerMove { .. } => "pointermove",
            Self::Tap(_) => "tap",
            Self::Key(_) => "keydown",
            Self::Clipboard(_) => "clipboard",
            Self::Drag(_) => "input",
            Self::Chrome(_) => "chrome",
        }
    }
}

/// What the browser glue should apply for an intercepted event.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEffect {
    Zone(ZoneEffect),
    Cursor(CursorEffect),
    Focus(FocusEffect),
    Clipboard(ClipboardEffect),
    DragFriction(DragFriction),
    /// Damped value the range input should display.
    DragValue(f64),
    SnapBack(DragSnapBack),
    Chrome(ChromeEffect),
}

impl EngineEffect {
    #[must_use]
    pub const fn surface(&self) -> Surface {
        match self {
            Self::Zone(_) => Surface::Zone,
            Self::Cursor(_) => Surface::Cursor,
            Self::Focus(_) => Surface::Focus,
            Self::Clipboard(_) => Surface::Clipboard,
            Self::DragFriction(_) | Self::DragValue(_) | Self::SnapBack(_) => Surface::Drag,
            Self::Chrome(_) => Surface::Chrome,
        }
    }

    /// Whether the original DOM event must be prevented.
    #[must_use]
    pub const fn prevents_default(&self) -> bool {
        match self {
            Self::Zone(ZoneEffect::DeferTap { .. })
            | Self::Focus(FocusEffect::Redirect { swallow: true })
            | Self::Clipboard(_)
            | Self::DragValue(_)
            | Self::Chrome(_) => true,
            Self::Zone(ZoneEffect::Nudge { .. })
            | Self::Cursor(_)
            | Self::Focus(FocusEffect::Redirect { swallow: false })
            | Self::DragFriction(_)
            | Self::SnapBack(_) => false,
        }
    }
}

/// Owns every controller, the RNG streams and the incident log.
#[derive(Debug)]
pub struct TrapEngine {
    phase: Phase,
    pity: bool,
    max_hostility: bool,
    rng: RngBundle,
    cursor: CursorTrap,
    zone: ZoneTrap,
    focus: FocusTrap,
    clipboard: ClipboardTrap,
    drag: DragTrap,
    chrome: ChromeTrap,
    tour: TourScheduler,
    incidents: IncidentLog,
    intercepted: u64,
}

impl TrapEngine {
    #[must_use]
    pub fn new(cfg: &EngineConfig, seed: u64) -> Self {
        Self {
            phase: Phase::One,
            pity: false,
            max_hostility: false,
            rng: RngBundle::from_user_seed(seed),
            cursor: CursorTrap::new(cfg.cursor.clone()),
            zone: ZoneTrap::new(cfg.zone.clone()),
            focus: FocusTrap::new(cfg.focus.clone()),
            clipboard: ClipboardTrap::new(cfg.clipboard.clone()),
            drag: DragTrap::new(cfg.drag.clone()),
            chrome: ChromeTrap::new(cfg.chrome.clone()),
            tour: TourScheduler::new(&cfg.tour),
            incidents: IncidentLog::new(cfg.incident_capacity),
            intercepted: 0,
        }
    }

    pub fn set_phase(&mut self, phase: Phase) {
        if phase != self.phase {
            log::debug!("hostility phase {} -> {}", self.phase.level(), phase.level());
        }
        self.phase = phase;
    }

    pub fn set_pity(&mut self, pity: bool) {
        self.pity = pity;
    }

    pub fn set_max_hostility(&mut self, max_hostility: bool) {
        self.max_hostility = max_hostility;
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub const fn context(&self, now_ms: u64) -> TrapContext {
        TrapContext::new(self.phase, now_ms)
            .with_pity(self.pity)
            .with_max_hostility(self.max_hostility)
    }

    /// Offer one event to the controllers in capture order.
    pub fn handle(&mut self, now_ms: u64, event: &HostileEvent<'_>) -> Option<EngineEffect> {
        let ctx = self.context(now_ms);
        let effect = match event {
            HostileEvent::PointerMove { sample, zone } => {
                let zoned = zone.as_ref().and_then(|zone| {
                    let decision = self.zone.decide(&ctx, zone, &mut *self.rng.zone());
                    self.settle(decision).map(EngineEffect::Zone)
                });
                zoned.or_else(|| {
                    let decision = self.cursor.decide(&ctx, sample, &mut *self.rng.cursor());
                    self.settle(decision).map(EngineEffect::Cursor)
                })
            }
            HostileEvent::Tap(zone) => {
                let decision = self.zone.decide(&ctx, zone, &mut *self.rng.zone());
                self.settle(decision).map(EngineEffect::Zone)
            }
            HostileEvent::Key(input) => {
                let decision = self.focus.decide(&ctx, input, &mut *self.rng.focus());
                self.settle(decision).map(EngineEffect::Focus)
            }
            HostileEvent::Clipboard(action) => {
                let decision = self
                    .clipboard
                    .decide(&ctx, action, &mut *self.rng.clipboard());
                self.settle(decision).map(EngineEffect::Clipboard)
            }
            HostileEvent::Drag(DragInput::Begin { control, value }) => {
                let decision = self.drag.begin(&ctx, *control, *value);
                self.settle(decision).map(EngineEffect::DragFriction)
            }
            HostileEvent::Drag(DragInput::Move { control, raw }) => self
                .drag
                .input(*control, *raw)
                .filter(|value| (value - raw).abs() > f64::EPSILON)
                .map(EngineEffect::DragValue),
            HostileEvent::Drag(DragInput::Release { control }) => {
                let decision = self.drag.release(&ctx, *control, &mut *self.rng.drag());
                self.settle(decision).map(EngineEffect::SnapBack)
            }
            HostileEvent::Chrome(button) => {
                let decision = self.chrome.press(&ctx, *button, &mut *self.rng.chrome());
                self.settle(decision).map(EngineEffect::Chrome)
            }
        };
        if effect.is_some() {
            self.intercepted = self.intercepted.saturating_add(1);
        }
        effect
    }

    /// Offer a tour trigger to the scheduler and log any pick.
    pub fn offer_tour(&mut self, now_ms: u64, trigger: TourTrigger) -> Option<TourPick> {
        let ctx = self.context(now_ms);
        let pick = self.tour.offer(&ctx, trigger, &mut *self.rng.tour())?;
        let severity = if pick.event.effect.is_catastrophic() {
            Severity::Critical
        } else {
            Severity::Info
        };
        self.incidents.push(
            Incident::new(Surface::Tour, now_ms, pick.event.message.clone())
                .with_severity(severity)
                .tagged(&pick.event.id),
        );
        Some(pick)
    }

    /// Zones whose held touch tap should be re-dispatched now.
    pub fn take_due_taps(&mut self, now_ms: u64) -> Vec<TargetKey> {
        self.zone.take_due_taps(now_ms)
    }

    /// Forget a control or region that left the page.
    pub fn evict(&mut self, key: TargetKey) {
        self.cursor.evict(key);
        self.zone.evict(key);
        self.focus.evict(key);
        self.clipboard.evict(key);
        self.drag.evict(key);
    }

    #[must_use]
    pub const fn incidents(&self) -> &IncidentLog {
        &self.incidents
    }

    pub fn incidents_mut(&mut self) -> &mut IncidentLog {
        &mut self.incidents
    }

    #[must_use]
    pub const fn intercepted(&self) -> u64 {
        self.intercepted
    }

    #[must_use]
    pub const fn rng(&self) -> &RngBundle {
        &self.rng
    }

    #[must_use]
    pub const fn cursor(&self) -> &CursorTrap {
        &self.cursor
    }

    pub fn cursor_mut(&mut self) -> &mut CursorTrap {
        &mut self.cursor
    }

    pub fn zone_mut(&mut self) -> &mut ZoneTrap {
        &mut self.zone
    }

    pub fn focus_mut(&mut self) -> &mut FocusTrap {
        &mut self.focus
    }

    pub fn clipboard_mut(&mut self) -> &mut ClipboardTrap {
        &mut self.clipboard
    }

    #[must_use]
    pub const fn zone(&self) -> &ZoneTrap {
        &self.zone
    }

    #[must_use]
    pub const fn drag(&self) -> &DragTrap {
        &self.drag
    }

    #[must_use]
    pub const fn tour(&self) -> &TourScheduler {
        &self.tour
    }

    fn settle<E>(&mut self, decision: TrapDecision<E>) -> Option<E> {
        let (effect, incident) = decision.into_parts()?;
        self.incidents.push(incident);
        Some(effect)
    }
}
