//! Capturing listeners that feed page events to the [`TrapEngine`] and apply
//! whatever it decides.
//!
//! Pages opt elements in with `data-glitch-*` attributes (see [`crate::dom`]).
//! Every effect that changes the page is undone by a timer registered here,
//! and dropping the runtime removes every listener and pending timer.
use glitchgate_core::traps::{
    ChromeButton, ChromeEffect, ClipboardAction, ClipboardEffect, DragInput, FocusEffect,
    KeyInput, PointerKind, PointerSample, ZoneEffect, ZoneGesture, ZonePointer,
};
use glitchgate_core::{
    EngineConfig, EngineEffect, HostileEvent, Phase, TargetKey, TourEffect, TourPick, TourTrigger,
    TrapEngine,
};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{ClipboardEvent, Element, Event, HtmlElement, HtmlInputElement, KeyboardEvent, PointerEvent};

use crate::dom::{self, CHROME_ATTR, DECOY_ATTR, FIELD_ATTR, FOCUS_ATTR, TARGET_ATTR, ZONE_ATTR};
use crate::listeners::{EventListener, ListenerSet};
use crate::timers::{Interval, TimerSlot};

/// Quiet time before the scheduler is offered an idle trigger.
pub const IDLE_AFTER_MS: u64 = 12_000;
const IDLE_POLL_MS: u64 = 1_000;
const TOAST_MS: u64 = 3_200;
const REJECT_FLASH_MS: u64 = 600;
/// Key for restore timers that are not tied to one element.
const PAGE: TargetKey = TargetKey::from_raw(0);

/// Body class and duration for a tour effect.
#[must_use]
pub const fn tour_class(effect: TourEffect) -> Option<(&'static str, u64)> {
    match effect {
        TourEffect::Toast => None,
        TourEffect::Shake => Some(("glitch-shake", 600)),
        TourEffect::Glitch => Some(("glitch-static", 450)),
        TourEffect::Regress => Some(("glitch-regress", 1_500)),
        TourEffect::Lockout => Some(("glitch-lockout", 4_000)),
        TourEffect::Freeze => Some(("glitch-freeze", 2_500)),
    }
}

/// Tour trigger offered by a trusted click on `tag`: following a link leaves
/// the scene, pressing a submit control asks its form to validate.
#[must_use]
pub fn click_trigger(tag: &str, input_type: Option<&str>, has_href: bool, in_form: bool) -> Option<TourTrigger> {
    let submits = |kind: Option<&str>| kind.is_none_or(|kind| kind.eq_ignore_ascii_case("submit"));
    match tag.to_ascii_uppercase().as_str() {
        "A" if has_href => Some(TourTrigger::BeforeTransition),
        "BUTTON" if in_form && submits(input_type) => Some(TourTrigger::BeforeValidate),
        "INPUT" if in_form && input_type.is_some_and(|kind| kind.eq_ignore_ascii_case("submit")) => {
            Some(TourTrigger::BeforeValidate)
        }
        _ => None,
    }
}

fn click_trigger_for(el: &Element) -> Option<TourTrigger> {
    let control = el.closest("a[href], button, input[type=submit]").ok().flatten()?;
    let input_type = control.get_attribute("type");
    let in_form = control.closest("form").ok().flatten().is_some();
    click_trigger(
        &control.tag_name(),
        input_type.as_deref(),
        control.has_attribute("href"),
        in_form,
    )
}

/// Read a phase level from `data-glitch-phase`, defaulting to phase one.
#[must_use]
pub fn parse_phase(raw: Option<&str>) -> Phase {
    raw.and_then(|raw| raw.trim().parse::<u8>().ok())
        .and_then(Phase::from_level)
        .unwrap_or(Phase::One)
}

type RestoreKey = (&'static str, TargetKey);

/// Drop every pending restore tied to `key`; page-wide restores stay.
fn evict_restores<V>(restores: &mut HashMap<RestoreKey, V>, key: TargetKey) {
    restores.retain(|(_, target), _| *target != key);
}

pub struct HostileRuntime {
    engine: RefCell<TrapEngine>,
    zones: RefCell<HashMap<TargetKey, Element>>,
    held_taps: RefCell<HashMap<TargetKey, Element>>,
    restores: RefCell<HashMap<RestoreKey, TimerSlot>>,
    last_activity: Cell<u64>,
    idle_offered: Cell<bool>,
    idle: RefCell<Option<Interval>>,
    listeners: RefCell<ListenerSet>,
}

impl HostileRuntime {
    /// Build the engine and attach every listener.
    #[must_use]
    pub fn install(cfg: &EngineConfig, seed: u64) -> Rc<Self> {
        let mut engine = TrapEngine::new(cfg, seed);
        let root = dom::document().and_then(|doc| doc.document_element());
        let phase = parse_phase(
            root.as_ref()
                .and_then(|root| root.get_attribute("data-glitch-phase"))
                .as_deref(),
        );
        engine.set_phase(phase);
        let runtime = Rc::new(Self {
            engine: RefCell::new(engine),
            zones: RefCell::new(HashMap::new()),
            held_taps: RefCell::new(HashMap::new()),
            restores: RefCell::new(HashMap::new()),
            last_activity: Cell::new(dom::now_ms()),
            idle_offered: Cell::new(false),
            idle: RefCell::new(None),
            listeners: RefCell::new(ListenerSet::default()),
        });
        runtime.attach();
        runtime
    }

    fn attach(self: &Rc<Self>) {
        let mut listeners = ListenerSet::default();
        let weak = Rc::downgrade(self);
        if let Some(doc) = dom::document() {
            let captured: [(&'static str, fn(&Rc<Self>, &Event) -> Result<(), JsValue>); 8] = [
                ("pointermove", Self::on_pointer_move),
                ("click", Self::on_click),
                ("keydown", Self::on_key),
                ("copy", Self::on_copy),
                ("paste", Self::on_paste),
                ("pointerdown", Self::on_drag_begin),
                ("input", Self::on_drag_move),
                ("change", Self::on_drag_release),
            ];
            for (kind, handler) in captured {
                listeners.keep(EventListener::capture(&doc, kind, bind(&weak, handler)));
            }
            listeners.keep(EventListener::capture(&doc, "submit", bind(&weak, |rt, event| {
                if event.is_trusted() {
                    rt.offer_tour(TourTrigger::AfterValidate);
                }
                Ok(())
            })));
        }
        *self.listeners.borrow_mut() = listeners;

        let idle_weak = Weak::clone(&weak);
        match Interval::new(IDLE_POLL_MS, move || {
            if let Some(rt) = idle_weak.upgrade() {
                rt.poll_idle();
            }
        }) {
            Ok(interval) => *self.idle.borrow_mut() = Some(interval),
            Err(err) => dom::console_error(&format!(
                "Failed to start idle poll: {}",
                dom::js_error_message(&err)
            )),
        }
    }

    pub fn set_phase(&self, phase: Phase) {
        self.engine.borrow_mut().set_phase(phase);
    }

    pub fn set_pity(&self, pity: bool) {
        self.engine.borrow_mut().set_pity(pity);
    }

    pub fn set_max_hostility(&self, max_hostility: bool) {
        self.engine.borrow_mut().set_max_hostility(max_hostility);
    }

    /// Forget a control or region that was removed from the page.
    pub fn forget(&self, label: &str) {
        let key = TargetKey::from_label(label);
        self.engine.borrow_mut().evict(key);
        self.zones.borrow_mut().remove(&key);
        self.held_taps.borrow_mut().remove(&key);
        evict_restores(&mut self.restores.borrow_mut(), key);
    }

    /// Run `f` against the engine, e.g. to read the incident log.
    pub fn with_engine<T>(&self, f: impl FnOnce(&TrapEngine) -> T) -> T {
        f(&self.engine.borrow())
    }

    fn touch(&self, now_ms: u64) {
        self.last_activity.set(now_ms);
        self.idle_offered.set(false);
    }

    fn dispatch(&self, now_ms: u64, event: &HostileEvent<'_>) -> Option<EngineEffect> {
        let effect = self.engine.borrow_mut().handle(now_ms, event);
        if let Some(effect) = &effect {
            log::debug!("{} intercepted by {}", event.kind(), effect.surface().label());
        }
        effect
    }

    fn on_pointer_move(self: &Rc<Self>, event: &Event) -> Result<(), JsValue> {
        let (Some(pointer), Some(el)) = (event.dyn_ref::<PointerEvent>(), dom::event_element(event))
        else {
            return Ok(());
        };
        let now = dom::now_ms();
        self.touch(now);
        let zone = dom::keyed_ancestor(&el, ZONE_ATTR);
        let target = dom::keyed_ancestor(&el, TARGET_ATTR).or_else(|| zone.clone());
        let Some((target_el, target)) = target else {
            return Ok(());
        };
        let zone = zone.map(|(host, key)| {
            self.zones.borrow_mut().insert(key, host);
            ZonePointer {
                zone: key,
                pointer: PointerKind::from_dom(&pointer.pointer_type()),
                gesture: ZoneGesture::Move {
                    motion_px: f64::from(pointer.movement_x()).hypot(f64::from(pointer.movement_y())),
                },
                synthetic: !event.is_trusted(),
            }
        });
        let sample = PointerSample {
            target,
            kind: dom::classify(&target_el),
            x: f64::from(pointer.client_x()),
            y: f64::from(pointer.client_y()),
        };
        let zone_key = zone.map(|zone| zone.zone);
        if let Some(effect) = self.dispatch(now, &HostileEvent::PointerMove { sample, zone }) {
            self.apply(event, now, effect, zone_key.unwrap_or(target), &target_el);
        }
        Ok(())
    }

    fn on_click(self: &Rc<Self>, event: &Event) -> Result<(), JsValue> {
        let Some(el) = dom::event_element(event) else {
            return Ok(());
        };
        let now = dom::now_ms();
        if let Some((host, _)) = dom::keyed_ancestor(&el, CHROME_ATTR) {
            let Some(button) = host.get_attribute(CHROME_ATTR).as_deref().and_then(ChromeButton::from_dom)
            else {
                return Ok(());
            };
            if let Some(effect) = self.dispatch(now, &HostileEvent::Chrome(button)) {
                self.apply(event, now, effect, PAGE, &host);
            }
            return Ok(());
        }

        let touch = event
            .dyn_ref::<PointerEvent>()
            .is_some_and(|pointer| pointer.pointer_type() == "touch");
        if touch && let Some((host, key)) = dom::keyed_ancestor(&el, ZONE_ATTR) {
            self.zones.borrow_mut().insert(key, host.clone());
            let tap = ZonePointer {
                zone: key,
                pointer: PointerKind::Touch,
                gesture: ZoneGesture::Tap,
                synthetic: !event.is_trusted(),
            };
            if let Some(effect) = self.dispatch(now, &HostileEvent::Tap(tap)) {
                self.apply(event, now, effect, key, &host);
                return Ok(());
            }
        }
        if event.is_trusted() {
            self.touch(now);
            if let Some(trigger) = click_trigger_for(&el) {
                self.offer_tour(trigger);
            }
        }
        Ok(())
    }

    fn on_key(self: &Rc<Self>, event: &Event) -> Result<(), JsValue> {
        let (Some(key_event), Some(el)) = (event.dyn_ref::<KeyboardEvent>(), dom::event_element(event))
        else {
            return Ok(());
        };
        let now = dom::now_ms();
        self.touch(now);
        let Some((host, zone)) = dom::keyed_ancestor(&el, FOCUS_ATTR) else {
            return Ok(());
        };
        let decoy_available = host
            .query_selector(&format!("[{DECOY_ATTR}]"))
            .ok()
            .flatten()
            .is_some();
        let key = key_event.key();
        let input = KeyInput {
            zone,
            key: &key,
            decoy_available,
        };
        if let Some(effect) = self.dispatch(now, &HostileEvent::Key(input)) {
            self.apply(event, now, effect, zone, &host);
        }
        Ok(())
    }

    fn on_copy(self: &Rc<Self>, event: &Event) -> Result<(), JsValue> {
        let Some(el) = dom::event_element(event) else {
            return Ok(());
        };
        let Some((host, field)) = dom::keyed_ancestor(&el, FIELD_ATTR) else {
            return Ok(());
        };
        let text = el.dyn_ref::<HtmlInputElement>().map_or_else(String::new, |input| {
            dom::selected_text(
                &input.value(),
                input.selection_start().ok().flatten(),
                input.selection_end().ok().flatten(),
            )
        });
        let now = dom::now_ms();
        let action = ClipboardAction::Copy { field, text: &text };
        if let Some(effect) = self.dispatch(now, &HostileEvent::Clipboard(action)) {
            self.apply(event, now, effect, field, &host);
        }
        Ok(())
    }

    fn on_paste(self: &Rc<Self>, event: &Event) -> Result<(), JsValue> {
        let Some(el) = dom::event_element(event) else {
            return Ok(());
        };
        let Some((host, field)) = dom::keyed_ancestor(&el, FIELD_ATTR) else {
            return Ok(());
        };
        let now = dom::now_ms();
        let action = ClipboardAction::Paste { field };
        if let Some(effect) = self.dispatch(now, &HostileEvent::Clipboard(action)) {
            self.apply(event, now, effect, field, &host);
        }
        Ok(())
    }

    fn range_control(event: &Event) -> Option<(HtmlInputElement, TargetKey)> {
        let input = dom::event_element(event)?.dyn_into::<HtmlInputElement>().ok()?;
        if input.type_() != "range" {
            return None;
        }
        let key = dom::keyed_ancestor(&input, TARGET_ATTR)
            .map(|(_, key)| key)
            .or_else(|| (!input.id().is_empty()).then(|| TargetKey::from_label(&input.id())))?;
        Some((input, key))
    }

    fn on_drag_begin(self: &Rc<Self>, event: &Event) -> Result<(), JsValue> {
        let Some((input, control)) = Self::range_control(event) else {
            return Ok(());
        };
        let now = dom::now_ms();
        self.touch(now);
        let begin = DragInput::Begin {
            control,
            value: input.value_as_number(),
        };
        if let Some(effect) = self.dispatch(now, &HostileEvent::Drag(begin)) {
            self.apply(event, now, effect, control, &input);
        }
        Ok(())
    }

    fn on_drag_move(self: &Rc<Self>, event: &Event) -> Result<(), JsValue> {
        let Some((input, control)) = Self::range_control(event) else {
            return Ok(());
        };
        let now = dom::now_ms();
        let raw = input.value_as_number();
        if let Some(effect) = self.dispatch(now, &HostileEvent::Drag(DragInput::Move { control, raw })) {
            self.apply(event, now, effect, control, &input);
        }
        Ok(())
    }

    fn on_drag_release(self: &Rc<Self>, event: &Event) -> Result<(), JsValue> {
        let Some((input, control)) = Self::range_control(event) else {
            return Ok(());
        };
        let now = dom::now_ms();
        dom::toggle_class(&input, "glitch-range--sticky", false);
        if let Some(effect) = self.dispatch(now, &HostileEvent::Drag(DragInput::Release { control })) {
            self.apply(event, now, effect, control, &input);
        }
        Ok(())
    }

    fn poll_idle(self: &Rc<Self>) {
        let now = dom::now_ms();
        if self.idle_offered.get() || now.saturating_sub(self.last_activity.get()) < IDLE_AFTER_MS {
            return;
        }
        self.idle_offered.set(true);
        self.offer_tour(TourTrigger::Idle);
    }

    fn offer_tour(self: &Rc<Self>, trigger: TourTrigger) {
        let now = dom::now_ms();
        let pick = self.engine.borrow_mut().offer_tour(now, trigger);
        if let Some(pick) = pick {
            self.apply_tour(now, &pick);
        }
    }

    fn apply_tour(self: &Rc<Self>, now_ms: u64, pick: &TourPick) {
        log::debug!(
            "tour {} fired from pool {} (roll {:.3})",
            pick.event.id,
            pick.trace.pool_id,
            pick.trace.roll
        );
        if !pick.event.message.is_empty() {
            self.show_toast(&pick.event.message, now_ms.saturating_add(TOAST_MS));
        }
        let Some((class, duration)) = tour_class(pick.event.effect) else {
            return;
        };
        let Some(body) = dom::document().and_then(|doc| doc.body()) else {
            return;
        };
        dom::toggle_class(&body, class, true);
        self.restore_later((class, PAGE), now_ms.saturating_add(duration), move || {
            dom::toggle_class(&body, class, false);
        });
    }

    fn apply(self: &Rc<Self>, event: &Event, now_ms: u64, effect: EngineEffect, key: TargetKey, host: &Element) {
        if effect.prevents_default() {
            event.prevent_default();
            event.stop_immediate_propagation();
        }
        match effect {
            EngineEffect::Zone(ZoneEffect::Nudge {
                dx,
                dy,
                decoy_until_ms,
            }) => {
                let Some(zone) = self.zones.borrow().get(&key).cloned() else {
                    return;
                };
                dom::set_style(&zone, "transform", &format!("translate({dx:.1}px, {dy:.1}px)"));
                dom::toggle_class(&zone, "glitch-zone--decoy", true);
                self.restore_later(("nudge", key), decoy_until_ms, move || {
                    dom::clear_style(&zone, "transform");
                    dom::toggle_class(&zone, "glitch-zone--decoy", false);
                });
            }
            EngineEffect::Zone(ZoneEffect::DeferTap {
                redispatch_at_ms, ..
            }) => {
                if let Some(tapped) = dom::event_element(event) {
                    self.held_taps.borrow_mut().insert(key, tapped);
                }
                let zone = host.clone();
                dom::toggle_class(&zone, "glitch-zone--processing", true);
                let weak = Rc::downgrade(self);
                self.restore_later(("tap", key), redispatch_at_ms, move || {
                    dom::toggle_class(&zone, "glitch-zone--processing", false);
                    if let Some(rt) = weak.upgrade() {
                        rt.redispatch_taps(redispatch_at_ms);
                    }
                });
            }
            EngineEffect::Cursor(cursor) => {
                if let Some(misclassify) = cursor.misclassify {
                    let el = host.clone();
                    dom::set_style(&el, "cursor", misclassify.persona.css());
                    self.restore_later(("persona", key), misclassify.until_ms, move || {
                        dom::clear_style(&el, "cursor");
                    });
                }
                if let Some(desync) = cursor.desync
                    && let Some(root) = dom::document().and_then(|doc| doc.document_element())
                {
                    dom::set_style(&root, "--glitch-cursor-dx", &format!("{:.1}px", desync.dx));
                    dom::set_style(&root, "--glitch-cursor-dy", &format!("{:.1}px", desync.dy));
                    dom::toggle_class(&root, "glitch-cursor-desync", true);
                    self.restore_later(("desync", PAGE), desync.until_ms, move || {
                        dom::toggle_class(&root, "glitch-cursor-desync", false);
                        dom::clear_style(&root, "--glitch-cursor-dx");
                        dom::clear_style(&root, "--glitch-cursor-dy");
                    });
                }
            }
            EngineEffect::Focus(FocusEffect::Redirect { .. }) => {
                let decoy = host
                    .query_selector(&format!("[{DECOY_ATTR}]"))
                    .ok()
                    .flatten()
                    .and_then(|decoy| decoy.dyn_into::<HtmlElement>().ok());
                if let Some(decoy) = decoy
                    && let Err(err) = decoy.focus()
                {
                    dom::console_error(&format!(
                        "Failed to move focus: {}",
                        dom::js_error_message(&err)
                    ));
                }
            }
            EngineEffect::Clipboard(ClipboardEffect::AppendArtifact { text }) => {
                if let Some(data) = event
                    .dyn_ref::<ClipboardEvent>()
                    .and_then(ClipboardEvent::clipboard_data)
                    && let Err(err) = data.set_data("text/plain", &text)
                {
                    dom::console_error(&format!(
                        "Failed to write clipboard: {}",
                        dom::js_error_message(&err)
                    ));
                }
            }
            EngineEffect::Clipboard(ClipboardEffect::RejectPaste) => {
                let field = host.clone();
                dom::toggle_class(&field, "glitch-field--rejected", true);
                self.restore_later(("paste", key), now_ms.saturating_add(REJECT_FLASH_MS), move || {
                    dom::toggle_class(&field, "glitch-field--rejected", false);
                });
            }
            EngineEffect::DragFriction(_) => dom::toggle_class(host, "glitch-range--sticky", true),
            EngineEffect::DragValue(value) => {
                if let Some(input) = host.dyn_ref::<HtmlInputElement>() {
                    input.set_value_as_number(value);
                }
            }
            EngineEffect::SnapBack(snap) => {
                let Some(input) = host.dyn_ref::<HtmlInputElement>().cloned() else {
                    return;
                };
                self.restore_later(("snap", key), snap.at_ms, move || {
                    input.set_value_as_number(snap.to_value);
                });
            }
            EngineEffect::Chrome(ChromeEffect::Toast {
                message,
                dismiss_at_ms,
            }) => self.show_toast(&message, dismiss_at_ms),
        }
    }

    fn redispatch_taps(&self, at_ms: u64) {
        let due = self
            .engine
            .borrow_mut()
            .take_due_taps(at_ms.max(dom::now_ms()));
        for zone in due {
            let tapped = self.held_taps.borrow_mut().remove(&zone);
            let host = self.zones.borrow().get(&zone).cloned();
            let Some(host) = host else {
                continue;
            };
            if let Some(el) = dom::tap_target(tapped.as_ref(), &host) {
                el.click();
            }
        }
    }

    fn show_toast(self: &Rc<Self>, message: &str, dismiss_at_ms: u64) {
        let Some(doc) = dom::document() else {
            return;
        };
        let Some(body) = doc.body() else {
            return;
        };
        let toast = match doc.create_element("div") {
            Ok(toast) => toast,
            Err(err) => {
                dom::console_error(&format!(
                    "Failed to create toast: {}",
                    dom::js_error_message(&err)
                ));
                return;
            }
        };
        toast.set_class_name("glitch-toast");
        let _ = toast.set_attribute("role", "status");
        toast.set_text_content(Some(message));
        if body.append_child(&toast).is_err() {
            return;
        }
        let key = TargetKey::from_label(message);
        self.restore_later(("toast", key), dismiss_at_ms, move || toast.remove());
    }

    fn restore_later(&self, key: RestoreKey, at_ms: u64, undo: impl FnOnce() + 'static) {
        self.restores
            .borrow_mut()
            .entry(key)
            .or_default()
            .schedule_at(at_ms, undo);
    }
}

/// Adapt a runtime method into a listener closure that holds only a weak reference.
fn bind(
    weak: &Weak<HostileRuntime>,
    handler: impl Fn(&Rc<HostileRuntime>, &Event) -> Result<(), JsValue> + 'static,
) -> impl FnMut(&Event) -> Result<(), JsValue> + 'static {
    let weak = Weak::clone(weak);
    move |event: &Event| weak.upgrade().map_or(Ok(()), |rt| handler(&rt, event))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catastrophic_tour_effects_hold_longest() {
        let lockout = tour_class(TourEffect::Lockout).map(|(_, ms)| ms);
        let shake = tour_class(TourEffect::Shake).map(|(_, ms)| ms);
        assert!(lockout > shake);
        assert_eq!(tour_class(TourEffect::Toast), None);
        for effect in [
            TourEffect::Shake,
            TourEffect::Glitch,
            TourEffect::Regress,
            TourEffect::Lockout,
            TourEffect::Freeze,
        ] {
            let (class, ms) = tour_class(effect).expect("visual effect");
            assert!(class.starts_with("glitch-"));
            assert!(ms > 0);
        }
    }

    #[test]
    fn clicks_map_to_validate_and_transition_triggers() {
        assert_eq!(click_trigger("a", None, true, false), Some(TourTrigger::BeforeTransition));
        assert_eq!(click_trigger("A", None, false, false), None);
        assert_eq!(click_trigger("BUTTON", None, false, true), Some(TourTrigger::BeforeValidate));
        assert_eq!(click_trigger("BUTTON", Some("SUBMIT"), false, true), Some(TourTrigger::BeforeValidate));
        assert_eq!(click_trigger("BUTTON", Some("button"), false, true), None);
        assert_eq!(click_trigger("BUTTON", None, false, false), None);
        assert_eq!(click_trigger("INPUT", Some("submit"), false, true), Some(TourTrigger::BeforeValidate));
        assert_eq!(click_trigger("INPUT", Some("text"), false, true), None);
        assert_eq!(click_trigger("DIV", None, false, true), None);
    }

    #[test]
    fn forgetting_a_target_drops_its_restores() {
        let button = TargetKey::from_label("newsletter-signup");
        let other = TargetKey::from_label("gallery-next");
        let mut restores: HashMap<RestoreKey, u8> = HashMap::new();
        restores.insert(("persona", button), 1);
        restores.insert(("tap", button), 2);
        restores.insert(("persona", other), 3);
        restores.insert(("desync", PAGE), 4);
        evict_restores(&mut restores, button);
        assert_eq!(restores.len(), 2);
        assert!(restores.contains_key(&("persona", other)));
        assert!(restores.contains_key(&("desync", PAGE)));
    }

    #[test]
    fn phase_attribute_parses_levels() {
        assert_eq!(parse_phase(Some("3")), Phase::Three);
        assert_eq!(parse_phase(Some(" 2 ")), Phase::Two);
        assert_eq!(parse_phase(Some("9")), Phase::One);
        assert_eq!(parse_phase(Some("hostile")), Phase::One);
        assert_eq!(parse_phase(None), Phase::One);
    }
}
