//! Bridge between the in-process [`SignalBus`] and page `CustomEvent`s.
//!
//! Core signals are mirrored onto `window` so other page collaborators can
//! react to them. Scene locks and entry confirmation coming from the page are
//! parsed back into the bus.
use glitchgate_core::{SessionState, SharedSession, Signal, SignalBus, track_session};
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{CustomEvent, CustomEventInit, Event};

use crate::dom;
use crate::listeners::{EventListener, ListenerSet};

thread_local! {
    static BUS: RefCell<SignalBus> = RefCell::new(SignalBus::new());
    static SESSION: SharedSession = Rc::new(RefCell::new(SessionState::default()));
}

/// Inbound event types parsed back into the bus.
pub const INBOUND: [&str; 3] = ["entry-confirmed", "audio-scene-lock", "audio-scene-release"];

/// Run `f` against the page-wide bus. Listeners must not publish synchronously.
pub fn with_bus<T>(f: impl FnOnce(&mut SignalBus) -> T) -> T {
    BUS.with(|bus| f(&mut bus.borrow_mut()))
}

#[must_use]
pub fn session() -> SharedSession {
    SESSION.with(Rc::clone)
}

/// Emit on the bus and mirror to the page. Returns whether the signal was delivered.
pub fn publish(signal: &Signal) -> bool {
    let delivered = with_bus(|bus| bus.emit(signal));
    if delivered && let Err(err) = dispatch(signal) {
        dom::console_error(&format!(
            "Failed to dispatch {signal}: {}",
            dom::js_error_message(&err)
        ));
    }
    delivered
}

/// Fire `signal` as a `CustomEvent` on `window`, with the signal as its detail.
///
/// # Errors
/// Returns an error if the window is unavailable or the event cannot be built.
pub fn dispatch(signal: &Signal) -> Result<bool, JsValue> {
    let win = dom::window().ok_or_else(|| JsValue::from_str("window unavailable"))?;
    let detail = serde_wasm_bindgen::to_value(signal)?;
    let init = CustomEventInit::new();
    init.set_detail(&detail);
    let event = CustomEvent::new_with_event_init_dict(signal.dom_name(), &init)?;
    win.dispatch_event(&event)
}

/// Read a page event back into a signal. Scene events need a `detail.scene` string.
#[must_use]
pub fn parse(event: &Event) -> Option<Signal> {
    let scene = event
        .dyn_ref::<CustomEvent>()
        .map(CustomEvent::detail)
        .filter(|detail| detail.is_object())
        .and_then(|detail| js_sys::Reflect::get(&detail, &JsValue::from_str("scene")).ok())
        .and_then(|scene| scene.as_string());
    Signal::from_dom(&event.type_(), scene.as_deref())
}

/// Installed bridge; dropping it detaches the inbound listeners.
pub struct SignalBridge {
    _listeners: ListenerSet,
}

/// Track session flags and start listening for inbound page events.
#[must_use]
pub fn install() -> SignalBridge {
    let session = session();
    with_bus(|bus| track_session(bus, &session));

    let mut listeners = ListenerSet::default();
    if let Some(win) = dom::window() {
        for kind in INBOUND {
            listeners.keep(EventListener::bubble(&win, kind, |event| {
                if let Some(signal) = parse(event) {
                    let delivered = with_bus(|bus| bus.emit(&signal));
                    log::debug!("inbound {signal} delivered={delivered}");
                }
                Ok(())
            }));
        }
    }
    SignalBridge {
        _listeners: listeners,
    }
}
