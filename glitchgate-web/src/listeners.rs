//! Event listeners bound to a target for as long as the handle lives.
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{AddEventListenerOptions, Event, EventTarget};

use crate::dom;

/// An `addEventListener` registration removed on drop.
///
/// Handler errors are logged and swallowed; a failing trap must never
/// break the page's own handlers.
pub struct EventListener {
    target: EventTarget,
    kind: &'static str,
    capture: bool,
    callback: Closure<dyn FnMut(Event)>,
}

impl EventListener {
    /// Listen in the capture phase, ahead of page handlers.
    ///
    /// # Errors
    /// Returns an error if the browser rejects the registration.
    pub fn capture(
        target: &EventTarget,
        kind: &'static str,
        handler: impl FnMut(&Event) -> Result<(), JsValue> + 'static,
    ) -> Result<Self, JsValue> {
        Self::register(target, kind, true, handler)
    }

    /// # Errors
    /// Returns an error if the browser rejects the registration.
    pub fn bubble(
        target: &EventTarget,
        kind: &'static str,
        handler: impl FnMut(&Event) -> Result<(), JsValue> + 'static,
    ) -> Result<Self, JsValue> {
        Self::register(target, kind, false, handler)
    }

    fn register(
        target: &EventTarget,
        kind: &'static str,
        capture: bool,
        mut handler: impl FnMut(&Event) -> Result<(), JsValue> + 'static,
    ) -> Result<Self, JsValue> {
        let callback = Closure::wrap(Box::new(move |event: Event| {
            if let Err(err) = handler(&event) {
                let message = dom::js_error_message(&err);
                log::warn!("{kind} handler failed: {message}");
                dom::console_error(&format!("glitchgate {kind} handler failed: {message}"));
            }
        }) as Box<dyn FnMut(Event)>);

        let options = AddEventListenerOptions::new();
        options.set_capture(capture);
        options.set_passive(false);
        target.add_event_listener_with_callback_and_add_event_listener_options(
            kind,
            callback.as_ref().unchecked_ref(),
            &options,
        )?;
        Ok(Self {
            target: target.clone(),
            kind,
            capture,
            callback,
        })
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        self.kind
    }
}

impl Drop for EventListener {
    fn drop(&mut self) {
        let _ = self.target.remove_event_listener_with_callback_and_bool(
            self.kind,
            self.callback.as_ref().unchecked_ref(),
            self.capture,
        );
    }
}

/// Listeners installed together and removed together.
#[derive(Default)]
pub struct ListenerSet {
    listeners: Vec<EventListener>,
}

impl ListenerSet {
    /// Keep a registration, or log why it could not be made.
    pub fn keep(&mut self, registration: Result<EventListener, JsValue>) {
        match registration {
            Ok(listener) => self.listeners.push(listener),
            Err(err) => dom::console_error(&format!(
                "Failed to register listener: {}",
                dom::js_error_message(&err)
            )),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }
}
