//! Browser timers that clear themselves when dropped.
//!
//! Every timer a trap or the gate starts lives in one of these handles, so
//! tearing the owner down also stops its callbacks.
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

use crate::dom;

fn delay_arg(delay_ms: u64) -> i32 {
    i32::try_from(delay_ms).unwrap_or(i32::MAX)
}

/// A pending `setTimeout`; dropping it clears the timer.
pub struct Timeout {
    id: i32,
    _closure: Closure<dyn FnMut()>,
}

impl Timeout {
    /// Run `callback` once after `delay_ms`.
    ///
    /// # Errors
    /// Returns an error if no window is available or the browser refuses the timer.
    pub fn new(delay_ms: u64, callback: impl FnOnce() + 'static) -> Result<Self, JsValue> {
        let win = dom::window().ok_or_else(|| JsValue::from_str("window unavailable"))?;
        let mut callback = Some(callback);
        let closure = Closure::wrap(Box::new(move || {
            if let Some(callback) = callback.take() {
                callback();
            }
        }) as Box<dyn FnMut()>);
        let id = win.set_timeout_with_callback_and_timeout_and_arguments_0(
            closure.as_ref().unchecked_ref(),
            delay_arg(delay_ms),
        )?;
        Ok(Self {
            id,
            _closure: closure,
        })
    }

    /// Stop the timer without freeing the callback.
    pub fn cancel(&self) {
        if let Some(win) = dom::window() {
            win.clear_timeout_with_handle(self.id);
        }
    }
}

impl Drop for Timeout {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// A running `setInterval`; dropping it clears the interval.
pub struct Interval {
    id: i32,
    _closure: Closure<dyn FnMut()>,
}

impl Interval {
    /// # Errors
    /// Returns an error if no window is available or the browser refuses the timer.
    pub fn new(period_ms: u64, callback: impl FnMut() + 'static) -> Result<Self, JsValue> {
        let win = dom::window().ok_or_else(|| JsValue::from_str("window unavailable"))?;
        let closure = Closure::wrap(Box::new(callback) as Box<dyn FnMut()>);
        let id = win.set_interval_with_callback_and_timeout_and_arguments_0(
            closure.as_ref().unchecked_ref(),
            delay_arg(period_ms),
        )?;
        Ok(Self {
            id,
            _closure: closure,
        })
    }

    pub fn cancel(&self) {
        if let Some(win) = dom::window() {
            win.clear_interval_with_handle(self.id);
        }
    }
}

impl Drop for Interval {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Holds at most one pending timeout for a deadline-driven owner.
///
/// Replacing the timeout from inside its own callback keeps the firing
/// closure alive until the next replacement.
#[derive(Default)]
pub struct TimerSlot {
    pending: Option<Timeout>,
    retired: Option<Timeout>,
}

impl TimerSlot {
    pub fn set(&mut self, timeout: Timeout) {
        if let Some(old) = self.pending.replace(timeout) {
            old.cancel();
            self.retired = Some(old);
        }
    }

    pub fn clear(&mut self) {
        if let Some(old) = self.pending.take() {
            old.cancel();
            self.retired = Some(old);
        }
    }

    /// Schedule `callback` at an absolute `performance.now()` deadline.
    pub fn schedule_at(&mut self, at_ms: u64, callback: impl FnOnce() + 'static) {
        let delay = at_ms.saturating_sub(dom::now_ms());
        match Timeout::new(delay, callback) {
            Ok(timeout) => self.set(timeout),
            Err(err) => dom::console_error(&format!(
                "Failed to schedule timer: {}",
                dom::js_error_message(&err)
            )),
        }
    }

    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}
