use glitchgate_core::TargetKey;
use glitchgate_core::traps::TargetKind;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{Document, Element, Event, HtmlElement, HtmlInputElement, Node, Window};

/// Logical id of a control whose cursor may lie.
pub const TARGET_ATTR: &str = "data-glitch-id";
/// Region covered by the targeted zone trap.
pub const ZONE_ATTR: &str = "data-glitch-zone";
/// Container whose confirm key may be redirected.
pub const FOCUS_ATTR: &str = "data-glitch-focus";
/// Element inside a focus container that receives redirected focus.
pub const DECOY_ATTR: &str = "data-glitch-decoy";
/// Form field subject to clipboard corruption.
pub const FIELD_ATTR: &str = "data-glitch-field";
/// Fake browser chrome button (`back`, `refresh`, `warning`).
pub const CHROME_ATTR: &str = "data-glitch-chrome";

#[must_use]
pub fn window() -> Option<Window> {
    web_sys::window()
}

#[must_use]
pub fn document() -> Option<Document> {
    window().and_then(|win| win.document())
}

/// Milliseconds since navigation start, from `performance.now()`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn now_ms() -> u64 {
    window()
        .and_then(|win| win.performance())
        .map(|perf| perf.now())
        .filter(|now| now.is_finite() && *now > 0.0)
        .map_or(0, |now| now as u64)
}

/// Fresh session seed; the browser has no better entropy source we can reach synchronously.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn session_seed() -> u64 {
    let hi = (js_sys::Math::random() * f64::from(u32::MAX)) as u64;
    let lo = (js_sys::Math::random() * f64::from(u32::MAX)) as u64;
    (hi << 32) ^ lo
}

/// Convert a JavaScript value into a readable string for error reporting.
#[must_use]
pub fn js_error_message(value: &JsValue) -> String {
    value
        .as_string()
        .or_else(|| {
            value
                .dyn_ref::<js_sys::Error>()
                .map(|err| err.message().into())
        })
        .unwrap_or_else(|| format!("{value:?}"))
}

pub fn console_error(message: &str) {
    web_sys::console::error_1(&JsValue::from(message));
}

/// Element the event was dispatched to.
#[must_use]
pub fn event_element(event: &Event) -> Option<Element> {
    event.target().and_then(|target| target.dyn_into::<Element>().ok())
}

/// Closest ancestor (or self) carrying `attr`, with its hashed value.
#[must_use]
pub fn keyed_ancestor(el: &Element, attr: &str) -> Option<(Element, TargetKey)> {
    let host = el.closest(&format!("[{attr}]")).ok().flatten()?;
    let label = host.get_attribute(attr)?;
    let label = label.trim();
    if label.is_empty() {
        return None;
    }
    let key = TargetKey::from_label(label);
    Some((host, key))
}

/// Element a held tap is replayed on: the control that was tapped while it
/// is still attached inside the zone, otherwise the zone host.
#[must_use]
pub fn tap_target(tapped: Option<&Element>, zone: &Element) -> Option<HtmlElement> {
    let inside = tapped.filter(|el| {
        let node: &Node = el;
        node.is_connected() && zone.contains(Some(node))
    });
    inside.unwrap_or(zone).dyn_ref::<HtmlElement>().cloned()
}

/// Honest classification of an element, before any trap lies about it.
#[must_use]
pub fn classify(el: &Element) -> TargetKind {
    let input_type = el
        .dyn_ref::<HtmlInputElement>()
        .map(HtmlInputElement::type_);
    let role = el.get_attribute("role");
    classify_tag(&el.tag_name(), input_type.as_deref(), role.as_deref())
}

/// Tag-level classification, split out so it can run off the browser.
#[must_use]
pub fn classify_tag(tag: &str, input_type: Option<&str>, role: Option<&str>) -> TargetKind {
    match (tag.to_ascii_uppercase().as_str(), input_type, role) {
        (_, _, Some("button")) | ("BUTTON", _, _) => TargetKind::Button,
        (_, _, Some("link")) | ("A", _, _) => TargetKind::Link,
        ("INPUT", Some("range"), _) => TargetKind::Range,
        ("INPUT", Some("button" | "submit" | "reset"), _) => TargetKind::Button,
        ("INPUT" | "TEXTAREA", _, _) => TargetKind::TextField,
        ("P" | "SPAN" | "H1" | "H2" | "H3" | "H4" | "LI" | "LABEL", _, _) => TargetKind::Text,
        _ => TargetKind::Plain,
    }
}

/// Set an inline style property, reporting failures to the console.
pub fn set_style(el: &Element, property: &str, value: &str) {
    let Some(el) = el.dyn_ref::<HtmlElement>() else {
        return;
    };
    if let Err(err) = el.style().set_property(property, value) {
        console_error(&format!(
            "Failed to set {property}: {}",
            js_error_message(&err)
        ));
    }
}

pub fn clear_style(el: &Element, property: &str) {
    if let Some(el) = el.dyn_ref::<HtmlElement>() {
        let _ = el.style().remove_property(property);
    }
}

pub fn toggle_class(el: &Element, class: &str, on: bool) {
    let _ = el.class_list().toggle_with_force(class, on);
}

/// Slice of `value` between two UTF-16 selection offsets.
#[must_use]
pub fn selected_text(value: &str, start: Option<u32>, end: Option<u32>) -> String {
    let (Some(start), Some(end)) = (start, end) else {
        return String::new();
    };
    if end <= start {
        return String::new();
    }
    let units: Vec<u16> = value.encode_utf16().collect();
    let start = usize::try_from(start).unwrap_or(usize::MAX).min(units.len());
    let end = usize::try_from(end).unwrap_or(usize::MAX).min(units.len());
    String::from_utf16_lossy(&units[start..end])
}
