#![forbid(unsafe_code)]
//! Browser glue for glitchgate: capturing listeners, the loading gate overlay,
//! the `<audio>` driver and the page signal bridge.
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

pub mod audio;
pub mod dom;
pub mod gate;
pub mod hostile;
pub mod listeners;
pub mod signals;
pub mod timers;

/// Element the gate overlay is mounted into; created when missing.
pub const GATE_ROOT_ID: &str = "glitch-gate-root";

#[cfg(target_arch = "wasm32")]
thread_local! {
    static RUNTIME: std::cell::RefCell<Option<Runtime>> = const { std::cell::RefCell::new(None) };
}

/// Everything installed on the page for one session.
#[cfg(target_arch = "wasm32")]
struct Runtime {
    hostile: std::rc::Rc<hostile::HostileRuntime>,
    _signals: signals::SignalBridge,
}

#[cfg(target_arch = "wasm32")]
fn gate_root(doc: &web_sys::Document) -> Result<web_sys::Element, JsValue> {
    if let Some(root) = doc.get_element_by_id(GATE_ROOT_ID) {
        return Ok(root);
    }
    let root = doc.create_element("div")?;
    root.set_id(GATE_ROOT_ID);
    doc.body()
        .ok_or_else(|| JsValue::from_str("document body missing"))?
        .append_child(&root)?;
    Ok(root)
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn start() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();

    let config = glitchgate_core::EngineConfig::load_from_static().unwrap_or_else(|err| {
        dom::console_error(&format!("glitchgate config rejected, using defaults: {err}"));
        glitchgate_core::EngineConfig::default()
    });
    let seed = dom::session_seed();
    let bridge = signals::install();
    let hostile = hostile::HostileRuntime::install(&config, seed);
    RUNTIME.with(|slot| {
        *slot.borrow_mut() = Some(Runtime {
            hostile,
            _signals: bridge,
        });
    });

    let Some(doc) = dom::document() else {
        dom::console_error("glitchgate: document unavailable, gate not mounted");
        return;
    };
    match gate_root(&doc) {
        Ok(root) => {
            let props = gate::GlitchGateProps {
                gate: config.gate.clone(),
                entry: config.entry.clone(),
                audio: config.audio.clone(),
                music: config.music.clone(),
                seed: seed.rotate_left(17),
            };
            yew::Renderer::<gate::GlitchGate>::with_root_and_props(root, props).render();
        }
        Err(err) => dom::console_error(&format!(
            "glitchgate: failed to mount gate: {}",
            dom::js_error_message(&err)
        )),
    }
}

#[cfg(target_arch = "wasm32")]
fn with_hostile(f: impl FnOnce(&hostile::HostileRuntime)) {
    RUNTIME.with(|slot| {
        if let Some(runtime) = slot.borrow().as_ref() {
            f(&runtime.hostile);
        }
    });
}

/// Set the hostility phase (1-3); out-of-range levels are ignored.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(js_name = glitchSetPhase)]
pub fn set_phase(level: u8) {
    if let Some(phase) = glitchgate_core::Phase::from_level(level) {
        with_hostile(|rt| rt.set_phase(phase));
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(js_name = glitchSetPity)]
pub fn set_pity(pity: bool) {
    with_hostile(|rt| rt.set_pity(pity));
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(js_name = glitchSetMaxHostility)]
pub fn set_max_hostility(max_hostility: bool) {
    with_hostile(|rt| rt.set_max_hostility(max_hostility));
}

/// Drop all state for a `data-glitch-*` label that left the page.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(js_name = glitchForget)]
pub fn forget(label: &str) {
    with_hostile(|rt| rt.forget(label));
}

/// Recent incidents as plain objects, newest last.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(js_name = glitchIncidents)]
pub fn incidents() -> JsValue {
    let mut out = JsValue::NULL;
    with_hostile(|rt| {
        let incidents: Vec<glitchgate_core::Incident> =
            rt.with_engine(|engine| engine.incidents().iter().cloned().collect());
        match serde_wasm_bindgen::to_value(&incidents) {
            Ok(value) => out = value,
            Err(err) => dom::console_error(&format!("glitchgate: incidents unavailable: {err}")),
        }
    });
    out
}
