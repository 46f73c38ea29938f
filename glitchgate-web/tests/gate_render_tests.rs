use futures::executor::block_on;
use glitchgate_core::EngineConfig;
use glitchgate_web::gate::{
    FailsafeCard, FailsafeCardProps, GateCard, GateCardProps, GlitchGate, GlitchGateProps,
};
use yew::{AttrValue, Callback, LocalServerRenderer, NodeRef};

fn card_props(entered: bool, percent: f64, fading: bool) -> GateCardProps {
    GateCardProps {
        label: AttrValue::from("Enter the exhibit"),
        percent,
        fading,
        entered,
        on_enter: Callback::noop(),
        node_ref: NodeRef::default(),
    }
}

#[test]
fn gate_card_prompts_for_entry_first() {
    let html = block_on(LocalServerRenderer::<GateCard>::with_props(card_props(false, 0.0, false)).render());
    assert!(html.contains("glitch-gate__enter"));
    assert!(html.contains("Enter the exhibit"));
    assert!(!html.contains("progressbar"));
    assert!(html.contains("aria-modal=\"true\""));
}

#[test]
fn gate_card_shows_clamped_progress_after_entry() {
    let html = block_on(LocalServerRenderer::<GateCard>::with_props(card_props(true, 63.4, false)).render());
    assert!(html.contains("role=\"progressbar\""));
    assert!(html.contains("aria-valuenow=\"63\""));
    assert!(html.contains("width: 63.4%"));
    assert!(!html.contains("glitch-gate__enter"));

    let html = block_on(LocalServerRenderer::<GateCard>::with_props(card_props(true, 140.0, false)).render());
    assert!(html.contains("aria-valuenow=\"100\""));
}

#[test]
fn fading_gate_carries_fade_class() {
    let html = block_on(LocalServerRenderer::<GateCard>::with_props(card_props(true, 99.0, true)).render());
    assert!(html.contains("glitch-gate--fading"));
}

#[test]
fn failsafe_card_offers_entry_without_effects() {
    let props = FailsafeCardProps {
        label: AttrValue::from("Enter anyway"),
        entered: false,
        on_enter: Callback::noop(),
    };
    let html = block_on(LocalServerRenderer::<FailsafeCard>::with_props(props).render());
    assert!(html.contains("glitch-gate-failsafe"));
    assert!(html.contains("Enter anyway"));
    assert!(!html.contains("glitch-gate__card"));
}

#[test]
fn glitch_gate_renders_entry_prompt_before_arming() {
    let config = EngineConfig::default();
    let props = GlitchGateProps {
        gate: config.gate.clone(),
        entry: config.entry.clone(),
        audio: config.audio.clone(),
        music: config.music.clone(),
        seed: 7,
    };
    let html = block_on(LocalServerRenderer::<GlitchGate>::with_props(props).render());
    assert!(html.contains(&config.entry.label));
    assert!(html.contains("glitch-gate__enter"));
}
