//! Simulated browser chrome that answers with denial toasts.
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{TrapContext, TrapDecision};
use crate::config::ChromeConfig;
use crate::fairness::{CooldownWindow, roll};
use crate::incident::{Incident, Surface};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChromeButton {
    Back,
    Refresh,
    Warning,
}

impl ChromeButton {
    pub const ALL: [Self; 3] = [Self::Back, Self::Refresh, Self::Warning];

    #[must_use]
    pub fn from_dom(name: &str) -> Option<Self> {
        match name {
            "back" => Some(Self::Back),
            "refresh" | "reload" => Some(Self::Refresh),
            "warning" => Some(Self::Warning),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChromeEffect {
    Toast { message: String, dismiss_at_ms: u64 },
}

#[derive(Debug, Clone)]
pub struct ChromeTrap {
    cfg: ChromeConfig,
    cooldowns: HashMap<ChromeButton, CooldownWindow>,
}

impl ChromeTrap {
    #[must_use]
    pub fn new(cfg: ChromeConfig) -> Self {
        Self {
            cfg,
            cooldowns: HashMap::new(),
        }
    }

    pub fn press<R: Rng + ?Sized>(
        &mut self,
        ctx: &TrapContext,
        button: ChromeButton,
        rng: &mut R,
    ) -> TrapDecision<ChromeEffect> {
        let now = ctx.now_ms;
        let cooldown_ms = self.cfg.cooldown_ms;
        let window = self
            .cooldowns
            .entry(button)
            .or_insert_with(|| CooldownWindow::new(cooldown_ms));
        if !window.ready(now) {
            return TrapDecision::Pass;
        }
        if !roll(rng, ctx.probability(&self.cfg.toast_probability)) {
            return TrapDecision::Pass;
        }
        let pool = match button {
            ChromeButton::Back => &self.cfg.messages.back,
            ChromeButton::Refresh => &self.cfg.messages.refresh,
            ChromeButton::Warning => &self.cfg.messages.warning,
        };
        let Some(message) = pool.choose(rng) else {
            return TrapDecision::Pass;
        };
        window.fire(now);
        TrapDecision::Activate {
            effect: ChromeEffect::Toast {
                message: message.clone(),
                dismiss_at_ms: now.saturating_add(self.cfg.toast_ms),
            },
            incident: Incident::new(Surface::Chrome, now, format!("{button:?} denied"))
                .tagged("toast"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChromeMessages;
    use crate::phase::Phase;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn phase_three_always_toasts_then_cools_down() {
        let cfg = ChromeConfig::default();
        let cooldown = cfg.cooldown_ms;
        let mut trap = ChromeTrap::new(cfg);
        let mut rng = SmallRng::seed_from_u64(5);
        let ctx = TrapContext::new(Phase::Three, 100);
        let Some((ChromeEffect::Toast { dismiss_at_ms, .. }, _)) =
            trap.press(&ctx, ChromeButton::Back, &mut rng).into_parts()
        else {
            panic!("expected toast");
        };
        assert_eq!(dismiss_at_ms, 100 + ChromeConfig::default().toast_ms);
        assert!(!trap.press(&ctx.at(101), ChromeButton::Back, &mut rng).is_active());
        assert!(trap.press(&ctx.at(101), ChromeButton::Refresh, &mut rng).is_active());
        assert!(trap.press(&ctx.at(100 + cooldown), ChromeButton::Back, &mut rng).is_active());
    }

    #[test]
    fn empty_message_pool_passes() {
        let cfg = ChromeConfig {
            messages: ChromeMessages {
                warning: Vec::new(),
                ..ChromeMessages::default()
            },
            ..ChromeConfig::default()
        };
        let mut trap = ChromeTrap::new(cfg);
        let mut rng = SmallRng::seed_from_u64(6);
        let ctx = TrapContext::new(Phase::Three, 0);
        assert!(!trap.press(&ctx, ChromeButton::Warning, &mut rng).is_active());
        assert_eq!(ChromeButton::from_dom("reload"), Some(ChromeButton::Refresh));
        assert_eq!(ChromeButton::from_dom("forward"), None);
    }
}
