//! Clipboard corruption on designated fields.
use rand::Rng;
use rand::seq::SliceRandom;

use super::{TargetKey, TrapContext, TrapDecision};
use crate::config::ClipboardConfig;
use crate::fairness::{Eligibility, FailLedger, roll};
use crate::incident::{Incident, Severity, Surface};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipboardAction<'a> {
    Copy { field: TargetKey, text: &'a str },
    Paste { field: TargetKey },
}

impl ClipboardAction<'_> {
    #[must_use]
    pub const fn field(&self) -> TargetKey {
        match self {
            Self::Copy { field, .. } | Self::Paste { field } => *field,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipboardEffect {
    /// Replace the clipboard payload with the original text plus a suffix.
    AppendArtifact { text: String },
    RejectPaste,
}

#[derive(Debug, Clone)]
pub struct ClipboardTrap {
    cfg: ClipboardConfig,
    ledger: FailLedger<TargetKey>,
}

impl ClipboardTrap {
    #[must_use]
    pub fn new(cfg: ClipboardConfig) -> Self {
        let ledger = FailLedger::new(cfg.field_disable_after_repeats, cfg.field_disable_ms);
        Self { cfg, ledger }
    }

    pub fn decide<R: Rng + ?Sized>(
        &mut self,
        ctx: &TrapContext,
        action: &ClipboardAction<'_>,
        rng: &mut R,
    ) -> TrapDecision<ClipboardEffect> {
        let now = ctx.now_ms;
        let field = action.field();
        if let Eligibility::Suppressed { .. } = self.ledger.check(&field, now) {
            return TrapDecision::Pass;
        }

        let (effect, incident) = match action {
            ClipboardAction::Copy { text, .. } => {
                if text.is_empty()
                    || !roll(rng, ctx.probability(&self.cfg.copy_corrupt_probability))
                {
                    return TrapDecision::Pass;
                }
                let suffixes: Vec<&String> = self
                    .cfg
                    .artifact_suffixes
                    .iter()
                    .filter(|s| !s.is_empty())
                    .collect();
                let Some(suffix) = suffixes.choose(rng) else {
                    return TrapDecision::Pass;
                };
                (
                    ClipboardEffect::AppendArtifact {
                        text: format!("{text}{suffix}"),
                    },
                    Incident::new(Surface::Clipboard, now, "copied text annotated")
                        .tagged("copy-artifact"),
                )
            }
            ClipboardAction::Paste { .. } => {
                if !roll(rng, ctx.probability(&self.cfg.paste_reject_probability)) {
                    return TrapDecision::Pass;
                }
                (
                    ClipboardEffect::RejectPaste,
                    Incident::new(Surface::Clipboard, now, "paste rejected").tagged("paste-reject"),
                )
            }
        };

        let incident = match self.ledger.record_failure(&field, now) {
            Some(until) => {
                log::debug!("clipboard trap disabled for field {field} until {until}");
                incident
                    .tagged("field-disabled")
                    .with_severity(Severity::Warning)
            }
            None => incident,
        };
        TrapDecision::Activate { effect, incident }
    }

    pub fn is_disabled(&mut self, field: TargetKey, now_ms: u64) -> bool {
        !self.ledger.check(&field, now_ms).is_eligible()
    }

    #[must_use]
    pub fn repeats(&self, field: TargetKey) -> u32 {
        self.ledger.count(&field)
    }

    pub fn evict(&mut self, field: TargetKey) {
        self.ledger.evict(&field);
    }
}
