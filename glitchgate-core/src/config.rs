//! Engine configuration.
//!
//! Every recognised option lives here and the whole tree is handed to the
//! engine once at startup. Call sites never carry their own fallbacks.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::phase::{MsRange, PhaseTable, Span};
use crate::scheduler::{TourEvent, builtin_catalog};

const STATIC_ENGINE_JSON: &str = include_str!("../assets/engine.json");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse engine config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{field} must be within [0, 1] (got {value})")]
    ProbabilityOutOfRange { field: String, value: f64 },
    #[error("{field} has min greater than max")]
    InvertedRange { field: String },
    #[error("{field} must be at least 1")]
    ZeroThreshold { field: String },
    #[error("{field} must not be empty")]
    Empty { field: String },
    #[error("gate timings are inconsistent: {0}")]
    GateTimings(String),
}

/// Cursor identity and desync controller options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CursorConfig {
    pub activation_probability: PhaseTable<f64>,
    pub desync_probability: PhaseTable<f64>,
    /// How long a misclassified persona may persist.
    pub drift_ms: PhaseTable<MsRange>,
    pub desync_ms: PhaseTable<MsRange>,
    pub desync_offset_px: PhaseTable<Span>,
    pub fail_disable_threshold: u32,
    pub struggle_cooldown_ms: u64,
    pub global_relax_after_fails: u32,
    pub global_relax_ms: u64,
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self {
            activation_probability: PhaseTable::new(0.12, 0.22, 0.35),
            desync_probability: PhaseTable::new(0.04, 0.08, 0.15),
            drift_ms: PhaseTable::new(
                MsRange::new(400, 900),
                MsRange::new(600, 1_400),
                MsRange::new(900, 2_200),
            ),
            desync_ms: PhaseTable::new(
                MsRange::new(150, 350),
                MsRange::new(250, 600),
                MsRange::new(400, 900),
            ),
            desync_offset_px: PhaseTable::new(
                Span::new(4.0, 10.0),
                Span::new(8.0, 18.0),
                Span::new(12.0, 28.0),
            ),
            fail_disable_threshold: 3,
            struggle_cooldown_ms: 8_000,
            global_relax_after_fails: 5,
            global_relax_ms: 8_000,
        }
    }
}

/// Targeted trap-zone options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneConfig {
    pub activation_probability: PhaseTable<f64>,
    pub nudge_px: PhaseTable<Span>,
    pub lag_ms: PhaseTable<MsRange>,
    pub tap_delay_ms: PhaseTable<MsRange>,
    pub min_motion_px: f64,
    pub fail_disable_threshold: u32,
    pub struggle_cooldown_ms: u64,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            activation_probability: PhaseTable::new(0.2, 0.35, 0.5),
            nudge_px: PhaseTable::new(
                Span::new(6.0, 14.0),
                Span::new(10.0, 24.0),
                Span::new(16.0, 36.0),
            ),
            lag_ms: PhaseTable::new(
                MsRange::new(120, 260),
                MsRange::new(180, 420),
                MsRange::new(260, 650),
            ),
            tap_delay_ms: PhaseTable::new(
                MsRange::new(250, 500),
                MsRange::new(400, 800),
                MsRange::new(600, 1_200),
            ),
            min_motion_px: 4.0,
            fail_disable_threshold: 3,
            struggle_cooldown_ms: 8_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FocusConfig {
    pub confirm_key: String,
    pub redirect_probability: PhaseTable<f64>,
    pub zone_cooldown_ms: PhaseTable<u64>,
    pub struggle_threshold: u32,
    pub struggle_pause_ms: u64,
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            confirm_key: String::from("Enter"),
            redirect_probability: PhaseTable::new(0.15, 0.3, 0.45),
            zone_cooldown_ms: PhaseTable::new(6_000, 4_000, 2_500),
            struggle_threshold: 3,
            struggle_pause_ms: 8_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipboardConfig {
    pub copy_corrupt_probability: PhaseTable<f64>,
    pub paste_reject_probability: PhaseTable<f64>,
    pub artifact_suffixes: Vec<String>,
    pub field_disable_after_repeats: u32,
    pub field_disable_ms: u64,
}

impl Default for ClipboardConfig {
    fn default() -> Self {
        Self {
            copy_corrupt_probability: PhaseTable::new(0.2, 0.35, 0.5),
            paste_reject_probability: PhaseTable::new(0.1, 0.25, 0.4),
            artifact_suffixes: vec![
                String::from(" [copied under protest]"),
                String::from(" (unverified)"),
                String::from(" \u{2042}"),
            ],
            field_disable_after_repeats: 3,
            field_disable_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DragConfig {
    /// Fraction of the pointer's delta that reaches the control.
    pub damping: PhaseTable<f64>,
    pub snap_back_probability: PhaseTable<f64>,
    pub snap_back_fraction: Span,
    pub snap_back_delay_ms: MsRange,
    pub relax_after_retries: u32,
}

impl Default for DragConfig {
    fn default() -> Self {
        Self {
            damping: PhaseTable::new(0.85, 0.65, 0.45),
            snap_back_probability: PhaseTable::new(0.15, 0.3, 0.45),
            snap_back_fraction: Span::new(0.2, 0.5),
            snap_back_delay_ms: MsRange::new(120, 260),
            relax_after_retries: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChromeMessages {
    pub back: Vec<String>,
    pub refresh: Vec<String>,
    pub warning: Vec<String>,
}

impl Default for ChromeMessages {
    fn default() -> Self {
        Self {
            back: vec![
                String::from("Going back is not supported on this journey."),
                String::from("History has been archived for your convenience."),
            ],
            refresh: vec![
                String::from("Refresh denied: the page is already as fresh as it gets."),
                String::from("Reloading would void your progress warranty."),
            ],
            warning: vec![
                String::from("This warning has been acknowledged on your behalf."),
                String::from("Security review scheduled for some time later."),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChromeConfig {
    pub toast_probability: PhaseTable<f64>,
    pub cooldown_ms: u64,
    pub toast_ms: u64,
    pub messages: ChromeMessages,
}

impl Default for ChromeConfig {
    fn default() -> Self {
        Self {
            toast_probability: PhaseTable::new(0.6, 0.8, 1.0),
            cooldown_ms: 2_500,
            toast_ms: 2_600,
            messages: ChromeMessages::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TourConfig {
    pub base_chance: PhaseTable<f64>,
    pub catastrophic_cooldown_ms: u64,
    pub catalog: Vec<TourEvent>,
}

impl Default for TourConfig {
    fn default() -> Self {
        Self {
            base_chance: PhaseTable::new(0.15, 0.3, 0.45),
            catastrophic_cooldown_ms: 90_000,
            catalog: builtin_catalog(),
        }
    }
}

/// Loading gate timeline and progress simulation options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub fallback_duration_ms: u64,
    /// How long to wait for audio metadata before assuming the fallback duration.
    pub metadata_grace_ms: u64,
    pub min_visible_ms: u64,
    pub fade_lead_ms: u64,
    pub progress_hold_ms: u64,
    pub tick_ms: MsRange,
    pub band: f64,
    pub advance: Span,
    pub stall_probability: f64,
    pub false_complete_probability: f64,
    pub false_complete_max: u32,
    pub false_complete_hold_ms: u64,
    pub rollback_to: Span,
    pub regression_probability: f64,
    pub regression_floor: f64,
    pub regression: Span,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            fallback_duration_ms: 14_000,
            metadata_grace_ms: 1_500,
            min_visible_ms: 6_000,
            fade_lead_ms: 800,
            progress_hold_ms: 400,
            tick_ms: MsRange::new(120, 320),
            band: 20.0,
            advance: Span::new(1.0, 6.0),
            stall_probability: 0.18,
            false_complete_probability: 0.08,
            false_complete_max: 3,
            false_complete_hold_ms: 700,
            rollback_to: Span::new(55.0, 80.0),
            regression_probability: 0.1,
            regression_floor: 35.0,
            regression: Span::new(3.0, 12.0),
        }
    }
}

/// Autoplay negotiation timings shared by every audio channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub promotion_delay_ms: u64,
    pub promotion_retry_ms: u64,
    pub ramp_ms: u64,
    pub ramp_step_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            promotion_delay_ms: 300,
            promotion_retry_ms: 1_200,
            ramp_ms: 700,
            ramp_step_ms: 50,
        }
    }
}

/// Entry gate presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryGateConfig {
    pub label: String,
    pub track_url: String,
    pub volume: f64,
}

impl Default for EntryGateConfig {
    fn default() -> Self {
        Self {
            label: String::from("Enter the exhibit"),
            track_url: String::from("/audio/gate-theme.mp3"),
            volume: 0.6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MusicConfig {
    pub tracks: Vec<String>,
    pub volume: f64,
}

impl Default for MusicConfig {
    fn default() -> Self {
        Self {
            tracks: vec![
                String::from("/audio/visit-01.mp3"),
                String::from("/audio/visit-02.mp3"),
                String::from("/audio/visit-03.mp3"),
            ],
            volume: 0.45,
        }
    }
}

/// Complete, immutable engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub incident_capacity: usize,
    pub cursor: CursorConfig,
    pub zone: ZoneConfig,
    pub focus: FocusConfig,
    pub clipboard: ClipboardConfig,
    pub drag: DragConfig,
    pub chrome: ChromeConfig,
    pub tour: TourConfig,
    pub gate: GateConfig,
    pub audio: AudioConfig,
    pub entry: EntryGateConfig,
    pub music: MusicConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            incident_capacity: 64,
            cursor: CursorConfig::default(),
            zone: ZoneConfig::default(),
            focus: FocusConfig::default(),
            clipboard: ClipboardConfig::default(),
            drag: DragConfig::default(),
            chrome: ChromeConfig::default(),
            tour: TourConfig::default(),
            gate: GateConfig::default(),
            audio: AudioConfig::default(),
            entry: EntryGateConfig::default(),
            music: MusicConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON document. Missing keys fall back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or any value fails validation.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load the configuration bundled with the crate.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundled asset fails to parse or validate.
    pub fn load_from_static() -> Result<Self, ConfigError> {
        Self::from_json(STATIC_ENGINE_JSON)
    }

    /// Check probabilities, ranges, thresholds and gate milestone ordering.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.cursor;
        probability_table("cursor.activation_probability", &c.activation_probability)?;
        probability_table("cursor.desync_probability", &c.desync_probability)?;
        ms_table("cursor.drift_ms", &c.drift_ms)?;
        ms_table("cursor.desync_ms", &c.desync_ms)?;
        span_table("cursor.desync_offset_px", &c.desync_offset_px)?;
        threshold("cursor.fail_disable_threshold", c.fail_disable_threshold)?;
        threshold("cursor.global_relax_after_fails", c.global_relax_after_fails)?;

        let z = &self.zone;
        probability_table("zone.activation_probability", &z.activation_probability)?;
        span_table("zone.nudge_px", &z.nudge_px)?;
        ms_table("zone.lag_ms", &z.lag_ms)?;
        ms_table("zone.tap_delay_ms", &z.tap_delay_ms)?;
        threshold("zone.fail_disable_threshold", z.fail_disable_threshold)?;

        let f = &self.focus;
        if f.confirm_key.trim().is_empty() {
            return Err(ConfigError::Empty {
                field: String::from("focus.confirm_key"),
            });
        }
        probability_table("focus.redirect_probability", &f.redirect_probability)?;
        threshold("focus.struggle_threshold", f.struggle_threshold)?;

        let cb = &self.clipboard;
        probability_table("clipboard.copy_corrupt_probability", &cb.copy_corrupt_probability)?;
        probability_table("clipboard.paste_reject_probability", &cb.paste_reject_probability)?;
        threshold(
            "clipboard.field_disable_after_repeats",
            cb.field_disable_after_repeats,
        )?;
        if cb.artifact_suffixes.iter().all(|s| s.is_empty()) {
            return Err(ConfigError::Empty {
                field: String::from("clipboard.artifact_suffixes"),
            });
        }

        let d = &self.drag;
        probability_table("drag.damping", &d.damping)?;
        probability_table("drag.snap_back_probability", &d.snap_back_probability)?;
        span("drag.snap_back_fraction", d.snap_back_fraction)?;
        probability("drag.snap_back_fraction.max", d.snap_back_fraction.max)?;
        ms("drag.snap_back_delay_ms", d.snap_back_delay_ms)?;

        probability_table("chrome.toast_probability", &self.chrome.toast_probability)?;

        probability_table("tour.base_chance", &self.tour.base_chance)?;
        for event in &self.tour.catalog {
            if !event.probability.is_finite() || event.probability < 0.0 {
                return Err(ConfigError::ProbabilityOutOfRange {
                    field: format!("tour.catalog.{}.probability", event.id),
                    value: event.probability,
                });
            }
        }

        self.validate_gate()?;

        probability("entry.volume", self.entry.volume)?;
        probability("music.volume", self.music.volume)?;
        Ok(())
    }

    fn validate_gate(&self) -> Result<(), ConfigError> {
        let g = &self.gate;
        ms("gate.tick_ms", g.tick_ms)?;
        span("gate.advance", g.advance)?;
        span("gate.rollback_to", g.rollback_to)?;
        span("gate.regression", g.regression)?;
        probability("gate.stall_probability", g.stall_probability)?;
        probability("gate.false_complete_probability", g.false_complete_probability)?;
        probability("gate.regression_probability", g.regression_probability)?;
        if g.tick_ms.min == 0 {
            return Err(ConfigError::GateTimings(String::from(
                "tick interval must be positive",
            )));
        }
        let lead = g.fade_lead_ms.saturating_add(g.progress_hold_ms);
        if g.fallback_duration_ms <= lead {
            return Err(ConfigError::GateTimings(format!(
                "fallback duration {} must exceed fade lead + hold ({lead})",
                g.fallback_duration_ms
            )));
        }
        if !(g.band.is_finite() && g.band > 0.0) {
            return Err(ConfigError::GateTimings(String::from(
                "progress band must be positive",
            )));
        }
        Ok(())
    }
}

fn probability(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::ProbabilityOutOfRange {
            field: field.to_string(),
            value,
        })
    }
}

fn probability_table(field: &str, table: &PhaseTable<f64>) -> Result<(), ConfigError> {
    for (phase, value) in table.iter() {
        probability(&format!("{field}.{}", phase.level()), *value)?;
    }
    Ok(())
}

fn ms(field: &str, range: MsRange) -> Result<(), ConfigError> {
    if range.is_ordered() {
        Ok(())
    } else {
        Err(ConfigError::InvertedRange {
            field: field.to_string(),
        })
    }
}

fn ms_table(field: &str, table: &PhaseTable<MsRange>) -> Result<(), ConfigError> {
    for (phase, range) in table.iter() {
        ms(&format!("{field}.{}", phase.level()), *range)?;
    }
    Ok(())
}

fn span(field: &str, span: Span) -> Result<(), ConfigError> {
    if span.is_ordered() {
        Ok(())
    } else {
        Err(ConfigError::InvertedRange {
            field: field.to_string(),
        })
    }
}

fn span_table(field: &str, table: &PhaseTable<Span>) -> Result<(), ConfigError> {
    for (phase, value) in table.iter() {
        span(&format!("{field}.{}", phase.level()), *value)?;
    }
    Ok(())
}

fn threshold(field: &str, value: u32) -> Result<(), ConfigError> {
    if value == 0 {
        Err(ConfigError::ZeroThreshold {
            field: field.to_string(),
        })
    } else {
        Ok(())
    }
}
