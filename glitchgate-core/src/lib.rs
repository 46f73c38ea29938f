//! Glitchgate Core
//!
//! Platform-agnostic decision logic for the glitchgate hostile interaction
//! engine: phase-scaled traps with a fairness ceiling, the tour event
//! scheduler, the loading gate timeline and autoplay negotiation.
//! This crate has no DOM or wasm dependencies; callers supply time and apply effects.

pub mod audio;
pub mod bus;
pub mod config;
pub mod engine;
pub mod fairness;
pub mod gate;
pub mod incident;
pub mod phase;
pub mod rng;
pub mod scheduler;
pub mod timers;
pub mod traps;

// Re-export commonly used types
pub use audio::{
    AudioChannel, AudioCommand, AudioCommands, AudioNegotiator, AudioOwner, AudioPlaybackState,
    MusicQueue, MusicStep, NotOwner, PlayRejection, QueueStep, TrackQueue,
};
pub use bus::{SessionState, SharedSession, Signal, SignalBus, SubscriptionId, track_session};
pub use config::{
    AudioConfig, ChromeConfig, ClipboardConfig, ConfigError, CursorConfig, DragConfig,
    EngineConfig, EntryGateConfig, FocusConfig, GateConfig, MusicConfig, TourConfig, ZoneConfig,
};
pub use engine::{EngineEffect, HostileEvent, TrapEngine};
pub use fairness::{
    CooldownWindow, Eligibility, FailEntry, FailLedger, Probability, RelaxValve, random_in_range,
    random_ms, roll, with_pity_adjustment,
};
pub use gate::{
    DurationSource, FrameSample, GateMachine, GateOutput, GateState, GateTimeline,
    MAX_METADATA_MS, ProgressBeat, VisibilityMonitor, VisibilityVerdict,
};
pub use incident::{Incident, IncidentLog, Severity, Surface};
pub use phase::{MsRange, Phase, PhaseTable, Span};
pub use rng::{CountingRng, RngBundle};
pub use scheduler::{
    EventDecisionTrace, TourEffect, TourEvent, TourPick, TourRequest, TourScheduler, TourTrigger,
    WeightedCandidate, builtin_catalog, schedule_tour_event, weighted_pick,
};
pub use timers::{TimerId, TimerQueue};
pub use traps::{TargetKey, TrapContext, TrapDecision};
