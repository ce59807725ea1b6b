//! Effect engine for the Lume LED accessory
//!
//! This crate provides:
//! - The effect model: base effects, firmware list slots, custom variants
//! - Frame encoding for the accessory's 12-byte control protocol
//! - Persistent per-effect parameter storage (YAML)
//! - Timeline scripts synchronized to a playback clock
//! - Audio-reactive spectral-to-color mapping
//! - The orchestrator arbitrating which source drives the output
//!
//! # Architecture
//!
//! ```text
//! UI controls ───────────────┐
//! position ticker ──────────▶│ EffectOrchestrator │──▶ FrameSink ──▶ gateway
//! spectral feed ────────────▶│  (arbitration)     │
//! session events ───────────┘
//! ```
//!
//! Every outbound frame passes through the orchestrator's single dispatch
//! point; producers never write to the gateway directly and frames are never
//! queued across a disconnect.

pub mod codec;
pub mod effect;
pub mod orchestrator;
pub mod player;
pub mod reactive;
pub mod script;
pub mod store;
pub mod timeline;
pub mod worker;

pub use codec::{EffectFrame, FieldSupport, FRAME_LEN};
pub use effect::{
    BaseEffect, Color, CustomEffect, EffectId, EffectKind, EffectSettings, SourceTag,
    TransmissionIntent, EFFECT_LIST_SLOTS, MAX_CUSTOM_EFFECTS,
};
pub use orchestrator::{EffectOrchestrator, OrchestratorConfig};
pub use player::MediaPlayer;
pub use reactive::{AudioReactiveMapper, ReactiveConfig, SpectralSample};
pub use script::{
    LightingScript, ScriptEntry, ScriptError, ScriptStore, TrackId, YamlScriptStore,
};
pub use store::{
    default_settings_path, EffectParameterStore, MemoryBackend, SettingsBackend, StoreError,
    YamlFileBackend, PRESET_COLOR_SLOTS,
};
pub use timeline::{EffectTimelineScheduler, TimelinePhase};
pub use worker::{PositionTicker, SpectralFeed};
