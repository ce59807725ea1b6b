//! Effect data model
//!
//! Closed sets of effect kinds and the value objects shared by the codec,
//! the parameter store, and the orchestrator.

use serde::{Deserialize, Serialize};

/// Number of firmware-resident canned sequences selectable by slot.
pub const EFFECT_LIST_SLOTS: u8 = 10;

/// Maximum number of user-defined custom effects.
pub const MAX_CUSTOM_EFFECTS: usize = 7;

/// The five base animations the accessory firmware understands natively.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseEffect {
    On,
    Off,
    Strobe,
    Blink,
    Breath,
}

impl BaseEffect {
    pub const ALL: [BaseEffect; 5] = [
        BaseEffect::On,
        BaseEffect::Off,
        BaseEffect::Strobe,
        BaseEffect::Blink,
        BaseEffect::Breath,
    ];

    /// Stable key used in persisted settings records.
    pub fn storage_key(&self) -> &'static str {
        match self {
            BaseEffect::On => "on",
            BaseEffect::Off => "off",
            BaseEffect::Strobe => "strobe",
            BaseEffect::Blink => "blink",
            BaseEffect::Breath => "breath",
        }
    }
}

/// Identity keying a persisted [`EffectSettings`] record.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EffectId {
    Base(BaseEffect),
    /// Opaque unique token of a user-defined custom effect.
    Custom(String),
}

impl EffectId {
    pub fn storage_key(&self) -> String {
        match self {
            EffectId::Base(base) => format!("effect.{}", base.storage_key()),
            EffectId::Custom(id) => format!("effect.custom.{}", id),
        }
    }
}

/// A user-named alias that resolves its parameters through one of the five
/// base kinds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomEffect {
    /// Opaque unique token.
    pub id: String,
    /// Base kind the alias resolves through.
    pub base: BaseEffect,
    /// User-chosen display name.
    pub name: String,
}

/// What the orchestrator can be asked to play.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EffectKind {
    Base(BaseEffect),
    /// One of the firmware's canned sequences.
    ListSlot(u8),
    Custom(CustomEffect),
}

impl EffectKind {
    /// The base animation this kind resolves to, if any. `ListSlot` runs
    /// entirely in firmware and has no base.
    pub fn resolve_base(&self) -> Option<BaseEffect> {
        match self {
            EffectKind::Base(base) => Some(*base),
            EffectKind::Custom(custom) => Some(custom.base),
            EffectKind::ListSlot(_) => None,
        }
    }

    /// Settings identity for this kind. `ListSlot` and bare `Off` carry no
    /// settings record.
    pub fn settings_id(&self) -> Option<EffectId> {
        match self {
            EffectKind::Base(BaseEffect::Off) => None,
            EffectKind::Base(base) => Some(EffectId::Base(*base)),
            EffectKind::Custom(custom) => Some(EffectId::Custom(custom.id.clone())),
            EffectKind::ListSlot(_) => None,
        }
    }
}

/// 8-bit RGB color.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const BLACK: Color = Color::new(0, 0, 0);
    pub const WHITE: Color = Color::new(255, 255, 255);
}

/// Per-effect settings value object.
///
/// Which fields are semantically meaningful for a given kind is decided by
/// the codec's field-support table; the record always carries all of them so
/// switching a custom effect's base kind loses nothing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectSettings {
    /// Foreground color.
    pub color: Color,
    /// Background color (Strobe/Blink/Breath only).
    pub background: Color,
    /// Animation speed in firmware units.
    pub period: u8,
    /// Fade duration in milliseconds (On/Off only).
    pub transition_millis: u32,
    /// Firmware picks a random foreground color each cycle.
    pub random_color: bool,
    /// Randomized inter-cycle delay in firmware units.
    pub random_delay: u8,
}

impl Default for EffectSettings {
    fn default() -> Self {
        Self {
            color: Color::WHITE,
            background: Color::BLACK,
            period: 16,
            transition_millis: 0,
            random_color: false,
            random_delay: 0,
        }
    }
}

impl EffectSettings {
    /// Documented per-kind defaults, used whenever no record is persisted.
    pub fn default_for(base: BaseEffect) -> Self {
        match base {
            BaseEffect::On => Self {
                transition_millis: 300,
                ..Self::default()
            },
            BaseEffect::Off => Self {
                color: Color::BLACK,
                transition_millis: 300,
                ..Self::default()
            },
            BaseEffect::Strobe => Self {
                color: Color::WHITE,
                period: 8,
                ..Self::default()
            },
            BaseEffect::Blink => Self {
                color: Color::new(255, 64, 0),
                period: 24,
                ..Self::default()
            },
            BaseEffect::Breath => Self {
                color: Color::new(0, 128, 255),
                period: 48,
                ..Self::default()
            },
        }
    }
}

/// Which producer is currently driving the accessory output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceTag {
    /// User tapped a specific effect card.
    Manual,
    /// Per-track lighting script following playback position.
    Timeline,
    /// Spectrum-reactive color mapping.
    AudioReactive,
    /// One-shot connection-confirmation burst.
    Connection,
    /// One-shot preview frame outside any selection (preset color preview).
    Broadcast,
}

/// The reconciled "what is being sent right now" value, published for UI
/// feedback (indicator glow) alongside each dispatched frame.
#[derive(Clone, Debug, PartialEq)]
pub struct TransmissionIntent {
    pub source: SourceTag,
    /// Resolved kind, when the source has one (`Timeline` frames are opaque).
    pub kind: Option<EffectKind>,
    pub color: Color,
    pub period: u8,
}
