//! Effect frame codec
//!
//! Builds the opaque fixed-size frame delivered through the transmission
//! gateway for a given effect intent. Pure functions, no state. Out-of-range
//! inputs are clamped, never rejected, so upstream callers need no defensive
//! branching.
//!
//! Frame layout (engine-internal contract, 12 bytes):
//!
//! ```text
//! [0]     preamble 0xA5
//! [1]     opcode (base effect, or 0x10 + slot for list sequences)
//! [2..5]  foreground R,G,B
//! [5..8]  background R,G,B
//! [8]     period (firmware units)
//! [9]     transition (100 ms units)
//! [10]    flags (bit 0: random color)
//! [11]    random delay (firmware units)
//! ```

use crate::effect::{BaseEffect, Color, EffectKind, EffectSettings};

/// Fixed frame size accepted by the gateway.
pub const FRAME_LEN: usize = 12;

/// One opaque outbound frame.
pub type EffectFrame = [u8; FRAME_LEN];

const PREAMBLE: u8 = 0xA5;

const OP_OFF: u8 = 0x00;
const OP_ON: u8 = 0x01;
const OP_STROBE: u8 = 0x02;
const OP_BLINK: u8 = 0x03;
const OP_BREATH: u8 = 0x04;
const OP_LIST_BASE: u8 = 0x10;

const FLAG_RANDOM_COLOR: u8 = 0x01;

/// Transition time is carried in 100 ms units on the wire.
const TRANSITION_UNIT_MILLIS: u32 = 100;

fn opcode(kind: &EffectKind) -> u8 {
    match kind.resolve_base() {
        Some(BaseEffect::Off) => OP_OFF,
        Some(BaseEffect::On) => OP_ON,
        Some(BaseEffect::Strobe) => OP_STROBE,
        Some(BaseEffect::Blink) => OP_BLINK,
        Some(BaseEffect::Breath) => OP_BREATH,
        None => match kind {
            EffectKind::ListSlot(slot) => OP_LIST_BASE + (*slot).min(0x0F),
            // resolve_base is None only for ListSlot
            _ => OP_OFF,
        },
    }
}

/// Encode an effect intent into one frame.
///
/// `period` and `transition_millis` wider than the wire fields are clamped to
/// the encodable range.
pub fn encode(
    kind: &EffectKind,
    color: Color,
    background: Color,
    period: u16,
    transition_millis: u32,
) -> EffectFrame {
    let mut frame = [0u8; FRAME_LEN];
    frame[0] = PREAMBLE;
    frame[1] = opcode(kind);
    frame[2] = color.r;
    frame[3] = color.g;
    frame[4] = color.b;
    frame[5] = background.r;
    frame[6] = background.g;
    frame[7] = background.b;
    frame[8] = period.min(u16::from(u8::MAX)) as u8;
    frame[9] = (transition_millis / TRANSITION_UNIT_MILLIS).min(u32::from(u8::MAX)) as u8;
    frame
}

/// Encode an effect intent from a full settings record, including the random
/// flags the short form omits.
pub fn encode_with_settings(kind: &EffectKind, settings: &EffectSettings) -> EffectFrame {
    let mut frame = encode(
        kind,
        settings.color,
        settings.background,
        u16::from(settings.period),
        settings.transition_millis,
    );
    if settings.random_color {
        frame[10] |= FLAG_RANDOM_COLOR;
    }
    frame[11] = settings.random_delay;
    frame
}

/// Read back the foreground color of a frame (used to drive UI feedback for
/// opaque timeline frames).
pub fn frame_color(frame: &EffectFrame) -> Color {
    Color::new(frame[2], frame[3], frame[4])
}

/// Read back the period field of a frame.
pub fn frame_period(frame: &EffectFrame) -> u8 {
    frame[8]
}

/// Which [`EffectSettings`] fields are semantically applicable to a kind.
///
/// Drives the settings UI (which controls to show) and the orchestrator's
/// reconciliation (which mutations warrant a re-send).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FieldSupport {
    pub foreground: bool,
    pub background: bool,
    pub period: bool,
    pub transition: bool,
    pub random_color: bool,
    pub random_delay: bool,
}

/// Association table: base kind → applicable settings fields.
pub fn field_support(base: BaseEffect) -> FieldSupport {
    match base {
        BaseEffect::On => FieldSupport {
            foreground: true,
            transition: true,
            ..FieldSupport::default()
        },
        BaseEffect::Off => FieldSupport {
            transition: true,
            ..FieldSupport::default()
        },
        BaseEffect::Strobe | BaseEffect::Blink => FieldSupport {
            foreground: true,
            background: true,
            period: true,
            random_color: true,
            random_delay: true,
            ..FieldSupport::default()
        },
        BaseEffect::Breath => FieldSupport {
            foreground: true,
            background: true,
            period: true,
            random_color: true,
            ..FieldSupport::default()
        },
    }
}
