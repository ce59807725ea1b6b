//! Timeline playback scheduler
//!
//! Keeps the accessory aligned with a moving playback clock. Frames are state
//! assertions, not deltas: the firmware holds whatever was last sent, so the
//! correctness property is that the frame active on the accessory equals the
//! script's nearest-past frame at every moment, including across pause, seek
//! and resume.

use crate::codec::EffectFrame;
use crate::script::{LightingScript, TrackId};

/// Scheduler lifecycle phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimelinePhase {
    /// No script loaded.
    Idle,
    /// Script loaded, no position processed yet.
    Loaded,
    /// Position updates are being tracked.
    Running,
}

struct LoadedScript {
    script: LightingScript,
    track: TrackId,
    /// Index of the frame most recently emitted, for send deduplication.
    last_sent: Option<usize>,
    running: bool,
}

/// Emits the correct script frame for each playback position.
///
/// The caller (the orchestrator) feeds position ticks and seeks; the
/// scheduler returns the frame to send, or `None` when the accessory is
/// already asserted to the right state.
#[derive(Default)]
pub struct EffectTimelineScheduler {
    slot: Option<LoadedScript>,
}

impl EffectTimelineScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> TimelinePhase {
        match &self.slot {
            None => TimelinePhase::Idle,
            Some(slot) if slot.running => TimelinePhase::Running,
            Some(_) => TimelinePhase::Loaded,
        }
    }

    /// Track the loaded script belongs to, if any.
    pub fn track(&self) -> Option<&TrackId> {
        self.slot.as_ref().map(|s| &s.track)
    }

    /// Load a script for a track. A script already loaded for a different
    /// track is discarded; nothing carries over.
    pub fn load(&mut self, script: LightingScript, track: TrackId) {
        log::info!(
            "timeline: loaded script for '{}' ({} frame(s))",
            track,
            script.len()
        );
        self.slot = Some(LoadedScript {
            script,
            track,
            last_sent: None,
            running: false,
        });
    }

    /// Forget the last-sent index so the next position update re-asserts the
    /// nearest-past frame even inside the same segment. Called when another
    /// source has overwritten the accessory (or a send was dropped) while the
    /// script stays loaded: the dedup index no longer reflects what the
    /// accessory is showing.
    pub fn mark_output_stale(&mut self) {
        if let Some(slot) = self.slot.as_mut() {
            slot.last_sent = None;
        }
    }

    /// Discard the loaded script. Does not touch the accessory's visible
    /// state; an explicit Off or manual frame must be sent separately.
    pub fn stop(&mut self) {
        if self.slot.take().is_some() {
            log::debug!("timeline: stopped");
        }
    }

    /// Process a playback position tick. Returns the frame to send when the
    /// nearest-past frame differs from the one last sent.
    ///
    /// The nearest-past lookup always considers the whole script, so a
    /// backward jump resolves to an earlier index instead of sticking at
    /// `last_sent`.
    pub fn on_position_update(&mut self, position_millis: u64) -> Option<EffectFrame> {
        let slot = self.slot.as_mut()?;
        slot.running = true;
        match slot.script.nearest_past(position_millis) {
            Some(index) => {
                if slot.last_sent == Some(index) {
                    return None;
                }
                slot.last_sent = Some(index);
                Some(slot.script.entries()[index].frame)
            }
            None => {
                // Before the first scripted frame (e.g. seek back past it):
                // nothing is asserted; forget the last send so the first
                // frame re-fires when the position reaches it.
                slot.last_sent = None;
                None
            }
        }
    }

    /// Explicit re-synchronization after a seek. Always re-sends the
    /// nearest-past frame, even when its index equals `last_sent`: the seek
    /// may have drifted the accessory out of the state that frame asserted.
    pub fn on_seek(&mut self, position_millis: u64) -> Option<EffectFrame> {
        let slot = self.slot.as_mut()?;
        slot.running = true;
        match slot.script.nearest_past(position_millis) {
            Some(index) => {
                slot.last_sent = Some(index);
                Some(slot.script.entries()[index].frame)
            }
            None => {
                slot.last_sent = None;
                None
            }
        }
    }
}
