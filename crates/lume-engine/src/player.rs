//! Media player collaborator
//!
//! The operating system's decoding/playback engine is a black box. The
//! engine only needs a playback clock, transport control, and an end-of-track
//! signal; platform adapters implement [`MediaPlayer`] over the real thing.

/// Black-box playback engine consumed by the position ticker and the
/// orchestrator.
pub trait MediaPlayer: Send + Sync {
    /// Current playback position, milliseconds from track start.
    fn position_millis(&self) -> u64;

    /// Total track length, milliseconds.
    fn duration_millis(&self) -> u64;

    fn play(&self);

    fn pause(&self);

    fn seek_to(&self, position_millis: u64);

    /// Whether the transport is currently advancing.
    fn is_playing(&self) -> bool;

    /// True once after playback naturally reaches the end of the track.
    /// Implementations latch this until the next `play`/`seek_to`.
    fn playback_ended(&self) -> bool;
}
