//! Audio-reactive color mapping
//!
//! Consumes short-interval spectral-energy summaries while audio plays and
//! derives an instantaneous color: band energies are partitioned into
//! low/mid/high groups, each group's summed magnitude is normalized against
//! a rolling decaying peak, and the three normalized magnitudes drive the
//! R/G/B channels. A minimum inter-send interval keeps spectral noise below
//! the radio link's safe update rate regardless of the sample cadence.

use crate::effect::Color;
use std::time::{Duration, Instant};

/// Spectral-energy summary produced by the audio pipeline at a fixed short
/// interval. Transient: consumed immediately, never persisted.
#[derive(Clone, Debug)]
pub struct SpectralSample {
    /// Ordered band magnitudes, low frequencies first.
    pub band_energies: Vec<f32>,
}

/// Tuning values for the mapper. The defaults are empirical; treat them as
/// configuration, not constants.
#[derive(Clone, Debug)]
pub struct ReactiveConfig {
    /// Minimum spacing between emitted colors, independent of sample cadence.
    pub min_send_interval: Duration,
    /// Per-ingest multiplicative decay of the rolling peaks, so transient
    /// loud sections do not permanently desensitize the mapping.
    pub peak_decay: f32,
    /// Fraction of the band sequence assigned to the low group.
    pub low_split: f32,
    /// Fraction of the band sequence below which the mid group ends.
    pub mid_split: f32,
}

impl Default for ReactiveConfig {
    fn default() -> Self {
        Self {
            min_send_interval: Duration::from_millis(50),
            peak_decay: 0.97,
            low_split: 0.25,
            mid_split: 0.60,
        }
    }
}

/// Avoids division blow-up when a group has been silent.
const PEAK_FLOOR: f32 = 1e-6;

/// Maps spectral samples to colors at a bounded output rate.
pub struct AudioReactiveMapper {
    config: ReactiveConfig,
    /// Rolling decaying peak per group (low, mid, high).
    peaks: [f32; 3],
    /// Most recently computed color, emitted on the next eligible ingest.
    latest: Option<Color>,
    last_sent_at: Option<Instant>,
}

impl AudioReactiveMapper {
    pub fn new(config: ReactiveConfig) -> Self {
        Self {
            config,
            peaks: [0.0; 3],
            latest: None,
            last_sent_at: None,
        }
    }

    /// Ingest one sample. Always updates the rolling state; returns the
    /// color to send only when the minimum inter-send interval has elapsed
    /// since the last emission.
    pub fn ingest(&mut self, sample: &SpectralSample, now: Instant) -> Option<Color> {
        if sample.band_energies.is_empty() {
            return None;
        }

        let sums = self.group_sums(&sample.band_energies);
        let mut channels = [0u8; 3];
        for (i, sum) in sums.iter().enumerate() {
            self.peaks[i] = (self.peaks[i] * self.config.peak_decay).max(*sum);
            let norm = (sum / self.peaks[i].max(PEAK_FLOOR)).clamp(0.0, 1.0);
            channels[i] = (norm * 255.0).round() as u8;
        }
        self.latest = Some(Color::new(channels[0], channels[1], channels[2]));

        let due = match self.last_sent_at {
            None => true,
            Some(at) => now.duration_since(at) >= self.config.min_send_interval,
        };
        if due {
            self.last_sent_at = Some(now);
            self.latest
        } else {
            None
        }
    }

    /// Forget rolling peaks and throttle state (track change, mode toggle).
    pub fn reset(&mut self) {
        self.peaks = [0.0; 3];
        self.latest = None;
        self.last_sent_at = None;
    }

    /// Sum band energies into low/mid/high groups per the configured splits.
    fn group_sums(&self, bands: &[f32]) -> [f32; 3] {
        let n = bands.len();
        let low_end = ((n as f32 * self.config.low_split).ceil() as usize).clamp(1, n);
        let mid_end = ((n as f32 * self.config.mid_split).ceil() as usize).clamp(low_end, n);

        let sum = |range: &[f32]| range.iter().copied().map(f32::abs).sum::<f32>();
        [
            sum(&bands[..low_end]),
            sum(&bands[low_end..mid_end]),
            sum(&bands[mid_end..]),
        ]
    }
}

impl Default for AudioReactiveMapper {
    fn default() -> Self {
        Self::new(ReactiveConfig::default())
    }
}
