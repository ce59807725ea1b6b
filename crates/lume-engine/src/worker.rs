//! Background workers
//!
//! Two small owned threads bridge the outside world into the orchestrator:
//! the position ticker polls the media player's clock, and the spectral feed
//! forwards samples from the audio pipeline. Both are stopped and joined on
//! drop, so owning one is owning its thread.

use crate::orchestrator::EffectOrchestrator;
use crate::player::MediaPlayer;
use crate::reactive::SpectralSample;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Polls the media player at a fixed cadence and feeds position ticks to the
/// orchestrator. Also relays transport state and end-of-track.
pub struct PositionTicker {
    stop_tx: flume::Sender<()>,
    handle: Option<thread::JoinHandle<()>>,
}

impl PositionTicker {
    /// Suggested polling cadence; frequent enough that a scripted frame
    /// fires within a visually-imperceptible delay of its offset.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

    pub fn spawn(
        player: Arc<dyn MediaPlayer>,
        orchestrator: Arc<EffectOrchestrator>,
        interval: Duration,
    ) -> Self {
        let (stop_tx, stop_rx) = flume::bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("lume-position-tick".into())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(flume::RecvTimeoutError::Timeout) => {
                        let playing = player.is_playing();
                        orchestrator.set_playback_active(playing);
                        if playing {
                            orchestrator.on_position_tick(player.position_millis());
                        }
                        if player.playback_ended() {
                            log::debug!("position ticker: playback ended");
                            orchestrator.playback_stopped();
                        }
                    }
                    Ok(()) | Err(flume::RecvTimeoutError::Disconnected) => break,
                }
            })
            .expect("Failed to spawn position ticker thread");
        Self {
            stop_tx,
            handle: Some(handle),
        }
    }
}

impl Drop for PositionTicker {
    fn drop(&mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Forwards spectral samples from the audio pipeline channel into the
/// orchestrator. Exits when the producing side hangs up.
pub struct SpectralFeed {
    stop_tx: flume::Sender<()>,
    handle: Option<thread::JoinHandle<()>>,
}

impl SpectralFeed {
    pub fn spawn(
        samples: flume::Receiver<SpectralSample>,
        orchestrator: Arc<EffectOrchestrator>,
    ) -> Self {
        let (stop_tx, stop_rx) = flume::bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("lume-spectral-feed".into())
            .spawn(move || loop {
                if stop_rx.try_recv().is_ok() {
                    break;
                }
                match samples.recv_timeout(Duration::from_millis(250)) {
                    Ok(sample) => orchestrator.on_spectral_sample(&sample),
                    Err(flume::RecvTimeoutError::Timeout) => continue,
                    Err(flume::RecvTimeoutError::Disconnected) => {
                        log::debug!("spectral feed: producer hung up");
                        break;
                    }
                }
            })
            .expect("Failed to spawn spectral feed thread");
        Self {
            stop_tx,
            handle: Some(handle),
        }
    }
}

impl Drop for SpectralFeed {
    fn drop(&mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
