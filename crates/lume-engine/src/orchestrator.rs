//! Effect orchestration
//!
//! The single public control surface over the accessory. Arbitrates between
//! manual selections, the timeline scheduler, and the audio-reactive mapper
//! so that exactly one source drives the output at a time, and funnels every
//! outbound frame through one non-reentrant dispatch point. Producers never
//! queue frames: a frame is a real-time state assertion with no value once
//! stale, so sends while not connected are dropped and reported.

use crate::codec::{self, EffectFrame};
use crate::effect::{
    BaseEffect, Color, EffectId, EffectKind, EffectSettings, SourceTag, TransmissionIntent,
    EFFECT_LIST_SLOTS,
};
use crate::reactive::{AudioReactiveMapper, ReactiveConfig, SpectralSample};
use crate::script::{ScriptStore, TrackId};
use crate::store::EffectParameterStore;
use crate::timeline::{EffectTimelineScheduler, TimelinePhase};
use lume_link::{
    ConnectionSessionManager, ConnectionState, SessionEvent, StateCell, StateReader,
    TransmissionGateway,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread;
use std::time::{Duration, Instant};

/// Orchestrator tuning values.
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Color of the connection-confirmation burst.
    pub confirmation_color: Color,
    /// How long the confirmation burst runs before auto-stopping.
    pub confirmation_duration: Duration,
    /// How long a preset-color preview holds before the active manual
    /// selection is re-asserted.
    pub preview_duration: Duration,
    /// Period field stamped on audio-reactive frames.
    pub reactive_period: u8,
    /// Mapper tuning.
    pub reactive: ReactiveConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            confirmation_color: Color::new(0, 200, 120),
            confirmation_duration: Duration::from_millis(1500),
            preview_duration: Duration::from_millis(1500),
            reactive_period: 4,
            reactive: ReactiveConfig::default(),
        }
    }
}

/// The single serialized path to the gateway. Checks the connection state
/// before every send; not-connected sends are dropped, never queued.
struct FrameSink {
    gateway: Arc<dyn TransmissionGateway>,
    state: StateReader<ConnectionState>,
    lock: Mutex<()>,
}

impl FrameSink {
    fn dispatch(&self, frame: &EffectFrame) -> bool {
        let _guard = match self.lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let ConnectionState::Connected(handle) = self.state.get() else {
            log::debug!("dispatch: not connected, dropping frame");
            return false;
        };
        match self.gateway.send(&handle, frame) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("dispatch: send to {} failed: {}", handle.label(), e);
                false
            }
        }
    }
}

/// Mutable arbitration state, guarded by one lock.
struct Arbitration {
    /// Explicit user selection; suppresses both automatic sources.
    manual: Option<EffectKind>,
    audio_reactive: bool,
    audio_playing: bool,
    current_track: Option<TrackId>,
    timeline: EffectTimelineScheduler,
    mapper: AudioReactiveMapper,
}

impl Arbitration {
    /// Precedence: manual, then audio-reactive (while enabled and playing),
    /// then the timeline.
    fn active_source(&self) -> Option<SourceTag> {
        if self.manual.is_some() {
            Some(SourceTag::Manual)
        } else if self.audio_reactive && self.audio_playing {
            Some(SourceTag::AudioReactive)
        } else if self.timeline.phase() != TimelinePhase::Idle {
            Some(SourceTag::Timeline)
        } else {
            None
        }
    }
}

/// Root component: owns arbitration, the dispatch point, and the observable
/// transmission intent. Construct with [`EffectOrchestrator::new`]; the
/// returned `Arc` is shared with the background workers.
pub struct EffectOrchestrator {
    session: Arc<ConnectionSessionManager>,
    store: Arc<EffectParameterStore>,
    scripts: Arc<dyn ScriptStore>,
    config: OrchestratorConfig,
    sink: FrameSink,
    inner: Mutex<Arbitration>,
    intent: StateCell<Option<TransmissionIntent>>,
    /// Invalidates a pending confirmation auto-stop when a newer burst (or
    /// teardown) supersedes it.
    burst_generation: AtomicU64,
    /// Invalidates a pending preview restore when a newer preview fires.
    preview_generation: AtomicU64,
    /// Self-handle for the short-lived restore threads; upgrading fails once
    /// the orchestrator is being torn down.
    weak: Weak<Self>,
    listener_shutdown: Arc<AtomicBool>,
    listener: Mutex<Option<thread::JoinHandle<()>>>,
}

impl EffectOrchestrator {
    pub fn new(
        session: Arc<ConnectionSessionManager>,
        store: Arc<EffectParameterStore>,
        scripts: Arc<dyn ScriptStore>,
        gateway: Arc<dyn TransmissionGateway>,
        config: OrchestratorConfig,
    ) -> Arc<Self> {
        let sink = FrameSink {
            gateway,
            state: session.state_reader(),
            lock: Mutex::new(()),
        };
        let mapper = AudioReactiveMapper::new(config.reactive.clone());
        let this = Arc::new_cyclic(|weak| Self {
            session,
            store,
            scripts,
            config,
            sink,
            inner: Mutex::new(Arbitration {
                manual: None,
                audio_reactive: false,
                audio_playing: false,
                current_track: None,
                timeline: EffectTimelineScheduler::new(),
                mapper,
            }),
            intent: StateCell::new(None),
            burst_generation: AtomicU64::new(0),
            preview_generation: AtomicU64::new(0),
            weak: weak.clone(),
            listener_shutdown: Arc::new(AtomicBool::new(false)),
            listener: Mutex::new(None),
        });
        Self::spawn_session_listener(&this);
        this
    }

    fn inner(&self) -> MutexGuard<'_, Arbitration> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Dispatch one frame and, on success, publish the matching intent.
    fn dispatch(&self, frame: &EffectFrame, intent: TransmissionIntent) -> bool {
        if self.sink.dispatch(frame) {
            self.intent.set(Some(intent));
            true
        } else {
            false
        }
    }

    // === Observables ===

    pub fn session(&self) -> &Arc<ConnectionSessionManager> {
        &self.session
    }

    pub fn store(&self) -> &Arc<EffectParameterStore> {
        &self.store
    }

    /// Reader for the currently-active transmission intent (UI feedback).
    pub fn intent_reader(&self) -> StateReader<Option<TransmissionIntent>> {
        self.intent.reader()
    }

    /// Which source currently owns the output, if any.
    pub fn active_source(&self) -> Option<SourceTag> {
        self.inner().active_source()
    }

    // === Manual control ===

    /// Play a user-selected effect. Returns whether the frame actually went
    /// out; on `false` the selection is not recorded, so the UI stays
    /// consistent with reality.
    pub fn play_manual(&self, kind: EffectKind) -> bool {
        let settings = self.resolved_settings(&kind);
        let frame = codec::encode_with_settings(&kind, &settings);
        let intent = TransmissionIntent {
            source: SourceTag::Manual,
            kind: Some(kind.clone()),
            color: settings.color,
            period: settings.period,
        };

        let mut inner = self.inner();
        if self.dispatch(&frame, intent) {
            inner.manual = Some(kind);
            true
        } else {
            false
        }
    }

    /// Clear the manual selection and assert Off. The selection clears even
    /// when the Off frame cannot be delivered (there is nothing to stay
    /// consistent with once the user has deselected); the return value still
    /// reports whether the frame went out.
    pub fn stop_manual(&self) -> bool {
        let mut inner = self.inner();
        inner.manual = None;
        // The accessory now shows Off (or whatever the manual selection left
        // behind), not the script's frame; the next tick must re-assert it.
        inner.timeline.mark_output_stale();
        let frame = codec::encode(
            &EffectKind::Base(BaseEffect::Off),
            Color::BLACK,
            Color::BLACK,
            0,
            0,
        );
        let sent = self.sink.dispatch(&frame);
        self.intent.set(None);
        sent
    }

    /// Resolve the settings record for a kind, falling back to the per-kind
    /// defaults for identities that carry no record.
    fn resolved_settings(&self, kind: &EffectKind) -> EffectSettings {
        match kind.settings_id() {
            Some(id) => self.store.settings_for(&id),
            None => match kind.resolve_base() {
                Some(base) => EffectSettings::default_for(base),
                None => EffectSettings::default(),
            },
        }
    }

    /// Select a firmware canned sequence. Re-selecting the active slot is a
    /// toggle: the second tap stops it.
    pub fn select_effect_list_slot(&self, slot: u8) -> bool {
        if slot >= EFFECT_LIST_SLOTS {
            log::warn!("orchestrator: effect list slot {} out of range", slot);
            return false;
        }
        let is_toggle_off = {
            let inner = self.inner();
            inner.manual == Some(EffectKind::ListSlot(slot))
        };
        if is_toggle_off {
            self.stop_manual()
        } else {
            self.play_manual(EffectKind::ListSlot(slot))
        }
    }

    /// One-shot preview frame outside any selection (preset color swatches).
    /// Does not touch arbitration. Sources with a natural next send (the
    /// timeline, the reactive mapper) overwrite the preview themselves; a
    /// manual selection has none, so it is re-asserted after the hold
    /// duration.
    pub fn preview_color(&self, color: Color) -> bool {
        let frame = codec::encode(&EffectKind::Base(BaseEffect::On), color, Color::BLACK, 0, 0);
        let mut inner = self.inner();
        let sent = self.dispatch(
            &frame,
            TransmissionIntent {
                source: SourceTag::Broadcast,
                kind: None,
                color,
                period: 0,
            },
        );
        if !sent {
            return false;
        }
        // The preview overwrote whatever the owning source last asserted.
        inner.timeline.mark_output_stale();
        let generation = self.preview_generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(manual) = inner.manual.clone() {
            self.spawn_preview_restore(manual, generation);
        }
        true
    }

    /// Re-assert the manual selection once the preview hold elapses, unless a
    /// newer preview or another source has taken the output since.
    fn spawn_preview_restore(&self, manual: EffectKind, generation: u64) {
        let weak = self.weak.clone();
        let duration = self.config.preview_duration;
        let spawned = thread::Builder::new()
            .name("lume-preview-restore".into())
            .spawn(move || {
                thread::sleep(duration);
                let Some(this) = weak.upgrade() else { return };
                if this.preview_generation.load(Ordering::SeqCst) != generation {
                    return;
                }
                let still_previewing = matches!(
                    this.intent.get(),
                    Some(TransmissionIntent {
                        source: SourceTag::Broadcast,
                        ..
                    })
                );
                if !still_previewing {
                    return;
                }
                let inner = this.inner();
                if inner.manual.as_ref() != Some(&manual) {
                    return;
                }
                let settings = this.resolved_settings(&manual);
                let frame = codec::encode_with_settings(&manual, &settings);
                this.dispatch(
                    &frame,
                    TransmissionIntent {
                        source: SourceTag::Manual,
                        kind: Some(manual),
                        color: settings.color,
                        period: settings.period,
                    },
                );
            });
        if let Err(e) = spawned {
            log::warn!("orchestrator: failed to spawn preview restore: {}", e);
        }
    }

    // === Settings ===

    /// Persist a committed settings change. When the mutated identity is the
    /// active manual selection, the updated frame is re-sent immediately;
    /// the return value reports that re-send (`true` when nothing needed
    /// re-sending).
    pub fn update_settings(&self, id: &EffectId, settings: EffectSettings) -> bool {
        self.store.save_settings(id, settings.clone());

        let inner = self.inner();
        let Some(manual) = inner.manual.clone() else {
            return true;
        };
        if manual.settings_id().as_ref() != Some(id) {
            return true;
        }
        let frame = codec::encode_with_settings(&manual, &settings);
        self.dispatch(
            &frame,
            TransmissionIntent {
                source: SourceTag::Manual,
                kind: Some(manual),
                color: settings.color,
                period: settings.period,
            },
        )
    }

    // === Playback integration ===

    /// Switching tracks re-evaluates precedence from scratch: the old script
    /// is discarded, rolling audio state is reset, and a script for the new
    /// track loads only while audio-reactive mode is disabled.
    pub fn track_changed(&self, track: Option<TrackId>) {
        let mut inner = self.inner();
        inner.timeline.stop();
        inner.mapper.reset();
        inner.current_track = track;
        self.reload_script(&mut inner);
    }

    /// Enable or disable audio-reactive mode. Disabling hands control back
    /// to a matching timeline script, if the current track has one.
    pub fn set_audio_reactive(&self, enabled: bool) {
        let mut inner = self.inner();
        if inner.audio_reactive == enabled {
            return;
        }
        inner.audio_reactive = enabled;
        log::info!(
            "orchestrator: audio-reactive mode {}",
            if enabled { "enabled" } else { "disabled" }
        );
        if enabled {
            inner.mapper.reset();
        } else {
            // Reactive frames overwrote whatever a still-loaded script last
            // asserted; the handoff back must not be deduplicated away.
            inner.timeline.mark_output_stale();
            self.reload_script(&mut inner);
        }
    }

    /// Whether the playback transport is advancing. Driven by the position
    /// ticker; gates the audio-reactive source.
    pub fn set_playback_active(&self, playing: bool) {
        self.inner().audio_playing = playing;
    }

    /// Player position tick (~100 ms cadence). Drives the timeline when it
    /// owns the output.
    pub fn on_position_tick(&self, position_millis: u64) {
        let mut inner = self.inner();
        if inner.active_source() != Some(SourceTag::Timeline) {
            return;
        }
        if let Some(frame) = inner.timeline.on_position_update(position_millis) {
            if !self.dispatch_timeline(&frame) {
                // The scheduler recorded the frame as sent; it was not.
                inner.timeline.mark_output_stale();
            }
        }
    }

    /// Explicit seek: the timeline always re-asserts the nearest-past frame.
    pub fn on_seek(&self, position_millis: u64) {
        let mut inner = self.inner();
        if inner.active_source() != Some(SourceTag::Timeline) {
            return;
        }
        if let Some(frame) = inner.timeline.on_seek(position_millis) {
            if !self.dispatch_timeline(&frame) {
                inner.timeline.mark_output_stale();
            }
        }
    }

    /// Spectral sample from the audio pipeline. Drives the mapper when it
    /// owns the output; otherwise the sample is discarded without touching
    /// rolling state, so a suppressed mapper cannot emit the instant it is
    /// unsuppressed.
    pub fn on_spectral_sample(&self, sample: &SpectralSample) {
        let mut inner = self.inner();
        if inner.active_source() != Some(SourceTag::AudioReactive) {
            return;
        }
        if let Some(color) = inner.mapper.ingest(sample, Instant::now()) {
            let frame = codec::encode(
                &EffectKind::Base(BaseEffect::On),
                color,
                Color::BLACK,
                u16::from(self.config.reactive_period),
                0,
            );
            self.dispatch(
                &frame,
                TransmissionIntent {
                    source: SourceTag::AudioReactive,
                    kind: Some(EffectKind::Base(BaseEffect::On)),
                    color,
                    period: self.config.reactive_period,
                },
            );
        }
    }

    /// Playback stopped or naturally ended: discard the script, reset the
    /// mapper, and drop any automatic-source intent.
    pub fn playback_stopped(&self) {
        let mut inner = self.inner();
        inner.audio_playing = false;
        inner.timeline.stop();
        inner.mapper.reset();
        if let Some(intent) = self.intent.get() {
            if matches!(
                intent.source,
                SourceTag::Timeline | SourceTag::AudioReactive
            ) {
                self.intent.set(None);
            }
        }
    }

    fn dispatch_timeline(&self, frame: &EffectFrame) -> bool {
        self.dispatch(
            frame,
            TransmissionIntent {
                source: SourceTag::Timeline,
                kind: None,
                color: codec::frame_color(frame),
                period: codec::frame_period(frame),
            },
        )
    }

    fn reload_script(&self, inner: &mut Arbitration) {
        if inner.audio_reactive || inner.timeline.phase() != TimelinePhase::Idle {
            return;
        }
        let Some(track) = inner.current_track.clone() else {
            return;
        };
        if !self.scripts.has_script_for(&track) {
            log::debug!("orchestrator: no script for '{}'", track);
            return;
        }
        if let Some(script) = self.scripts.load_script_for(&track) {
            inner.timeline.load(script, track);
        }
    }

    // === Connection confirmation ===

    fn spawn_session_listener(this: &Arc<Self>) {
        let events = this.session.subscribe_events();
        let weak = Arc::downgrade(this);
        let shutdown = Arc::clone(&this.listener_shutdown);
        let handle = thread::Builder::new()
            .name("lume-session-listen".into())
            .spawn(move || loop {
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
                match events.recv_timeout(Duration::from_millis(250)) {
                    Ok(SessionEvent::Connected(handle)) => {
                        let Some(this) = weak.upgrade() else { break };
                        log::info!("orchestrator: confirming connection to {}", handle.label());
                        EffectOrchestrator::play_confirmation(&this);
                    }
                    Ok(SessionEvent::Disconnected) => {
                        let Some(this) = weak.upgrade() else { break };
                        this.intent.set(None);
                    }
                    Err(flume::RecvTimeoutError::Timeout) => continue,
                    Err(flume::RecvTimeoutError::Disconnected) => break,
                }
            })
            .expect("Failed to spawn session listener thread");
        if let Ok(mut listener) = this.listener.lock() {
            *listener = Some(handle);
        }
    }

    /// One-shot confirmation burst: a Breath frame in the confirmation
    /// color, auto-stopped after the configured duration unless another
    /// source has taken the output in the meantime.
    fn play_confirmation(this: &Arc<Self>) {
        let generation = this.burst_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let settings = EffectSettings {
            color: this.config.confirmation_color,
            period: 32,
            ..EffectSettings::default_for(BaseEffect::Breath)
        };
        let frame = codec::encode_with_settings(&EffectKind::Base(BaseEffect::Breath), &settings);
        let sent = this.dispatch(
            &frame,
            TransmissionIntent {
                source: SourceTag::Connection,
                kind: Some(EffectKind::Base(BaseEffect::Breath)),
                color: settings.color,
                period: settings.period,
            },
        );
        if !sent {
            return;
        }

        let weak = Arc::downgrade(this);
        let duration = this.config.confirmation_duration;
        let spawned = thread::Builder::new()
            .name("lume-confirm-stop".into())
            .spawn(move || {
                thread::sleep(duration);
                let Some(this) = weak.upgrade() else { return };
                if this.burst_generation.load(Ordering::SeqCst) != generation {
                    return;
                }
                // Another source owning the output means the burst is over.
                let still_confirming = matches!(
                    this.intent.get(),
                    Some(TransmissionIntent {
                        source: SourceTag::Connection,
                        ..
                    })
                );
                if !still_confirming {
                    return;
                }
                let off = codec::encode(
                    &EffectKind::Base(BaseEffect::Off),
                    Color::BLACK,
                    Color::BLACK,
                    0,
                    0,
                );
                if this.sink.dispatch(&off) {
                    this.intent.set(None);
                    this.inner().timeline.mark_output_stale();
                }
            });
        if let Err(e) = spawned {
            log::warn!("orchestrator: failed to spawn confirmation stop: {}", e);
        }
    }
}

impl Drop for EffectOrchestrator {
    fn drop(&mut self) {
        self.listener_shutdown.store(true, Ordering::Relaxed);
        if let Ok(mut listener) = self.listener.lock() {
            if let Some(handle) = listener.take() {
                let _ = handle.join();
            }
        }
    }
}
