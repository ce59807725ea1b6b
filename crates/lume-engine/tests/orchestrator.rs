//! End-to-end orchestrator tests over a scripted gateway.
//!
//! Drives the real session manager, parameter store, and orchestrator against
//! an in-memory gateway that records every outbound frame, and asserts the
//! arbitration and dispatch behavior visible at the radio boundary.

use lume_engine::{
    codec, BaseEffect, Color, EffectId, EffectKind, EffectOrchestrator, EffectSettings,
    LightingScript, MediaPlayer, OrchestratorConfig, PositionTicker, ScriptEntry, ScriptStore,
    SourceTag, SpectralSample, TrackId,
};
use lume_link::{
    ConnectionSessionManager, DeviceHandle, DiscoveryFilter, GatewayError, LinkEvent,
    SessionConfig, TransmissionGateway,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const OP_OFF: u8 = 0x00;
const OP_ON: u8 = 0x01;
const OP_STROBE: u8 = 0x02;
const OP_BREATH: u8 = 0x04;
const OP_LIST_BASE: u8 = 0x10;

/// Gateway fake that records every frame and can be told to fail sends.
struct RecordingGateway {
    link_tx: flume::Sender<LinkEvent>,
    link_rx: flume::Receiver<LinkEvent>,
    bonded: Mutex<Vec<DeviceHandle>>,
    sent: Mutex<Vec<Vec<u8>>>,
    fail_sends: AtomicBool,
}

impl RecordingGateway {
    fn new() -> Self {
        let (link_tx, link_rx) = flume::unbounded();
        Self {
            link_tx,
            link_rx,
            bonded: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
        }
    }

    fn set_bonded(&self, handles: Vec<DeviceHandle>) {
        *self.bonded.lock().unwrap() = handles;
    }

    fn frames(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    fn link_up(&self, address: &str) {
        self.link_tx
            .send(LinkEvent::Up {
                address: address.into(),
            })
            .unwrap();
    }
}

impl TransmissionGateway for RecordingGateway {
    fn bonded_devices(&self) -> Result<Vec<DeviceHandle>, GatewayError> {
        Ok(self.bonded.lock().unwrap().clone())
    }

    fn discover(
        &self,
        filter: &DiscoveryFilter,
        _window: Duration,
    ) -> Result<Vec<DeviceHandle>, GatewayError> {
        Ok(self
            .bonded
            .lock()
            .unwrap()
            .iter()
            .filter(|h| filter.matches(&h.address))
            .cloned()
            .collect())
    }

    fn connect(&self, _handle: &DeviceHandle, _timeout: Duration) -> Result<(), GatewayError> {
        Ok(())
    }

    fn disconnect(&self, _handle: &DeviceHandle) -> Result<(), GatewayError> {
        Ok(())
    }

    fn send(&self, _handle: &DeviceHandle, frame: &[u8]) -> Result<(), GatewayError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(GatewayError::Unreachable("accessory out of range".into()));
        }
        self.sent.lock().unwrap().push(frame.to_vec());
        Ok(())
    }

    fn link_events(&self) -> flume::Receiver<LinkEvent> {
        self.link_rx.clone()
    }
}

#[derive(Default)]
struct MapScriptStore {
    scripts: HashMap<TrackId, LightingScript>,
}

impl MapScriptStore {
    fn with(mut self, track: &str, script: LightingScript) -> Self {
        self.scripts.insert(track.to_string(), script);
        self
    }
}

impl ScriptStore for MapScriptStore {
    fn has_script_for(&self, track: &TrackId) -> bool {
        self.scripts.contains_key(track)
    }

    fn load_script_for(&self, track: &TrackId) -> Option<LightingScript> {
        self.scripts.get(track).cloned()
    }
}

struct Rig {
    gateway: Arc<RecordingGateway>,
    session: Arc<ConnectionSessionManager>,
    orchestrator: Arc<EffectOrchestrator>,
}

fn rig_with(scripts: MapScriptStore, config: OrchestratorConfig) -> Rig {
    let _ = env_logger::builder().is_test(true).try_init();
    let gateway = Arc::new(RecordingGateway::new());
    let session = Arc::new(ConnectionSessionManager::new(
        gateway.clone() as Arc<dyn TransmissionGateway>,
        SessionConfig::default(),
    ));
    let store = Arc::new(lume_engine::EffectParameterStore::new(Arc::new(
        lume_engine::MemoryBackend::default(),
    )));
    let orchestrator = EffectOrchestrator::new(
        Arc::clone(&session),
        store,
        Arc::new(scripts),
        gateway.clone() as Arc<dyn TransmissionGateway>,
        config,
    );
    Rig {
        gateway,
        session,
        orchestrator,
    }
}

fn rig() -> Rig {
    rig_with(MapScriptStore::default(), OrchestratorConfig::default())
}

/// Bring the link up and wait until the session reflects it.
fn connect(rig: &Rig) {
    rig.gateway.link_up("aa:bb");
    wait_until(|| rig.session.state().is_connected());
}

/// Connect and swallow the confirmation burst so tests start from a clean
/// frame log.
fn connect_quietly(rig: &Rig) {
    connect(rig);
    wait_until(|| !rig.gateway.frames().is_empty());
    rig.gateway.clear();
}

fn wait_until(pred: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !pred() {
        assert!(Instant::now() < deadline, "timed out waiting for condition");
        thread::sleep(Duration::from_millis(5));
    }
}

fn script_two_frames() -> LightingScript {
    LightingScript::new(vec![
        ScriptEntry {
            offset_millis: 0,
            frame: codec::encode(
                &EffectKind::Base(BaseEffect::On),
                Color::new(255, 0, 0),
                Color::BLACK,
                0,
                0,
            ),
        },
        ScriptEntry {
            offset_millis: 5000,
            frame: codec::encode(
                &EffectKind::Base(BaseEffect::On),
                Color::new(0, 0, 255),
                Color::BLACK,
                0,
                0,
            ),
        },
    ])
    .unwrap()
}

fn sample(bands: &[f32]) -> SpectralSample {
    SpectralSample {
        band_energies: bands.to_vec(),
    }
}

#[test]
fn test_connection_confirmation_burst_then_auto_off() {
    let confirmation = Color::new(10, 220, 130);
    let rig = rig_with(
        MapScriptStore::default(),
        OrchestratorConfig {
            confirmation_color: confirmation,
            confirmation_duration: Duration::from_millis(50),
            ..OrchestratorConfig::default()
        },
    );

    connect(&rig);
    wait_until(|| !rig.gateway.frames().is_empty());

    let frames = rig.gateway.frames();
    assert_eq!(frames[0][1], OP_BREATH);
    assert_eq!(&frames[0][2..5], &[10, 220, 130]);

    // After the burst window the orchestrator turns the output off by itself.
    wait_until(|| rig.gateway.frames().len() >= 2);
    let frames = rig.gateway.frames();
    assert_eq!(frames[1][1], OP_OFF);
    wait_until(|| rig.orchestrator.intent_reader().get().is_none());
}

#[test]
fn test_auto_connect_plays_exactly_one_confirmation_burst() {
    let rig = rig_with(
        MapScriptStore::default(),
        OrchestratorConfig {
            confirmation_duration: Duration::from_millis(50),
            ..OrchestratorConfig::default()
        },
    );
    rig.gateway
        .set_bonded(vec![DeviceHandle::new("aa:bb").with_rssi(-40)]);

    rig.session.start_auto_connect();
    wait_until(|| rig.session.state().is_connected());
    wait_until(|| rig.gateway.frames().len() >= 2);
    thread::sleep(Duration::from_millis(150));

    let frames = rig.gateway.frames();
    let bursts = frames.iter().filter(|f| f[1] == OP_BREATH).count();
    assert_eq!(bursts, 1, "expected exactly one confirmation burst");
    assert_eq!(frames[0][1], OP_BREATH);
    assert_eq!(frames[1][1], OP_OFF);
    assert_eq!(frames.len(), 2, "nothing beyond burst and auto-off");
}

#[test]
fn test_manual_selection_survives_confirmation_window() {
    let rig = rig_with(
        MapScriptStore::default(),
        OrchestratorConfig {
            confirmation_duration: Duration::from_millis(40),
            ..OrchestratorConfig::default()
        },
    );

    connect(&rig);
    wait_until(|| !rig.gateway.frames().is_empty());

    // User picks an effect while the burst is still running: the pending
    // auto-off must not fire and clobber the selection.
    assert!(rig.orchestrator.play_manual(EffectKind::Base(BaseEffect::On)));
    thread::sleep(Duration::from_millis(120));

    let frames = rig.gateway.frames();
    assert!(
        frames.iter().skip(1).all(|f| f[1] != OP_OFF),
        "confirmation auto-off fired over a manual selection: {:?}",
        frames
    );
    assert_eq!(rig.orchestrator.active_source(), Some(SourceTag::Manual));
}

#[test]
fn test_send_while_disconnected_is_dropped_and_reported() {
    let rig = rig();

    assert!(!rig.orchestrator.play_manual(EffectKind::Base(BaseEffect::On)));
    assert!(rig.gateway.frames().is_empty());
    assert_eq!(rig.orchestrator.active_source(), None);
}

#[test]
fn test_failed_send_does_not_record_selection() {
    let rig = rig_with(
        MapScriptStore::default(),
        OrchestratorConfig {
            confirmation_duration: Duration::from_millis(20),
            ..OrchestratorConfig::default()
        },
    );
    connect_quietly(&rig);
    // Let the confirmation auto-off clear the Connection intent so the
    // assertions below see only the effect of the failed manual send.
    wait_until(|| rig.orchestrator.intent_reader().get().is_none());

    rig.gateway.fail_sends.store(true, Ordering::SeqCst);
    assert!(!rig.orchestrator.play_manual(EffectKind::Base(BaseEffect::On)));
    assert_eq!(rig.orchestrator.active_source(), None);
    assert_eq!(rig.orchestrator.intent_reader().get(), None);
}

#[test]
fn test_effect_list_slot_reselect_toggles_off() {
    let rig = rig();
    connect_quietly(&rig);

    assert!(rig.orchestrator.select_effect_list_slot(3));
    let frames = rig.gateway.frames();
    assert_eq!(frames.last().unwrap()[1], OP_LIST_BASE + 3);
    assert_eq!(rig.orchestrator.active_source(), Some(SourceTag::Manual));

    // Second tap on the same slot stops it.
    assert!(rig.orchestrator.select_effect_list_slot(3));
    let frames = rig.gateway.frames();
    assert_eq!(frames.last().unwrap()[1], OP_OFF);
    assert_eq!(rig.orchestrator.active_source(), None);
}

#[test]
fn test_effect_list_slot_out_of_range_rejected() {
    let rig = rig();
    connect_quietly(&rig);

    assert!(!rig.orchestrator.select_effect_list_slot(10));
    assert!(rig.gateway.frames().is_empty());
}

#[test]
fn test_settings_update_resends_active_manual_effect() {
    let rig = rig();
    connect_quietly(&rig);

    assert!(rig
        .orchestrator
        .play_manual(EffectKind::Base(BaseEffect::Strobe)));
    rig.gateway.clear();

    let settings = EffectSettings {
        color: Color::new(200, 10, 10),
        period: 9,
        ..EffectSettings::default_for(BaseEffect::Strobe)
    };
    assert!(rig
        .orchestrator
        .update_settings(&EffectId::Base(BaseEffect::Strobe), settings));

    let frames = rig.gateway.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0][1], OP_STROBE);
    assert_eq!(&frames[0][2..5], &[200, 10, 10]);
    assert_eq!(frames[0][8], 9);
}

#[test]
fn test_settings_update_for_inactive_effect_sends_nothing() {
    let rig = rig();
    connect_quietly(&rig);

    assert!(rig
        .orchestrator
        .play_manual(EffectKind::Base(BaseEffect::Strobe)));
    rig.gateway.clear();

    assert!(rig.orchestrator.update_settings(
        &EffectId::Base(BaseEffect::Blink),
        EffectSettings::default_for(BaseEffect::Blink),
    ));
    assert!(rig.gateway.frames().is_empty());
}

#[test]
fn test_timeline_drives_output_from_position_ticks() {
    let rig = rig_with(
        MapScriptStore::default().with("track-1", script_two_frames()),
        OrchestratorConfig::default(),
    );
    connect_quietly(&rig);

    rig.orchestrator.track_changed(Some("track-1".into()));
    rig.orchestrator.set_playback_active(true);

    rig.orchestrator.on_position_tick(0);
    rig.orchestrator.on_position_tick(3000);
    rig.orchestrator.on_position_tick(5000);

    let frames = rig.gateway.frames();
    assert_eq!(frames.len(), 2, "dedup must suppress the middle tick");
    assert_eq!(&frames[0][2..5], &[255, 0, 0]);
    assert_eq!(&frames[1][2..5], &[0, 0, 255]);
    assert_eq!(
        rig.orchestrator.intent_reader().get().map(|i| i.source),
        Some(SourceTag::Timeline)
    );
}

#[test]
fn test_seek_reasserts_timeline_frame() {
    let rig = rig_with(
        MapScriptStore::default().with("track-1", script_two_frames()),
        OrchestratorConfig::default(),
    );
    connect_quietly(&rig);

    rig.orchestrator.track_changed(Some("track-1".into()));
    rig.orchestrator.set_playback_active(true);
    rig.orchestrator.on_position_tick(6000);
    rig.gateway.clear();

    // Seek within the same segment still re-sends the owning frame.
    rig.orchestrator.on_seek(7000);
    let frames = rig.gateway.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(&frames[0][2..5], &[0, 0, 255]);
}

#[test]
fn test_manual_selection_suppresses_timeline_and_reactive() {
    let rig = rig_with(
        MapScriptStore::default().with("track-1", script_two_frames()),
        OrchestratorConfig::default(),
    );
    connect_quietly(&rig);

    rig.orchestrator.track_changed(Some("track-1".into()));
    rig.orchestrator.set_playback_active(true);
    assert!(rig.orchestrator.play_manual(EffectKind::Base(BaseEffect::On)));
    rig.gateway.clear();

    rig.orchestrator.on_position_tick(0);
    rig.orchestrator.on_spectral_sample(&sample(&[1.0, 0.5, 0.2, 0.1]));
    assert!(
        rig.gateway.frames().is_empty(),
        "automatic sources sent frames past an active manual selection"
    );

    // Clearing the selection hands the output back to the timeline.
    rig.orchestrator.stop_manual();
    rig.gateway.clear();
    rig.orchestrator.on_position_tick(0);
    assert_eq!(rig.gateway.frames().len(), 1);
}

#[test]
fn test_timeline_reasserts_after_manual_interlude() {
    let rig = rig_with(
        MapScriptStore::default().with("track-1", script_two_frames()),
        OrchestratorConfig::default(),
    );
    connect_quietly(&rig);

    rig.orchestrator.track_changed(Some("track-1".into()));
    rig.orchestrator.set_playback_active(true);
    rig.orchestrator.on_position_tick(6000);

    // A manual effect briefly takes the output, then releases it while
    // playback is still inside the same segment. The accessory is now
    // showing Off, so the segment's frame must fire again despite the
    // unchanged nearest-past index.
    assert!(rig.orchestrator.play_manual(EffectKind::Base(BaseEffect::On)));
    assert!(rig.orchestrator.stop_manual());
    rig.gateway.clear();

    rig.orchestrator.on_position_tick(7000);
    let frames = rig.gateway.frames();
    assert_eq!(frames.len(), 1, "segment frame must be re-asserted");
    assert_eq!(&frames[0][2..5], &[0, 0, 255]);

    // Dedup resumes once the accessory is back in sync.
    rig.orchestrator.on_position_tick(8000);
    assert_eq!(rig.gateway.frames().len(), 1);
}

#[test]
fn test_timeline_reasserts_after_reactive_interlude() {
    let rig = rig_with(
        MapScriptStore::default().with("track-1", script_two_frames()),
        OrchestratorConfig::default(),
    );
    connect_quietly(&rig);

    rig.orchestrator.track_changed(Some("track-1".into()));
    rig.orchestrator.set_playback_active(true);
    rig.orchestrator.on_position_tick(0);

    rig.orchestrator.set_audio_reactive(true);
    rig.orchestrator.on_spectral_sample(&sample(&[1.0, 0.5, 0.2, 0.1]));
    rig.orchestrator.set_audio_reactive(false);
    rig.gateway.clear();

    // Still inside the first segment: the reactive frames overwrote it, so
    // the handoff back must re-send it.
    rig.orchestrator.on_position_tick(1000);
    let frames = rig.gateway.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(&frames[0][2..5], &[255, 0, 0]);
}

#[test]
fn test_timeline_retries_frame_after_dropped_send() {
    let rig = rig_with(
        MapScriptStore::default().with("track-1", script_two_frames()),
        OrchestratorConfig::default(),
    );
    connect_quietly(&rig);

    rig.orchestrator.track_changed(Some("track-1".into()));
    rig.orchestrator.set_playback_active(true);
    rig.orchestrator.on_position_tick(0);
    rig.gateway.clear();

    // The segment-boundary send is dropped by the radio; the scheduler must
    // not count it as delivered.
    rig.gateway.fail_sends.store(true, Ordering::SeqCst);
    rig.orchestrator.on_position_tick(6000);
    assert!(rig.gateway.frames().is_empty());

    rig.gateway.fail_sends.store(false, Ordering::SeqCst);
    rig.orchestrator.on_position_tick(7000);
    let frames = rig.gateway.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(&frames[0][2..5], &[0, 0, 255]);
}

#[test]
fn test_audio_reactive_takes_precedence_over_timeline() {
    let rig = rig_with(
        MapScriptStore::default().with("track-1", script_two_frames()),
        OrchestratorConfig::default(),
    );
    connect_quietly(&rig);

    rig.orchestrator.track_changed(Some("track-1".into()));
    rig.orchestrator.set_audio_reactive(true);
    rig.orchestrator.set_playback_active(true);

    rig.orchestrator.on_position_tick(0);
    assert!(
        rig.gateway.frames().is_empty(),
        "timeline sent a frame while audio-reactive mode owns the output"
    );

    rig.orchestrator.on_spectral_sample(&sample(&[1.0, 0.5, 0.2, 0.1]));
    let frames = rig.gateway.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0][1], OP_ON);
    assert_eq!(
        rig.orchestrator.intent_reader().get().map(|i| i.source),
        Some(SourceTag::AudioReactive)
    );
}

#[test]
fn test_reactive_idle_while_paused() {
    let rig = rig();
    connect_quietly(&rig);

    rig.orchestrator.set_audio_reactive(true);
    rig.orchestrator.set_playback_active(false);
    rig.orchestrator.on_spectral_sample(&sample(&[1.0, 0.5]));
    assert!(rig.gateway.frames().is_empty());
}

#[test]
fn test_disabling_reactive_hands_back_to_script() {
    let rig = rig_with(
        MapScriptStore::default().with("track-1", script_two_frames()),
        OrchestratorConfig::default(),
    );
    connect_quietly(&rig);

    // Reactive mode is on when the track starts, so no script loads.
    rig.orchestrator.set_audio_reactive(true);
    rig.orchestrator.track_changed(Some("track-1".into()));
    rig.orchestrator.set_playback_active(true);

    // Turning it off mid-track picks the script up.
    rig.orchestrator.set_audio_reactive(false);
    rig.orchestrator.on_position_tick(0);
    let frames = rig.gateway.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(&frames[0][2..5], &[255, 0, 0]);
}

#[test]
fn test_playback_stop_discards_script() {
    let rig = rig_with(
        MapScriptStore::default().with("track-1", script_two_frames()),
        OrchestratorConfig::default(),
    );
    connect_quietly(&rig);

    rig.orchestrator.track_changed(Some("track-1".into()));
    rig.orchestrator.set_playback_active(true);
    rig.orchestrator.on_position_tick(0);

    rig.orchestrator.playback_stopped();
    rig.gateway.clear();
    rig.orchestrator.set_playback_active(true);
    rig.orchestrator.on_position_tick(0);
    assert!(rig.gateway.frames().is_empty());
    assert_eq!(rig.orchestrator.intent_reader().get(), None);
}

#[test]
fn test_track_change_replaces_script() {
    let rig = rig_with(
        MapScriptStore::default()
            .with("track-1", script_two_frames())
            .with(
                "track-2",
                LightingScript::new(vec![ScriptEntry {
                    offset_millis: 0,
                    frame: codec::encode(
                        &EffectKind::Base(BaseEffect::On),
                        Color::new(0, 255, 0),
                        Color::BLACK,
                        0,
                        0,
                    ),
                }])
                .unwrap(),
            ),
        OrchestratorConfig::default(),
    );
    connect_quietly(&rig);

    rig.orchestrator.track_changed(Some("track-1".into()));
    rig.orchestrator.set_playback_active(true);
    rig.orchestrator.on_position_tick(6000);
    rig.gateway.clear();

    rig.orchestrator.track_changed(Some("track-2".into()));
    rig.orchestrator.on_position_tick(0);
    let frames = rig.gateway.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(&frames[0][2..5], &[0, 255, 0]);
}

#[test]
fn test_preview_color_does_not_disturb_arbitration() {
    let rig = rig();
    connect_quietly(&rig);

    assert!(rig.orchestrator.play_manual(EffectKind::Base(BaseEffect::On)));
    rig.gateway.clear();

    assert!(rig.orchestrator.preview_color(Color::new(1, 2, 3)));
    let frames = rig.gateway.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(&frames[0][2..5], &[1, 2, 3]);
    assert_eq!(rig.orchestrator.active_source(), Some(SourceTag::Manual));
    assert_eq!(
        rig.orchestrator.intent_reader().get().map(|i| i.source),
        Some(SourceTag::Broadcast)
    );
}

#[test]
fn test_preview_restores_manual_selection() {
    let rig = rig_with(
        MapScriptStore::default(),
        OrchestratorConfig {
            preview_duration: Duration::from_millis(40),
            ..OrchestratorConfig::default()
        },
    );
    connect_quietly(&rig);

    assert!(rig.orchestrator.play_manual(EffectKind::Base(BaseEffect::On)));
    rig.gateway.clear();

    assert!(rig.orchestrator.preview_color(Color::new(1, 2, 3)));
    assert_eq!(
        rig.orchestrator.intent_reader().get().map(|i| i.source),
        Some(SourceTag::Broadcast)
    );

    // A manual selection has no next send of its own; after the hold the
    // orchestrator re-asserts it so the accessory matches the UI again.
    wait_until(|| rig.gateway.frames().len() >= 2);
    let frames = rig.gateway.frames();
    assert_eq!(frames[1][1], OP_ON);
    assert_eq!(&frames[1][2..5], &[255, 255, 255]);
    wait_until(|| {
        rig.orchestrator.intent_reader().get().map(|i| i.source) == Some(SourceTag::Manual)
    });
    assert_eq!(rig.orchestrator.active_source(), Some(SourceTag::Manual));
}

/// Minimal transport fake for the position ticker.
struct FakePlayer {
    position: AtomicU64,
    playing: AtomicBool,
    ended: AtomicBool,
}

impl MediaPlayer for FakePlayer {
    fn position_millis(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    fn duration_millis(&self) -> u64 {
        180_000
    }

    fn play(&self) {
        self.playing.store(true, Ordering::Relaxed);
    }

    fn pause(&self) {
        self.playing.store(false, Ordering::Relaxed);
    }

    fn seek_to(&self, position_millis: u64) {
        self.position.store(position_millis, Ordering::Relaxed);
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }

    fn playback_ended(&self) -> bool {
        self.ended.swap(false, Ordering::Relaxed)
    }
}

#[test]
fn test_position_ticker_drives_timeline() {
    let rig = rig_with(
        MapScriptStore::default().with("track-1", script_two_frames()),
        OrchestratorConfig::default(),
    );
    connect_quietly(&rig);

    rig.orchestrator.track_changed(Some("track-1".into()));
    let player = Arc::new(FakePlayer {
        position: AtomicU64::new(0),
        playing: AtomicBool::new(true),
        ended: AtomicBool::new(false),
    });
    let _ticker = PositionTicker::spawn(
        player.clone(),
        Arc::clone(&rig.orchestrator),
        Duration::from_millis(10),
    );

    wait_until(|| !rig.gateway.frames().is_empty());
    assert_eq!(&rig.gateway.frames()[0][2..5], &[255, 0, 0]);

    player.seek_to(6000);
    wait_until(|| rig.gateway.frames().len() >= 2);
    assert_eq!(&rig.gateway.frames()[1][2..5], &[0, 0, 255]);

    // End of track tears the timeline down.
    player.ended.store(true, Ordering::Relaxed);
    wait_until(|| rig.orchestrator.intent_reader().get().is_none());
}
