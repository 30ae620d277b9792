//! Controller Tests
//!
//! End-to-end tests for session lifecycle: bed selection, binaural start,
//! pause/resume of the whole graph, volume persistence and teardown.

use std::sync::Arc;
use std::time::Duration;

use approx::assert_relative_eq;
use tokio::time::sleep;

use reverie::config::EngineConfig;
use reverie::engine::{encode_wav, AudioBuffer, ChannelLayout, ContextState, MemorySink, NullSink};
use reverie::player::{ChannelObserver, NoopObserver, PlayerEvent, PlayerPhase};
use reverie::prefs::{MemoryPreferences, PreferenceStore};
use reverie::segment::{LayerName, Segment};
use reverie::source::{DirectorySoundscapes, MemoryFetcher};
use reverie::{BedSource, PlaybackController};

const RATE: u32 = 8000;

/// Helper to create a WAV file of constant tone
fn create_wav(seconds: f64) -> Vec<u8> {
    let num_samples = (seconds * RATE as f64) as usize;
    let mut buffer = AudioBuffer::new(num_samples, ChannelLayout::Mono, RATE);
    buffer.channel_mut(0).fill(0.25);
    encode_wav(&buffer).unwrap()
}

fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.sample_rate = RATE;
    config.player.gap_jitter_secs = 0.0;
    config
}

struct Setup {
    controller: PlaybackController,
    prefs: Arc<MemoryPreferences>,
    _soundscape_dir: tempfile::TempDir,
}

fn setup() -> Setup {
    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.insert("a", create_wav(1.0));
    fetcher.insert("b", create_wav(1.0));

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("rain.wav"), create_wav(2.0)).unwrap();
    std::fs::write(dir.path().join("broken.wav"), b"RIFF but not really").unwrap();

    let prefs = Arc::new(MemoryPreferences::new());
    let controller = PlaybackController::new(
        test_config(),
        fetcher,
        Arc::new(DirectorySoundscapes::new(dir.path())),
        prefs.clone(),
    );

    Setup {
        controller,
        prefs,
        _soundscape_dir: dir,
    }
}

fn segments() -> Vec<Segment> {
    vec![Segment::new("a", "first"), Segment::new("b", "second")]
}

// === Session Start Tests ===

#[tokio::test(start_paused = true)]
async fn test_session_without_atmosphere_uses_texture() {
    let mut s = setup();
    s.controller
        .load_and_start_session(segments(), None, false, NoopObserver, Box::new(NullSink))
        .await
        .unwrap();

    assert_eq!(s.controller.bed_source(), Some(&BedSource::Texture));
    let mixer = s.controller.mixer().unwrap();
    let mixer = mixer.lock().unwrap();
    assert!(mixer.is_active(LayerName::Texture));
    assert!(!mixer.is_active(LayerName::Atmosphere));
    assert_eq!(mixer.bed_layer(), LayerName::Texture);
}

#[tokio::test(start_paused = true)]
async fn test_session_with_soundscape_uses_atmosphere() {
    let mut s = setup();
    s.controller
        .load_and_start_session(segments(), Some("rain"), false, NoopObserver, Box::new(NullSink))
        .await
        .unwrap();

    assert_eq!(
        s.controller.bed_source(),
        Some(&BedSource::Soundscape("rain".to_string()))
    );
    let mixer = s.controller.mixer().unwrap();
    let mixer = mixer.lock().unwrap();
    assert!(mixer.is_active(LayerName::Atmosphere));
    assert!(!mixer.is_active(LayerName::Texture));
}

#[tokio::test(start_paused = true)]
async fn test_unusable_soundscape_falls_back_to_texture() {
    let mut s = setup();
    for id in ["missing", "broken"] {
        s.controller
            .load_and_start_session(segments(), Some(id), false, NoopObserver, Box::new(NullSink))
            .await
            .unwrap();
        assert_eq!(s.controller.bed_source(), Some(&BedSource::Texture));
    }
}

#[tokio::test(start_paused = true)]
async fn test_binaural_starts_at_alert_beat() {
    let mut s = setup();
    s.controller
        .load_and_start_session(segments(), None, false, NoopObserver, Box::new(NullSink))
        .await
        .unwrap();

    let binaural = s.controller.binaural().unwrap();
    assert!(binaural.is_running());
    assert_relative_eq!(binaural.current_beat_frequency().unwrap(), 14.0, epsilon = 1e-3);

    assert!(s.controller.shift_beat_frequency(3.0, 1.0));
    sleep(Duration::from_millis(1500)).await;
    let binaural = s.controller.binaural().unwrap();
    assert_relative_eq!(binaural.current_beat_frequency().unwrap(), 3.0, epsilon = 1e-3);
}

#[tokio::test(start_paused = true)]
async fn test_empty_session_is_rejected() {
    let mut s = setup();
    let err = s
        .controller
        .load_and_start_session(Vec::new(), None, false, NoopObserver, Box::new(NullSink))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "NO_SEGMENTS");
    assert!(!s.controller.has_session());
}

// === Lifecycle Tests ===

#[tokio::test(start_paused = true)]
async fn test_session_plays_to_completion_and_renders() {
    let mut s = setup();
    let sink = MemorySink::new();
    let (observer, mut events) = ChannelObserver::new();
    s.controller
        .load_and_start_session(segments(), None, false, observer, Box::new(sink.clone()))
        .await
        .unwrap();

    let state = s.controller.finished().await;
    assert_eq!(state.phase, PlayerPhase::Complete);
    assert_relative_eq!(state.progress_percent, 100.0);

    let mut changes = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, PlayerEvent::SegmentChanged { .. }) {
            changes += 1;
        }
    }
    assert_eq!(changes, 2);

    s.controller.teardown().await;
    let samples = sink.samples();
    // Two 1s segments and a 2s gap at 8 kHz stereo
    assert!(samples.len() >= (4.0 * RATE as f64) as usize * 2 * 9 / 10);
    assert!(samples.iter().any(|x| x.abs() > 0.01));
}

#[tokio::test(start_paused = true)]
async fn test_pause_suspends_whole_graph() {
    let mut s = setup();
    s.controller
        .load_and_start_session(segments(), None, false, NoopObserver, Box::new(NullSink))
        .await
        .unwrap();
    sleep(Duration::from_millis(400)).await;

    s.controller.pause().await;
    let context = s.controller.context().unwrap().clone();
    assert_eq!(context.state(), ContextState::Suspended);
    assert!(s.controller.state().is_paused);

    let frozen = context.current_time();
    sleep(Duration::from_secs(5)).await;
    assert_relative_eq!(context.current_time(), frozen);

    s.controller.resume().await.unwrap();
    assert_eq!(context.state(), ContextState::Running);
    assert_eq!(s.controller.state().phase, PlayerPhase::PlayingSegment { index: 0 });
}

#[tokio::test(start_paused = true)]
async fn test_set_volume_persists_and_applies() {
    let mut s = setup();
    s.controller
        .load_and_start_session(segments(), None, false, NoopObserver, Box::new(NullSink))
        .await
        .unwrap();

    s.controller
        .set_volume(LayerName::Resonance, 0.4)
        .await
        .unwrap();
    assert_eq!(s.prefs.get("volume.resonance"), Some(0.4));

    sleep(Duration::from_secs(2)).await;
    let mixer = s.controller.mixer().unwrap();
    let volume = mixer.lock().unwrap().volume(LayerName::Resonance);
    assert_relative_eq!(volume, 0.4, epsilon = 0.01);
}

#[tokio::test(start_paused = true)]
async fn test_stored_volume_seeds_next_session() {
    let mut s = setup();
    s.prefs.set("volume.texture", 0.8).unwrap();
    s.controller
        .load_and_start_session(segments(), None, false, NoopObserver, Box::new(NullSink))
        .await
        .unwrap();
    assert_eq!(s.controller.user_levels().texture, 0.8);

    // Stopping the queue lifts the ducking back to the stored level
    s.controller.stop().await;
    sleep(Duration::from_secs(3)).await;
    let mixer = s.controller.mixer().unwrap();
    let volume = mixer.lock().unwrap().volume(LayerName::Texture);
    assert_relative_eq!(volume, 0.8, epsilon = 0.01);
}

#[tokio::test(start_paused = true)]
async fn test_teardown_is_idempotent() {
    let mut s = setup();
    s.controller
        .load_and_start_session(segments(), None, true, NoopObserver, Box::new(NullSink))
        .await
        .unwrap();
    let context = s.controller.context().unwrap().clone();

    s.controller.teardown().await;
    s.controller.teardown().await;

    assert!(context.is_closed());
    assert!(!s.controller.has_session());
    assert!(s.controller.mixer().is_none());
    assert_eq!(s.controller.state().phase, PlayerPhase::Idle);

    // Appending after teardown is harmless
    s.controller.append_to_queue(segments()).await;
}

#[tokio::test(start_paused = true)]
async fn test_new_session_replaces_previous() {
    let mut s = setup();
    s.controller
        .load_and_start_session(segments(), None, true, NoopObserver, Box::new(NullSink))
        .await
        .unwrap();
    let first = s.controller.context().unwrap().clone();

    s.controller
        .load_and_start_session(segments(), Some("rain"), false, NoopObserver, Box::new(NullSink))
        .await
        .unwrap();
    let second = s.controller.context().unwrap().clone();

    assert!(first.is_closed());
    assert!(second.is_running());
    assert_eq!(s.controller.state().total_segments, 2);
    assert!(!s.controller.state().streaming);
}
