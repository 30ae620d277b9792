//! Playback Controller
//!
//! Composition root of a meditation session. Owns the processing context
//! and wires the queue player, the mixer, the binaural tone and the
//! atmosphere bed together for one session at a time.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::{EngineConfig, LayerLevels, MixerConfig};
use crate::engine::{AudioContext, AudioSink, RenderDriver};
use crate::error::Result;
use crate::mixer::{LayerMixer, SharedMixer};
use crate::player::{PlaybackObserver, PlaybackSnapshot, SegmentQueuePlayer};
use crate::prefs::{volume_key, PreferenceStore};
use crate::segment::{LayerName, Segment};
use crate::source::{decode_bytes, AudioFetcher, SegmentSource, SoundscapeStore};
use crate::synth::{BinauralSynthesizer, TextureSynthesizer};

/// Where the session's background bed came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BedSource {
    /// A stored soundscape recording on the atmosphere layer
    Soundscape(String),
    /// Generated pink noise on the texture layer
    Texture,
}

struct Session {
    mixer: SharedMixer,
    player: SegmentQueuePlayer,
    binaural: BinauralSynthesizer,
    source: Arc<SegmentSource>,
    driver: RenderDriver,
    bed: BedSource,
}

/// Runs meditation sessions
pub struct PlaybackController {
    config: EngineConfig,
    fetcher: Arc<dyn AudioFetcher>,
    soundscapes: Arc<dyn SoundscapeStore>,
    prefs: Arc<dyn PreferenceStore>,
    context: Option<AudioContext>,
    session: Option<Session>,
}

impl PlaybackController {
    pub fn new(
        config: EngineConfig,
        fetcher: Arc<dyn AudioFetcher>,
        soundscapes: Arc<dyn SoundscapeStore>,
        prefs: Arc<dyn PreferenceStore>,
    ) -> Self {
        Self {
            config,
            fetcher,
            soundscapes,
            prefs,
            context: None,
            session: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Make sure a running processing context exists
    ///
    /// Creates the context on first use or after teardown; otherwise
    /// resumes it if suspended. Call from a user action on platforms that
    /// gate audio output behind one.
    ///
    /// # Errors
    /// `Context` if the context cannot be created or resumed.
    pub fn initialize(&mut self) -> Result<AudioContext> {
        if let Some(context) = self.context.as_ref().filter(|c| !c.is_closed()) {
            context.resume()?;
            return Ok(context.clone());
        }

        let context = AudioContext::new(self.config.sample_rate)?;
        info!(sample_rate = self.config.sample_rate, "audio context initialized");
        self.context = Some(context.clone());
        Ok(context)
    }

    pub fn context(&self) -> Option<&AudioContext> {
        self.context.as_ref()
    }

    /// Tear down any prior session and start a new one
    ///
    /// # Arguments
    /// * `segments` - Initial queue, possibly empty when `streaming`
    /// * `atmosphere_id` - Soundscape to loop under the voice; generated
    ///   texture is used when absent or unavailable
    /// * `streaming` - Whether more segments will be appended
    /// * `observer` - Receives progress, segment changes and completion
    /// * `sink` - Where the rendered mix goes
    ///
    /// # Errors
    /// * `Context` - No processing context could be started
    /// * `NoSegments` - Empty queue while not streaming
    pub async fn load_and_start_session(
        &mut self,
        segments: Vec<Segment>,
        atmosphere_id: Option<&str>,
        streaming: bool,
        observer: impl PlaybackObserver + 'static,
        sink: Box<dyn AudioSink>,
    ) -> Result<()> {
        self.teardown().await;
        let context = self.initialize()?;
        let levels = self.user_levels();

        let mixer_config = MixerConfig {
            levels,
            ..self.config.mixer.clone()
        };
        let mixer = LayerMixer::new(context.clone(), &mixer_config).into_shared();

        let binaural = BinauralSynthesizer::new(context.clone(), Arc::clone(&mixer));
        binaural.start(
            self.config.binaural.base_hz,
            self.config.binaural.start_beat_hz,
            levels.resonance,
        );

        let bed = self.start_bed(&mixer, atmosphere_id, &levels).await;

        let driver = RenderDriver::spawn(
            context.clone(),
            Arc::clone(&mixer),
            sink,
            Duration::from_millis(self.config.render.block_ms),
        );
        let source = Arc::new(SegmentSource::new(Arc::clone(&self.fetcher)));
        let player = SegmentQueuePlayer::spawn(
            context,
            Arc::clone(&mixer),
            Arc::clone(&source),
            Some(binaural.clone()),
            self.config.player.clone(),
            levels,
        );

        self.session = Some(Session {
            mixer,
            player,
            binaural,
            source,
            driver,
            bed,
        });

        let started = match self.session.as_ref() {
            Some(session) => session.player.play_queue(segments, streaming, observer).await,
            None => Ok(()),
        };
        if let Err(e) = started {
            warn!(error = %e, "session could not start");
            self.teardown().await;
            return Err(e);
        }

        info!("session started");
        Ok(())
    }

    async fn start_bed(
        &self,
        mixer: &SharedMixer,
        atmosphere_id: Option<&str>,
        levels: &LayerLevels,
    ) -> BedSource {
        if let Some(id) = atmosphere_id {
            let loaded = match self.soundscapes.load(id).await {
                Ok(bytes) => decode_bytes(bytes).await,
                Err(e) => Err(e),
            };
            match loaded {
                Ok(buffer) => {
                    if let Ok(mut mixer) = mixer.lock() {
                        mixer.play_buffer(LayerName::Atmosphere, buffer, levels.atmosphere, true);
                    }
                    info!(soundscape = id, "atmosphere bed started");
                    return BedSource::Soundscape(id.to_string());
                }
                Err(e) => warn!(soundscape = id, error = %e, "soundscape unavailable, using texture"),
            }
        }

        let texture = TextureSynthesizer::new(self.config.sample_rate, self.config.texture.target_rms_db)
            .generate(self.config.texture.duration_secs);
        if let Ok(mut mixer) = mixer.lock() {
            mixer.play_buffer(LayerName::Texture, Arc::new(texture), levels.texture, true);
        }
        info!("texture bed started");
        BedSource::Texture
    }

    /// Stop everything and release the context; safe to call repeatedly
    pub async fn teardown(&mut self) {
        let session = self.session.take();
        if let Some(session) = session.as_ref() {
            session.player.stop().await;
            session.binaural.stop();
            if let Ok(mut mixer) = session.mixer.lock() {
                mixer.stop_all();
            }
            session.source.clear_cache();
        }

        if let Some(context) = self.context.take() {
            context.close();
        }

        if let Some(session) = session {
            session.driver.join().await;
            info!("session torn down");
        }
    }

    // ========================================================================
    // Transport
    // ========================================================================

    /// Pause the queue, then freeze every layer
    pub async fn pause(&self) {
        if let Some(session) = self.session.as_ref() {
            session.player.pause().await;
        }
        if let Some(context) = self.context.as_ref() {
            context.suspend();
        }
    }

    /// Unfreeze the layers, then continue the queue
    ///
    /// # Errors
    /// `Context` if the context was closed.
    pub async fn resume(&self) -> Result<()> {
        if let Some(context) = self.context.as_ref() {
            context.resume()?;
        }
        if let Some(session) = self.session.as_ref() {
            session.player.resume().await;
        }
        Ok(())
    }

    /// Hard-reset the queue; the bed and tone keep playing until teardown
    pub async fn stop(&self) {
        if let Some(session) = self.session.as_ref() {
            session.player.stop().await;
        }
    }

    pub async fn append_to_queue(&self, segments: Vec<Segment>) {
        match self.session.as_ref() {
            Some(session) => session.player.append_to_queue(segments).await,
            None => warn!(count = segments.len(), "append without a session"),
        }
    }

    pub async fn set_streaming(&self, streaming: bool) {
        if let Some(session) = self.session.as_ref() {
            session.player.set_streaming(streaming).await;
        }
    }

    /// Set and remember a layer's volume
    ///
    /// # Errors
    /// Propagates preference storage failures; the level is applied first.
    pub async fn set_volume(&self, layer: LayerName, value: f32) -> Result<()> {
        let value = value.clamp(0.0, 1.0);
        if let Some(session) = self.session.as_ref() {
            session.player.set_level(layer, value).await;
        }
        self.prefs.set(&volume_key(layer), value)
    }

    /// Glide the binaural beat; false without a running tone
    pub fn shift_beat_frequency(&self, beat_hz: f32, transition_secs: f64) -> bool {
        self.session
            .as_ref()
            .map(|s| s.binaural.shift_beat_frequency(beat_hz, transition_secs))
            .unwrap_or(false)
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    pub fn state(&self) -> PlaybackSnapshot {
        self.session
            .as_ref()
            .map(|s| s.player.state())
            .unwrap_or_default()
    }

    /// Wait until the current session completes or is stopped
    pub async fn finished(&self) -> PlaybackSnapshot {
        match self.session.as_ref() {
            Some(session) => session.player.finished().await,
            None => PlaybackSnapshot::default(),
        }
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn mixer(&self) -> Option<SharedMixer> {
        self.session.as_ref().map(|s| Arc::clone(&s.mixer))
    }

    pub fn binaural(&self) -> Option<&BinauralSynthesizer> {
        self.session.as_ref().map(|s| &s.binaural)
    }

    pub fn bed_source(&self) -> Option<&BedSource> {
        self.session.as_ref().map(|s| &s.bed)
    }

    /// Configured levels overridden by stored preferences
    pub fn user_levels(&self) -> LayerLevels {
        let mut levels = self.config.mixer.levels;
        for layer in LayerName::ALL {
            if let Some(value) = self.prefs.get(&volume_key(layer)) {
                levels.set(layer, value);
            }
        }
        levels
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        // Lets the render driver drain and finish its sink
        if let Some(context) = self.context.as_ref() {
            context.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::MemoryPreferences;
    use crate::source::{DirectorySoundscapes, MemoryFetcher};

    fn controller(prefs: Arc<MemoryPreferences>) -> PlaybackController {
        PlaybackController::new(
            EngineConfig::default(),
            Arc::new(MemoryFetcher::new()),
            Arc::new(DirectorySoundscapes::new("/nonexistent/soundscapes")),
            prefs,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_is_idempotent() {
        let mut controller = controller(Arc::new(MemoryPreferences::new()));
        let first = controller.initialize().unwrap();
        first.suspend();
        let second = controller.initialize().unwrap();
        assert!(second.is_running());
        assert!(first.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_recreates_after_teardown() {
        let mut controller = controller(Arc::new(MemoryPreferences::new()));
        let first = controller.initialize().unwrap();
        controller.teardown().await;
        assert!(first.is_closed());
        controller.teardown().await;

        let second = controller.initialize().unwrap();
        assert!(second.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_sample_rate_is_context_error() {
        let mut config = EngineConfig::default();
        config.sample_rate = 1000;
        let mut controller = PlaybackController::new(
            config,
            Arc::new(MemoryFetcher::new()),
            Arc::new(DirectorySoundscapes::new("/nonexistent")),
            Arc::new(MemoryPreferences::new()),
        );
        assert_eq!(controller.initialize().unwrap_err().error_code(), "CONTEXT_ERROR");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stored_preferences_seed_levels() {
        let prefs = Arc::new(MemoryPreferences::new());
        prefs.set("volume.atmosphere", 0.9).unwrap();
        let controller = controller(prefs);
        let levels = controller.user_levels();
        assert_eq!(levels.atmosphere, 0.9);
        assert_eq!(levels.voice, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_volume_without_session_persists() {
        let prefs = Arc::new(MemoryPreferences::new());
        let controller = controller(Arc::clone(&prefs));
        controller.set_volume(LayerName::Texture, 1.7).await.unwrap();
        assert_eq!(prefs.get("volume.texture"), Some(1.0));
        assert!(!controller.shift_beat_frequency(4.0, 1.0));
    }
}
