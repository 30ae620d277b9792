//! Binaural Synthesizer
//!
//! Two sine tones, one per ear: the left at a fixed base frequency, the
//! right at base + beat. The right tone's frequency is an automated
//! parameter, so the beat can glide while the tone keeps running.

use std::f64::consts::TAU;
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::engine::{AudioContext, AudioParam, SharedParam};
use crate::mixer::{ProceduralSource, SharedMixer};
use crate::segment::LayerName;

/// Peak amplitude of each tone before layer gain
const TONE_AMPLITUDE: f32 = 0.5;

/// Smallest beat offset accepted
pub const MIN_BEAT_HZ: f32 = 0.1;

/// Shortest glide; an instant change still ramps over this
const MIN_GLIDE_SECS: f64 = 0.005;

/// The running oscillator pair
struct BinauralTone {
    base_hz: f64,
    right_hz: SharedParam,
    phase_left: f64,
    phase_right: f64,
}

impl ProceduralSource for BinauralTone {
    fn render(&mut self, start_time: f64, sample_rate: u32, out: &mut [f32]) {
        let sr = sample_rate as f64;
        let step = 1.0 / sr;
        let param = match self.right_hz.lock() {
            Ok(param) => param.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };

        for (i, frame) in out.chunks_exact_mut(2).enumerate() {
            let right_hz = param.value_at(start_time + i as f64 * step) as f64;

            frame[0] = self.phase_left.sin() as f32 * TONE_AMPLITUDE;
            frame[1] = self.phase_right.sin() as f32 * TONE_AMPLITUDE;

            // Phase accumulation keeps the waveform continuous through glides
            self.phase_left = (self.phase_left + TAU * self.base_hz / sr) % TAU;
            self.phase_right = (self.phase_right + TAU * right_hz / sr) % TAU;
        }
    }
}

#[derive(Debug, Default)]
struct BinauralState {
    base_hz: f32,
    right_hz: Option<SharedParam>,
}

/// Controls the entrainment tone on the resonance layer
///
/// Clones control the same tone.
#[derive(Debug, Clone)]
pub struct BinauralSynthesizer {
    context: AudioContext,
    mixer: SharedMixer,
    state: Arc<Mutex<BinauralState>>,
}

impl BinauralSynthesizer {
    pub fn new(context: AudioContext, mixer: SharedMixer) -> Self {
        Self {
            context,
            mixer,
            state: Arc::new(Mutex::new(BinauralState::default())),
        }
    }

    /// Start the tone pair on the resonance layer
    ///
    /// Replaces a tone that is already running.
    pub fn start(&self, base_hz: f32, beat_hz: f32, volume: f32) {
        let base_hz = base_hz.max(MIN_BEAT_HZ);
        let beat_hz = beat_hz.max(MIN_BEAT_HZ);
        let right_hz = AudioParam::frequency(base_hz + beat_hz).into_shared();

        let tone_param = Arc::clone(&right_hz);
        if let Ok(mut mixer) = self.mixer.lock() {
            mixer.play_procedural(
                LayerName::Resonance,
                move |_| {
                    Box::new(BinauralTone {
                        base_hz: base_hz as f64,
                        right_hz: tone_param,
                        phase_left: 0.0,
                        phase_right: 0.0,
                    })
                },
                volume,
            );
        }

        if let Ok(mut state) = self.state.lock() {
            state.base_hz = base_hz;
            state.right_hz = Some(right_hz);
        }
        info!(base_hz, beat_hz, "binaural tone started");
    }

    /// Glide the beat to `beat_hz` over `transition_secs`
    ///
    /// The right-ear frequency ramps linearly from its current value; the
    /// tone is never restarted. Returns false if no tone is running.
    pub fn shift_beat_frequency(&self, beat_hz: f32, transition_secs: f64) -> bool {
        let Ok(state) = self.state.lock() else {
            return false;
        };
        let Some(right_hz) = state.right_hz.as_ref() else {
            debug!("beat shift ignored, binaural tone not running");
            return false;
        };

        let target = state.base_hz + beat_hz.max(MIN_BEAT_HZ);
        let now = self.context.current_time();
        if let Ok(mut param) = right_hz.lock() {
            param.linear_ramp(now, target, transition_secs.max(MIN_GLIDE_SECS));
        }
        debug!(beat_hz, transition_secs, "binaural beat glide scheduled");
        true
    }

    /// Beat frequency right now, None if not running
    pub fn current_beat_frequency(&self) -> Option<f32> {
        let state = self.state.lock().ok()?;
        let right_hz = state.right_hz.as_ref()?;
        let right = right_hz.lock().ok()?.value_at(self.context.current_time());
        Some(right - state.base_hz)
    }

    pub fn base_frequency(&self) -> Option<f32> {
        let state = self.state.lock().ok()?;
        state.right_hz.as_ref().map(|_| state.base_hz)
    }

    /// The right-ear frequency automation, for inspection
    pub fn right_frequency(&self) -> Option<SharedParam> {
        self.state.lock().ok()?.right_hz.clone()
    }

    pub fn is_running(&self) -> bool {
        self.state
            .lock()
            .map(|s| s.right_hz.is_some())
            .unwrap_or(false)
    }

    /// Stop the tone and release the resonance layer
    pub fn stop(&self) {
        let was_running = self
            .state
            .lock()
            .map(|mut state| state.right_hz.take().is_some())
            .unwrap_or(false);
        if was_running {
            if let Ok(mut mixer) = self.mixer.lock() {
                mixer.stop_layer(LayerName::Resonance);
            }
        }
    }
}
