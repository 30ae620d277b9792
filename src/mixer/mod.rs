//! Layer Mixer
//!
//! Four named layers (voice, atmosphere, resonance, texture) feeding one
//! master output. Each layer has at most one source and a gain parameter;
//! every volume change goes through a scheduled ramp so starting, stopping
//! and ducking never click.

mod levels;
mod source;

pub use levels::{ducked_level, scaled_target};
pub use source::{BufferSource, LayerSource, ProceduralSource, SourceKind};

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::config::MixerConfig;
use crate::engine::{AudioBuffer, AudioContext, AudioParam};
use crate::segment::LayerName;

/// Mixer shared between the player, the synthesizers and the render driver
pub type SharedMixer = Arc<Mutex<LayerMixer>>;

#[derive(Debug)]
struct ActiveSource {
    id: u64,
    source: LayerSource,
}

#[derive(Debug)]
struct LayerSlot {
    gain: AudioParam,
    active: Option<ActiveSource>,
}

/// Owns the layers of one session
#[derive(Debug)]
pub struct LayerMixer {
    context: AudioContext,
    slots: Vec<LayerSlot>,
    default_ramp_secs: f64,
    min_ramp_secs: f64,
    next_source_id: u64,
    scratch: Vec<f32>,
}

impl LayerMixer {
    /// Create a mixer with every layer empty and silent
    pub fn new(context: AudioContext, config: &MixerConfig) -> Self {
        let slots = LayerName::ALL
            .iter()
            .map(|_| LayerSlot {
                gain: AudioParam::gain(0.0),
                active: None,
            })
            .collect();

        Self {
            context,
            slots,
            default_ramp_secs: config.default_ramp_secs,
            min_ramp_secs: config.min_ramp_secs,
            next_source_id: 1,
            scratch: Vec::new(),
        }
    }

    pub fn into_shared(self) -> SharedMixer {
        Arc::new(Mutex::new(self))
    }

    pub fn context(&self) -> &AudioContext {
        &self.context
    }

    // ========================================================================
    // Sources
    // ========================================================================

    /// Replace the layer's source with a decoded buffer
    ///
    /// The prior source is released first. The gain rises from silence to
    /// `volume` over the minimum ramp, superseding any ramp in flight.
    /// Returns an id identifying this source.
    pub fn play_buffer(
        &mut self,
        layer: LayerName,
        buffer: Arc<AudioBuffer>,
        volume: f32,
        looping: bool,
    ) -> u64 {
        self.play_buffer_from(layer, buffer, volume, looping, 0.0)
    }

    /// Like `play_buffer`, starting `offset_secs` into the buffer
    pub fn play_buffer_from(
        &mut self,
        layer: LayerName,
        buffer: Arc<AudioBuffer>,
        volume: f32,
        looping: bool,
        offset_secs: f64,
    ) -> u64 {
        let now = self.context.current_time();
        let source = BufferSource::new(buffer, looping, now, offset_secs);
        self.install(layer, LayerSource::Buffer(source), volume, now)
    }

    /// Replace the layer's source with a procedural generator
    pub fn play_procedural<F>(&mut self, layer: LayerName, factory: F, volume: f32) -> u64
    where
        F: FnOnce(&AudioContext) -> Box<dyn ProceduralSource>,
    {
        let now = self.context.current_time();
        let source = factory(&self.context);
        self.install(layer, LayerSource::Procedural(source), volume, now)
    }

    fn install(&mut self, layer: LayerName, source: LayerSource, volume: f32, now: f64) -> u64 {
        self.stop_layer(layer);

        let id = self.next_source_id;
        self.next_source_id += 1;

        let min_ramp = self.min_ramp_secs;
        let slot = &mut self.slots[layer.index()];
        slot.gain
            .set_target_from(now, 0.0, volume.clamp(0.0, 1.0), min_ramp);
        debug!(%layer, id, kind = ?source.kind(), volume, "layer source started");
        slot.active = Some(ActiveSource { id, source });
        id
    }

    /// Halt and release the layer's source
    ///
    /// Returns false if the layer was already empty.
    pub fn stop_layer(&mut self, layer: LayerName) -> bool {
        match self.slots[layer.index()].active.take() {
            Some(active) => {
                debug!(%layer, id = active.id, "layer source stopped");
                true
            }
            None => false,
        }
    }

    /// Stop every layer
    pub fn stop_all(&mut self) {
        for layer in LayerName::ALL {
            self.stop_layer(layer);
        }
    }

    pub fn is_active(&self, layer: LayerName) -> bool {
        self.slots[layer.index()].active.is_some()
    }

    /// Id of the source on a layer, if any
    pub fn source_id(&self, layer: LayerName) -> Option<u64> {
        self.slots[layer.index()].active.as_ref().map(|a| a.id)
    }

    pub fn source_kind(&self, layer: LayerName) -> Option<SourceKind> {
        self.slots[layer.index()]
            .active
            .as_ref()
            .map(|a| a.source.kind())
    }

    /// Layer carrying the background bed
    ///
    /// The texture layer stands in for the atmosphere when no recording is
    /// playing.
    pub fn bed_layer(&self) -> LayerName {
        if !self.is_active(LayerName::Atmosphere) && self.is_active(LayerName::Texture) {
            LayerName::Texture
        } else {
            LayerName::Atmosphere
        }
    }

    // ========================================================================
    // Volume
    // ========================================================================

    /// Ramp the layer's gain to `target` (clamped to 0.0..=1.0)
    ///
    /// Ramps shorter than the configured minimum, including zero, are
    /// raised to it; the gain is never written directly.
    pub fn set_volume(&mut self, layer: LayerName, target: f32, ramp_secs: f64) {
        let now = self.context.current_time();
        let ramp = ramp_secs.max(self.min_ramp_secs);
        let target = target.clamp(0.0, 1.0);
        self.slots[layer.index()].gain.set_target(now, target, ramp);
        debug!(%layer, target, ramp, "layer volume ramp");
    }

    /// Ramp with the default duration
    pub fn fade_to(&mut self, layer: LayerName, target: f32) {
        self.set_volume(layer, target, self.default_ramp_secs);
    }

    /// Current gain of a layer
    pub fn volume(&self, layer: LayerName) -> f32 {
        self.slots[layer.index()]
            .gain
            .value_at(self.context.current_time())
    }

    /// The layer's gain automation, for inspection
    pub fn gain(&self, layer: LayerName) -> &AudioParam {
        &self.slots[layer.index()].gain
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    /// Mix every layer into `out` (interleaved stereo) from `start_time`
    ///
    /// One-shot sources that have played out are released afterwards.
    pub fn render(&mut self, start_time: f64, out: &mut [f32]) {
        out.fill(0.0);
        let sample_rate = self.context.sample_rate();
        let step = 1.0 / sample_rate as f64;
        let frames = out.len() / 2;
        let end_time = start_time + frames as f64 * step;

        self.scratch.resize(out.len(), 0.0);
        for slot in &mut self.slots {
            let Some(active) = slot.active.as_mut() else {
                continue;
            };
            active
                .source
                .render(start_time, sample_rate, &mut self.scratch);

            for (i, (mixed, frame)) in out
                .chunks_exact_mut(2)
                .zip(self.scratch.chunks_exact(2))
                .enumerate()
            {
                let gain = slot.gain.value_at(start_time + i as f64 * step);
                mixed[0] += frame[0] * gain;
                mixed[1] += frame[1] * gain;
            }

            if active.source.is_finished_at(end_time) {
                debug!(id = active.id, "one-shot source ended");
                slot.active = None;
            }
        }

        for sample in out.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }
    }
}
