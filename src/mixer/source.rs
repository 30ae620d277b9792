//! Layer Sources
//!
//! What a layer can play: a decoded buffer (once or looped) or a procedural
//! generator. Both render interleaved stereo at context time.

use std::fmt;
use std::sync::Arc;

use crate::engine::AudioBuffer;

/// Type tag of the source occupying a layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Fetched and decoded audio
    Sampled,
    /// Generated on the fly (oscillators, noise)
    Procedural,
}

/// A sound generated while rendering
pub trait ProceduralSource: Send {
    /// Overwrite `out` (interleaved stereo) with frames starting at
    /// context time `start_time`
    fn render(&mut self, start_time: f64, sample_rate: u32, out: &mut [f32]);
}

/// A decoded buffer scheduled on the context timeline
#[derive(Debug, Clone)]
pub struct BufferSource {
    buffer: Arc<AudioBuffer>,
    looping: bool,
    /// Context time the source was started
    start_time: f64,
    /// Seconds into the buffer playback begins at
    offset: f64,
}

impl BufferSource {
    pub fn new(buffer: Arc<AudioBuffer>, looping: bool, start_time: f64, offset: f64) -> Self {
        Self {
            buffer,
            looping,
            start_time,
            offset: offset.max(0.0),
        }
    }

    pub fn buffer(&self) -> &Arc<AudioBuffer> {
        &self.buffer
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// Fractional buffer position at context time `t`, None when silent
    fn position_at(&self, t: f64) -> Option<f64> {
        let elapsed = t - self.start_time;
        if elapsed < 0.0 {
            return None;
        }
        let len = self.buffer.len() as f64;
        if len == 0.0 {
            return None;
        }
        let position = (elapsed + self.offset) * self.buffer.sample_rate as f64;
        if self.looping {
            Some(position % len)
        } else if position < len {
            Some(position)
        } else {
            None
        }
    }

    /// True once a one-shot source has played past its last sample
    pub fn is_finished_at(&self, t: f64) -> bool {
        if self.looping {
            return false;
        }
        let remaining = self.buffer.duration_secs() - self.offset;
        t - self.start_time >= remaining
    }

    pub fn render(&self, start_time: f64, sample_rate: u32, out: &mut [f32]) {
        let step = 1.0 / sample_rate as f64;
        for (i, frame) in out.chunks_exact_mut(2).enumerate() {
            let t = start_time + i as f64 * step;
            let (left, right) = match self.position_at(t) {
                Some(position) => self.buffer.frame_at(position, self.looping),
                None => (0.0, 0.0),
            };
            frame[0] = left;
            frame[1] = right;
        }
    }
}

/// Whatever currently occupies a layer
pub enum LayerSource {
    Buffer(BufferSource),
    Procedural(Box<dyn ProceduralSource>),
}

impl LayerSource {
    pub fn kind(&self) -> SourceKind {
        match self {
            LayerSource::Buffer(_) => SourceKind::Sampled,
            LayerSource::Procedural(_) => SourceKind::Procedural,
        }
    }

    pub fn render(&mut self, start_time: f64, sample_rate: u32, out: &mut [f32]) {
        match self {
            LayerSource::Buffer(source) => source.render(start_time, sample_rate, out),
            LayerSource::Procedural(source) => source.render(start_time, sample_rate, out),
        }
    }

    pub fn is_finished_at(&self, t: f64) -> bool {
        match self {
            LayerSource::Buffer(source) => source.is_finished_at(t),
            LayerSource::Procedural(_) => false,
        }
    }
}

impl fmt::Debug for LayerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerSource::Buffer(source) => f.debug_tuple("Buffer").field(source).finish(),
            LayerSource::Procedural(_) => f.write_str("Procedural"),
        }
    }
}
