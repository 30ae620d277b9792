//! Texture Synthesizer
//!
//! Pink-noise bed used when a session has no soundscape recording. The
//! buffer is short and meant to be looped, so its end is blended into its
//! start and the loop point carries no audible step.

use rand::Rng;

use crate::engine::{db_to_linear, AudioBuffer, ChannelLayout};

/// Highest peak a normalized buffer may reach
const PEAK_CEILING: f32 = 0.95;

/// Overlap blended across the loop point
const CROSSFADE_SECS: f64 = 0.05;

/// Tail samples eased onto the first sample
const BOUNDARY_SAMPLES: usize = 256;

/// Samples the filter runs before output is kept
const WARMUP_SAMPLES: usize = 4096;

/// Paul Kellet's pink filter: white noise through parallel one-pole lowpasses
#[derive(Debug, Default)]
struct PinkFilter {
    b: [f32; 7],
}

impl PinkFilter {
    fn next(&mut self, white: f32) -> f32 {
        let b = &mut self.b;
        b[0] = 0.99886 * b[0] + white * 0.0555179;
        b[1] = 0.99332 * b[1] + white * 0.0750759;
        b[2] = 0.96900 * b[2] + white * 0.1538520;
        b[3] = 0.86650 * b[3] + white * 0.3104856;
        b[4] = 0.55000 * b[4] + white * 0.5329522;
        b[5] = -0.7616 * b[5] - white * 0.0168980;
        let pink = b[0] + b[1] + b[2] + b[3] + b[4] + b[5] + b[6] + white * 0.5362;
        b[6] = white * 0.115926;
        pink * 0.11
    }
}

/// Generates loopable pink-noise buffers
#[derive(Debug, Clone)]
pub struct TextureSynthesizer {
    sample_rate: u32,
    target_rms_db: f32,
}

impl TextureSynthesizer {
    pub fn new(sample_rate: u32, target_rms_db: f32) -> Self {
        Self {
            sample_rate,
            target_rms_db,
        }
    }

    /// Generate a stereo pink-noise buffer of `duration_secs`
    pub fn generate(&self, duration_secs: f64) -> AudioBuffer {
        self.generate_with(duration_secs, &mut rand::thread_rng())
    }

    /// Generate using a caller-provided random source
    pub fn generate_with<R: Rng + ?Sized>(&self, duration_secs: f64, rng: &mut R) -> AudioBuffer {
        let len = ((duration_secs.max(0.0) * self.sample_rate as f64) as usize).max(1);
        let crossfade = ((CROSSFADE_SECS * self.sample_rate as f64) as usize).min(len / 4);

        let mut buffer = AudioBuffer::new(len, ChannelLayout::Stereo, self.sample_rate);
        for ch in 0..buffer.channels() {
            let raw = pink_noise(len + crossfade, rng);
            let channel = buffer.channel_mut(ch);
            channel.copy_from_slice(&raw[..len]);

            // The overflow past `len` continues the tail, so fading it in
            // over the head makes sample 0 follow sample len-1.
            for k in 0..crossfade {
                let w = k as f32 / crossfade as f32;
                channel[k] = raw[k] * w + raw[len + k] * (1.0 - w);
            }
        }

        self.normalize(&mut buffer);

        let boundary = BOUNDARY_SAMPLES.min(len / 8);
        for ch in 0..buffer.channels() {
            ease_tail_onto_head(buffer.channel_mut(ch), boundary);
        }

        buffer
    }

    /// Scale to the target loudness without exceeding the peak ceiling
    fn normalize(&self, buffer: &mut AudioBuffer) {
        let rms = buffer.rms();
        if rms <= f32::EPSILON {
            return;
        }
        let mut gain = db_to_linear(self.target_rms_db) / rms;
        let peak = buffer.peak() * gain;
        if peak > PEAK_CEILING {
            gain *= PEAK_CEILING / peak;
        }
        buffer.scale(gain);
    }
}

fn pink_noise<R: Rng + ?Sized>(len: usize, rng: &mut R) -> Vec<f32> {
    let mut filter = PinkFilter::default();
    for _ in 0..WARMUP_SAMPLES {
        filter.next(rng.gen_range(-1.0..1.0));
    }
    (0..len)
        .map(|_| filter.next(rng.gen_range(-1.0..1.0)))
        .collect()
}

/// Pull the last `count` samples progressively toward the first sample
fn ease_tail_onto_head(channel: &mut [f32], count: usize) {
    let len = channel.len();
    if count == 0 || len < 2 {
        return;
    }
    let head = channel[0];
    for k in 0..count {
        let idx = len - count + k;
        let w = (k + 1) as f32 / (count + 1) as f32;
        channel[idx] = channel[idx] * (1.0 - w) + head * w;
    }
}
