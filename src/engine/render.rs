//! Render Driver and Output Sinks
//!
//! The driver pulls mixed audio from the layer graph at real-time pace and
//! hands it to a sink, the same way a device callback would. It follows the
//! context clock: nothing is rendered while the context is suspended, and
//! the driver finishes its sink and exits once the context closes.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hound::WavWriter;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::engine::context::AudioContext;
use crate::engine::io::{to_i16, wav_io_error, wav_spec};
use crate::error::Result;
use crate::mixer::SharedMixer;

/// Destination for rendered interleaved stereo audio
pub trait AudioSink: Send {
    fn write(&mut self, frames: &[f32]) -> Result<()>;

    /// Flush and close; called once when rendering ends
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Discards everything
#[derive(Debug, Default)]
pub struct NullSink;

impl AudioSink for NullSink {
    fn write(&mut self, _frames: &[f32]) -> Result<()> {
        Ok(())
    }
}

/// Collects rendered samples in memory; clones share the same storage
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    samples: Arc<Mutex<Vec<f32>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything written so far (interleaved stereo)
    pub fn samples(&self) -> Vec<f32> {
        self.samples
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

impl AudioSink for MemorySink {
    fn write(&mut self, frames: &[f32]) -> Result<()> {
        if let Ok(mut samples) = self.samples.lock() {
            samples.extend_from_slice(frames);
        }
        Ok(())
    }
}

/// Writes 16-bit stereo WAV
pub struct WavSink {
    writer: Option<WavWriter<BufWriter<File>>>,
}

impl WavSink {
    pub fn create(path: &Path, sample_rate: u32) -> Result<Self> {
        let writer = WavWriter::create(path, wav_spec(2, sample_rate)).map_err(wav_io_error)?;
        Ok(Self {
            writer: Some(writer),
        })
    }
}

impl AudioSink for WavSink {
    fn write(&mut self, frames: &[f32]) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            for &sample in frames {
                writer.write_sample(to_i16(sample)).map_err(wav_io_error)?;
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().map_err(wav_io_error)?;
        }
        Ok(())
    }
}

/// Renders the mixer into a sink on a background task
#[derive(Debug)]
pub struct RenderDriver {
    handle: JoinHandle<()>,
}

impl RenderDriver {
    /// Start rendering from the context's current time
    pub fn spawn(
        context: AudioContext,
        mixer: SharedMixer,
        mut sink: Box<dyn AudioSink>,
        block: Duration,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let sample_rate = context.sample_rate() as f64;
            let mut cursor = context.current_time();
            let mut buffer = Vec::new();
            let mut ticker = tokio::time::interval(block);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let closed = context.is_closed();
                let target = context.current_time();

                let frames = ((target - cursor) * sample_rate).floor();
                if frames >= 1.0 {
                    let frames = frames as usize;
                    buffer.resize(frames * 2, 0.0);
                    match mixer.lock() {
                        Ok(mut mixer) => mixer.render(cursor, &mut buffer),
                        Err(_) => buffer.fill(0.0),
                    }
                    if let Err(e) = sink.write(&buffer) {
                        warn!(error = %e, "render sink rejected audio, stopping output");
                        break;
                    }
                    cursor += frames as f64 / sample_rate;
                }

                if closed {
                    break;
                }
            }

            if let Err(e) = sink.finish() {
                warn!(error = %e, "failed to finish render sink");
            }
            debug!(rendered_secs = cursor, "render driver stopped");
        });

        Self { handle }
    }

    /// Wait for the driver to drain after its context closed
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}
