//! Audio Engine Module
//!
//! Core audio plumbing shared by every layer:
//! - Decoded audio buffers and WAV container I/O
//! - Parameter automation
//! - The processing context and its clock
//! - Real-time rendering into output sinks

pub mod buffer;
pub mod context;
pub mod io;
pub mod param;
pub mod render;

pub use buffer::{db_to_linear, linear_to_db, AudioBuffer, ChannelLayout};
pub use context::{AudioContext, ContextState};
pub use io::{decode_wav, encode_wav, export_wav, pcm16_to_wav};
pub use param::{AudioParam, Automation, SharedParam};
pub use render::{AudioSink, MemorySink, NullSink, RenderDriver, WavSink};
