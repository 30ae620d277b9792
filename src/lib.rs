//! Reverie - Progressive Meditation Playback Engine
//!
//! Reverie plays a guided meditation as it is being generated: spoken
//! segments arrive one at a time and play in order over a continuous
//! background made of three more layers.
//!
//! # Architecture
//!
//! The mix has four layers feeding one output:
//! - Voice: the queued spoken segments
//! - Atmosphere: a looping soundscape recording
//! - Resonance: a binaural entrainment tone
//! - Texture: generated pink noise, standing in when no soundscape exists
//!
//! The [`player::SegmentQueuePlayer`] drives the voice layer and runs each
//! segment's sonic instructions; the [`controller::PlaybackController`]
//! owns the processing context and wires a session together.

pub mod cli;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod mixer;
pub mod player;
pub mod prefs;
pub mod segment;
pub mod source;
pub mod synth;

pub use config::EngineConfig;
pub use controller::{BedSource, PlaybackController};
pub use error::{Result, ReverieError};
pub use mixer::{LayerMixer, SharedMixer};
pub use player::{PlaybackObserver, PlaybackSnapshot, PlayerPhase, SegmentQueuePlayer};
pub use segment::{InstructionAction, LayerName, Segment, SonicInstruction};
