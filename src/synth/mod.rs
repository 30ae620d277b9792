//! Procedural Sound
//!
//! Sources that need no network: the binaural entrainment tone and the
//! pink-noise texture bed.

mod binaural;
mod texture;

pub use binaural::{BinauralSynthesizer, MIN_BEAT_HZ};
pub use texture::TextureSynthesizer;
