//! Engine Configuration
//!
//! All tunable constants of the playback engine live here and can be
//! overridden from a JSON file. Missing fields fall back to defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ReverieError};
use crate::segment::LayerName;

// ============================================================================
// Defaults
// ============================================================================

/// Default processing sample rate
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Lowest sample rate the processing context accepts
pub const MIN_SAMPLE_RATE: u32 = 8000;

/// Highest sample rate the processing context accepts
pub const MAX_SAMPLE_RATE: u32 = 192000;

// ============================================================================
// Sections
// ============================================================================

/// Segment queue pacing and ducking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Fixed part of the pause between two segments
    pub gap_base_secs: f64,
    /// Upper bound of the random part added to the pause
    pub gap_jitter_secs: f64,
    /// Fraction of the configured bed level kept while the voice speaks
    pub duck_factor: f32,
    /// Ramp used when ducking the bed before a segment
    pub duck_ramp_secs: f64,
    /// Ramp used when restoring the bed after a segment
    pub restore_ramp_secs: f64,
    /// Progress tick period
    pub progress_interval_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            gap_base_secs: 2.0,
            gap_jitter_secs: 0.8,
            duck_factor: 0.6,
            duck_ramp_secs: 0.3,
            restore_ramp_secs: 1.5,
            progress_interval_ms: 100,
        }
    }
}

/// User-configured level of every layer (0.0 to 1.0)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerLevels {
    pub voice: f32,
    pub atmosphere: f32,
    pub resonance: f32,
    pub texture: f32,
}

impl Default for LayerLevels {
    fn default() -> Self {
        Self {
            voice: 1.0,
            atmosphere: 0.5,
            resonance: 0.15,
            texture: 0.35,
        }
    }
}

impl LayerLevels {
    /// Level configured for a layer
    pub fn get(&self, layer: LayerName) -> f32 {
        match layer {
            LayerName::Voice => self.voice,
            LayerName::Atmosphere => self.atmosphere,
            LayerName::Resonance => self.resonance,
            LayerName::Texture => self.texture,
        }
    }

    /// Set the level for a layer, clamped to 0.0..=1.0
    pub fn set(&mut self, layer: LayerName, value: f32) {
        let value = value.clamp(0.0, 1.0);
        match layer {
            LayerName::Voice => self.voice = value,
            LayerName::Atmosphere => self.atmosphere = value,
            LayerName::Resonance => self.resonance = value,
            LayerName::Texture => self.texture = value,
        }
    }
}

/// Layer gain behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerConfig {
    /// Ramp used when a caller does not specify one
    pub default_ramp_secs: f64,
    /// Shortest ramp ever scheduled; a zero ramp is raised to this
    pub min_ramp_secs: f64,
    pub levels: LayerLevels,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            default_ramp_secs: 0.5,
            min_ramp_secs: 0.005,
            levels: LayerLevels::default(),
        }
    }
}

/// Binaural entrainment start settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinauralConfig {
    /// Left-ear carrier frequency
    pub base_hz: f32,
    /// Beat frequency at session start (beta range)
    pub start_beat_hz: f32,
}

impl Default for BinauralConfig {
    fn default() -> Self {
        Self {
            base_hz: 110.0,
            start_beat_hz: 14.0,
        }
    }
}

/// Pink-noise fallback bed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextureConfig {
    pub duration_secs: f64,
    /// Loudness every generated buffer is normalized to
    pub target_rms_db: f32,
}

impl Default for TextureConfig {
    fn default() -> Self {
        Self {
            duration_secs: 2.0,
            target_rms_db: -18.0,
        }
    }
}

/// Output rendering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub block_ms: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self { block_ms: 20 }
    }
}

// ============================================================================
// Engine Config
// ============================================================================

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sample_rate: u32,
    pub player: PlayerConfig,
    pub mixer: MixerConfig,
    pub binaural: BinauralConfig,
    pub texture: TextureConfig,
    pub render: RenderConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            player: PlayerConfig::default(),
            mixer: MixerConfig::default(),
            binaural: BinauralConfig::default(),
            texture: TextureConfig::default(),
            render: RenderConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Parse and validate a configuration from JSON text
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every value is usable by the engine
    pub fn validate(&self) -> Result<()> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            return Err(invalid(format!(
                "sample_rate {} outside {}..={}",
                self.sample_rate, MIN_SAMPLE_RATE, MAX_SAMPLE_RATE
            )));
        }
        if self.player.gap_base_secs < 0.0 || self.player.gap_jitter_secs < 0.0 {
            return Err(invalid("segment gap must not be negative"));
        }
        if !(0.0..=1.0).contains(&self.player.duck_factor) {
            return Err(invalid("duck_factor must be between 0 and 1"));
        }
        if self.player.progress_interval_ms == 0 {
            return Err(invalid("progress_interval_ms must be positive"));
        }
        if self.mixer.min_ramp_secs <= 0.0 {
            return Err(invalid("min_ramp_secs must be positive"));
        }
        if self.binaural.base_hz <= 0.0 || self.binaural.start_beat_hz <= 0.0 {
            return Err(invalid("binaural frequencies must be positive"));
        }
        if self.texture.duration_secs <= 0.0 {
            return Err(invalid("texture duration must be positive"));
        }
        if self.render.block_ms == 0 {
            return Err(invalid("render block_ms must be positive"));
        }
        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> ReverieError {
    ReverieError::InvalidConfig {
        reason: reason.into(),
    }
}
