//! Segments and Sonic Instructions
//!
//! A segment is one immutable unit of spoken content produced by the
//! generation pipeline. Its instructions run when its playback starts.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ReverieError;

// ============================================================================
// Layer Names
// ============================================================================

/// The four layers every session owns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerName {
    /// Spoken segments
    Voice,
    /// Soundscape recording
    Atmosphere,
    /// Binaural entrainment tone
    #[serde(alias = "binaural")]
    Resonance,
    /// Procedural noise bed, stands in for the atmosphere
    Texture,
}

impl LayerName {
    /// Every layer, in mixer slot order
    pub const ALL: [LayerName; 4] = [
        LayerName::Voice,
        LayerName::Atmosphere,
        LayerName::Resonance,
        LayerName::Texture,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LayerName::Voice => "voice",
            LayerName::Atmosphere => "atmosphere",
            LayerName::Resonance => "resonance",
            LayerName::Texture => "texture",
        }
    }

    /// Slot index inside the mixer
    pub(crate) fn index(&self) -> usize {
        match self {
            LayerName::Voice => 0,
            LayerName::Atmosphere => 1,
            LayerName::Resonance => 2,
            LayerName::Texture => 3,
        }
    }
}

impl fmt::Display for LayerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LayerName {
    type Err = ReverieError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "voice" => Ok(LayerName::Voice),
            "atmosphere" | "soundscape" => Ok(LayerName::Atmosphere),
            "resonance" | "binaural" => Ok(LayerName::Resonance),
            "texture" | "noise" => Ok(LayerName::Texture),
            other => Err(ReverieError::InvalidConfig {
                reason: format!("unknown layer '{}'", other),
            }),
        }
    }
}

// ============================================================================
// Sonic Instructions
// ============================================================================

/// What a sonic instruction does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionAction {
    /// Ramp a layer's volume to `value` (0.0 to 1.0)
    #[serde(alias = "volume", alias = "fade")]
    FadeVolume,
    /// Glide the binaural beat to `value` Hz
    #[serde(alias = "binaural", alias = "frequency")]
    SetBinauralFrequency,
    /// Placeholder that does nothing
    #[serde(alias = "noop")]
    Wait,
}

/// A scheduled adjustment to a layer, relative to its segment's start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SonicInstruction {
    pub action: InstructionAction,
    #[serde(default = "default_instruction_layer")]
    pub layer: LayerName,
    /// Volume (0.0 to 1.0) or beat frequency in Hz, depending on `action`
    #[serde(default)]
    pub value: f32,
    /// Transition time in seconds
    #[serde(default, alias = "duration", alias = "durationSecs")]
    pub duration_secs: f64,
}

fn default_instruction_layer() -> LayerName {
    LayerName::Atmosphere
}

impl SonicInstruction {
    /// Volume fade on `layer`
    pub fn fade(layer: LayerName, value: f32, duration_secs: f64) -> Self {
        Self {
            action: InstructionAction::FadeVolume,
            layer,
            value,
            duration_secs,
        }
    }

    /// Binaural beat glide
    pub fn binaural(beat_hz: f32, duration_secs: f64) -> Self {
        Self {
            action: InstructionAction::SetBinauralFrequency,
            layer: LayerName::Resonance,
            value: beat_hz,
            duration_secs,
        }
    }
}

// ============================================================================
// Segment
// ============================================================================

/// One unit of spoken content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    /// Unique within a session; also the decode cache key
    pub id: String,
    /// URL, `file://` URL, or local path of the encoded audio
    #[serde(alias = "audio", alias = "url")]
    pub audio_reference: String,
    /// Transcript text for display
    #[serde(default)]
    pub text: String,
    /// Duration estimate in seconds, replaced by the decoded length once known
    #[serde(default, alias = "estimatedDurationSecs")]
    pub estimated_duration: f64,
    #[serde(default)]
    pub instructions: Vec<SonicInstruction>,
}

impl Segment {
    /// Create a segment with a fresh random id
    pub fn new(audio_reference: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            audio_reference: audio_reference.into(),
            text: text.into(),
            estimated_duration: 0.0,
            instructions: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_estimated_duration(mut self, secs: f64) -> Self {
        self.estimated_duration = secs.max(0.0);
        self
    }

    pub fn with_instruction(mut self, instruction: SonicInstruction) -> Self {
        self.instructions.push(instruction);
        self
    }
}

/// Parse a JSON array of segments (a session manifest)
pub fn parse_manifest(json: &str) -> crate::Result<Vec<Segment>> {
    let segments: Vec<Segment> = serde_json::from_str(json)?;
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_layer_name_parse() {
        assert_eq!("voice".parse::<LayerName>().unwrap(), LayerName::Voice);
        assert_eq!("Binaural".parse::<LayerName>().unwrap(), LayerName::Resonance);
        assert_eq!("noise".parse::<LayerName>().unwrap(), LayerName::Texture);
        assert!("drums".parse::<LayerName>().is_err());
    }

    #[test]
    fn test_layer_indices_are_distinct() {
        let mut seen: Vec<usize> = LayerName::ALL.iter().map(|l| l.index()).collect();
        seen.sort();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_new_segment_gets_unique_id() {
        let a = Segment::new("a.wav", "Breathe in");
        let b = Segment::new("a.wav", "Breathe in");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_parse_manifest() {
        let json = r#"[
            {
                "id": "intro",
                "audioReference": "https://cdn.example/intro.wav",
                "text": "Welcome.",
                "estimatedDuration": 4.5,
                "instructions": [
                    { "action": "volume", "layer": "atmosphere", "value": 0.2, "duration": 3 },
                    { "action": "binaural", "value": 4, "durationSecs": 60 },
                    { "action": "wait" }
                ]
            },
            { "id": "body", "audio": "body.wav" }
        ]"#;

        let segments = parse_manifest(json).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].estimated_duration, 4.5);
        assert_eq!(
            segments[0].instructions[0],
            SonicInstruction::fade(LayerName::Atmosphere, 0.2, 3.0)
        );
        assert_eq!(
            segments[0].instructions[1].action,
            InstructionAction::SetBinauralFrequency
        );
        assert_eq!(segments[0].instructions[2].action, InstructionAction::Wait);
        assert_eq!(segments[1].audio_reference, "body.wav");
        assert!(segments[1].instructions.is_empty());
    }
}
