//! Level arithmetic shared by instructions and ducking
//!
//! Kept free of mixer state so the scaling rules can be tested alone.

/// Volume actually applied for an instruction's raw target
///
/// Instruction values are relative to the level the listener configured
/// for the layer: a fade to 1.0 means "back to my setting", not full scale.
pub fn scaled_target(raw: f32, user_level: f32) -> f32 {
    (raw.clamp(0.0, 1.0) * user_level.clamp(0.0, 1.0)).clamp(0.0, 1.0)
}

/// Bed level while the voice is speaking
pub fn ducked_level(user_level: f32, duck_factor: f32) -> f32 {
    scaled_target(duck_factor, user_level)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use test_case::test_case;

    #[test_case(1.0, 0.5, 0.5 ; "full instruction returns user level")]
    #[test_case(0.5, 0.5, 0.25 ; "half instruction halves user level")]
    #[test_case(0.0, 0.8, 0.0 ; "silence stays silent")]
    #[test_case(2.0, 0.4, 0.4 ; "raw value above one is clamped")]
    #[test_case(-1.0, 0.4, 0.0 ; "negative raw value is clamped")]
    #[test_case(0.5, 3.0, 0.5 ; "user level above one is clamped")]
    fn test_scaled_target(raw: f32, user: f32, expected: f32) {
        assert_relative_eq!(scaled_target(raw, user), expected);
    }

    #[test]
    fn test_ducked_level() {
        assert_relative_eq!(ducked_level(0.5, 0.6), 0.3);
        assert_relative_eq!(ducked_level(0.0, 0.6), 0.0);
    }
}
