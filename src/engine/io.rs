//! Audio container I/O
//!
//! Decodes fetched WAV bytes into `AudioBuffer`s, wraps raw PCM16 speech
//! output in a WAV container, and exports rendered audio.
//!
//! Decoded audio keeps its own sample rate; sources read it at that rate.

use std::io::Cursor;
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::engine::buffer::{AudioBuffer, ChannelLayout};
use crate::error::{Result, ReverieError};

/// Decode WAV bytes into an AudioBuffer
///
/// # Errors
/// * `Decode` - The bytes are not a WAV file, use an unsupported sample
///   format, have more than two channels, or contain no samples
pub fn decode_wav(bytes: &[u8]) -> Result<AudioBuffer> {
    let reader = WavReader::new(Cursor::new(bytes)).map_err(|e| ReverieError::Decode {
        reason: format!("Failed to read WAV header: {}", e),
        source: Some(Box::new(e)),
    })?;

    let spec = reader.spec();
    let channels = spec.channels as usize;

    let layout = ChannelLayout::from_count(channels).ok_or_else(|| {
        ReverieError::decode(format!(
            "{}-channel audio (only mono/stereo supported)",
            channels
        ))
    })?;

    if spec.sample_rate == 0 {
        return Err(ReverieError::decode("WAV header declares a 0 Hz sample rate"));
    }

    let samples = read_samples_as_f32(reader, spec.bits_per_sample, spec.sample_format)?;
    if samples.len() < channels {
        return Err(ReverieError::decode("Audio contains no samples"));
    }

    // A truncated final frame is dropped rather than rejected
    let whole = samples.len() - samples.len() % channels;
    AudioBuffer::from_interleaved(&samples[..whole], layout, spec.sample_rate)
}

/// Wrap raw little-endian PCM16 into a WAV container
///
/// Speech synthesis services commonly return bare PCM; the decoder only
/// accepts containers, so producers pass their output through this first.
pub fn pcm16_to_wav(pcm: &[u8], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    if channels == 0 || channels > 2 {
        return Err(ReverieError::decode(format!(
            "{}-channel PCM (only mono/stereo supported)",
            channels
        )));
    }

    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(pcm.len() + 44));
    {
        let mut writer = WavWriter::new(&mut cursor, spec).map_err(wav_io_error)?;
        for pair in pcm.chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([pair[0], pair[1]]))
                .map_err(wav_io_error)?;
        }
        writer.finalize().map_err(wav_io_error)?;
    }
    Ok(cursor.into_inner())
}

/// Encode an AudioBuffer as 16-bit WAV bytes
pub fn encode_wav(buffer: &AudioBuffer) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            WavWriter::new(&mut cursor, wav_spec(buffer.channels() as u16, buffer.sample_rate))
                .map_err(wav_io_error)?;
        for sample in buffer.to_interleaved() {
            writer.write_sample(to_i16(sample)).map_err(wav_io_error)?;
        }
        writer.finalize().map_err(wav_io_error)?;
    }
    Ok(cursor.into_inner())
}

/// Export an AudioBuffer to a 16-bit WAV file
pub fn export_wav(buffer: &AudioBuffer, path: &Path) -> Result<()> {
    let mut writer =
        WavWriter::create(path, wav_spec(buffer.channels() as u16, buffer.sample_rate))
            .map_err(wav_io_error)?;
    for sample in buffer.to_interleaved() {
        writer.write_sample(to_i16(sample)).map_err(wav_io_error)?;
    }
    writer.finalize().map_err(wav_io_error)?;
    Ok(())
}

// ============================================================================
// Internal helper functions
// ============================================================================

pub(crate) fn wav_spec(channels: u16, sample_rate: u32) -> WavSpec {
    WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

#[inline]
pub(crate) fn to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

pub(crate) fn wav_io_error(e: hound::Error) -> ReverieError {
    match e {
        hound::Error::IoError(io) => ReverieError::Io(io),
        other => ReverieError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            other.to_string(),
        )),
    }
}

/// Read samples from WAV reader and convert to f32
fn read_samples_as_f32<R: std::io::Read>(
    mut reader: WavReader<R>,
    bits_per_sample: u16,
    sample_format: SampleFormat,
) -> Result<Vec<f32>> {
    let decode_err = |e: hound::Error| ReverieError::Decode {
        reason: format!("Failed to read {}-bit samples: {}", bits_per_sample, e),
        source: Some(Box::new(e)),
    };

    match sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(decode_err),
        SampleFormat::Int => match bits_per_sample {
            8 => reader
                .samples::<i8>()
                .map(|s| s.map(|v| v as f32 / 128.0))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(decode_err),
            16 => reader
                .samples::<i16>()
                .map(|s| s.map(|v| v as f32 / 32768.0))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(decode_err),
            // 24-bit stored as i32 in hound
            24 => reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / 8388608.0))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(decode_err),
            32 => reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / 2147483648.0))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(decode_err),
            _ => Err(ReverieError::decode(format!(
                "{}-bit integer audio",
                bits_per_sample
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tone(seconds: f64, sample_rate: u32) -> AudioBuffer {
        let n = (seconds * sample_rate as f64) as usize;
        let mut buffer = AudioBuffer::new(n, ChannelLayout::Mono, sample_rate);
        for (i, s) in buffer.channel_mut(0).iter_mut().enumerate() {
            *s = (2.0 * std::f32::consts::PI * 220.0 * i as f32 / sample_rate as f32).sin() * 0.5;
        }
        buffer
    }

    #[test]
    fn test_decode_encoded_wav_keeps_shape() {
        let original = tone(0.5, 24000);
        let bytes = encode_wav(&original).unwrap();
        let decoded = decode_wav(&bytes).unwrap();

        assert_eq!(decoded.sample_rate, 24000);
        assert_eq!(decoded.channels(), 1);
        assert_eq!(decoded.len(), original.len());
        assert_relative_eq!(decoded.duration_secs(), 0.5, epsilon = 1e-9);
        assert_relative_eq!(decoded.peak(), original.peak(), epsilon = 1e-3);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode_wav(b"<html>404 not found</html>").unwrap_err();
        assert_eq!(err.error_code(), "DECODE_ERROR");
    }

    #[test]
    fn test_decode_rejects_empty_payload() {
        let bytes = pcm16_to_wav(&[], 24000, 1).unwrap();
        assert!(decode_wav(&bytes).is_err());
    }

    #[test]
    fn test_pcm16_container() {
        let pcm: Vec<u8> = [0i16, 16384, -16384, 32767]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let wav = pcm16_to_wav(&pcm, 24000, 1).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");

        let decoded = decode_wav(&wav).unwrap();
        assert_eq!(decoded.len(), 4);
        assert_relative_eq!(decoded.channel(0)[1], 0.5, epsilon = 1e-4);
        assert_relative_eq!(decoded.channel(0)[2], -0.5, epsilon = 1e-4);
    }

    #[test]
    fn test_pcm16_rejects_surround() {
        assert!(pcm16_to_wav(&[0, 0], 24000, 6).is_err());
    }

    #[test]
    fn test_export_wav_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        export_wav(&tone(0.25, 48000), &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let decoded = decode_wav(&bytes).unwrap();
        assert_eq!(decoded.len(), 12000);
    }
}
