//! Audio transport codec.
//!
//! Two-way conversion between waveforms and the text-safe encoding used on
//! the request boundary: audio bytes travel as standard base64 (padded), and
//! waveforms are wrapped in a self-describing WAV container so the sample
//! rate travels with the bytes.

use crate::error::{Result, ServeError};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::io::Cursor;
use std::path::Path;

/// Encode raw audio bytes for transport over a text-only boundary.
pub fn encode_audio(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Decode transport text back into raw audio bytes.
///
/// # Errors
///
/// Returns [`ServeError::MalformedAudioEncoding`] on non-alphabet characters
/// or incorrect padding.
pub fn decode_audio(text: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(text)
        .map_err(|e| ServeError::MalformedAudioEncoding(e.to_string()))
}

/// Wrap f32 mono samples in a 16-bit PCM WAV container, in memory.
///
/// Samples are clamped to `[-1.0, 1.0]` before quantization.
pub fn wav_from_samples(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| ServeError::Synthesis(format!("failed to create wav writer: {e}")))?;
        for &s in samples {
            let clamped = s.clamp(-1.0, 1.0);
            let v = (clamped * i16::MAX as f32).round() as i16;
            writer
                .write_sample(v)
                .map_err(|e| ServeError::Synthesis(format!("failed to write wav sample: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| ServeError::Synthesis(format!("failed to finalize wav: {e}")))?;
    }
    Ok(cursor.into_inner())
}

/// Best-effort duration of a WAV byte buffer, for upload logging.
///
/// Returns `None` when the bytes are not a readable WAV container; uploads
/// are stored as-is either way.
pub fn wav_duration_secs(bytes: &[u8]) -> Option<f32> {
    let reader = hound::WavReader::new(Cursor::new(bytes)).ok()?;
    let spec = reader.spec();
    if spec.sample_rate == 0 || spec.channels == 0 {
        return None;
    }
    let frames = reader.duration();
    Some(frames as f32 / spec.sample_rate as f32)
}

/// Read a WAV file into mono f32 samples plus its sample rate.
///
/// Multi-channel input is downmixed by averaging channels. Both integer and
/// float PCM are accepted.
///
/// # Errors
///
/// Returns [`ServeError::Synthesis`] if the file cannot be read or decoded.
pub fn read_wav_mono_f32(path: &Path) -> Result<(Vec<f32>, u32)> {
    let mut reader = hound::WavReader::open(path).map_err(|e| {
        ServeError::Synthesis(format!("failed to open reference wav {}: {e}", path.display()))
    })?;
    let spec = reader.spec();
    let channels = spec.channels as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| ServeError::Synthesis(format!("failed to decode wav samples: {e}")))?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| ServeError::Synthesis(format!("failed to decode wav samples: {e}")))?
        }
    };

    if channels <= 1 {
        return Ok((interleaved, spec.sample_rate));
    }

    let mut mono = Vec::with_capacity(interleaved.len() / channels + 1);
    for frame in interleaved.chunks_exact(channels) {
        let mut sum = 0.0f32;
        for s in frame {
            sum += *s;
        }
        mono.push(sum / channels as f32);
    }
    Ok((mono, spec.sample_rate))
}

/// Linear resampler for mono audio.
pub fn resample_linear_mono(input: &[f32], from_sr: u32, to_sr: u32) -> Vec<f32> {
    if input.is_empty() || from_sr == to_sr {
        return input.to_vec();
    }

    let ratio = to_sr as f64 / from_sr as f64;
    let out_len = ((input.len() as f64) * ratio).round() as usize;
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_pos = (i as f64) / ratio;
        let src_i0 = src_pos.floor() as isize;
        let src_i1 = src_i0 + 1;
        let t = (src_pos - src_i0 as f64) as f32;

        let s0 = sample_clamped(input, src_i0);
        let s1 = sample_clamped(input, src_i1);
        out.push(s0 * (1.0 - t) + s1 * t);
    }

    out
}

fn sample_clamped(input: &[f32], idx: isize) -> f32 {
    if idx <= 0 {
        return input[0];
    }
    let idx = idx as usize;
    if idx >= input.len() {
        return input[input.len() - 1];
    }
    input[idx]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_round_trips_arbitrary_bytes() {
        let cases: Vec<Vec<u8>> = vec![
            Vec::new(),
            vec![0],
            vec![0xff; 7],
            (0u8..=255).collect(),
            b"RIFF....WAVEfmt ".to_vec(),
        ];
        for bytes in cases {
            let text = encode_audio(&bytes);
            let back = decode_audio(&text).expect("encoded text must decode");
            assert_eq!(back, bytes);
        }
    }

    #[test]
    fn decode_rejects_non_alphabet_input() {
        let err = decode_audio("not-base64-!!!").unwrap_err();
        assert_eq!(err.kind(), "malformed_audio_encoding");
    }

    #[test]
    fn decode_rejects_bad_padding() {
        let err = decode_audio("QUJD=A").unwrap_err();
        assert_eq!(err.kind(), "malformed_audio_encoding");
    }

    #[test]
    fn wav_container_is_self_describing() {
        let samples: Vec<f32> = (0..2400).map(|i| (i as f32 / 2400.0).sin()).collect();
        let bytes = wav_from_samples(&samples, 24_000).expect("wav encode");

        assert_eq!(&bytes[..4], b"RIFF");
        let reader = hound::WavReader::new(Cursor::new(&bytes)).expect("wav parse");
        let spec = reader.spec();
        assert_eq!(spec.sample_rate, 24_000);
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(reader.duration() as usize, samples.len());
    }

    #[test]
    fn wav_quantization_clamps_out_of_range() {
        let bytes = wav_from_samples(&[2.0, -2.0], 24_000).expect("wav encode");
        let mut reader = hound::WavReader::new(Cursor::new(&bytes)).expect("wav parse");
        let decoded: Vec<i16> = reader.samples::<i16>().map(|s| s.expect("sample")).collect();
        assert_eq!(decoded, vec![i16::MAX, -i16::MAX]);
    }

    #[test]
    fn wav_duration_reports_seconds() {
        let samples = vec![0.0f32; 24_000 * 3];
        let bytes = wav_from_samples(&samples, 24_000).expect("wav encode");
        let secs = wav_duration_secs(&bytes).expect("duration");
        assert!((secs - 3.0).abs() < 1e-3, "expected ~3s, got {secs}");
    }

    #[test]
    fn wav_duration_is_none_for_garbage() {
        assert!(wav_duration_secs(b"definitely not a wav").is_none());
    }

    #[test]
    fn resample_preserves_length_ratio() {
        let input = vec![0.5f32; 16_000];
        let out = resample_linear_mono(&input, 16_000, 24_000);
        assert_eq!(out.len(), 24_000);
        assert!(out.iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn resample_identity_when_rates_match() {
        let input = vec![0.1f32, 0.2, 0.3];
        assert_eq!(resample_linear_mono(&input, 24_000, 24_000), input);
    }
}
