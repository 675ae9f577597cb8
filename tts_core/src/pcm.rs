use thiserror::Error;

/// Sample rate of every PCM payload in the system: 22050 Hz, mono.
pub const SAMPLE_RATE: u32 = 22_050;

/// Normalization divisor for 16-bit samples.
const SCALE: f32 = 32_768.0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("audio payload is empty")]
    Empty,

    #[error("audio payload has odd length {0}; expected whole 16-bit samples")]
    OddLength(usize),
}

/// Decode little-endian signed 16-bit mono PCM into f32 samples.
///
/// Each sample is divided by 32768, so the output lies in [-1.0, 1.0).
/// The payload must be the complete, concatenated audio for a job;
/// partial buffers with a trailing half-sample are rejected.
pub fn decode_pcm16le(bytes: &[u8]) -> Result<Vec<f32>, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    if bytes.len() % 2 != 0 {
        return Err(DecodeError::OddLength(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / SCALE)
        .collect())
}

/// Encode f32 samples as little-endian signed 16-bit mono PCM.
///
/// Inverse of [`decode_pcm16le`]: values are scaled by 32768, rounded,
/// and clamped to the i16 range.
pub fn encode_pcm16le(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let v = (s * SCALE).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Concatenate received chunks in arrival order into one payload.
pub fn concat_chunks(chunks: &[Vec<u8>]) -> Vec<u8> {
    let total: usize = chunks.iter().map(Vec::len).sum();
    let mut out = Vec::with_capacity(total);
    for chunk in chunks {
        out.extend_from_slice(chunk);
    }
    out
}
