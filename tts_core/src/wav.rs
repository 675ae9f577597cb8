use std::io::Cursor;

use base64::Engine;

/// Encode f32 samples as a mono 16-bit PCM WAV file.
pub fn wav_bytes(samples: &[f32], sample_rate: u32) -> anyhow::Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    // WAV header (44 bytes) + 2 bytes per sample
    let estimated_size = 44 + samples.len() * 2;
    let mut cursor = Cursor::new(Vec::<u8>::with_capacity(estimated_size));

    let mut writer = hound::WavWriter::new(&mut cursor, spec)
        .map_err(|e| anyhow::anyhow!("wav write err: {e}"))?;
    for &s in samples {
        let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer
            .write_sample(v)
            .map_err(|e| anyhow::anyhow!("wav sample err: {e}"))?;
    }
    writer
        .finalize()
        .map_err(|e| anyhow::anyhow!("wav finalize err: {e}"))?;

    Ok(cursor.into_inner())
}

/// Convenience: WAV wrapped in Base64, as returned by the HTTP synthesis endpoint.
pub fn encode_wav_base64(samples: &[f32], sample_rate: u32) -> anyhow::Result<String> {
    let buf = wav_bytes(samples, sample_rate)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(buf))
}
