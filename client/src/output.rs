use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, Sink};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::warn;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("audio output unavailable: {0}")]
    Device(String),
}

/// Where decoded samples go. The returned receiver resolves when playback
/// drains; a dropped sender means playback never finished.
pub trait AudioOutput: Send + Sync {
    fn play(&self, samples: Vec<f32>, sample_rate: u32)
        -> Result<oneshot::Receiver<()>, OutputError>;
}

/// Speaker output through rodio.
///
/// `OutputStream` is not `Send`, so each playback runs on its own thread
/// that owns the stream for the duration of the clip.
pub struct RodioOutput;

impl RodioOutput {
    /// Probe the default output device so headless environments are caught
    /// at startup instead of on the first reply.
    pub fn new() -> Result<Self, OutputError> {
        let _probe = OutputStream::try_default().map_err(|e| OutputError::Device(e.to_string()))?;
        Ok(Self)
    }
}

impl AudioOutput for RodioOutput {
    fn play(
        &self,
        samples: Vec<f32>,
        sample_rate: u32,
    ) -> Result<oneshot::Receiver<()>, OutputError> {
        let (done_tx, done_rx) = oneshot::channel();
        std::thread::Builder::new()
            .name("audio-playback".into())
            .spawn(move || {
                let (_stream, handle) = match OutputStream::try_default() {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "no audio output device");
                        return;
                    }
                };
                let sink = match Sink::try_new(&handle) {
                    Ok(sink) => sink,
                    Err(e) => {
                        warn!(error = %e, "could not open playback sink");
                        return;
                    }
                };
                sink.append(SamplesBuffer::new(1, sample_rate, samples));
                sink.sleep_until_end();
                let _ = done_tx.send(());
            })
            .map_err(|e| OutputError::Device(e.to_string()))?;
        Ok(done_rx)
    }
}
