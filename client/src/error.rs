use thiserror::Error;

/// Why a playback request failed. Every failure returns the session to idle;
/// nothing retries on its own.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("timed out opening the audio stream")]
    TransportTimeout,

    #[error("audio stream failed: {0}")]
    TransportError(String),

    #[error("server reported: {0}")]
    ServerReportedError(String),

    #[error("could not decode audio: {0}")]
    DecodeError(#[from] tts_core::DecodeError),

    #[error("audio playback unavailable: {0}")]
    UnsupportedEnvironment(String),
}
