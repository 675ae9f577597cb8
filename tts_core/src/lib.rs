//! Audio plumbing shared by the twin server and its streaming client:
//! the PCM wire codec, the WebSocket message vocabulary, WAV encoding,
//! and the realtime upstream synthesizer with its payload cache.

pub mod cache;
pub mod eleven;
pub mod pcm;
pub mod protocol;
pub mod wav;

pub use cache::AudioCache;
pub use eleven::{RealtimeTts, SynthError, DEFAULT_WS_BASE};
pub use pcm::{concat_chunks, decode_pcm16le, encode_pcm16le, DecodeError, SAMPLE_RATE};
pub use protocol::{ClientMessage, ServerMessage};
pub use wav::{encode_wav_base64, wav_bytes};
