use std::time::Duration;

use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;
use url::Url;

use crate::cache::AudioCache;

/// Default upstream realtime synthesis endpoint.
pub const DEFAULT_WS_BASE: &str = "wss://api.elevenlabs.io";

/// Every await on the upstream is bounded by this.
const RECV_TIMEOUT: Duration = Duration::from_secs(10);

const CACHE_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum SynthError {
    #[error("TTS disabled: set ELEVEN_API_KEY to enable speech")]
    Disabled,

    #[error("invalid synthesizer endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    #[error("could not reach synthesizer: {0}")]
    Connect(String),

    #[error("synthesizer stream failed: {0}")]
    Stream(String),

    #[error("synthesizer reported: {0}")]
    Upstream(String),

    #[error("timed out waiting for synthesizer audio")]
    RecvTimeout,

    #[error("synthesizer produced no audio")]
    NoAudio,
}

/// Client for an ElevenLabs-style realtime synthesis WebSocket API.
///
/// One connection is opened per utterance: a voice configuration message,
/// the text, and an empty flush message go out; PCM comes back either as
/// base64 inside JSON frames or as raw binary frames. Assembled payloads
/// are cached so repeated prompts replay without an upstream round trip.
pub struct RealtimeTts {
    api_key: Option<String>,
    ws_base: String,
    cache: AudioCache,
}

impl RealtimeTts {
    pub fn new(api_key: Option<String>, ws_base: impl Into<String>) -> Self {
        Self {
            api_key,
            ws_base: ws_base.into(),
            cache: AudioCache::new(CACHE_CAPACITY),
        }
    }

    /// Whether an API key is configured. When false, synthesis calls fail
    /// with [`SynthError::Disabled`] and the rest of the server keeps working.
    pub fn enabled(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache.hits()
    }

    pub fn cache_misses(&self) -> u64 {
        self.cache.misses()
    }

    fn endpoint(&self, voice_id: &str) -> Result<String, SynthError> {
        let mut url = Url::parse(&self.ws_base)?;
        url.set_path(&format!("/v1/text-to-speech/{voice_id}/stream-input"));
        url.set_query(Some("output_format=pcm_22050"));
        Ok(url.to_string())
    }

    /// Synthesize `text` with `voice_id`, forwarding PCM chunks to `sink` as
    /// they arrive. The assembled payload is cached on clean completion.
    ///
    /// If the receiving side goes away mid-stream, synthesis is drained to
    /// completion anyway so the cache entry is still written.
    pub async fn stream(
        &self,
        voice_id: &str,
        text: &str,
        sink: mpsc::Sender<Vec<u8>>,
    ) -> Result<(), SynthError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(SynthError::Disabled);
        };

        let cache_key = AudioCache::key(voice_id, text);
        if let Some(pcm) = self.cache.get(&cache_key) {
            debug!(voice_id, "replaying cached audio");
            let _ = sink.send(pcm.to_vec()).await;
            return Ok(());
        }

        let mut request = self
            .endpoint(voice_id)?
            .into_client_request()
            .map_err(|e| SynthError::Connect(e.to_string()))?;
        if let Ok(value) = HeaderValue::from_str(api_key) {
            request.headers_mut().insert("xi-api-key", value);
        }

        let (ws, _) = tokio::time::timeout(RECV_TIMEOUT, connect_async(request))
            .await
            .map_err(|_| SynthError::Connect("connection timed out".into()))?
            .map_err(|e| SynthError::Connect(e.to_string()))?;
        let (mut tx, mut rx) = ws.split();

        let setup = serde_json::json!({
            "text": " ",
            "voice_settings": { "speed": 1.0, "stability": 0.55, "similarity_boost": 0.8 },
            "xi_api_key": api_key,
        });
        let prompt = serde_json::json!({ "text": text, "try_trigger_generation": true });
        let flush = serde_json::json!({ "text": "" });
        for msg in [setup, prompt, flush] {
            tx.send(Message::Text(msg.to_string().into()))
                .await
                .map_err(|e| SynthError::Stream(e.to_string()))?;
        }

        let mut collected: Vec<u8> = Vec::new();
        let mut receiver_gone = false;
        loop {
            let frame = match tokio::time::timeout(RECV_TIMEOUT, rx.next()).await {
                Err(_) => return Err(SynthError::RecvTimeout),
                Ok(None) => break,
                Ok(Some(Err(e))) => return Err(SynthError::Stream(e.to_string())),
                Ok(Some(Ok(frame))) => frame,
            };

            let mut finished = false;
            let chunk: Option<Vec<u8>> = match frame {
                Message::Text(raw) => {
                    let value: serde_json::Value = serde_json::from_str(raw.as_str())
                        .map_err(|e| SynthError::Stream(format!("unreadable frame: {e}")))?;
                    if let Some(error) = value.get("error").and_then(|v| v.as_str()) {
                        return Err(SynthError::Upstream(error.to_string()));
                    }
                    finished = value.get("isFinal").and_then(|v| v.as_bool()) == Some(true);
                    match value.get("audio").and_then(|v| v.as_str()) {
                        Some(audio) => Some(
                            base64::engine::general_purpose::STANDARD
                                .decode(audio)
                                .map_err(|e| SynthError::Stream(format!("bad audio frame: {e}")))?,
                        ),
                        None => None,
                    }
                }
                Message::Binary(bytes) => Some(bytes.to_vec()),
                Message::Close(_) => break,
                _ => None,
            };

            if let Some(chunk) = chunk {
                if !chunk.is_empty() {
                    collected.extend_from_slice(&chunk);
                    if !receiver_gone && sink.send(chunk).await.is_err() {
                        debug!("audio receiver dropped; draining upstream for the cache");
                        receiver_gone = true;
                    }
                }
            }
            if finished {
                break;
            }
        }

        if collected.is_empty() {
            return Err(SynthError::NoAudio);
        }
        self.cache.put(cache_key, collected);
        Ok(())
    }

    /// Synthesize `text` and return the complete PCM payload in one piece.
    pub async fn synthesize(&self, voice_id: &str, text: &str) -> Result<Vec<u8>, SynthError> {
        let (tx, mut rx) = mpsc::channel(100);
        let producer = self.stream(voice_id, text, tx);
        let consumer = async move {
            let mut pcm = Vec::new();
            while let Some(chunk) = rx.recv().await {
                pcm.extend_from_slice(&chunk);
            }
            pcm
        };
        let (result, pcm) = tokio::join!(producer, consumer);
        result?;
        Ok(pcm)
    }
}
