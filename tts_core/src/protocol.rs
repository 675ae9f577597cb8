use serde::{Deserialize, Serialize};

/// Text messages a client sends over the streaming socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Request synthesis of `text`; all resulting frames are tagged with `id`.
    Prompt { text: String, id: String },
}

/// Control messages the server sends back.
///
/// Audio itself travels as raw binary PCM frames with no envelope,
/// delivered between `audio_start` and `audio_end` for the same id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    AudioStart { id: String },
    AudioEnd { id: String },
    Error { id: String, error: String },
}
